// Copyright (c) 2017 Jason White
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.
use std::io;
use std::path::PathBuf;

use failure::Fail;

pub use failure::ResultExt;

/// The error taxonomy of spec §7. `MissingProducer` is fatal and aborts the
/// build immediately; everything else is counted against the failure budget
/// by the job supervisor instead of propagating straight out.
#[derive(Debug, Fail)]
pub enum Error {
    /// An input to a dirty edge has no generating edge and does not exist on
    /// disk.
    #[fail(
        display = "file is missing and not created by any action: '{}'",
        _0
    )]
    MissingProducer(PathBuf),

    /// The edge's rule has no `command` variable.
    #[fail(display = "rule '{}' has no command", _0)]
    NoCommand(String),

    /// The ready queue drained with failures outstanding but before the
    /// failure budget was reached: downstream work was blocked by upstream
    /// failures.
    #[fail(display = "cannot make progress due to previous errors")]
    CannotMakeProgress,

    /// Exactly one subcommand failed.
    #[fail(display = "subcommand failed")]
    SubcommandFailed,

    /// More than one subcommand failed.
    #[fail(display = "subcommands failed")]
    SubcommandsFailed,

    #[fail(display = "{}", _0)]
    Io(#[cause] io::Error),

    #[fail(display = "{}", _0)]
    Other(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<failure::Context<String>> for Error {
    fn from(ctx: failure::Context<String>) -> Error {
        Error::Other(ctx.to_string())
    }
}

impl From<failure::Context<&'static str>> for Error {
    fn from(ctx: failure::Context<&'static str>) -> Error {
        Error::Other(ctx.to_string())
    }
}
