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

mod manifest;

use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use structopt::StructOpt;
use termcolor::{self as tc, WriteColor};

use shoji::{BuildOptions, Graph, Scheduler};

/// A color choice, matching the `--color` convention of most Cargo-style
/// tools.
#[derive(Debug, Copy, Clone)]
struct ColorChoice(tc::ColorChoice);

impl ColorChoice {
    fn resolve(self) -> tc::ColorChoice {
        match self.0 {
            tc::ColorChoice::Auto => {
                if atty::is(atty::Stream::Stdout) {
                    tc::ColorChoice::Auto
                } else {
                    tc::ColorChoice::Never
                }
            }
            other => other,
        }
    }
}

impl FromStr for ColorChoice {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ColorChoice(tc::ColorChoice::Auto)),
            "always" => Ok(ColorChoice(tc::ColorChoice::Always)),
            "ansi" => Ok(ColorChoice(tc::ColorChoice::AlwaysAnsi)),
            "never" => Ok(ColorChoice(tc::ColorChoice::Never)),
            _ => Err("invalid color choice"),
        }
    }
}

#[derive(StructOpt, Debug)]
#[structopt(name = "shoji", about = "A Ninja-compatible build graph executor.")]
struct Opt {
    /// The build file to read.
    #[structopt(short = "f", long = "file", default_value = "build.ninja", parse(from_os_str))]
    file: PathBuf,

    /// The number of subcommands to run in parallel. Defaults to the
    /// number of logical cores.
    #[structopt(short = "j", long = "jobs")]
    jobs: Option<usize>,

    /// Keep going until N edges fail (0 means never stop). If omitted,
    /// stops after the first failure.
    #[structopt(short = "k", long = "keep-going")]
    keep_going: Option<usize>,

    /// When to colorize diagnostic output.
    #[structopt(
        long = "color",
        default_value = "auto",
        possible_values = &["auto", "always", "ansi", "never"],
        case_insensitive = true
    )]
    color: ColorChoice,

    /// The targets to build. Defaults to every target the build file
    /// names as a default, or every output if none are.
    targets: Vec<PathBuf>,
}

fn run(opt: Opt) -> Result<(), failure::Error> {
    let mut graph = Graph::new();
    let defaults = manifest::load(&mut graph, &opt.file)?;

    let targets = if opt.targets.is_empty() {
        defaults
    } else {
        opt.targets
    };

    let mut scheduler = Scheduler::new();
    for target in &targets {
        let node = graph
            .node_get(target)
            .ok_or_else(|| shoji::Error::MissingProducer(target.clone()))?;
        scheduler.add_subtarget(&mut graph, node)?;
    }

    let options = BuildOptions {
        jobs: opt.jobs.unwrap_or_else(|| num_cpus::get().max(1)),
        max_fail: match opt.keep_going {
            None => Some(1),
            Some(0) => None,
            Some(n) => Some(n),
        },
    };

    shoji::run(&mut graph, &mut scheduler, &options)?;

    Ok(())
}

fn main() {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    let color = opt.color.resolve();

    if let Err(error) = run(opt) {
        let mut red = tc::ColorSpec::new();
        red.set_fg(Some(tc::Color::Red));
        red.set_bold(true);

        let mut stdout = tc::StandardStream::stdout(color);

        let mut causes = error.iter_chain();
        if let Some(cause) = causes.next() {
            let _ = stdout.set_color(&red);
            let _ = write!(&mut stdout, "error");
            let _ = stdout.reset();
            let _ = writeln!(&mut stdout, ": {}", cause);
        }
        for cause in causes {
            let _ = stdout.set_color(&red);
            let _ = write!(&mut stdout, "caused by");
            let _ = stdout.reset();
            let _ = writeln!(&mut stdout, ": {}", cause);
        }

        process::exit(1);
    }
}
