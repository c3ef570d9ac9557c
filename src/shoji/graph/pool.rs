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
use std::collections::VecDeque;

use super::index::EdgeIndex;

/// The reserved name of the console pool.
pub const CONSOLE_POOL_NAME: &str = "console";

/// A named concurrency class bounding how many of its edges may run
/// simultaneously.
///
/// Edges with no pool at all (the default pool) aren't represented here;
/// they bypass capacity tracking entirely and always go straight to the
/// ready queue (spec §4.C).
pub struct Pool {
    pub name: String,
    pub depth: usize,
    pub running: usize,

    /// Edges deferred here because the pool was at capacity when they
    /// became ready. Spec §4.C describes this as a FIFO queue; this is the
    /// one place this crate's behavior is chosen over samurai's actual
    /// linked-list implementation (which is a LIFO stack reusing the same
    /// push-front primitive as the main ready queue) because the spec is
    /// explicit about FIFO ordering here, unlike elsewhere. See DESIGN.md.
    pub overflow: VecDeque<EdgeIndex>,
}

impl Pool {
    pub(crate) fn new(name: impl Into<String>, depth: usize) -> Pool {
        Pool {
            name: name.into(),
            depth,
            running: 0,
            overflow: VecDeque::new(),
        }
    }

    pub fn is_console(&self) -> bool {
        self.name == CONSOLE_POOL_NAME
    }
}
