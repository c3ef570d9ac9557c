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
use std::path::PathBuf;

use super::index::EdgeIndex;

/// A file modification time, or the lack of one.
///
/// This plays the role of samurai's `tv_nsec == -1 / -2` sentinel values, but
/// as a proper sum type instead of overloading a nanosecond field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MTime {
    /// Not yet stat'd.
    Unknown,
    /// Stat'd, but the file does not exist.
    Missing,
    /// Stat'd and present, with a concrete timestamp.
    Valid(Timestamp),
}

impl MTime {
    pub fn is_unknown(self) -> bool {
        matches!(self, MTime::Unknown)
    }

    pub fn is_missing(self) -> bool {
        matches!(self, MTime::Missing)
    }
}

impl Default for MTime {
    fn default() -> Self {
        MTime::Unknown
    }
}

/// A POSIX timestamp with nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub sec: i64,
    pub nsec: i64,
}

/// Returns whether `a` is strictly newer than `b`. A missing left-hand side
/// (no candidate yet) is never newer.
///
/// Mirrors samurai's `nodenewer`: compare seconds first, then nanoseconds.
pub fn is_newer(a: Option<Timestamp>, b: Timestamp) -> bool {
    match a {
        None => false,
        Some(a) => {
            if a.sec != b.sec {
                a.sec > b.sec
            } else {
                a.nsec > b.nsec
            }
        }
    }
}

/// A file (or virtual target) tracked by the build.
#[derive(Debug, Clone)]
pub struct Node {
    pub path: PathBuf,
    pub mtime: MTime,
    pub dirty: bool,

    /// The edge that generates this node, if any.
    pub gen: Option<EdgeIndex>,

    /// Edges that consume this node as an input. Populated lazily by the
    /// dirty analyzer, at most once, sized to `reserved_uses`.
    pub(crate) use_edges: Vec<EdgeIndex>,

    /// How many consumer edges were registered for this node while the
    /// (out-of-scope) manifest reader built the graph. `use_edges` is
    /// allocated with this capacity the first time it is touched by
    /// analysis, mirroring samurai's `n->nuse`/`n->use` pair.
    pub(crate) reserved_uses: usize,

    /// Command hash read from the persistent build log. The core carries
    /// this field but never interprets it; incremental rebuilds based on
    /// hash changes are out of scope (see spec §1 Non-goals).
    pub hash: u64,
}

impl Node {
    pub(crate) fn new(path: PathBuf) -> Node {
        Node {
            path,
            mtime: MTime::Unknown,
            dirty: false,
            gen: None,
            use_edges: Vec::new(),
            reserved_uses: 0,
            hash: 0,
        }
    }

    /// Edges that consume this node, if analysis has reached it.
    pub fn uses(&self) -> &[EdgeIndex] {
        &self.use_edges
    }
}
