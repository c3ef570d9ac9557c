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

//! A Ninja-compatible build graph executor.
//!
//! This crate owns the dependency graph, the dirty analysis that decides
//! which edges need to run, and the job supervisor that runs them with
//! bounded concurrency. It does not parse build manifests; callers build
//! the graph directly (see [`graph::Graph`]) or adapt their own front end
//! through the [`env::Environment`] trait.

pub mod dirty;
pub mod env;
pub mod error;
pub mod graph;
pub mod job;
pub mod scheduler;

pub use crate::env::{BasicEnvironment, Environment};
pub use crate::error::Error;
pub use crate::graph::Graph;
pub use crate::job::{run, BuildOptions};
pub use crate::scheduler::Scheduler;
