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
use super::index::{NodeIndex, PoolIndex};
use crate::env::Environment;

/// The rule a edge was instantiated from.
///
/// The manifest-syntax parser is out of scope for this crate (spec §1), so
/// rules carry no variables of their own here; `Edge::env` is the only
/// variable-lookup surface the core touches. `Phony` is the one rule
/// identity the core itself needs to recognize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// The well-known sentinel rule whose edges never spawn a process.
    Phony,
    Named(String),
}

impl Rule {
    pub fn is_phony(&self) -> bool {
        *self == Rule::Phony
    }

    pub fn name(&self) -> &str {
        match self {
            Rule::Phony => "phony",
            Rule::Named(name) => name,
        }
    }
}

/// How far an edge has progressed towards being built.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mark {
    /// Queried the mtime of all outputs and computed dirtiness.
    pub stat_analyzed: bool,
    /// Reserved for command-hash computation; the core carries but never
    /// acts on command hashes (see spec §1 Non-goals).
    pub hash_computed: bool,
    /// Scheduled for the current build.
    pub scheduled: bool,
}

/// One unit of work: a rule plus explicit/implicit/order-only inputs and
/// explicit/implicit outputs.
pub struct Edge {
    pub rule: Rule,
    pub pool: Option<PoolIndex>,
    pub env: Box<dyn Environment>,

    pub outputs: Vec<NodeIndex>,
    pub inputs: Vec<NodeIndex>,

    /// Index of the first implicit output.
    pub out_implicit_idx: usize,
    /// Index of the first implicit input.
    pub in_implicit_idx: usize,
    /// Index of the first order-only input.
    pub in_order_idx: usize,

    /// Command hash, read from the persistent log. Carried, not
    /// interpreted.
    pub hash: u64,

    /// How many inputs are still dirty and must finish before this edge can
    /// run.
    pub nblock: usize,

    pub mark: Mark,
}

impl Edge {
    pub(crate) fn new(
        rule: Rule,
        pool: Option<PoolIndex>,
        env: Box<dyn Environment>,
    ) -> Edge {
        Edge {
            rule,
            pool,
            env,
            outputs: Vec::new(),
            inputs: Vec::new(),
            out_implicit_idx: 0,
            in_implicit_idx: 0,
            in_order_idx: 0,
            hash: 0,
            nblock: 0,
            mark: Mark::default(),
        }
    }

    /// Looks up a rule variable through this edge's environment. This is the
    /// `edgevar` glue contract of spec §4.A/§4.E.
    pub fn var(&self, name: &str) -> Option<String> {
        self.env.lookup(name)
    }

    /// Inputs in the explicit-plus-implicit zone, i.e. everything that
    /// contributes to dirtiness (excludes order-only inputs).
    pub fn dirtying_inputs(&self) -> &[NodeIndex] {
        &self.inputs[..self.in_order_idx]
    }
}
