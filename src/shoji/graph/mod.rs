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

//! The in-memory build graph: nodes, edges, and pools, owned by a single
//! arena for the lifetime of the build (spec §3, §4.A).

mod edge;
mod index;
mod node;
mod pool;

pub use self::edge::{Edge, Mark, Rule};
pub use self::index::{EdgeIndex, NodeIndex, PoolIndex};
pub use self::node::{is_newer, MTime, Node, Timestamp};
pub use self::pool::{Pool, CONSOLE_POOL_NAME};

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::env::Environment;

/// Owns every node, edge, and pool for the lifetime of one build.
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    pools: Vec<Pool>,
    by_path: HashMap<PathBuf, NodeIndex>,
    console_pool: PoolIndex,
}

impl Graph {
    pub fn new() -> Graph {
        let mut pools = Vec::new();
        pools.push(Pool::new(CONSOLE_POOL_NAME, 1));

        Graph {
            nodes: Vec::new(),
            edges: Vec::new(),
            pools,
            by_path: HashMap::new(),
            console_pool: PoolIndex::new(0),
        }
    }

    pub fn console_pool(&self) -> PoolIndex {
        self.console_pool
    }

    /// Interns or retrieves the node for `path`.
    pub fn mknode(&mut self, path: impl AsRef<Path>) -> NodeIndex {
        let path = path.as_ref();
        if let Some(&index) = self.by_path.get(path) {
            return index;
        }

        let index = NodeIndex::new(self.nodes.len());
        self.nodes.push(Node::new(path.to_path_buf()));
        self.by_path.insert(path.to_path_buf(), index);
        index
    }

    /// Looks up a node by path without creating it.
    pub fn node_get(&self, path: impl AsRef<Path>) -> Option<NodeIndex> {
        self.by_path.get(path.as_ref()).copied()
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.index()]
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> &mut Node {
        &mut self.nodes[index.index()]
    }

    /// Creates a new named pool with the given depth. Pool names are unique;
    /// calling this twice with the same name returns the existing pool
    /// (enforced by the out-of-scope manifest parser in the original
    /// design, but cheap enough to make idempotent here too).
    pub fn mkpool(&mut self, name: impl Into<String>, depth: usize) -> PoolIndex {
        let name = name.into();
        if let Some(pos) = self.pools.iter().position(|p| p.name == name) {
            return PoolIndex::new(pos);
        }
        let index = PoolIndex::new(self.pools.len());
        self.pools.push(Pool::new(name, depth));
        index
    }

    pub fn pool(&self, index: PoolIndex) -> &Pool {
        &self.pools[index.index()]
    }

    pub fn pool_mut(&mut self, index: PoolIndex) -> &mut Pool {
        &mut self.pools[index.index()]
    }

    /// Creates a new edge. Its rule, pool, and environment are fixed at
    /// creation; outputs and inputs are attached afterwards via
    /// `set_outputs`/`set_inputs`, mirroring the two-step
    /// `mkedge`-then-populate flow of the original `parse.c`.
    pub fn mkedge(
        &mut self,
        rule: Rule,
        pool: Option<PoolIndex>,
        env: Box<dyn Environment>,
    ) -> EdgeIndex {
        let index = EdgeIndex::new(self.edges.len());
        self.edges.push(Edge::new(rule, pool, env));
        index
    }

    pub fn edge(&self, index: EdgeIndex) -> &Edge {
        &self.edges[index.index()]
    }

    pub fn edge_mut(&mut self, index: EdgeIndex) -> &mut Edge {
        &mut self.edges[index.index()]
    }

    pub fn all_edges(&self) -> impl Iterator<Item = EdgeIndex> {
        (0..self.edges.len()).map(EdgeIndex::new)
    }

    /// Declares `explicit` outputs followed by `implicit` outputs for
    /// `edge`, recording each output node's sole generating edge.
    ///
    /// # Panics
    ///
    /// Panics if any output node already has a generating edge. The
    /// manifest parser is responsible for rejecting this before it reaches
    /// the core (spec §4.A); this is a late invariant check, not user-facing
    /// validation.
    pub fn set_outputs(
        &mut self,
        edge: EdgeIndex,
        explicit: Vec<NodeIndex>,
        implicit: Vec<NodeIndex>,
    ) {
        let out_implicit_idx = explicit.len();
        let mut outputs = explicit;
        outputs.extend(implicit);

        for &n in &outputs {
            debug_assert!(
                self.node(n).gen.is_none(),
                "two edges cannot claim the same output: {:?}",
                self.node(n).path
            );
            self.node_mut(n).gen = Some(edge);
        }

        let e = self.edge_mut(edge);
        e.out_implicit_idx = out_implicit_idx;
        e.outputs = outputs;
    }

    /// Declares explicit, implicit, and order-only inputs for `edge`, in
    /// that order, and bumps each input node's reserved consumer count.
    pub fn set_inputs(
        &mut self,
        edge: EdgeIndex,
        explicit: Vec<NodeIndex>,
        implicit: Vec<NodeIndex>,
        order_only: Vec<NodeIndex>,
    ) {
        let in_implicit_idx = explicit.len();
        let in_order_idx = in_implicit_idx + implicit.len();

        let mut inputs = explicit;
        inputs.extend(implicit);
        inputs.extend(order_only);

        for &n in &inputs {
            self.node_mut(n).reserved_uses += 1;
        }

        let e = self.edge_mut(edge);
        e.in_implicit_idx = in_implicit_idx;
        e.in_order_idx = in_order_idx;
        e.inputs = inputs;
    }

    /// Registers `edge` as a consumer of `node`, allocating `use_edges` on
    /// first touch with the capacity reserved during graph construction
    /// (spec §3 Node invariants, §9 "back-edges `node.use`").
    pub(crate) fn record_use(&mut self, node: NodeIndex, edge: EdgeIndex) {
        let n = self.node_mut(node);
        if n.use_edges.is_empty() && n.use_edges.capacity() == 0 {
            n.use_edges = Vec::with_capacity(n.reserved_uses);
        }
        n.use_edges.push(edge);
    }

    /// Populates `node`'s mtime by querying the filesystem. The sole mutator
    /// of `mtime`; after this runs, it is never `Unknown` again.
    pub fn nodestat(&mut self, node: NodeIndex) -> io::Result<()> {
        let path = self.node(node).path.clone();
        let mtime = stat_mtime(&path)?;
        self.node_mut(node).mtime = mtime;
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Graph::new()
    }
}

#[cfg(unix)]
fn stat_mtime(path: &Path) -> io::Result<MTime> {
    use std::os::unix::fs::MetadataExt;

    match fs::metadata(path) {
        Ok(meta) => Ok(MTime::Valid(Timestamp {
            sec: meta.mtime(),
            nsec: meta.mtime_nsec(),
        })),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(MTime::Missing),
        Err(err) => Err(err),
    }
}

#[cfg(not(unix))]
fn stat_mtime(path: &Path) -> io::Result<MTime> {
    match fs::metadata(path) {
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::Other,
            "shoji only supports unix-like platforms",
        )),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(MTime::Missing),
        Err(err) => Err(err),
    }
}
