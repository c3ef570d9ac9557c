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

//! Target selection and the ready queue (spec §4.C): walks the dependency
//! graph from the requested targets down to the edges that are ready to run
//! right now, respecting pool capacity.

use std::collections::VecDeque;

use log::trace;

use crate::dirty;
use crate::error::Error;
use crate::graph::{EdgeIndex, Graph, NodeIndex, PoolIndex};

/// The global ready queue plus pool bookkeeping.
///
/// Edges are pushed to the front and popped from the front, matching
/// samurai's intrusive stack-based queue (`build.c`'s `queue`/driver loop),
/// not a textbook FIFO. Pool overflow, however, is a genuine FIFO; see
/// `graph::Pool::overflow` and DESIGN.md.
#[derive(Default)]
pub struct Scheduler {
    ready: VecDeque<EdgeIndex>,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler {
            ready: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ready.len()
    }

    /// Pops the next edge to dispatch, if any.
    pub fn pop(&mut self) -> Option<EdgeIndex> {
        self.ready.pop_front()
    }

    /// Admits `edge` for dispatch: if it belongs to a pool already at
    /// capacity, it's deferred to that pool's overflow queue instead.
    /// Mirrors samurai's `queue`.
    fn admit(&mut self, graph: &mut Graph, edge: EdgeIndex) {
        if let Some(pool) = graph.edge(edge).pool {
            let p = graph.pool_mut(pool);
            if p.running >= p.depth {
                p.overflow.push_back(edge);
                return;
            }
            p.running += 1;
        }
        self.ready.push_front(edge);
    }

    /// Walks the dependency graph rooted at `node`, scheduling every dirty
    /// edge it depends on exactly once, and admitting any that are
    /// immediately ready (`nblock == 0`).
    ///
    /// Mirrors samurai's `addsubtarget`: a source file (no generating edge)
    /// that does not exist on disk is a fatal error; one that exists is
    /// simply not scheduled.
    pub fn add_subtarget(
        &mut self,
        graph: &mut Graph,
        node: NodeIndex,
    ) -> Result<(), Error> {
        let gen = graph.node(node).gen;

        let edge = match gen {
            Some(edge) => edge,
            None => {
                if graph.node(node).mtime.is_unknown() {
                    let _ = graph.nodestat(node);
                }
                return if graph.node(node).mtime.is_missing() {
                    Err(Error::MissingProducer(graph.node(node).path.clone()))
                } else {
                    Ok(())
                };
            }
        };

        if graph.edge(edge).mark.scheduled {
            return Ok(());
        }

        dirty::analyze(graph, edge);

        if !graph.node(node).dirty {
            return Ok(());
        }

        graph.edge_mut(edge).mark.scheduled = true;

        // Recurse over every input, not just the dirtying ones: an
        // order-only input can be dirty (and have its own generator to
        // schedule) without making this edge itself dirty. Mirrors
        // samurai's `addsubtarget`, which walks `e->in` in full.
        let dirty_inputs: Vec<NodeIndex> = graph
            .edge(edge)
            .inputs
            .iter()
            .copied()
            .filter(|&n| graph.node(n).dirty)
            .collect();

        for input in dirty_inputs {
            self.add_subtarget(graph, input)?;
        }

        if graph.edge(edge).nblock == 0 {
            trace!("edge for {:?} is ready, queuing", graph.edge(edge).outputs);
            self.admit(graph, edge);
        }

        Ok(())
    }

    /// Called when `edge` finishes successfully and unblocks `consumer`.
    /// Decrements `consumer`'s block count and admits it once it reaches
    /// zero. `consumer` may not be blocked on this at all — a node can be
    /// reachable from `record_use` (every input of every analyzed edge)
    /// without the edge itself being dirty, e.g. a non-dirty edge whose
    /// order-only input is dirty and has its own generator. Mirrors
    /// samurai's `nodedone`: `if (e->nblock > 0 && --e->nblock == 0)
    /// queue(e);` skips the decrement entirely when already zero.
    pub(crate) fn unblock(&mut self, graph: &mut Graph, consumer: EdgeIndex) {
        let e = graph.edge_mut(consumer);
        if e.nblock == 0 {
            return;
        }
        e.nblock -= 1;
        if e.nblock == 0 {
            self.admit(graph, consumer);
        }
    }

    /// Called when a pool-bound edge finishes. Frees its slot and, if
    /// anything was waiting in the overflow queue, promotes the
    /// longest-waiting edge straight to the front of the ready queue.
    pub(crate) fn complete_pool(&mut self, graph: &mut Graph, pool: PoolIndex) {
        let promoted = {
            let p = graph.pool_mut(pool);
            p.running -= 1;
            p.overflow.pop_front().map(|edge| {
                p.running += 1;
                edge
            })
        };
        if let Some(edge) = promoted {
            self.ready.push_front(edge);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::BasicEnvironment;
    use crate::graph::Rule;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_source_with_no_generator_is_fatal() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.txt");

        let mut graph = Graph::new();
        let node = graph.mknode(&missing);

        let mut scheduler = Scheduler::new();
        let err = scheduler.add_subtarget(&mut graph, node).unwrap_err();
        match err {
            Error::MissingProducer(path) => assert_eq!(path, missing),
            other => panic!("expected MissingProducer, got {:?}", other),
        }
    }

    #[test]
    fn existing_source_with_no_generator_is_fine() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("present.txt");
        fs::write(&present, b"").unwrap();

        let mut graph = Graph::new();
        let node = graph.mknode(&present);

        let mut scheduler = Scheduler::new();
        scheduler.add_subtarget(&mut graph, node).unwrap();
        assert!(scheduler.is_empty());
    }

    #[test]
    fn dirty_leaf_edge_is_queued_immediately() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        fs::write(&input, b"").unwrap();

        let mut graph = Graph::new();
        let in_node = graph.mknode(&input);
        let out_node = graph.mknode(&output);
        let edge = graph.mkedge(
            Rule::Named("touch".into()),
            None,
            Box::new(BasicEnvironment::new()),
        );
        graph.set_outputs(edge, vec![out_node], vec![]);
        graph.set_inputs(edge, vec![in_node], vec![], vec![]);

        let mut scheduler = Scheduler::new();
        scheduler.add_subtarget(&mut graph, out_node).unwrap();

        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.pop(), Some(edge));
    }

    #[test]
    fn chain_schedules_leaf_before_root_is_ready() {
        let dir = tempdir().unwrap();
        let leaf_in = dir.path().join("leaf_in.txt");
        let mid = dir.path().join("mid.txt");
        let root = dir.path().join("root.txt");
        fs::write(&leaf_in, b"").unwrap();

        let mut graph = Graph::new();
        let leaf_in_node = graph.mknode(&leaf_in);
        let mid_node = graph.mknode(&mid);
        let root_node = graph.mknode(&root);

        let leaf_edge = graph.mkedge(
            Rule::Named("make_mid".into()),
            None,
            Box::new(BasicEnvironment::new()),
        );
        graph.set_outputs(leaf_edge, vec![mid_node], vec![]);
        graph.set_inputs(leaf_edge, vec![leaf_in_node], vec![], vec![]);

        let root_edge = graph.mkedge(
            Rule::Named("make_root".into()),
            None,
            Box::new(BasicEnvironment::new()),
        );
        graph.set_outputs(root_edge, vec![root_node], vec![]);
        graph.set_inputs(root_edge, vec![mid_node], vec![], vec![]);

        let mut scheduler = Scheduler::new();
        scheduler.add_subtarget(&mut graph, root_node).unwrap();

        // Only the leaf edge is immediately ready; root_edge is blocked on
        // mid_node (nblock == 1) until leaf_edge completes.
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.pop(), Some(leaf_edge));
        assert_eq!(graph.edge(root_edge).nblock, 1);

        scheduler.unblock(&mut graph, root_edge);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.pop(), Some(root_edge));
    }

    #[test]
    fn pool_at_capacity_defers_to_overflow() {
        let mut graph = Graph::new();
        let pool = graph.mkpool("limited", 1);

        let env = || Box::new(BasicEnvironment::new());
        let e1 = graph.mkedge(Rule::Named("r".into()), Some(pool), env());
        let e2 = graph.mkedge(Rule::Named("r".into()), Some(pool), env());

        let mut scheduler = Scheduler::new();
        scheduler.admit(&mut graph, e1);
        scheduler.admit(&mut graph, e2);

        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.pop(), Some(e1));
        assert_eq!(graph.pool(pool).running, 1);
        assert_eq!(graph.pool(pool).overflow.len(), 1);

        scheduler.complete_pool(&mut graph, pool);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.pop(), Some(e2));
    }

    #[test]
    fn order_only_input_with_dirty_generator_is_scheduled() {
        let dir = tempdir().unwrap();
        let order_only = dir.path().join("order.txt");
        let output = dir.path().join("out.txt");
        // Neither file exists yet: both the edge and the generator of its
        // order-only input are dirty.

        let mut graph = Graph::new();
        let order_node = graph.mknode(&order_only);
        let out_node = graph.mknode(&output);

        let generator = graph.mkedge(
            Rule::Named("make_order_only".into()),
            None,
            Box::new(BasicEnvironment::new()),
        );
        graph.set_outputs(generator, vec![order_node], vec![]);
        graph.set_inputs(generator, vec![], vec![], vec![]);

        let edge = graph.mkedge(
            Rule::Named("cmd".into()),
            None,
            Box::new(BasicEnvironment::new()),
        );
        graph.set_outputs(edge, vec![out_node], vec![]);
        // Order-only: doesn't make `edge` dirty by itself, but its own
        // generator must still be scheduled since it's dirty.
        graph.set_inputs(edge, vec![], vec![], vec![order_node]);

        let mut scheduler = Scheduler::new();
        scheduler.add_subtarget(&mut graph, out_node).unwrap();

        // `edge` is dirty (its output is missing) but blocked on its dirty
        // order-only input, so only the generator is ready yet.
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.pop(), Some(generator));
        assert_eq!(graph.edge(edge).nblock, 1);

        scheduler.unblock(&mut graph, edge);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.pop(), Some(edge));
    }

    #[test]
    fn unblock_on_a_never_scheduled_edge_is_a_no_op() {
        // An edge reachable via `record_use` (every input of every
        // analyzed edge, dirty or not) may never have been scheduled at
        // all, so its `nblock` can already be 0 when `unblock` is called
        // on it -- e.g. a non-dirty edge whose order-only input happens to
        // be dirty. This must not panic or underflow.
        let mut graph = Graph::new();
        let out_node = graph.mknode("out.txt");
        let edge = graph.mkedge(
            Rule::Named("cmd".into()),
            None,
            Box::new(BasicEnvironment::new()),
        );
        graph.set_outputs(edge, vec![out_node], vec![]);
        graph.set_inputs(edge, vec![], vec![], vec![]);
        assert_eq!(graph.edge(edge).nblock, 0);

        let mut scheduler = Scheduler::new();
        scheduler.unblock(&mut graph, edge);

        assert!(scheduler.is_empty());
        assert_eq!(graph.edge(edge).nblock, 0);
    }
}
