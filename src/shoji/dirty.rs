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

//! The dirty analyzer (spec §4.B): computes `nblock` for an edge and
//! `dirty` for every output reachable from it, recursing into the
//! generating edges of its inputs.

use log::debug;

use crate::graph::{is_newer, EdgeIndex, Graph, MTime, Timestamp};

/// Computes `edge.nblock` and `dirty` for every node reachable from it.
/// Short-circuits if `edge` was already stat-analyzed this build.
pub fn analyze(graph: &mut Graph, edge: EdgeIndex) {
    if graph.edge(edge).mark.stat_analyzed {
        return;
    }
    graph.edge_mut(edge).mark.stat_analyzed = true;

    let outputs = graph.edge(edge).outputs.clone();
    for &n in &outputs {
        if graph.node(n).mtime.is_unknown() {
            let _ = graph.nodestat(n);
        }
    }

    let inputs = graph.edge(edge).inputs.clone();
    let in_order_idx = graph.edge(edge).in_order_idx;

    let mut dirty = false;
    let mut newest: Option<Timestamp> = None;

    for (i, &n) in inputs.iter().enumerate() {
        graph.record_use(n, edge);

        if graph.node(n).mtime.is_unknown() {
            let _ = graph.nodestat(n);

            if let Some(gen) = graph.node(n).gen {
                analyze(graph, gen);
            } else {
                let missing = graph.node(n).mtime.is_missing();
                graph.node_mut(n).dirty = missing;
            }
        }

        if !dirty && i < in_order_idx {
            let node = graph.node(n);
            if node.dirty {
                dirty = true;
            } else if !node.mtime.is_missing() {
                if let MTime::Valid(ts) = node.mtime {
                    if !is_newer(newest, ts) {
                        newest = Some(ts);
                    }
                }
            }
        }
    }

    if !dirty {
        let is_phony = graph.edge(edge).rule.is_phony();
        let has_inputs = !inputs.is_empty();

        for &n in &outputs {
            if is_phony && has_inputs {
                continue;
            }

            let node = graph.node(n);
            let newer_than_output = match node.mtime {
                MTime::Valid(ts) => !is_phony && is_newer(newest, ts),
                _ => false,
            };

            if node.mtime.is_missing() || newer_than_output {
                dirty = true;
                break;
            }
        }
    }

    for &n in &outputs {
        graph.node_mut(n).dirty = dirty;
    }

    if dirty {
        let nblock = inputs.iter().filter(|&&n| graph.node(n).dirty).count();
        graph.edge_mut(edge).nblock = nblock;

        debug!(
            "edge for {:?} is dirty, blocked on {} input(s)",
            outputs
                .first()
                .map(|&n| graph.node(n).path.clone())
                .unwrap_or_default(),
            nblock
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::BasicEnvironment;
    use crate::graph::Rule;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &std::path::Path) {
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn clean_edge_has_no_dirty_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        touch(&input);
        // Ensure output is strictly newer than input.
        filetime_touch_later(&output);
        touch(&output);

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

        analyze(&mut graph, edge);

        assert!(!graph.node(out_node).dirty);
        assert_eq!(graph.edge(edge).nblock, 0);
    }

    #[test]
    fn stale_output_is_dirty() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        touch(&output);
        filetime_touch_later(&input);
        touch(&input);

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

        analyze(&mut graph, edge);

        assert!(graph.node(out_node).dirty);
        assert_eq!(graph.edge(edge).nblock, 0);
    }

    #[test]
    fn order_only_newer_input_does_not_dirty() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let order_only = dir.path().join("order.txt");
        let output = dir.path().join("out.txt");
        touch(&input);
        filetime_touch_later(&output);
        touch(&output);
        filetime_touch_later(&order_only);
        touch(&order_only);

        let mut graph = Graph::new();
        let in_node = graph.mknode(&input);
        let order_node = graph.mknode(&order_only);
        let out_node = graph.mknode(&output);
        let edge = graph.mkedge(
            Rule::Named("touch".into()),
            None,
            Box::new(BasicEnvironment::new()),
        );
        graph.set_outputs(edge, vec![out_node], vec![]);
        graph.set_inputs(edge, vec![in_node], vec![], vec![order_node]);

        analyze(&mut graph, edge);

        assert!(!graph.node(out_node).dirty);
    }

    #[test]
    fn missing_input_with_generator_recurses() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root.txt");
        let mid = dir.path().join("mid.txt");
        let leaf = dir.path().join("leaf.txt");
        touch(&leaf);
        // mid is never created: it's missing, and has a generator.

        let mut graph = Graph::new();
        let leaf_node = graph.mknode(&leaf);
        let mid_node = graph.mknode(&mid);
        let root_node = graph.mknode(&root);

        let mid_edge = graph.mkedge(
            Rule::Named("make_mid".into()),
            None,
            Box::new(BasicEnvironment::new()),
        );
        graph.set_outputs(mid_edge, vec![mid_node], vec![]);
        graph.set_inputs(mid_edge, vec![leaf_node], vec![], vec![]);

        let root_edge = graph.mkedge(
            Rule::Named("make_root".into()),
            None,
            Box::new(BasicEnvironment::new()),
        );
        graph.set_outputs(root_edge, vec![root_node], vec![]);
        graph.set_inputs(root_edge, vec![mid_node], vec![], vec![]);

        analyze(&mut graph, root_edge);

        assert!(graph.node(mid_node).dirty);
        assert!(graph.node(root_node).dirty);
        assert!(graph.edge(mid_edge).mark.stat_analyzed);
    }

    #[test]
    fn analysis_is_idempotent() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        touch(&output);
        filetime_touch_later(&input);
        touch(&input);

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

        analyze(&mut graph, edge);
        let nblock_1 = graph.edge(edge).nblock;
        let dirty_1 = graph.node(out_node).dirty;

        analyze(&mut graph, edge);
        let nblock_2 = graph.edge(edge).nblock;
        let dirty_2 = graph.node(out_node).dirty;

        assert_eq!(nblock_1, nblock_2);
        assert_eq!(dirty_1, dirty_2);
    }

    /// Sleeps a hair so that a subsequently-written file is guaranteed a
    /// strictly later mtime on filesystems with coarse timestamp
    /// resolution.
    fn filetime_touch_later(path: &std::path::Path) {
        let _ = path;
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
}
