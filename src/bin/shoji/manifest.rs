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

//! A deliberately small build-file reader, just enough to drive `shoji`'s
//! graph/dirty/job core from the command line for manual testing. This is
//! not a Ninja manifest parser (variable expansion, includes, and build
//! logs are all out of scope for this crate); it understands exactly
//! four stanzas:
//!
//! ```text
//! pool <name> <depth>
//! rule <name>
//!   command = ...
//!   rspfile = ...
//!   rspfile_content = ...
//! build <outputs...> : <rule> <inputs...> [| implicit...] [|| order-only...]
//!   pool = <name>
//! default <targets...>
//! ```
//!
//! Each `key = value` line belongs to the most recently started `rule` or
//! `build` stanza and ends at the next blank line or top-level keyword.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use failure::Fail;
use shoji::{BasicEnvironment, Graph};

#[derive(Debug, Fail)]
pub enum ManifestError {
    #[fail(display = "{}", _0)]
    Io(#[cause] std::io::Error),

    #[fail(display = "line {}: {}", _0, _1)]
    Syntax(usize, String),

    #[fail(display = "build statement references unknown rule '{}'", _0)]
    UnknownRule(String),

    #[fail(display = "build statement references unknown pool '{}'", _0)]
    UnknownPool(String),
}

impl From<std::io::Error> for ManifestError {
    fn from(err: std::io::Error) -> Self {
        ManifestError::Io(err)
    }
}

struct RuleDef {
    vars: HashMap<String, String>,
}

enum Pending {
    None,
    Rule(String),
    Build {
        outputs: Vec<PathBuf>,
        rule: String,
        explicit: Vec<PathBuf>,
        implicit: Vec<PathBuf>,
        order_only: Vec<PathBuf>,
        vars: HashMap<String, String>,
    },
}

/// Parses `path` and populates `graph`, returning the default targets (or
/// every build statement's explicit outputs, if none were declared).
pub fn load(
    graph: &mut Graph,
    path: &Path,
) -> Result<Vec<PathBuf>, ManifestError> {
    let text = fs::read_to_string(path)?;

    let mut rules: HashMap<String, RuleDef> = HashMap::new();
    let mut pools: HashMap<String, usize> = HashMap::new();
    let mut defaults: Vec<PathBuf> = Vec::new();
    let mut all_outputs: Vec<PathBuf> = Vec::new();
    let mut pending = Pending::None;

    for (lineno, raw) in text.lines().enumerate() {
        let lineno = lineno + 1;
        let indented = raw.starts_with(' ') || raw.starts_with('\t');
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if indented {
            let (key, value) = split_kv(line)
                .ok_or_else(|| ManifestError::Syntax(lineno, format!("expected 'key = value', got '{}'", line)))?;
            match &mut pending {
                Pending::Rule(name) => {
                    rules.get_mut(name).unwrap().vars.insert(key, value);
                }
                Pending::Build { vars, .. } => {
                    vars.insert(key, value);
                }
                Pending::None => {
                    return Err(ManifestError::Syntax(
                        lineno,
                        "indented line outside of a rule or build stanza".into(),
                    ));
                }
            }
            continue;
        }

        // A new top-level statement closes out whatever came before it.
        finish_pending(
            graph,
            &rules,
            &pools,
            std::mem::replace(&mut pending, Pending::None),
            &mut all_outputs,
        )?;

        let mut words = line.split_whitespace();
        match words.next() {
            Some("pool") => {
                let name = words
                    .next()
                    .ok_or_else(|| ManifestError::Syntax(lineno, "pool: missing name".into()))?;
                let depth: usize = words
                    .next()
                    .ok_or_else(|| ManifestError::Syntax(lineno, "pool: missing depth".into()))?
                    .parse()
                    .map_err(|_| ManifestError::Syntax(lineno, "pool: depth must be a number".into()))?;
                pools.insert(name.to_string(), depth);
            }
            Some("rule") => {
                let name = words
                    .next()
                    .ok_or_else(|| ManifestError::Syntax(lineno, "rule: missing name".into()))?;
                rules.insert(
                    name.to_string(),
                    RuleDef {
                        vars: HashMap::new(),
                    },
                );
                pending = Pending::Rule(name.to_string());
            }
            Some("build") => {
                let rest = line["build".len()..].trim();
                let mut halves = rest.splitn(2, ':');
                let outs_str = halves
                    .next()
                    .ok_or_else(|| ManifestError::Syntax(lineno, "build: missing ':'".into()))?;
                let tail = halves
                    .next()
                    .ok_or_else(|| ManifestError::Syntax(lineno, "build: missing ':'".into()))?;
                let outputs: Vec<PathBuf> =
                    outs_str.split_whitespace().map(PathBuf::from).collect();

                let mut tail_words = tail.split_whitespace();
                let rule = tail_words
                    .next()
                    .ok_or_else(|| ManifestError::Syntax(lineno, "build: missing rule".into()))?
                    .to_string();

                let mut explicit = Vec::new();
                let mut implicit = Vec::new();
                let mut order_only = Vec::new();
                let mut seen_pipe = 0;
                for word in tail_words {
                    match word {
                        "|" => seen_pipe = 1,
                        "||" => seen_pipe = 2,
                        _ => match seen_pipe {
                            0 => explicit.push(PathBuf::from(word)),
                            1 => implicit.push(PathBuf::from(word)),
                            _ => order_only.push(PathBuf::from(word)),
                        },
                    }
                }

                pending = Pending::Build {
                    outputs,
                    rule,
                    explicit,
                    implicit,
                    order_only,
                    vars: HashMap::new(),
                };
            }
            Some("default") => {
                defaults.extend(words.map(PathBuf::from));
            }
            Some(other) => {
                return Err(ManifestError::Syntax(
                    lineno,
                    format!("unknown statement '{}'", other),
                ));
            }
            None => unreachable!(),
        }
    }

    finish_pending(graph, &rules, &pools, pending, &mut all_outputs)?;

    if defaults.is_empty() {
        Ok(all_outputs)
    } else {
        Ok(defaults)
    }
}

fn finish_pending(
    graph: &mut Graph,
    rules: &HashMap<String, RuleDef>,
    pools: &HashMap<String, usize>,
    pending: Pending,
    all_outputs: &mut Vec<PathBuf>,
) -> Result<(), ManifestError> {
    if let Pending::Build {
        outputs,
        rule,
        explicit,
        implicit,
        order_only,
        vars,
    } = pending
    {
        let rule_def = rules
            .get(&rule)
            .ok_or_else(|| ManifestError::UnknownRule(rule.clone()))?;

        let mut env = BasicEnvironment::new();
        for (k, v) in &rule_def.vars {
            env.set(k.clone(), v.clone());
        }
        for (k, v) in &vars {
            env.set(k.clone(), v.clone());
        }

        let pool = match vars.get("pool") {
            Some(name) => {
                if !pools.contains_key(name) {
                    return Err(ManifestError::UnknownPool(name.clone()));
                }
                Some(graph.mkpool(name.clone(), pools[name]))
            }
            None => None,
        };

        let out_nodes: Vec<_> = outputs.iter().map(|p| graph.mknode(p)).collect();
        let in_explicit: Vec<_> = explicit.iter().map(|p| graph.mknode(p)).collect();
        let in_implicit: Vec<_> = implicit.iter().map(|p| graph.mknode(p)).collect();
        let in_order: Vec<_> = order_only.iter().map(|p| graph.mknode(p)).collect();

        let edge = graph.mkedge(shoji::graph::Rule::Named(rule), pool, Box::new(env));
        graph.set_outputs(edge, out_nodes, vec![]);
        graph.set_inputs(edge, in_explicit, in_implicit, in_order);

        all_outputs.extend(outputs);
    }

    Ok(())
}

fn split_kv(line: &str) -> Option<(String, String)> {
    let idx = line.find('=')?;
    let key = line[..idx].trim().to_string();
    let value = line[idx + 1..].trim().to_string();
    Some((key, value))
}
