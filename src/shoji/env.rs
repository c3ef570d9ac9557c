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

//! The glue contracts of spec §4.E. Variable expansion and environment
//! scoping belong to the manifest parser, which is out of scope (spec §1);
//! the core only ever needs to resolve a single already-expanded variable
//! by name on a particular edge. `Environment` is that one touchpoint.

use std::collections::HashMap;
use std::fmt;

/// Resolves rule variables for a single edge. Implementations are expected
/// to already have performed any `$in`/`$out`/template expansion; the core
/// never interprets the value it gets back.
pub trait Environment: fmt::Debug {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// A flat string-to-string environment, useful for tests and for the
/// crate's own toy manifest reader. Real deployments would plug in a
/// scoped, template-expanding environment instead.
#[derive(Debug, Default, Clone)]
pub struct BasicEnvironment {
    vars: HashMap<String, String>,
}

impl BasicEnvironment {
    pub fn new() -> Self {
        BasicEnvironment::default()
    }

    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl Environment for BasicEnvironment {
    fn lookup(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_environment_lookup() {
        let mut env = BasicEnvironment::new();
        env.set("command", "touch $out");
        assert_eq!(env.lookup("command").as_deref(), Some("touch $out"));
        assert_eq!(env.lookup("missing"), None);
    }
}
