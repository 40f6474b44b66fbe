//! Call graphs over function names.

use rustc_hash::FxHashMap;

use crate::{GraphError, Result, VertexId};

/// A call from a basic block of the caller to a callee function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
    pub site: VertexId,
}

/// Function-level call structure. Vertices are function names; each edge is
/// keyed by the basic block of the caller that makes the call.
#[derive(Clone, Debug, Default)]
pub struct CallGraph {
    functions: Vec<String>,
    calls: Vec<CallEdge>,
    incoming: FxHashMap<String, usize>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.functions.contains(&name) {
            self.incoming.entry(name.clone()).or_insert(0);
            self.functions.push(name);
        }
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f == name)
    }

    pub fn add_call(
        &mut self,
        caller: &str,
        callee: &str,
        site: VertexId,
    ) -> Result<()> {
        for name in [caller, callee] {
            if !self.has_function(name) {
                return Err(GraphError::UnknownFunction {
                    name: name.to_owned(),
                });
            }
        }
        *self.incoming.entry(callee.to_owned()).or_insert(0) += 1;
        self.calls.push(CallEdge {
            caller: caller.to_owned(),
            callee: callee.to_owned(),
            site,
        });
        Ok(())
    }

    /// Function names in insertion order.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(String::as_str)
    }

    pub fn calls(&self) -> impl Iterator<Item = &CallEdge> {
        self.calls.iter()
    }

    pub fn callees(&self, caller: &str) -> impl Iterator<Item = &CallEdge> {
        self.calls.iter().filter(move |c| c.caller == caller)
    }

    pub fn callers(&self, callee: &str) -> impl Iterator<Item = &CallEdge> {
        self.calls.iter().filter(move |c| c.callee == callee)
    }

    /// The unique function that is never called, or `None` when there is no
    /// such function or more than one.
    pub fn root(&self) -> Option<&str> {
        let mut root = None;
        for name in &self.functions {
            if self.incoming.get(name).copied().unwrap_or(0) == 0 {
                if root.is_some() {
                    return None;
                }
                root = Some(name.as_str());
            }
        }
        root
    }

    pub fn number_of_functions(&self) -> usize {
        self.functions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CallGraph {
        let mut cg = CallGraph::new();
        cg.add_function("main");
        cg.add_function("f");
        cg.add_function("g");
        cg.add_call("main", "f", 3).unwrap();
        cg.add_call("main", "g", 5).unwrap();
        cg.add_call("f", "g", 11).unwrap();
        cg
    }

    #[test]
    fn test_root_is_uncalled_function() {
        let cg = sample();
        assert_eq!(cg.root(), Some("main"));
    }

    #[test]
    fn test_root_ambiguous_when_two_functions_uncalled() {
        let mut cg = sample();
        cg.add_function("other");
        assert_eq!(cg.root(), None);
    }

    #[test]
    fn test_call_to_unknown_function_fails() {
        let mut cg = sample();
        assert!(matches!(
            cg.add_call("main", "missing", 9),
            Err(GraphError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_callees_keyed_by_call_site() {
        let cg = sample();
        let sites: Vec<VertexId> = cg.callees("main").map(|c| c.site).collect();
        assert_eq!(sites, vec![3, 5]);
        assert_eq!(cg.callers("g").count(), 2);
    }
}
