//! Per-function analysis pipeline.

use rayon::prelude::*;
use rustc_hash::FxHashSet;
use tracing::{trace_span, warn};
use wcet_graph::{CallGraph, ControlFlowGraph, LoopNestingTree, VertexId};
use wcet_ipg::Ipg;
use wcet_superblock::SuperBlockGraph;

use crate::{FunctionDescription, Program, Result};

/// Every analysis structure of one function.
#[derive(Clone, Debug)]
pub struct FunctionAnalysis {
    pub name: String,
    pub cfg: ControlFlowGraph,
    pub lnt: LoopNestingTree,
    /// `None` when the chosen instrumentation yields ambiguous edge
    /// labels. The super block structures stand on their own, so the
    /// rest of the analysis still applies.
    pub ipg: Option<Ipg>,
    pub superblocks: SuperBlockGraph,
    /// The instrumentation points actually in force: the described set
    /// restricted to surviving vertices, plus the forced entry and exit.
    pub instrumented: FxHashSet<VertexId>,
}

/// The analysed program: per-function structures plus the call graph.
/// Functions are independent, so they are built in parallel; only the
/// final assembly synchronises.
#[derive(Clone, Debug)]
pub struct Analysis {
    program: String,
    functions: Vec<FunctionAnalysis>,
    call_graph: CallGraph,
}

impl Analysis {
    pub fn build(program: &Program) -> Result<Self> {
        let descriptions: Vec<&FunctionDescription> = program.functions().collect();
        let functions: Vec<FunctionAnalysis> = descriptions
            .par_iter()
            .map(|desc| Self::build_function(desc))
            .collect::<Result<_>>()?;

        let mut call_graph = CallGraph::new();
        for desc in &descriptions {
            call_graph.add_function(&desc.name);
        }
        for desc in &descriptions {
            for (site, callee) in &desc.calls {
                call_graph.add_call(&desc.name, callee, *site)?;
            }
        }

        Ok(Self {
            program: program.name().to_owned(),
            functions,
            call_graph,
        })
    }

    fn build_function(desc: &FunctionDescription) -> Result<FunctionAnalysis> {
        let _span = trace_span!("analysis", function = %desc.name).entered();
        let mut cfg = ControlFlowGraph::from_edges(&desc.name, &desc.blocks(), &desc.edges)?;
        for (site, callee) in &desc.calls {
            if cfg.has_vertex(*site) {
                cfg.set_call_site(*site)?;
            } else {
                warn!(
                    "call to '{callee}' from pruned vertex {site} of '{}' ignored",
                    desc.name
                );
            }
        }
        let lnt = LoopNestingTree::new(&cfg);
        let mut instrumented: FxHashSet<VertexId> = desc
            .instrumented
            .iter()
            .copied()
            .filter(|v| cfg.has_vertex(*v))
            .collect();
        instrumented.insert(cfg.entry());
        instrumented.insert(cfg.exit());
        let ipg = match Ipg::build(&cfg, &lnt, &desc.instrumented) {
            Ok(ipg) => Some(ipg),
            Err(error) => {
                warn!("no ipg for '{}': {error}", desc.name);
                None
            }
        };
        let superblocks = SuperBlockGraph::build(&cfg, &lnt)?;
        Ok(FunctionAnalysis {
            name: desc.name.clone(),
            cfg,
            lnt,
            ipg,
            superblocks,
            instrumented,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionAnalysis> {
        self.functions.iter()
    }

    pub fn function(&self, name: &str) -> Option<&FunctionAnalysis> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub const fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    /// The function traces are replayed against: the unique uncalled
    /// function, falling back to the first one described.
    pub fn root_function(&self) -> Option<&FunctionAnalysis> {
        self.call_graph
            .root()
            .and_then(|name| self.function(name))
            .or_else(|| self.functions.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
main
1-2
1-3
2-4
3-4
2-helper
1.instrument=true
4.instrument=true

helper
5-6
5.instrument=true
6.instrument=true
";

    #[test]
    fn test_every_function_analysed() {
        let program = Program::parse("sample", SAMPLE).unwrap();
        let analysis = Analysis::build(&program).unwrap();
        assert_eq!(analysis.functions().count(), 2);
        assert!(analysis.function("helper").is_some());
        assert_eq!(analysis.root_function().unwrap().name, "main");
    }

    #[test]
    fn test_call_sites_recorded() {
        let program = Program::parse("sample", SAMPLE).unwrap();
        let analysis = Analysis::build(&program).unwrap();
        let main = analysis.function("main").unwrap();
        assert!(main.cfg.is_call_site(2));
        assert_eq!(analysis.call_graph().callers("helper").count(), 1);
    }

    #[test]
    fn test_entry_and_exit_forced_into_instrumentation() {
        let program = Program::parse("sample", "f\n1-2\n2-3\n").unwrap();
        let analysis = Analysis::build(&program).unwrap();
        let f = analysis.function("f").unwrap();
        assert!(f.instrumented.contains(&1));
        assert!(f.instrumented.contains(&3));
    }

    #[test]
    fn test_ambiguous_instrumentation_degrades_to_super_blocks() {
        // Both arms of main's diamond are uninstrumented, so no IPG can
        // label the (1, 4) edge; the super block structures still build.
        let program = Program::parse("sample", SAMPLE).unwrap();
        let analysis = Analysis::build(&program).unwrap();
        let main = analysis.function("main").unwrap();
        assert!(main.ipg.is_none());
        assert_eq!(main.superblocks.forward_subgraphs().count(), 1);
        let expected: FxHashSet<VertexId> = [1, 4].iter().copied().collect();
        assert_eq!(main.instrumented, expected);
        let helper = analysis.function("helper").unwrap();
        assert!(helper.ipg.is_some());
    }

    #[test]
    fn test_unknown_callee_fails() {
        let program = Program::parse("bad", "f\n1-2\n1-missing\n").unwrap();
        assert!(Analysis::build(&program).is_err());
    }
}
