//! Analyze command: build every analysis structure of a program
//! description and report on them.

use std::path::Path;

use tracing::{error, info, warn};
use wcet::{Analysis, FunctionAnalysis, Program, WcetData};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};

pub fn cmd_analyze(path: &Path, function: Option<&str>) -> i32 {
    let program = match Program::from_path(path) {
        Ok(program) => program,
        Err(error) => {
            error!("failed to read program description: {error}");
            return EXIT_FAILURE;
        }
    };

    let analysis = match Analysis::build(&program) {
        Ok(analysis) => analysis,
        Err(error) => {
            error!("analysis of '{}' failed: {error}", program.name());
            return EXIT_FAILURE;
        }
    };

    info!(
        "analysed '{}': {} functions, {} calls",
        program.name(),
        program.number_of_functions(),
        analysis.call_graph().calls().count()
    );

    if let Some(name) = function {
        let Some(target) = analysis.function(name) else {
            error!("no function '{name}' in '{}'", program.name());
            return EXIT_FAILURE;
        };
        report(&program, target);
    } else {
        for target in analysis.functions() {
            report(&program, target);
        }
    }
    EXIT_SUCCESS
}

fn report(program: &Program, analysis: &FunctionAnalysis) {
    info!(
        "{}: {} vertices, {} edges, entry {}, exit {}",
        analysis.name,
        analysis.cfg.number_of_vertices(),
        analysis.cfg.number_of_edges(),
        analysis.cfg.entry(),
        analysis.cfg.exit()
    );
    match &analysis.ipg {
        Some(ipg) => info!(
            "{}: {} instrumentation points, {} ipg edges",
            analysis.name,
            analysis.instrumented.len(),
            ipg.number_of_edges()
        ),
        None => warn!(
            "{}: {} instrumentation points, no ipg (ambiguous edge labels)",
            analysis.name,
            analysis.instrumented.len()
        ),
    }

    let data = program
        .function(&analysis.name)
        .map(|desc| WcetData::export(desc, analysis, None));
    for header in analysis.lnt.headers_bottom_up() {
        if header == analysis.lnt.root() {
            continue;
        }
        let iteration = analysis
            .ipg
            .as_ref()
            .map_or(0, |ipg| ipg.iteration_edges(header).count());
        let bound = data
            .as_ref()
            .and_then(|d| d.loop_bound(header))
            .map_or_else(|| "unbounded".to_owned(), |b| format!("{b:?}"));
        info!(
            "{}: loop {header} at level {}, {iteration} iteration edges, bound {bound}",
            analysis.name,
            analysis.lnt.level(header).unwrap_or(0)
        );
    }

    for subgraph in analysis.superblocks.forward_subgraphs() {
        info!(
            "{}: region {} has {} super blocks",
            analysis.name,
            subgraph.header(),
            subgraph.number_of_blocks()
        );
    }
}
