//! Trace command: replay a trace file against the analysed program and
//! report the surviving execution conjectures.

use std::path::Path;

use tracing::{error, info, warn};
use wcet::{Analysis, Program, WcetData};
use wcet_trace::{BlockKey, falsify_runs, falsify_runs_with_ipg, read_trace_file};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};

pub fn cmd_trace(path: &Path, traces: &Path, over_ipg: bool) -> i32 {
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

    let Some(target) = analysis.root_function() else {
        error!("'{}' describes no functions", program.name());
        return EXIT_FAILURE;
    };

    let runs = match read_trace_file(program.name(), traces) {
        Ok(runs) => runs,
        Err(error) => {
            error!("failed to read trace file: {error}");
            return EXIT_FAILURE;
        }
    };
    if runs.is_empty() {
        warn!("trace file holds no runs");
        return EXIT_SUCCESS;
    }
    info!("replaying {} runs against '{}'", runs.len(), target.name);

    let state = if over_ipg {
        let Some(ipg) = &target.ipg else {
            error!(
                "'{}' has no ipg (ambiguous edge labels); rerun without --ipg \
                 to use the super block strategy",
                target.name
            );
            return EXIT_FAILURE;
        };
        falsify_runs_with_ipg(ipg, &target.superblocks, &runs)
    } else {
        falsify_runs(&target.superblocks, &target.instrumented, &runs)
    };

    for subgraph in target.superblocks.forward_subgraphs() {
        for block in subgraph.blocks() {
            let key = BlockKey {
                header: subgraph.header(),
                block: block.id,
            };
            match state.minimum(key) {
                Some(Some(minimum)) => info!(
                    "super block {} of region {}: executes at least {minimum} times",
                    block.id,
                    subgraph.header()
                ),
                Some(None) => info!(
                    "super block {} of region {}: never bounded by any run",
                    block.id,
                    subgraph.header()
                ),
                None => {}
            }
        }
    }
    info!("{} exclusion conjectures survive", state.number_of_exclusions());
    for (a, b) in state.exclusions() {
        info!(
            "blocks {} and {} of region {} never execute in the same run",
            a.block, b.block, a.header
        );
    }

    if let Some(desc) = program.function(&target.name) {
        let data = WcetData::export(desc, target, Some(&state));
        for header in target.lnt.headers_bottom_up() {
            if header == target.lnt.root() {
                continue;
            }
            if let Some(bound) = data.observed_bound(header) {
                info!("loop {header}: observed bound {bound}");
            }
        }
    }
    EXIT_SUCCESS
}
