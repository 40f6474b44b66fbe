//! Program trace files.
//!
//! The first line is a magic number tying the file to the program it was
//! traced from; it is checked before any vertex id is processed. After it,
//! `=>` opens a run, whitespace-separated vertex ids follow, and `<=`
//! closes the run.

use std::hash::{Hash, Hasher};
use std::path::Path;

use rustc_hash::FxHasher;
use wcet_graph::VertexId;

use crate::{Result, TraceError};

const RUN_OPEN: &str = "=>";
const RUN_CLOSE: &str = "<=";

/// The magic number of a program's trace files: the 64-bit hash of the
/// program name, in lowercase hex.
pub fn magic_number(program: &str) -> String {
    let mut hasher = FxHasher::default();
    program.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Parse the runs of a trace file, verifying the magic number first.
pub fn parse_trace(program: &str, content: &str) -> Result<Vec<Vec<VertexId>>> {
    let mut lines = content.lines();
    let found = lines.next().ok_or(TraceError::MissingMagic)?.trim();
    let expected = magic_number(program);
    if found != expected {
        return Err(TraceError::MagicMismatch {
            program: program.to_owned(),
            expected,
            found: found.to_owned(),
        });
    }

    let mut runs = Vec::new();
    let mut current: Option<Vec<VertexId>> = None;
    for line in lines {
        for token in line.split_whitespace() {
            match token {
                RUN_OPEN => {
                    if current.is_some() {
                        return Err(TraceError::MalformedRecord {
                            line: line.to_owned(),
                            reason: "run opened inside a run".to_owned(),
                        });
                    }
                    current = Some(Vec::new());
                }
                RUN_CLOSE => match current.take() {
                    Some(run) => runs.push(run),
                    None => {
                        return Err(TraceError::MalformedRecord {
                            line: line.to_owned(),
                            reason: "run closed without an open run".to_owned(),
                        });
                    }
                },
                token => {
                    let id: VertexId = token.parse().map_err(|_| {
                        TraceError::MalformedId {
                            token: token.to_owned(),
                        }
                    })?;
                    match current.as_mut() {
                        Some(run) => run.push(id),
                        None => {
                            return Err(TraceError::MalformedRecord {
                                line: line.to_owned(),
                                reason: "vertex id outside a run".to_owned(),
                            });
                        }
                    }
                }
            }
        }
    }
    if current.is_some() {
        return Err(TraceError::MalformedRecord {
            line: String::new(),
            reason: "unterminated run at end of file".to_owned(),
        });
    }
    Ok(runs)
}

pub fn read_trace_file(program: &str, path: &Path) -> Result<Vec<Vec<VertexId>>> {
    let content = std::fs::read_to_string(path)?;
    parse_trace(program, &content)
}

/// Render runs into the trace file format, magic number included.
pub fn render_trace(program: &str, runs: &[Vec<VertexId>]) -> String {
    let mut out = magic_number(program);
    out.push('\n');
    for run in runs {
        out.push_str(RUN_OPEN);
        for id in run {
            out.push(' ');
            out.push_str(&id.to_string());
        }
        out.push(' ');
        out.push_str(RUN_CLOSE);
        out.push('\n');
    }
    out
}
