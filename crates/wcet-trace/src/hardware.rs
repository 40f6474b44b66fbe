//! Hardware address traces.
//!
//! Line-oriented records of the form `<time>: ... <pc>` where the program
//! counter is an 11-character hex field. Samples are mapped to basic
//! blocks through a caller-supplied address map; instruction decoding is
//! out of scope.

use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::debug;
use wcet_graph::VertexId;

use crate::{Result, TraceError};

static RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+):.*?([0-9a-fA-F]{11})\s*$")
        .unwrap_or_else(|_| unreachable!("the record pattern is valid"))
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressSample {
    pub time: u64,
    pub address: u64,
}

/// Parse every record of a hardware trace. Blank lines are skipped;
/// anything else that does not match the record shape is an error.
pub fn parse_hardware_trace(content: &str) -> Result<Vec<AddressSample>> {
    let mut samples = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let captures = RECORD.captures(line).ok_or_else(|| {
            TraceError::MalformedRecord {
                line: line.to_owned(),
                reason: "expected '<time>: ... <11-char hex pc>'".to_owned(),
            }
        })?;
        let time = captures[1].parse().map_err(|_| TraceError::MalformedRecord {
            line: line.to_owned(),
            reason: format!("malformed time field '{}'", &captures[1]),
        })?;
        let address =
            u64::from_str_radix(&captures[2], 16).map_err(|_| TraceError::MalformedRecord {
                line: line.to_owned(),
                reason: format!("malformed pc field '{}'", &captures[2]),
            })?;
        samples.push(AddressSample { time, address });
    }
    Ok(samples)
}

/// Map address samples to the basic blocks they fall in. Samples at
/// unmapped addresses are dropped.
pub fn map_samples(
    samples: &[AddressSample],
    addresses: &FxHashMap<u64, VertexId>,
) -> Vec<(u64, VertexId)> {
    let mut run = Vec::new();
    for sample in samples {
        match addresses.get(&sample.address) {
            Some(block) => run.push((sample.time, *block)),
            None => debug!("dropping sample at unmapped address {:#x}", sample.address),
        }
    }
    run
}
