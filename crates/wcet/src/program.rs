//! Program description files.
//!
//! A plain-text format, one section per function:
//!
//! ```text
//! main
//! 1-2
//! 1-3
//! 2-4
//! 3-4
//! 2-helper
//! 1.instrument=true
//! 2.wcet=10
//! 2.loop_bound=(8)
//!
//! helper
//! 5-6
//! ```
//!
//! A bare identifier starts a function. `pred-succ` lines with a numeric
//! right-hand side are control flow edges; a named right-hand side is a
//! call from that basic block. Property lines attach to a vertex
//! (`id.property=value`) or an edge (`id1-id2.property=value`).

use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use wcet_graph::{ProgramPoint, VertexId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgramFormatError {
    #[error("line {line}: '{token}' appears outside a function section")]
    OutsideFunction { line: usize, token: String },
    #[error("line {line}: malformed edge '{token}' in function '{function}'")]
    MalformedEdge {
        line: usize,
        function: String,
        token: String,
    },
    #[error("line {line}: unknown property '{name}' in function '{function}'")]
    UnknownProperty {
        line: usize,
        function: String,
        name: String,
    },
    #[error("line {line}: malformed value '{value}' for property '{name}'")]
    MalformedValue {
        line: usize,
        name: String,
        value: String,
    },
    #[error("line {line}: function '{name}' defined twice")]
    DuplicateFunction { line: usize, name: String },
}

/// One function section of a program description.
#[derive(Clone, Debug, Default)]
pub struct FunctionDescription {
    pub name: String,
    pub edges: Vec<(VertexId, VertexId)>,
    pub calls: Vec<(VertexId, String)>,
    pub instrumented: FxHashSet<VertexId>,
    pub wcets: FxHashMap<ProgramPoint, u64>,
    pub loop_bounds: FxHashMap<VertexId, Vec<u64>>,
}

impl FunctionDescription {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// Basic block ids mentioned by the section, sorted.
    pub fn blocks(&self) -> Vec<VertexId> {
        let mut blocks: Vec<VertexId> = self
            .edges
            .iter()
            .flat_map(|(p, s)| [*p, *s])
            .chain(self.calls.iter().map(|(site, _)| *site))
            .collect();
        blocks.sort_unstable();
        blocks.dedup();
        blocks
    }
}

/// A parsed program description: function sections in file order.
#[derive(Clone, Debug)]
pub struct Program {
    name: String,
    functions: Vec<FunctionDescription>,
}

impl Program {
    pub fn parse(
        name: impl Into<String>,
        content: &str,
    ) -> std::result::Result<Self, ProgramFormatError> {
        let mut functions: Vec<FunctionDescription> = Vec::new();
        for (index, raw) in content.lines().enumerate() {
            let line = index + 1;
            let text = raw.trim();
            if text.is_empty() || text.starts_with("//") {
                continue;
            }
            if let Some((lhs, value)) = text.split_once('=') {
                let Some(function) = functions.last_mut() else {
                    return Err(ProgramFormatError::OutsideFunction {
                        line,
                        token: text.to_owned(),
                    });
                };
                parse_property(function, line, lhs.trim(), value.trim())?;
            } else if text.contains('-') {
                let Some(function) = functions.last_mut() else {
                    return Err(ProgramFormatError::OutsideFunction {
                        line,
                        token: text.to_owned(),
                    });
                };
                parse_edge(function, line, text)?;
            } else {
                if functions.iter().any(|f| f.name == text) {
                    return Err(ProgramFormatError::DuplicateFunction {
                        line,
                        name: text.to_owned(),
                    });
                }
                functions.push(FunctionDescription::new(text));
            }
        }
        Ok(Self {
            name: name.into(),
            functions,
        })
    }

    pub fn from_path(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map_or_else(|| "program".to_owned(), |s| s.to_string_lossy().into_owned());
        Ok(Self::parse(name, &content)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDescription> {
        self.functions.iter()
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDescription> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn number_of_functions(&self) -> usize {
        self.functions.len()
    }
}

fn parse_edge(
    function: &mut FunctionDescription,
    line: usize,
    text: &str,
) -> std::result::Result<(), ProgramFormatError> {
    let malformed = || ProgramFormatError::MalformedEdge {
        line,
        function: function.name.clone(),
        token: text.to_owned(),
    };
    let (lhs, rhs) = text.split_once('-').ok_or_else(malformed)?;
    let pred: VertexId = lhs.trim().parse().map_err(|_| malformed())?;
    let rhs = rhs.trim();
    if let Ok(succ) = rhs.parse::<VertexId>() {
        function.edges.push((pred, succ));
    } else if !rhs.is_empty() && rhs.chars().all(|c| c.is_alphanumeric() || c == '_') {
        function.calls.push((pred, rhs.to_owned()));
    } else {
        return Err(malformed());
    }
    Ok(())
}

fn parse_property(
    function: &mut FunctionDescription,
    line: usize,
    lhs: &str,
    value: &str,
) -> std::result::Result<(), ProgramFormatError> {
    let Some((point, name)) = lhs.rsplit_once('.') else {
        return Err(ProgramFormatError::UnknownProperty {
            line,
            function: function.name.clone(),
            name: lhs.to_owned(),
        });
    };
    let malformed = |name: &str| ProgramFormatError::MalformedValue {
        line,
        name: name.to_owned(),
        value: value.to_owned(),
    };
    let point = parse_point(point).ok_or_else(|| malformed(name))?;
    match name {
        "instrument" => {
            let flag: bool = value.parse().map_err(|_| malformed(name))?;
            let Some(id) = point.basic_block() else {
                return Err(malformed(name));
            };
            if flag {
                function.instrumented.insert(id);
            }
        }
        "wcet" => {
            let cost: u64 = value.parse().map_err(|_| malformed(name))?;
            function.wcets.insert(point, cost);
        }
        "loop_bound" => {
            let Some(id) = point.basic_block() else {
                return Err(malformed(name));
            };
            let inner = value
                .strip_prefix('(')
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| malformed(name))?;
            let bounds: std::result::Result<Vec<u64>, _> = inner
                .split(',')
                .map(|b| b.trim().parse::<u64>())
                .collect();
            let bounds = bounds.map_err(|_| malformed(name))?;
            function.loop_bounds.insert(id, bounds);
        }
        other => {
            return Err(ProgramFormatError::UnknownProperty {
                line,
                function: function.name.clone(),
                name: other.to_owned(),
            });
        }
    }
    Ok(())
}

fn parse_point(text: &str) -> Option<ProgramPoint> {
    if let Some((a, b)) = text.split_once('-') {
        let pred = a.trim().parse().ok()?;
        let succ = b.trim().parse().ok()?;
        Some(ProgramPoint::Edge(pred, succ))
    } else {
        text.trim().parse().ok().map(ProgramPoint::BasicBlock)
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
2.wcet=10
1-2.wcet=3

helper
5-6
5.loop_bound=(8)
";

    #[test]
    fn test_sections_edges_and_calls() {
        let program = Program::parse("sample", SAMPLE).unwrap();
        assert_eq!(program.number_of_functions(), 2);
        let main = program.function("main").unwrap();
        assert_eq!(main.edges.len(), 4);
        assert_eq!(main.calls, vec![(2, "helper".to_owned())]);
        assert_eq!(main.blocks(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_properties() {
        let program = Program::parse("sample", SAMPLE).unwrap();
        let main = program.function("main").unwrap();
        assert!(main.instrumented.contains(&1));
        assert!(main.instrumented.contains(&4));
        assert!(!main.instrumented.contains(&2));
        assert_eq!(main.wcets.get(&ProgramPoint::BasicBlock(2)), Some(&10));
        assert_eq!(main.wcets.get(&ProgramPoint::Edge(1, 2)), Some(&3));
        let helper = program.function("helper").unwrap();
        assert_eq!(helper.loop_bounds.get(&5), Some(&vec![8]));
    }

    #[test]
    fn test_edge_before_function_is_an_error() {
        let err = Program::parse("bad", "1-2\n").unwrap_err();
        assert!(matches!(err, ProgramFormatError::OutsideFunction { line: 1, .. }));
    }

    #[test]
    fn test_malformed_edge_names_the_token() {
        let err = Program::parse("bad", "f\n1-\n").unwrap_err();
        assert!(matches!(
            err,
            ProgramFormatError::MalformedEdge { line: 2, .. }
        ));
    }

    #[test]
    fn test_unknown_property_is_rejected() {
        let err = Program::parse("bad", "f\n1-2\n1.colour=red\n").unwrap_err();
        assert!(matches!(
            err,
            ProgramFormatError::UnknownProperty { name, .. } if name == "colour"
        ));
    }

    #[test]
    fn test_duplicate_function_is_rejected() {
        let err = Program::parse("bad", "f\n1-2\nf\n").unwrap_err();
        assert!(matches!(
            err,
            ProgramFormatError::DuplicateFunction { line: 3, .. }
        ));
    }

    #[test]
    fn test_malformed_loop_bound_value() {
        let err = Program::parse("bad", "f\n1-2\n1.loop_bound=8\n").unwrap_err();
        assert!(matches!(err, ProgramFormatError::MalformedValue { .. }));
    }
}
