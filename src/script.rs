//! Parser for benchmark scripts.
//!
//! A script is plain text. Statement lines accumulate into the current block;
//! `\benchmark` lines close the current block and open a new one:
//!
//! ```text
//! -- comments start with --, # or //
//! \benchmark once \name setup
//! CREATE TABLE t (id INT);
//!
//! \benchmark loop 0.5 \parallel \name inserts
//! INSERT INTO t VALUES ({{.Iter}});
//! ```
//!
//! Statements before the first `\benchmark` line form an implicit loop block.

use std::io::{self, BufRead};

use thiserror::Error;
use tracing::debug;

use crate::descriptor::{BenchmarkDescriptor, Mode};

const DIRECTIVE: &str = "\\benchmark";
const PARALLEL: &str = "\\parallel";
const NAME: &str = "\\name";

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: failed to parse \\benchmark line, missing mode")]
    NoMode { line: usize },

    #[error("line {line}: failed to parse mode, neither 'once' nor 'loop': {token}")]
    InvalidMode { line: usize, token: String },

    #[error("line {line}: missing name after \\name token")]
    MissingName { line: usize },

    #[error("failed to read script: {0}")]
    Io(#[from] io::Error),
}

/// Settings and statement text of the block currently being read.
struct Block {
    mode: Mode,
    ratio: f64,
    parallel: bool,
    name: Option<String>,
    statement: String,
    start_line: usize,
}

impl Block {
    fn new(mode: Mode, start_line: usize) -> Self {
        Self {
            mode,
            ratio: 1.0,
            parallel: false,
            name: None,
            statement: String::new(),
            start_line,
        }
    }

    /// Turns the block into a descriptor, or `None` when no statement was read.
    fn finish(self, end_line: usize) -> Option<BenchmarkDescriptor> {
        if self.statement.is_empty() {
            return None;
        }

        let name = match &self.name {
            Some(explicit) => format!("({}) {}", self.mode, explicit),
            None => format!("({}) line {}-{}", self.mode, self.start_line, end_line),
        };

        let statement = self
            .statement
            .strip_suffix('\n')
            .unwrap_or(&self.statement)
            .to_string();

        Some(BenchmarkDescriptor {
            name,
            mode: self.mode,
            iteration_ratio: self.ratio,
            parallel: self.parallel,
            statement,
        })
    }
}

fn is_skipped(line: &str) -> bool {
    line.is_empty() || line.starts_with("--") || line.starts_with('#') || line.starts_with("//")
}

/// Reads the `\benchmark` directive on line `line_no` into a fresh block.
fn parse_directive(line: &str, line_no: usize) -> Result<Block, ScriptError> {
    let mut tokens = line.split_whitespace().skip(1).peekable();

    let mode = match tokens.next() {
        None => return Err(ScriptError::NoMode { line: line_no }),
        Some("once") => Mode::Once,
        Some("loop") => Mode::Loop,
        Some(other) => {
            return Err(ScriptError::InvalidMode {
                line: line_no,
                token: other.to_string(),
            })
        }
    };

    let mut block = Block::new(mode, line_no + 1);

    if let Some(token) = tokens.next_if(|t| !t.starts_with('\\')) {
        match token.parse::<f64>() {
            Ok(ratio) if mode == Mode::Loop && ratio > 0.0 && ratio <= 1.0 => block.ratio = ratio,
            _ => debug!(line = line_no, token, "ignoring iteration ratio"),
        }
    }

    while let Some(token) = tokens.next() {
        match token {
            PARALLEL => block.parallel = true,
            NAME => match tokens.next() {
                Some(name) => block.name = Some(name.to_string()),
                None => return Err(ScriptError::MissingName { line: line_no }),
            },
            other => debug!(line = line_no, token = other, "ignoring unknown token"),
        }
    }

    Ok(block)
}

/// Parses a benchmark script into descriptors, in declaration order.
///
/// On error nothing is returned; a partially parsed script is never run.
pub fn parse_script<R: BufRead>(reader: R) -> Result<Vec<BenchmarkDescriptor>, ScriptError> {
    let mut benchmarks = Vec::new();
    let mut block = Block::new(Mode::Loop, 1);
    let mut line_count = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        line_count = line_no;

        let raw = line?;
        let line = raw.trim();

        if is_skipped(line) {
            continue;
        }

        if line.starts_with(DIRECTIVE) {
            let next = parse_directive(line, line_no)?;
            let done = std::mem::replace(&mut block, next);
            benchmarks.extend(done.finish(line_no - 1));
            continue;
        }

        block.statement.push_str(line);
        block.statement.push('\n');
    }

    benchmarks.extend(block.finish(line_count));
    Ok(benchmarks)
}

/// Convenience wrapper around [`parse_script`] for in-memory scripts.
pub fn parse_str(script: &str) -> Result<Vec<BenchmarkDescriptor>, ScriptError> {
    parse_script(script.as_bytes())
}
