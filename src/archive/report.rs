//! Operational log: one tagged line per unit of work on stdout.
//!
//! Scripted callers parse these lines, so the format is fixed:
//! `A <name>` archived, `X <name>` extracted, `L <name>` enumerated or listed.

#![forbid(unsafe_code)]

use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Archived,
    Extracted,
    Listed,
}

impl Op {
    pub fn tag(self) -> char {
        match self {
            Op::Archived => 'A',
            Op::Extracted => 'X',
            Op::Listed => 'L',
        }
    }
}

pub fn line(op: Op, name: &str) -> String {
    format!("{} {}", op.tag(), name)
}

pub fn emit(op: Op, name: &str) {
    let mut out = std::io::stdout().lock();
    // A closed stdout must not abort an archive operation halfway.
    if let Err(e) = writeln!(out, "{}", line(op, name)) {
        tracing::debug!("operational log write failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags() {
        assert_eq!(line(Op::Archived, "/a"), "A /a");
        assert_eq!(line(Op::Extracted, "/"), "X /");
        assert_eq!(line(Op::Listed, "/sub/b"), "L /sub/b");
    }
}
