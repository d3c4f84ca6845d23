// src/exec/command.rs

//! Whitespace command-line splitting.
//!
//! This is deliberately not a shell grammar: anything that would need real
//! quoting or escaping semantics is refused outright instead of being
//! half-interpreted.

use crate::errors::{FleetvisorError, Result};

/// Characters that only make sense under shell quoting rules.
const REJECTED: [char; 5] = ['\'', '"', '`', '\\', '\n'];

/// Split `line` on whitespace into a program path and its arguments.
///
/// Fails with [`FleetvisorError::Syntax`] if the line contains a quote,
/// backtick, backslash or newline. An empty or blank line yields no tokens.
pub fn split_command(line: &str) -> Result<Vec<String>> {
    if let Some(found) = line.chars().find(|c| REJECTED.contains(c)) {
        return Err(FleetvisorError::Syntax {
            line: line.to_string(),
            found,
        });
    }

    Ok(line.split_whitespace().map(str::to_string).collect())
}
