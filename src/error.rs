//! Error types and terminal reporting utilities.

use std::io;
use std::process::ExitCode;

use colored::Colorize;
use thiserror::Error;

/// An error raised while turning source text into bytecode.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A `]` appeared with no `[` open.
    /// The opposite case (an unclosed `[`) is tolerated and the loop is
    /// closed implicitly at end of input.
    #[error("unexpected end of loop")]
    UnbalancedClose,
    /// The source could not be read.
    #[error("could not read brainfuck code: {0}")]
    Io(#[from] io::Error),
}

impl BuildError {
    /// The process exit code this error maps to.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            BuildError::UnbalancedClose => ExitCode::from(1),
            BuildError::Io(_) => ExitCode::from(2),
        }
    }
}

/// An error raised while executing bytecode.
/// All of these map to exit code 2.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Reading input or writing output failed mid-run.
    #[error("i/o failed during execution: {0}")]
    Io(#[from] io::Error),
    /// A grow request went past the configured tape limit.
    #[error("the tape limit was exceeded, tried to reach cell {tried}, but limit is {limit}")]
    TapeLimitExceeded {
        /// The configured limit, in cells per tape half.
        limit: usize,
        /// The cell index that was requested.
        tried: isize,
    },
    /// The configured instruction budget ran out.
    #[error("the step limit was exceeded")]
    StepLimitExceeded,
    /// The decoder hit a byte that is not an opcode. Unreachable for
    /// bytecode produced by the flattener.
    #[error("invalid opcode {opcode:#04x} at {address:#x}")]
    InvalidOpcode { opcode: u8, address: usize },
    /// Debug-build sanity check: the tape pointer left the window declared
    /// by the last bounds checks. Indicates a compiler bug, not a program
    /// error.
    #[error("bounds check failure: pos {pos}, expected {lower} to {upper}")]
    BoundsViolation {
        pos: isize,
        lower: isize,
        upper: isize,
    },
}

/// Prints an error the way the rest of the tooling does: a bold red
/// `error:` prefix on stderr, then the message.
pub fn report(error: &dyn std::error::Error) {
    eprintln!("{} {error}", "error:".red().bold());
}

/// Prints a warning with a bold yellow prefix on stderr.
pub fn warn(message: &str) {
    eprintln!("{} {message}", "warning:".yellow().bold());
}
