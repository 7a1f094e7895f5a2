//! An optimizing brainfuck compiler and bytecode interpreter.
//!
//! The pipeline is: [`parser`] builds a typed IR tree (folding runs of
//! `+`/`-`/`<`/`>` and recognizing loop idioms as it goes), [`optimiser`]
//! rewrites the tree and inserts tape bounds checks, [`flattener`] packs it
//! into linear bytecode with relative jumps, and [`interpreter`] executes
//! the bytecode against a tape that grows in both directions.

/// The cell type, aka what each spot on the tape holds.
/// Wraps on overflow.
pub type Cell = i8;

pub mod clap_cli;
pub mod dump;
pub mod error;
pub mod flattener;
pub mod interpreter;
pub mod ir;
pub mod optimiser;
pub mod parser;

use error::BuildError;
use flattener::Program;

/// Compiles a source string all the way down to executable bytecode.
///
/// Convenience entry point for callers that already hold the whole program
/// in memory; the binary streams from a file or stdin instead.
pub fn compile(source: &str) -> Result<Program, BuildError> {
    let mut root = parser::build_tree(source.as_bytes(), false)?;
    optimiser::optimise(&mut root);
    Ok(flattener::flatten(&mut root))
}
