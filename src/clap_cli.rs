//! The cli parser defined via the clap crate.

use std::path::PathBuf;

use clap::Parser;

/// Optimizing brainfuck compiler and bytecode interpreter.
///
/// Compiles FILE (or standard input, read until a `!` outside any loop)
/// and executes it.
#[derive(Parser)]
#[command(about, long_about = None)]
#[derive(Debug, PartialEq, Clone)]
pub struct Cli {
    /// Path to the brainfuck source file; standard input when omitted
    pub file: Option<PathBuf>,

    /// Print the optimized IR tree before execution
    #[arg(long)]
    pub dump_tree: bool,

    /// Print the flattened bytecode before execution
    #[arg(long)]
    pub dump_opcodes: bool,

    /// Skip execution after compilation
    #[arg(long)]
    pub no_execute: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_flags_parse() {
        let cli = Cli::try_parse_from(["bfvm", "--dump-tree", "--no-execute", "mandel.b"]).unwrap();
        assert!(cli.dump_tree);
        assert!(!cli.dump_opcodes);
        assert!(cli.no_execute);
        assert_eq!(cli.file, Some(PathBuf::from("mandel.b")));
    }

    #[test]
    fn file_is_optional() {
        let cli = Cli::try_parse_from(["bfvm"]).unwrap();
        assert_eq!(cli.file, None);
    }

    #[test]
    fn double_dash_stops_option_parsing() {
        let cli = Cli::try_parse_from(["bfvm", "--", "--dump-tree"]).unwrap();
        assert_eq!(cli.file, Some(PathBuf::from("--dump-tree")));
        assert!(!cli.dump_tree);
    }

    #[test]
    fn unknown_options_are_rejected() {
        assert!(Cli::try_parse_from(["bfvm", "--frobnicate"]).is_err());
    }
}
