use std::fs::File;
use std::io::{self, BufReader};
use std::process::ExitCode;

use bfvm::clap_cli::Cli;
use bfvm::interpreter::Interpreter;
use bfvm::{dump, error, flattener, optimiser, parser};
use clap::Parser as _;
use either::Either;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.kind() == clap::error::ErrorKind::DisplayHelp => {
            print!("{err}");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprint!("{err}");
            return ExitCode::from(1);
        }
    };

    // A file source reads to its end; interactive input ends at a bang.
    let (source, stop_at_bang) = match &cli.file {
        Some(path) => match File::open(path) {
            Ok(file) => (Either::Left(BufReader::new(file)), false),
            Err(err) => {
                error::report(&err);
                return ExitCode::from(1);
            }
        },
        None => (Either::Right(io::stdin().lock()), true),
    };

    let mut root = match parser::build_tree(source, stop_at_bang) {
        Ok(root) => root,
        Err(err) => {
            let code = err.exit_code();
            error::report(&err);
            return code;
        }
    };
    optimiser::optimise(&mut root);

    if cli.dump_tree {
        if let Err(err) = dump::print_tree(&root, &mut io::stdout().lock()) {
            error::report(&err);
            return ExitCode::from(2);
        }
    }

    let program = flattener::flatten(&mut root);
    drop(root);

    if cli.dump_opcodes {
        if let Err(err) = dump::print_flattened(&program, &mut io::stdout().lock()) {
            error::report(&err);
            return ExitCode::from(2);
        }
    }

    if cli.no_execute {
        return ExitCode::SUCCESS;
    }

    match Interpreter::new().run(&program) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error::report(&err);
            ExitCode::from(2)
        }
    }
}
