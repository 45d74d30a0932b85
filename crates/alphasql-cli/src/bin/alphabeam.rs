use std::process::ExitCode;

use clap::Parser;

use alphasql_cli::beam::{self, Args};

fn main() -> ExitCode {
    let args = Args::parse();
    alphasql_cli::logging::init(args.verbose);

    match beam::run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::from(1)
        }
    }
}
