use std::process::ExitCode;

use clap::Parser;

use alphasql_cli::dag::{self, Args};

fn main() -> ExitCode {
    let args = Args::parse();
    alphasql_cli::logging::init(args.verbose);

    match dag::run(&args) {
        Ok(true) => ExitCode::from(1),
        Ok(false) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::from(1)
        }
    }
}
