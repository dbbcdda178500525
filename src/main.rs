use clap::Parser;
use genflow::cli::{self, Args};
use genflow::core::{AppError, DefaultErrorReporter, ErrorReporter};
use genflow::logging;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = match logging::init(&args.command) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("[WARNING] logging disabled: {:#}", err);
            None
        }
    };

    match cli::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<AppError>() {
                Some(app_error) => DefaultErrorReporter::new().report_error(app_error),
                None => eprintln!("[ERROR] {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}
