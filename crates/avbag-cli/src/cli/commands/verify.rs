use crate::cli::args::VerifyArgs;
use crate::config::LoggingConfig;
use crate::exit_codes::{EXIT_PROBLEMS_FOUND, EXIT_SUCCESS};
use crate::logging;
use anyhow::Context;

pub fn run(args: VerifyArgs) -> anyhow::Result<i32> {
    logging::init(&LoggingConfig::default())?;
    let result = avbag_core::verify_bag(&args.bag_dir)
        .with_context(|| format!("failed to verify {}", args.bag_dir.display()))?;

    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
    for error in &result.errors {
        eprintln!("error: {error}");
    }
    if result.is_ok() {
        println!("{}: OK", args.bag_dir.display());
        Ok(EXIT_SUCCESS)
    } else {
        println!(
            "{}: {} problem(s) found",
            args.bag_dir.display(),
            result.errors.len()
        );
        Ok(EXIT_PROBLEMS_FOUND)
    }
}
