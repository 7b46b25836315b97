use clap::Parser;

mod cli;
mod config;
pub mod exit_codes;
mod logging;

use cli::args::Cli;
use cli::commands::dispatch;

fn main() {
    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal: {e:?}");
            exit_codes::EXIT_CONFIG_ERROR
        }
    };
    std::process::exit(code);
}
