use crate::cli::args::ConvertArgs;
use crate::config::Config;
use crate::exit_codes::EXIT_SUCCESS;
use crate::logging;
use anyhow::Context;
use avbag_core::{Converter, ConverterConfig, SourceCatalog};

pub fn run(args: ConvertArgs) -> anyhow::Result<i32> {
    let mut config = Config::load(&args.config)?;
    if let Some(staging_dir) = args.staging_dir {
        config.staging_dir = staging_dir;
    }
    if args.keep_input {
        config.keep_input = true;
    }
    logging::init(&config.logging)?;
    tracing::debug!(config = %args.config.display(), "configuration loaded");

    let catalog = SourceCatalog::load(&config.sources).context("failed to load source catalog")?;
    let converter = Converter::new(
        ConverterConfig {
            input_dir: args.input_dir,
            output_dir: args.output_dir,
            staging_dir: config.staging_dir,
            keep_input: config.keep_input,
        },
        &catalog,
    );
    let tally = converter.convert_all().context("conversion aborted")?;
    println!("{}", converter.summary(tally)?);
    Ok(EXIT_SUCCESS)
}
