use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::error;

use sickle_rs::config::Cli;
use sickle_rs::report::{summary_text, write_json_report};

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(err) = try_main() {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let options = cli.command.into_options()?;

    let summary = sickle_rs::run(&options.pipeline)?;

    if !options.quiet {
        let text = summary_text(&options.pipeline.layout, &summary.stats);
        // records own stdout when an output is `-`
        if options.pipeline.layout.outputs().iter().any(|p| p.as_os_str() == "-") {
            eprint!("{text}");
        } else {
            print!("{text}");
        }
    }
    if let Some(path) = &options.json {
        write_json_report(path, &options.pipeline, &summary)
            .with_context(|| format!("writing JSON report {}", path.display()))?;
    }
    Ok(())
}
