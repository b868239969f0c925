use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use diagnostics::*;
use opmeta::config::{API_KEY_ENV, api_key_from_env, write_example_config};
use opmeta::{
    DuneClient, HttpFetcher, OpmetaConfig, Pipeline, PipelineSettings, load_config_or_default,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Opmeta resolves operator metadata URIs found by a Dune query and
/// republishes the flattened metadata as a Dune table.
#[derive(Parser, Debug)]
#[command(name = "opmeta", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level (OPMETA_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the whole pipeline: query, resolve, replace the table.
    Run {
        /// YAML configuration file; defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Query and resolve, then write the CSV instead of publishing it.
    Resolve {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write an example configuration file.
    Init {
        #[arg(default_value = "opmeta.yaml")]
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_with_default(if cli.verbose { "debug" } else { "info" });

    match main_result(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        }
    }
}

fn main_result(command: Commands) -> Result<()> {
    match command {
        Commands::Run { config } => run(config.as_deref()),
        Commands::Resolve { config, output } => resolve(config.as_deref(), output.as_deref()),
        Commands::Init { path } => init(&path),
    }
}

fn load(config_path: Option<&Path>) -> Result<(OpmetaConfig, String)> {
    let config = load_config_or_default(config_path).context("Failed to load configuration")?;
    let api_key = api_key_from_env()
        .with_context(|| format!("Set {API_KEY_ENV} to your Dune API key"))?;
    Ok((config, api_key))
}

fn clients(config: &OpmetaConfig, api_key: String) -> Result<(DuneClient, HttpFetcher)> {
    let client =
        DuneClient::from_config(config, api_key).context("Failed to create Dune client")?;
    let fetcher =
        HttpFetcher::new(config.fetch_timeout()).context("Failed to create HTTP client")?;
    Ok((client, fetcher))
}

fn run(config_path: Option<&Path>) -> Result<()> {
    let (config, api_key) = load(config_path)?;
    run_pipeline(&config, api_key)
}

fn run_pipeline(config: &OpmetaConfig, api_key: String) -> Result<()> {
    let (client, fetcher) = clients(config, api_key)?;
    let pipeline = Pipeline::new(&client, &fetcher, PipelineSettings::from(config));
    pipeline.run(&client).context("Operator metadata run failed")?;
    Ok(())
}

fn resolve(config_path: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let (config, api_key) = load(config_path)?;
    let (client, fetcher) = clients(&config, api_key)?;

    let pipeline = Pipeline::new(&client, &fetcher, PipelineSettings::from(&config));
    let assembled = pipeline.assemble().context("Operator metadata resolution failed")?;

    match output {
        Some(path) => {
            std::fs::write(path, &assembled.csv)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            let rows = assembled.table.len();
            let path = path.display().to_string();
            info!("Wrote {rows} rows to {path}", rows: rows, path: path);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(assembled.csv.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn init(path: &Path) -> Result<()> {
    write_example_config(path)
        .with_context(|| format!("Failed to create configuration file {}", path.display()))?;
    let path = path.display().to_string();
    info!(
        "Created example configuration file: {path}",
        path: path
    );
    Ok(())
}

#[cfg(test)]
#[path = "../tests/mock_server.rs"]
mod mock_server;
