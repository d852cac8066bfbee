use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use usersearch_engine::{QueryValidator, SearchSession};

mod config;
mod interactive;
mod render;
mod search;

use config::AppConfig;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "usersearch")]
#[command(about = "Search GitHub users from the terminal", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for results)
    #[arg(long, global = true)]
    quiet: bool,

    /// TOML config file with [engine] and [github] sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serve deterministic mock users instead of calling GitHub
    #[arg(long, global = true)]
    mock: bool,

    /// Override the debounce quiet period in milliseconds
    #[arg(long, global = true)]
    debounce_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one query and print the results
    Search(SearchArgs),

    /// Read queries from stdin line by line (:more, :retry, :clear, :quit)
    Interactive,
}

#[derive(Args)]
struct SearchArgs {
    /// GitHub user search query
    query: String,

    /// Pages to load; stops early once results run out
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pages: u32,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Keep stdout clean for JSON parsing
    if let Commands::Search(args) = &cli.command {
        if args.json {
            cli.quiet = true;
        }
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    if !cli.verbose {
        builder.filter_module("reqwest", log::LevelFilter::Warn);
        builder.filter_module("hyper_util", log::LevelFilter::Warn);
    }
    builder.target(env_logger::Target::Stderr).init();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_overrides(cli.mock, cli.debounce_ms);

    let validator = QueryValidator::from_config(&config.engine);
    let session = SearchSession::start(config.build_fetcher()?, &config.engine)
        .context("Failed to start search session")?;

    match cli.command {
        Commands::Search(args) => search::run(&session, validator, args).await?,
        Commands::Interactive => interactive::run(&session, validator).await?,
    }

    session.shutdown();
    Ok(())
}
