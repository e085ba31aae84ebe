mod activity;
mod auth;
mod cli;
mod config;
mod guard;
mod http;
mod pages;
mod services;
mod session;
mod token;

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "schooldesk",
    about = "Terminal client for the school management backend"
)]
pub struct Args {
    #[arg(long, env = "SCHOOLDESK_API_BASE_URL", help = "Backend base URL")]
    pub base_url: Option<String>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Cookie jar file (overrides config)")]
    pub cookie_file: Option<PathBuf>,

    #[arg(long, help = "Keep the session in memory only")]
    pub ephemeral: bool,

    #[arg(long, help = "Do not write the activity log")]
    pub no_activity: bool,

    #[arg(long, help = "Verbose output (info-level logging)")]
    pub verbose: bool,

    #[arg(long, help = "Debug output (print HTTP details and settings)")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<cli::Commands>,
}

fn init_logging(verbose: bool, debug: bool) {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    // RUST_LOG wins over the flags
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(args.verbose, args.debug);

    let mut cfg = match &args.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    };

    if let Some(url) = &args.base_url {
        cfg.api.base_url = Some(url.clone());
    }
    if let Some(path) = &args.cookie_file {
        cfg.session.cookie_file = Some(path.clone());
    }
    if args.no_activity {
        cfg.activity.enabled = Some(false);
    }

    if let Err(errors) = cfg.validate() {
        for e in &errors {
            eprintln!("Config error {}", e);
        }
        bail!("invalid configuration ({} error(s))", errors.len());
    }

    log::debug!("backend: {}", cfg.base_url());

    let run_id = uuid::Uuid::new_v4().to_string();
    let activity = match cfg.activity_path() {
        Some(path) => activity::ActivityLog::open(&path, &run_id)?,
        None => activity::ActivityLog::disabled(),
    };

    let ctx = cli::Context::new(cfg, activity, args.ephemeral);
    match &args.command {
        None | Some(cli::Commands::Shell) => cli::run_repl(&ctx),
        Some(command) => cli::run_once(&ctx, command),
    }
}
