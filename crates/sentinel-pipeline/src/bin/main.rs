//! `sentineld` - runs the security event pipeline and correlation engine
//! until interrupted.

use clap::{Arg, ArgAction, Command};
use sentinel_common::config::LogFormat;
use sentinel_common::Config;
use sentinel_pipeline::{build_pipeline, ChannelEventSource};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let matches = Command::new("sentineld")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Detects, analyzes, correlates, and broadcasts security events")
        .arg(Arg::new("config").short('c').long("config").value_name("FILE").help("Path to a config.toml override").required(false))
        .arg(Arg::new("verbose").short('v').long("verbose").help("Enable debug-level logging").action(ArgAction::SetTrue))
        .get_matches();

    let config = match load_config(matches.get_one::<String>("config")) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("failed to load configuration: {error}");
            std::process::exit(1);
        }
    };

    init_tracing(&config, matches.get_flag("verbose"));
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting sentineld");

    let pipeline = match build_pipeline(config) {
        Ok(pipeline) => pipeline,
        Err(error) => {
            tracing::error!(%error, "failed to wire the pipeline");
            std::process::exit(1);
        }
    };

    let cancellation = pipeline.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            cancellation.cancel();
        }
    });

    // No external ingestion source is wired in by default; the sender
    // half is simply dropped, which closes the channel once any caller
    // holding a clone finishes. A real deployment feeds events in by
    // handing out clones of this sender before calling `run`.
    let (_sender, source) = ChannelEventSource::channel(1024);
    pipeline.run(source).await;

    tracing::info!("sentineld stopped");
}

fn init_tracing(config: &Config, verbose: bool) {
    let default_level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_ansi(config.logging.ansi);
    match config.logging.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

fn load_config(path: Option<&String>) -> sentinel_common::Result<Config> {
    Config::load_from(path.map(|s| s.as_str()))
}
