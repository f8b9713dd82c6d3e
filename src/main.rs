mod cache;
mod classify;
mod commands;
mod config;
mod event;
mod http;
mod server;
mod worker;

use clap::Parser;
use color_eyre::Result;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "humidor-cache")]
#[command(about = "Offline cache controller and caching proxy for the Humidor PWA")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./humidor.yaml or $XDG_CONFIG_HOME/humidor/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Increase log verbosity (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  /// Also write daily rolling log files to this directory
  #[arg(long, global = true)]
  log_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<commands::Command>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let log_dir = args.log_dir.as_deref().or(config.logging.dir.as_deref());
  let _guard = init_logging(args.verbose, log_dir);

  commands::run(args.command.unwrap_or(commands::Command::Serve), config).await
}

/// Stderr logging, plus a daily file when a directory is given. The
/// returned guard flushes the file writer on drop.
fn init_logging(verbose: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
  let default_level = match verbose {
    0 => "humidor_cache=info",
    1 => "humidor_cache=debug",
    _ => "humidor_cache=trace",
  };
  let filter = || {
    if verbose > 0 {
      EnvFilter::new(default_level)
    } else {
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    }
  };

  let stderr = fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(false)
    .with_filter(filter());

  let (file, guard) = match log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "humidor-cache.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(filter());
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry().with(stderr).with(file).init();

  guard
}
