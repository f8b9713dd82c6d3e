//! Subcommands: run the proxy or drive the worker lifecycle by hand.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{error, info};
use url::Url;

use crate::cache::{CacheStorage, SqliteStorage};
use crate::config::Config;
use crate::event::EventLoop;
use crate::http::{HttpNetwork, Network, OfflineNetwork, Request};
use crate::server::{self, ServerState};
use crate::worker::{
  ClientRegistry, FetchOutcome, OfflineController, Platform, Registration, TracingNotifier,
};

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Run the caching proxy in front of the origin (default)
  Serve,
  /// Pre-cache the configured assets for the current version
  Install,
  /// Delete cache partitions left behind by other versions
  Activate,
  /// Fetch a path or URL through the worker and print the response
  Fetch {
    /// Path relative to the origin, or an absolute URL
    target: String,
    /// Treat the request as a page load
    #[arg(long)]
    navigate: bool,
    /// Act as if the network were down
    #[arg(long)]
    offline: bool,
  },
  /// List cache partitions and their entry counts
  Caches,
  /// Show a notification for a push payload
  Push {
    /// JSON notification object or plain text
    payload: Option<String>,
  },
  /// Print the current cache version
  Version,
}

pub async fn run(command: Command, config: Config) -> Result<()> {
  let config = Arc::new(config);

  match command {
    Command::Serve => serve(config).await,
    Command::Install => install(config).await,
    Command::Activate => activate(config).await,
    Command::Fetch {
      target,
      navigate,
      offline,
    } => fetch(config, &target, navigate, offline).await,
    Command::Caches => caches(&config),
    Command::Push { payload } => push(config, payload).await,
    Command::Version => {
      println!("{}", config.cache_names().static_name);
      Ok(())
    }
  }
}

fn open_storage(config: &Config) -> Result<Arc<SqliteStorage>> {
  let path = config.cache_path()?;
  info!(path = %path.display(), "Opening cache");
  Ok(Arc::new(SqliteStorage::open(&path)?))
}

fn platform(config: &Config, network: Arc<dyn Network>) -> Result<Platform> {
  Ok(Platform {
    storage: open_storage(config)?,
    network,
    clients: Arc::new(ClientRegistry::new(config.clients.open_browser)),
    notifier: Arc::new(TracingNotifier),
  })
}

/// Registration with the installed version active, or an error telling
/// the user to install first.
async fn resumed(config: Arc<Config>, network: Arc<dyn Network>) -> Result<Registration> {
  let registration = Registration::new(platform(&config, network)?);
  registration.resume(config).await?;
  Ok(registration)
}

async fn serve(config: Arc<Config>) -> Result<()> {
  let network: Arc<dyn Network> = Arc::new(HttpNetwork::new());
  let platform = platform(&config, Arc::clone(&network))?;
  let already_installed = platform
    .storage
    .has_partition(&config.cache_names().static_name)?;

  let registration = Arc::new(Registration::new(platform));
  let events = EventLoop::spawn(Arc::clone(&registration));

  if already_installed {
    registration.resume(Arc::clone(&config)).await?;
  } else if let Err(e) = events.install(Arc::clone(&config)).await {
    // Keep serving: without an active worker every request passes through
    error!("Install failed, proxying without a worker: {:#}", e);
  }

  let state = Arc::new(ServerState {
    events,
    registration,
    network,
    origin: config.origin_url()?,
  });

  server::serve(&config.listen, state).await
}

async fn install(config: Arc<Config>) -> Result<()> {
  let platform = platform(&config, Arc::new(HttpNetwork::new()))?;
  let storage = Arc::clone(&platform.storage);
  let registration = Registration::new(platform);

  let controller = registration.register(Arc::clone(&config)).await?;
  println!(
    "Installed {} ({} assets, {})",
    controller.version(),
    storage.entry_count(controller.version())?,
    controller.state().as_str()
  );
  Ok(())
}

async fn activate(config: Arc<Config>) -> Result<()> {
  let platform = platform(&config, Arc::new(OfflineNetwork))?;
  let controller = OfflineController::new(config, platform)?;
  let deleted = controller.resume().await?;
  if deleted.is_empty() {
    println!("No stale caches");
  }
  for name in deleted {
    println!("Deleted {}", name);
  }
  Ok(())
}

async fn fetch(config: Arc<Config>, target: &str, navigate: bool, offline: bool) -> Result<()> {
  let url = resolve_target(&config, target)?;
  let network: Arc<dyn Network> = if offline {
    Arc::new(OfflineNetwork)
  } else {
    Arc::new(HttpNetwork::new())
  };
  let registration = resumed(config, Arc::clone(&network)).await?;

  let request = if navigate {
    Request::navigate(url)
  } else {
    Request::get(url)
  };

  let (response, source) = match registration.fetch(&request).await? {
    FetchOutcome::Respond(result) => (result.data, result.source.as_str()),
    FetchOutcome::Passthrough => (network.fetch(&request).await?, "passthrough"),
  };

  println!("{} {} ({})", response.status, request.url, source);
  for (name, value) in &response.headers {
    println!("{}: {}", name, value);
  }
  println!();
  match std::str::from_utf8(&response.body) {
    Ok(text) => println!("{}", text),
    Err(_) => println!("<{} bytes of binary data>", response.body.len()),
  }
  Ok(())
}

/// Absolute URLs are used as-is; anything else is a path on the origin.
fn resolve_target(config: &Config, target: &str) -> Result<Url> {
  if target.starts_with("http://") || target.starts_with("https://") {
    return Url::parse(target).map_err(|e| eyre!("Invalid URL '{}': {}", target, e));
  }
  config
    .origin_url()?
    .join(target)
    .map_err(|e| eyre!("Invalid path '{}': {}", target, e))
}

fn caches(config: &Config) -> Result<()> {
  let storage = open_storage(config)?;
  let names = config.cache_names();

  let partitions = storage.partition_names()?;
  if partitions.is_empty() {
    println!("No caches");
  }
  for name in partitions {
    let marker = if names.is_current(&name) { "*" } else { " " };
    println!("{} {:<32} {:>6}", marker, name, storage.entry_count(&name)?);
  }
  Ok(())
}

async fn push(config: Arc<Config>, payload: Option<String>) -> Result<()> {
  let registration = resumed(config, Arc::new(OfflineNetwork)).await?;
  let notification = registration
    .push(payload.as_deref().map(str::as_bytes))
    .await?;
  println!("{}", serde_json::to_string_pretty(&notification)?);
  Ok(())
}
