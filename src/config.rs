use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Worker configuration. Loaded once at startup and injected into the
/// controller; nothing here is mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Product prefix for cache partition names
  pub product: String,
  /// Cache version. Bumping it invalidates every partition on activation.
  pub version: String,
  /// Upstream origin the PWA is served from
  pub origin: String,
  /// Address the caching proxy listens on
  pub listen: String,
  /// Paths fetched into the static partition at install time
  pub precache: Vec<String>,
  /// Regexes matched against the full URL to detect backend API calls
  pub api_hosts: Vec<String>,
  /// Path extensions treated as build assets (without the dot)
  pub static_extensions: Vec<String>,
  /// Offline document served when a navigation cannot be satisfied
  pub offline_page: String,
  /// SQLite database holding the cache partitions
  pub cache_path: Option<PathBuf>,
  /// Take control right after install instead of waiting for SKIP_WAITING
  pub skip_waiting: bool,
  pub notifications: NotificationConfig,
  pub clients: ClientsConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub default_title: String,
  pub default_body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientsConfig {
  /// Launch the system browser when a notification click opens a window
  pub open_browser: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Directory for daily rolling log files
  pub dir: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      product: "humidor".to_string(),
      version: "1".to_string(),
      origin: "http://localhost:3000".to_string(),
      listen: "127.0.0.1:8080".to_string(),
      precache: vec![
        "/".to_string(),
        "/manifest.json".to_string(),
        "/icons/icon-192x192.png".to_string(),
        "/icons/icon-512x512.png".to_string(),
      ],
      api_hosts: vec![
        r"^https://firestore\.googleapis\.com/".to_string(),
        r"^https://firebase\.googleapis\.com/".to_string(),
        r"^https://identitytoolkit\.googleapis\.com/".to_string(),
        r"^https://securetoken\.googleapis\.com/".to_string(),
        r"^https://[a-z0-9-]+\.firebaseio\.com/".to_string(),
      ],
      static_extensions: [
        "js", "css", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "woff", "woff2", "ttf",
        "eot",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      offline_page: "/offline.html".to_string(),
      cache_path: None,
      skip_waiting: true,
      notifications: NotificationConfig::default(),
      clients: ClientsConfig::default(),
      logging: LoggingConfig::default(),
    }
  }
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      default_title: "Humidor".to_string(),
      default_body: "You have a new notification".to_string(),
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/icon-72x72.png".to_string(),
      vibrate: vec![100, 50, 100],
    }
  }
}

/// The three partition names that are current for one configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  pub static_name: String,
  pub dynamic_name: String,
  pub api_name: String,
}

impl CacheNames {
  pub fn new(product: &str, version: &str) -> Self {
    Self {
      static_name: format!("{}-static-v{}", product, version),
      dynamic_name: format!("{}-dynamic-v{}", product, version),
      api_name: format!("{}-api-v{}", product, version),
    }
  }

  pub fn current(&self) -> [&str; 3] {
    [&self.static_name, &self.dynamic_name, &self.api_name]
  }

  pub fn is_current(&self, name: &str) -> bool {
    self.current().contains(&name)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./humidor.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/humidor/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
  /// `HUMIDOR_CACHE_VERSION` overrides the configured version.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        tracing::debug!("No configuration file found, using defaults");
        Config::default()
      }
    };

    if let Ok(version) = std::env::var("HUMIDOR_CACHE_VERSION") {
      config.version = version;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("humidor.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("humidor").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  pub fn cache_names(&self) -> CacheNames {
    CacheNames::new(&self.product, &self.version)
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Location of the cache database, defaulting to the user data directory.
  pub fn cache_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.cache_path {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join(&self.product).join("cache.db"))
  }
}
