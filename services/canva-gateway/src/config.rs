//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The file is
//! optional so the gateway can run from the environment alone.
//! Secrets (Canva client secret, Cloudinary API secret) are loaded from env
//! vars or a secret file, never stored in the TOML directly.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use canva_auth::ClientConfig;
use canva_autofill::PollConfig;
use common::Secret;
use serde::Deserialize;
use uploader::CloudinaryConfig;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub canva: CanvaConfig,
    #[serde(default)]
    pub autofill: AutofillConfig,
    #[serde(default)]
    pub cloudinary: CloudinarySettings,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Timeout for every outbound call (token endpoint, Canva API, uploads).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Canva OAuth client registration
#[derive(Debug, Deserialize)]
pub struct CanvaConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to CANVA_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: u64,
}

/// Autofill API and polling budget
#[derive(Debug, Deserialize)]
pub struct AutofillConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Thumbnail hosting. All three of cloud name, key and secret, or none.
#[derive(Debug, Deserialize)]
pub struct CloudinarySettings {
    #[serde(default)]
    pub cloud_name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(skip)]
    pub api_secret: Option<Secret<String>>,
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Upload API root, for pointing at a proxy or test double.
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1000
}

fn default_redirect_uri() -> String {
    canva_auth::DEFAULT_REDIRECT_URI.to_string()
}

fn default_session_ttl() -> u64 {
    canva_auth::SESSION_TTL.as_secs()
}

fn default_refresh_margin() -> u64 {
    canva_auth::REFRESH_MARGIN.as_secs()
}

fn default_api_base() -> String {
    canva_autofill::api::API_BASE.to_string()
}

fn default_poll_interval() -> u64 {
    canva_autofill::poller::POLL_INTERVAL.as_millis() as u64
}

fn default_max_attempts() -> u32 {
    canva_autofill::poller::MAX_ATTEMPTS
}

fn default_folder() -> String {
    "canva".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            timeout_secs: default_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for CanvaConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            client_secret_file: None,
            redirect_uri: default_redirect_uri(),
            token_endpoint: None,
            session_ttl_secs: default_session_ttl(),
            refresh_margin_secs: default_refresh_margin(),
        }
    }
}

impl Default for AutofillConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            poll_interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for CloudinarySettings {
    fn default() -> Self {
        Self {
            cloud_name: None,
            api_key: None,
            api_secret: None,
            folder: default_folder(),
            api_base: None,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then overlay environment variables.
    ///
    /// A missing file is not an error. A file that exists but does not parse is.
    pub fn load(path: &Path) -> common::Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> common::Result<()> {
        if let Some(id) = env_nonempty("CANVA_CLIENT_ID") {
            self.canva.client_id = Some(id);
        }
        if let Some(uri) = env_nonempty("CANVA_REDIRECT_URI") {
            self.canva.redirect_uri = uri;
        }

        // Client secret: env var takes precedence over file
        if let Some(secret) = env_nonempty("CANVA_CLIENT_SECRET") {
            self.canva.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = self.canva.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                self.canva.client_secret = Some(Secret::new(secret));
            }
        }

        if let Some(port) = env_nonempty("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| common::Error::Config(format!("PORT must be a port number, got: {port}")))?;
            self.server.listen_addr.set_port(port);
        }

        if let Some(name) = env_nonempty("CLOUDINARY_CLOUD_NAME") {
            self.cloudinary.cloud_name = Some(name);
        }
        if let Some(key) = env_nonempty("CLOUDINARY_API_KEY") {
            self.cloudinary.api_key = Some(key);
        }
        if let Some(secret) = env_nonempty("CLOUDINARY_API_SECRET") {
            self.cloudinary.api_secret = Some(Secret::new(secret));
        }

        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        if self.canva.client_id.as_deref().is_none_or(str::is_empty) {
            return Err(common::Error::Missing("CANVA_CLIENT_ID"));
        }
        if self.canva.client_secret.as_ref().is_none_or(Secret::is_blank) {
            return Err(common::Error::Missing("CANVA_CLIENT_SECRET"));
        }

        require_http_url("redirect_uri", &self.canva.redirect_uri)?;
        require_http_url("autofill.api_base", &self.autofill.api_base)?;
        if let Some(ref endpoint) = self.canva.token_endpoint {
            require_http_url("token_endpoint", endpoint)?;
        }
        if let Some(ref base) = self.cloudinary.api_base {
            require_http_url("cloudinary.api_base", base)?;
        }

        if self.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.canva.session_ttl_secs == 0 {
            return Err(common::Error::Config(
                "session_ttl_secs must be greater than 0".into(),
            ));
        }
        if self.autofill.poll_interval_ms == 0 || self.autofill.max_attempts == 0 {
            return Err(common::Error::Config(
                "poll_interval_ms and max_attempts must be greater than 0".into(),
            ));
        }

        let cloudinary = &self.cloudinary;
        let set = [
            cloudinary.cloud_name.is_some(),
            cloudinary.api_key.is_some(),
            cloudinary.api_secret.is_some(),
        ];
        if set.iter().any(|s| *s) && !set.iter().all(|s| *s) {
            return Err(common::Error::Config(
                "cloudinary needs cloud_name, api_key and CLOUDINARY_API_SECRET together".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("canva-gateway.toml")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }

    /// OAuth client settings. Only valid after `load()` has validated.
    pub fn client_config(&self) -> ClientConfig {
        let secret = self
            .canva
            .client_secret
            .clone()
            .unwrap_or_else(|| Secret::new(String::new()));
        let mut client = ClientConfig::new(
            self.canva.client_id.clone().unwrap_or_default(),
            secret,
            self.canva.redirect_uri.clone(),
        )
        .with_timeout(self.timeout());
        if let Some(ref endpoint) = self.canva.token_endpoint {
            client = client.with_token_endpoint(endpoint.clone());
        }
        client
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.canva.session_ttl_secs)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.canva.refresh_margin_secs)
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.autofill.poll_interval_ms),
            max_attempts: self.autofill.max_attempts,
        }
    }

    /// Cloudinary settings when fully configured.
    pub fn cloudinary_config(&self) -> Option<CloudinaryConfig> {
        let c = &self.cloudinary;
        match (&c.cloud_name, &c.api_key, &c.api_secret) {
            (Some(name), Some(key), Some(secret)) => {
                let mut config = CloudinaryConfig::new(name.clone(), key.clone(), secret.clone());
                config.folder = c.folder.clone();
                config.timeout = self.timeout();
                if let Some(ref base) = c.api_base {
                    config.api_base = base.clone();
                }
                Some(config)
            }
            _ => None,
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn require_http_url(name: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {value}"
        )))
    }
}
