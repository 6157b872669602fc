//! Configuration of the invoice node server.

use clap::Parser;
use secp256k1::SecretKey;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use invoicer_node::node_view::ChannelEntry;
use invoicer_types::config::LiteralOrEnv;
use invoicer_types::network::Network;

#[derive(Parser, Debug)]
#[command(name = "invoicerd")]
#[command(about = "Lightning invoice node HTTP server")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// `host` and `port` fall back to the `HOST`/`PORT` environment variables,
/// then to hardcoded defaults. `node_secret` may name an environment variable
/// as `"$VAR"` or `"${VAR}"`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    network: Network,
    node_secret: LiteralOrEnv<SecretKey>,
    #[serde(default = "config_defaults::default_cltv_final")]
    cltv_final: u16,
    #[serde(default)]
    hook: Option<HookConfig>,
    #[serde(default)]
    channels: Vec<ChannelEntry>,
    #[serde(default)]
    dev_routes: bool,
}

/// Where the payment hook lives.
#[derive(Debug, Clone, Deserialize)]
pub struct HookConfig {
    pub url: Url,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl HookConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    pub const DEFAULT_CLTV_FINAL: u16 = 18;

    /// `$PORT`, else 8080.
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// `$HOST`, else 0.0.0.0.
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HOST)
    }

    pub fn default_cltv_final() -> u16 {
        DEFAULT_CLTV_FINAL
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn node_secret(&self) -> SecretKey {
        *self.node_secret
    }

    pub fn cltv_final(&self) -> u16 {
        self.cltv_final
    }

    pub fn hook(&self) -> Option<&HookConfig> {
        self.hook.as_ref()
    }

    /// Channels seeding the node view.
    pub fn channels(&self) -> &[ChannelEntry] {
        &self.channels
    }

    pub fn dev_routes(&self) -> bool {
        self.dev_routes
    }

    /// Loads the file named by `--config` (or `$CONFIG`, or `./config.json`).
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}
