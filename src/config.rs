use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_PORT: u16 = 7000;
const DEFAULT_SERIES_INDEX: &str = "series_map.json";
const DEFAULT_MOVIES_INDEX: &str = "movies_map.json";
const DEFAULT_OMDB_CACHE_TTL_SECS: u64 = 6 * 60 * 60;
const DEFAULT_LOOKUP_CACHE_CAPACITY: usize = 1024;

fn default_name() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|os| os.into_string().ok())
        .filter(|s| !s.is_empty());
    match host {
        Some(host) => format!("Local Files on LAN [{}]", host),
        None => "Local Files on LAN".to_string(),
    }
}

#[derive(Deserialize, Default, Debug)]
pub struct FileConfig {
    pub series_dir: Option<PathBuf>,
    pub movies_dir: Option<PathBuf>,
    pub series_index: Option<PathBuf>,
    pub movies_index: Option<PathBuf>,
    pub port: Option<u16>,
    pub name: Option<String>,
    pub compact_titles: Option<bool>,
    pub omdb_api_key: Option<String>,
    /// Seconds a resolved OMDb title stays cached.
    pub omdb_cache_ttl_secs: Option<u64>,
    pub lookup_cache_capacity: Option<usize>,
    pub public_host: Option<String>,
    pub localhost: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub series_dir: PathBuf,
    pub movies_dir: PathBuf,
    pub series_index: PathBuf,
    pub movies_index: PathBuf,
    pub port: u16,
    pub name: String,
    pub compact_titles: bool,
    pub omdb_api_key: Option<String>,
    pub omdb_cache_ttl: Duration,
    pub lookup_cache_capacity: usize,
    pub public_host: String,
    pub localhost: bool,
}

impl Config {
    /// Merge CLI/env arguments over the TOML file over built-in defaults.
    pub fn resolve(file: Option<FileConfig>, args: &crate::cli::Args) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();
        let series_dir = args
            .series_dir
            .clone()
            .or(file.series_dir)
            .ok_or(ConfigError::Missing("series_dir"))?;
        let movies_dir = args
            .movies_dir
            .clone()
            .or(file.movies_dir)
            .ok_or(ConfigError::Missing("movies_dir"))?;
        let localhost = args.localhost || file.localhost.unwrap_or(false);

        Ok(Config {
            series_dir,
            movies_dir,
            series_index: args
                .series_index
                .clone()
                .or(file.series_index)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SERIES_INDEX)),
            movies_index: args
                .movies_index
                .clone()
                .or(file.movies_index)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MOVIES_INDEX)),
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            name: args.name.clone().or(file.name).unwrap_or_else(default_name),
            compact_titles: args.compact_titles || file.compact_titles.unwrap_or(false),
            omdb_api_key: args
                .omdb_api_key
                .clone()
                .or(file.omdb_api_key)
                .filter(|key| !key.trim().is_empty()),
            omdb_cache_ttl: Duration::from_secs(
                file.omdb_cache_ttl_secs.unwrap_or(DEFAULT_OMDB_CACHE_TTL_SECS),
            ),
            lookup_cache_capacity: file
                .lookup_cache_capacity
                .filter(|cap| *cap > 0)
                .unwrap_or(DEFAULT_LOOKUP_CACHE_CAPACITY),
            public_host: args
                .public_host
                .clone()
                .or(file.public_host)
                .unwrap_or_else(|| {
                    if localhost {
                        Ipv4Addr::LOCALHOST.to_string()
                    } else {
                        detect_lan_ip().to_string()
                    }
                }),
            localhost,
        })
    }

    /// Base URL players use to reach this server, e.g. `http://192.168.1.20:7000`.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.public_host, self.port)
    }
}

/// Best-effort LAN address: the local side of a UDP socket "connected" to a public address.
/// No packet is sent. Falls back to loopback when there is no route.
pub fn detect_lan_ip() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .ok()
        .filter(|ip| !ip.is_unspecified())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_owned());
    }
    let cwd_config = PathBuf::from("lanstream.toml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }
    if let Some(config_dir) = dirs::config_dir() {
        let xdg_config = config_dir.join("lanstream").join("config.toml");
        if xdg_config.exists() {
            return Some(xdg_config);
        }
    }
    None
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required setting `{0}` (pass it as a flag, env var or config key)")]
    Missing(&'static str),
}

pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: FileConfig = toml::from_str(&content)?;
    Ok(config)
}
