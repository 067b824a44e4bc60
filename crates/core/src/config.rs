use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::attributes::parse_custom_attributes;
use crate::error::{Result, RiemlogError};
use crate::severity::Severity;
use crate::time::parse_duration_str;

pub const DEFAULT_COLLECTOR_HOST: &str = "localhost";
pub const DEFAULT_COLLECTOR_PORT: u16 = 5555;
pub const DEFAULT_SERVICE_NAME: &str = "*no-service-name*";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Udp,
    Tcp,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = RiemlogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            other => Err(RiemlogError::Parse(format!("unknown transport: {other}"))),
        }
    }
}

/// Forwarder settings. Set once before the forwarder starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub service_name: String,
    pub hostname: String,
    pub collector_host: String,
    pub collector_port: u16,
    pub transport: TransportKind,
    pub minimum_severity: Severity,
    pub custom_attributes: Vec<(String, String)>,
    pub debug: bool,
    pub max_attempts: u32,
    #[serde(with = "crate::time::duration_str")]
    pub connect_timeout: Duration,
    #[serde(with = "crate::time::duration_str")]
    pub io_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            hostname: local_hostname(),
            collector_host: DEFAULT_COLLECTOR_HOST.to_string(),
            collector_port: DEFAULT_COLLECTOR_PORT,
            transport: TransportKind::Udp,
            minimum_severity: Severity::Error,
            custom_attributes: Vec::new(),
            debug: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    /// Like [`Config::load`] but with an explicit config file, which must
    /// exist. Environment variables still override it.
    pub fn load_with_file(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let mut cfg = Self::default();
        let Some(overrides) = load_file_overrides(path)? else {
            return Err(RiemlogError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        };
        apply_overrides(&mut cfg, overrides, "config file")?;
        Ok(cfg)
    }

    pub fn collector_addr(&self) -> String {
        format!("{}:{}", self.collector_host, self.collector_port)
    }

    /// Adds `raw` custom attributes on top of the configured ones.
    pub fn add_custom_attributes(&mut self, raw: &str) {
        for (key, value) in parse_custom_attributes(raw) {
            match self.custom_attributes.iter_mut().find(|(k, _)| *k == key) {
                Some(existing) => existing.1 = value,
                None => self.custom_attributes.push((key, value)),
            }
        }
    }
}

/// Machine name as reported by the OS, falling back to `HOSTNAME`.
pub fn local_hostname() -> String {
    sysinfo::System::host_name()
        .or_else(|| env::var("HOSTNAME").ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "*no-host-name*".to_string())
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    service_name: Option<String>,
    hostname: Option<String>,
    collector_host: Option<String>,
    collector_port: Option<u16>,
    transport: Option<String>,
    minimum_severity: Option<String>,
    custom_attributes: Option<String>,
    debug: Option<bool>,
    max_attempts: Option<u32>,
    connect_timeout: Option<String>,
    io_timeout: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("RIEMLOG_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("riemlog/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| RiemlogError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| RiemlogError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        service_name: env::var("RIEMLOG_SERVICE_NAME").ok(),
        hostname: env::var("RIEMLOG_HOSTNAME").ok(),
        collector_host: env::var("RIEMLOG_COLLECTOR_HOST")
            .or_else(|_| env::var("RIEMANN_HOSTNAME"))
            .ok(),
        collector_port: parse_env("RIEMLOG_COLLECTOR_PORT")?,
        transport: env::var("RIEMLOG_TRANSPORT").ok(),
        minimum_severity: env::var("RIEMLOG_MIN_SEVERITY").ok(),
        custom_attributes: env::var("RIEMLOG_CUSTOM_ATTRIBUTES").ok(),
        debug: parse_env("RIEMLOG_DEBUG")?,
        max_attempts: parse_env("RIEMLOG_MAX_ATTEMPTS")?,
        connect_timeout: env::var("RIEMLOG_CONNECT_TIMEOUT").ok(),
        io_timeout: env::var("RIEMLOG_IO_TIMEOUT").ok(),
    })
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RiemlogError::Config(format!("bad {name} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.service_name {
        cfg.service_name = v;
    }
    if let Some(v) = overrides.hostname {
        cfg.hostname = v;
    }
    if let Some(v) = overrides.collector_host {
        cfg.collector_host = v;
    }
    if let Some(v) = overrides.collector_port {
        cfg.collector_port = v;
    }
    if let Some(v) = overrides.transport {
        cfg.transport = v.parse().map_err(|e| {
            RiemlogError::Config(format!("bad transport in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.minimum_severity {
        cfg.minimum_severity = v.parse().map_err(|e| {
            RiemlogError::Config(format!("bad minimum_severity in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.custom_attributes {
        cfg.add_custom_attributes(&v);
    }
    if let Some(v) = overrides.debug {
        cfg.debug = v;
    }
    if let Some(v) = overrides.max_attempts {
        if v == 0 {
            return Err(RiemlogError::Config(format!(
                "bad max_attempts in {source}: must be at least 1"
            )));
        }
        cfg.max_attempts = v;
    }
    if let Some(v) = overrides.connect_timeout {
        cfg.connect_timeout = parse_duration_str(&v)
            .map_err(|e| RiemlogError::Config(format!("bad connect_timeout in {source}: {e}")))?;
    }
    if let Some(v) = overrides.io_timeout {
        cfg.io_timeout = parse_duration_str(&v)
            .map_err(|e| RiemlogError::Config(format!("bad io_timeout in {source}: {e}")))?;
    }
    Ok(())
}
