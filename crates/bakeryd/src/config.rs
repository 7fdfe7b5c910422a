//! Configuration loading from `BAKERY_*` environment variables.

use std::path::PathBuf;

/// Default control API port.
const DEFAULT_PORT: u16 = 47123;
/// Default router proxy candidates, tried in order.
pub const DEFAULT_ROUTER_PORTS: &[u16] = &[80, 443, 4080];

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind host for the control API (also the advertised daemon host).
    pub host: String,
    /// Control API port.
    pub port: u16,
    /// Directory holding the state database; created if absent.
    pub data_dir: PathBuf,
    /// DNS tail appended to every slice hostname.
    pub host_suffix: String,
    /// Inclusive port range handed out to slice resources.
    pub port_range_start: u16,
    pub port_range_end: u16,
    /// Router proxy candidate ports, tried in order.
    pub router_ports: Vec<u16>,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Optional variables (with defaults):
    /// - `BAKERY_HOST` (127.0.0.1)
    /// - `BAKERY_PORT` (47123)
    /// - `BAKERY_DATA_DIR` (~/.bakery)
    /// - `BAKERY_HOST_SUFFIX` (localtest.me)
    /// - `BAKERY_PORT_RANGE_START` / `BAKERY_PORT_RANGE_END` (30000 / 45000)
    /// - `BAKERY_ROUTER_PORTS` (80,443,4080; invalid tokens discarded)
    ///
    /// Numeric variables that are present but not integers fail with a
    /// [`ConfigError`] naming the variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("BAKERY_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_port(&lookup, "BAKERY_PORT", DEFAULT_PORT)?;

        let data_dir = match lookup("BAKERY_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or(ConfigError::NoHomeDir)?
                .join(".bakery"),
        };

        let host_suffix =
            lookup("BAKERY_HOST_SUFFIX").unwrap_or_else(|| "localtest.me".to_string());

        let port_range_start = parse_port(&lookup, "BAKERY_PORT_RANGE_START", 30000)?;
        let port_range_end = parse_port(&lookup, "BAKERY_PORT_RANGE_END", 45000)?;
        if port_range_start > port_range_end {
            return Err(ConfigError::Invalid(
                "BAKERY_PORT_RANGE_START",
                format!("range start {port_range_start} exceeds end {port_range_end}"),
            ));
        }

        let router_ports = match lookup("BAKERY_ROUTER_PORTS") {
            Some(raw) => parse_router_ports(&raw),
            None => DEFAULT_ROUTER_PORTS.to_vec(),
        };

        Ok(Self {
            host,
            port,
            data_dir,
            host_suffix,
            port_range_start,
            port_range_end,
            router_ports,
        })
    }
}

/// Router port candidates: comma-separated, invalid tokens discarded; an
/// entirely invalid list falls back to the default candidates.
fn parse_router_ports(raw: &str) -> Vec<u16> {
    let ports: Vec<u16> = raw
        .split(',')
        .filter_map(|token| token.trim().parse().ok())
        .collect();
    if ports.is_empty() {
        DEFAULT_ROUTER_PORTS.to_vec()
    } else {
        ports
    }
}

fn parse_port(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u16,
) -> Result<u16, ConfigError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, format!("'{raw}' is not a port number"))),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),

    #[error("cannot determine home directory for the default data dir; set BAKERY_DATA_DIR")]
    NoHomeDir,
}
