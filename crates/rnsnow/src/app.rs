//! The `rnsnow` configuration file.
//!
//! ```json
//! {
//!   "description": "bench node",
//!   "serial": { "path": "/dev/ttyUSB0", "baud": 115200 },
//!   "radio": { "bind": "0.0.0.0:4242", "peers": ["192.168.1.20:4242"] },
//!   "log_level": 3,
//!   "link": { "group_id": "RNS09", "channel": 1, "preferred_channels": [6, 11] }
//! }
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use rnsnow_link::LinkConfig;
use rnsnow_transport::serial::{validate_baud, DEFAULT_BAUD_RATE};
use serde::{Deserialize, Serialize};

use crate::exit::{io_error, link_error, CliError, CliResult, CONFIG_ERROR};
use crate::logging::LogLevel;

/// UDP port the radio binds when none is configured.
pub const DEFAULT_RADIO_PORT: u16 = 4242;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    /// Serial device. Stdin/stdout when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: None,
            baud: DEFAULT_BAUD_RATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RadioConfig {
    /// Local UDP endpoint.
    pub bind: SocketAddr,
    /// Endpoints every packet is sent to.
    pub peers: Vec<SocketAddr>,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_RADIO_PORT)),
            peers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub description: String,
    pub serial: SerialConfig,
    pub radio: RadioConfig,
    /// 0 critical, 1 error, 2 warning, 3 info, 4 debug.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<u8>,
    pub link: LinkConfig,
}

impl AppConfig {
    /// Load `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path)
            .map_err(|err| io_error(&format!("read {}", path.display()), err))?;
        Self::parse(&contents)
            .map_err(|err| CliError::new(err.code, format!("{}: {}", path.display(), err)))
    }

    pub fn parse(s: &str) -> CliResult<Self> {
        let config: Self = serde_json::from_str(s)
            .map_err(|err| CliError::new(CONFIG_ERROR, format!("invalid config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CliResult<()> {
        validate_baud(self.serial.baud)
            .map_err(|err| CliError::new(CONFIG_ERROR, format!("serial.baud: {err}")))?;
        if self.log_level.is_some_and(|l| LogLevel::from_numeric(l).is_none()) {
            return Err(CliError::new(
                CONFIG_ERROR,
                "log_level must be between 0 and 4",
            ));
        }
        self.link
            .validate()
            .map_err(|err| link_error("link", err))
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level.and_then(LogLevel::from_numeric)
    }
}
