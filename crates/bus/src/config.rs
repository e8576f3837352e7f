//! Bus configuration loaded from `sentinel.toml`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BusError;
use crate::transport::Transport;

/// Endpoints the workers need to reach the message fabric.
///
/// Publishers connect to the broker `frontend`, subscribers to the `backend`.
/// The two mailbox endpoints are ROUTER sockets bound by the respective
/// worker; peers reach them with DEALER clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Endpoint where publishers send stream messages.
    #[serde(default = "default_frontend")]
    pub frontend: String,

    /// Endpoint where subscribers receive stream messages.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Mailbox endpoint of the alert engine (rule CRUD RPC).
    #[serde(default = "default_engine_mailbox")]
    pub engine_mailbox: String,

    /// Mailbox endpoint of the autoconfigurator (template listing RPC).
    #[serde(default = "default_autoconfig_mailbox")]
    pub autoconfig_mailbox: String,
}

fn default_frontend() -> String {
    "ipc:///tmp/sentinel/broker-frontend.sock".into()
}

fn default_backend() -> String {
    "ipc:///tmp/sentinel/broker-backend.sock".into()
}

fn default_engine_mailbox() -> String {
    "ipc:///tmp/sentinel/engine-mailbox.sock".into()
}

fn default_autoconfig_mailbox() -> String {
    "ipc:///tmp/sentinel/autoconfig-mailbox.sock".into()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            frontend: default_frontend(),
            backend: default_backend(),
            engine_mailbox: default_engine_mailbox(),
            autoconfig_mailbox: default_autoconfig_mailbox(),
        }
    }
}

impl BusConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, BusError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BusError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Config for single-host deployment using IPC sockets.
    pub fn local() -> Self {
        Self::default()
    }

    pub fn frontend_transport(&self) -> Transport {
        parse_endpoint(&self.frontend)
    }

    pub fn backend_transport(&self) -> Transport {
        parse_endpoint(&self.backend)
    }

    pub fn engine_mailbox_transport(&self) -> Transport {
        parse_endpoint(&self.engine_mailbox)
    }

    pub fn autoconfig_mailbox_transport(&self) -> Transport {
        parse_endpoint(&self.autoconfig_mailbox)
    }
}

/// Best-effort endpoint string → [`Transport`] conversion.
///
/// `tcp://host:port` becomes [`Transport::Tcp`]; anything else is treated as
/// an IPC socket name (with scheme, directory and extension stripped).
pub fn parse_endpoint(endpoint: &str) -> Transport {
    if let Some(rest) = endpoint.strip_prefix("tcp://") {
        if let Some((host, port)) = rest.rsplit_once(':') {
            if let Ok(port) = port.parse::<u16>() {
                return Transport::tcp(host, port);
            }
        }
    }
    let name = endpoint
        .strip_prefix("ipc://")
        .unwrap_or(endpoint)
        .rsplit('/')
        .next()
        .unwrap_or(endpoint)
        .trim_end_matches(".sock");
    Transport::ipc(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_ipc() {
        let cfg = BusConfig::local();
        assert_eq!(
            cfg.frontend_transport().endpoint(),
            "ipc:///tmp/sentinel/broker-frontend.sock"
        );
        assert_eq!(
            cfg.engine_mailbox_transport().endpoint(),
            "ipc:///tmp/sentinel/engine-mailbox.sock"
        );
    }

    #[test]
    fn tcp_endpoints_parse() {
        let t = parse_endpoint("tcp://10.0.0.1:7001");
        assert_eq!(t, Transport::tcp("10.0.0.1", 7001));
    }

    #[test]
    fn toml_overrides_defaults() {
        let cfg = BusConfig::from_toml(
            r#"
            frontend = "tcp://127.0.0.1:7000"
            backend = "tcp://127.0.0.1:7001"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.frontend_transport(), Transport::tcp("127.0.0.1", 7000));
        // missing keys fall back to defaults
        assert_eq!(cfg.engine_mailbox, "ipc:///tmp/sentinel/engine-mailbox.sock");
    }
}
