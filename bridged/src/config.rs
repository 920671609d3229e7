use std::{net::SocketAddr, path::PathBuf, time::Duration};

use adapter_nhc2::{DEFAULT_CLIENT_ID, DEFAULT_PORT, Nhc2Options};
use anyhow::{self, Result};
use bridge_core::bridge::BridgeOptions;
use dotenv::dotenv;
use url::Url;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind: SocketAddr,
    pub nhc2: Nhc2Options,
    pub bridge: BridgeOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8581)),
            nhc2: Nhc2Options::default(),
            bridge: BridgeOptions::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut c = Self::default();
        if let Some(s) = var("BRIDGE_BIND") {
            c.bind = s.parse()?;
        }
        if let Some(conn) = var("NHC2_MQTT_URL") {
            apply_connection_string(&mut c.nhc2, &conn)?;
        }
        if let Some(s) = var("NHC2_HOST") {
            c.nhc2.host = s;
        }
        if let Some(s) = var("NHC2_PORT") {
            c.nhc2.port = s.parse()?;
        }
        if let Some(s) = var("NHC2_CLIENT_ID") {
            c.nhc2.client_id = s;
        }
        if let Some(s) = var("NHC2_USERNAME") {
            c.nhc2.username = s;
        }
        if let Some(s) = var("NHC2_PASSWORD") {
            c.nhc2.password = s;
        }
        if let Some(s) = var("NHC2_TLS") {
            c.nhc2.tls = parse_bool(&s)?;
        }
        if let Some(s) = var("NHC2_CA_FILE") {
            c.nhc2.ca_file = Some(PathBuf::from(s));
        }
        if let Some(s) = var("BRIDGE_PLUGIN_ID") {
            c.bridge.plugin_id = s;
        }
        if let Some(s) = var("BRIDGE_PLATFORM_ID") {
            c.bridge.platform_id = s;
        }
        if let Some(s) = var("BRIDGE_SYNC_TIMEOUT_SECS") {
            c.bridge.sync_timeout = Duration::from_secs(s.parse()?);
        }
        if let Some(s) = var("BRIDGE_SYNC_ATTEMPTS") {
            c.bridge.sync_attempts = s.parse()?;
        }
        if let Some(s) = var("BRIDGE_LIST_DEVICES") {
            c.bridge.list_devices = parse_bool(&s)?;
        }
        Ok(c)
    }
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("invalid boolean: {other}"),
    }
}

/// Accepts `mqtts://host:port?client_id=...`; `mqtt://` turns TLS off.
fn apply_connection_string(opts: &mut Nhc2Options, conn: &str) -> Result<()> {
    let url = Url::parse(conn)?;
    opts.tls = match url.scheme() {
        "mqtts" => true,
        "mqtt" => false,
        other => anyhow::bail!("unsupported mqtt url scheme: {other}"),
    };

    opts.host = url.host_str().ok_or_else(|| anyhow::anyhow!("mqtt url missing host"))?.to_string();
    opts.port = url.port().unwrap_or(DEFAULT_PORT);
    if !url.username().is_empty() {
        opts.username = url.username().to_string();
    }
    if let Some(password) = url.password() {
        opts.password = password.to_string();
    }
    opts.client_id = url
        .query_pairs()
        .find(|(k, _)| k == "client_id")
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_controller_conventions() {
        let c = Config::from_vars(vars(&[])).unwrap();
        assert_eq!(c.nhc2.port, 8884);
        assert_eq!(c.nhc2.username, "hobby");
        assert_eq!(c.nhc2.client_id, "nhc2-bridge");
        assert!(c.nhc2.tls);
        assert_eq!(c.bridge.sync_attempts, 3);
        assert!(!c.bridge.list_devices);
    }

    #[test]
    fn explicit_vars_override_defaults() {
        let c = Config::from_vars(vars(&[
            ("NHC2_HOST", "192.168.1.20"),
            ("NHC2_PASSWORD", "secret"),
            ("NHC2_TLS", "false"),
            ("BRIDGE_SYNC_TIMEOUT_SECS", "5"),
            ("BRIDGE_LIST_DEVICES", "yes"),
            ("BRIDGE_BIND", "0.0.0.0:9000"),
        ]))
        .unwrap();
        assert_eq!(c.nhc2.host, "192.168.1.20");
        assert_eq!(c.nhc2.password, "secret");
        assert!(!c.nhc2.tls);
        assert_eq!(c.bridge.sync_timeout, Duration::from_secs(5));
        assert!(c.bridge.list_devices);
        assert_eq!(c.bind.port(), 9000);
    }

    #[test]
    fn connection_string_then_overrides() {
        let c = Config::from_vars(vars(&[
            ("NHC2_MQTT_URL", "mqtt://hobby:pw@controller.local:1883?client_id=kitchen"),
            ("NHC2_PORT", "8885"),
        ]))
        .unwrap();
        assert_eq!(c.nhc2.host, "controller.local");
        assert_eq!(c.nhc2.port, 8885);
        assert_eq!(c.nhc2.client_id, "kitchen");
        assert_eq!(c.nhc2.password, "pw");
        assert!(!c.nhc2.tls);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_vars(vars(&[("NHC2_MQTT_URL", "http://x")])).is_err());
        assert!(Config::from_vars(vars(&[("NHC2_TLS", "maybe")])).is_err());
        assert!(Config::from_vars(vars(&[("NHC2_PORT", "huge")])).is_err());
    }
}
