//! Platform configuration: the `app.conf` properties file and the DNS
//! manager environment settings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use mep_core::endpoint::DEFAULT_GATEWAY_AUTHORITY;
use tracing::warn;

/// Default location of the platform properties file.
pub const DEFAULT_APP_CONF_PATH: &str = "/usr/mep/conf/app.conf";

pub const DEFAULT_DNS_HOST: &str = "localhost";
pub const DEFAULT_DNS_PORT: u16 = 8080;

const MAX_FQDN_LEN: usize = 253;
const MAX_PORT_LEN: usize = 5;

/// Property keys read from `app.conf`.
pub mod keys {
    pub const APIGW_HOST: &str = "apigw_host";
    pub const APIGW_PORT: &str = "apigw_port";
    pub const APIGW_CACERT: &str = "apigw_cacert";
    pub const SERVER_NAME: &str = "server_name";
    pub const SSL_CIPHERS: &str = "ssl_ciphers";
}

#[derive(Debug, thiserror::Error)]
pub enum AppConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Parsed `KEY=VALUE` properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    values: HashMap<String, String>,
}

impl AppConfig {
    /// Loads properties from `path`. An empty path yields an empty config.
    ///
    /// # Errors
    ///
    /// Returns [`AppConfigError::Read`] if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self, AppConfigError> {
        if path.as_os_str().is_empty() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| AppConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Parses properties text. Blank lines and `#` comments are skipped,
    /// keys and values are trimmed, and lines without `=` are ignored.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let values = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        Self { values }
    }

    /// Value for `key`, or `""` when unset.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map_or("", String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// API gateway connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub apigw_host: String,
    pub apigw_port: String,
    pub apigw_cacert: String,
    pub server_name: String,
    pub ssl_ciphers: String,
    /// Authority written into synthesized service URIs.
    pub public_authority: String,
}

impl GatewaySettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            apigw_host: config.get(keys::APIGW_HOST).to_string(),
            apigw_port: config.get(keys::APIGW_PORT).to_string(),
            apigw_cacert: config.get(keys::APIGW_CACERT).to_string(),
            server_name: config.get(keys::SERVER_NAME).to_string(),
            ssl_ciphers: config.get(keys::SSL_CIPHERS).to_string(),
            public_authority: DEFAULT_GATEWAY_AUTHORITY.to_string(),
        }
    }

    /// Whether an admin endpoint is configured at all.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.apigw_host.is_empty()
    }
}

/// DNS manager endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsSettings {
    pub host: String,
    pub port: u16,
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_DNS_HOST.to_string(),
            port: DEFAULT_DNS_PORT,
        }
    }
}

impl DnsSettings {
    /// Reads `DNS_SERVER_HOST` and `DNS_SERVER_PORT` from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let host = std::env::var("DNS_SERVER_HOST").ok();
        let port = std::env::var("DNS_SERVER_PORT").ok();
        Self::from_values(host.as_deref(), port.as_deref())
    }

    /// Applies raw values, falling back to defaults for anything invalid.
    #[must_use]
    pub fn from_values(host: Option<&str>, port: Option<&str>) -> Self {
        let mut settings = Self::default();

        match host {
            Some(h) if h.len() > MAX_FQDN_LEN => {
                warn!("invalid dns remote server host configured, reset back to default");
            }
            Some(h) if !h.is_empty() => settings.host = h.to_string(),
            _ => {}
        }

        match port {
            Some(p) if p.len() > MAX_PORT_LEN => {
                warn!("invalid dns remote server port configured, reset back to default");
            }
            Some(p) if !p.is_empty() => match p.parse::<u16>() {
                Ok(num) if num > 0 => settings.port = num,
                _ => warn!(port = p, "invalid dns remote server port range, reset back to default"),
            },
            _ => {}
        }
        settings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parse_skips_comments_and_trims() {
        let config = AppConfig::parse(
            "# gateway\n\napigw_host = 10.0.0.1 \napigw_port=8444\nnot a pair\n=orphan\nssl_ciphers=A,B\n",
        );
        assert_eq!(config.get(keys::APIGW_HOST), "10.0.0.1");
        assert_eq!(config.get(keys::APIGW_PORT), "8444");
        assert_eq!(config.get(keys::SSL_CIPHERS), "A,B");
        assert_eq!(config.get("missing"), "");
        assert_eq!(config.len(), 3);
    }

    #[test]
    fn value_may_contain_equals() {
        let config = AppConfig::parse("server_name=a=b\n");
        assert_eq!(config.get(keys::SERVER_NAME), "a=b");
    }

    #[test]
    fn load_reads_file_and_empty_path_is_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "apigw_host=gw.local").unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.get(keys::APIGW_HOST), "gw.local");

        assert!(AppConfig::load(Path::new("")).unwrap().is_empty());
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(&dir.path().join("absent.conf")).unwrap_err();
        assert!(matches!(err, AppConfigError::Read { .. }));
    }

    #[test]
    fn gateway_settings_from_config() {
        let config = AppConfig::parse("apigw_host=gw\napigw_port=8444\nserver_name=edge\n");
        let settings = GatewaySettings::from_config(&config);
        assert!(settings.is_configured());
        assert_eq!(settings.server_name, "edge");
        assert_eq!(settings.public_authority, DEFAULT_GATEWAY_AUTHORITY);
        assert!(!GatewaySettings::from_config(&AppConfig::default()).is_configured());
    }

    #[test]
    fn dns_settings_accept_valid_values() {
        let settings = DnsSettings::from_values(Some("dns.mep"), Some("53"));
        assert_eq!(settings.host, "dns.mep");
        assert_eq!(settings.port, 53);
    }

    #[test]
    fn dns_settings_fall_back_on_invalid_values() {
        let long_host = "h".repeat(MAX_FQDN_LEN + 1);
        let settings = DnsSettings::from_values(Some(&long_host), Some("123456"));
        assert_eq!(settings, DnsSettings::default());

        for port in ["0", "70000", "http", "-1"] {
            assert_eq!(DnsSettings::from_values(None, Some(port)).port, DEFAULT_DNS_PORT);
        }

        assert_eq!(DnsSettings::from_values(Some(""), None).host, DEFAULT_DNS_HOST);
    }
}
