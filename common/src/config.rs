//! Environment-driven configuration.
//!
//! Keys follow the hierarchical `Section:Name` convention (`Loki:Uri`,
//! `ConnectionStrings:BaseMaster`). Since most shells cannot export a
//! variable containing `:`, every lookup also tries the `__` form
//! (`Loki__Uri`).

use std::env;

/// Default bind host for all services.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Output format for the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, one line per event.
    Text,
    /// Newline-delimited JSON, current span included.
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Process-wide configuration shared by every service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Logical service name, used in logs and responses.
    pub service_name: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Log output format (`LOG_FORMAT`).
    pub log_format: LogFormat,
    /// Log aggregation endpoint (`Loki:Uri`), if any.
    pub log_sink_uri: Option<String>,
    /// Maximum pooled database connections (`DB_MAX_CONNECTIONS`).
    pub max_connections: u32,
    /// Database connect/acquire timeout in seconds (`DB_CONNECT_TIMEOUT_SECS`).
    pub connect_timeout_secs: u64,
}

impl AppConfig {
    /// Loads the configuration for `service_name`, binding to `default_port`
    /// unless `SERVER_PORT` says otherwise.
    pub fn load_with_service(service_name: &str, default_port: u16) -> Self {
        Self {
            service_name: service_name.to_string(),
            host: lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or("SERVER_PORT", default_port),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(LogFormat::Text),
            log_sink_uri: lookup("Loki:Uri"),
            max_connections: parse_or("DB_MAX_CONNECTIONS", 5),
            connect_timeout_secs: parse_or("DB_CONNECT_TIMEOUT_SECS", 10),
        }
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Resolves a configuration key from the environment.
///
/// Tries `key` verbatim first, then with every `:` replaced by `__`.
/// Empty values count as missing.
pub fn lookup(key: &str) -> Option<String> {
    let direct = env::var(key).ok();
    let nested = || {
        key.contains(':')
            .then(|| env::var(key.replace(':', "__")).ok())
            .flatten()
    };
    direct
        .or_else(nested)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolves a named connection string (`ConnectionStrings:<name>` or bare `<name>`).
pub fn connection_string(name: &str) -> Option<String> {
    lookup(&format!("ConnectionStrings:{name}")).or_else(|| lookup(name))
}

/// Parses a key into `T`, falling back to `default` when missing or invalid.
pub fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own keys since the environment is process-global.

    #[test]
    fn test_lookup_prefers_verbatim_key() {
        env::set_var("CfgTest:Direct", "a");
        env::set_var("CfgTest__Direct", "b");
        assert_eq!(lookup("CfgTest:Direct").as_deref(), Some("a"));
    }

    #[test]
    fn test_lookup_falls_back_to_double_underscore() {
        env::set_var("CfgTest__Nested", " http://loki:3100 ");
        assert_eq!(lookup("CfgTest:Nested").as_deref(), Some("http://loki:3100"));
    }

    #[test]
    fn test_lookup_treats_empty_as_missing() {
        env::set_var("CFG_TEST_EMPTY", "  ");
        assert_eq!(lookup("CFG_TEST_EMPTY"), None);
    }

    #[test]
    fn test_connection_string_sections() {
        env::set_var("ConnectionStrings__CfgTestBase", "postgres://a");
        env::set_var("CfgTestOther", "mysql://b");
        assert_eq!(connection_string("CfgTestBase").as_deref(), Some("postgres://a"));
        assert_eq!(connection_string("CfgTestOther").as_deref(), Some("mysql://b"));
        assert_eq!(connection_string("CfgTestMissing"), None);
    }

    #[test]
    fn test_parse_or_ignores_garbage() {
        env::set_var("CFG_TEST_PORT", "not-a-port");
        assert_eq!(parse_or("CFG_TEST_PORT", 8080u16), 8080);
    }
}
