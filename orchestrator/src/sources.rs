//! 下游计数服务配置
//!
//! Each counting backend is one [`DownstreamSource`]. The list is ordered:
//! the orchestrator queries the sources in exactly this order.

use common::config;
use common::errors::{AppError, AppResult};
use reqwest::Url;

/// Backends queried when `CountingBackends` is not set.
pub const DEFAULT_BACKENDS: [&str; 3] = ["Postgres", "MySql", "SqlServer"];

/// One configured counting backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamSource {
    /// Backend identifier (`Postgres`, `MySql`, `SqlServer`, ...).
    pub name: String,
    /// Absolute URL of the backend's counting endpoint.
    pub url: String,
}

impl DownstreamSource {
    /// Creates a source after checking that `url` is an absolute http(s) URL.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> AppResult<Self> {
        let name = name.into();
        let url = url.into();
        let parsed = Url::parse(&url)
            .map_err(|e| AppError::Config(format!("invalid URL for {name} ({url}): {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "URL for {name} must be http(s): {url}"
            )));
        }
        Ok(Self { name, url })
    }

    /// Configuration key holding this backend's URL.
    pub fn config_key(name: &str) -> String {
        format!("ApiContagem{name}")
    }

    /// Name of the span bounding one call to this backend.
    pub fn span_name(&self) -> String {
        format!("RequestApiContagem{}", self.name)
    }

    /// Value of the span's `api` tag.
    pub fn api_name(&self) -> String {
        format!("APIContagem{}", self.name)
    }
}

/// Loads the ordered source list.
///
/// `CountingBackends` (comma separated) selects the backends, defaulting to
/// [`DEFAULT_BACKENDS`]; each URL is read from `ApiContagem<Backend>`.
pub fn load_sources() -> AppResult<Vec<DownstreamSource>> {
    let names: Vec<String> = match config::lookup("CountingBackends") {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        None => DEFAULT_BACKENDS.iter().map(|s| s.to_string()).collect(),
    };
    resolve_sources(&names, config::lookup)
}

/// Resolves each backend's URL through `lookup`.
pub fn resolve_sources<F>(names: &[String], lookup: F) -> AppResult<Vec<DownstreamSource>>
where
    F: Fn(&str) -> Option<String>,
{
    if names.is_empty() {
        return Err(AppError::Config("no counting backends configured".into()));
    }

    let mut sources = Vec::with_capacity(names.len());
    for name in names {
        if sources.iter().any(|s: &DownstreamSource| &s.name == name) {
            return Err(AppError::Config(format!("backend {name} listed twice")));
        }
        let key = DownstreamSource::config_key(name);
        let url = lookup(&key).ok_or_else(|| AppError::Config(format!("missing {key}")))?;
        sources.push(DownstreamSource::new(name.clone(), url)?);
    }
    Ok(sources)
}
