//! Site resolution: map the request host to the index it searches.
//!
//! Sites come from a TOML file with one `[[site]]` table per site. A site
//! without a `host` is the unnamed default, used when it is the only one.
//! Each site caches `properties_total`, a count of property documents in
//! its index, refreshed from the index and used only to size cardinality
//! precision thresholds.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use claimdex_core::Identifier;

use crate::error::ApiError;
use crate::index::IndexClient;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read sites file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse sites file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("sites file configures no sites")]
    Empty,

    #[error("duplicate site host: {0:?}")]
    DuplicateHost(String),
}

/// One `[[site]]` table in the sites TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Host this site answers on; absent marks the unnamed default site.
    pub host: Option<String>,
    /// Index or alias searched for this site.
    pub index: String,
    /// Whether the index records document byte sizes in `_size`
    /// (mapper-size), enabling the size filter endpoints.
    #[serde(default)]
    pub size_field: bool,
}

#[derive(Debug, Deserialize)]
struct SitesFile {
    #[serde(default)]
    site: Vec<SiteConfig>,
}

/// A configured site. Read-only after initialization except for the cached
/// property count, which readers load as a snapshot.
pub struct Site {
    pub host: Option<String>,
    pub index: String,
    pub size_field: bool,
    properties_total: AtomicI64,
}

impl Site {
    fn new(config: SiteConfig) -> Self {
        Site {
            host: config.host,
            index: config.index,
            size_field: config.size_field,
            properties_total: AtomicI64::new(0),
        }
    }

    pub fn properties_total(&self) -> i64 {
        self.properties_total.load(Ordering::Relaxed)
    }
}

pub struct SiteTable {
    sites: Vec<Arc<Site>>,
    by_host: HashMap<String, usize>,
}

impl SiteTable {
    pub fn new(configs: Vec<SiteConfig>) -> Result<Self, ConfigError> {
        if configs.is_empty() {
            return Err(ConfigError::Empty);
        }
        let sites: Vec<Arc<Site>> = configs.into_iter().map(|c| Arc::new(Site::new(c))).collect();
        let mut by_host = HashMap::new();
        for (i, site) in sites.iter().enumerate() {
            if let Some(host) = &site.host {
                if by_host.insert(host.clone(), i).is_some() {
                    return Err(ConfigError::DuplicateHost(host.clone()));
                }
            }
        }
        Ok(SiteTable { sites, by_host })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let parsed: SitesFile = toml::from_str(&raw)?;
        SiteTable::new(parsed.site)
    }

    /// A single unnamed site over one index; the no-config default.
    pub fn single(index: String, size_field: bool) -> Self {
        SiteTable::new(vec![SiteConfig { host: None, index, size_field }])
            .expect("one site is never empty")
    }

    pub fn sites(&self) -> &[Arc<Site>] {
        &self.sites
    }

    /// The site for a request host: an exact host match, else the unnamed
    /// site if exactly one is configured.
    pub fn resolve(&self, host: &str) -> Result<Arc<Site>, ApiError> {
        let host = host.split(':').next().unwrap_or(host);
        if let Some(&i) = self.by_host.get(host) {
            return Ok(Arc::clone(&self.sites[i]));
        }
        let mut unnamed = self.sites.iter().filter(|site| site.host.is_none());
        match (unnamed.next(), unnamed.next()) {
            (Some(site), None) => Ok(Arc::clone(site)),
            _ => Err(ApiError::NotFound),
        }
    }

    /// Refresh each site's property count: documents whose `TYPE` relation
    /// points at `PROPERTY`, counted through the well-known identifiers.
    /// Failures leave the previous snapshot in place.
    pub async fn refresh_properties_total(&self, index: &IndexClient) {
        let query = json!({
            "nested": {
                "path": "claims.rel",
                "query": {
                    "bool": {
                        "must": [
                            { "term": { "claims.rel.prop._id": Identifier::core_property("TYPE") } },
                            { "term": { "claims.rel.to._id": Identifier::core_property("PROPERTY") } },
                        ]
                    }
                }
            }
        });
        for site in &self.sites {
            match index.count(&site.index, &query).await {
                Ok(count) => {
                    site.properties_total.store(count, Ordering::Relaxed);
                    info!(index = site.index.as_str(), properties = count, "refreshed property count");
                }
                Err(err) => {
                    warn!(index = site.index.as_str(), error = %err, "could not refresh property count");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(configs: Vec<(Option<&str>, &str)>) -> SiteTable {
        SiteTable::new(
            configs
                .into_iter()
                .map(|(host, index)| SiteConfig {
                    host: host.map(str::to_string),
                    index: index.to_string(),
                    size_field: false,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn host_match_wins() {
        let sites = table(vec![(Some("a.example.com"), "a"), (Some("b.example.com"), "b")]);
        assert_eq!(sites.resolve("b.example.com").unwrap().index, "b");
        assert_eq!(sites.resolve("b.example.com:8472").unwrap().index, "b", "port is stripped");
    }

    #[test]
    fn single_unnamed_site_is_the_fallback() {
        let sites = table(vec![(None, "docs")]);
        assert_eq!(sites.resolve("anything.example.com").unwrap().index, "docs");
    }

    #[test]
    fn unknown_host_without_fallback_is_not_found() {
        let sites = table(vec![(Some("a.example.com"), "a")]);
        assert!(sites.resolve("b.example.com").is_err());
        let two_unnamed = table(vec![(None, "a"), (None, "b")]);
        assert!(two_unnamed.resolve("anything").is_err());
    }

    #[test]
    fn config_rejects_duplicates_and_emptiness() {
        assert!(matches!(SiteTable::new(Vec::new()), Err(ConfigError::Empty)));
        let dup = SiteTable::new(vec![
            SiteConfig { host: Some("x".to_string()), index: "a".to_string(), size_field: false },
            SiteConfig { host: Some("x".to_string()), index: "b".to_string(), size_field: true },
        ]);
        assert!(matches!(dup, Err(ConfigError::DuplicateHost(_))));
    }

    #[test]
    fn sites_toml_parses() {
        let parsed: SitesFile = toml::from_str(
            r#"
            [[site]]
            host = "search.example.com"
            index = "docs"
            size_field = true

            [[site]]
            index = "fallback"
            "#,
        )
        .unwrap();
        let sites = SiteTable::new(parsed.site).unwrap();
        assert_eq!(sites.resolve("search.example.com").unwrap().index, "docs");
        assert!(sites.resolve("search.example.com").unwrap().size_field);
        assert_eq!(sites.resolve("other.example.com").unwrap().index, "fallback");
    }
}
