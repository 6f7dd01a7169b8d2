//! File-friendly mirror of the static cache options.
//!
//! Everything that can be written down as data lives here; the hooks and
//! predicates are added to the returned builder in code.
//!
//! ```json
//! {
//!   "prefix": "rc:",
//!   "expire": 1800,
//!   "routes": ["/articles/:slug", { "path": "/", "expire": 60 }],
//!   "exclude": ["/articles/drafts"],
//!   "pass_param": "nocache",
//!   "max_length": 524288,
//!   "backup": true,
//!   "expire_dump": 7200,
//!   "redis": { "host": "localhost", "port": 6379 }
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

#[cfg(feature = "redis")]
use crate::store::RedisSettings;

use super::config::{CacheConfigBuilder, RouteRule};
use super::error::ConfigError;

/// A route as written in a settings file: a bare pattern or `{ path, expire }`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RouteSetting {
    Pattern(String),
    WithExpire { path: String, expire: u64 },
}

impl From<RouteSetting> for RouteRule {
    fn from(setting: RouteSetting) -> Self {
        match setting {
            RouteSetting::Pattern(path) => RouteRule::Plain(path),
            RouteSetting::WithExpire { path, expire } => {
                RouteRule::Overridden(path, Duration::from_secs(expire))
            }
        }
    }
}

/// Deserializable cache options. TTLs are in seconds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub prefix: Option<String>,
    pub expire: Option<u64>,
    pub routes: Option<Vec<RouteSetting>>,
    pub exclude: Vec<String>,
    pub pass_param: Option<String>,
    pub max_length: Option<usize>,
    pub backup: bool,
    pub expire_dump: Option<u64>,
    #[cfg(feature = "redis")]
    pub redis: RedisSettings,
    /// Accepted and ignored, so one settings file serves every build.
    #[cfg(not(feature = "redis"))]
    pub redis: serde::de::IgnoredAny,
}

impl CacheSettings {
    /// Parses settings from a JSON document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Settings`] when the document is malformed or has unknown keys.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Seeds a [`CacheConfigBuilder`] with these settings.
    pub fn into_builder(self) -> CacheConfigBuilder {
        let mut builder = CacheConfigBuilder::default().backup(self.backup);

        if let Some(prefix) = self.prefix {
            builder = builder.prefix(prefix);
        }
        if let Some(expire) = self.expire {
            builder = builder.expire(Duration::from_secs(expire));
        }
        if let Some(routes) = self.routes {
            builder = builder.routes(routes.into_iter().map(RouteRule::from).collect());
        }
        for pattern in self.exclude {
            builder = builder.exclude(pattern);
        }
        if let Some(name) = self.pass_param {
            builder = builder.pass_param(name);
        }
        if let Some(max_length) = self.max_length {
            builder = builder.max_length(max_length);
        }
        if let Some(expire_dump) = self.expire_dump {
            builder = builder.expire_dump(Duration::from_secs(expire_dump));
        }
        builder
    }
}
