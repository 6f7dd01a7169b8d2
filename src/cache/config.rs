//! Immutable cache policy, assembled once at startup.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::context::Context;

use super::error::{CacheError, ConfigError};
use super::pattern::RoutePattern;

/// Key prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "rttp-response-cache:";
/// Primary tier TTL used when none is configured (30 minutes).
pub const DEFAULT_EXPIRE: Duration = Duration::from_secs(30 * 60);
/// Backup tier TTL used when none is configured (2 hours).
pub const DEFAULT_EXPIRE_DUMP: Duration = Duration::from_secs(2 * 60 * 60);
/// Route list used when none is configured: every path.
pub const DEFAULT_ROUTE: &str = "(.*)";

/// Receives every failure the cache swallows.
pub type ErrorHook = Arc<dyn Fn(&CacheError) + Send + Sync>;
/// A yes/no decision about one request.
pub type RequestPredicate = Arc<dyn Fn(&Context) -> bool + Send + Sync>;
/// Computes a key prefix from the request, e.g. per tenant or per host.
pub type PrefixFn = Arc<dyn Fn(&Context) -> String + Send + Sync>;

/// The literal or computed prefix every cache key starts with.
#[derive(Clone)]
pub enum KeyPrefix {
    Static(String),
    Dynamic(PrefixFn),
}

impl KeyPrefix {
    pub fn resolve(&self, ctx: &Context) -> Cow<'_, str> {
        match self {
            KeyPrefix::Static(prefix) => Cow::Borrowed(prefix.as_str()),
            KeyPrefix::Dynamic(prefix_fn) => Cow::Owned(prefix_fn(ctx)),
        }
    }
}

impl fmt::Debug for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPrefix::Static(prefix) => f.debug_tuple("Static").field(prefix).finish(),
            KeyPrefix::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// A route that opts requests into caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteRule {
    /// Cache matching paths with the default TTL.
    Plain(String),
    /// Cache matching paths with their own TTL.
    Overridden(String, Duration),
}

impl RouteRule {
    fn pattern(&self) -> &str {
        match self {
            RouteRule::Plain(pattern) | RouteRule::Overridden(pattern, _) => pattern,
        }
    }
}

impl From<&str> for RouteRule {
    fn from(pattern: &str) -> Self {
        RouteRule::Plain(pattern.to_owned())
    }
}

/// A [`RouteRule`] with its pattern compiled.
#[derive(Debug, Clone)]
pub(crate) struct CompiledRoute {
    pattern: RoutePattern,
    ttl: Option<Duration>,
}

impl CompiledRoute {
    /// Whether `path` matches, and the TTL override this rule carries if so.
    pub(crate) fn check(&self, path: &str) -> (bool, Option<Duration>) {
        if self.pattern.matches(path) {
            (true, self.ttl)
        } else {
            (false, None)
        }
    }
}

/// Settings of the backup ("dump") tier.
#[derive(Clone)]
pub(crate) struct BackupTier {
    pub(crate) expire: Duration,
    pub(crate) check_dump: Option<RequestPredicate>,
}

/// The complete, validated cache policy.
///
/// Built with [`CacheConfig::builder`]; immutable afterwards and shared by
/// every request.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rttp_cache::cache::CacheConfig;
///
/// let config = CacheConfig::builder()
///     .prefix("rc:")
///     .expire(Duration::from_secs(1800))
///     .route("/articles/:slug")
///     .route_with_expire("/", Duration::from_secs(60))
///     .exclude("/articles/drafts")
///     .pass_param("nocache")
///     .max_length(512 * 1024)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.expire(), Duration::from_secs(1800));
/// assert!(!config.is_backup());
/// ```
#[derive(Clone)]
pub struct CacheConfig {
    pub(crate) prefix: KeyPrefix,
    pub(crate) expire: Duration,
    pub(crate) routes: Vec<CompiledRoute>,
    pub(crate) exclude: Vec<RoutePattern>,
    pub(crate) pass_param: Option<String>,
    pub(crate) max_length: Option<usize>,
    pub(crate) on_error: Option<ErrorHook>,
    pub(crate) condition: Option<RequestPredicate>,
    pub(crate) backup: Option<BackupTier>,
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    pub fn expire(&self) -> Duration {
        self.expire
    }

    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    /// Whether the backup tier is enabled.
    pub fn is_backup(&self) -> bool {
        self.backup.is_some()
    }

    /// TTL of the backup tier, when enabled.
    pub fn expire_dump(&self) -> Option<Duration> {
        self.backup.as_ref().map(|backup| backup.expire)
    }

    pub fn error_hook(&self) -> Option<ErrorHook> {
        self.on_error.clone()
    }

    /// Whether this request should be served from the backup tier.
    pub(crate) fn is_dump_read(&self, ctx: &Context) -> bool {
        self.backup
            .as_ref()
            .and_then(|backup| backup.check_dump.as_ref())
            .is_some_and(|check_dump| check_dump(ctx))
    }

    /// Logs a swallowed failure and forwards it to the error hook.
    pub(crate) fn report(&self, error: &CacheError) {
        warn!(error = %error, "response cache degraded");
        if let Some(on_error) = &self.on_error {
            on_error(error);
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("prefix", &self.prefix)
            .field("expire", &self.expire)
            .field("routes", &self.routes.len())
            .field("exclude", &self.exclude.len())
            .field("pass_param", &self.pass_param)
            .field("max_length", &self.max_length)
            .field("expire_dump", &self.expire_dump())
            .finish_non_exhaustive()
    }
}

/// Builder for [`CacheConfig`].
#[derive(Default)]
pub struct CacheConfigBuilder {
    prefix: Option<KeyPrefix>,
    expire: Option<Duration>,
    routes: Option<Vec<RouteRule>>,
    exclude: Vec<String>,
    pass_param: Option<String>,
    max_length: Option<usize>,
    on_error: Option<ErrorHook>,
    condition: Option<RequestPredicate>,
    backup: bool,
    expire_dump: Option<Duration>,
    check_dump: Option<RequestPredicate>,
}

impl CacheConfigBuilder {
    /// A literal key prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(KeyPrefix::Static(prefix.into()));
        self
    }

    /// A key prefix computed per request.
    #[must_use]
    pub fn prefix_fn(mut self, prefix_fn: impl Fn(&Context) -> String + Send + Sync + 'static) -> Self {
        self.prefix = Some(KeyPrefix::Dynamic(Arc::new(prefix_fn)));
        self
    }

    /// Default TTL of the primary tier.
    #[must_use]
    pub fn expire(mut self, expire: Duration) -> Self {
        self.expire = Some(expire);
        self
    }

    /// Adds a route using the default TTL.
    #[must_use]
    pub fn route(self, pattern: impl Into<String>) -> Self {
        self.push_route(RouteRule::Plain(pattern.into()))
    }

    /// Adds a route with its own TTL.
    #[must_use]
    pub fn route_with_expire(self, pattern: impl Into<String>, expire: Duration) -> Self {
        self.push_route(RouteRule::Overridden(pattern.into(), expire))
    }

    /// Replaces the route list. An empty list makes nothing eligible unless a
    /// [`condition`](Self::condition) says otherwise.
    #[must_use]
    pub fn routes(mut self, routes: Vec<RouteRule>) -> Self {
        self.routes = Some(routes);
        self
    }

    fn push_route(mut self, rule: RouteRule) -> Self {
        self.routes.get_or_insert_with(Vec::new).push(rule);
        self
    }

    /// Adds a pattern that is never cached, whatever the routes say.
    #[must_use]
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    /// A query parameter that, when present and non-empty, bypasses the cache.
    #[must_use]
    pub fn pass_param(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.pass_param = (!name.is_empty()).then_some(name);
        self
    }

    /// Bodies longer than this many bytes are never stored.
    #[must_use]
    pub fn max_length(mut self, bytes: usize) -> Self {
        self.max_length = Some(bytes);
        self
    }

    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&CacheError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Decides eligibility on its own, overriding routes and exclusions.
    #[must_use]
    pub fn condition(mut self, condition: impl Fn(&Context) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Enables the backup tier.
    #[must_use]
    pub fn backup(mut self, enabled: bool) -> Self {
        self.backup = enabled;
        self
    }

    /// TTL of the backup tier.
    #[must_use]
    pub fn expire_dump(mut self, expire: Duration) -> Self {
        self.expire_dump = Some(expire);
        self
    }

    /// Selects requests that read from the backup tier instead of the primary one.
    #[must_use]
    pub fn check_dump(mut self, check_dump: impl Fn(&Context) -> bool + Send + Sync + 'static) -> Self {
        self.check_dump = Some(Arc::new(check_dump));
        self
    }

    /// Validates the options and compiles every pattern.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Pattern`] for a route or exclusion that does not
    /// compile, [`ConfigError::TtlTooShort`] for any TTL under one second.
    pub fn build(self) -> Result<CacheConfig, ConfigError> {
        let expire = check_ttl(self.expire.unwrap_or(DEFAULT_EXPIRE), "expire")?;

        let rules = self
            .routes
            .unwrap_or_else(|| vec![RouteRule::Plain(DEFAULT_ROUTE.to_owned())]);
        let mut routes = Vec::with_capacity(rules.len());
        for rule in &rules {
            let ttl = match rule {
                RouteRule::Plain(_) => None,
                RouteRule::Overridden(_, ttl) => Some(check_ttl(*ttl, "route expire")?),
            };
            routes.push(CompiledRoute {
                pattern: compile(rule.pattern())?,
                ttl,
            });
        }

        let exclude = self
            .exclude
            .iter()
            .map(|pattern| compile(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        let backup = if self.backup {
            Some(BackupTier {
                expire: check_ttl(self.expire_dump.unwrap_or(DEFAULT_EXPIRE_DUMP), "expire_dump")?,
                check_dump: self.check_dump,
            })
        } else {
            None
        };

        Ok(CacheConfig {
            prefix: self
                .prefix
                .unwrap_or_else(|| KeyPrefix::Static(DEFAULT_PREFIX.to_owned())),
            expire,
            routes,
            exclude,
            pass_param: self.pass_param,
            max_length: self.max_length,
            on_error: self.on_error,
            condition: self.condition,
            backup,
        })
    }
}

fn compile(pattern: &str) -> Result<RoutePattern, ConfigError> {
    RoutePattern::compile(pattern).map_err(|source| ConfigError::Pattern {
        pattern: pattern.to_owned(),
        source,
    })
}

fn check_ttl(ttl: Duration, option: &'static str) -> Result<Duration, ConfigError> {
    if ttl.as_secs() == 0 {
        return Err(ConfigError::TtlTooShort { option });
    }
    Ok(ttl)
}
