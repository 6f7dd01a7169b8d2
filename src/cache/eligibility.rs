//! Per-request decision: does caching apply at all?

use std::time::Duration;

use crate::context::Context;

use super::availability::Availability;
use super::config::CacheConfig;

/// Outcome of [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    pub apply: bool,
    /// TTL carried by the matching route, if it had one.
    pub ttl_override: Option<Duration>,
}

impl Eligibility {
    const SKIP: Self = Self {
        apply: false,
        ttl_override: None,
    };
}

/// Decides whether the cache handles this request.
///
/// In order, each step able to overrule the ones before it:
///
/// 1. store unreachable: skip, nothing else is consulted;
/// 2. the first matching route opts in and supplies its TTL override;
/// 3. any matching exclusion opts out;
/// 4. a configured condition replaces the decision outright;
/// 5. a present, non-empty bypass parameter opts out.
pub fn evaluate(config: &CacheConfig, availability: &Availability, ctx: &Context) -> Eligibility {
    if !availability.is_available() {
        return Eligibility::SKIP;
    }

    let path = ctx.request().path();
    let (mut apply, ttl_override) = config
        .routes
        .iter()
        .map(|route| route.check(path))
        .find(|(matched, _)| *matched)
        .unwrap_or((false, None));

    if config.exclude.iter().any(|pattern| pattern.matches(path)) {
        apply = false;
    }

    if let Some(condition) = &config.condition {
        apply = condition(ctx);
    }

    if let Some(name) = &config.pass_param {
        if ctx.request().query_param(name).is_some_and(|value| !value.is_empty()) {
            apply = false;
        }
    }

    Eligibility {
        apply,
        ttl_override,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;
    use crate::cache::CacheConfigBuilder;
    use crate::store::StoreEvent;

    fn ctx(target: &str) -> Context {
        let raw = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Context::new(Request::parse(raw.as_bytes()).unwrap().0)
    }

    fn up() -> Availability {
        let availability = Availability::new();
        availability.apply(StoreEvent::Connected, None);
        availability
    }

    fn decide(builder: CacheConfigBuilder, target: &str) -> Eligibility {
        evaluate(&builder.build().unwrap(), &up(), &ctx(target))
    }

    #[test]
    fn unavailable_store_skips_everything() {
        let config = CacheConfig::builder().condition(|_| true).build().unwrap();
        let decision = evaluate(&config, &Availability::new(), &ctx("/"));
        assert!(!decision.apply);
    }

    #[test]
    fn default_route_matches_every_path() {
        assert!(decide(CacheConfig::builder(), "/a/b?c=d").apply);
    }

    #[test]
    fn routes_match_the_path_not_the_query() {
        let builder = CacheConfig::builder().route("/search");
        assert!(decide(builder, "/search?q=rust").apply);
    }

    #[test]
    fn first_matching_route_wins() {
        let builder = CacheConfig::builder()
            .route_with_expire("/news/:id", Duration::from_secs(60))
            .route_with_expire("(.*)", Duration::from_secs(600));
        let decision = decide(builder, "/news/1");
        assert_eq!(
            decision,
            Eligibility {
                apply: true,
                ttl_override: Some(Duration::from_secs(60))
            }
        );
    }

    #[test]
    fn override_comes_from_the_matching_rule_only() {
        let builder = CacheConfig::builder()
            .route_with_expire("/news/:id", Duration::from_secs(60))
            .route("/sports");
        let decision = decide(builder, "/sports");
        assert!(decision.apply);
        assert_eq!(decision.ttl_override, None);
    }

    #[test]
    fn no_route_means_no_caching() {
        let builder = CacheConfig::builder().route("/only/this");
        assert!(!decide(builder, "/other").apply);
        assert!(!decide(CacheConfig::builder().routes(Vec::new()), "/").apply);
    }

    #[test]
    fn exclusion_beats_inclusion() {
        let builder = CacheConfig::builder().route("(.*)").exclude("/admin/(.*)");
        assert!(!decide(builder, "/admin/users").apply);
    }

    #[test]
    fn condition_is_authoritative() {
        let builder = CacheConfig::builder()
            .route("(.*)")
            .exclude("/private")
            .condition(|ctx| ctx.request().path() == "/private");
        assert!(decide(builder, "/private").apply);

        let builder = CacheConfig::builder().condition(|_| false);
        assert!(!decide(builder, "/").apply);

        let builder = CacheConfig::builder().routes(Vec::new()).condition(|_| true);
        assert!(decide(builder, "/").apply);
    }

    #[test]
    fn bypass_parameter_wins_over_everything() {
        let builder = CacheConfig::builder().pass_param("nocache").condition(|_| true);
        assert!(!decide(builder, "/a?nocache=1").apply);
    }

    #[test]
    fn encoded_bypass_parameter_is_recognized() {
        let builder = CacheConfig::builder().pass_param("nocache");
        assert!(!decide(builder, "/a?no%63ache=1").apply);
    }

    #[test]
    fn empty_bypass_parameter_is_ignored() {
        let builder = CacheConfig::builder().pass_param("nocache");
        assert!(decide(builder, "/a?nocache=").apply);
        let builder = CacheConfig::builder().pass_param("nocache");
        assert!(decide(builder, "/a?nocache").apply);
    }
}
