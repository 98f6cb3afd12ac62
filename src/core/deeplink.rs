//! Purpose: Hold at most one pending external navigation and turn it into a route.
//! Exports: `DeepLinkResolver`, `IncomingLink`, `LinkRules`, `LinkRoute`, `resolve_link`.
//! Role: Consulted once per completed hydration run; arrival is decoupled from consumption.
//! Invariants: At most one link is pending; a newer distinct link replaces the older one.
//! Invariants: Parse failures never escape `on_hydration_complete`; they fall back to landing.
//! Invariants: `resolve_link` is pure and performs no navigation.

use super::error::{Error, ErrorKind};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_PRIVATE_SCHEME: &str = "libapp";
pub const DEFAULT_PUBLIC_PREFIX: &str = "https://libapp.link/";
pub const DEFAULT_DEV_SCHEMES: [&str; 2] = ["exp", "exps"];

// Expo development links carry the in-app path after this segment.
const DEV_PATH_MARKER: &str = "/--";

const NOTIFICATION_URL_POINTERS: [&str; 3] = [
    "/url",
    "/data/url",
    "/notification/request/content/data/url",
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkSource {
    ColdStartUrl,
    PushNotification,
}

impl LinkSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ColdStartUrl => "cold_start_url",
            Self::PushNotification => "push_notification",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IncomingLink {
    pub raw_url: String,
    pub source: LinkSource,
    pub received_at: OffsetDateTime,
}

impl IncomingLink {
    pub fn new(raw_url: impl Into<String>, source: LinkSource) -> Self {
        Self {
            raw_url: raw_url.into(),
            source,
            received_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn cold_start(raw_url: impl Into<String>) -> Self {
        Self::new(raw_url, LinkSource::ColdStartUrl)
    }

    pub fn notification(raw_url: impl Into<String>) -> Self {
        Self::new(raw_url, LinkSource::PushNotification)
    }

    /// Extracts the optional `url` field from a push-notification payload.
    pub fn from_notification_payload(payload: &Value) -> Option<Self> {
        NOTIFICATION_URL_POINTERS
            .iter()
            .filter_map(|pointer| payload.pointer(pointer))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|url| !url.is_empty())
            .map(Self::notification)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkRules {
    pub private_scheme: String,
    pub public_prefix: String,
    pub dev_schemes: Vec<String>,
}

impl Default for LinkRules {
    fn default() -> Self {
        Self {
            private_scheme: DEFAULT_PRIVATE_SCHEME.to_string(),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
            dev_schemes: DEFAULT_DEV_SCHEMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl LinkRules {
    fn is_placeholder(&self, raw: &str) -> bool {
        let raw = raw.trim();
        raw.is_empty()
            || raw.trim_end_matches('/') == self.public_prefix.trim_end_matches('/')
            || raw == format!("{}://", self.private_scheme)
    }

    /// Public prefix with exactly one trailing slash, ready to take an in-app path.
    fn public_base(&self) -> String {
        format!("{}/", self.public_prefix.trim_end_matches('/'))
    }

    fn is_dev_scheme(&self, scheme: &str) -> bool {
        self.dev_schemes.iter().any(|dev| dev.eq_ignore_ascii_case(scheme))
    }
}

/// What the routing step needs to know about the hydrated session.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LinkContext {
    pub library_base_url: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkRoute {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub normalized_url: String,
}

impl LinkRoute {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Path plus serialized query, as handed to a path-based router.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        format!("{}?{query}", self.path)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RouteDecision {
    Landing,
    Link(LinkRoute),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum ResolverState {
    #[default]
    Idle,
    Pending(IncomingLink),
    Consumed(IncomingLink),
}

impl ResolverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending(_) => "pending",
            Self::Consumed(_) => "consumed",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DeepLinkResolver {
    rules: LinkRules,
    state: ResolverState,
}

impl DeepLinkResolver {
    pub fn new(rules: LinkRules) -> Self {
        Self {
            rules,
            state: ResolverState::Idle,
        }
    }

    pub fn rules(&self) -> &LinkRules {
        &self.rules
    }

    pub fn state(&self) -> &ResolverState {
        &self.state
    }

    pub fn pending(&self) -> Option<&IncomingLink> {
        match &self.state {
            ResolverState::Pending(link) => Some(link),
            _ => None,
        }
    }

    /// Records an arrival. Returns false when the link was ignored.
    pub fn receive(&mut self, link: IncomingLink) -> bool {
        if self.rules.is_placeholder(&link.raw_url) {
            debug!(source = link.source.as_str(), "ignoring placeholder link");
            return false;
        }
        let duplicate = match &self.state {
            ResolverState::Pending(current) | ResolverState::Consumed(current) => {
                current.raw_url == link.raw_url
            }
            ResolverState::Idle => false,
        };
        if duplicate {
            debug!(url = %link.raw_url, state = self.state.as_str(), "ignoring repeated link");
            return false;
        }
        debug!(url = %link.raw_url, source = link.source.as_str(), "link pending");
        self.state = ResolverState::Pending(link);
        true
    }

    /// Consumes the pending link, if any. Unroutable links degrade to `Landing`.
    pub fn on_hydration_complete(&mut self, ctx: &LinkContext) -> RouteDecision {
        let link = match std::mem::take(&mut self.state) {
            ResolverState::Pending(link) => link,
            other => {
                self.state = other;
                return RouteDecision::Landing;
            }
        };
        let decision = match resolve_link(&link.raw_url, &self.rules, ctx) {
            Ok(route) => RouteDecision::Link(route),
            Err(err) => {
                warn!(url = %link.raw_url, error = %err, "deep link dropped; using landing route");
                RouteDecision::Landing
            }
        };
        self.state = ResolverState::Consumed(link);
        decision
    }
}

/// Decodes and normalizes a raw external link into an in-app route.
pub fn resolve_link(raw: &str, rules: &LinkRules, ctx: &LinkContext) -> Result<LinkRoute, Error> {
    let decoded = urlencoding::decode(raw.trim()).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("link is not valid percent-encoded UTF-8")
            .with_url(raw)
            .with_source(err)
    })?;
    let decoded = decoded.replace('+', " ");

    let private_prefix = format!("{}://", rules.private_scheme);
    let candidate = match decoded.strip_prefix(&private_prefix) {
        Some(rest) => format!("{}{}", rules.public_base(), rest.trim_start_matches('/')),
        None => decoded,
    };
    let url = Url::parse(&candidate).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("link is not a valid url")
            .with_url(raw)
            .with_source(err)
    })?;

    let encoded_path = if rules.is_dev_scheme(url.scheme()) {
        let path = url.path();
        path.strip_prefix(DEV_PATH_MARKER).unwrap_or(path).to_string()
    } else if matches!(url.scheme(), "http" | "https") {
        let prefix = Url::parse(&rules.public_prefix).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("public link prefix must be an absolute http(s) url")
                .with_url(rules.public_prefix.as_str())
                .with_source(err)
        })?;
        if url.host_str() != prefix.host_str() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "link host `{}` is not the app link host",
                    url.host_str().unwrap_or_default()
                ))
                .with_hint(format!("Use an http(s) link under {}.", rules.public_prefix))
                .with_url(raw));
        }
        strip_prefix_path(url.path(), prefix.path())
    } else {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("unsupported link scheme `{}`", url.scheme()))
            .with_hint(format!(
                "Use {}:// or an http(s) link under {}.",
                rules.private_scheme, rules.public_prefix
            ))
            .with_url(raw));
    };

    let path = urlencoding::decode(&encoded_path)
        .map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("link path is not valid UTF-8")
                .with_url(raw)
                .with_source(err)
        })?
        .into_owned();
    let path = if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    };
    if path.trim_matches('/').is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("link has no in-app destination")
            .with_url(raw));
    }

    let mut query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if !query.is_empty() {
        if let Some(base) = ctx.library_base_url.as_deref() {
            query.retain(|(key, _)| key != "url");
            query.push(("url".to_string(), base.to_string()));
        }
    }

    Ok(LinkRoute {
        path,
        query,
        normalized_url: url.to_string(),
    })
}

fn strip_prefix_path(path: &str, prefix_path: &str) -> String {
    let prefix_path = prefix_path.trim_end_matches('/');
    if prefix_path.is_empty() {
        return path.to_string();
    }
    match path.strip_prefix(prefix_path) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.to_string(),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DeepLinkResolver, IncomingLink, LinkContext, LinkRules, LinkSource, ResolverState,
        RouteDecision, resolve_link,
    };
    use crate::core::error::ErrorKind;
    use serde_json::json;

    fn ctx() -> LinkContext {
        LinkContext {
            library_base_url: Some("https://demo.catalog.example".to_string()),
        }
    }

    #[test]
    fn private_scheme_is_rewritten_to_public_prefix() {
        let route = resolve_link("libapp://Browse/GroupedWork/123", &LinkRules::default(), &ctx())
            .expect("route");
        assert_eq!(route.path, "/Browse/GroupedWork/123");
        assert_eq!(route.normalized_url, "https://libapp.link/Browse/GroupedWork/123");
        assert!(route.query.is_empty());
        assert_eq!(route.target(), "/Browse/GroupedWork/123");
    }

    #[test]
    fn decoding_replaces_plus_and_percent_sequences() {
        let raw = "libapp%3A%2F%2FSearch%2FResults%3Fterm%3Dharry+potter";
        let route = resolve_link(raw, &LinkRules::default(), &ctx()).expect("route");
        assert_eq!(route.path, "/Search/Results");
        assert_eq!(route.query_value("term"), Some("harry potter"));
        assert_eq!(route.query_value("url"), Some("https://demo.catalog.example"));
    }

    #[test]
    fn dev_scheme_strips_expo_marker() {
        let raw = "exp://192.168.1.5:19000/--/Account/Holds?pending=1";
        let route = resolve_link(raw, &LinkRules::default(), &ctx()).expect("route");
        assert_eq!(route.path, "/Account/Holds");
        assert_eq!(
            route.query,
            vec![
                ("pending".to_string(), "1".to_string()),
                ("url".to_string(), "https://demo.catalog.example".to_string()),
            ]
        );
        assert_eq!(
            route.target(),
            "/Account/Holds?pending=1&url=https%3A%2F%2Fdemo.catalog.example"
        );
    }

    #[test]
    fn public_prefix_with_path_is_stripped() {
        let rules = LinkRules {
            public_prefix: "https://apps.example.org/lida/".to_string(),
            ..LinkRules::default()
        };
        let route = resolve_link("libapp://Account/CheckedOut", &rules, &ctx()).expect("route");
        assert_eq!(route.path, "/Account/CheckedOut");
    }

    #[test]
    fn public_prefix_without_trailing_slash_keeps_path_boundary() {
        let rules = LinkRules {
            public_prefix: "https://libapp.link".to_string(),
            ..LinkRules::default()
        };
        let route = resolve_link("libapp://Browse/GroupedWork/123", &rules, &ctx()).expect("route");
        assert_eq!(route.path, "/Browse/GroupedWork/123");
        assert_eq!(route.normalized_url, "https://libapp.link/Browse/GroupedWork/123");

        let rules = LinkRules {
            public_prefix: "https://apps.example.org/lida".to_string(),
            ..LinkRules::default()
        };
        let route = resolve_link("libapp://Account/CheckedOut", &rules, &ctx()).expect("route");
        assert_eq!(route.path, "/Account/CheckedOut");
        assert_eq!(route.normalized_url, "https://apps.example.org/lida/Account/CheckedOut");
    }

    #[test]
    fn http_links_must_use_the_app_link_host() {
        let route = resolve_link("https://libapp.link/Account/Holds", &LinkRules::default(), &ctx())
            .expect("route");
        assert_eq!(route.path, "/Account/Holds");

        let err = resolve_link("https://other.example/Account/Holds", &LinkRules::default(), &ctx())
            .expect_err("foreign host");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.message().unwrap_or_default().contains("other.example"));
    }

    #[test]
    fn links_without_destination_or_known_scheme_are_rejected() {
        let err = resolve_link("libapp://", &LinkRules::default(), &ctx()).expect_err("root");
        assert_eq!(err.kind(), ErrorKind::Usage);

        let err = resolve_link("ftp://host/file", &LinkRules::default(), &ctx()).expect_err("ftp");
        assert!(err.message().unwrap_or_default().contains("ftp"));
    }

    #[test]
    fn newer_link_replaces_pending_one() {
        let mut resolver = DeepLinkResolver::new(LinkRules::default());
        assert!(resolver.receive(IncomingLink::cold_start("libapp://Browse/GroupedWork/1")));
        assert!(resolver.receive(IncomingLink::notification("libapp://Browse/GroupedWork/2")));
        assert!(!resolver.receive(IncomingLink::notification("libapp://Browse/GroupedWork/2")));

        let pending = resolver.pending().expect("pending");
        assert_eq!(pending.source, LinkSource::PushNotification);

        let RouteDecision::Link(route) = resolver.on_hydration_complete(&ctx()) else {
            panic!("expected link route");
        };
        assert_eq!(route.path, "/Browse/GroupedWork/2");
        assert!(matches!(resolver.state(), ResolverState::Consumed(_)));
    }

    #[test]
    fn consumed_link_is_not_routed_twice() {
        let mut resolver = DeepLinkResolver::new(LinkRules::default());
        resolver.receive(IncomingLink::cold_start("libapp://Account/Holds"));
        assert!(matches!(resolver.on_hydration_complete(&ctx()), RouteDecision::Link(_)));

        assert!(!resolver.receive(IncomingLink::cold_start("libapp://Account/Holds")));
        assert_eq!(resolver.on_hydration_complete(&ctx()), RouteDecision::Landing);

        assert!(resolver.receive(IncomingLink::cold_start("libapp://Account/Fines")));
        assert!(matches!(resolver.on_hydration_complete(&ctx()), RouteDecision::Link(_)));
    }

    #[test]
    fn placeholder_links_are_ignored() {
        let mut resolver = DeepLinkResolver::new(LinkRules::default());
        assert!(!resolver.receive(IncomingLink::cold_start("")));
        assert!(!resolver.receive(IncomingLink::cold_start("https://libapp.link")));
        assert!(!resolver.receive(IncomingLink::cold_start("libapp://")));
        assert_eq!(resolver.state(), &ResolverState::Idle);
    }

    #[test]
    fn unparseable_link_falls_back_to_landing() {
        let mut resolver = DeepLinkResolver::new(LinkRules::default());
        assert!(resolver.receive(IncomingLink::cold_start("not a url at all")));
        assert_eq!(resolver.on_hydration_complete(&ctx()), RouteDecision::Landing);
        assert!(matches!(resolver.state(), ResolverState::Consumed(_)));
    }

    #[test]
    fn notification_payload_url_is_found_at_known_locations() {
        let flat = json!({"url": "libapp://Account/Holds"});
        let nested = json!({"notification": {"request": {"content": {"data": {"url": "libapp://Account/Fines"}}}}});
        let missing = json!({"title": "Hold ready"});

        let link = IncomingLink::from_notification_payload(&flat).expect("flat");
        assert_eq!(link.raw_url, "libapp://Account/Holds");
        assert_eq!(link.source, LinkSource::PushNotification);
        assert_eq!(
            IncomingLink::from_notification_payload(&nested).map(|l| l.raw_url),
            Some("libapp://Account/Fines".to_string())
        );
        assert!(IncomingLink::from_notification_payload(&missing).is_none());
    }
}
