//! Purpose: Settings for one bootstrap controller.
//! Exports: `BootstrapConfig`, defaults.
//! Role: Built by the CLI from flags and env, or by embedders through `with_*` builders.
//! Invariants: `validate` runs before any run starts; an invalid config never reaches the scheduler.

use crate::core::deeplink::LinkRules;
use crate::core::error::{Error, ErrorKind};
use crate::core::scheduler::DEFAULT_FETCH_TIMEOUT;
use std::time::Duration;
use url::Url;

pub const DEFAULT_MAX_CATEGORIES: usize = 5;
pub const DEFAULT_LANDING_ROUTE: &str = "DrawerStack";
pub const DEFAULT_PREV_ROUTE: &str = "LoadingScreen";
pub const DEFAULT_FALLBACK_LANGUAGE: &str = "en";

#[derive(Clone, Debug, PartialEq)]
pub struct BootstrapConfig {
    pub library_url: Url,
    pub fetch_timeout: Duration,
    pub max_categories: usize,
    pub landing_route: String,
    pub prev_route: String,
    pub fallback_language: String,
    pub link_rules: LinkRules,
    pub session_token: Option<String>,
}

impl BootstrapConfig {
    pub fn new(library_url: &str) -> Result<Self, Error> {
        let library_url = Url::parse(library_url.trim()).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid library url")
                .with_hint("Pass the library's base URL, e.g. https://catalog.example.org.")
                .with_url(library_url)
                .with_source(err)
        })?;
        let config = Self {
            library_url,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_categories: DEFAULT_MAX_CATEGORIES,
            landing_route: DEFAULT_LANDING_ROUTE.to_string(),
            prev_route: DEFAULT_PREV_ROUTE.to_string(),
            fallback_language: DEFAULT_FALLBACK_LANGUAGE.to_string(),
            link_rules: LinkRules::default(),
            session_token: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_max_categories(mut self, max_categories: usize) -> Self {
        self.max_categories = max_categories;
        self
    }

    pub fn with_landing_route(mut self, route: impl Into<String>) -> Self {
        self.landing_route = route.into();
        self
    }

    pub fn with_fallback_language(mut self, language: impl Into<String>) -> Self {
        self.fallback_language = language.into();
        self
    }

    pub fn with_link_rules(mut self, rules: LinkRules) -> Self {
        self.link_rules = rules;
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Base URL without a trailing slash, as passed along with routed links.
    pub fn library_base_url(&self) -> String {
        self.library_url.as_str().trim_end_matches('/').to_string()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !matches!(self.library_url.scheme(), "http" | "https") {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("library url must use http or https scheme")
                .with_url(self.library_url.as_str()));
        }
        if self.fetch_timeout.is_zero() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("fetch timeout must be greater than zero")
                .with_hint("Use a number plus ms|s|m|h (e.g. 10s)."));
        }
        if self.max_categories == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("max categories must be at least 1"));
        }
        if self.landing_route.trim().is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("landing route must not be empty"));
        }
        if self.fallback_language.trim().is_empty() {
            return Err(
                Error::new(ErrorKind::Usage).with_message("fallback language must not be empty")
            );
        }
        let prefix_ok = Url::parse(&self.link_rules.public_prefix)
            .is_ok_and(|prefix| matches!(prefix.scheme(), "http" | "https") && prefix.has_host());
        if !prefix_ok {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("public link prefix must be an absolute http(s) url")
                .with_url(self.link_rules.public_prefix.as_str()));
        }
        if self.link_rules.private_scheme.trim().is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("private link scheme must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::BootstrapConfig;
    use crate::core::deeplink::LinkRules;
    use crate::core::error::ErrorKind;
    use std::time::Duration;

    #[test]
    fn defaults_match_catalog_client() {
        let config = BootstrapConfig::new("https://demo.catalog.example/").expect("config");
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.max_categories, 5);
        assert_eq!(config.landing_route, "DrawerStack");
        assert_eq!(config.prev_route, "LoadingScreen");
        assert_eq!(config.library_base_url(), "https://demo.catalog.example");
        assert_eq!(config.link_rules, LinkRules::default());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let err = BootstrapConfig::new("file:///tmp/catalog").expect_err("scheme");
        assert_eq!(err.kind(), ErrorKind::Usage);

        let config = BootstrapConfig::new("https://demo.catalog.example").expect("config");
        assert!(config.clone().with_fetch_timeout(Duration::ZERO).validate().is_err());
        assert!(config.clone().with_max_categories(0).validate().is_err());
        assert!(config.clone().with_landing_route(" ").validate().is_err());
        let rules = LinkRules {
            public_prefix: "not a url".to_string(),
            ..LinkRules::default()
        };
        assert!(config.clone().with_link_rules(rules).validate().is_err());
        let rules = LinkRules {
            public_prefix: "mailto:links@example.org".to_string(),
            ..LinkRules::default()
        };
        assert!(config.clone().with_link_rules(rules).validate().is_err());
        let rules = LinkRules {
            public_prefix: "https://libapp.link".to_string(),
            ..LinkRules::default()
        };
        assert!(config.with_link_rules(rules).validate().is_ok());
    }
}
