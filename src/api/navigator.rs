//! Purpose: The route resolver the bootstrap hands its final decision to.
//! Exports: `Navigator`, `RouteParams`, `Navigation`, `RecordingNavigator`.
//! Role: Seam to the host's screen router; the CLI and tests record instead of rendering.
//! Invariants: Navigators are called at most twice per run (landing, then the pending link).

use super::model::{Library, Location, User};
use crate::core::error::Error;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

/// Parameters handed to the landing screen.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteParams {
    pub user: Option<User>,
    pub library: Option<Library>,
    pub location: Option<Location>,
    pub prev_route: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Navigation {
    Path {
        path: String,
        query: Vec<(String, String)>,
        target: String,
    },
    Named {
        route: String,
        params: Box<RouteParams>,
    },
}

pub trait Navigator: Send + Sync {
    fn navigate_by_path(&self, path: &str, query: &[(String, String)]) -> Result<(), Error>;

    fn navigate_named(&self, route: &str, params: &RouteParams) -> Result<(), Error>;
}

impl<N: Navigator + ?Sized> Navigator for Arc<N> {
    fn navigate_by_path(&self, path: &str, query: &[(String, String)]) -> Result<(), Error> {
        (**self).navigate_by_path(path, query)
    }

    fn navigate_named(&self, route: &str, params: &RouteParams) -> Result<(), Error> {
        (**self).navigate_named(route, params)
    }
}

/// Keeps every navigation in order; optionally refuses path navigation.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    history: Mutex<Vec<Navigation>>,
    reject_paths: bool,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A navigator whose path routing always fails, for exercising the landing fallback.
    pub fn rejecting_paths() -> Self {
        Self {
            history: Mutex::new(Vec::new()),
            reject_paths: true,
        }
    }

    pub fn history(&self) -> Vec<Navigation> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<Navigation> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    fn record(&self, navigation: Navigation) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(navigation);
    }
}

impl Navigator for RecordingNavigator {
    fn navigate_by_path(&self, path: &str, query: &[(String, String)]) -> Result<(), Error> {
        if self.reject_paths {
            return Err(Error::new(crate::core::error::ErrorKind::Usage)
                .with_message(format!("no screen registered for `{path}`")));
        }
        let target = if query.is_empty() {
            path.to_string()
        } else {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query.iter())
                .finish();
            format!("{path}?{encoded}")
        };
        self.record(Navigation::Path {
            path: path.to_string(),
            query: query.to_vec(),
            target,
        });
        Ok(())
    }

    fn navigate_named(&self, route: &str, params: &RouteParams) -> Result<(), Error> {
        self.record(Navigation::Named {
            route: route.to_string(),
            params: Box::new(params.clone()),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Navigation, Navigator, RecordingNavigator, RouteParams};

    #[test]
    fn records_navigations_in_order() {
        let navigator = RecordingNavigator::new();
        navigator
            .navigate_by_path("/Account/Holds", &[("id".to_string(), "4 5".to_string())])
            .expect("path");
        navigator
            .navigate_named("DrawerStack", &RouteParams::default())
            .expect("named");

        let history = navigator.history();
        assert_eq!(history.len(), 2);
        let Navigation::Path { target, .. } = &history[0] else {
            panic!("expected path navigation");
        };
        assert_eq!(target, "/Account/Holds?id=4+5");
        assert!(matches!(navigator.last(), Some(Navigation::Named { route, .. }) if route == "DrawerStack"));
    }

    #[test]
    fn rejecting_navigator_fails_paths_only() {
        let navigator = RecordingNavigator::rejecting_paths();
        assert!(navigator.navigate_by_path("/Account", &[]).is_err());
        assert!(navigator.navigate_named("DrawerStack", &RouteParams::default()).is_ok());
        assert_eq!(navigator.history().len(), 1);
    }
}
