//! Purpose: The aggregate populated by one hydration run.
//! Exports: `HydrationState`.
//! Role: Composition point between stages; read by later stages, the router, and the CLI.
//! Invariants: Each field has exactly one writing stage (see `api::pipeline`).
//! Invariants: A fresh value is built for every run; nothing carries over between runs.

use super::model::{
    BrowseCategory, Dictionary, Library, LibraryCard, LinkedAccount, Location,
    SelfCheckSettings, SystemMessage, User,
};
use crate::core::version::Feature;
use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationState {
    pub(crate) language: String,
    pub(crate) languages: Vec<String>,
    pub(crate) dictionary: Dictionary,
    pub(crate) library: Option<Library>,
    pub(crate) user: Option<User>,
    pub(crate) location: Option<Location>,
    pub(crate) browse_categories: Vec<BrowseCategory>,
    pub(crate) browse_category_list: Vec<String>,
    pub(crate) max_categories: usize,
    pub(crate) self_check_enabled: bool,
    pub(crate) self_check_settings: Option<SelfCheckSettings>,
    pub(crate) linked_accounts: Vec<LinkedAccount>,
    pub(crate) library_cards: Vec<LibraryCard>,
    pub(crate) system_messages: Vec<SystemMessage>,
    #[serde(skip)]
    pub(crate) fallback_language: String,
}

impl HydrationState {
    pub fn new(fallback_language: &str) -> Self {
        Self {
            language: fallback_language.to_string(),
            fallback_language: fallback_language.to_string(),
            ..Self::default()
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn library(&self) -> Option<&Library> {
        self.library.as_ref()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn browse_categories(&self) -> &[BrowseCategory] {
        &self.browse_categories
    }

    pub fn browse_category_list(&self) -> &[String] {
        &self.browse_category_list
    }

    pub fn max_categories(&self) -> usize {
        self.max_categories
    }

    pub fn self_check_enabled(&self) -> bool {
        self.self_check_enabled
    }

    pub fn self_check_settings(&self) -> Option<&SelfCheckSettings> {
        self.self_check_settings.as_ref()
    }

    pub fn linked_accounts(&self) -> &[LinkedAccount] {
        &self.linked_accounts
    }

    pub fn library_cards(&self) -> &[LibraryCard] {
        &self.library_cards
    }

    pub fn system_messages(&self) -> &[SystemMessage] {
        &self.system_messages
    }

    /// Localized text for `key` in the session language.
    pub fn term(&self, key: &str) -> String {
        self.dictionary
            .term(&self.language, key, &self.fallback_language)
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.library
            .as_ref()
            .is_some_and(|library| library.supports(feature))
    }
}

#[cfg(test)]
mod tests {
    use super::HydrationState;
    use crate::api::model::Library;
    use crate::core::version::Feature;

    #[test]
    fn new_state_uses_fallback_language() {
        let mut state = HydrationState::new("en");
        assert_eq!(state.language(), "en");
        assert!(state.library().is_none());

        state.dictionary.insert("en", "loading_1", "Loading your library");
        state.language = "de".to_string();
        assert_eq!(state.term("loading_1"), "Loading your library");
        assert_eq!(state.term("loading_9"), "loading_9");
    }

    #[test]
    fn feature_support_requires_a_library() {
        let mut state = HydrationState::new("en");
        assert!(!state.supports(Feature::ManifestationVolumes));
        state.library = Some(Library {
            version: Some("22.06.00".to_string()),
            ..Library::default()
        });
        assert!(state.supports(Feature::ManifestationVolumes));
        assert!(!state.supports(Feature::CopyDetails));
    }
}
