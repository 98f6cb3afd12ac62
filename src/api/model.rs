//! Purpose: Typed records returned by the catalog's REST collaborators.
//! Exports: `Library`, `User`, `Location`, `BrowseCategory`, `SelfCheckResponse`,
//! `SelfCheckSettings`, `LinkedAccount`, `LibraryCard`, `LinkedAccounts`, `SystemMessage`,
//! `Dictionary`.
//! Role: Wire shapes shared by `CatalogApi` implementations and `HydrationState`.
//! Invariants: Wire names are camelCase; unknown fields survive in `extra`.
//! Invariants: Identifiers may arrive as strings or numbers and are stored as strings.

use crate::core::version::{DiscoveryVersion, Feature};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

fn string_or_number<'de, De>(deserializer: De) -> Result<String, De::Error>
where
    De: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected string or number identifier, got {other}"
        ))),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    #[serde(default, deserialize_with = "string_or_number")]
    pub library_id: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, alias = "discoveryVersion")]
    pub version: Option<String>,
    #[serde(default)]
    pub barcode_style: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Library {
    /// Parsed discovery version; unparseable or missing versions yield `None`.
    pub fn discovery_version(&self) -> Option<DiscoveryVersion> {
        self.version.as_deref()?.parse().ok()
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.discovery_version()
            .is_some_and(|version| feature.supported_by(version))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub interface_language: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// An empty profile means the session is no longer valid.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.display_name.is_empty() && self.extra.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default, deserialize_with = "string_or_number")]
    pub location_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseCategory {
    #[serde(default, alias = "textId")]
    pub key: String,
    #[serde(default, alias = "label")]
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfCheckSettings {
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SelfCheckResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub settings: Option<SelfCheckSettings>,
}

impl SelfCheckResponse {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.success && self.settings.as_ref().is_some_and(|s| s.is_enabled)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccount {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryCard {
    pub barcode: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub barcode_style: Option<String>,
    #[serde(default)]
    pub linked: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkedAccounts {
    #[serde(default)]
    pub accounts: Vec<LinkedAccount>,
    #[serde(default)]
    pub cards: Vec<LibraryCard>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessage {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub dismissable: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Translations keyed by language code, then by term key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dictionary(pub BTreeMap<String, BTreeMap<String, String>>);

impl Dictionary {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn insert(&mut self, language: &str, key: &str, value: &str) {
        self.0
            .entry(language.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Looks `key` up in `language`, then in `fallback`, then returns the key itself.
    pub fn term(&self, language: &str, key: &str, fallback: &str) -> String {
        [language, fallback]
            .iter()
            .filter_map(|lang| self.0.get(*lang))
            .find_map(|terms| terms.get(key))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{Dictionary, Library, SelfCheckResponse, User};
    use crate::core::version::Feature;
    use serde_json::json;

    #[test]
    fn library_accepts_numeric_id_and_discovery_version_alias() {
        let library: Library = serde_json::from_value(json!({
            "libraryId": 7,
            "baseUrl": "https://demo.catalog.example",
            "displayName": "Demo Public Library",
            "discoveryVersion": "22.10.00",
            "themeName": "teal"
        }))
        .expect("library");
        assert_eq!(library.library_id, "7");
        assert_eq!(library.version.as_deref(), Some("22.10.00"));
        assert_eq!(library.extra.get("themeName"), Some(&json!("teal")));
        assert!(library.supports(Feature::BrowseCategoryNavigation));
        assert!(!library.supports(Feature::SavedSearchItemRoute));
    }

    #[test]
    fn empty_profile_is_detected() {
        let user: User = serde_json::from_value(json!({})).expect("user");
        assert!(user.is_empty());
        let user: User = serde_json::from_value(json!({"id": 12, "displayName": "Reader"}))
            .expect("user");
        assert!(!user.is_empty());
    }

    #[test]
    fn self_check_requires_success_and_enabled_flag() {
        let ok: SelfCheckResponse =
            serde_json::from_value(json!({"success": true, "settings": {"isEnabled": true}}))
                .expect("settings");
        assert!(ok.is_enabled());
        let failed: SelfCheckResponse =
            serde_json::from_value(json!({"success": false, "settings": {"isEnabled": true}}))
                .expect("settings");
        assert!(!failed.is_enabled());
        assert!(!SelfCheckResponse::disabled().is_enabled());
    }

    #[test]
    fn dictionary_falls_back_to_default_language_then_key() {
        let mut dictionary = Dictionary::default();
        dictionary.insert("en", "loading_1", "Loading library...");
        dictionary.insert("es", "loading_2", "Cargando cuenta...");

        assert_eq!(dictionary.term("es", "loading_2", "en"), "Cargando cuenta...");
        assert_eq!(dictionary.term("es", "loading_1", "en"), "Loading library...");
        assert_eq!(dictionary.term("fr", "missing", "en"), "missing");
    }
}
