//! Purpose: The catalog client's startup stage table.
//! Exports: stage ids, `StageData`, `catalog_stages`, `catalog_graph`.
//! Role: Binds `CatalogApi` calls to `HydrationState` fields through the generic scheduler.
//! Invariants: Each `apply_*` function is the only writer of the fields it touches.
//! Invariants: Fetches read their inputs from state at launch and own them afterwards.
//! Invariants: Weights sum to 100; languages, translations and library together weigh 40.

use super::catalog::{CatalogApi, LinkedAccountsRequest};
use super::config::BootstrapConfig;
use super::model::{
    BrowseCategory, Dictionary, Library, LinkedAccounts, Location, SelfCheckResponse,
    SystemMessage, User,
};
use super::state::HydrationState;
use crate::core::error::{Error, ErrorKind};
use crate::core::scheduler::StageGraph;
use crate::core::stage::{Stage, StageFuture, StageId, boxed};
use std::sync::Arc;

pub const LANGUAGES: StageId = StageId::new("languages");
pub const TRANSLATIONS: StageId = StageId::new("translations");
pub const LIBRARY_SYSTEM: StageId = StageId::new("library_system");
pub const USER: StageId = StageId::new("user");
pub const BROWSE_CATEGORIES: StageId = StageId::new("browse_categories");
pub const BROWSE_CATEGORY_LIST: StageId = StageId::new("browse_category_list");
pub const LIBRARY_LOCATION: StageId = StageId::new("library_location");
pub const SELF_CHECK_SETTINGS: StageId = StageId::new("self_check_settings");
pub const LINKED_ACCOUNTS: StageId = StageId::new("linked_accounts");
pub const SYSTEM_MESSAGES: StageId = StageId::new("system_messages");

pub const LOADING_LIBRARY_KEY: &str = "loading_1";
pub const LOADING_ACCOUNT_KEY: &str = "loading_2";

/// Payload produced by a catalog fetch, tagged by the stage that produced it.
#[derive(Debug)]
pub enum StageData {
    Languages(Vec<String>),
    Translations(Dictionary),
    Library(Library),
    User(User),
    BrowseCategories {
        categories: Vec<BrowseCategory>,
        max_count: usize,
    },
    BrowseCategoryList(Vec<String>),
    Location(Location),
    SelfCheck(SelfCheckResponse),
    LinkedAccounts(LinkedAccounts),
    SystemMessages(Vec<SystemMessage>),
}

impl StageData {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Languages(_) => "languages",
            Self::Translations(_) => "translations",
            Self::Library(_) => "library",
            Self::User(_) => "user",
            Self::BrowseCategories { .. } => "browse_categories",
            Self::BrowseCategoryList(_) => "browse_category_list",
            Self::Location(_) => "location",
            Self::SelfCheck(_) => "self_check",
            Self::LinkedAccounts(_) => "linked_accounts",
            Self::SystemMessages(_) => "system_messages",
        }
    }
}

pub type CatalogStage = Stage<HydrationState, StageData>;
pub type CatalogGraph = StageGraph<HydrationState, StageData>;

pub fn catalog_graph<A: CatalogApi>(
    api: Arc<A>,
    config: &BootstrapConfig,
) -> Result<CatalogGraph, Error> {
    StageGraph::new(catalog_stages(api, config))
}

pub fn catalog_stages<A: CatalogApi>(api: Arc<A>, config: &BootstrapConfig) -> Vec<CatalogStage> {
    let max_count = config.max_categories;
    vec![
        stage(&api, LANGUAGES, apply_languages, |api, _| {
            boxed(async move { api.library_languages().await.map(StageData::Languages) })
        })
        .weight(10),
        stage(&api, TRANSLATIONS, apply_translations, |api, state| {
            let languages = state.languages.clone();
            boxed(async move {
                api.translated_terms(languages)
                    .await
                    .map(StageData::Translations)
            })
        })
        .depends_on([LANGUAGES])
        .weight(10)
        .message_key(LOADING_LIBRARY_KEY),
        stage(&api, LIBRARY_SYSTEM, apply_library, |api, _| {
            boxed(async move { api.library_info().await.map(StageData::Library) })
        })
        .weight(20),
        stage(&api, USER, apply_user, |api, _| {
            boxed(async move {
                match api.reload_profile().await? {
                    Some(user) if !user.is_empty() => Ok(StageData::User(user)),
                    _ => Err(Error::new(ErrorKind::UserFacing)
                        .with_message("profile is empty; the session is no longer valid")
                        .with_hint("Sign in again.")),
                }
            })
        })
        .depends_on([LIBRARY_SYSTEM])
        .weight(10)
        .message_key(LOADING_ACCOUNT_KEY),
        stage(&api, BROWSE_CATEGORIES, apply_browse_categories, move |api, _| {
            boxed(async move {
                api.browse_categories(max_count)
                    .await
                    .map(|categories| StageData::BrowseCategories {
                        categories,
                        max_count,
                    })
            })
        })
        .depends_on([USER])
        .weight(10),
        stage(&api, BROWSE_CATEGORY_LIST, apply_browse_category_list, |api, _| {
            boxed(async move {
                api.browse_category_list()
                    .await
                    .map(StageData::BrowseCategoryList)
            })
        })
        .depends_on([BROWSE_CATEGORIES])
        .weight(10),
        stage(&api, LIBRARY_LOCATION, apply_location, |api, _| {
            boxed(async move { api.location_info().await.map(StageData::Location) })
        })
        .depends_on([BROWSE_CATEGORY_LIST])
        .weight(10),
        stage(&api, SELF_CHECK_SETTINGS, apply_self_check, |api, _| {
            boxed(async move {
                api.self_check_settings()
                    .await
                    .map(StageData::SelfCheck)
                    .map_err(|err| err.with_kind(ErrorKind::Ignorable))
            })
        })
        .depends_on([LIBRARY_LOCATION])
        .weight(5)
        .recover(|_| StageData::SelfCheck(SelfCheckResponse::disabled())),
        stage(&api, LINKED_ACCOUNTS, apply_linked_accounts, |api, state| {
            let (Some(user), Some(library)) = (state.user.clone(), state.library.as_ref()) else {
                return missing_input(LINKED_ACCOUNTS, "user and library");
            };
            let request = LinkedAccountsRequest {
                user,
                cards: state.library_cards.clone(),
                barcode_style: library.barcode_style.clone(),
                language: state.language.clone(),
            };
            boxed(async move {
                api.linked_accounts(request)
                    .await
                    .map(StageData::LinkedAccounts)
            })
        })
        .depends_on([USER, LIBRARY_SYSTEM, SELF_CHECK_SETTINGS])
        .weight(5),
        stage(&api, SYSTEM_MESSAGES, apply_system_messages, |api, state| {
            let (Some(library), Some(location)) = (state.library.as_ref(), state.location.as_ref())
            else {
                return missing_input(SYSTEM_MESSAGES, "library and location");
            };
            let library_id = library.library_id.clone();
            let location_id = location.location_id.clone();
            boxed(async move {
                api.system_messages(library_id, location_id)
                    .await
                    .map(StageData::SystemMessages)
            })
        })
        .depends_on([USER, LIBRARY_SYSTEM, LIBRARY_LOCATION, LINKED_ACCOUNTS])
        .weight(10),
    ]
}

fn stage<A, F>(
    api: &Arc<A>,
    id: StageId,
    apply: fn(StageData, &mut HydrationState) -> Result<(), Error>,
    launch: F,
) -> CatalogStage
where
    A: CatalogApi,
    F: Fn(Arc<A>, &HydrationState) -> StageFuture<StageData> + Send + Sync + 'static,
{
    let api = Arc::clone(api);
    Stage::new(id, move |state: &HydrationState| launch(Arc::clone(&api), state), apply)
}

fn missing_input(stage: StageId, what: &str) -> StageFuture<StageData> {
    let err = Error::new(ErrorKind::Internal)
        .with_message(format!("{what} missing from state at launch"))
        .with_stage(stage.as_str());
    boxed(async move { Err(err) })
}

fn mismatch(stage: StageId, data: &StageData) -> Error {
    Error::new(ErrorKind::Internal)
        .with_message(format!("received `{}` data", data.kind()))
        .with_stage(stage.as_str())
}

fn apply_languages(data: StageData, state: &mut HydrationState) -> Result<(), Error> {
    match data {
        StageData::Languages(languages) => {
            state.languages = languages;
            Ok(())
        }
        other => Err(mismatch(LANGUAGES, &other)),
    }
}

fn apply_translations(data: StageData, state: &mut HydrationState) -> Result<(), Error> {
    match data {
        StageData::Translations(dictionary) => {
            state.dictionary = dictionary;
            Ok(())
        }
        other => Err(mismatch(TRANSLATIONS, &other)),
    }
}

fn apply_library(data: StageData, state: &mut HydrationState) -> Result<(), Error> {
    match data {
        StageData::Library(library) => {
            state.library = Some(library);
            Ok(())
        }
        other => Err(mismatch(LIBRARY_SYSTEM, &other)),
    }
}

fn apply_user(data: StageData, state: &mut HydrationState) -> Result<(), Error> {
    match data {
        StageData::User(user) => {
            state.language = user
                .interface_language
                .clone()
                .filter(|language| !language.is_empty())
                .unwrap_or_else(|| state.fallback_language.clone());
            state.user = Some(user);
            Ok(())
        }
        other => Err(mismatch(USER, &other)),
    }
}

fn apply_browse_categories(data: StageData, state: &mut HydrationState) -> Result<(), Error> {
    match data {
        StageData::BrowseCategories {
            categories,
            max_count,
        } => {
            state.browse_categories = categories;
            state.max_categories = max_count;
            Ok(())
        }
        other => Err(mismatch(BROWSE_CATEGORIES, &other)),
    }
}

fn apply_browse_category_list(data: StageData, state: &mut HydrationState) -> Result<(), Error> {
    match data {
        StageData::BrowseCategoryList(list) => {
            state.browse_category_list = list;
            Ok(())
        }
        other => Err(mismatch(BROWSE_CATEGORY_LIST, &other)),
    }
}

fn apply_location(data: StageData, state: &mut HydrationState) -> Result<(), Error> {
    match data {
        StageData::Location(location) => {
            state.location = Some(location);
            Ok(())
        }
        other => Err(mismatch(LIBRARY_LOCATION, &other)),
    }
}

fn apply_self_check(data: StageData, state: &mut HydrationState) -> Result<(), Error> {
    match data {
        StageData::SelfCheck(response) => {
            state.self_check_enabled = response.is_enabled();
            state.self_check_settings = if response.success {
                response.settings
            } else {
                None
            };
            Ok(())
        }
        other => Err(mismatch(SELF_CHECK_SETTINGS, &other)),
    }
}

fn apply_linked_accounts(data: StageData, state: &mut HydrationState) -> Result<(), Error> {
    match data {
        StageData::LinkedAccounts(linked) => {
            state.linked_accounts = linked.accounts;
            state.library_cards = linked.cards;
            Ok(())
        }
        other => Err(mismatch(LINKED_ACCOUNTS, &other)),
    }
}

fn apply_system_messages(data: StageData, state: &mut HydrationState) -> Result<(), Error> {
    match data {
        StageData::SystemMessages(messages) => {
            state.system_messages = messages;
            Ok(())
        }
        other => Err(mismatch(SYSTEM_MESSAGES, &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BROWSE_CATEGORIES, BROWSE_CATEGORY_LIST, LANGUAGES, LIBRARY_LOCATION, LIBRARY_SYSTEM,
        LINKED_ACCOUNTS, SELF_CHECK_SETTINGS, SYSTEM_MESSAGES, StageData, TRANSLATIONS, USER,
        apply_self_check, apply_user, mismatch,
    };
    use crate::api::model::{SelfCheckResponse, SelfCheckSettings, User};
    use crate::api::state::HydrationState;
    use crate::core::error::ErrorKind;

    #[test]
    fn user_apply_sets_interface_language_or_falls_back() {
        let mut state = HydrationState::new("en");
        let user = User {
            id: "1".to_string(),
            interface_language: Some("es".to_string()),
            ..User::default()
        };
        apply_user(StageData::User(user), &mut state).expect("apply");
        assert_eq!(state.language(), "es");

        let mut state = HydrationState::new("en");
        let user = User {
            id: "1".to_string(),
            ..User::default()
        };
        apply_user(StageData::User(user), &mut state).expect("apply");
        assert_eq!(state.language(), "en");
    }

    #[test]
    fn failed_self_check_response_disables_feature() {
        let mut state = HydrationState::new("en");
        let response = SelfCheckResponse {
            success: false,
            settings: Some(SelfCheckSettings {
                is_enabled: true,
                ..SelfCheckSettings::default()
            }),
        };
        apply_self_check(StageData::SelfCheck(response), &mut state).expect("apply");
        assert!(!state.self_check_enabled());
        assert!(state.self_check_settings().is_none());
    }

    #[test]
    fn mismatched_payload_is_internal_error() {
        let mut state = HydrationState::new("en");
        let err = apply_user(StageData::Languages(vec![]), &mut state).expect_err("mismatch");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.stage(), Some("user"));
        assert_eq!(
            mismatch(USER, &StageData::BrowseCategoryList(vec![])).message(),
            Some("received `browse_category_list` data")
        );
    }

    #[test]
    fn stage_ids_are_distinct() {
        let ids = [
            LANGUAGES,
            TRANSLATIONS,
            LIBRARY_SYSTEM,
            USER,
            BROWSE_CATEGORIES,
            BROWSE_CATEGORY_LIST,
            LIBRARY_LOCATION,
            SELF_CHECK_SETTINGS,
            LINKED_ACCOUNTS,
            SYSTEM_MESSAGES,
        ];
        for (idx, id) in ids.iter().enumerate() {
            assert!(!ids[..idx].contains(id), "duplicate {id}");
        }
    }
}
