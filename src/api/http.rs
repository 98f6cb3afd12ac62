//! Purpose: `CatalogApi` over the library's JSON REST endpoints.
//! Exports: `HttpCatalog`.
//! Role: Production collaborator used by the CLI; blocking ureq calls run on tokio's blocking pool.
//! Invariants: Every endpoint is `GET {library}/API/{service}?method=...` with a `{"result": ...}` body.
//! Invariants: Transport failures and 5xx are Transient; 401/403 are UserFacing.
//! Invariants: The session token travels only in the Authorization header, never in URLs.
#![allow(clippy::result_large_err)]

use super::catalog::{CatalogApi, LinkedAccountsRequest};
use super::model::{
    BrowseCategory, Dictionary, Library, LibraryCard, LinkedAccount, LinkedAccounts, Location,
    SelfCheckResponse, SystemMessage, User,
};
use crate::core::error::{Error, ErrorKind};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

type ApiResult<T> = Result<T, Error>;

const SYSTEM_API: &str = "SystemAPI";
const USER_API: &str = "UserAPI";
const SEARCH_API: &str = "SearchAPI";

#[derive(Clone)]
pub struct HttpCatalog {
    inner: Arc<HttpCatalogInner>,
}

struct HttpCatalogInner {
    library_url: Url,
    token: Option<String>,
    agent: ureq::Agent,
}

impl std::fmt::Debug for HttpCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCatalog")
            .field("library_url", &self.inner.library_url.as_str())
            .field("token", &self.inner.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpCatalog {
    pub fn new(library_url: impl Into<String>) -> ApiResult<Self> {
        let library_url = normalize_library_url(library_url.into())?;
        Ok(Self {
            inner: Arc::new(HttpCatalogInner {
                library_url,
                token: None,
                agent: ureq::AgentBuilder::new().build(),
            }),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.token = Some(token.into());
        } else {
            self.inner = Arc::new(HttpCatalogInner {
                library_url: self.inner.library_url.clone(),
                token: Some(token.into()),
                agent: self.inner.agent.clone(),
            });
        }
        self
    }

    /// Bounds each HTTP exchange; the scheduler applies its own per-stage bound as well.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.agent = agent;
        } else {
            self.inner = Arc::new(HttpCatalogInner {
                library_url: self.inner.library_url.clone(),
                token: self.inner.token.clone(),
                agent,
            });
        }
        self
    }

    pub fn library_url(&self) -> &Url {
        &self.inner.library_url
    }

    async fn call(
        &self,
        service: &'static str,
        method: &'static str,
        params: Vec<(&'static str, String)>,
    ) -> ApiResult<Value> {
        let url = build_url(&self.inner.library_url, service, method, &params)?;
        let client = self.clone();
        let shown = url.to_string();
        debug!(url = %shown, "catalog request");
        tokio::task::spawn_blocking(move || client.request_json(&url))
            .await
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("catalog request task failed")
                    .with_source(err)
            })?
            .map_err(|err| err.with_url(shown))
    }

    async fn call_result<T>(
        &self,
        service: &'static str,
        method: &'static str,
        params: Vec<(&'static str, String)>,
        field: Option<&'static str>,
    ) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let body = self.call(service, method, params).await?;
        decode_result(body, field)
    }

    fn request_json(&self, url: &Url) -> ApiResult<Value> {
        let mut request = self
            .inner
            .agent
            .get(url.as_str())
            .set("Accept", "application/json");
        if let Some(token) = &self.inner.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        match request.call() {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Transient)
                .with_message("catalog request failed")
                .with_hint("Check the network connection and library URL.")
                .with_source(err)),
        }
    }
}

impl CatalogApi for HttpCatalog {
    async fn library_languages(&self) -> ApiResult<Vec<String>> {
        let values: Vec<Value> = self
            .call_result(SYSTEM_API, "getLanguages", Vec::new(), Some("languages"))
            .await?;
        Ok(language_codes(values))
    }

    async fn translated_terms(&self, languages: Vec<String>) -> ApiResult<Dictionary> {
        let mut dictionary = BTreeMap::new();
        for language in languages {
            let terms: BTreeMap<String, String> = self
                .call_result(
                    SYSTEM_API,
                    "getTranslations",
                    vec![("language", language.clone())],
                    Some("translations"),
                )
                .await?;
            dictionary.insert(language, terms);
        }
        Ok(Dictionary(dictionary))
    }

    async fn library_info(&self) -> ApiResult<Library> {
        self.call_result(SYSTEM_API, "getLibraryInfo", Vec::new(), Some("library"))
            .await
    }

    async fn reload_profile(&self) -> ApiResult<Option<User>> {
        let profile: Option<User> = self
            .call_result(USER_API, "getPatronProfile", Vec::new(), Some("profile"))
            .await?;
        Ok(profile.filter(|user| !user.is_empty()))
    }

    async fn browse_categories(&self, max_count: usize) -> ApiResult<Vec<BrowseCategory>> {
        let mut categories: Vec<BrowseCategory> = self
            .call_result(
                SEARCH_API,
                "getAppActiveBrowseCategories",
                vec![("maxCategories", max_count.to_string())],
                Some("categories"),
            )
            .await?;
        categories.truncate(max_count);
        Ok(categories)
    }

    async fn browse_category_list(&self) -> ApiResult<Vec<String>> {
        let values: Vec<Value> = self
            .call_result(
                SEARCH_API,
                "getBrowseCategoryListForUser",
                Vec::new(),
                Some("categories"),
            )
            .await?;
        Ok(category_keys(values))
    }

    async fn location_info(&self) -> ApiResult<Location> {
        self.call_result(SYSTEM_API, "getLocationInfo", Vec::new(), Some("location"))
            .await
    }

    async fn self_check_settings(&self) -> ApiResult<SelfCheckResponse> {
        self.call_result(SYSTEM_API, "getSelfCheckSettings", Vec::new(), None)
            .await
    }

    async fn linked_accounts(&self, request: LinkedAccountsRequest) -> ApiResult<LinkedAccounts> {
        let accounts: Vec<LinkedAccount> = self
            .call_result(
                USER_API,
                "getLinkedAccounts",
                vec![("language", request.language.clone())],
                Some("linkedAccounts"),
            )
            .await?;
        let cards = merge_cards(&request, &accounts);
        Ok(LinkedAccounts { accounts, cards })
    }

    async fn system_messages(
        &self,
        library_id: String,
        location_id: String,
    ) -> ApiResult<Vec<SystemMessage>> {
        self.call_result(
            SYSTEM_API,
            "getSystemMessages",
            vec![("libraryId", library_id), ("locationId", location_id)],
            Some("systemMessages"),
        )
        .await
    }
}

fn normalize_library_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid library url")
            .with_url(raw.clone())
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("library url must use http or https scheme")
            .with_url(raw));
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(
    library_url: &Url,
    service: &str,
    method: &str,
    params: &[(&str, String)],
) -> ApiResult<Url> {
    let mut url = library_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("library url cannot be a base")
        })?;
        path.pop_if_empty();
        path.push("API");
        path.push(service);
    }
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("method", method);
        for (key, value) in params {
            query.append_pair(key, value);
        }
    }
    Ok(url)
}

fn read_json_response(response: ureq::Response) -> ApiResult<Value> {
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Transient)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Transient)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/result/message")
                .or_else(|| value.pointer("/error/message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("catalog error status {status}"));
    let err = Error::new(error_kind_from_status(status)).with_message(message);
    match status {
        401 | 403 => err.with_hint("Sign in again."),
        500..=599 => err,
        _ => err.with_hint("Check the library URL."),
    }
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::UserFacing,
        _ => ErrorKind::Transient,
    }
}

fn decode_result<T>(body: Value, field: Option<&str>) -> ApiResult<T>
where
    T: DeserializeOwned,
{
    let Value::Object(mut envelope) = body else {
        return Err(Error::new(ErrorKind::Transient).with_message("response is not a json object"));
    };
    let Some(mut result) = envelope.remove("result") else {
        return Err(Error::new(ErrorKind::Transient).with_message("response has no result"));
    };
    if let Some(field) = field {
        result = match result {
            Value::Object(mut fields) => fields.remove(field).unwrap_or(Value::Null),
            // Some endpoints return the payload directly as the result.
            other => other,
        };
    }
    serde_json::from_value(result).map_err(|err| {
        Error::new(ErrorKind::Transient)
            .with_message(format!(
                "unexpected response shape{}",
                field.map(|f| format!(" for `{f}`")).unwrap_or_default()
            ))
            .with_source(err)
    })
}

fn language_codes(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::String(code) => Some(code),
            Value::Object(mut fields) => match fields.remove("code") {
                Some(Value::String(code)) => Some(code),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn category_keys(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::String(key) => Some(key),
            Value::Object(mut fields) => ["key", "textId"]
                .iter()
                .find_map(|name| match fields.remove(*name) {
                    Some(Value::String(key)) => Some(key),
                    _ => None,
                }),
            _ => None,
        })
        .collect()
}

/// Cards already known, then the patron's own card, then one per linked account.
fn merge_cards(request: &LinkedAccountsRequest, accounts: &[LinkedAccount]) -> Vec<LibraryCard> {
    let mut cards = request.cards.clone();
    let primary = request.user.barcode.as_ref().map(|barcode| LibraryCard {
        barcode: barcode.clone(),
        display_name: request.user.display_name.clone(),
        barcode_style: request.barcode_style.clone(),
        linked: false,
    });
    let linked = accounts.iter().filter_map(|account| {
        account.barcode.as_ref().map(|barcode| LibraryCard {
            barcode: barcode.clone(),
            display_name: account.display_name.clone(),
            barcode_style: request.barcode_style.clone(),
            linked: true,
        })
    });
    for card in primary.into_iter().chain(linked) {
        if !cards.iter().any(|known| known.barcode == card.barcode) {
            cards.push(card);
        }
    }
    cards
}
