//! Purpose: Exercise `HttpCatalog` against a loopback catalog server.
//! Exports: None (integration test module).
//! Role: Validate endpoint mapping, status-to-kind mapping and bearer auth over real HTTP.
//! Invariants: Server binds 127.0.0.1:0 and lives for one test's runtime only.

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::get;
use catalog_boot::api::{
    BootstrapConfig, BootstrapController, BootstrapOutcome, CatalogApi, ErrorKind, Feature,
    HttpCatalog, LinkedAccountsRequest, RecordingNavigator, User,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

const TOKEN: &str = "secret-session";

#[derive(Default)]
struct CatalogServer {
    broken: AtomicBool,
    auth_headers: Mutex<Vec<Option<String>>>,
    methods: Mutex<Vec<String>>,
}

type Shared = Arc<CatalogServer>;

async fn handle(
    State(server): State<Shared>,
    Path(service): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    server
        .auth_headers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(auth.clone());
    let method = params.get("method").cloned().unwrap_or_default();
    server
        .methods
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(method.clone());

    if server.broken.load(Ordering::SeqCst) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"result": {"message": "catalog is restarting"}})),
        );
    }

    let result = match (service.as_str(), method.as_str()) {
        ("SystemAPI", "getLanguages") => json!({"languages": [{"code": "en"}, "es"]}),
        ("SystemAPI", "getTranslations") => {
            let language = params.get("language").cloned().unwrap_or_default();
            json!({"translations": {"loading_1": format!("{language}: library")}})
        }
        ("SystemAPI", "getLibraryInfo") => json!({"library": {
            "libraryId": 1,
            "baseUrl": "https://demo.catalog.example",
            "displayName": "Demo Public Library",
            "discoveryVersion": "23.02.00",
            "barcodeStyle": "CODE128",
            "themeColor": "#004b87"
        }}),
        ("SystemAPI", "getLocationInfo") => {
            json!({"location": {"locationId": 7, "displayName": "Main Branch"}})
        }
        ("SystemAPI", "getSelfCheckSettings") => {
            json!({"success": true, "settings": {"isEnabled": true}})
        }
        ("SystemAPI", "getSystemMessages") => json!({"systemMessages": [
            {"id": 1, "message": "Closed Monday", "dismissable": true}
        ]}),
        ("UserAPI", "getPatronProfile") => {
            if auth.as_deref() != Some(format!("Bearer {TOKEN}").as_str()) {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"result": {"message": "session expired"}})),
                );
            }
            json!({"profile": {
                "id": 42,
                "displayName": "Ada Reader",
                "interfaceLanguage": "es",
                "barcode": "2100001"
            }})
        }
        ("UserAPI", "getLinkedAccounts") => json!({"linkedAccounts": [
            {"id": 43, "displayName": "Grace Reader", "barcode": "2100002"}
        ]}),
        ("SearchAPI", "getAppActiveBrowseCategories") => {
            let categories: Vec<Value> = (0..4)
                .map(|idx| {
                    json!({"textId": format!("cat_{idx}"), "label": format!("Category {idx}")})
                })
                .collect();
            json!({"categories": categories})
        }
        ("SearchAPI", "getBrowseCategoryListForUser") => {
            json!({"categories": [{"textId": "cat_0"}, "cat_1"]})
        }
        _ => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": {"message": format!("unknown method {method}")}})),
            );
        }
    };
    (StatusCode::OK, Json(json!({ "result": result })))
}

async fn spawn_server() -> (String, Shared) {
    let server: Shared = Arc::new(CatalogServer::default());
    let app = Router::new()
        .route("/API/:service", get(handle))
        .with_state(Arc::clone(&server));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), server)
}

#[tokio::test(flavor = "multi_thread")]
async fn bootstrap_over_http_reaches_landing() {
    let (base_url, server) = spawn_server().await;
    let config = BootstrapConfig::new(&base_url)
        .expect("config")
        .with_max_categories(2);
    let api = HttpCatalog::new(base_url.as_str())
        .expect("api")
        .with_token(TOKEN);
    let mut controller =
        BootstrapController::new(config, api, RecordingNavigator::new()).expect("controller");

    let outcome = controller.bootstrap().await;
    let BootstrapOutcome::Ready { state, .. } = outcome else {
        panic!("expected ready, got {}", outcome.as_str());
    };
    assert_eq!(state.languages(), ["en".to_string(), "es".to_string()]);
    assert_eq!(state.dictionary().languages().collect::<Vec<_>>(), ["en", "es"]);
    assert_eq!(state.language(), "es");
    assert_eq!(state.browse_categories().len(), 2);
    assert_eq!(state.browse_categories()[0].key, "cat_0");
    assert_eq!(state.browse_category_list(), ["cat_0".to_string(), "cat_1".to_string()]);
    assert!(state.self_check_enabled());
    assert!(state.supports(Feature::SavedSearchItemRoute));
    assert_eq!(
        state.library().map(|library| library.extra.get("themeColor").cloned()),
        Some(Some(json!("#004b87")))
    );
    let barcodes: Vec<&str> = state
        .library_cards()
        .iter()
        .map(|card| card.barcode.as_str())
        .collect();
    assert_eq!(barcodes, ["2100001", "2100002"]);
    assert_eq!(state.system_messages()[0].id, "1");

    let headers = server
        .auth_headers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    assert!(!headers.is_empty());
    assert!(
        headers
            .iter()
            .all(|header| header.as_deref() == Some("Bearer secret-session"))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unauthorized_profile_is_user_facing() {
    let (base_url, _server) = spawn_server().await;
    let api = HttpCatalog::new(base_url.as_str()).expect("api");

    let err = api.reload_profile().await.expect_err("401");
    assert_eq!(err.kind(), ErrorKind::UserFacing);
    assert_eq!(err.message(), Some("session expired"));
    assert_eq!(err.hint(), Some("Sign in again."));
    assert!(err.url().is_some_and(|url| url.contains("/API/UserAPI")));
    assert!(err.url().is_some_and(|url| !url.contains(TOKEN)));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_transient() {
    let (base_url, server) = spawn_server().await;
    server.broken.store(true, Ordering::SeqCst);
    let api = HttpCatalog::new(base_url.as_str()).expect("api");

    let err = api.library_info().await.expect_err("503");
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(err.message(), Some("catalog is restarting"));
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_base_path_maps_to_transient_with_url_hint() {
    let (base_url, _server) = spawn_server().await;
    let api = HttpCatalog::new(format!("{base_url}/nested/")).expect("api");

    let err = api.library_languages().await.expect_err("404");
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(err.hint(), Some("Check the library URL."));
}

#[tokio::test(flavor = "multi_thread")]
async fn linked_accounts_merge_primary_and_linked_cards() {
    let (base_url, server) = spawn_server().await;
    let api = HttpCatalog::new(base_url.as_str())
        .expect("api")
        .with_token(TOKEN);
    let request = LinkedAccountsRequest {
        user: User {
            id: "42".to_string(),
            display_name: "Ada Reader".to_string(),
            barcode: Some("2100001".to_string()),
            ..User::default()
        },
        cards: Vec::new(),
        barcode_style: Some("CODE128".to_string()),
        language: "es".to_string(),
    };

    let linked = api.linked_accounts(request).await.expect("linked accounts");
    assert_eq!(linked.accounts.len(), 1);
    assert_eq!(linked.cards.len(), 2);
    assert!(!linked.cards[0].linked);
    assert!(linked.cards[1].linked);
    assert_eq!(linked.cards[1].barcode_style.as_deref(), Some("CODE128"));

    let methods = server
        .methods
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    assert_eq!(methods, ["getLinkedAccounts"]);
}
