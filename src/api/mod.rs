//! Purpose: Stable public boundary of the hydration library.
//! Exports: Controller, collaborator traits, records, config, and the core types they expose.
//! Role: What the CLI, tests and embedders import; `core` stays an implementation detail.
//! Invariants: Additive-only; types reachable here keep their names and semantics.

mod bootstrap;
mod catalog;
mod config;
mod http;
mod model;
mod navigator;
pub mod pipeline;
mod state;

pub use crate::core::deeplink::{
    DeepLinkResolver, IncomingLink, LinkContext, LinkRoute, LinkRules, LinkSource,
    ResolverState, RouteDecision, resolve_link,
};
pub use crate::core::epoch::{EpochClock, RunEpoch};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind, Severity};
pub use crate::core::progress::Progress;
pub use crate::core::scheduler::{RunReport, Scheduler, StageEvent, StageFailure, StageGraph};
pub use crate::core::stage::{Stage, StageFuture, StageId, boxed};
pub use crate::core::version::{DiscoveryVersion, Feature};
pub use bootstrap::{BootstrapController, BootstrapOutcome, LinkSender, Screen, SessionSignal};
pub use catalog::{CatalogApi, LinkedAccountsRequest};
pub use config::{
    BootstrapConfig, DEFAULT_FALLBACK_LANGUAGE, DEFAULT_LANDING_ROUTE, DEFAULT_MAX_CATEGORIES,
    DEFAULT_PREV_ROUTE,
};
pub use http::HttpCatalog;
pub use model::{
    BrowseCategory, Dictionary, Library, LibraryCard, LinkedAccount, LinkedAccounts, Location,
    SelfCheckResponse, SelfCheckSettings, SystemMessage, User,
};
pub use navigator::{Navigation, Navigator, RecordingNavigator, RouteParams};
pub use pipeline::{CatalogGraph, CatalogStage, StageData, catalog_graph, catalog_stages};
pub use state::HydrationState;
