//! Purpose: The collaborator contract the hydration stages fetch through.
//! Exports: `CatalogApi`, `LinkedAccountsRequest`.
//! Role: Seam between the pipeline and a transport (HTTP in production, fakes in tests).
//! Invariants: Implementations are bound to one library; calls take no library URL.
//! Invariants: Returned futures are `Send` so stage fetches can run as tasks.

use super::model::{
    BrowseCategory, Dictionary, Library, LibraryCard, LinkedAccounts, Location,
    SelfCheckResponse, SystemMessage, User,
};
use crate::core::error::Error;
use std::future::Future;

/// Inputs for the linked-accounts lookup, captured from state when the stage launches.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkedAccountsRequest {
    pub user: User,
    pub cards: Vec<LibraryCard>,
    pub barcode_style: Option<String>,
    pub language: String,
}

pub trait CatalogApi: Send + Sync + 'static {
    fn library_languages(&self) -> impl Future<Output = Result<Vec<String>, Error>> + Send;

    fn translated_terms(
        &self,
        languages: Vec<String>,
    ) -> impl Future<Output = Result<Dictionary, Error>> + Send;

    fn library_info(&self) -> impl Future<Output = Result<Library, Error>> + Send;

    /// `Ok(None)` when the server returned no profile for the session.
    fn reload_profile(&self) -> impl Future<Output = Result<Option<User>, Error>> + Send;

    fn browse_categories(
        &self,
        max_count: usize,
    ) -> impl Future<Output = Result<Vec<BrowseCategory>, Error>> + Send;

    fn browse_category_list(&self) -> impl Future<Output = Result<Vec<String>, Error>> + Send;

    fn location_info(&self) -> impl Future<Output = Result<Location, Error>> + Send;

    fn self_check_settings(&self) -> impl Future<Output = Result<SelfCheckResponse, Error>> + Send;

    fn linked_accounts(
        &self,
        request: LinkedAccountsRequest,
    ) -> impl Future<Output = Result<LinkedAccounts, Error>> + Send;

    fn system_messages(
        &self,
        library_id: String,
        location_id: String,
    ) -> impl Future<Output = Result<Vec<SystemMessage>, Error>> + Send;
}
