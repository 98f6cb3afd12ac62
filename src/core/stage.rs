//! Purpose: Describe one network fetch and its effect on shared hydration state.
//! Exports: `Stage`, `StageId`, `StageFuture`, `boxed`.
//! Role: Unit of work scheduled by `core::scheduler`; generic over state and payload.
//! Invariants: `fetch` only reads state at launch time; the returned future owns its inputs.
//! Invariants: `apply` is the only code path that writes the stage's fields.

use super::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

pub type StageFuture<D> = Pin<Box<dyn Future<Output = Result<D, Error>> + Send + 'static>>;
pub type ApplyFn<S, D> = fn(D, &mut S) -> Result<(), Error>;
pub type RecoverFn<D> = fn(&Error) -> D;
type FetchFn<S, D> = Box<dyn Fn(&S) -> StageFuture<D> + Send + Sync>;

pub fn boxed<D, F>(future: F) -> StageFuture<D>
where
    F: Future<Output = Result<D, Error>> + Send + 'static,
{
    Box::pin(future)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StageId(&'static str);

impl StageId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

pub struct Stage<S, D> {
    id: StageId,
    depends_on: Vec<StageId>,
    weight: u8,
    message_key: Option<&'static str>,
    fetch: FetchFn<S, D>,
    apply: ApplyFn<S, D>,
    recover: Option<RecoverFn<D>>,
}

impl<S, D> Stage<S, D> {
    pub fn new<F>(id: StageId, fetch: F, apply: ApplyFn<S, D>) -> Self
    where
        F: Fn(&S) -> StageFuture<D> + Send + Sync + 'static,
    {
        Self {
            id,
            depends_on: Vec::new(),
            weight: 0,
            message_key: None,
            fetch: Box::new(fetch),
            apply,
            recover: None,
        }
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = StageId>) -> Self {
        self.depends_on.extend(ids);
        self
    }

    pub fn weight(mut self, weight: u8) -> Self {
        self.weight = weight;
        self
    }

    /// Dictionary key rendered as loading text once this stage has applied.
    pub fn message_key(mut self, key: &'static str) -> Self {
        self.message_key = Some(key);
        self
    }

    /// Marks the stage optional: non-halting failures degrade to `recover(err)`.
    pub fn recover(mut self, recover: RecoverFn<D>) -> Self {
        self.recover = Some(recover);
        self
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn dependencies(&self) -> &[StageId] {
        &self.depends_on
    }

    pub fn progress_weight(&self) -> u8 {
        self.weight
    }

    pub fn loading_message_key(&self) -> Option<&'static str> {
        self.message_key
    }

    pub fn is_optional(&self) -> bool {
        self.recover.is_some()
    }

    /// Cache key used in logs: the stage id scoped to one library.
    pub fn cache_key(&self, library: &str) -> String {
        format!("{}@{library}", self.id)
    }

    pub(crate) fn launch(&self, state: &S) -> StageFuture<D> {
        (self.fetch)(state)
    }

    pub(crate) fn apply_to(&self, data: D, state: &mut S) -> Result<(), Error> {
        (self.apply)(data, state)
    }

    pub(crate) fn recover_from(&self, err: &Error) -> Option<D> {
        self.recover.map(|recover| recover(err))
    }
}

impl<S, D> fmt::Debug for Stage<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field("weight", &self.weight)
            .field("message_key", &self.message_key)
            .field("optional", &self.recover.is_some())
            .finish_non_exhaustive()
    }
}
