//! Purpose: Library crate behind the `catalog-boot` CLI and its integration tests.
//! Exports: `api` (hydration controller, catalog collaborators, navigation), `core`, `notice`.
//! Role: In-process orchestration of the startup fetches a catalog client performs.
//! Invariants: `api` is the stable surface; `core` types are re-exported through it.
//! Invariants: Nothing here holds process-global state; each controller owns its session.
pub mod api;
pub mod core;
pub mod notice;
