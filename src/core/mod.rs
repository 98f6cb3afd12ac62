// Engine internals: stage graph, scheduling, run epochs, link routing, and error modeling.
pub mod deeplink;
pub mod epoch;
pub mod error;
pub mod progress;
pub mod scheduler;
pub mod stage;
pub mod version;
