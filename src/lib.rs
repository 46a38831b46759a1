//! Offline-capable data layer for a personal portfolio site.
//!
//! Each data category (projects, profile, home stats) is served from the best
//! source available: the live GraphQL endpoint, a persistent local cache, a
//! published static snapshot, or an embedded default.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod model;
pub mod remote;
pub mod snapshots;
pub mod source;

pub use context::{ContextOptions, DataContext, DataStatus};
pub use error::{CacheError, RemoteError, SourceError, StaticError};
