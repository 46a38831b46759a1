//! Source arbitration: which of remote, cache, static or default data a
//! category is served from, and how it gets back to remote.

pub mod arbitrator;
mod provider;
mod recovery;

pub use arbitrator::{ArbitratorOptions, CategoryView, ResolveMode, SourceArbitrator, Sources};
pub use provider::{
  resolve_in_order, CacheProvider, DefaultProvider, RemoteProvider, Resolved, SourceProvider,
  StaticProvider,
};
pub use recovery::{Recoverable, RecoveryTask};
