//! Remote GraphQL access and connectivity.

mod client;
mod connectivity;
mod queries;

pub use client::{ClientOptions, GraphTransport, HttpTransport, RemoteClient, DEFAULT_TIMEOUT};
pub use connectivity::{Connectivity, ConnectivitySignal, ReachabilityProbe};
pub use queries::{GraphQuery, QueryParams};
