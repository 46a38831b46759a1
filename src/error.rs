//! Error taxonomy for the data-resolution layer.
//!
//! Every failure a source can produce is typed so the arbitrator can branch
//! on the kind (transport vs. server-side) instead of string matching.

use thiserror::Error;

use crate::model::Category;

/// Failure of the remote GraphQL endpoint.
///
/// `Clone` so a single coalesced attempt can hand the same outcome to every
/// waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
  /// No response within the configured timeout.
  #[error("remote query timed out after {0}ms")]
  Timeout(u64),

  /// Endpoint unreachable, connection refused, or device offline.
  #[error("network error: {0}")]
  Network(String),

  /// Endpoint answered but the query failed (error envelope, null result,
  /// or a payload that does not match the expected shape).
  #[error("graphql error: {0}")]
  GraphQl(String),
}

impl RemoteError {
  /// Timeout and network failures; the remote may be fine once reachable.
  pub fn is_transport(&self) -> bool {
    matches!(self, Self::Timeout(_) | Self::Network(_))
  }
}

/// Failure reading a published static snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StaticError {
  #[error("no static snapshot published for {0}")]
  NotFound(Category),

  #[error("static snapshot for {category} unavailable: {reason}")]
  Unavailable { category: Category, reason: String },

  #[error("static snapshot for {category} is malformed: {reason}")]
  Malformed { category: Category, reason: String },
}

/// Failure of a persistent cache tier. Always absorbed by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
  /// Quota exceeded or storage unavailable.
  #[error("cache write failed on {tier}: {reason}")]
  WriteFailure { tier: String, reason: String },

  #[error("cache read failed on {tier}: {reason}")]
  ReadFailure { tier: String, reason: String },

  #[error("cache entry {key} on {tier} is corrupt: {reason}")]
  Corrupt {
    tier: String,
    key: String,
    reason: String,
  },
}

/// Anything a `SourceProvider` can fail with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
  #[error(transparent)]
  Remote(#[from] RemoteError),

  #[error(transparent)]
  Static(#[from] StaticError),

  #[error(transparent)]
  Cache(#[from] CacheError),

  /// Nothing stored for this category in any cache tier.
  #[error("no cached snapshot for {0}")]
  CacheMiss(Category),

  /// Payload present but not decodable into the category's record type.
  #[error("cannot decode {category} payload: {reason}")]
  Decode { category: Category, reason: String },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transport_classification() {
    assert!(RemoteError::Timeout(5000).is_transport());
    assert!(RemoteError::Network("refused".into()).is_transport());
    assert!(!RemoteError::GraphQl("bad field".into()).is_transport());
  }

  #[test]
  fn test_messages_are_descriptive() {
    let err = StaticError::NotFound(Category::HomeStats);
    assert_eq!(err.to_string(), "no static snapshot published for home");

    let err = SourceError::from(RemoteError::Timeout(250));
    assert_eq!(err.to_string(), "remote query timed out after 250ms");
  }
}
