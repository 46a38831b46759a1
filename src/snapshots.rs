//! Static Snapshot Store: read-only access to the JSON snapshots published
//! alongside the site under `data/`.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::error::StaticError;
use crate::model::Category;

/// Read-only accessor for published snapshots.
#[async_trait]
pub trait StaticStore: Send + Sync {
  /// Raw record (or list) for `category`, envelope already removed.
  async fn read(&self, category: Category) -> Result<Value, StaticError>;
}

/// Where published snapshots are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotLocation {
  Http(String),
  Dir(PathBuf),
  None,
}

impl SnapshotLocation {
  pub fn open(&self, client: reqwest::Client) -> Result<Arc<dyn StaticStore>, url::ParseError> {
    Ok(match self {
      Self::Http(base_url) => Arc::new(HttpStaticStore::new(base_url, client)?),
      Self::Dir(dir) => Arc::new(DirStaticStore::new(dir.clone())),
      Self::None => Arc::new(NoStaticStore),
    })
  }
}

/// Snapshots served over HTTP at `{base_url}/data/{file}`.
pub struct HttpStaticStore {
  client: reqwest::Client,
  base_url: url::Url,
}

impl HttpStaticStore {
  pub fn new(base_url: &str, client: reqwest::Client) -> Result<Self, url::ParseError> {
    let mut base_url = url::Url::parse(base_url)?;
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }
    Ok(Self { client, base_url })
  }
}

fn snapshot_url(base_url: &url::Url, category: Category) -> Result<url::Url, url::ParseError> {
  base_url.join(&format!("data/{}", category.static_file()))
}

#[async_trait]
impl StaticStore for HttpStaticStore {
  async fn read(&self, category: Category) -> Result<Value, StaticError> {
    let url = snapshot_url(&self.base_url, category).map_err(|e| StaticError::Unavailable {
      category,
      reason: e.to_string(),
    })?;
    debug!(%url, "fetching static snapshot");

    let response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| StaticError::Unavailable {
        category,
        reason: e.to_string(),
      })?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Err(StaticError::NotFound(category));
    }
    if !response.status().is_success() {
      return Err(StaticError::Unavailable {
        category,
        reason: format!("HTTP {}", response.status()),
      });
    }

    let body: Value = response.json().await.map_err(|e| StaticError::Malformed {
      category,
      reason: e.to_string(),
    })?;

    unwrap_envelope(category, body)
  }
}

/// Snapshots read from a local directory (`{dir}/{file}`).
pub struct DirStaticStore {
  dir: PathBuf,
}

impl DirStaticStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }
}

#[async_trait]
impl StaticStore for DirStaticStore {
  async fn read(&self, category: Category) -> Result<Value, StaticError> {
    let path = self.dir.join(category.static_file());
    let contents = match tokio::fs::read_to_string(&path).await {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Err(StaticError::NotFound(category));
      }
      Err(e) => {
        return Err(StaticError::Unavailable {
          category,
          reason: format!("failed to read {}: {}", path.display(), e),
        });
      }
    };

    let body: Value = serde_json::from_str(&contents).map_err(|e| StaticError::Malformed {
      category,
      reason: e.to_string(),
    })?;

    unwrap_envelope(category, body)
  }
}

/// Store with nothing published; every read is `NotFound`.
pub struct NoStaticStore;

#[async_trait]
impl StaticStore for NoStaticStore {
  async fn read(&self, category: Category) -> Result<Value, StaticError> {
    Err(StaticError::NotFound(category))
  }
}

/// Strip the wrappers published files may carry.
///
/// Accepted: the bare record/list, `{"<field>": ...}`, `{"data": {"<field>": ...}}`
/// where `<field>` is the category's GraphQL field name.
pub fn unwrap_envelope(category: Category, body: Value) -> Result<Value, StaticError> {
  let field = category.graphql_field();

  let mut value = body;
  if let Some(inner) = value.get_mut("data").filter(|d| d.is_object()).map(Value::take) {
    value = inner;
  }
  if let Some(inner) = value.get_mut(field).map(Value::take) {
    value = inner;
  }

  let shape_ok = match category {
    Category::Projects => value.is_array(),
    Category::Profile | Category::HomeStats => value.is_object(),
  };

  if shape_ok {
    Ok(value)
  } else {
    let expected = match category {
      Category::Projects => "a list",
      Category::Profile | Category::HomeStats => "an object",
    };
    Err(StaticError::Malformed {
      category,
      reason: format!("expected {} after unwrapping", expected),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unwrap_variants() {
    let bare = serde_json::json!([{ "id": 1 }]);
    assert_eq!(unwrap_envelope(Category::Projects, bare.clone()).unwrap(), bare);

    let wrapped = serde_json::json!({ "data": { "projects": [{ "id": 1 }] } });
    assert_eq!(unwrap_envelope(Category::Projects, wrapped).unwrap(), bare);

    let keyed = serde_json::json!({ "homeData": { "name": "X" } });
    assert_eq!(
      unwrap_envelope(Category::HomeStats, keyed).unwrap(),
      serde_json::json!({ "name": "X" })
    );

    let profile = serde_json::json!({ "name": "Ada", "summary": [] });
    assert_eq!(unwrap_envelope(Category::Profile, profile.clone()).unwrap(), profile);
  }

  #[test]
  fn test_unwrap_rejects_wrong_shape() {
    let err = unwrap_envelope(Category::Projects, serde_json::json!({ "name": "X" }));
    assert!(matches!(err, Err(StaticError::Malformed { .. })));
  }

  #[tokio::test]
  async fn test_dir_store() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
      dir.path().join("homedata.json"),
      r#"{"homeData": {"name": "X", "stats": {"yearsExperience": 10}}}"#,
    )
    .unwrap();

    let store = DirStaticStore::new(dir.path());
    let home = store.read(Category::HomeStats).await.unwrap();
    assert_eq!(home["name"], "X");

    assert_eq!(
      store.read(Category::Profile).await,
      Err(StaticError::NotFound(Category::Profile))
    );
  }

  #[tokio::test]
  async fn test_dir_store_malformed() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("profile.json"), "{ not json").unwrap();
    let store = DirStaticStore::new(dir.path());
    assert!(matches!(
      store.read(Category::Profile).await,
      Err(StaticError::Malformed { .. })
    ));
  }

  #[test]
  fn test_snapshot_url() {
    let base = url::Url::parse("https://cdn.example.com/site/").unwrap();
    assert_eq!(
      snapshot_url(&base, Category::HomeStats).unwrap().as_str(),
      "https://cdn.example.com/site/data/homedata.json"
    );
  }
}
