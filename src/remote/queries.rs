//! GraphQL documents and the response envelope.
//!
//! Wire types are kept separate from the domain records: the envelope is
//! parsed here and only the `data.<field>` value is handed on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;
use crate::model::{Category, ProjectType};

const PROJECT_FIELDS: &str = r#"
      id
      title
      description
      technologies
      Company
      demoLink
      githubLink
      type
      createdAt
      updatedAt
"#;

const PROFILE_QUERY: &str = r#"
  query GetProfile {
    profile {
      name
      summary
      skills { name image }
      workExperience { title company years details }
      education { degree school year details }
      certifications { name org year details }
      interests
      contact { type value icon }
    }
  }
"#;

const HOME_DATA_QUERY: &str = r#"
  query GetHomeData {
    homeData {
      name
      roles
      intro
      stats { yearsExperience technologiesCount projectsDelivered }
    }
  }
"#;

const ALL_TECHNOLOGIES_QUERY: &str = "query GetAllTechnologies { allTechnologies }";

/// Category-specific parameters for a remote fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryParams {
  /// Restrict Projects to one type (`projectsByType`).
  pub project_type: Option<ProjectType>,
}

impl QueryParams {
  pub fn of_type(project_type: ProjectType) -> Self {
    Self {
      project_type: Some(project_type),
    }
  }

  /// Suffix appended to a category's cache key so filtered and unfiltered
  /// results never overwrite each other.
  pub fn key_suffix(&self) -> Option<String> {
    self.project_type.map(|t| format!("type={}", t))
  }
}

/// Every read operation the endpoint exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphQuery {
  Projects,
  ProjectsByType(ProjectType),
  Project(u32),
  Profile,
  HomeData,
  AllTechnologies,
}

impl GraphQuery {
  /// Query used to resolve a category with the given parameters.
  pub fn for_category(category: Category, params: &QueryParams) -> Self {
    match (category, params.project_type) {
      (Category::Projects, Some(t)) => Self::ProjectsByType(t),
      (Category::Projects, None) => Self::Projects,
      (Category::Profile, _) => Self::Profile,
      (Category::HomeStats, _) => Self::HomeData,
    }
  }

  pub fn document(&self) -> String {
    match self {
      Self::Projects => format!("query GetProjects {{\n    projects {{{}    }}\n  }}", PROJECT_FIELDS),
      Self::ProjectsByType(_) => format!(
        "query GetProjectsByType($type: ProjectType!) {{\n    projectsByType(type: $type) {{{}    }}\n  }}",
        PROJECT_FIELDS
      ),
      Self::Project(_) => format!(
        "query GetProject($id: Int!) {{\n    project(id: $id) {{{}    }}\n  }}",
        PROJECT_FIELDS
      ),
      Self::Profile => PROFILE_QUERY.to_string(),
      Self::HomeData => HOME_DATA_QUERY.to_string(),
      Self::AllTechnologies => ALL_TECHNOLOGIES_QUERY.to_string(),
    }
  }

  pub fn operation_name(&self) -> &'static str {
    match self {
      Self::Projects => "GetProjects",
      Self::ProjectsByType(_) => "GetProjectsByType",
      Self::Project(_) => "GetProject",
      Self::Profile => "GetProfile",
      Self::HomeData => "GetHomeData",
      Self::AllTechnologies => "GetAllTechnologies",
    }
  }

  pub fn variables(&self) -> Value {
    match self {
      Self::ProjectsByType(t) => serde_json::json!({ "type": t.as_str() }),
      Self::Project(id) => serde_json::json!({ "id": id }),
      _ => serde_json::json!({}),
    }
  }

  /// Field of the `data` object carrying the result.
  pub fn data_field(&self) -> &'static str {
    match self {
      Self::Projects => "projects",
      Self::ProjectsByType(_) => "projectsByType",
      Self::Project(_) => "project",
      Self::Profile => "profile",
      Self::HomeData => "homeData",
      Self::AllTechnologies => "allTechnologies",
    }
  }

  /// Whether a `null` result is a legitimate answer rather than a failure.
  pub fn allows_null(&self) -> bool {
    matches!(self, Self::Project(_))
  }

  pub fn request_body(&self) -> GraphRequest {
    GraphRequest {
      query: self.document(),
      operation_name: self.operation_name(),
      variables: self.variables(),
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRequest {
  pub query: String,
  pub operation_name: &'static str,
  pub variables: Value,
}

#[derive(Debug, Deserialize)]
pub struct GraphResponse {
  #[serde(default)]
  pub data: Option<Value>,
  #[serde(default)]
  pub errors: Vec<GraphErrorItem>,
}

#[derive(Debug, Deserialize)]
pub struct GraphErrorItem {
  pub message: String,
}

impl GraphResponse {
  /// Pull the query's field out of the envelope.
  ///
  /// Any entry in `errors` fails the whole query, matching a client that
  /// refuses partial data.
  pub fn into_field(self, query: &GraphQuery) -> Result<Value, RemoteError> {
    if let Some(first) = self.errors.first() {
      let extra = self.errors.len() - 1;
      let message = if extra > 0 {
        format!("{} (+{} more)", first.message, extra)
      } else {
        first.message.clone()
      };
      return Err(RemoteError::GraphQl(message));
    }

    let field = query.data_field();
    let value = self
      .data
      .and_then(|mut data| data.get_mut(field).map(Value::take))
      .unwrap_or(Value::Null);

    if value.is_null() && !query.allows_null() {
      return Err(RemoteError::GraphQl(format!("query returned no {}", field)));
    }

    Ok(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_category_query_selection() {
    assert_eq!(
      GraphQuery::for_category(Category::Projects, &QueryParams::default()),
      GraphQuery::Projects
    );
    assert_eq!(
      GraphQuery::for_category(Category::Projects, &QueryParams::of_type(ProjectType::Personal)),
      GraphQuery::ProjectsByType(ProjectType::Personal)
    );
    assert_eq!(
      GraphQuery::for_category(Category::HomeStats, &QueryParams::of_type(ProjectType::Personal)),
      GraphQuery::HomeData
    );
  }

  #[test]
  fn test_request_body_variables() {
    let body = GraphQuery::ProjectsByType(ProjectType::Professional).request_body();
    assert!(body.query.contains("projectsByType(type: $type)"));
    assert_eq!(body.variables["type"], "professional");

    let json = serde_json::to_value(GraphQuery::Project(3).request_body()).unwrap();
    assert_eq!(json["operationName"], "GetProject");
    assert_eq!(json["variables"]["id"], 3);
  }

  #[test]
  fn test_envelope_success() {
    let resp: GraphResponse = serde_json::from_value(serde_json::json!({
      "data": { "homeData": { "name": "X" } }
    }))
    .unwrap();
    let value = resp.into_field(&GraphQuery::HomeData).unwrap();
    assert_eq!(value["name"], "X");
  }

  #[test]
  fn test_envelope_errors() {
    let resp: GraphResponse = serde_json::from_value(serde_json::json!({
      "data": null,
      "errors": [{ "message": "Failed to fetch profile" }, { "message": "other" }]
    }))
    .unwrap();
    assert_eq!(
      resp.into_field(&GraphQuery::Profile),
      Err(RemoteError::GraphQl("Failed to fetch profile (+1 more)".to_string()))
    );
  }

  #[test]
  fn test_envelope_null_result() {
    let resp: GraphResponse =
      serde_json::from_value(serde_json::json!({ "data": { "profile": null } })).unwrap();
    assert!(matches!(
      resp.into_field(&GraphQuery::Profile),
      Err(RemoteError::GraphQl(_))
    ));

    let resp: GraphResponse =
      serde_json::from_value(serde_json::json!({ "data": { "project": null } })).unwrap();
    assert_eq!(resp.into_field(&GraphQuery::Project(9)), Ok(Value::Null));
  }

  #[test]
  fn test_filtered_key_suffix() {
    assert_eq!(QueryParams::default().key_suffix(), None);
    assert_eq!(
      QueryParams::of_type(ProjectType::Personal).key_suffix().as_deref(),
      Some("type=personal")
    );
  }
}
