//! Portfolio records as served by the GraphQL endpoint and the static
//! snapshot files. Field names follow the wire format (camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of engagement a project came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
  #[default]
  Professional,
  Personal,
}

impl ProjectType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Professional => "professional",
      Self::Personal => "personal",
    }
  }
}

impl fmt::Display for ProjectType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ProjectType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "professional" => Ok(Self::Professional),
      "personal" => Ok(Self::Personal),
      other => Err(format!("unknown project type '{}'", other)),
    }
  }
}

/// Catalog entry. `id` is assigned by the CRUD service, never by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
  pub id: u32,
  pub title: String,
  pub description: String,
  #[serde(default)]
  pub technologies: Vec<String>,
  #[serde(rename = "Company", default, skip_serializing_if = "Option::is_none")]
  pub company: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub demo_link: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub github_link: Option<String>,
  #[serde(rename = "type", default)]
  pub project_type: ProjectType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
  pub name: String,
  pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkExperience {
  pub title: String,
  pub company: String,
  #[serde(default)]
  pub years: String,
  #[serde(default)]
  pub details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Education {
  pub degree: String,
  pub school: String,
  #[serde(default)]
  pub year: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certification {
  pub name: String,
  #[serde(default)]
  pub org: String,
  #[serde(default)]
  pub year: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

/// One way of getting in touch (email, phone, social profile).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
  #[serde(rename = "type")]
  pub kind: String,
  pub value: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

/// Singleton profile document. At most one exists server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
  pub name: String,
  #[serde(default)]
  pub summary: Vec<String>,
  #[serde(default)]
  pub skills: Vec<Skill>,
  #[serde(default)]
  pub work_experience: Vec<WorkExperience>,
  #[serde(default)]
  pub education: Vec<Education>,
  #[serde(default)]
  pub certifications: Vec<Certification>,
  #[serde(default)]
  pub interests: Vec<String>,
  #[serde(default)]
  pub contact: Vec<Contact>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeStats {
  #[serde(default)]
  pub years_experience: u32,
  #[serde(default)]
  pub technologies_count: u32,
  #[serde(default)]
  pub projects_delivered: u32,
}

/// Landing page record: headline, roles, intro paragraphs and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeData {
  pub name: String,
  #[serde(default)]
  pub roles: Vec<String>,
  #[serde(default)]
  pub intro: Vec<String>,
  #[serde(default)]
  pub stats: HomeStats,
}

/// Inbound contact submission. Only the read flag ever changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
  pub id: String,
  pub name: String,
  pub email: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  pub message: String,
  #[serde(default)]
  pub is_read: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub read_at: Option<DateTime<Utc>>,
}

impl ContactMessage {
  pub fn new(
    id: impl Into<String>,
    name: impl Into<String>,
    email: impl Into<String>,
    phone: Option<String>,
    message: impl Into<String>,
  ) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      email: email.into(),
      phone,
      message: message.into(),
      is_read: false,
      read_at: None,
    }
  }

  /// Flag as read. A message already read keeps its original `read_at`.
  pub fn mark_read(&mut self, at: DateTime<Utc>) {
    if !self.is_read {
      self.is_read = true;
      self.read_at = Some(at);
    }
  }

  pub fn mark_unread(&mut self) {
    self.is_read = false;
    self.read_at = None;
  }
}
