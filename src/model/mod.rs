//! Domain records and the snapshot/source vocabulary.

pub mod catalog;
mod defaults;
mod snapshot;
mod types;

pub use snapshot::{Category, CategoryData, DataSnapshot, SourceKind, SourceState};
pub use types::{
  Certification, Contact, ContactMessage, Education, HomeData, HomeStats, Profile, Project,
  ProjectType, Skill, WorkExperience,
};
