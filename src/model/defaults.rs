//! Embedded last-resort records, used only when remote, cache and static
//! sources are all exhausted. They keep the site renderable, nothing more.

use super::snapshot::{Category, CategoryData};
use super::types::{HomeData, HomeStats, Profile, Project, ProjectType};

// ============================================================================
// CategoryData implementations
// ============================================================================

impl CategoryData for Vec<Project> {
  const CATEGORY: Category = Category::Projects;

  fn default_record() -> Self {
    vec![Project {
      id: 1,
      title: "Portfolio Website".to_string(),
      description: "A responsive portfolio website with an offline-capable data layer".to_string(),
      technologies: vec![
        "React".to_string(),
        "TypeScript".to_string(),
        "GraphQL".to_string(),
      ],
      company: None,
      demo_link: None,
      github_link: None,
      project_type: ProjectType::Personal,
      created_at: None,
      updated_at: None,
    }]
  }
}

impl CategoryData for Profile {
  const CATEGORY: Category = Category::Profile;

  fn default_record() -> Self {
    Profile {
      name: "Portfolio Owner".to_string(),
      summary: vec![
        "Full-stack developer with a passion for building reliable web experiences.".to_string(),
      ],
      skills: Vec::new(),
      work_experience: Vec::new(),
      education: Vec::new(),
      certifications: Vec::new(),
      interests: Vec::new(),
      contact: Vec::new(),
    }
  }
}

impl CategoryData for HomeData {
  const CATEGORY: Category = Category::HomeStats;

  fn default_record() -> Self {
    HomeData {
      name: "Portfolio Owner".to_string(),
      roles: vec!["Software Engineer".to_string()],
      intro: vec!["Welcome to my portfolio.".to_string()],
      stats: HomeStats {
        years_experience: 10,
        technologies_count: 0,
        projects_delivered: 0,
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_never_empty() {
    assert!(!<Vec<Project>>::default_record().is_empty());
    assert!(!Profile::default_record().name.is_empty());
    assert!(!HomeData::default_record().roles.is_empty());
  }

  #[test]
  fn test_default_categories() {
    assert_eq!(<Vec<Project> as CategoryData>::CATEGORY, Category::Projects);
    assert_eq!(Profile::CATEGORY, Category::Profile);
    assert_eq!(HomeData::CATEGORY, Category::HomeStats);
  }
}
