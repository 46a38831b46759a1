//! Derived views over a resolved project list.
//!
//! These run on whatever snapshot the arbitrator produced, so filtering works
//! identically whether the list came from the live endpoint or a fallback.

use std::collections::BTreeSet;

use super::types::{HomeData, Project, ProjectType};

pub fn projects_by_type(projects: &[Project], project_type: ProjectType) -> Vec<Project> {
  projects
    .iter()
    .filter(|p| p.project_type == project_type)
    .cloned()
    .collect()
}

/// Case-insensitive substring match on any technology.
pub fn projects_by_technology(projects: &[Project], technology: &str) -> Vec<Project> {
  let needle = technology.to_lowercase();
  projects
    .iter()
    .filter(|p| p.technologies.iter().any(|t| t.to_lowercase().contains(&needle)))
    .cloned()
    .collect()
}

/// Case-insensitive match against title, description and technologies.
pub fn search_projects(projects: &[Project], query: &str) -> Vec<Project> {
  let needle = query.trim().to_lowercase();
  if needle.is_empty() {
    return projects.to_vec();
  }

  projects
    .iter()
    .filter(|p| {
      p.title.to_lowercase().contains(&needle)
        || p.description.to_lowercase().contains(&needle)
        || p.technologies.iter().any(|t| t.to_lowercase().contains(&needle))
    })
    .cloned()
    .collect()
}

/// Distinct technologies across all projects, sorted.
pub fn all_technologies(projects: &[Project]) -> Vec<String> {
  projects
    .iter()
    .flat_map(|p| p.technologies.iter().cloned())
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}

pub fn find_project(projects: &[Project], id: u32) -> Option<&Project> {
  projects.iter().find(|p| p.id == id)
}

/// Id the CRUD service assigns to the next created project, or `None` once the
/// id space is exhausted.
pub fn next_project_id(projects: &[Project]) -> Option<u32> {
  match projects.iter().map(|p| p.id).max() {
    Some(max) => max.checked_add(1),
    None => Some(1),
  }
}

/// Recompute the counters the live `homeData` query derives from the catalog.
pub fn derive_home_stats(mut home: HomeData, projects: &[Project]) -> HomeData {
  home.stats.projects_delivered = projects.len() as u32;
  home.stats.technologies_count = all_technologies(projects).len() as u32;
  home
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::HomeStats;

  fn project(id: u32, title: &str, techs: &[&str], project_type: ProjectType) -> Project {
    Project {
      id,
      title: title.to_string(),
      description: format!("{} description", title),
      technologies: techs.iter().map(|t| t.to_string()).collect(),
      company: None,
      demo_link: None,
      github_link: None,
      project_type,
      created_at: None,
      updated_at: None,
    }
  }

  fn sample() -> Vec<Project> {
    vec![
      project(1, "Billing", &["Rust", "PostgreSQL"], ProjectType::Professional),
      project(4, "Blog", &["TypeScript", "React"], ProjectType::Personal),
      project(2, "Dashboards", &["React", "GraphQL"], ProjectType::Professional),
    ]
  }

  #[test]
  fn test_filter_by_type() {
    let personal = projects_by_type(&sample(), ProjectType::Personal);
    assert_eq!(personal.len(), 1);
    assert_eq!(personal[0].title, "Blog");
  }

  #[test]
  fn test_filter_by_technology_is_case_insensitive() {
    let react = projects_by_technology(&sample(), "react");
    assert_eq!(react.len(), 2);
    let sql = projects_by_technology(&sample(), "SQL");
    assert_eq!(sql.len(), 1);
  }

  #[test]
  fn test_search() {
    assert_eq!(search_projects(&sample(), "graphql").len(), 1);
    assert_eq!(search_projects(&sample(), "DESCRIPTION").len(), 3);
    assert_eq!(search_projects(&sample(), "  ").len(), 3);
    assert!(search_projects(&sample(), "kotlin").is_empty());
  }

  #[test]
  fn test_all_technologies_sorted_distinct() {
    assert_eq!(
      all_technologies(&sample()),
      vec!["GraphQL", "PostgreSQL", "React", "Rust", "TypeScript"]
    );
  }

  #[test]
  fn test_next_id() {
    assert_eq!(next_project_id(&[]), Some(1));
    assert_eq!(next_project_id(&sample()), Some(5));

    let mut full = sample();
    full[0].id = u32::MAX;
    assert_eq!(next_project_id(&full), None);
    assert_eq!(find_project(&sample(), 2).map(|p| p.title.as_str()), Some("Dashboards"));
    assert!(find_project(&sample(), 3).is_none());
  }

  #[test]
  fn test_derive_home_stats() {
    let home = HomeData {
      name: "X".to_string(),
      roles: Vec::new(),
      intro: Vec::new(),
      stats: HomeStats {
        years_experience: 10,
        technologies_count: 0,
        projects_delivered: 0,
      },
    };
    let home = derive_home_stats(home, &sample());
    assert_eq!(home.stats.projects_delivered, 3);
    assert_eq!(home.stats.technologies_count, 5);
    assert_eq!(home.stats.years_experience, 10);
  }
}
