//! Review policy: governed projects, their reviewing teams, and award names.
//!
//! The policy is read from YAML once per run and validated as a whole. A
//! policy that loads is guaranteed to have at least one project, every project
//! at least one non-empty team, and an unambiguous award catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::PolicyError;
use crate::marker::{MarkerCatalog, MarkerNames};

/// Consensus used when a project with fewer than two teams sets no override.
const SINGLE_TEAM_CONSENSUS: usize = 2;
/// Consensus used when a project with two or more teams sets no override.
const MULTI_TEAM_CONSENSUS: usize = 1;

/// Raw shape of the policy file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyFile {
    pub awards: MarkerNames,
    pub projects: Vec<ProjectPolicy>,
}

/// Review rules for a single project.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectPolicy {
    pub id: u64,
    /// Team name -> member usernames. Usernames are lowercased on load.
    pub teams: BTreeMap<String, BTreeSet<String>>,
    /// Approvals required per team. `0` means "use the default".
    #[serde(default)]
    pub consensus: u32,
}

impl ProjectPolicy {
    /// Approvals each team must contribute before a merge request counts as liked.
    pub fn threshold(&self) -> usize {
        if self.consensus > 0 {
            self.consensus as usize
        } else if self.teams.len() < 2 {
            SINGLE_TEAM_CONSENSUS
        } else {
            MULTI_TEAM_CONSENSUS
        }
    }

    /// Names of the teams `username` belongs to. Matching ignores case.
    pub fn teams_of<'a>(&'a self, username: &str) -> impl Iterator<Item = &'a str> + 'a {
        let username = username.to_lowercase();
        self.teams
            .iter()
            .filter(move |(_, members)| members.contains(&username))
            .map(|(team, _)| team.as_str())
    }

    /// Everyone in any team. Owners are told when a non-compliant merge lands.
    pub fn owners(&self) -> BTreeSet<String> {
        self.teams.values().flatten().cloned().collect()
    }

    fn normalize(mut self) -> Result<Self, PolicyError> {
        if self.teams.is_empty() {
            return Err(PolicyError::NoTeams(self.id));
        }
        for (team, members) in self.teams.iter_mut() {
            let normalized: BTreeSet<String> = members
                .iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect();
            if normalized.is_empty() {
                return Err(PolicyError::EmptyTeam {
                    project: self.id,
                    team: team.clone(),
                });
            }
            *members = normalized;
        }
        Ok(self)
    }
}

/// Validated policy for one run.
#[derive(Debug, Clone)]
pub struct Policy {
    service_user: String,
    markers: MarkerCatalog,
    projects: BTreeMap<u64, ProjectPolicy>,
}

impl Policy {
    pub fn new(file: PolicyFile, service_user: &str) -> Result<Self, PolicyError> {
        let service_user = service_user.trim().to_lowercase();
        if service_user.is_empty() {
            return Err(PolicyError::MissingServiceUser);
        }

        let markers = MarkerCatalog::new(file.awards)?;

        if file.projects.is_empty() {
            return Err(PolicyError::NoProjects);
        }
        let mut projects = BTreeMap::new();
        for project in file.projects {
            let project = project.normalize()?;
            let id = project.id;
            if projects.insert(id, project).is_some() {
                return Err(PolicyError::DuplicateProject(id));
            }
        }

        Ok(Self {
            service_user,
            markers,
            projects,
        })
    }

    pub fn from_yaml(yaml: &str, service_user: &str) -> Result<Self, PolicyError> {
        let file: PolicyFile = serde_yaml::from_str(yaml)?;
        Self::new(file, service_user)
    }

    pub fn load(path: &Path, service_user: &str) -> Result<Self, PolicyError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml, service_user)
    }

    /// Lowercased username of the bot account.
    pub fn service_user(&self) -> &str {
        &self.service_user
    }

    pub fn is_service_user(&self, username: &str) -> bool {
        username.to_lowercase() == self.service_user
    }

    pub fn markers(&self) -> &MarkerCatalog {
        &self.markers
    }

    /// Governed projects, keyed (and iterated) by id.
    pub fn projects(&self) -> &BTreeMap<u64, ProjectPolicy> {
        &self.projects
    }

    pub fn project(&self, id: u64) -> Option<&ProjectPolicy> {
        self.projects.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{policy_yaml, project};

    #[test]
    fn test_threshold_defaults() {
        assert_eq!(project(1, &[("a", &["u1"]), ("b", &["u2"])], 0).threshold(), 1);
        assert_eq!(project(1, &[("a", &["u1", "u2"])], 0).threshold(), 2);
    }

    #[test]
    fn test_threshold_override_wins() {
        assert_eq!(project(1, &[("a", &["u1"]), ("b", &["u2"])], 3).threshold(), 3);
        assert_eq!(project(1, &[("a", &["u1"])], 1).threshold(), 1);
    }

    #[test]
    fn test_load_normalizes_members() {
        let yaml = r#"
awards:
  ready: white_check_mark
  not_ready: hourglass
  non_compliant: no_entry
  like: thumbsup
  dislike: thumbsdown
projects:
  - id: 7
    teams:
      backend: [" Alice ", "BOB"]
"#;
        let policy = Policy::from_yaml(yaml, "Gatekeeper").unwrap();
        let project = policy.project(7).unwrap();
        assert_eq!(
            project.owners(),
            BTreeSet::from(["alice".to_string(), "bob".to_string()])
        );
        assert_eq!(project.teams_of("Alice").collect::<Vec<_>>(), vec!["backend"]);
        assert!(policy.is_service_user("GATEKEEPER"));
    }

    #[test]
    fn test_unknown_award_key_rejected() {
        let yaml = policy_yaml().replace("dislike:", "thumbs_down:");
        assert!(matches!(
            Policy::from_yaml(&yaml, "bot"),
            Err(PolicyError::Parse(_))
        ));
    }

    #[test]
    fn test_duplicate_project_rejected() {
        let yaml = format!(
            "{}  - id: 1\n    teams:\n      qa: [carol]\n",
            policy_yaml()
        );
        assert!(matches!(
            Policy::from_yaml(&yaml, "bot"),
            Err(PolicyError::DuplicateProject(1))
        ));
    }

    #[test]
    fn test_project_without_teams_rejected() {
        let yaml = policy_yaml().replace(
            "    teams:\n      backend: [alice, bob]\n      frontend: [carol]\n",
            "    teams: {}\n",
        );
        assert!(matches!(
            Policy::from_yaml(&yaml, "bot"),
            Err(PolicyError::NoTeams(1))
        ));
    }

    #[test]
    fn test_empty_team_rejected() {
        let yaml = policy_yaml().replace("frontend: [carol]", "frontend: []");
        assert!(matches!(
            Policy::from_yaml(&yaml, "bot"),
            Err(PolicyError::EmptyTeam { project: 1, .. })
        ));
    }

    #[test]
    fn test_missing_service_user_rejected() {
        assert!(matches!(
            Policy::from_yaml(&policy_yaml(), "  "),
            Err(PolicyError::MissingServiceUser)
        ));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Policy::load(&dir.path().join("absent.yaml"), "bot").unwrap_err();
        assert!(matches!(err, PolicyError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(&path, policy_yaml()).unwrap();
        let policy = Policy::load(&path, "bot").unwrap();
        assert_eq!(policy.projects().len(), 1);
        assert_eq!(policy.project(1).unwrap().threshold(), 1);
    }
}
