//! Aggregated dead-branch report.
//!
//! Two views of the same data are built side by side: per project (for owners
//! and the JSON output) and per canonical author email (for the digests).
//! Every collection is keyed and ordered, so rendering is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::identity::AuthorIdentity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadBranchEntry {
    /// Commit author name as recorded in the commit.
    pub author: String,
    pub age_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectReport {
    pub name: String,
    pub url: String,
    pub owners: BTreeSet<String>,
    pub branches: BTreeMap<String, DeadBranchEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorReport {
    pub name: String,
    /// Project id -> dead branch names.
    pub branches: BTreeMap<u64, BTreeSet<String>>,
}

impl AuthorReport {
    pub fn branch_count(&self) -> usize {
        self.branches.values().map(BTreeSet::len).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeadBranchReport {
    pub projects: BTreeMap<u64, ProjectReport>,
    /// Canonical email -> report.
    pub authors: BTreeMap<String, AuthorReport>,
}

impl DeadBranchReport {
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn has_project(&self, project_id: u64) -> bool {
        self.projects.contains_key(&project_id)
    }

    pub fn insert_project(&mut self, project_id: u64, report: ProjectReport) {
        self.projects.entry(project_id).or_insert(report);
    }

    /// Record one dead branch under its project and its resolved author.
    ///
    /// The project entry must already exist. An author entry keeps the
    /// display name it was first created with.
    pub fn add_branch(
        &mut self,
        project_id: u64,
        branch: &str,
        commit_author: &str,
        author: &AuthorIdentity,
        age_days: i64,
    ) {
        if let Some(project) = self.projects.get_mut(&project_id) {
            project.branches.insert(
                branch.to_string(),
                DeadBranchEntry {
                    author: commit_author.to_string(),
                    age_days,
                },
            );
        }

        self.authors
            .entry(author.email.clone())
            .or_insert_with(|| AuthorReport {
                name: author.display_name.clone(),
                branches: BTreeMap::new(),
            })
            .branches
            .entry(project_id)
            .or_default()
            .insert(branch.to_string());
    }

    pub fn branch_count(&self) -> usize {
        self.projects.values().map(|p| p.branches.len()).sum()
    }
}
