//! Contract for the source forge the bot governs.
//!
//! Everything the audit, the executor and the dead-branch detector need from
//! the forge goes through [`SourceForge`]. The binary crate implements it over
//! the GitLab REST API; tests use an in-memory fake.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Which merge requests to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MrListState {
    Opened,
    Merged,
}

impl MrListState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Merged => "merged",
        }
    }
}

/// Merge request as listed by the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequestInfo {
    pub iid: u64,
    pub target_branch: String,
    pub author: String,
    pub merged_by: Option<String>,
    pub web_url: String,
    pub draft: bool,
}

/// One award (emoji reaction) on a merge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Award {
    pub id: u64,
    pub name: String,
    /// Username of whoever placed the award.
    pub user: String,
}

/// Head commit details needed to judge a branch's staleness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub author_name: String,
    pub author_email: String,
    pub authored_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub name: String,
    pub protected: bool,
    pub commit: CommitInfo,
}

/// A page of branches plus the server's pointer to the next page, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BranchPage {
    pub branches: Vec<BranchInfo>,
    pub next_page: Option<u32>,
}

/// Display metadata for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectInfo {
    pub name: String,
    pub web_url: String,
}

#[async_trait]
pub trait SourceForge: Send + Sync {
    async fn list_merge_requests(
        &self,
        project_id: u64,
        state: MrListState,
    ) -> Result<Vec<MergeRequestInfo>, ClientError>;

    async fn list_awards(&self, project_id: u64, mr_iid: u64) -> Result<Vec<Award>, ClientError>;

    async fn list_protected_branches(&self, project_id: u64)
        -> Result<BTreeSet<String>, ClientError>;

    /// Fetch one page of branches. Pages are numbered from 1.
    async fn list_branches(&self, project_id: u64, page: u32) -> Result<BranchPage, ClientError>;

    /// Place an award and return its id.
    async fn create_award(&self, project_id: u64, mr_iid: u64, name: &str)
        -> Result<u64, ClientError>;

    async fn delete_award(
        &self,
        project_id: u64,
        mr_iid: u64,
        award_id: u64,
    ) -> Result<(), ClientError>;

    async fn project_info(&self, project_id: u64) -> Result<ProjectInfo, ClientError>;

    async fn create_note(&self, project_id: u64, mr_iid: u64, body: &str)
        -> Result<(), ClientError>;
}
