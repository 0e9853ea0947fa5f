//! Shared fixtures and in-memory collaborators for unit tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ClientError;
use crate::forge::{
    Award, BranchInfo, BranchPage, CommitInfo, MergeRequestInfo, MrListState, ProjectInfo,
    SourceForge,
};
use crate::identity::Directory;
use crate::marker::MarkerNames;
use crate::notify::{Email, Mailer};
use crate::policy::{Policy, PolicyFile, ProjectPolicy};

pub const SERVICE_USER: &str = "gatekeeper";

/// Minimal valid policy file. The `projects:` section comes last so tests can
/// append entries to it.
pub fn policy_yaml() -> String {
    "awards:\n\
     \x20 ready: white_check_mark\n\
     \x20 not_ready: hourglass\n\
     \x20 non_compliant: no_entry\n\
     \x20 like: thumbsup\n\
     \x20 dislike: thumbsdown\n\
     projects:\n\
     \x20 - id: 1\n\
     \x20   teams:\n\
     \x20     backend: [alice, bob]\n\
     \x20     frontend: [carol]\n"
        .to_string()
}

pub fn marker_names() -> MarkerNames {
    MarkerNames {
        ready: "white_check_mark".to_string(),
        not_ready: "hourglass".to_string(),
        non_compliant: "no_entry".to_string(),
        like: "thumbsup".to_string(),
        dislike: "thumbsdown".to_string(),
    }
}

pub fn project(id: u64, teams: &[(&str, &[&str])], consensus: u32) -> ProjectPolicy {
    ProjectPolicy {
        id,
        teams: teams
            .iter()
            .map(|(team, members)| {
                (
                    team.to_string(),
                    members.iter().map(|m| m.to_string()).collect::<BTreeSet<_>>(),
                )
            })
            .collect::<BTreeMap<_, _>>(),
        consensus,
    }
}

pub fn policy_with_projects(projects: Vec<ProjectPolicy>) -> Policy {
    Policy::new(
        PolicyFile {
            awards: marker_names(),
            projects,
        },
        SERVICE_USER,
    )
    .unwrap()
}

pub fn policy_with_project(project: ProjectPolicy) -> Policy {
    policy_with_projects(vec![project])
}

pub fn award(id: u64, name: &str, user: &str) -> Award {
    Award {
        id,
        name: name.to_string(),
        user: user.to_string(),
    }
}

pub fn merge_request(iid: u64, target: &str, author: &str) -> MergeRequestInfo {
    MergeRequestInfo {
        iid,
        target_branch: target.to_string(),
        author: author.to_string(),
        merged_by: None,
        web_url: format!("https://git.example.com/group/app/-/merge_requests/{iid}"),
        draft: false,
    }
}

pub fn branch(name: &str, author: &str, email: &str, authored: DateTime<Utc>) -> BranchInfo {
    BranchInfo {
        name: name.to_string(),
        protected: false,
        commit: CommitInfo {
            author_name: author.to_string(),
            author_email: email.to_string(),
            authored_date: authored,
        },
    }
}

/// A call that changed something on the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForgeWrite {
    CreateAward { project: u64, mr: u64, name: String },
    DeleteAward { project: u64, mr: u64, award_id: u64 },
    Note { project: u64, mr: u64, body: String },
}

#[derive(Default)]
pub struct FakeForge {
    merge_requests: HashMap<(u64, MrListState), Vec<MergeRequestInfo>>,
    awards: HashMap<(u64, u64), Vec<Award>>,
    protected: HashMap<u64, BTreeSet<String>>,
    branch_pages: HashMap<(u64, u32), BranchPage>,
    projects: HashMap<u64, ProjectInfo>,
    failing_awards: HashSet<(u64, u64)>,
    failing_creates: HashSet<(u64, u64, String)>,
    failing_branch_pages: HashSet<(u64, u32)>,
    next_award_id: AtomicU64,
    project_info_calls: AtomicUsize,
    branch_page_calls: Mutex<Vec<(u64, u32)>>,
    writes: Mutex<Vec<ForgeWrite>>,
}

impl FakeForge {
    pub fn new() -> Self {
        Self {
            next_award_id: AtomicU64::new(1000),
            ..Self::default()
        }
    }

    pub fn with_merge_request(
        mut self,
        project: u64,
        state: MrListState,
        mr: MergeRequestInfo,
    ) -> Self {
        self.merge_requests
            .entry((project, state))
            .or_default()
            .push(mr);
        self
    }

    pub fn with_awards(mut self, project: u64, mr: u64, awards: Vec<Award>) -> Self {
        self.awards.insert((project, mr), awards);
        self
    }

    pub fn with_protected(mut self, project: u64, branches: &[&str]) -> Self {
        self.protected
            .insert(project, branches.iter().map(|b| b.to_string()).collect());
        self
    }

    pub fn with_branch_page(
        mut self,
        project: u64,
        page: u32,
        branches: Vec<BranchInfo>,
        next_page: Option<u32>,
    ) -> Self {
        self.branch_pages
            .insert((project, page), BranchPage { branches, next_page });
        self
    }

    pub fn with_project(mut self, id: u64, name: &str, web_url: &str) -> Self {
        self.projects.insert(
            id,
            ProjectInfo {
                name: name.to_string(),
                web_url: web_url.to_string(),
            },
        );
        self
    }

    pub fn failing_awards(mut self, project: u64, mr: u64) -> Self {
        self.failing_awards.insert((project, mr));
        self
    }

    pub fn failing_create(mut self, project: u64, mr: u64, name: &str) -> Self {
        self.failing_creates.insert((project, mr, name.to_string()));
        self
    }

    pub fn failing_branch_page(mut self, project: u64, page: u32) -> Self {
        self.failing_branch_pages.insert((project, page));
        self
    }

    pub fn writes(&self) -> Vec<ForgeWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn notes(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                ForgeWrite::Note { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn project_info_calls(&self) -> usize {
        self.project_info_calls.load(Ordering::SeqCst)
    }

    pub fn branch_page_calls(&self) -> Vec<(u64, u32)> {
        self.branch_page_calls.lock().unwrap().clone()
    }

    fn record(&self, write: ForgeWrite) {
        self.writes.lock().unwrap().push(write);
    }
}

#[async_trait]
impl SourceForge for FakeForge {
    async fn list_merge_requests(
        &self,
        project_id: u64,
        state: MrListState,
    ) -> Result<Vec<MergeRequestInfo>, ClientError> {
        Ok(self
            .merge_requests
            .get(&(project_id, state))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_awards(&self, project_id: u64, mr_iid: u64) -> Result<Vec<Award>, ClientError> {
        if self.failing_awards.contains(&(project_id, mr_iid)) {
            return Err(ClientError::connection("award listing refused"));
        }
        Ok(self
            .awards
            .get(&(project_id, mr_iid))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_protected_branches(
        &self,
        project_id: u64,
    ) -> Result<BTreeSet<String>, ClientError> {
        self.protected
            .get(&project_id)
            .cloned()
            .ok_or_else(|| ClientError::not_found(format!("project {project_id}")))
    }

    async fn list_branches(&self, project_id: u64, page: u32) -> Result<BranchPage, ClientError> {
        self.branch_page_calls.lock().unwrap().push((project_id, page));
        if self.failing_branch_pages.contains(&(project_id, page)) {
            return Err(ClientError::connection("branch listing refused"));
        }
        Ok(self
            .branch_pages
            .get(&(project_id, page))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_award(
        &self,
        project_id: u64,
        mr_iid: u64,
        name: &str,
    ) -> Result<u64, ClientError> {
        if self
            .failing_creates
            .contains(&(project_id, mr_iid, name.to_string()))
        {
            return Err(ClientError::Rejected {
                status: 403,
                message: "forbidden".to_string(),
            });
        }
        self.record(ForgeWrite::CreateAward {
            project: project_id,
            mr: mr_iid,
            name: name.to_string(),
        });
        Ok(self.next_award_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn delete_award(
        &self,
        project_id: u64,
        mr_iid: u64,
        award_id: u64,
    ) -> Result<(), ClientError> {
        self.record(ForgeWrite::DeleteAward {
            project: project_id,
            mr: mr_iid,
            award_id,
        });
        Ok(())
    }

    async fn project_info(&self, project_id: u64) -> Result<ProjectInfo, ClientError> {
        self.project_info_calls.fetch_add(1, Ordering::SeqCst);
        self.projects
            .get(&project_id)
            .cloned()
            .ok_or_else(|| ClientError::not_found(format!("project {project_id}")))
    }

    async fn create_note(
        &self,
        project_id: u64,
        mr_iid: u64,
        body: &str,
    ) -> Result<(), ClientError> {
        self.record(ForgeWrite::Note {
            project: project_id,
            mr: mr_iid,
            body: body.to_string(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    mails: HashSet<String>,
    users: HashMap<String, String>,
    fail_mail_lookups: bool,
    mail_lookups: AtomicUsize,
    username_lookups: AtomicUsize,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// An account whose mail is `mail` and whose username nobody uses.
    pub fn with_mail(mut self, mail: &str) -> Self {
        self.mails.insert(mail.to_string());
        self
    }

    pub fn with_user(mut self, username: &str, mail: &str) -> Self {
        self.users.insert(username.to_lowercase(), mail.to_string());
        self.mails.insert(mail.to_string());
        self
    }

    pub fn failing_mail_lookups(mut self) -> Self {
        self.fail_mail_lookups = true;
        self
    }

    pub fn mail_lookups(&self) -> usize {
        self.mail_lookups.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.mail_lookups() + self.username_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn lookup_by_mail(&self, email: &str) -> Result<Vec<String>, ClientError> {
        self.mail_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_mail_lookups {
            return Err(ClientError::connection("directory unavailable"));
        }
        Ok(self.mails.get(email).cloned().into_iter().collect())
    }

    async fn lookup_by_usernames(&self, usernames: &[String]) -> Result<Vec<String>, ClientError> {
        self.username_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(usernames
            .iter()
            .filter_map(|u| self.users.get(&u.to_lowercase()).cloned())
            .collect())
    }
}

#[derive(Default)]
pub struct FakeMailer {
    fail: bool,
    sent: Mutex<Vec<Email>>,
}

impl FakeMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: &Email) -> Result<(), ClientError> {
        if self.fail {
            return Err(ClientError::connection("relay refused"));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}
