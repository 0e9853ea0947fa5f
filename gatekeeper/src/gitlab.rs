use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatekeeper_core::{
    Award, BranchInfo, BranchPage, ClientError, CommitInfo, MergeRequestInfo, MrListState,
    ProjectInfo, SourceForge,
};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::recording::{RecordingLogger, RecordingMiddleware};

const PER_PAGE: &str = "100";
/// Merged merge requests checked per run, most recently updated first.
const RECENT_MERGED: &str = "10";
const NEXT_PAGE_HEADER: &str = "x-next-page";

/// GitLab REST v4 client authenticated with a personal or project access token.
#[derive(Clone)]
pub struct GitLabClient {
    client: ClientWithMiddleware,
    api_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct UserRef {
    username: String,
}

#[derive(Debug, Deserialize)]
struct MergeRequestResponse {
    iid: u64,
    target_branch: String,
    author: UserRef,
    merged_by: Option<UserRef>,
    web_url: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    work_in_progress: bool,
}

impl From<MergeRequestResponse> for MergeRequestInfo {
    fn from(mr: MergeRequestResponse) -> Self {
        MergeRequestInfo {
            iid: mr.iid,
            target_branch: mr.target_branch,
            author: mr.author.username,
            merged_by: mr.merged_by.map(|u| u.username),
            web_url: mr.web_url,
            draft: mr.draft || mr.work_in_progress,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AwardResponse {
    id: u64,
    name: String,
    user: UserRef,
}

impl From<AwardResponse> for Award {
    fn from(award: AwardResponse) -> Self {
        Award {
            id: award.id,
            name: award.name,
            user: award.user.username,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProtectedBranchResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    author_name: String,
    author_email: String,
    authored_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    name: String,
    #[serde(default)]
    protected: bool,
    commit: CommitResponse,
}

impl From<BranchResponse> for BranchInfo {
    fn from(branch: BranchResponse) -> Self {
        BranchInfo {
            name: branch.name,
            protected: branch.protected,
            commit: CommitInfo {
                author_name: branch.commit.author_name,
                author_email: branch.commit.author_email,
                authored_date: branch.commit.authored_date,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    name_with_namespace: String,
    web_url: String,
}

#[derive(Debug, Deserialize)]
struct CreatedAward {
    id: u64,
}

#[derive(Debug, Serialize)]
struct CreateNoteRequest<'a> {
    body: &'a str,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self> {
        Self::new_with_recording(base_url, token, timeout, None)
    }

    pub fn new_with_recording(
        base_url: &str,
        token: String,
        timeout: Duration,
        recording_logger: Option<RecordingLogger>,
    ) -> Result<Self> {
        let client = create_gitlab_client(timeout, recording_logger)?;
        Ok(Self {
            client,
            api_url: format!("{}/api/v4", base_url.trim_end_matches('/')),
            token,
        })
    }

    fn project_url(&self, project_id: u64, path: &str) -> String {
        format!("{}/projects/{}{}", self.api_url, project_id, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("PRIVATE-TOKEN", &self.token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ClientError::connection(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let path = response.url().path().to_string();
        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::not_found(path));
        }
        Err(ClientError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        response
            .json()
            .await
            .map_err(|e| ClientError::connection(format!("failed to parse response: {}", e)))
    }

    /// Fetch one page of a listing and the server's next page number.
    async fn get_page<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        page: u32,
    ) -> Result<(Vec<T>, Option<u32>), ClientError> {
        let page = page.to_string();
        let request = self
            .client
            .get(url)
            .query(query)
            .query(&[("page", page.as_str()), ("per_page", PER_PAGE)]);
        let response = self.send(request).await?;
        let next_page = parse_next_page(response.headers());
        Ok((Self::json(response).await?, next_page))
    }

    /// Fetch every page of a listing, following `X-Next-Page`.
    async fn get_all<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, ClientError> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let (batch, next_page) = self.get_page(url, query, page).await?;
            items.extend(batch);
            match next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl SourceForge for GitLabClient {
    async fn list_merge_requests(
        &self,
        project_id: u64,
        state: MrListState,
    ) -> Result<Vec<MergeRequestInfo>, ClientError> {
        let url = self.project_url(project_id, "/merge_requests");
        let query = merge_request_query(state);
        let merge_requests: Vec<MergeRequestResponse> = match state {
            MrListState::Opened => self.get_all(&url, &query).await?,
            MrListState::Merged => {
                Self::json(self.send(self.client.get(&url).query(&query)).await?).await?
            }
        };
        debug!(
            "Listed {} {} merge requests of project {}",
            merge_requests.len(),
            state.as_str(),
            project_id
        );
        Ok(merge_requests.into_iter().map(Into::into).collect())
    }

    async fn list_awards(&self, project_id: u64, mr_iid: u64) -> Result<Vec<Award>, ClientError> {
        let url = self.project_url(project_id, &format!("/merge_requests/{}/award_emoji", mr_iid));
        let awards: Vec<AwardResponse> = self.get_all(&url, &[]).await?;
        Ok(awards.into_iter().map(Into::into).collect())
    }

    async fn list_protected_branches(
        &self,
        project_id: u64,
    ) -> Result<BTreeSet<String>, ClientError> {
        let url = self.project_url(project_id, "/protected_branches");
        let branches: Vec<ProtectedBranchResponse> = self.get_all(&url, &[]).await?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    async fn list_branches(&self, project_id: u64, page: u32) -> Result<BranchPage, ClientError> {
        let url = self.project_url(project_id, "/repository/branches");
        let (branches, next_page): (Vec<BranchResponse>, _) =
            self.get_page(&url, &[], page).await?;
        Ok(BranchPage {
            branches: branches.into_iter().map(Into::into).collect(),
            next_page,
        })
    }

    async fn create_award(
        &self,
        project_id: u64,
        mr_iid: u64,
        name: &str,
    ) -> Result<u64, ClientError> {
        let url = self.project_url(project_id, &format!("/merge_requests/{}/award_emoji", mr_iid));
        let response = self
            .send(self.client.post(&url).query(&[("name", name)]))
            .await?;
        let created: CreatedAward = Self::json(response).await?;
        Ok(created.id)
    }

    async fn delete_award(
        &self,
        project_id: u64,
        mr_iid: u64,
        award_id: u64,
    ) -> Result<(), ClientError> {
        let url = self.project_url(
            project_id,
            &format!("/merge_requests/{}/award_emoji/{}", mr_iid, award_id),
        );
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn project_info(&self, project_id: u64) -> Result<ProjectInfo, ClientError> {
        let url = self.project_url(project_id, "");
        let project: ProjectResponse = Self::json(self.send(self.client.get(&url)).await?).await?;
        Ok(ProjectInfo {
            name: project.name_with_namespace,
            web_url: project.web_url,
        })
    }

    async fn create_note(
        &self,
        project_id: u64,
        mr_iid: u64,
        body: &str,
    ) -> Result<(), ClientError> {
        let url = self.project_url(project_id, &format!("/merge_requests/{}/notes", mr_iid));
        self.send(self.client.post(&url).json(&CreateNoteRequest { body }))
            .await?;
        Ok(())
    }
}

/// Listing parameters for merge requests. Every open merge request is walked,
/// but only the most recently updated window of merged ones is checked.
fn merge_request_query(state: MrListState) -> Vec<(&'static str, &'static str)> {
    let mut query = vec![
        ("state", state.as_str()),
        ("order_by", "updated_at"),
        ("sort", "desc"),
        ("scope", "all"),
    ];
    match state {
        MrListState::Opened => query.push(("wip", "no")),
        MrListState::Merged => query.extend([("page", "1"), ("per_page", RECENT_MERGED)]),
    }
    query
}

/// `X-Next-Page` is empty on the last page.
fn parse_next_page(headers: &HeaderMap) -> Option<u32> {
    headers
        .get(NEXT_PAGE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

pub fn create_gitlab_client(
    timeout: Duration,
    recording_logger: Option<RecordingLogger>,
) -> Result<ClientWithMiddleware> {
    let client = Client::builder()
        .user_agent(format!("gatekeeper/{}", env!("CARGO_PKG_VERSION")))
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")?;

    let mut builder = ClientBuilder::new(client);

    if let Some(logger) = recording_logger {
        builder = builder.with(RecordingMiddleware::new(logger));
    }

    Ok(builder.build())
}
