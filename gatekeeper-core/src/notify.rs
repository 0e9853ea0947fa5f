//! Notes and emails sent as side effects of reconciliation and branch audits.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::ClientError;
use crate::forge::ProjectInfo;
use crate::identity::UNIDENTIFIED_EMAIL;
use crate::policy::ProjectPolicy;
use crate::report::{AuthorReport, DeadBranchReport, ProjectReport};

pub const VIOLATION_SUBJECT: &str = "Code of Conduct failure incident";
pub const DIGEST_SUBJECT: &str = "Stale branches awaiting cleanup";

const AUTHOR_DIGEST_TEMPLATE: &str = include_str!("dead_branches_author.html");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub recipients: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), ClientError>;
}

/// The merge request a notice is about.
#[derive(Debug, Clone, Copy)]
pub struct MergeLink<'a> {
    pub iid: u64,
    pub web_url: &'a str,
    pub project: &'a ProjectInfo,
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Note body mentioning every reviewer of the project, team by team.
///
/// A member of several teams is mentioned once, under the first team.
pub fn reviewers_note(project: &ProjectPolicy) -> String {
    let mut note = String::from("Notifying reviewers:");
    let mut mentioned = BTreeSet::new();
    for members in project.teams.values() {
        for member in members {
            if mentioned.insert(member.as_str()) {
                note.push_str(" @");
                note.push_str(member);
            }
        }
    }
    note
}

/// Substitute `{key}` placeholders in one pass. Substituted text is never
/// scanned again, and unknown placeholders are left as they are.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let found = values
            .iter()
            .find(|(key, _)| tail.starts_with(key) && tail[key.len()..].starts_with('}'));
        match found {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len() + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

fn link(href: &str, text: &str) -> String {
    format!("<a href='{}'>{}</a>", escape_html(href), escape_html(text))
}

fn mr_and_project(mr: MergeLink<'_>) -> (String, String) {
    (
        link(mr.web_url, &format!("Merge Request #{}", mr.iid)),
        link(&mr.project.web_url, &mr.project.name),
    )
}

/// Notice to whoever merged a non-compliant merge request.
pub fn violation_notice(recipients: Vec<String>, mr: MergeLink<'_>) -> Email {
    let (mr_link, project_link) = mr_and_project(mr);
    Email {
        recipients,
        subject: VIOLATION_SUBJECT.to_string(),
        html_body: format!(
            "Hello,<p>By merging {mr_link} in project {project_link} without the required \
             approvals, or despite a negative review, you have failed the repository's \
             Code of Conduct.</p><p>This incident will be reported.</p>"
        ),
    }
}

/// Notice to the project owners about a non-compliant merge.
pub fn owners_notice(recipients: Vec<String>, mr: MergeLink<'_>) -> Email {
    let (mr_link, project_link) = mr_and_project(mr);
    Email {
        recipients,
        subject: format!("MR {} has failed requirements!", mr.iid),
        html_body: format!(
            "<p>{mr_link} in project {project_link} does not meet requirements \
             but it was merged!</p>"
        ),
    }
}

/// Digest of one author's dead branches, grouped by project.
pub fn author_digest(
    email: &str,
    author: &AuthorReport,
    projects: &BTreeMap<u64, ProjectReport>,
) -> Email {
    let mut sections = String::new();
    for (project_id, branches) in &author.branches {
        let fallback_name = project_id.to_string();
        let project = projects.get(project_id);
        let heading = match project {
            Some(p) => link(&p.url, &p.name),
            None => escape_html(&fallback_name),
        };
        sections.push_str(&format!("    <h3>{heading}</h3>\n    <ul>\n"));
        for branch in branches {
            let age = project
                .and_then(|p| p.branches.get(branch))
                .map(|entry| format!(" ({} days)", entry.age_days))
                .unwrap_or_default();
            sections.push_str(&format!("        <li>{}{}</li>\n", escape_html(branch), age));
        }
        sections.push_str("    </ul>\n");
    }

    let name = escape_html(&author.name);
    let count = author.branch_count().to_string();
    let html_body = fill_template(
        AUTHOR_DIGEST_TEMPLATE,
        &[
            ("name", name.as_str()),
            ("projects", sections.as_str()),
            ("count", count.as_str()),
        ],
    );

    Email {
        recipients: vec![email.to_string()],
        subject: DIGEST_SUBJECT.to_string(),
        html_body,
    }
}

/// Sends emails, logging instead of failing.
pub struct NotificationDispatcher<'a> {
    mailer: &'a dyn Mailer,
}

impl<'a> NotificationDispatcher<'a> {
    pub fn new(mailer: &'a dyn Mailer) -> Self {
        Self { mailer }
    }

    /// Send `email`. Returns whether it went out.
    pub async fn dispatch(&self, email: &Email) -> bool {
        if email.recipients.is_empty() {
            warn!("No recipients for \"{}\", not sending", email.subject);
            return false;
        }
        match self.mailer.send(email).await {
            Ok(()) => {
                info!(
                    "Sent \"{}\" to {}",
                    email.subject,
                    email.recipients.join(", ")
                );
                true
            }
            Err(e) => {
                warn!("Failed to send \"{}\": {}", email.subject, e);
                false
            }
        }
    }

    /// Send every identified author their digest. Returns how many went out.
    pub async fn send_author_digests(&self, report: &DeadBranchReport) -> usize {
        let mut sent = 0;
        for (email, author) in &report.authors {
            if email == UNIDENTIFIED_EMAIL {
                warn!(
                    "Not sending digest for {} branches of unidentified authors",
                    author.branch_count()
                );
                continue;
            }
            if self
                .dispatch(&author_digest(email, author, &report.projects))
                .await
            {
                sent += 1;
            }
        }
        sent
    }
}
