//! Finding unprotected branches nobody has committed to in a week.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::forge::SourceForge;
use crate::identity::{IdentityCache, IdentityResolver};
use crate::metadata::ProjectMetadataCache;
use crate::policy::Policy;
use crate::report::{DeadBranchReport, ProjectReport};

/// A branch is dead once its head commit is this old.
pub const STALE_AFTER_HOURS: i64 = 7 * 24;

/// Whole days since `authored`, or `None` if the branch is not yet stale.
pub fn dead_branch_age(now: DateTime<Utc>, authored: DateTime<Utc>) -> Option<i64> {
    let hours = (now - authored).num_hours();
    (hours >= STALE_AFTER_HOURS).then_some(hours / 24)
}

pub struct DeadBranchDetector<'a> {
    forge: &'a dyn SourceForge,
    policy: &'a Policy,
    resolver: IdentityResolver<'a>,
}

impl<'a> DeadBranchDetector<'a> {
    pub fn new(
        forge: &'a dyn SourceForge,
        policy: &'a Policy,
        resolver: IdentityResolver<'a>,
    ) -> Self {
        Self {
            forge,
            policy,
            resolver,
        }
    }

    /// Walk every governed project and collect its dead branches.
    pub async fn detect(
        &self,
        now: DateTime<Utc>,
        identities: &mut IdentityCache,
        metadata: &mut ProjectMetadataCache,
    ) -> DeadBranchReport {
        let mut report = DeadBranchReport::default();

        for (&project_id, project) in self.policy.projects() {
            info!("Looking for dead branches in project {}", project_id);
            let mut page = 1;
            loop {
                let listing = match self.forge.list_branches(project_id, page).await {
                    Ok(listing) => listing,
                    Err(e) => {
                        error!(
                            "Failed to list branches of project {} (page {}): {}",
                            project_id, page, e
                        );
                        break;
                    }
                };

                for branch in listing.branches {
                    if branch.protected {
                        continue;
                    }
                    let Some(age_days) = dead_branch_age(now, branch.commit.authored_date) else {
                        continue;
                    };

                    if !report.has_project(project_id) {
                        let info = metadata.get(self.forge, project_id).await;
                        report.insert_project(
                            project_id,
                            ProjectReport {
                                name: info.name,
                                url: info.web_url,
                                owners: project.owners(),
                                branches: Default::default(),
                            },
                        );
                    }

                    let author = identities
                        .resolve(
                            &self.resolver,
                            &branch.commit.author_name,
                            &branch.commit.author_email,
                        )
                        .await;
                    report.add_branch(
                        project_id,
                        &branch.name,
                        &branch.commit.author_name,
                        &author,
                        age_days,
                    );
                }

                match listing.next_page {
                    Some(next) if next > page => page = next,
                    Some(next) => {
                        warn!(
                            "Project {} reported next page {} after page {}, stopping",
                            project_id, next, page
                        );
                        break;
                    }
                    None => break,
                }
            }
        }

        info!(
            "Found {} dead branches by {} authors",
            report.branch_count(),
            report.authors.len()
        );
        report
    }
}
