//! Walking governed projects to find merge requests whose markers are out of date.

use tracing::{debug, error, info};

use crate::consensus::ConsensusEvaluator;
use crate::error::ClientError;
use crate::forge::{MrListState, SourceForge};
use crate::policy::{Policy, ProjectPolicy};
use crate::reconcile::{reconcile, Action};

/// States audited for each project, in order.
pub const AUDITED_STATES: [MrListState; 2] = [MrListState::Opened, MrListState::Merged];

pub struct MergeRequestAudit<'a> {
    forge: &'a dyn SourceForge,
    policy: &'a Policy,
}

impl<'a> MergeRequestAudit<'a> {
    pub fn new(forge: &'a dyn SourceForge, policy: &'a Policy) -> Self {
        Self { forge, policy }
    }

    /// Actions for every governed project, in ascending project id order.
    ///
    /// A project the forge cannot describe is logged and skipped; the others
    /// are still audited.
    pub async fn run(&self) -> Vec<Action> {
        let mut actions = Vec::new();
        for (&project_id, project) in self.policy.projects() {
            match self.audit_project(project_id, project).await {
                Ok(found) => {
                    info!("Project {}: {} actions", project_id, found.len());
                    actions.extend(found);
                }
                Err(e) => error!("Skipping project {}: {}", project_id, e),
            }
        }
        actions
    }

    async fn audit_project(
        &self,
        project_id: u64,
        project: &ProjectPolicy,
    ) -> Result<Vec<Action>, ClientError> {
        let evaluator = ConsensusEvaluator::new(self.policy, project);
        let protected = self.forge.list_protected_branches(project_id).await?;

        let mut actions = Vec::new();
        for state in AUDITED_STATES {
            let merge_requests = self.forge.list_merge_requests(project_id, state).await?;
            for info in merge_requests {
                if state == MrListState::Opened && info.draft {
                    debug!("Skipping draft {}@{}", info.iid, project_id);
                    continue;
                }
                if !protected.contains(&info.target_branch) {
                    debug!(
                        "Skipping {}@{}: target {} is not protected",
                        info.iid, project_id, info.target_branch
                    );
                    continue;
                }

                let awards = match self.forge.list_awards(project_id, info.iid).await {
                    Ok(awards) => awards,
                    Err(e) => {
                        error!(
                            "Failed to list awards of {}@{}: {}",
                            info.iid, project_id, e
                        );
                        continue;
                    }
                };

                let mr = evaluator.assess(info, &awards);
                debug!(
                    "{}@{} ({}): liked={} disliked={}",
                    mr.iid,
                    project_id,
                    state.as_str(),
                    mr.verdict.liked,
                    mr.verdict.disliked
                );
                actions.extend(reconcile(project_id, state, &mr));
            }
        }
        Ok(actions)
    }
}
