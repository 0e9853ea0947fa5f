//! Applying reconciliation actions to the forge.
//!
//! Actions are executed one at a time in the order given. A failed action is
//! logged and counted but never stops the batch; notifications belonging to
//! a failed action are not sent.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::ClientError;
use crate::forge::SourceForge;
use crate::identity::IdentityResolver;
use crate::marker::MarkerKind;
use crate::metadata::ProjectMetadataCache;
use crate::notify::{
    owners_notice, reviewers_note, violation_notice, MergeLink, NotificationDispatcher,
};
use crate::policy::Policy;
use crate::reconcile::{Action, MarkerOp, MergeDetails};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub applied: usize,
    pub removed: usize,
    pub failed: usize,
}

pub struct ActionExecutor<'a> {
    forge: &'a dyn SourceForge,
    policy: &'a Policy,
    resolver: IdentityResolver<'a>,
    notifier: NotificationDispatcher<'a>,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(
        forge: &'a dyn SourceForge,
        policy: &'a Policy,
        resolver: IdentityResolver<'a>,
        notifier: NotificationDispatcher<'a>,
    ) -> Self {
        Self {
            forge,
            policy,
            resolver,
            notifier,
        }
    }

    pub async fn execute(
        &self,
        actions: &[Action],
        metadata: &mut ProjectMetadataCache,
    ) -> ExecutionSummary {
        let mut summary = ExecutionSummary::default();

        for action in actions {
            if let Err(e) = self.apply_marker(action).await {
                error!(
                    "Failed to {} {} marker on {}@{}: {}",
                    op_verb(action.op),
                    action.kind,
                    action.mr_iid,
                    action.project_id,
                    e
                );
                summary.failed += 1;
                continue;
            }

            match action.op {
                MarkerOp::Apply => {
                    summary.applied += 1;
                    match action.kind {
                        MarkerKind::NotReady => self.notify_reviewers(action).await,
                        MarkerKind::NonCompliant => {
                            if let Some(merge) = &action.merge {
                                self.notify_violation(action, merge, metadata).await;
                            } else {
                                warn!(
                                    "Non-compliant marker on {}@{} carries no merge details",
                                    action.mr_iid, action.project_id
                                );
                            }
                        }
                        MarkerKind::Ready => {}
                    }
                }
                MarkerOp::Remove { .. } => summary.removed += 1,
            }
        }

        info!(
            "Executed {} actions: {} applied, {} removed, {} failed",
            actions.len(),
            summary.applied,
            summary.removed,
            summary.failed
        );
        summary
    }

    async fn apply_marker(&self, action: &Action) -> Result<(), ClientError> {
        match action.op {
            MarkerOp::Apply => {
                let name = self.policy.markers().name_of(action.kind);
                let award_id = self
                    .forge
                    .create_award(action.project_id, action.mr_iid, name)
                    .await?;
                info!(
                    "Applied {} marker to {}@{} (award {})",
                    action.kind, action.mr_iid, action.project_id, award_id
                );
            }
            MarkerOp::Remove { award_id } => {
                self.forge
                    .delete_award(action.project_id, action.mr_iid, award_id)
                    .await?;
                info!(
                    "Removed {} marker from {}@{} (award {})",
                    action.kind, action.mr_iid, action.project_id, award_id
                );
            }
        }
        Ok(())
    }

    async fn notify_reviewers(&self, action: &Action) {
        let Some(project) = self.policy.project(action.project_id) else {
            warn!("Project {} is not governed, no reviewers to notify", action.project_id);
            return;
        };
        let note = reviewers_note(project);
        if let Err(e) = self
            .forge
            .create_note(action.project_id, action.mr_iid, &note)
            .await
        {
            error!(
                "Failed to post notification message for {}@{}: {}",
                action.mr_iid, action.project_id, e
            );
        }
    }

    async fn notify_violation(
        &self,
        action: &Action,
        merge: &MergeDetails,
        metadata: &mut ProjectMetadataCache,
    ) {
        warn!(
            "Non-compliant MR detected: {}@{}",
            action.mr_iid, action.project_id
        );
        let project = metadata.get(self.forge, action.project_id).await;
        let link = MergeLink {
            iid: action.mr_iid,
            web_url: &merge.web_url,
            project: &project,
        };

        let merger = match &merge.merged_by {
            Some(username) => self.resolver.mail_of_account(username).await,
            None => None,
        };
        self.notifier
            .dispatch(&violation_notice(merger.into_iter().collect(), link))
            .await;

        let owners: Vec<String> = self
            .policy
            .project(action.project_id)
            .map(|p| p.owners().into_iter().collect())
            .unwrap_or_default();
        let owner_mails = self.resolver.mails_of_accounts(&owners).await;
        self.notifier
            .dispatch(&owners_notice(owner_mails, link))
            .await;
    }
}

fn op_verb(op: MarkerOp) -> &'static str {
    match op {
        MarkerOp::Apply => "apply",
        MarkerOp::Remove { .. } => "remove",
    }
}
