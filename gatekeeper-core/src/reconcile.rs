//! Marker reconciliation: from a verdict to the minimal set of award changes.
//!
//! The reconciler is a pure state machine. For each marker it derives the
//! desired state from the verdict, compares it with what is already on the
//! merge request, and emits an action only where the two differ. Feeding the
//! post-action marker state back in yields no actions at all.

use serde::Serialize;

use crate::consensus::{ExistingMarkers, MergeRequest, Verdict};
use crate::forge::MrListState;
use crate::marker::MarkerKind;

/// Whether a marker should be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Desired {
    Present,
    Absent,
}

/// Operation on a single marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MarkerOp {
    Apply,
    Remove { award_id: u64 },
}

/// Details captured when a merged merge request is flagged non-compliant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeDetails {
    pub merged_by: Option<String>,
    pub web_url: String,
}

/// A single change to apply on the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub project_id: u64,
    pub mr_iid: u64,
    pub kind: MarkerKind,
    #[serde(flatten)]
    pub op: MarkerOp,
    /// Present only when applying [`MarkerKind::NonCompliant`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeDetails>,
}

/// Desired marker state for an open merge request.
///
/// Ready and NotReady mirror each other; NonCompliant never belongs on an
/// open merge request.
pub fn desired_open(verdict: Verdict, kind: MarkerKind) -> Desired {
    let ready = verdict.liked && !verdict.disliked;
    match (kind, ready) {
        (MarkerKind::Ready, true) | (MarkerKind::NotReady, false) => Desired::Present,
        (MarkerKind::Ready, false) | (MarkerKind::NotReady, true) => Desired::Absent,
        (MarkerKind::NonCompliant, _) => Desired::Absent,
    }
}

/// Desired marker state for a merged merge request.
///
/// A merge is non-compliant when it was disliked *or* not liked by every team.
/// Ready and NotReady are cleared once a merge request is merged.
pub fn desired_merged(verdict: Verdict, kind: MarkerKind) -> Desired {
    match kind {
        MarkerKind::NonCompliant if verdict.disliked || !verdict.liked => Desired::Present,
        _ => Desired::Absent,
    }
}

/// Compute the actions that bring `mr`'s markers to the state its verdict requires.
///
/// Actions come out in [`MarkerKind::ALL`] order and are independent of one another.
pub fn reconcile(project_id: u64, state: MrListState, mr: &MergeRequest) -> Vec<Action> {
    MarkerKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let desired = match state {
                MrListState::Opened => desired_open(mr.verdict, kind),
                MrListState::Merged => desired_merged(mr.verdict, kind),
            };
            let op = step(desired, mr.markers.get(kind))?;
            let merge = match (op, kind) {
                (MarkerOp::Apply, MarkerKind::NonCompliant) => Some(MergeDetails {
                    merged_by: mr.merged_by.clone(),
                    web_url: mr.web_url.clone(),
                }),
                _ => None,
            };
            Some(Action {
                project_id,
                mr_iid: mr.iid,
                kind,
                op,
                merge,
            })
        })
        .collect()
}

fn step(desired: Desired, existing_id: u64) -> Option<MarkerOp> {
    match (desired, existing_id) {
        (Desired::Present, 0) => Some(MarkerOp::Apply),
        (Desired::Absent, id) if id != 0 => Some(MarkerOp::Remove { award_id: id }),
        _ => None,
    }
}

impl ExistingMarkers {
    /// Marker state after `actions` succeed. Applied markers get `new_id`.
    pub fn after(mut self, actions: &[Action], new_id: u64) -> Self {
        for action in actions {
            match action.op {
                MarkerOp::Apply => self.set(action.kind, new_id),
                MarkerOp::Remove { .. } => self.set(action.kind, 0),
            }
        }
        self
    }
}
