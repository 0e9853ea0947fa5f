//! Turning raw award signals into a compliance verdict.
//!
//! The evaluation is a pure function of the award multiset: it does not
//! depend on the order the forge returns awards in, and it performs no I/O.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::forge::{Award, MergeRequestInfo};
use crate::marker::{MarkerCatalog, MarkerKind, Signal};
use crate::policy::{Policy, ProjectPolicy};

/// Reviewer consensus on a merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Verdict {
    /// Every team reached the consensus threshold.
    pub liked: bool,
    /// At least one reviewer other than the author objected.
    pub disliked: bool,
}

/// Award ids of the bot's own markers. `0` means the marker is not placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ExistingMarkers {
    pub ready: u64,
    pub not_ready: u64,
    pub non_compliant: u64,
}

impl ExistingMarkers {
    pub fn get(&self, kind: MarkerKind) -> u64 {
        match kind {
            MarkerKind::Ready => self.ready,
            MarkerKind::NotReady => self.not_ready,
            MarkerKind::NonCompliant => self.non_compliant,
        }
    }

    pub fn set(&mut self, kind: MarkerKind, award_id: u64) {
        match kind {
            MarkerKind::Ready => self.ready = award_id,
            MarkerKind::NotReady => self.not_ready = award_id,
            MarkerKind::NonCompliant => self.non_compliant = award_id,
        }
    }

    /// Record a marker found on the forge. If the bot somehow placed the same
    /// marker twice, the oldest (lowest) id is kept so the result is stable.
    fn record(&mut self, kind: MarkerKind, award_id: u64) {
        let current = self.get(kind);
        if current == 0 || award_id < current {
            self.set(kind, award_id);
        }
    }
}

/// A merge request with its verdict and current marker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeRequest {
    pub iid: u64,
    pub target_branch: String,
    pub author: String,
    pub merged_by: Option<String>,
    pub web_url: String,
    pub markers: ExistingMarkers,
    pub verdict: Verdict,
}

/// Result of evaluating the awards on one merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub markers: ExistingMarkers,
}

/// Evaluates awards against one project's teams.
pub struct ConsensusEvaluator<'a> {
    project: &'a ProjectPolicy,
    markers: &'a MarkerCatalog,
    service_user: &'a str,
}

impl<'a> ConsensusEvaluator<'a> {
    pub fn new(policy: &'a Policy, project: &'a ProjectPolicy) -> Self {
        Self {
            project,
            markers: policy.markers(),
            service_user: policy.service_user(),
        }
    }

    /// Compute the verdict and the bot's existing markers.
    ///
    /// Awards placed by `author` never count. Awards placed by the service
    /// account are never verdict signals; they only reveal which markers are
    /// already in place.
    pub fn evaluate(&self, author: &str, awards: &[Award]) -> Evaluation {
        let threshold = self.project.threshold();
        let author = author.to_lowercase();

        let mut approvers: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        let mut evaluation = Evaluation::default();

        for award in awards {
            let Some(signal) = self.markers.classify(&award.name) else {
                continue;
            };
            let reactor = award.user.to_lowercase();

            if reactor == self.service_user {
                if let Signal::Marker(kind) = signal {
                    evaluation.markers.record(kind, award.id);
                }
                continue;
            }
            if reactor == author {
                continue;
            }

            match signal {
                Signal::Like => {
                    for team in self.project.teams_of(&reactor) {
                        let team_approvers = approvers.entry(team).or_default();
                        if team_approvers.len() < threshold {
                            team_approvers.insert(reactor.clone());
                        }
                    }
                }
                Signal::Dislike => evaluation.verdict.disliked = true,
                Signal::Marker(_) => {}
            }
        }

        evaluation.verdict.liked = self.project.teams.keys().all(|team| {
            approvers
                .get(team.as_str())
                .map_or(0, |members| members.len())
                >= threshold
        });

        evaluation
    }

    /// Evaluate a listed merge request into the form the reconciler consumes.
    pub fn assess(&self, info: MergeRequestInfo, awards: &[Award]) -> MergeRequest {
        let Evaluation { verdict, markers } = self.evaluate(&info.author, awards);
        MergeRequest {
            iid: info.iid,
            target_branch: info.target_branch,
            author: info.author,
            merged_by: info.merged_by,
            web_url: info.web_url,
            markers,
            verdict,
        }
    }
}
