pub mod audit;
pub mod consensus;
pub mod dead_branch;
pub mod error;
pub mod executor;
pub mod forge;
pub mod identity;
pub mod marker;
pub mod metadata;
pub mod notify;
pub mod policy;
pub mod reconcile;
pub mod report;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::MergeRequestAudit;
pub use consensus::{ConsensusEvaluator, ExistingMarkers, MergeRequest, Verdict};
pub use dead_branch::DeadBranchDetector;
pub use error::{ClientError, PolicyError};
pub use executor::{ActionExecutor, ExecutionSummary};
pub use forge::*;
pub use identity::{
    AuthorIdentity, Directory, IdentityCache, IdentityResolver, ResolutionStage,
};
pub use marker::{MarkerCatalog, MarkerKind, Signal};
pub use metadata::ProjectMetadataCache;
pub use notify::{Email, Mailer, NotificationDispatcher};
pub use policy::{Policy, ProjectPolicy};
pub use reconcile::{reconcile, Action, MarkerOp};
pub use report::DeadBranchReport;
