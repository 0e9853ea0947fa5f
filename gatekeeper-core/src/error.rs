//! Error types shared by the policy loader and the collaborator clients.

use std::path::PathBuf;

use thiserror::Error;

/// A policy file that cannot be used. Every variant is fatal: the bot must
/// not touch any merge request without a valid policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("award name for `{0}` is empty")]
    EmptyMarkerName(&'static str),

    #[error("award name `{name}` is configured for both `{first}` and `{second}`")]
    DuplicateMarkerName {
        name: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("service user is not configured")]
    MissingServiceUser,

    #[error("policy does not list any projects")]
    NoProjects,

    #[error("project {0} is listed more than once")]
    DuplicateProject(u64),

    #[error("project {0} has no teams")]
    NoTeams(u64),

    #[error("team `{team}` of project {project} has no members")]
    EmptyTeam { project: u64, team: String },
}

/// Failure of an external collaborator (forge, directory or mail relay).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The service could not be reached or the exchange broke off.
    #[error("connection error: {0}")]
    Connection(String),

    /// The requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The service answered but refused the request.
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl ClientError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}
