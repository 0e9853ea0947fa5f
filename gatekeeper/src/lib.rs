pub mod config;
pub mod gitlab;
pub mod ldap;
pub mod recording;
pub mod smtp;

pub use gitlab::GitLabClient;
pub use ldap::LdapDirectory;
pub use recording::RecordingLogger;
pub use smtp::SmtpMailer;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(8).collect()
}

pub fn get_bot_version() -> String {
    if let Some(git_hash) = option_env!("GATEKEEPER_GIT_HASH") {
        short_hash(git_hash)
    } else if let Some(git_hash) = built_info::GIT_COMMIT_HASH {
        short_hash(git_hash)
    } else {
        format!("v{}", built_info::PKG_VERSION)
    }
}
