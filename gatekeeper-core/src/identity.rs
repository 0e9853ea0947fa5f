//! Resolving raw commit identities to organisational accounts.
//!
//! Commit metadata is whatever the developer's git config said at the time, so
//! the email may be stale, personal or malformed. [`IdentityResolver`] walks a
//! fixed chain of directory lookups from most to least precise and always ends
//! with an answer, falling back to a sentinel identity that no mail is sent to.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Address given to authors the directory does not know.
pub const UNIDENTIFIED_EMAIL: &str = "unidentified@any.local";
/// Display name given to authors the directory does not know.
pub const UNIDENTIFIED_NAME: &str = "Unidentified";

/// Organisation directory (LDAP / Active Directory).
#[async_trait]
pub trait Directory: Send + Sync {
    /// Mail addresses of active accounts whose mail equals `email`.
    async fn lookup_by_mail(&self, email: &str) -> Result<Vec<String>, ClientError>;

    /// Mail addresses of active accounts with any of the given usernames.
    async fn lookup_by_usernames(&self, usernames: &[String]) -> Result<Vec<String>, ClientError>;
}

/// Which step of the chain produced an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ResolutionStage {
    /// The commit email is a directory mail address.
    ExactMail = 1,
    /// The part of the commit email before `@` is a directory username.
    UsernameFromEmail = 2,
    /// The commit author name is a directory username.
    UsernameFromName = 3,
    /// Nothing matched.
    Unidentified = 4,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorIdentity {
    pub email: String,
    pub display_name: String,
    pub stage: ResolutionStage,
}

impl AuthorIdentity {
    pub fn unidentified() -> Self {
        Self {
            email: UNIDENTIFIED_EMAIL.to_string(),
            display_name: UNIDENTIFIED_NAME.to_string(),
            stage: ResolutionStage::Unidentified,
        }
    }

    pub fn is_unidentified(&self) -> bool {
        self.stage == ResolutionStage::Unidentified
    }
}

pub struct IdentityResolver<'a> {
    directory: &'a dyn Directory,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(directory: &'a dyn Directory) -> Self {
        Self { directory }
    }

    /// Resolve a commit author. Never fails; see [`ResolutionStage`] for the order.
    pub async fn resolve(&self, raw_name: &str, raw_email: &str) -> AuthorIdentity {
        let raw_name = raw_name.trim();
        let raw_email = raw_email.trim();
        let found = |email: String, stage| AuthorIdentity {
            email,
            display_name: raw_name.to_string(),
            stage,
        };

        if !raw_email.is_empty() {
            if !self.by_mail(raw_email).await.is_empty() {
                return found(raw_email.to_string(), ResolutionStage::ExactMail);
            }

            let local_part = raw_email.split('@').next().unwrap_or(raw_email);
            if let Some(mail) = self.first_by_username(local_part).await {
                return found(mail, ResolutionStage::UsernameFromEmail);
            }
        }

        if !raw_name.is_empty() {
            if let Some(mail) = self.first_by_username(raw_name).await {
                return found(mail, ResolutionStage::UsernameFromName);
            }
        }

        warn!("Unidentified author: {} - {}", raw_name, raw_email);
        AuthorIdentity::unidentified()
    }

    /// Directory mail of a forge account, if it has one.
    pub async fn mail_of_account(&self, username: &str) -> Option<String> {
        self.first_by_username(username.trim()).await
    }

    /// Directory mails of several forge accounts. Unknown accounts are dropped.
    pub async fn mails_of_accounts(&self, usernames: &[String]) -> Vec<String> {
        if usernames.is_empty() {
            return Vec::new();
        }
        match self.directory.lookup_by_usernames(usernames).await {
            Ok(mails) => mails,
            Err(e) => {
                warn!("Directory lookup for {} accounts failed: {}", usernames.len(), e);
                Vec::new()
            }
        }
    }

    async fn by_mail(&self, email: &str) -> Vec<String> {
        match self.directory.lookup_by_mail(email).await {
            Ok(mails) => mails,
            Err(e) => {
                warn!("Directory lookup by mail {} failed: {}", email, e);
                Vec::new()
            }
        }
    }

    async fn first_by_username(&self, username: &str) -> Option<String> {
        if username.is_empty() {
            return None;
        }
        let usernames = [username.to_string()];
        match self.directory.lookup_by_usernames(&usernames).await {
            Ok(mails) => mails.into_iter().find(|m| !m.trim().is_empty()),
            Err(e) => {
                warn!("Directory lookup by username {} failed: {}", username, e);
                None
            }
        }
    }
}

/// Run-scoped memo of resolved identities, keyed by raw commit email.
///
/// Each distinct raw email is resolved at most once per run. Nothing survives
/// the run; the next invocation starts with an empty cache.
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: HashMap<(String, String), AuthorIdentity>,
}

/// Entries are keyed by email alone, except when the email is empty and the
/// outcome depends on the name.
fn cache_key(raw_name: &str, raw_email: &str) -> (String, String) {
    let email = raw_email.trim();
    if email.is_empty() {
        (raw_name.trim().to_string(), String::new())
    } else {
        (String::new(), email.to_string())
    }
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(
        &mut self,
        resolver: &IdentityResolver<'_>,
        raw_name: &str,
        raw_email: &str,
    ) -> AuthorIdentity {
        let key = cache_key(raw_name, raw_email);
        if let Some(identity) = self.entries.get(&key) {
            return identity.clone();
        }
        let identity = resolver.resolve(raw_name, raw_email).await;
        debug!(
            "Resolved {} to {} (stage {:?})",
            raw_email, identity.email, identity.stage
        );
        self.entries.insert(key, identity.clone());
        identity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDirectory;

    #[tokio::test]
    async fn test_exact_mail_wins() {
        let directory = FakeDirectory::new()
            .with_mail("jane.doe@example.com")
            .with_user("jane", "other@example.com");
        let resolver = IdentityResolver::new(&directory);

        let identity = resolver.resolve("Jane Doe", "jane.doe@example.com").await;

        assert_eq!(identity.email, "jane.doe@example.com");
        assert_eq!(identity.display_name, "Jane Doe");
        assert_eq!(identity.stage, ResolutionStage::ExactMail);
    }

    #[tokio::test]
    async fn test_local_part_used_as_username() {
        let directory = FakeDirectory::new().with_user("jdoe", "jane.doe@example.com");
        let resolver = IdentityResolver::new(&directory);

        let identity = resolver.resolve("Jane Doe", "jdoe@laptop.local").await;

        assert_eq!(identity.email, "jane.doe@example.com");
        assert_eq!(identity.stage, ResolutionStage::UsernameFromEmail);
    }

    #[tokio::test]
    async fn test_name_used_as_username() {
        let directory = FakeDirectory::new().with_user("jdoe", "jane.doe@example.com");
        let resolver = IdentityResolver::new(&directory);

        let identity = resolver.resolve("jdoe", "someone@home.example").await;

        assert_eq!(identity.email, "jane.doe@example.com");
        assert_eq!(identity.display_name, "jdoe");
        assert_eq!(identity.stage, ResolutionStage::UsernameFromName);
    }

    #[tokio::test]
    async fn test_nothing_matches_yields_sentinel() {
        let directory = FakeDirectory::new();
        let resolver = IdentityResolver::new(&directory);

        let identity = resolver.resolve("Ghost", "ghost@nowhere").await;

        assert_eq!(identity.email, UNIDENTIFIED_EMAIL);
        assert_eq!(identity.display_name, UNIDENTIFIED_NAME);
        assert_eq!(identity.stage, ResolutionStage::Unidentified);
        assert!(identity.is_unidentified());
    }

    #[tokio::test]
    async fn test_directory_errors_advance_the_chain() {
        let directory = FakeDirectory::new()
            .with_user("jdoe", "jane.doe@example.com")
            .failing_mail_lookups();
        let resolver = IdentityResolver::new(&directory);

        let identity = resolver.resolve("Jane", "jdoe@example.com").await;

        assert_eq!(identity.stage, ResolutionStage::UsernameFromEmail);
    }

    #[tokio::test]
    async fn test_empty_email_skips_mail_stages() {
        let directory = FakeDirectory::new().with_user("jdoe", "jane.doe@example.com");
        let resolver = IdentityResolver::new(&directory);

        let identity = resolver.resolve("jdoe", "").await;

        assert_eq!(identity.stage, ResolutionStage::UsernameFromName);
        assert_eq!(directory.mail_lookups(), 0);
    }

    #[tokio::test]
    async fn test_cache_resolves_each_email_once() {
        let directory = FakeDirectory::new().with_mail("a@example.com");
        let resolver = IdentityResolver::new(&directory);
        let mut cache = IdentityCache::new();

        let first = cache.resolve(&resolver, "A", "a@example.com").await;
        let second = cache.resolve(&resolver, "A. Person", "a@example.com").await;

        assert_eq!(first, second);
        assert_eq!(directory.mail_lookups(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_keeps_authors_without_email_apart() {
        let directory = FakeDirectory::new()
            .with_user("jdoe", "jane@example.com")
            .with_user("rroe", "rick@example.com");
        let resolver = IdentityResolver::new(&directory);
        let mut cache = IdentityCache::new();

        let jane = cache.resolve(&resolver, "jdoe", "").await;
        let rick = cache.resolve(&resolver, "rroe", " ").await;
        let jane_again = cache.resolve(&resolver, "jdoe", "").await;

        assert_eq!(jane.email, "jane@example.com");
        assert_eq!(rick.email, "rick@example.com");
        assert_eq!(jane_again, jane);
        assert_eq!(cache.len(), 2);
    }
}
