use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone)]
pub struct GitLabConfig {
    pub url: String,
    /// Username of the bot account. Its awards are markers, never reviews.
    pub user: String,
    pub token: String,
}

#[derive(Clone)]
pub struct LdapConfig {
    pub url: String,
    pub bind_user: String,
    pub domain: String,
    pub password: String,
    pub base: String,
}

impl LdapConfig {
    /// Active Directory accepts `user@domain` as a bind name.
    pub fn bind_dn(&self) -> String {
        format!("{}@{}", self.bind_user, self.domain)
    }
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Clone)]
pub struct Config {
    pub gitlab: GitLabConfig,
    pub ldap: LdapConfig,
    pub smtp: SmtpConfig,
    pub policy_path: PathBuf,
    pub http_timeout: Duration,
    pub recording_enabled: bool,
    pub recording_log_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(&env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let required = |name: &str| -> Result<String> {
            vars.get(name)
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .with_context(|| format!("{} environment variable is required", name))
        };
        let optional = |name: &str| parse_optional(vars.get(name).cloned());

        let gitlab = GitLabConfig {
            url: required("GITLAB_URL")?.trim_end_matches('/').to_string(),
            user: required("GITLAB_USER")?,
            token: required("GITLAB_TOKEN")?,
        };

        let ldap = LdapConfig {
            url: required("LDAP_URL")?,
            bind_user: required("LDAP_BIND_USER")?,
            domain: required("LDAP_DOMAIN")?,
            password: required("LDAP_PASSWORD")?,
            base: required("LDAP_BASE")?,
        };

        let smtp = SmtpConfig {
            host: required("SMTP_HOST")?,
            port: optional("SMTP_PORT")
                .unwrap_or_else(|| "587".to_string())
                .parse::<u16>()
                .context("SMTP_PORT must be a valid port number")?,
            user: optional("SMTP_USER"),
            password: optional("SMTP_PASSWORD"),
            from: required("SMTP_FROM")?,
        };

        let policy_path = optional("POLICY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("policy.yaml"));

        let http_timeout = optional("HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse::<u64>()
            .map(Duration::from_secs)
            .context("HTTP_TIMEOUT_SECS must be a whole number of seconds")?;

        let recording_enabled = optional("RECORDING_ENABLED")
            .unwrap_or_else(|| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let recording_log_path =
            optional("RECORDING_LOG_PATH").unwrap_or_else(|| "recordings.jsonl".to_string());

        Ok(Config {
            gitlab,
            ldap,
            smtp,
            policy_path,
            http_timeout,
            recording_enabled,
            recording_log_path,
        })
    }
}

/// Treat a missing, empty or whitespace-only value as unset.
pub fn parse_optional(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
