use std::time::Duration;

use async_trait::async_trait;
use gatekeeper_core::{ClientError, Directory};
use ldap3::{ldap_escape, Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::LdapConfig;

/// Matches enabled user accounts only (bit 2 of userAccountControl is "disabled").
const ACTIVE_PERSON: &str =
    "(objectClass=user)(objectCategory=person)(!(userAccountControl:1.2.840.113556.1.4.803:=2))";

const MAIL_ATTRIBUTE: &str = "mail";

/// Active Directory lookups over LDAP.
///
/// The connection is opened and bound on first use and reused for the rest of
/// the run. A failed search drops it so the next lookup reconnects.
pub struct LdapDirectory {
    config: LdapConfig,
    timeout: Duration,
    connection: Mutex<Option<Ldap>>,
}

impl LdapDirectory {
    pub fn new(config: LdapConfig, timeout: Duration) -> Self {
        Self {
            config,
            timeout,
            connection: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<Ldap, LdapError> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.config.url).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection error: {}", e);
            }
        });
        ldap.simple_bind(&self.config.bind_dn(), &self.config.password)
            .await?
            .success()?;
        info!("Bound to directory {} as {}", self.config.url, self.config.bind_dn());
        Ok(ldap)
    }

    async fn search_mails(&self, filter: &str) -> Result<Vec<String>, ClientError> {
        let mut connection = self.connection.lock().await;
        if connection.is_none() {
            *connection = Some(self.connect().await.map_err(to_client_error)?);
        }
        let Some(ldap) = connection.as_mut() else {
            return Err(ClientError::connection("directory connection unavailable"));
        };

        let result = ldap
            .with_timeout(self.timeout)
            .search(&self.config.base, Scope::Subtree, filter, vec![MAIL_ATTRIBUTE])
            .await
            .and_then(|result| result.success());
        let (entries, _) = match result {
            Ok(found) => found,
            Err(e) => {
                *connection = None;
                return Err(to_client_error(e));
            }
        };

        let mails: Vec<String> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .filter_map(|entry| {
                entry
                    .attrs
                    .get(MAIL_ATTRIBUTE)
                    .and_then(|values| values.first().cloned())
            })
            .filter(|mail| !mail.trim().is_empty())
            .collect();
        debug!("Directory search {} returned {} mails", filter, mails.len());
        Ok(mails)
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn lookup_by_mail(&self, email: &str) -> Result<Vec<String>, ClientError> {
        self.search_mails(&active_person_filter("mail", &[email]))
            .await
    }

    async fn lookup_by_usernames(&self, usernames: &[String]) -> Result<Vec<String>, ClientError> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }
        let usernames: Vec<&str> = usernames.iter().map(String::as_str).collect();
        self.search_mails(&active_person_filter("sAMAccountName", &usernames))
            .await
    }
}

/// Filter for active persons whose `attribute` equals any of `values`.
pub fn active_person_filter(attribute: &str, values: &[&str]) -> String {
    let alternatives: String = values
        .iter()
        .map(|value| format!("({}={})", attribute, ldap_escape(*value)))
        .collect();
    format!("(&{}(|{}))", ACTIVE_PERSON, alternatives)
}

fn to_client_error(e: LdapError) -> ClientError {
    match e {
        LdapError::LdapResult { result } => ClientError::Rejected {
            status: result.rc as u16,
            message: result.text,
        },
        other => ClientError::connection(other.to_string()),
    }
}
