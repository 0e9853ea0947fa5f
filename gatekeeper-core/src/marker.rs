//! Award kinds and the mapping from configured award names to them.
//!
//! The forge only knows award emoji by name. The bot cares about five of them:
//! two reviewer signals (like, dislike) and three status markers that only the
//! bot itself places. [`MarkerCatalog`] is built once from the policy file and
//! rejects ambiguous configurations before any merge request is touched.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Status markers the bot places on merge requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarkerKind {
    Ready,
    NotReady,
    NonCompliant,
}

impl MarkerKind {
    pub const ALL: [MarkerKind; 3] = [Self::Ready, Self::NotReady, Self::NonCompliant];
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::NotReady => write!(f, "not-ready"),
            Self::NonCompliant => write!(f, "non-compliant"),
        }
    }
}

/// What an award means to the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Like,
    Dislike,
    Marker(MarkerKind),
}

/// Award names as written in the policy file.
///
/// Unknown keys are rejected by serde, so a typo such as `not-ready` fails at
/// load time instead of silently disabling a marker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkerNames {
    pub ready: String,
    pub not_ready: String,
    pub non_compliant: String,
    pub like: String,
    pub dislike: String,
}

/// Validated two-way mapping between award names and [`Signal`]s.
#[derive(Debug, Clone)]
pub struct MarkerCatalog {
    names: MarkerNames,
    by_name: HashMap<String, Signal>,
}

impl MarkerCatalog {
    pub fn new(names: MarkerNames) -> Result<Self, PolicyError> {
        let entries: [(&'static str, &str, Signal); 5] = [
            ("ready", &names.ready, Signal::Marker(MarkerKind::Ready)),
            ("not_ready", &names.not_ready, Signal::Marker(MarkerKind::NotReady)),
            (
                "non_compliant",
                &names.non_compliant,
                Signal::Marker(MarkerKind::NonCompliant),
            ),
            ("like", &names.like, Signal::Like),
            ("dislike", &names.dislike, Signal::Dislike),
        ];

        let mut by_name = HashMap::new();
        let mut owners: HashMap<String, &'static str> = HashMap::new();
        for (key, name, signal) in entries {
            let name = name.trim();
            if name.is_empty() {
                return Err(PolicyError::EmptyMarkerName(key));
            }
            if let Some(first) = owners.insert(name.to_string(), key) {
                return Err(PolicyError::DuplicateMarkerName {
                    name: name.to_string(),
                    first,
                    second: key,
                });
            }
            by_name.insert(name.to_string(), signal);
        }

        Ok(Self { names, by_name })
    }

    /// Classify an award by name. Awards the policy does not mention return `None`.
    pub fn classify(&self, award_name: &str) -> Option<Signal> {
        self.by_name.get(award_name).copied()
    }

    /// Award name used to place a marker.
    pub fn name_of(&self, kind: MarkerKind) -> &str {
        match kind {
            MarkerKind::Ready => self.names.ready.trim(),
            MarkerKind::NotReady => self.names.not_ready.trim(),
            MarkerKind::NonCompliant => self.names.non_compliant.trim(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> MarkerNames {
        MarkerNames {
            ready: "white_check_mark".to_string(),
            not_ready: "hourglass".to_string(),
            non_compliant: "no_entry".to_string(),
            like: "thumbsup".to_string(),
            dislike: "thumbsdown".to_string(),
        }
    }

    #[test]
    fn test_classify_known_names() {
        let catalog = MarkerCatalog::new(names()).unwrap();
        assert_eq!(catalog.classify("thumbsup"), Some(Signal::Like));
        assert_eq!(catalog.classify("thumbsdown"), Some(Signal::Dislike));
        assert_eq!(
            catalog.classify("hourglass"),
            Some(Signal::Marker(MarkerKind::NotReady))
        );
        assert_eq!(catalog.classify("tada"), None);
    }

    #[test]
    fn test_name_of_round_trips_through_classify() {
        let catalog = MarkerCatalog::new(names()).unwrap();
        for kind in MarkerKind::ALL {
            assert_eq!(
                catalog.classify(catalog.name_of(kind)),
                Some(Signal::Marker(kind))
            );
        }
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut n = names();
        n.dislike = "hourglass".to_string();
        let err = MarkerCatalog::new(n).unwrap_err();
        assert!(matches!(
            err,
            PolicyError::DuplicateMarkerName {
                first: "not_ready",
                second: "dislike",
                ..
            }
        ));
    }

    #[test]
    fn test_blank_name_rejected() {
        let mut n = names();
        n.ready = "   ".to_string();
        assert!(matches!(
            MarkerCatalog::new(n),
            Err(PolicyError::EmptyMarkerName("ready"))
        ));
    }
}
