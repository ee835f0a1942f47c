//! Blocklist entry and lookup result types.

use crate::ControlAction;

/// One blocklist entry: a normalized domain with its control action and
/// optional redirect target.
///
/// Records with the same tree key but different domains chain together in
/// one B-tree slot; each record is exclusively owned by exactly one chain
/// in exactly one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRecord {
    /// Control action applied when this domain is matched
    pub action: ControlAction,
    /// Normalized (lowercase) domain, the exact match key
    pub domain: String,
    /// Redirect target (e.g. an IP string); `None` means the configured
    /// default is substituted at query time
    pub redirect: Option<String>,
}

impl DomainRecord {
    /// Create a record. The domain must already be normalized.
    pub fn new(domain: String, action: ControlAction, redirect: Option<String>) -> Self {
        Self {
            action,
            domain,
            redirect,
        }
    }
}

/// Result of a [`search`](crate::DomainIndex::search).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The domain is blocked.
    Found {
        /// Control action to apply
        action: ControlAction,
        /// Redirect target; for `Redirect` entries without a stored target
        /// this is the configured default address
        redirect: Option<String>,
    },
    /// The domain is not in the blocklist.
    NotFound,
}

impl Lookup {
    /// True if the domain was found.
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found { .. })
    }
}
