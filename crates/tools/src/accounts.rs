//! The managed ad-account directory.
//!
//! Accounts come from configuration; the insight tools resolve names,
//! aliases, and `act_` ids against this table instead of hitting the
//! Graph API for discovery.

use adpilot_config::AdAccountEntry;

/// One managed ad account.
#[derive(Debug, Clone)]
pub struct AdAccount {
    /// Numeric id without the `act_` prefix
    pub id: String,
    pub name: String,
    pub aliases: Vec<String>,
}

impl AdAccount {
    /// The id in the `act_<id>` form the insights endpoints expect.
    pub fn act_id(&self) -> String {
        format!("act_{}", self.id)
    }
}

/// Lookup table over the configured accounts.
#[derive(Debug, Default)]
pub struct AccountDirectory {
    accounts: Vec<AdAccount>,
}

impl AccountDirectory {
    pub fn from_entries(entries: &[AdAccountEntry]) -> Self {
        Self {
            accounts: entries
                .iter()
                .map(|e| AdAccount {
                    id: e.id.clone(),
                    name: e.name.clone(),
                    aliases: e.aliases.iter().map(|a| a.to_lowercase()).collect(),
                })
                .collect(),
        }
    }

    pub fn all(&self) -> &[AdAccount] {
        &self.accounts
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Resolve by alias first, then by case-insensitive name substring.
    pub fn find(&self, query: &str) -> Option<&AdAccount> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        self.accounts
            .iter()
            .find(|a| a.aliases.iter().any(|alias| *alias == needle))
            .or_else(|| {
                self.accounts
                    .iter()
                    .find(|a| a.name.to_lowercase().contains(&needle))
            })
    }

    /// Account name for an id, tolerating the `act_` prefix.
    pub fn name_for(&self, account_id: &str) -> Option<&str> {
        let clean = account_id.strip_prefix("act_").unwrap_or(account_id);
        self.accounts
            .iter()
            .find(|a| a.id == clean)
            .map(|a| a.name.as_str())
    }
}

/// Ensure the `act_` prefix on a caller-supplied id.
pub fn normalize_act_id(account_id: &str) -> String {
    if account_id.starts_with("act_") {
        account_id.to_string()
    } else {
        format!("act_{account_id}")
    }
}

#[cfg(test)]
pub(crate) fn sample_directory() -> AccountDirectory {
    AccountDirectory::from_entries(&[
        AdAccountEntry {
            id: "611132268404060".into(),
            name: "Vorp Scale".into(),
            aliases: vec!["scale".into()],
        },
        AdAccountEntry {
            id: "4429673283720645".into(),
            name: "Vorp Tech".into(),
            aliases: vec!["tech".into()],
        },
        AdAccountEntry {
            id: "2190755121126699".into(),
            name: "CDA. MatchSales".into(),
            aliases: vec!["matchsales".into(), "cda".into()],
        },
    ])
}
