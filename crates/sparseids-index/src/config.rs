//! Index configuration.

use serde::{Deserialize, Serialize};

/// What to do when incoming data and remembered slices disagree about which
/// identifiers exist inside a range both sides assert complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Keep what the remembered slices say, log a warning, apply the rest.
    #[default]
    KeepExisting,
    /// Reject the whole call without changing state.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseIdsConfig {
    pub conflict_policy: ConflictPolicy,
    /// Reject `add_new` calls whose identifier is not above every known one.
    pub enforce_new_ordering: bool,
    /// Once one slice spans the whole identifier space its size is the total.
    pub derive_count_from_full_range: bool,
}

impl SparseIdsConfig {
    /// Reject everything suspicious instead of resolving it.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            conflict_policy: ConflictPolicy::Reject,
            enforce_new_ordering: true,
            derive_count_from_full_range: true,
        }
    }
}

impl Default for SparseIdsConfig {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::KeepExisting,
            enforce_new_ordering: true,
            derive_count_from_full_range: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: SparseIdsConfig =
            serde_json::from_str(r#"{"conflict_policy":"reject"}"#).expect("parse");
        assert_eq!(config.conflict_policy, ConflictPolicy::Reject);
        assert!(config.enforce_new_ordering);
        assert!(config.derive_count_from_full_range);
    }

    #[test]
    fn strict_rejects_conflicts() {
        assert_eq!(
            SparseIdsConfig::strict().conflict_policy,
            ConflictPolicy::Reject
        );
        assert_eq!(
            SparseIdsConfig::default().conflict_policy,
            ConflictPolicy::KeepExisting
        );
    }
}
