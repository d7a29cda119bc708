//! Error type for sparse id index operations.
//!
//! The index performs no I/O, so every variant is a rejected call: the caller
//! broke a precondition or supplied data that contradicts what the index
//! already remembers. A rejected call never changes index state.

use sparseids_types::{MsgId, MsgRange};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SparseIdsError {
    /// Range with `from > till`.
    #[error("invalid range {range}: from is past till")]
    InvalidRange { range: MsgRange },

    /// A boundary sentinel was passed where a real identifier is required.
    #[error("identifier {id} is a range sentinel, not a message")]
    SentinelMember { id: MsgId },

    /// A member lies outside the completeness range it was delivered with.
    #[error("identifier {id} lies outside its no-skip range {range}")]
    MemberOutsideRange { id: MsgId, range: MsgRange },

    /// `add_new` with an identifier that is not newer than everything known.
    #[error("identifier {id} is not newer than the newest known identifier {newest}")]
    NotNewest { id: MsgId, newest: MsgId },

    /// Incoming data disagrees with remembered slices about which members exist.
    #[error("{count} identifiers disagree with remembered slices in incoming range {range} (first: {first})")]
    ConflictingMembers {
        range: MsgRange,
        first: MsgId,
        count: usize,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl SparseIdsError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error is a caller precondition violation (as opposed to a
    /// data consistency conflict or an internal fault).
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange { .. }
                | Self::SentinelMember { .. }
                | Self::MemberOutsideRange { .. }
                | Self::NotNewest { .. }
        )
    }

    /// Short stable label, used as a structured log field.
    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidRange { .. } => "invalid_range",
            Self::SentinelMember { .. } => "sentinel_member",
            Self::MemberOutsideRange { .. } => "member_outside_range",
            Self::NotNewest { .. } => "not_newest",
            Self::ConflictingMembers { .. } => "conflicting_members",
            Self::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, SparseIdsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_render_ranges_and_ids() {
        let err = SparseIdsError::MemberOutsideRange {
            id: MsgId::new(12),
            range: MsgRange::raw(0, 10),
        };
        assert_eq!(
            err.to_string(),
            "identifier 12 lies outside its no-skip range [none, 10]"
        );
    }

    #[test]
    fn classification() {
        assert!(SparseIdsError::InvalidRange {
            range: MsgRange::raw(5, 1)
        }
        .is_precondition());
        let conflict = SparseIdsError::ConflictingMembers {
            range: MsgRange::raw(0, 10),
            first: MsgId::new(3),
            count: 1,
        };
        assert!(!conflict.is_precondition());
        assert_eq!(conflict.reason_code(), "conflicting_members");
        assert_eq!(
            SparseIdsError::internal("boom").to_string(),
            "internal error: boom"
        );
    }
}
