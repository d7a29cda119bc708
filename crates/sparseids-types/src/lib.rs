//! Value types for sparse ordered-identifier indexes.
//!
//! - [`MsgId`]: a totally ordered message identifier within one conversation.
//!   `0` doubles as "no identifier" and the open oldest boundary, `u64::MAX`
//!   is the open newest boundary.
//! - [`MsgRange`]: a closed interval of identifier space over which local
//!   knowledge is asserted complete.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Message identifier, strictly increasing by creation time.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MsgId(u64);

impl MsgId {
    /// "No identifier"; also the open oldest boundary of a range.
    pub const NONE: Self = Self(0);
    /// Open newest boundary of a range. Never a real identifier.
    pub const SERVER_MAX: Self = Self(u64::MAX);

    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Whether this value is one of the two boundary sentinels.
    #[inline]
    #[must_use]
    pub const fn is_sentinel(self) -> bool {
        self.0 == 0 || self.0 == u64::MAX
    }

    /// Next identifier, saturating at [`MsgId::SERVER_MAX`].
    #[inline]
    #[must_use]
    pub const fn saturating_next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl From<u64> for MsgId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => f.write_str("none"),
            Self::SERVER_MAX => f.write_str("max"),
            Self(raw) => write!(f, "{raw}"),
        }
    }
}

/// Closed identifier interval `[from, till]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MsgRange {
    pub from: MsgId,
    pub till: MsgId,
}

/// The whole identifier space, open on both sides.
pub const FULL_MSG_RANGE: MsgRange = MsgRange {
    from: MsgId::NONE,
    till: MsgId::SERVER_MAX,
};

impl MsgRange {
    #[inline]
    #[must_use]
    pub const fn new(from: MsgId, till: MsgId) -> Self {
        Self { from, till }
    }

    /// Range over raw identifier values.
    #[inline]
    #[must_use]
    pub const fn raw(from: u64, till: u64) -> Self {
        Self::new(MsgId::new(from), MsgId::new(till))
    }

    /// Range that starts at `from` and stays open on the newest side.
    #[inline]
    #[must_use]
    pub const fn newest_from(from: MsgId) -> Self {
        Self::new(from, MsgId::SERVER_MAX)
    }

    /// `from <= till`.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.from <= self.till
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: MsgId) -> bool {
        self.from <= id && id <= self.till
    }

    /// Extends to the oldest end of history.
    #[inline]
    #[must_use]
    pub fn open_oldest(&self) -> bool {
        self.from == MsgId::NONE
    }

    /// Extends to the newest end of history.
    #[inline]
    #[must_use]
    pub fn open_newest(&self) -> bool {
        self.till == MsgId::SERVER_MAX
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.open_oldest() && self.open_newest()
    }

    /// Whether the two ranges share at least one identifier.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.from <= other.till && other.from <= self.till
    }

    /// Whether the two ranges overlap or sit next to each other with no
    /// identifier strictly between them.
    #[must_use]
    pub fn touches(&self, other: &Self) -> bool {
        self.from <= other.till.saturating_next() && other.from <= self.till.saturating_next()
    }

    /// Smallest range covering both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::new(self.from.min(other.from), self.till.max(other.till))
    }

    /// Shared part of both ranges, if any.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        self.overlaps(other)
            .then(|| Self::new(self.from.max(other.from), self.till.min(other.till)))
    }
}

impl fmt::Display for MsgRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.till)
    }
}
