//! Window queries over the remembered slices.
//!
//! A query never guesses: an anchor outside every slice yields no members and
//! no skipped counts, which is the caller's cue to fetch. Skipped counts are
//! reported only where a slice boundary (or the known total) proves them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sparseids_types::{MsgId, MsgRange};
use tracing::warn;

use crate::list::{SPARSE_IDS_COMPONENT, SparseIdsList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseIdsQuery {
    /// Anchor identifier; [`MsgId::NONE`] anchors at the newest end.
    pub around: MsgId,
    pub limit_before: usize,
    pub limit_after: usize,
}

impl SparseIdsQuery {
    #[must_use]
    pub const fn new(around: MsgId, limit_before: usize, limit_after: usize) -> Self {
        Self {
            around,
            limit_before,
            limit_after,
        }
    }

    /// Latest `limit` identifiers.
    #[must_use]
    pub const fn newest(limit: usize) -> Self {
        Self::new(MsgId::NONE, limit, 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseIdsResult {
    pub count: Option<usize>,
    pub skipped_before: Option<usize>,
    pub skipped_after: Option<usize>,
    pub ids: BTreeSet<MsgId>,
}

impl SparseIdsResult {
    /// Nothing is known around the anchor: the caller has to fetch.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.ids.is_empty() && self.skipped_before.is_none() && self.skipped_after.is_none()
    }

    /// Both sides are proven, no fetch can add anything to this window.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.skipped_before.is_some() && self.skipped_after.is_some()
    }
}

impl SparseIdsList {
    /// Window of up to `limit_before` identifiers below the anchor and up to
    /// `limit_after + 1` at or above it, taken from the slice containing the
    /// anchor.
    #[must_use]
    pub fn query(&self, query: SparseIdsQuery) -> SparseIdsResult {
        let slices = self.slice_set();
        let found = if query.around.is_none() {
            slices.newest_open()
        } else {
            slices.containing(query.around)
        };
        match found {
            Some(index) => {
                let slice = slices.get(index);
                resolve_window(slice.members(), slice.range(), self.count(), query)
            }
            None => SparseIdsResult {
                count: self.count(),
                ..SparseIdsResult::default()
            },
        }
    }
}

/// Cut a query window out of one complete slice.
pub(crate) fn resolve_window(
    members: &BTreeSet<MsgId>,
    range: MsgRange,
    count: Option<usize>,
    query: SparseIdsQuery,
) -> SparseIdsResult {
    let anchor = if query.around.is_none() {
        MsgId::SERVER_MAX
    } else {
        query.around
    };
    let have_before = members.range(..anchor).count();
    let have_equal_or_after = members.len() - have_before;
    let before = have_before.min(query.limit_before);
    let equal_or_after = have_equal_or_after.min(query.limit_after.saturating_add(1));

    let ids = members
        .range(..anchor)
        .rev()
        .take(before)
        .chain(members.range(anchor..).take(equal_or_after))
        .copied()
        .collect::<BTreeSet<_>>();

    let mut result = SparseIdsResult {
        count,
        skipped_before: range.open_oldest().then_some(have_before - before),
        skipped_after: range.open_newest().then_some(have_equal_or_after - equal_or_after),
        ids,
    };
    if let Some(total) = count {
        let returned = result.ids.len();
        match (result.skipped_before, result.skipped_after) {
            (None, Some(after)) => {
                result.skipped_before = remaining(total, after, returned, "before");
            }
            (Some(before), None) => {
                result.skipped_after = remaining(total, before, returned, "after");
            }
            _ => {}
        }
    }
    result
}

fn remaining(total: usize, other_side: usize, returned: usize, side: &'static str) -> Option<usize> {
    let value = total
        .checked_sub(other_side)
        .and_then(|rest| rest.checked_sub(returned));
    if value.is_none() {
        warn!(
            component = SPARSE_IDS_COMPONENT,
            total,
            other_side,
            returned,
            side,
            "known count is smaller than remembered ids, skipped count left unknown"
        );
    }
    value
}
