//! The sparse id list: merged knowledge slices plus a global count.
//!
//! Mutations either change state and publish exactly one [`SliceUpdate`], or
//! change nothing and publish nothing. Rejected calls return an error and
//! leave state untouched.

use std::collections::BTreeSet;

use smallvec::SmallVec;
use sparseids_error::{Result, SparseIdsError};
use sparseids_types::{FULL_MSG_RANGE, MsgId, MsgRange};
use tracing::{debug, info, warn};

use crate::config::{ConflictPolicy, SparseIdsConfig};
use crate::events::{SliceUpdate, SliceUpdateKind, SliceUpdateObserver, Subscription, UpdateBus};
use crate::slice::{Slice, SliceSet};
use crate::stats::IndexStats;

pub(crate) const SPARSE_IDS_COMPONENT: &str = "sparseids.list";

/// Where merged identifiers come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ingest {
    /// Live newest identifier; the open newest boundary is expected to grow,
    /// so nothing inside it is treated as contradicted.
    New,
    /// Fetched or otherwise known data asserting a no-skip range.
    Known,
}

#[derive(Debug, Default)]
pub struct SparseIdsList {
    config: SparseIdsConfig,
    slices: SliceSet,
    count: Option<usize>,
    bus: UpdateBus,
    stats: IndexStats,
}

impl SparseIdsList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: SparseIdsConfig) -> Self {
        Self::with_bus(config, UpdateBus::new())
    }

    /// Build an index publishing on an injected bus.
    #[must_use]
    pub fn with_bus(config: SparseIdsConfig, bus: UpdateBus) -> Self {
        Self {
            config,
            slices: SliceSet::default(),
            count: None,
            bus,
            stats: IndexStats::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SparseIdsConfig {
        &self.config
    }

    /// Total number of identifiers in the whole sequence, when known.
    #[must_use]
    pub const fn count(&self) -> Option<usize> {
        self.count
    }

    /// No slices are remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Remembered slices in identifier order.
    pub fn slices(&self) -> impl ExactSizeIterator<Item = &Slice> + '_ {
        self.slices.iter()
    }

    #[must_use]
    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    #[must_use]
    pub const fn stats(&self) -> &IndexStats {
        &self.stats
    }

    #[must_use]
    pub fn bus(&self) -> &UpdateBus {
        &self.bus
    }

    /// Attach an observer to this index's updates.
    #[must_use = "dropping the subscription detaches the observer immediately"]
    pub fn subscribe<O>(&self, observer: O) -> Subscription
    where
        O: SliceUpdateObserver + 'static,
    {
        self.bus.subscribe(observer)
    }

    pub(crate) fn slice_set(&self) -> &SliceSet {
        &self.slices
    }

    /// Record a freshly created identifier, newer than everything known.
    pub fn add_new(&mut self, id: MsgId) -> Result<()> {
        if id.is_sentinel() {
            return self.reject(SparseIdsError::SentinelMember { id });
        }
        if self.config.enforce_new_ordering {
            if let Some(newest) = self.slices.newest_member() {
                if id <= newest {
                    return self.reject(SparseIdsError::NotNewest { id, newest });
                }
            }
        }
        self.add_range(
            BTreeSet::from([id]),
            MsgRange::newest_from(id),
            None,
            Ingest::New,
        )
    }

    /// Record one identifier together with a range the caller guarantees is
    /// fully known around it.
    pub fn add_existing(&mut self, id: MsgId, no_skip_range: MsgRange) -> Result<()> {
        self.add_range(BTreeSet::from([id]), no_skip_range, None, Ingest::Known)
    }

    /// Record a fetched page: `ids` are all identifiers inside
    /// `no_skip_range`, `count` an optional authoritative total.
    pub fn add_slice<I>(&mut self, ids: I, no_skip_range: MsgRange, count: Option<usize>) -> Result<()>
    where
        I: IntoIterator<Item = MsgId>,
    {
        self.add_range(ids.into_iter().collect(), no_skip_range, count, Ingest::Known)
    }

    /// Forget one identifier. Its slice keeps asserting completeness over the
    /// same range. Returns whether anything changed.
    pub fn remove_one(&mut self, id: MsgId) -> bool {
        let Some(index) = self.slices.containing(id) else {
            return self.noop("remove_one", id);
        };
        if !self.slices.get_mut(index).members.remove(&id) {
            return self.noop("remove_one", id);
        }
        if let Some(count) = self.count.as_mut() {
            *count = count.saturating_sub(1);
        }
        debug!(
            component = SPARSE_IDS_COMPONENT,
            id = id.get(),
            count = ?self.count,
            "identifier removed"
        );
        self.publish(index, SliceUpdateKind::Removed);
        true
    }

    /// Drop every slice and forget the total count.
    pub fn remove_all(&mut self) -> bool {
        if self.slices.is_empty() && self.count.is_none() {
            return self.noop("remove_all", MsgId::NONE);
        }
        let dropped = self.slices.len();
        self.slices.clear();
        self.count = None;
        info!(
            component = SPARSE_IDS_COMPONENT,
            dropped_slices = dropped,
            "sparse id list invalidated"
        );
        let empty = BTreeSet::new();
        let update = SliceUpdate {
            kind: SliceUpdateKind::Invalidated,
            members: &empty,
            range: FULL_MSG_RANGE,
            count: None,
        };
        let delivered = self.bus.dispatch(&update);
        self.stats.record_event(delivered);
        true
    }

    /// Verify slice ordering, separation and member containment.
    pub fn check_invariants(&self) -> Result<()> {
        self.slices.check()?;
        if self.config.derive_count_from_full_range {
            if let [only] = self.slices.iter().as_slice() {
                if only.range.is_full() && self.count != Some(only.len()) {
                    return Err(SparseIdsError::internal(format!(
                        "full-range slice holds {} ids but count is {:?}",
                        only.len(),
                        self.count
                    )));
                }
            }
        }
        Ok(())
    }

    fn add_range(
        &mut self,
        mut members: BTreeSet<MsgId>,
        range: MsgRange,
        reported: Option<usize>,
        ingest: Ingest,
    ) -> Result<()> {
        if !range.is_valid() {
            return self.reject(SparseIdsError::InvalidRange { range });
        }
        if let Some(&id) = members.iter().find(|id| id.is_sentinel()) {
            return self.reject(SparseIdsError::SentinelMember { id });
        }
        if let Some(&id) = members.iter().find(|id| !range.contains(**id)) {
            return self.reject(SparseIdsError::MemberOutsideRange { id, range });
        }

        let run = self.slices.touching_run(range);

        if ingest == Ingest::Known {
            let contradicted = self.contradicted_members(run.clone(), &members, range);
            let unlisted = self.unlisted_members(&members);
            let conflicts = contradicted.len() + unlisted.len();
            if let Some(first) = contradicted.iter().chain(unlisted.iter()).copied().min() {
                let conflict = SparseIdsError::ConflictingMembers {
                    range,
                    first,
                    count: conflicts,
                };
                self.stats.conflicts += conflicts as u64;
                if self.config.conflict_policy == ConflictPolicy::Reject {
                    return self.reject(conflict);
                }
                warn!(
                    component = SPARSE_IDS_COMPONENT,
                    reason_code = conflict.reason_code(),
                    range = %range,
                    first = first.get(),
                    contradicted = contradicted.len(),
                    unlisted = unlisted.len(),
                    "incoming range disagrees with remembered slices, keeping remembered"
                );
                for id in &unlisted {
                    members.remove(id);
                }
            }
        }

        let known_before = self.slices_members(run.clone());
        let added = members
            .iter()
            .filter(|id| !self.slices.is_member(**id))
            .count();
        let merged_range = self
            .slices
            .iter()
            .skip(run.start)
            .take(run.len())
            .fold(range, |acc, slice| acc.union(&slice.range));

        let mut count = match reported {
            Some(reported) => Some(reported),
            None => self.count.and_then(|count| {
                let grown = count.checked_add(added);
                if grown.is_none() {
                    warn!(
                        component = SPARSE_IDS_COMPONENT,
                        count,
                        added,
                        "known count overflows, leaving it unknown"
                    );
                }
                grown
            }),
        };
        if self.config.derive_count_from_full_range && merged_range.is_full() {
            let exact = known_before + added;
            if let Some(reported) = reported.filter(|reported| *reported != exact) {
                warn!(
                    component = SPARSE_IDS_COMPONENT,
                    reported,
                    exact,
                    "reported count disagrees with full-range knowledge, using exact"
                );
            }
            count = Some(exact);
        }

        let unchanged = run.len() == 1
            && added == 0
            && self.slices.get(run.start).range == merged_range
            && count == self.count;
        if unchanged {
            self.noop("merge", range.from);
            return Ok(());
        }

        let index = self.slices.merge_run(run.clone(), members, range);
        self.count = count;
        debug!(
            component = SPARSE_IDS_COMPONENT,
            range = %self.slices.get(index).range,
            united = run.len(),
            added,
            count = ?self.count,
            "slice merged"
        );
        self.publish(index, SliceUpdateKind::Merged);
        Ok(())
    }

    /// Remembered members that `range` claims to cover completely but that
    /// `members` leaves out.
    fn contradicted_members(
        &self,
        run: std::ops::Range<usize>,
        members: &BTreeSet<MsgId>,
        range: MsgRange,
    ) -> SmallVec<[MsgId; 4]> {
        let mut contradicted = SmallVec::new();
        for slice in self.slices.iter().skip(run.start).take(run.len()) {
            let Some(shared) = slice.range.intersection(&range) else {
                continue;
            };
            contradicted.extend(
                slice
                    .members
                    .range(shared.from..=shared.till)
                    .filter(|id| !members.contains(id))
                    .copied(),
            );
        }
        contradicted
    }

    /// Incoming identifiers inside a remembered complete range that the
    /// remembered slice never listed.
    fn unlisted_members(&self, members: &BTreeSet<MsgId>) -> SmallVec<[MsgId; 4]> {
        members
            .iter()
            .copied()
            .filter(|id| {
                self.slices
                    .containing(*id)
                    .is_some_and(|index| !self.slices.get(index).members.contains(id))
            })
            .collect()
    }

    fn slices_members(&self, run: std::ops::Range<usize>) -> usize {
        self.slices
            .iter()
            .skip(run.start)
            .take(run.len())
            .map(Slice::len)
            .sum()
    }

    fn publish(&mut self, index: usize, kind: SliceUpdateKind) {
        let slice = self.slices.get(index);
        let update = SliceUpdate {
            kind,
            members: &slice.members,
            range: slice.range,
            count: self.count,
        };
        let delivered = self.bus.dispatch(&update);
        self.stats.record_event(delivered);
    }

    fn noop(&mut self, operation: &'static str, id: MsgId) -> bool {
        self.stats.noops += 1;
        debug!(
            component = SPARSE_IDS_COMPONENT,
            operation,
            id = id.get(),
            "nothing to change"
        );
        false
    }

    fn reject(&mut self, err: SparseIdsError) -> Result<()> {
        self.stats.rejected += 1;
        warn!(
            component = SPARSE_IDS_COMPONENT,
            reason_code = err.reason_code(),
            error = %err,
            "sparse id mutation rejected"
        );
        Err(err)
    }
}
