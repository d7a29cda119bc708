//! Knowledge slices and the sorted slice set.
//!
//! A [`Slice`] asserts that every identifier existing inside its range is in
//! its member set. [`SliceSet`] keeps slices sorted by `range.from` with no two
//! slices overlapping or touching, so range ends are sorted too and every
//! lookup is a `partition_point` over the vector.

use std::collections::BTreeSet;
use std::ops::Range;

use sparseids_error::{Result, SparseIdsError};
use sparseids_types::{MsgId, MsgRange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    pub(crate) members: BTreeSet<MsgId>,
    pub(crate) range: MsgRange,
}

impl Slice {
    #[must_use]
    pub fn new(members: BTreeSet<MsgId>, range: MsgRange) -> Self {
        Self { members, range }
    }

    #[must_use]
    pub fn members(&self) -> &BTreeSet<MsgId> {
        &self.members
    }

    #[must_use]
    pub const fn range(&self) -> MsgRange {
        self.range
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Fold another completeness assertion into this one. The two ranges must
    /// touch.
    fn absorb(&mut self, members: BTreeSet<MsgId>, range: MsgRange) {
        debug_assert!(self.range.touches(&range));
        if members.len() > self.members.len() {
            let mine = std::mem::replace(&mut self.members, members);
            self.members.extend(mine);
        } else {
            self.members.extend(members);
        }
        self.range = self.range.union(&range);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SliceSet {
    slices: Vec<Slice>,
}

impl SliceSet {
    pub(crate) fn len(&self) -> usize {
        self.slices.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, Slice> {
        self.slices.iter()
    }

    pub(crate) fn get(&self, index: usize) -> &Slice {
        &self.slices[index]
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> &mut Slice {
        &mut self.slices[index]
    }

    pub(crate) fn clear(&mut self) {
        self.slices.clear();
    }

    /// Maximal run of slices that overlap or touch `range`.
    pub(crate) fn touching_run(&self, range: MsgRange) -> Range<usize> {
        let start = self
            .slices
            .partition_point(|slice| slice.range.till.saturating_next() < range.from);
        let end = self
            .slices
            .partition_point(|slice| slice.range.from <= range.till.saturating_next());
        start..end.max(start)
    }

    /// Index of the slice whose range contains `id`.
    pub(crate) fn containing(&self, id: MsgId) -> Option<usize> {
        let index = self.slices.partition_point(|slice| slice.range.till < id);
        self.slices
            .get(index)
            .filter(|slice| slice.range.from <= id)
            .map(|_| index)
    }

    /// Index of the slice that reaches the open newest boundary.
    pub(crate) fn newest_open(&self) -> Option<usize> {
        self.slices
            .last()
            .filter(|slice| slice.range.open_newest())
            .map(|_| self.slices.len() - 1)
    }

    /// Whether `id` is a remembered member of any slice.
    pub(crate) fn is_member(&self, id: MsgId) -> bool {
        self.containing(id)
            .is_some_and(|index| self.slices[index].members.contains(&id))
    }

    /// Largest identifier remembered anywhere.
    pub(crate) fn newest_member(&self) -> Option<MsgId> {
        self.slices
            .iter()
            .rev()
            .find_map(|slice| slice.members.last().copied())
    }

    /// Replace `run` with one slice holding everything in it plus the new
    /// assertion. Returns the index of the merged slice.
    pub(crate) fn merge_run(
        &mut self,
        run: Range<usize>,
        members: BTreeSet<MsgId>,
        range: MsgRange,
    ) -> usize {
        let at = run.start;
        if run.is_empty() {
            self.slices.insert(at, Slice::new(members, range));
            return at;
        }
        let absorbed = self.slices.drain(run.start + 1..run.end).collect::<Vec<_>>();
        let target = &mut self.slices[at];
        target.absorb(members, range);
        for slice in absorbed {
            target.absorb(slice.members, slice.range);
        }
        at
    }

    /// Verify slice ordering, separation and member containment.
    pub(crate) fn check(&self) -> Result<()> {
        for slice in &self.slices {
            if !slice.range.is_valid() {
                return Err(SparseIdsError::internal(format!(
                    "slice range {} is inverted",
                    slice.range
                )));
            }
            if let Some(id) = slice
                .members
                .iter()
                .find(|id| id.is_sentinel() || !slice.range.contains(**id))
            {
                return Err(SparseIdsError::internal(format!(
                    "member {id} escapes slice range {}",
                    slice.range
                )));
            }
        }
        for pair in self.slices.windows(2) {
            if pair[0].range.touches(&pair[1].range) || pair[0].range.from >= pair[1].range.from {
                return Err(SparseIdsError::internal(format!(
                    "slices {} and {} are unordered or mergeable",
                    pair[0].range, pair[1].range
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u64]) -> BTreeSet<MsgId> {
        raw.iter().copied().map(MsgId::new).collect()
    }

    fn set_of(slices: Vec<(Vec<u64>, u64, u64)>) -> SliceSet {
        let mut set = SliceSet::default();
        for (members, from, till) in slices {
            let range = MsgRange::raw(from, till);
            let run = set.touching_run(range);
            set.merge_run(run, ids(&members), range);
        }
        set
    }

    #[test]
    fn touching_run_finds_overlapping_and_adjacent() {
        let set = set_of(vec![(vec![5, 9], 0, 10), (vec![17], 15, 20), (vec![40], 30, 50)]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.touching_run(MsgRange::raw(10, 15)), 0..2);
        assert_eq!(set.touching_run(MsgRange::raw(11, 14)), 0..2);
        assert_eq!(set.touching_run(MsgRange::raw(22, 28)), 2..2);
        assert_eq!(set.touching_run(MsgRange::raw(21, 29)), 1..3);
        assert_eq!(set.touching_run(MsgRange::raw(60, 70)), 3..3);
    }

    #[test]
    fn merge_run_unites_everything_in_the_run() {
        let mut set = set_of(vec![(vec![5, 9], 0, 10), (vec![17], 15, 20)]);
        let run = set.touching_run(MsgRange::raw(10, 15));
        let at = set.merge_run(run, BTreeSet::new(), MsgRange::raw(10, 15));
        assert_eq!(at, 0);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(0).range(), MsgRange::raw(0, 20));
        assert_eq!(set.get(0).members(), &ids(&[5, 9, 17]));
        set.check().expect("merged set is consistent");
    }

    #[test]
    fn empty_run_inserts_in_sorted_position() {
        let mut set = set_of(vec![(vec![5], 0, 10), (vec![40], 30, 50)]);
        let run = set.touching_run(MsgRange::raw(20, 22));
        let at = set.merge_run(run, ids(&[21]), MsgRange::raw(20, 22));
        assert_eq!(at, 1);
        assert_eq!(set.get(1).range(), MsgRange::raw(20, 22));
        set.check().expect("sorted");
    }

    #[test]
    fn containing_respects_range_not_members() {
        let set = set_of(vec![(vec![5, 9], 0, 10), (vec![17], 15, 20)]);
        assert_eq!(set.containing(MsgId::new(7)), Some(0));
        assert_eq!(set.containing(MsgId::new(10)), Some(0));
        assert_eq!(set.containing(MsgId::new(12)), None);
        assert_eq!(set.containing(MsgId::new(15)), Some(1));
        assert_eq!(set.containing(MsgId::new(21)), None);
    }

    #[test]
    fn newest_lookups() {
        let set = set_of(vec![(vec![5, 9], 0, 10), (vec![], 15, 20)]);
        assert_eq!(set.newest_open(), None);
        assert_eq!(set.newest_member(), Some(MsgId::new(9)));

        let open = set_of(vec![(vec![5], 0, 10), (vec![30], 25, u64::MAX)]);
        assert_eq!(open.newest_open(), Some(1));
        assert_eq!(open.newest_member(), Some(MsgId::new(30)));
    }

    #[test]
    fn check_flags_member_outside_range() {
        let set = SliceSet {
            slices: vec![Slice::new(ids(&[11]), MsgRange::raw(0, 10))],
        };
        let err = set.check().expect_err("member escapes");
        assert!(matches!(err, SparseIdsError::Internal(_)));
    }
}
