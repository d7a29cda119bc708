//! A view's rendered window and what it still needs fetched.
//!
//! The view keeps one [`SliceWindow`] per visible list, seeds it from a query,
//! patches it from slice updates that cover its anchor, and asks
//! [`SliceWindow::insufficient`] which pages the fetch collaborator should
//! request next.

use std::collections::BTreeSet;

use serde::Serialize;
use smallvec::{SmallVec, smallvec};
use sparseids_types::MsgId;

use crate::events::{SliceUpdate, SliceUpdateKind};
use crate::list::SparseIdsList;
use crate::query::{SparseIdsQuery, SparseIdsResult, resolve_window};

/// Page the fetch collaborator should load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "direction")]
pub enum FetchRequest {
    /// Nothing is known around the anchor.
    Around {
        around: MsgId,
        limit_before: usize,
        limit_after: usize,
    },
    /// Identifiers strictly older than `before`.
    Older { before: MsgId, limit: usize },
    /// Identifiers strictly newer than `after`.
    Newer { after: MsgId, limit: usize },
}

/// Outcome of feeding an update to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowChange {
    Unchanged,
    /// The window was rebuilt in place from the update.
    Patched,
    /// The update touched state the window derives from but cannot rebuild
    /// alone (the total count moved elsewhere); query again.
    Requery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceWindow {
    query: SparseIdsQuery,
    result: SparseIdsResult,
}

impl SliceWindow {
    #[must_use]
    pub fn new(query: SparseIdsQuery) -> Self {
        Self {
            query,
            result: SparseIdsResult::default(),
        }
    }

    #[must_use]
    pub const fn query(&self) -> SparseIdsQuery {
        self.query
    }

    #[must_use]
    pub const fn result(&self) -> &SparseIdsResult {
        &self.result
    }

    #[must_use]
    pub fn ids(&self) -> &BTreeSet<MsgId> {
        &self.result.ids
    }

    /// Replace the window contents. Returns whether anything changed.
    pub fn apply_result(&mut self, result: SparseIdsResult) -> bool {
        if self.result == result {
            return false;
        }
        self.result = result;
        true
    }

    /// Re-read the window from the index.
    pub fn refresh(&mut self, list: &SparseIdsList) -> bool {
        self.apply_result(list.query(self.query))
    }

    /// Drop a deleted identifier ahead of the index update.
    pub fn remove_one(&mut self, id: MsgId) -> bool {
        if !self.result.ids.remove(&id) {
            return false;
        }
        if let Some(count) = self.result.count.as_mut() {
            *count = count.saturating_sub(1);
        }
        true
    }

    /// History was cleared: nothing around the anchor is known any more.
    pub fn remove_all(&mut self) -> bool {
        self.apply_result(SparseIdsResult::default())
    }

    pub fn apply_update(&mut self, update: &SliceUpdate<'_>) -> WindowChange {
        let patched = |changed: bool| {
            if changed {
                WindowChange::Patched
            } else {
                WindowChange::Unchanged
            }
        };
        match update.kind {
            SliceUpdateKind::Invalidated => patched(self.apply_result(SparseIdsResult::default())),
            SliceUpdateKind::Merged | SliceUpdateKind::Removed => {
                let covers = if self.query.around.is_none() {
                    update.range.open_newest()
                } else {
                    update.range.contains(self.query.around)
                };
                if covers {
                    let next = resolve_window(update.members, update.range, update.count, self.query);
                    patched(self.apply_result(next))
                } else if update.count != self.result.count {
                    WindowChange::Requery
                } else {
                    WindowChange::Unchanged
                }
            }
        }
    }

    /// Pages to fetch so the window can hold what was asked for. Empty when
    /// the window is full or both short sides are proven exhausted.
    #[must_use]
    pub fn insufficient(&self) -> SmallVec<[FetchRequest; 2]> {
        let query = self.query;
        if self.result.is_unknown() {
            return smallvec![FetchRequest::Around {
                around: query.around,
                limit_before: query.limit_before,
                limit_after: query.limit_after,
            }];
        }
        let anchor = if query.around.is_none() {
            MsgId::SERVER_MAX
        } else {
            query.around
        };
        let ids = &self.result.ids;
        let have_before = ids.range(..anchor).count();
        let have_after = ids.len() - have_before;
        let want_after = if query.around.is_none() {
            0
        } else {
            query.limit_after.saturating_add(1)
        };

        let mut requests = SmallVec::new();
        if have_before < query.limit_before && self.result.skipped_before != Some(0) {
            requests.push(FetchRequest::Older {
                before: ids.first().copied().unwrap_or(anchor),
                limit: query.limit_before - have_before,
            });
        }
        if have_after < want_after && self.result.skipped_after != Some(0) {
            requests.push(FetchRequest::Newer {
                after: ids.last().copied().unwrap_or(anchor),
                limit: want_after - have_after,
            });
        }
        requests
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use sparseids_types::MsgRange;

    fn id_vec(raw: &[u64]) -> Vec<MsgId> {
        raw.iter().copied().map(MsgId::new).collect()
    }

    #[test]
    fn unknown_window_asks_for_around_page() {
        let window = SliceWindow::new(SparseIdsQuery::new(MsgId::new(100), 10, 10));
        assert_eq!(
            window.insufficient().as_slice(),
            &[FetchRequest::Around {
                around: MsgId::new(100),
                limit_before: 10,
                limit_after: 10,
            }]
        );
    }

    #[test]
    fn short_unproven_sides_request_pages() {
        let mut list = SparseIdsList::new();
        list.add_slice(id_vec(&[95, 98, 100, 103]), MsgRange::raw(90, 110), None)
            .expect("page");
        let mut window = SliceWindow::new(SparseIdsQuery::new(MsgId::new(100), 5, 5));
        assert!(window.refresh(&list));
        assert_eq!(
            window.insufficient().as_slice(),
            &[
                FetchRequest::Older {
                    before: MsgId::new(95),
                    limit: 3,
                },
                FetchRequest::Newer {
                    after: MsgId::new(103),
                    limit: 4,
                },
            ]
        );
    }

    #[test]
    fn exhausted_history_needs_nothing() {
        let mut list = SparseIdsList::new();
        list.add_slice(id_vec(&[5, 7, 9]), MsgRange::raw(0, 10), Some(3))
            .expect("page");
        let mut window = SliceWindow::new(SparseIdsQuery::new(MsgId::new(7), 5, 5));
        window.refresh(&list);
        assert!(window.insufficient().is_empty());
    }

    #[test]
    fn updates_covering_anchor_patch_in_place() {
        let mut list = SparseIdsList::new();
        list.add_slice(id_vec(&[5, 7, 9]), MsgRange::raw(0, 10), Some(3))
            .expect("page");
        let window = Rc::new(RefCell::new(SliceWindow::new(SparseIdsQuery::new(
            MsgId::new(7),
            5,
            5,
        ))));
        window.borrow_mut().refresh(&list);

        let changes = Rc::new(RefCell::new(Vec::new()));
        let view = Rc::clone(&window);
        let sink = Rc::clone(&changes);
        let _sub = list.subscribe(move |update: &SliceUpdate<'_>| {
            sink.borrow_mut().push(view.borrow_mut().apply_update(update));
        });

        list.add_new(MsgId::new(11)).expect("new");
        list.remove_one(MsgId::new(5));
        list.add_slice(id_vec(&[40]), MsgRange::raw(0, 10), None)
            .expect_err("rejected calls publish nothing");

        assert_eq!(
            *changes.borrow(),
            vec![WindowChange::Patched, WindowChange::Patched]
        );
        let window = window.borrow();
        assert_eq!(window.result(), &list.query(window.query()));
        assert!(window.ids().contains(&MsgId::new(11)));
    }

    #[test]
    fn distant_count_change_requests_requery() {
        let mut list = SparseIdsList::new();
        list.add_slice(id_vec(&[5, 7]), MsgRange::raw(0, 8), Some(10))
            .expect("page");
        let mut window = SliceWindow::new(SparseIdsQuery::new(MsgId::new(7), 2, 2));
        window.refresh(&list);

        let members = [MsgId::new(50)].into_iter().collect();
        let update = SliceUpdate {
            kind: SliceUpdateKind::Merged,
            members: &members,
            range: MsgRange::raw(45, 60),
            count: Some(11),
        };
        assert_eq!(window.apply_update(&update), WindowChange::Requery);
    }

    #[test]
    fn live_deletion_matches_index_after_update() {
        let mut list = SparseIdsList::new();
        list.add_slice(id_vec(&[5, 7, 9]), MsgRange::raw(0, 10), Some(3))
            .expect("page");
        let mut window = SliceWindow::new(SparseIdsQuery::new(MsgId::new(7), 5, 5));
        window.refresh(&list);

        assert!(window.remove_one(MsgId::new(9)));
        assert!(!window.remove_one(MsgId::new(9)));
        list.remove_one(MsgId::new(9));
        assert_eq!(window.result(), &list.query(window.query()));

        assert!(window.remove_all());
        assert!(!window.remove_all());
        assert_eq!(window.insufficient().len(), 1);
    }

    #[test]
    fn invalidation_resets_window() {
        let mut list = SparseIdsList::new();
        list.add_slice(id_vec(&[5, 7]), MsgRange::raw(0, 8), Some(2))
            .expect("page");
        let mut window = SliceWindow::new(SparseIdsQuery::new(MsgId::new(7), 2, 2));
        window.refresh(&list);
        let members = BTreeSet::new();
        let update = SliceUpdate {
            kind: SliceUpdateKind::Invalidated,
            members: &members,
            range: sparseids_types::FULL_MSG_RANGE,
            count: None,
        };
        assert_eq!(window.apply_update(&update), WindowChange::Patched);
        assert!(window.result().is_unknown());
    }
}
