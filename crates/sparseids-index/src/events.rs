//! Slice update notifications.
//!
//! Every state-changing mutation of a [`crate::SparseIdsList`] publishes one
//! [`SliceUpdate`] on the list's [`UpdateBus`] before the mutating call
//! returns. Delivery is synchronous, on the calling thread, in subscription
//! order. Nothing is buffered: a late subscriber only sees later updates and
//! must `query` for current state.
//!
//! The bus is single-threaded (`Rc`-based) because the index it serves is
//! owned by one control thread and never shared.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use sparseids_types::{MsgId, MsgRange};

/// What kind of mutation produced an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceUpdateKind {
    /// Identifiers were merged into a slice (`add_new`, `add_existing`,
    /// `add_slice`).
    Merged,
    /// One identifier left a slice; the slice range is unchanged.
    Removed,
    /// All knowledge was dropped; `members` is empty and `range` is full.
    Invalidated,
}

/// One published change. `members` borrows the affected slice and is only
/// valid for the duration of the dispatch.
#[derive(Debug, Clone, Copy)]
pub struct SliceUpdate<'a> {
    pub kind: SliceUpdateKind,
    pub members: &'a BTreeSet<MsgId>,
    pub range: MsgRange,
    pub count: Option<usize>,
}

impl SliceUpdate<'_> {
    /// Owned copy that outlives the dispatch.
    #[must_use]
    pub fn to_owned_update(&self) -> OwnedSliceUpdate {
        OwnedSliceUpdate {
            kind: self.kind,
            members: self.members.clone(),
            range: self.range,
            count: self.count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedSliceUpdate {
    pub kind: SliceUpdateKind,
    pub members: BTreeSet<MsgId>,
    pub range: MsgRange,
    pub count: Option<usize>,
}

/// Receiver of slice updates. Implementations must not block.
pub trait SliceUpdateObserver {
    fn on_update(&mut self, update: &SliceUpdate<'_>);
}

impl<F> SliceUpdateObserver for F
where
    F: FnMut(&SliceUpdate<'_>),
{
    #[inline]
    fn on_update(&mut self, update: &SliceUpdate<'_>) {
        self(update);
    }
}

type SharedObserver = Rc<RefCell<dyn SliceUpdateObserver>>;

struct Entry {
    id: u64,
    active: Rc<Cell<bool>>,
    observer: SharedObserver,
}

#[derive(Default)]
struct BusInner {
    next_id: Cell<u64>,
    entries: RefCell<Vec<Entry>>,
}

/// Injectable update channel. Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct UpdateBus {
    inner: Rc<BusInner>,
}

impl UpdateBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observer. It stays attached until the returned guard is
    /// dropped or [`Subscription::unsubscribe`] is called.
    #[must_use = "dropping the subscription detaches the observer immediately"]
    pub fn subscribe<O>(&self, observer: O) -> Subscription
    where
        O: SliceUpdateObserver + 'static,
    {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let active = Rc::new(Cell::new(true));
        self.inner.entries.borrow_mut().push(Entry {
            id,
            active: Rc::clone(&active),
            observer: Rc::new(RefCell::new(observer)),
        });
        Subscription {
            id,
            active,
            bus: Rc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .entries
            .borrow()
            .iter()
            .filter(|entry| entry.active.get())
            .count()
    }

    /// Deliver `update` to every observer attached when dispatch starts and
    /// still attached when its turn comes. Returns the number of deliveries.
    pub(crate) fn dispatch(&self, update: &SliceUpdate<'_>) -> usize {
        let targets = self
            .inner
            .entries
            .borrow()
            .iter()
            .map(|entry| (Rc::clone(&entry.active), Rc::clone(&entry.observer)))
            .collect::<Vec<_>>();
        let mut delivered = 0;
        for (active, observer) in targets {
            if !active.get() {
                continue;
            }
            observer.borrow_mut().on_update(update);
            delivered += 1;
        }
        delivered
    }
}

impl fmt::Debug for UpdateBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateBus")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

/// Guard for one attached observer.
pub struct Subscription {
    id: u64,
    active: Rc<Cell<bool>>,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Detach now. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {}

    /// Whether the observer is still attached to a live bus.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get() && self.bus.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.set(false);
        if let Some(bus) = self.bus.upgrade() {
            // The observer may own other subscriptions; drop it after the
            // entry list borrow is released.
            let removed = {
                let mut entries = bus.entries.borrow_mut();
                entries
                    .iter()
                    .position(|entry| entry.id == self.id)
                    .map(|index| entries.remove(index))
            };
            drop(removed);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
