//! Sparse ordered-identifier index.
//!
//! Tracks partial, incrementally discovered knowledge of one conversation's
//! message identifiers. Fetched pages arrive out of order and overlapping;
//! each asserts completeness over a range. Overlapping or adjacent assertions
//! are merged into disjoint [`Slice`]s, a total count is kept when it can be
//! known, and window queries report exactly which parts of the answer are
//! proven complete.

pub mod config;
pub mod events;
pub mod list;
pub mod query;
pub mod slice;
pub mod stats;
pub mod store;
pub mod window;

pub use config::{ConflictPolicy, SparseIdsConfig};
pub use events::{
    OwnedSliceUpdate, SliceUpdate, SliceUpdateKind, SliceUpdateObserver, Subscription, UpdateBus,
};
pub use list::SparseIdsList;
pub use query::{SparseIdsQuery, SparseIdsResult};
pub use slice::Slice;
pub use sparseids_error::{Result, SparseIdsError};
pub use sparseids_types::{FULL_MSG_RANGE, MsgId, MsgRange};
pub use stats::IndexStats;
pub use store::SparseIdsStore;
pub use window::{FetchRequest, SliceWindow, WindowChange};
