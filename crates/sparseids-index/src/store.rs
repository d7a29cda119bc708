//! One sparse id list per conversation.
//!
//! Lists are created empty on first use and destroyed by [`SparseIdsStore::evict`];
//! nothing survives eviction, so a later use starts from scratch.

use std::collections::BTreeMap;
use std::fmt;

use sparseids_error::Result;
use sparseids_types::{MsgId, MsgRange};
use tracing::info;

use crate::config::SparseIdsConfig;
use crate::events::{SliceUpdateObserver, Subscription};
use crate::list::SparseIdsList;
use crate::query::{SparseIdsQuery, SparseIdsResult};

const SPARSE_IDS_STORE_COMPONENT: &str = "sparseids.store";

#[derive(Debug)]
pub struct SparseIdsStore<K> {
    config: SparseIdsConfig,
    lists: BTreeMap<K, SparseIdsList>,
}

impl<K> Default for SparseIdsStore<K> {
    fn default() -> Self {
        Self {
            config: SparseIdsConfig::default(),
            lists: BTreeMap::new(),
        }
    }
}

impl<K> SparseIdsStore<K>
where
    K: Ord + Clone + fmt::Debug,
{
    #[must_use]
    pub fn new(config: SparseIdsConfig) -> Self {
        Self {
            config,
            lists: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.lists.keys()
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<&SparseIdsList> {
        self.lists.get(key)
    }

    /// The list for `key`, created empty if absent.
    pub fn list_mut(&mut self, key: &K) -> &mut SparseIdsList {
        let config = &self.config;
        self.lists
            .entry(key.clone())
            .or_insert_with(|| SparseIdsList::with_config(config.clone()))
    }

    pub fn add_new(&mut self, key: &K, id: MsgId) -> Result<()> {
        self.list_mut(key).add_new(id)
    }

    pub fn add_existing(&mut self, key: &K, id: MsgId, no_skip_range: MsgRange) -> Result<()> {
        self.list_mut(key).add_existing(id, no_skip_range)
    }

    pub fn add_slice<I>(
        &mut self,
        key: &K,
        ids: I,
        no_skip_range: MsgRange,
        count: Option<usize>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = MsgId>,
    {
        self.list_mut(key).add_slice(ids, no_skip_range, count)
    }

    /// Removal from a conversation nobody loaded is a no-op and creates
    /// nothing.
    pub fn remove_one(&mut self, key: &K, id: MsgId) -> bool {
        self.lists
            .get_mut(key)
            .is_some_and(|list| list.remove_one(id))
    }

    pub fn remove_all(&mut self, key: &K) -> bool {
        self.lists.get_mut(key).is_some_and(SparseIdsList::remove_all)
    }

    /// Query without creating anything: an absent conversation is unknown.
    #[must_use]
    pub fn query(&self, key: &K, query: SparseIdsQuery) -> SparseIdsResult {
        self.lists
            .get(key)
            .map(|list| list.query(query))
            .unwrap_or_default()
    }

    /// Attach to one conversation's updates, creating its list if needed.
    #[must_use = "dropping the subscription detaches the observer immediately"]
    pub fn subscribe<O>(&mut self, key: &K, observer: O) -> Subscription
    where
        O: SliceUpdateObserver + 'static,
    {
        self.list_mut(key).subscribe(observer)
    }

    /// Destroy the list for `key`. Its subscriptions go inactive.
    pub fn evict(&mut self, key: &K) -> bool {
        let Some(list) = self.lists.remove(key) else {
            return false;
        };
        info!(
            component = SPARSE_IDS_STORE_COMPONENT,
            key = ?key,
            slices = list.slice_count(),
            count = ?list.count(),
            "conversation index evicted"
        );
        true
    }
}
