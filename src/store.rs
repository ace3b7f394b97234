//! The local read model of all auction items.

use crate::auction::{AuctionItem, BidState, ClientIdRef, ItemId, OpenBidTerms};
use crate::event::ItemRecord;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Snapshot of one item for a rendering layer, with ownership resolved
/// against the viewing identity at read time rather than stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemView {
    pub id: ItemId,
    pub name: String,
    pub image_url: String,
    pub owner: String,
    pub is_owner: bool,
    pub bid_state: BidState,
    pub has_submitted_secret_bid: bool,
    pub open_bid: Option<OpenBidTerms>,
    pub settlement: Option<String>,
}

#[derive(Default)]
struct StoreInner {
    items: BTreeMap<ItemId, AuctionItem>,
    /// Display order, most recently added first.
    order: Vec<ItemId>,
}

/// In-memory mapping holding the current view of every auction item.
///
/// Only two writers exist: the event reducer (authoritative) and the
/// dispatcher's single optimistic patch. Every mutation runs under one
/// write lock, so readers never observe a half-applied update.
#[derive(Default)]
pub struct ItemStore {
    inner: RwLock<StoreInner>,
}

pub type SharedItemStore = Arc<ItemStore>;

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> SharedItemStore {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<AuctionItem> {
        self.inner.read().items.get(&id).cloned()
    }

    /// Ordered view of the store for a rendering layer, most recent first.
    pub fn snapshot(&self, viewer: ClientIdRef) -> Vec<ItemView> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.items.get(id))
            .map(|item| ItemView {
                id: item.id,
                name: item.name.clone(),
                image_url: item.image_url.clone(),
                owner: item.owner.clone(),
                is_owner: item.is_owned_by(viewer),
                bid_state: item.bid_state,
                has_submitted_secret_bid: item.has_submitted_secret_bid,
                open_bid: item.open_bid,
                settlement: item.settlement.clone(),
            })
            .collect()
    }

    /// Insert a newly announced item unless it is already known.
    /// Returns false on a duplicate delivery.
    pub(crate) fn insert_new(&self, record: ItemRecord) -> bool {
        let mut inner = self.inner.write();
        let StoreInner { items, order } = &mut *inner;
        match items.entry(record.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                order.insert(0, record.id);
                entry.insert(item_from_record(record));
                true
            }
        }
    }

    /// Run `f` against one item under the write lock. `None` if unknown.
    pub(crate) fn modify<R>(&self, id: ItemId, f: impl FnOnce(&mut AuctionItem) -> R) -> Option<R> {
        let mut inner = self.inner.write();
        inner.items.get_mut(&id).map(f)
    }

    /// Run `f` against one item under the read lock. `None` if unknown.
    pub(crate) fn read<R>(&self, id: ItemId, f: impl FnOnce(&AuctionItem) -> R) -> Option<R> {
        let inner = self.inner.read();
        inner.items.get(&id).map(f)
    }

    /// Install or refresh the base snapshot from a full-state query.
    ///
    /// The ledger is authoritative for ownership and may only move phases
    /// forward; local-only knowledge survives the merge, in particular the
    /// secret-bid latch, which can tighten but never release. Pricing terms
    /// already held locally are kept (the full-state query does not carry
    /// them).
    pub(crate) fn install_base(&self, records: Vec<ItemRecord>) {
        let mut inner = self.inner.write();
        let StoreInner { items, order } = &mut *inner;
        for record in records {
            match items.entry(record.id) {
                Entry::Occupied(mut entry) => {
                    let item = entry.get_mut();
                    if record.bid_state > item.bid_state {
                        item.bid_state = record.bid_state;
                    }
                    item.owner = record.owner;
                    item.has_submitted_secret_bid |= record.has_submitted_secret_bid;
                }
                Entry::Vacant(entry) => {
                    order.insert(0, record.id);
                    entry.insert(item_from_record(record));
                }
            }
        }
    }
}

fn item_from_record(record: ItemRecord) -> AuctionItem {
    AuctionItem {
        id: record.id,
        name: record.name,
        image_url: record.image_url,
        owner: record.owner,
        bid_state: record.bid_state,
        has_submitted_secret_bid: record.has_submitted_secret_bid,
        open_bid: None,
        settlement: None,
    }
}
