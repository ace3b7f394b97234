//! The event reducer: folds ledger notifications into the item store.
//!
//! Conceptually `store' = apply(store, notification)`. The store is updated
//! in place, but an application either commits every field of a transition
//! or none of them; rejected notifications leave the store untouched and
//! come back as typed errors for the caller to log and act on.

use crate::auction::{AuctionItem, BidState, ItemId, OpenBidTerms, TransitionError};
use crate::event::Notification;
use crate::store::ItemStore;
use thiserror::Error;

/// What an accepted notification did to the store.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    /// Duplicate `ItemAdded` delivery; the item was already present.
    AlreadyKnown,
    Transitioned(BidState),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReduceError {
    /// The notification referenced an item the store has never seen.
    #[error("unknown item {0}")]
    UnknownItem(ItemId),
    /// Duplicate or reordered delivery; the store already moved past it.
    #[error("item {item}: {source}")]
    Stale {
        item: ItemId,
        source: TransitionError,
    },
    /// A transition was skipped; the local view missed a notification and
    /// should be rebuilt from the ledger.
    #[error("item {item}: missed a transition between {current:?} and {proposed:?}")]
    SequenceGap {
        item: ItemId,
        current: BidState,
        proposed: BidState,
    },
}

pub fn apply(store: &ItemStore, notification: Notification) -> Result<Applied, ReduceError> {
    match notification {
        Notification::ItemAdded(record) => Ok(if store.insert_new(record) {
            Applied::Inserted
        } else {
            Applied::AlreadyKnown
        }),
        Notification::SecretBidPhaseStarted { item } => {
            transition(store, item, BidState::SecretBid, |_| {})
        }
        Notification::OpenBidPhaseStarted {
            item,
            start_time,
            start_amount,
        } => transition(store, item, BidState::OpenBid, move |it| {
            it.open_bid = Some(OpenBidTerms {
                start_time,
                start_amount,
            });
        }),
        Notification::AuctionCompleted { item, message } => {
            transition(store, item, BidState::Ended, move |it| {
                it.settlement = Some(message);
            })
        }
    }
}

fn transition(
    store: &ItemStore,
    item: ItemId,
    proposed: BidState,
    aux: impl FnOnce(&mut AuctionItem),
) -> Result<Applied, ReduceError> {
    store
        .modify(item, |it| {
            let next = it.bid_state.advance(proposed).map_err(|err| match err {
                TransitionError::Stale { .. } => ReduceError::Stale { item, source: err },
                TransitionError::Gap { current, proposed } => ReduceError::SequenceGap {
                    item,
                    current,
                    proposed,
                },
            })?;
            it.bid_state = next;
            aux(it);
            Ok(Applied::Transitioned(next))
        })
        .ok_or(ReduceError::UnknownItem(item))?
}
