//! Role-gated entry points for every user-initiated auction action.
//!
//! Each operation re-checks, locally, the same eligibility rules the ledger
//! enforces authoritatively: a failed check never generates ledger traffic.

use crate::auction::{Amount, AuctionItem, BidState, ClientId, ItemId};
use crate::service::ledger::{LedgerCall, LedgerError, Receipt, SharedLedgerClient};
use crate::store::{ItemView, SharedItemStore};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Why an action was refused locally, before any ledger traffic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Ineligibility {
    #[error("unknown item {0}")]
    UnknownItem(ItemId),
    #[error("only the item owner may do this")]
    OwnerOnly,
    #[error("the item owner may not bid on it")]
    OwnerMayNotBid,
    #[error("the item is in the {actual:?} phase, this action needs {expected:?}")]
    WrongPhase {
        expected: BidState,
        actual: BidState,
    },
    #[error("a secret bid was already submitted for this item")]
    AlreadySubmitted,
    #[error("only secret-bid participants may settle the open phase")]
    NotAParticipant,
}

/// Outcome taxonomy for dispatched actions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("not eligible: {0}")]
    NotEligible(#[from] Ineligibility),
    #[error("rejected by the ledger: {0}")]
    RemoteRejected(String),
    #[error("ledger unavailable: {0}")]
    RemoteUnavailable(String),
}

impl From<LedgerError> for ActionError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Rejected(reason) => ActionError::RemoteRejected(reason),
            LedgerError::Unavailable(reason) => ActionError::RemoteUnavailable(reason),
        }
    }
}

/// Parameters for listing a new item.
#[derive(Clone, Debug, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub image_url: String,
    pub reserve_price: Amount,
    pub max_multiplier: u8,
}

#[derive(Copy, Clone)]
enum Role {
    Owner,
    Bidder,
}

pub struct Dispatcher {
    identity: ClientId,
    store: SharedItemStore,
    ledger: SharedLedgerClient,
}

pub type SharedDispatcher = Arc<Dispatcher>;

impl Dispatcher {
    pub fn new(
        identity: impl Into<ClientId>,
        store: SharedItemStore,
        ledger: SharedLedgerClient,
    ) -> Self {
        Self {
            identity: identity.into(),
            store,
            ledger,
        }
    }

    pub fn new_shared(
        identity: impl Into<ClientId>,
        store: SharedItemStore,
        ledger: SharedLedgerClient,
    ) -> SharedDispatcher {
        Arc::new(Self::new(identity, store, ledger))
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Ordered read-only view of the store for this identity.
    pub fn snapshot(&self) -> Vec<ItemView> {
        self.store.snapshot(&self.identity)
    }

    /// Current asking price of an item in its open phase.
    pub fn current_price(&self, item: ItemId) -> Result<Amount, ActionError> {
        Ok(self.ledger.fetch_current_price(item)?)
    }

    /// List a new item. No optimistic insert: the ledger assigns the id, so
    /// the local copy appears when the `ItemAdded` notification arrives.
    pub fn submit_item(&self, item: NewItem) -> Result<Receipt, ActionError> {
        debug!(name = %item.name, "submitting new item");
        Ok(self.ledger.invoke(LedgerCall::CreateItem {
            name: item.name,
            image_url: item.image_url,
            reserve_price: item.reserve_price,
            max_multiplier: item.max_multiplier,
        })?)
    }

    pub fn start_secret_bid_phase(&self, item: ItemId) -> Result<Receipt, ActionError> {
        self.require(item, Role::Owner, BidState::NotStarted)?;
        Ok(self.ledger.invoke(LedgerCall::StartSecretBidPhase { item })?)
    }

    /// The one optimistic mutation in the system: the submitted flag is
    /// latched together with the gate check, before the call goes out, so a
    /// repeat during network latency cannot produce a second bid. A ledger
    /// failure afterwards does not unlatch it: blocking a rare retry is
    /// preferred over reopening the resubmission window.
    pub fn submit_secret_bid(&self, item: ItemId, amount: Amount) -> Result<Receipt, ActionError> {
        self.store
            .modify(item, |it| {
                Self::check(it, &self.identity, Role::Bidder, BidState::SecretBid)?;
                if it.has_submitted_secret_bid {
                    return Err(Ineligibility::AlreadySubmitted);
                }
                it.has_submitted_secret_bid = true;
                Ok(())
            })
            .ok_or(Ineligibility::UnknownItem(item))??;
        debug!(item, amount, "secret bid latched, submitting");
        Ok(self.ledger.invoke(LedgerCall::SubmitSecretBid { item, amount })?)
    }

    pub fn end_secret_bid_start_open_bid(&self, item: ItemId) -> Result<Receipt, ActionError> {
        self.require(item, Role::Owner, BidState::SecretBid)?;
        Ok(self.ledger.invoke(LedgerCall::StartOpenBidPhase { item })?)
    }

    pub fn settle_open_bid(&self, item: ItemId, amount: Amount) -> Result<Receipt, ActionError> {
        self.store
            .read(item, |it| {
                Self::check(it, &self.identity, Role::Bidder, BidState::OpenBid)?;
                if !it.has_submitted_secret_bid {
                    return Err(Ineligibility::NotAParticipant);
                }
                Ok(())
            })
            .ok_or(Ineligibility::UnknownItem(item))??;
        Ok(self.ledger.invoke(LedgerCall::SettleOpenBid { item, amount })?)
    }

    pub fn end_open_bid(&self, item: ItemId) -> Result<Receipt, ActionError> {
        self.require(item, Role::Owner, BidState::OpenBid)?;
        Ok(self.ledger.invoke(LedgerCall::EndOpenBid { item })?)
    }

    fn require(&self, item: ItemId, role: Role, expected: BidState) -> Result<(), ActionError> {
        self.store
            .read(item, |it| Self::check(it, &self.identity, role, expected))
            .ok_or(Ineligibility::UnknownItem(item))??;
        Ok(())
    }

    fn check(
        item: &AuctionItem,
        viewer: &str,
        role: Role,
        expected: BidState,
    ) -> Result<(), Ineligibility> {
        match role {
            Role::Owner if !item.is_owned_by(viewer) => return Err(Ineligibility::OwnerOnly),
            Role::Bidder if item.is_owned_by(viewer) => return Err(Ineligibility::OwnerMayNotBid),
            _ => {}
        }
        if item.bid_state != expected {
            return Err(Ineligibility::WrongPhase {
                expected,
                actual: item.bid_state,
            });
        }
        Ok(())
    }
}
