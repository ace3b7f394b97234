//! The ledger port: the opaque client capability the engine consumes.
//!
//! Calls block until the ledger has accepted them for processing; the state
//! change itself always arrives later, as a notification. Notification
//! payloads are delivered in the ledger's native wire form and normalized
//! here before they reach the reducer.

use crate::auction::{Amount, BidState, ItemId};
use crate::event::{ItemRecord, Notification, NotificationKind};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod in_memory;
pub use self::in_memory::*;

/// Errors surfaced by the ledger transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The call reached the ledger and was refused.
    #[error("ledger rejected the call: {0}")]
    Rejected(String),
    /// The call could not complete.
    #[error("ledger unreachable: {0}")]
    Unavailable(String),
}

/// Proof that a state-changing call was accepted for processing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt(pub String);

/// The state-changing calls the ledger accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerCall {
    CreateItem {
        name: String,
        image_url: String,
        reserve_price: Amount,
        max_multiplier: u8,
    },
    StartSecretBidPhase { item: ItemId },
    SubmitSecretBid { item: ItemId, amount: Amount },
    StartOpenBidPhase { item: ItemId },
    SettleOpenBid { item: ItemId, amount: Amount },
    EndOpenBid { item: ItemId },
}

pub trait LedgerClient: Send + Sync {
    /// Submit a state-changing call, bound to this client's identity.
    fn invoke(&self, call: LedgerCall) -> Result<Receipt, LedgerError>;

    fn fetch_all_items(&self) -> Result<Vec<ItemRecord>, LedgerError>;

    /// Current asking price of an item in its open phase.
    fn fetch_current_price(&self, item: ItemId) -> Result<Amount, LedgerError>;

    /// Open one notification feed covering the given kinds, each kind
    /// subscribed exactly once. Dropping the handle releases the
    /// subscriptions.
    fn subscribe(
        &self,
        kinds: &[NotificationKind],
    ) -> Result<Box<dyn NotificationFeed>, LedgerError>;
}

pub type SharedLedgerClient = Arc<dyn LedgerClient>;

pub trait NotificationFeed: Send {
    /// Next buffered notification, blocking up to `timeout` when the feed
    /// is empty. `Ok(None)` on timeout.
    fn poll(&mut self, timeout: Option<Duration>) -> Result<Option<RawNotification>, LedgerError>;
}

/// A notification as delivered by the ledger, numeric fields still in the
/// ledger's hex-word encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawNotification {
    ItemAdded(RawItemRecord),
    SecretBidPhaseStarted {
        item: String,
    },
    OpenBidPhaseStarted {
        item: String,
        start_time: String,
        start_amount: String,
    },
    AuctionCompleted {
        item: String,
        message: String,
    },
}

/// Wire form of an item record. Identity fields stay in the string domain;
/// ids and phase codes are hex words.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawItemRecord {
    pub id: String,
    pub name: String,
    pub image_url: String,
    pub owner: String,
    pub bid_state: String,
    pub has_submitted_secret_bid: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not a hex word: {0:?}")]
    BadHexWord(String),
    #[error("unknown bid state code: {0}")]
    UnknownBidState(u64),
}

/// Parse a 0x-prefixed hex word into the integer domain.
pub fn decode_word(raw: &str) -> Result<u64, DecodeError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| DecodeError::BadHexWord(raw.to_owned()))?;
    u64::from_str_radix(digits, 16).map_err(|_| DecodeError::BadHexWord(raw.to_owned()))
}

pub fn encode_word(value: u64) -> String {
    format!("{value:#x}")
}

fn decode_bid_state(raw: &str) -> Result<BidState, DecodeError> {
    let code = decode_word(raw)?;
    u8::try_from(code)
        .ok()
        .and_then(BidState::from_code)
        .ok_or(DecodeError::UnknownBidState(code))
}

impl RawNotification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            RawNotification::ItemAdded(_) => NotificationKind::ItemAdded,
            RawNotification::SecretBidPhaseStarted { .. } => {
                NotificationKind::SecretBidPhaseStarted
            }
            RawNotification::OpenBidPhaseStarted { .. } => NotificationKind::OpenBidPhaseStarted,
            RawNotification::AuctionCompleted { .. } => NotificationKind::AuctionCompleted,
        }
    }

    /// Normalize the payload into the integer id domain the reducer works in.
    pub fn decode(&self) -> Result<Notification, DecodeError> {
        Ok(match self {
            RawNotification::ItemAdded(raw) => Notification::ItemAdded(ItemRecord {
                id: decode_word(&raw.id)?,
                name: raw.name.clone(),
                image_url: raw.image_url.clone(),
                owner: raw.owner.clone(),
                bid_state: decode_bid_state(&raw.bid_state)?,
                has_submitted_secret_bid: raw.has_submitted_secret_bid,
            }),
            RawNotification::SecretBidPhaseStarted { item } => {
                Notification::SecretBidPhaseStarted {
                    item: decode_word(item)?,
                }
            }
            RawNotification::OpenBidPhaseStarted {
                item,
                start_time,
                start_amount,
            } => Notification::OpenBidPhaseStarted {
                item: decode_word(item)?,
                start_time: decode_word(start_time)?,
                start_amount: decode_word(start_amount)?,
            },
            RawNotification::AuctionCompleted { item, message } => {
                Notification::AuctionCompleted {
                    item: decode_word(item)?,
                    message: message.clone(),
                }
            }
        })
    }
}
