use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ItemId = u64;
pub type Amount = u64;
pub type ClientId = String;
pub type ClientIdRef<'a> = &'a str;

/// Lifecycle phase of a single auction item.
///
/// Phases only ever move forward: `NotStarted → SecretBid → OpenBid → Ended`.
/// `Ended` is terminal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidState {
    NotStarted,
    SecretBid,
    OpenBid,
    Ended,
}

impl BidState {
    /// Ledger-native numeric code of this phase.
    pub fn code(self) -> u8 {
        match self {
            BidState::NotStarted => 0,
            BidState::SecretBid => 1,
            BidState::OpenBid => 2,
            BidState::Ended => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => BidState::NotStarted,
            1 => BidState::SecretBid,
            2 => BidState::OpenBid,
            3 => BidState::Ended,
            _ => return None,
        })
    }

    /// Validate a proposed phase against the current one.
    ///
    /// Every notification names exactly one next phase, so the only
    /// acceptable proposal is the direct successor. A proposal at or below
    /// the current phase is a duplicate or reordered delivery; a proposal
    /// further ahead means a notification was lost and the local view has
    /// to be rebuilt from the ledger.
    pub fn advance(self, proposed: BidState) -> Result<BidState, TransitionError> {
        if proposed <= self {
            return Err(TransitionError::Stale {
                current: self,
                proposed,
            });
        }
        if proposed.code() - self.code() != 1 {
            return Err(TransitionError::Gap {
                current: self,
                proposed,
            });
        }
        Ok(proposed)
    }
}

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("{proposed:?} does not advance {current:?}")]
    Stale {
        current: BidState,
        proposed: BidState,
    },
    #[error("{proposed:?} skips phases after {current:?}")]
    Gap {
        current: BidState,
        proposed: BidState,
    },
}

/// Pricing terms of the open (falling-price) phase, as announced by the
/// ledger. The current asking price itself is ledger-computed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBidTerms {
    pub start_time: u64,
    pub start_amount: Amount,
}

/// One auction item as tracked by the local read model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuctionItem {
    pub id: ItemId,
    pub name: String,
    pub image_url: String,
    pub owner: ClientId,
    pub bid_state: BidState,
    /// True once this client has sent a secret bid for the item. Latched
    /// before the ledger confirms and never cleared, so a resubmission
    /// stays blocked even while the call is still in flight.
    pub has_submitted_secret_bid: bool,
    pub open_bid: Option<OpenBidTerms>,
    pub settlement: Option<String>,
}

impl AuctionItem {
    pub fn is_owned_by(&self, viewer: ClientIdRef) -> bool {
        self.owner == viewer
    }
}
