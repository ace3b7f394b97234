use crate::auction::{Amount, BidState, ClientId, ItemId};

/// The notification kinds the ledger emits.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    ItemAdded,
    SecretBidPhaseStarted,
    OpenBidPhaseStarted,
    AuctionCompleted,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [
        NotificationKind::ItemAdded,
        NotificationKind::SecretBidPhaseStarted,
        NotificationKind::OpenBidPhaseStarted,
        NotificationKind::AuctionCompleted,
    ];
}

/// Ledger-side record of an item, as returned by the full-state query and
/// carried by `ItemAdded`. `has_submitted_secret_bid` is reported per
/// calling identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemRecord {
    pub id: ItemId,
    pub name: String,
    pub image_url: String,
    pub owner: ClientId,
    pub bid_state: BidState,
    pub has_submitted_secret_bid: bool,
}

/// A decoded state-transition notification, identifiers already normalized
/// to the integer id domain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    ItemAdded(ItemRecord),
    SecretBidPhaseStarted {
        item: ItemId,
    },
    OpenBidPhaseStarted {
        item: ItemId,
        start_time: u64,
        start_amount: Amount,
    },
    AuctionCompleted {
        item: ItemId,
        message: String,
    },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::ItemAdded(_) => NotificationKind::ItemAdded,
            Notification::SecretBidPhaseStarted { .. } => NotificationKind::SecretBidPhaseStarted,
            Notification::OpenBidPhaseStarted { .. } => NotificationKind::OpenBidPhaseStarted,
            Notification::AuctionCompleted { .. } => NotificationKind::AuctionCompleted,
        }
    }

    pub fn item(&self) -> ItemId {
        match self {
            Notification::ItemAdded(record) => record.id,
            Notification::SecretBidPhaseStarted { item }
            | Notification::OpenBidPhaseStarted { item, .. }
            | Notification::AuctionCompleted { item, .. } => *item,
        }
    }
}
