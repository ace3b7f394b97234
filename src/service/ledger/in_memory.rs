//! Fake in-memory ledger.
//!
//! Behaves like the real thing within one process: enforces the phase and
//! role rules authoritatively, assigns ids, computes the falling open-phase
//! price, settles ownership, and fans raw notifications out to every live
//! subscription. Useful for unit tests, and wired by `main` as the
//! loopback transport.

use super::*;
use crate::auction::{Amount, BidState, ClientId, ItemId};
use crate::event::{ItemRecord, NotificationKind};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Seconds the open-phase price takes to fall from its start amount down to
/// the reserve.
const DECAY_SECONDS: u64 = 60;

struct LedgerItem {
    id: ItemId,
    name: String,
    image_url: String,
    owner: ClientId,
    bid_state: BidState,
    reserve_price: Amount,
    max_multiplier: u8,
    secret_bids: BTreeMap<ClientId, Amount>,
    start_time: u64,
    start_amount: Amount,
}

impl LedgerItem {
    fn record_for(&self, viewer: &str) -> ItemRecord {
        ItemRecord {
            id: self.id,
            name: self.name.clone(),
            image_url: self.image_url.clone(),
            owner: self.owner.clone(),
            bid_state: self.bid_state,
            has_submitted_secret_bid: self.secret_bids.contains_key(viewer),
        }
    }

    fn current_price(&self, now: u64) -> Amount {
        let elapsed = now.saturating_sub(self.start_time).min(DECAY_SECONDS);
        let span = u128::from(self.start_amount.saturating_sub(self.reserve_price));
        let decayed = span * u128::from(elapsed) / u128::from(DECAY_SECONDS);
        self.start_amount - decayed as Amount
    }
}

struct SubscriptionQueue {
    kinds: Vec<NotificationKind>,
    queue: VecDeque<RawNotification>,
}

#[derive(Default)]
struct LedgerState {
    items: BTreeMap<ItemId, LedgerItem>,
    next_id: ItemId,
    next_receipt: u64,
    subscriptions: BTreeMap<u64, SubscriptionQueue>,
    next_subscription: u64,
    calls: Vec<LedgerCall>,
}

impl LedgerState {
    fn emit(&mut self, raw: RawNotification) {
        let kind = raw.kind();
        for subscription in self.subscriptions.values_mut() {
            if subscription.kinds.contains(&kind) {
                subscription.queue.push_back(raw.clone());
            }
        }
    }

    fn item_mut(&mut self, id: ItemId) -> Result<&mut LedgerItem, LedgerError> {
        self.items
            .get_mut(&id)
            .ok_or_else(|| LedgerError::Rejected(format!("unknown item {id}")))
    }

    fn receipt(&mut self) -> Receipt {
        self.next_receipt += 1;
        Receipt(format!("0x{:016x}", self.next_receipt))
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<LedgerState>,
    wakeup: Condvar,
}

pub struct InMemoryLedger {
    shared: Arc<Shared>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
        }
    }

    /// A ledger client bound to the given signing identity.
    pub fn client(&self, identity: impl Into<ClientId>) -> SharedLedgerClient {
        Arc::new(InMemoryLedgerClient {
            shared: self.shared.clone(),
            identity: identity.into(),
        })
    }

    /// Every call submitted so far, accepted or refused. Test instrumentation.
    pub fn calls(&self) -> Vec<LedgerCall> {
        self.shared.state.lock().calls.clone()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InMemoryLedgerClient {
    shared: Arc<Shared>,
    identity: ClientId,
}

impl InMemoryLedgerClient {
    fn require_owner(item: &LedgerItem, caller: &str) -> Result<(), LedgerError> {
        if item.owner != caller {
            return Err(LedgerError::Rejected(format!(
                "only the owner of item {} may do this",
                item.id
            )));
        }
        Ok(())
    }

    fn require_phase(item: &LedgerItem, expected: BidState) -> Result<(), LedgerError> {
        if item.bid_state != expected {
            return Err(LedgerError::Rejected(format!(
                "item {} is in the {:?} phase",
                item.id, item.bid_state
            )));
        }
        Ok(())
    }
}

impl LedgerClient for InMemoryLedgerClient {
    fn invoke(&self, call: LedgerCall) -> Result<Receipt, LedgerError> {
        let mut state = self.shared.state.lock();
        state.calls.push(call.clone());
        debug!(caller = %self.identity, ?call, "ledger call");

        let receipt = state.receipt();
        match call {
            LedgerCall::CreateItem {
                name,
                image_url,
                reserve_price,
                max_multiplier,
            } => {
                if max_multiplier == 0 {
                    return Err(LedgerError::Rejected("multiplier must be positive".into()));
                }
                state.next_id += 1;
                let id = state.next_id;
                let item = LedgerItem {
                    id,
                    name,
                    image_url,
                    owner: self.identity.clone(),
                    bid_state: BidState::NotStarted,
                    reserve_price,
                    max_multiplier,
                    secret_bids: BTreeMap::new(),
                    start_time: 0,
                    start_amount: 0,
                };
                let raw = RawItemRecord {
                    id: encode_word(id),
                    name: item.name.clone(),
                    image_url: item.image_url.clone(),
                    owner: item.owner.clone(),
                    bid_state: encode_word(u64::from(item.bid_state.code())),
                    has_submitted_secret_bid: false,
                };
                state.items.insert(id, item);
                state.emit(RawNotification::ItemAdded(raw));
            }
            LedgerCall::StartSecretBidPhase { item } => {
                let entry = state.item_mut(item)?;
                Self::require_owner(entry, &self.identity)?;
                Self::require_phase(entry, BidState::NotStarted)?;
                entry.bid_state = BidState::SecretBid;
                state.emit(RawNotification::SecretBidPhaseStarted {
                    item: encode_word(item),
                });
            }
            LedgerCall::SubmitSecretBid { item, amount } => {
                let entry = state.item_mut(item)?;
                if entry.owner == self.identity {
                    return Err(LedgerError::Rejected(
                        "the owner may not bid on their own item".into(),
                    ));
                }
                Self::require_phase(entry, BidState::SecretBid)?;
                if entry.secret_bids.contains_key(&self.identity) {
                    return Err(LedgerError::Rejected(
                        "a secret bid was already recorded for this caller".into(),
                    ));
                }
                if amount == 0 {
                    return Err(LedgerError::Rejected("zero bids are not accepted".into()));
                }
                entry.secret_bids.insert(self.identity.clone(), amount);
            }
            LedgerCall::StartOpenBidPhase { item } => {
                let entry = state.item_mut(item)?;
                Self::require_owner(entry, &self.identity)?;
                Self::require_phase(entry, BidState::SecretBid)?;
                // The open phase starts at the highest secret bid, clamped
                // between the reserve and reserve * multiplier.
                let ceiling = entry
                    .reserve_price
                    .saturating_mul(u64::from(entry.max_multiplier));
                let highest = entry.secret_bids.values().copied().max().unwrap_or(0);
                entry.start_amount = highest.clamp(entry.reserve_price, ceiling);
                entry.start_time = now_secs();
                entry.bid_state = BidState::OpenBid;
                let raw = RawNotification::OpenBidPhaseStarted {
                    item: encode_word(item),
                    start_time: encode_word(entry.start_time),
                    start_amount: encode_word(entry.start_amount),
                };
                state.emit(raw);
            }
            LedgerCall::SettleOpenBid { item, amount } => {
                let entry = state.item_mut(item)?;
                if entry.owner == self.identity {
                    return Err(LedgerError::Rejected(
                        "the owner may not settle their own item".into(),
                    ));
                }
                Self::require_phase(entry, BidState::OpenBid)?;
                if !entry.secret_bids.contains_key(&self.identity) {
                    return Err(LedgerError::Rejected(
                        "only secret-bid participants may settle".into(),
                    ));
                }
                let price = entry.current_price(now_secs());
                if amount < price {
                    return Err(LedgerError::Rejected(format!(
                        "bid {amount} is below the current price {price}"
                    )));
                }
                entry.owner = self.identity.clone();
                entry.bid_state = BidState::Ended;
                let message = format!("sold to {} for {amount}", self.identity);
                state.emit(RawNotification::AuctionCompleted {
                    item: encode_word(item),
                    message,
                });
            }
            LedgerCall::EndOpenBid { item } => {
                let entry = state.item_mut(item)?;
                Self::require_owner(entry, &self.identity)?;
                Self::require_phase(entry, BidState::OpenBid)?;
                entry.bid_state = BidState::Ended;
                state.emit(RawNotification::AuctionCompleted {
                    item: encode_word(item),
                    message: "closed by the owner without a sale".to_owned(),
                });
            }
        }

        self.shared.wakeup.notify_all();
        Ok(receipt)
    }

    fn fetch_all_items(&self) -> Result<Vec<ItemRecord>, LedgerError> {
        let state = self.shared.state.lock();
        Ok(state
            .items
            .values()
            .map(|item| item.record_for(&self.identity))
            .collect())
    }

    fn fetch_current_price(&self, item: ItemId) -> Result<Amount, LedgerError> {
        let state = self.shared.state.lock();
        let entry = state
            .items
            .get(&item)
            .ok_or_else(|| LedgerError::Rejected(format!("unknown item {item}")))?;
        if entry.bid_state != BidState::OpenBid {
            return Err(LedgerError::Rejected(
                "the price is only quoted during the open phase".into(),
            ));
        }
        Ok(entry.current_price(now_secs()))
    }

    fn subscribe(
        &self,
        kinds: &[NotificationKind],
    ) -> Result<Box<dyn NotificationFeed>, LedgerError> {
        let mut state = self.shared.state.lock();
        state.next_subscription += 1;
        let id = state.next_subscription;
        state.subscriptions.insert(
            id,
            SubscriptionQueue {
                kinds: kinds.to_vec(),
                queue: VecDeque::new(),
            },
        );
        Ok(Box::new(InMemoryFeed {
            shared: self.shared.clone(),
            id,
        }))
    }
}

struct InMemoryFeed {
    shared: Arc<Shared>,
    id: u64,
}

impl NotificationFeed for InMemoryFeed {
    fn poll(&mut self, timeout: Option<Duration>) -> Result<Option<RawNotification>, LedgerError> {
        let mut state = self.shared.state.lock();
        let empty = state
            .subscriptions
            .get(&self.id)
            .map(|s| s.queue.is_empty())
            .unwrap_or(true);
        if empty {
            match timeout {
                Some(timeout) => {
                    self.shared.wakeup.wait_for(&mut state, timeout);
                }
                None => self.shared.wakeup.wait(&mut state),
            }
        }
        let subscription = state
            .subscriptions
            .get_mut(&self.id)
            .ok_or_else(|| LedgerError::Unavailable("subscription released".into()))?;
        Ok(subscription.queue.pop_front())
    }
}

impl Drop for InMemoryFeed {
    fn drop(&mut self) {
        self.shared.state.lock().subscriptions.remove(&self.id);
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
