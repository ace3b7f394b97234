use crate::auction::BidState;
use crate::event::NotificationKind;
use crate::reducer::{self, Applied};
use crate::service::ledger::{encode_word, InMemoryLedger, LedgerCall, LedgerClient, RawNotification};
use crate::service::sync::SyncService;
use crate::service::LoopService;
use crate::store::ItemStore;
use anyhow::Result;
use std::time::Duration;

fn create_item(ledger: &InMemoryLedger, owner: &str) -> Result<()> {
    ledger.client(owner).invoke(LedgerCall::CreateItem {
        name: "vase".to_owned(),
        image_url: "ipfs://vase".to_owned(),
        reserve_price: 100,
        max_multiplier: 5,
    })?;
    Ok(())
}

#[test]
fn base_snapshot_absorbs_buffered_added_notification() -> Result<()> {
    let ledger = InMemoryLedger::new();
    let bob = ledger.client("bob");

    // subscribe first, as the bootstrap does...
    let mut feed = bob.subscribe(&NotificationKind::ALL)?;

    // ...then an item lands while the full-state query is "in flight"
    create_item(&ledger, "alice")?;

    let store = ItemStore::new_shared();
    store.install_base(bob.fetch_all_items()?);
    assert_eq!(store.len(), 1);

    // replaying the buffered notification must not double-insert
    let mut replayed = 0;
    while let Some(raw) = feed.poll(Some(Duration::ZERO))? {
        assert_eq!(
            reducer::apply(&store, raw.decode()?),
            Ok(Applied::AlreadyKnown)
        );
        replayed += 1;
    }
    assert_eq!(replayed, 1);
    assert_eq!(store.len(), 1);

    Ok(())
}

#[test]
fn live_notifications_flow_into_the_store() -> Result<()> {
    let ledger = InMemoryLedger::new();
    let store = ItemStore::new_shared();
    let mut sync = SyncService::new(store.clone(), ledger.client("bob"));

    // first iteration bootstraps against an empty ledger
    sync.run_iteration()?;
    assert!(store.is_empty());

    create_item(&ledger, "alice")?;
    sync.run_iteration()?;
    assert_eq!(store.get(1).unwrap().bid_state, BidState::NotStarted);

    ledger
        .client("alice")
        .invoke(LedgerCall::StartSecretBidPhase { item: 1 })?;
    sync.run_iteration()?;
    assert_eq!(store.get(1).unwrap().bid_state, BidState::SecretBid);

    Ok(())
}

#[test]
fn malformed_notification_is_dropped() -> Result<()> {
    let ledger = InMemoryLedger::new();
    let store = ItemStore::new_shared();
    let mut sync = SyncService::new(store.clone(), ledger.client("bob"));
    sync.run_iteration()?;

    sync.handle(RawNotification::SecretBidPhaseStarted {
        item: "banana".to_owned(),
    });

    assert!(store.is_empty());
    Ok(())
}

#[test]
fn sequence_gap_forces_resynchronization() -> Result<()> {
    let ledger = InMemoryLedger::new();
    let alice = ledger.client("alice");
    let store = ItemStore::new_shared();
    let mut sync = SyncService::new(store.clone(), ledger.client("bob"));

    create_item(&ledger, "alice")?;
    sync.run_iteration()?; // bootstrap: item known, NotStarted
    assert_eq!(store.get(1).unwrap().bid_state, BidState::NotStarted);

    // the ledger advances two phases; nothing polled yet
    alice.invoke(LedgerCall::StartSecretBidPhase { item: 1 })?;
    alice.invoke(LedgerCall::StartOpenBidPhase { item: 1 })?;

    // a delivery that skips the secret phase entirely
    sync.handle(RawNotification::OpenBidPhaseStarted {
        item: encode_word(1),
        start_time: encode_word(0),
        start_amount: encode_word(500),
    });

    // the gap triggered a full-state reload instead of a silent skip
    assert_eq!(store.get(1).unwrap().bid_state, BidState::OpenBid);

    // the two queued transitions now replay as stale no-ops
    sync.run_iteration()?;
    sync.run_iteration()?;
    assert_eq!(store.get(1).unwrap().bid_state, BidState::OpenBid);

    Ok(())
}
