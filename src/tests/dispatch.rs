use crate::auction::BidState;
use crate::service::dispatch::{ActionError, Dispatcher, Ineligibility, NewItem};
use crate::service::ledger::{InMemoryLedger, LedgerCall, LedgerClient, SharedLedgerClient};
use crate::store::{ItemStore, SharedItemStore};
use anyhow::Result;

struct Participant {
    store: SharedItemStore,
    client: SharedLedgerClient,
    dispatcher: Dispatcher,
}

impl Participant {
    fn new(ledger: &InMemoryLedger, identity: &str) -> Self {
        let store = ItemStore::new_shared();
        let client = ledger.client(identity);
        let dispatcher = Dispatcher::new(identity, store.clone(), client.clone());
        Self {
            store,
            client,
            dispatcher,
        }
    }

    /// Pull the ledger's full state into the local store.
    fn refresh(&self) -> Result<()> {
        self.store.install_base(self.client.fetch_all_items()?);
        Ok(())
    }
}

fn listing(name: &str) -> NewItem {
    NewItem {
        name: name.to_owned(),
        image_url: format!("ipfs://{name}"),
        reserve_price: 100,
        max_multiplier: 5,
    }
}

fn submit_secret_bid_calls(ledger: &InMemoryLedger) -> usize {
    ledger
        .calls()
        .iter()
        .filter(|call| matches!(call, LedgerCall::SubmitSecretBid { .. }))
        .count()
}

#[test]
fn submit_item_does_not_insert_locally() -> Result<()> {
    let ledger = InMemoryLedger::new();
    let alice = Participant::new(&ledger, "alice");

    alice.dispatcher.submit_item(listing("vase"))?;

    // the ledger assigns the id; the local copy appears with the notification
    assert!(alice.store.is_empty());

    alice.refresh()?;
    let snapshot = alice.dispatcher.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].is_owner);
    assert_eq!(snapshot[0].bid_state, BidState::NotStarted);

    Ok(())
}

#[test]
fn phase_actions_are_owner_gated() -> Result<()> {
    let ledger = InMemoryLedger::new();
    let alice = Participant::new(&ledger, "alice");
    let bob = Participant::new(&ledger, "bob");

    alice.dispatcher.submit_item(listing("vase"))?;
    alice.refresh()?;
    bob.refresh()?;

    assert_eq!(
        bob.dispatcher.start_secret_bid_phase(1),
        Err(ActionError::NotEligible(Ineligibility::OwnerOnly))
    );
    assert_eq!(
        alice.dispatcher.submit_secret_bid(1, 10),
        Err(ActionError::NotEligible(Ineligibility::OwnerMayNotBid))
    );
    assert_eq!(
        alice.dispatcher.end_open_bid(1),
        Err(ActionError::NotEligible(Ineligibility::WrongPhase {
            expected: BidState::OpenBid,
            actual: BidState::NotStarted,
        }))
    );

    // none of the refused actions reached the ledger
    assert_eq!(ledger.calls().len(), 1);

    Ok(())
}

#[test]
fn unknown_item_is_refused_without_ledger_traffic() {
    let ledger = InMemoryLedger::new();
    let bob = Participant::new(&ledger, "bob");

    assert_eq!(
        bob.dispatcher.start_secret_bid_phase(42),
        Err(ActionError::NotEligible(Ineligibility::UnknownItem(42)))
    );
    assert!(ledger.calls().is_empty());
}

#[test]
fn second_secret_bid_is_blocked_locally() -> Result<()> {
    let ledger = InMemoryLedger::new();
    let alice = Participant::new(&ledger, "alice");
    let bob = Participant::new(&ledger, "bob");

    alice.dispatcher.submit_item(listing("vase"))?;
    alice.refresh()?;
    alice.dispatcher.start_secret_bid_phase(1)?;
    alice.refresh()?;
    bob.refresh()?;

    bob.dispatcher.submit_secret_bid(1, 500)?;

    // latched immediately, ahead of any ledger confirmation
    assert!(bob.store.get(1).unwrap().has_submitted_secret_bid);

    assert_eq!(
        bob.dispatcher.submit_secret_bid(1, 700),
        Err(ActionError::NotEligible(Ineligibility::AlreadySubmitted))
    );
    assert_eq!(submit_secret_bid_calls(&ledger), 1);

    Ok(())
}

#[test]
fn settling_requires_secret_bid_participation() -> Result<()> {
    let ledger = InMemoryLedger::new();
    let alice = Participant::new(&ledger, "alice");
    let carol = Participant::new(&ledger, "carol");

    alice.dispatcher.submit_item(listing("vase"))?;
    alice.refresh()?;
    alice.dispatcher.start_secret_bid_phase(1)?;
    alice.refresh()?;
    alice.dispatcher.end_secret_bid_start_open_bid(1)?;
    alice.refresh()?;
    carol.refresh()?;

    assert_eq!(carol.store.get(1).unwrap().bid_state, BidState::OpenBid);
    assert_eq!(
        carol.dispatcher.settle_open_bid(1, 1_000),
        Err(ActionError::NotEligible(Ineligibility::NotAParticipant))
    );
    assert!(!ledger
        .calls()
        .iter()
        .any(|call| matches!(call, LedgerCall::SettleOpenBid { .. })));

    Ok(())
}

#[test]
fn optimistic_latch_survives_remote_rejection() -> Result<()> {
    let ledger = InMemoryLedger::new();
    let alice = Participant::new(&ledger, "alice");
    let bob = Participant::new(&ledger, "bob");

    alice.dispatcher.submit_item(listing("vase"))?;
    alice.refresh()?;
    alice.dispatcher.start_secret_bid_phase(1)?;
    alice.refresh()?;
    bob.refresh()?;

    // the ledger moves on while bob's view is stale
    alice.dispatcher.end_secret_bid_start_open_bid(1)?;

    let outcome = bob.dispatcher.submit_secret_bid(1, 500);
    assert!(matches!(outcome, Err(ActionError::RemoteRejected(_))));

    // the latch is deliberately not rolled back
    assert!(bob.store.get(1).unwrap().has_submitted_secret_bid);

    Ok(())
}

#[test]
fn settlement_transfers_ownership() -> Result<()> {
    let ledger = InMemoryLedger::new();
    let alice = Participant::new(&ledger, "alice");
    let bob = Participant::new(&ledger, "bob");

    alice.dispatcher.submit_item(listing("vase"))?;
    alice.refresh()?;
    alice.dispatcher.start_secret_bid_phase(1)?;
    alice.refresh()?;
    bob.refresh()?;
    bob.dispatcher.submit_secret_bid(1, 450)?;
    alice.dispatcher.end_secret_bid_start_open_bid(1)?;
    alice.refresh()?;
    bob.refresh()?;

    // reserve 100, multiplier 5: the quote starts at the highest secret bid
    let price = bob.dispatcher.current_price(1)?;
    assert!((100..=450).contains(&price));

    bob.dispatcher.settle_open_bid(1, 450)?;
    bob.refresh()?;

    let item = bob.store.get(1).unwrap();
    assert_eq!(item.owner, "bob");
    assert_eq!(item.bid_state, BidState::Ended);
    assert!(bob.dispatcher.snapshot()[0].is_owner);

    Ok(())
}
