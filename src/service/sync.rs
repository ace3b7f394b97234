//! The subscription manager: keeps the item store converged with the
//! ledger's notification stream.
//!
//! Startup subscribes before loading the base snapshot, so nothing emitted
//! while the full-state query runs can be lost; whatever the feed buffered
//! in that window is replayed in arrival order by the normal poll loop, and
//! the reducer's duplicate handling keeps the replay from double-inserting.

use crate::event::NotificationKind;
use crate::reducer::{self, ReduceError};
use crate::service::ledger::{
    LedgerError, NotificationFeed, RawNotification, SharedLedgerClient,
};
use crate::service::LoopService;
use crate::store::SharedItemStore;
use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info, warn};

const POLL_TIMEOUT: Duration = Duration::from_secs(1);
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

pub struct SyncService {
    store: SharedItemStore,
    ledger: SharedLedgerClient,
    feed: Option<Box<dyn NotificationFeed>>,
}

impl SyncService {
    pub fn new(store: SharedItemStore, ledger: SharedLedgerClient) -> Self {
        Self {
            store,
            ledger,
            feed: None,
        }
    }

    /// Subscribe first, then install the base snapshot.
    fn bootstrap(&mut self) -> Result<(), LedgerError> {
        let feed = self.ledger.subscribe(&NotificationKind::ALL)?;
        let records = self.ledger.fetch_all_items()?;
        info!(items = records.len(), "installing base snapshot");
        self.store.install_base(records);
        self.feed = Some(feed);
        Ok(())
    }

    /// Reload the full state over the existing feed, merging the ledger's
    /// records into the store.
    fn resync(&mut self) -> Result<(), LedgerError> {
        let records = self.ledger.fetch_all_items()?;
        info!(items = records.len(), "resynchronized from full state");
        self.store.install_base(records);
        Ok(())
    }

    pub(crate) fn handle(&mut self, raw: RawNotification) {
        let notification = match raw.decode() {
            Ok(notification) => notification,
            Err(err) => {
                warn!(error = %err, "malformed notification dropped");
                return;
            }
        };
        let item = notification.item();
        match reducer::apply(&self.store, notification) {
            Ok(outcome) => debug!(item, ?outcome, "notification applied"),
            Err(ReduceError::SequenceGap {
                item,
                current,
                proposed,
            }) => {
                warn!(item, ?current, ?proposed, "missed a transition, resynchronizing");
                if let Err(err) = self.resync() {
                    // Sever the feed so the next iteration re-bootstraps
                    // from a clean subscribe + load.
                    warn!(error = %err, "resynchronization failed, resubscribing");
                    self.feed = None;
                }
            }
            Err(err) => debug!(item, error = %err, "notification dropped"),
        }
    }
}

impl LoopService for SyncService {
    fn run_iteration(&mut self) -> Result<()> {
        let Some(feed) = self.feed.as_mut() else {
            if let Err(err) = self.bootstrap() {
                warn!(error = %err, "base load failed, will retry");
                std::thread::sleep(RETRY_BACKOFF);
            }
            return Ok(());
        };

        match feed.poll(Some(POLL_TIMEOUT)) {
            Ok(Some(raw)) => self.handle(raw),
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "notification feed failed, resubscribing");
                self.feed = None;
                std::thread::sleep(RETRY_BACKOFF);
            }
        }
        Ok(())
    }
}
