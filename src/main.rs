mod auction;
mod event;
mod reducer;
mod service;
mod store;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

// The loopback ledger below stands in for the real transport, so the whole
// engine can be driven end to end from the HTTP surface of a single process.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let identity = std::env::var("PADDLE_IDENTITY").unwrap_or_else(|_| "0xc0ffee".to_owned());
    let listen: SocketAddr = std::env::var("PADDLE_LISTEN")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_owned())
        .parse()
        .context("invalid PADDLE_LISTEN address")?;

    let ledger = service::InMemoryLedger::new();
    let ledger_client = ledger.client(identity.clone());

    let store = store::ItemStore::new_shared();
    let dispatcher = service::Dispatcher::new_shared(identity, store.clone(), ledger_client.clone());

    let svc_ctr = service::ServiceControl::new();

    ctrlc::set_handler({
        let svc_ctr = svc_ctr.clone();
        move || {
            eprintln!("Stopping all services...");
            svc_ctr.stop_all();
        }
    })?;

    info!(%listen, "starting");
    for handle in vec![
        svc_ctr.spawn_loop(service::SyncService::new(store, ledger_client)),
        svc_ctr.spawn_loop(service::Ui::new(listen, dispatcher)?),
    ] {
        handle.join()?
    }

    Ok(())
}

#[cfg(test)]
mod tests;
