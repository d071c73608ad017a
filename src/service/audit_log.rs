//! Audit log writer: persists every ledger event published on the bus.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;

use crate::domain::EventBus;
use crate::persistence::InventoryStore;

/// Appends bus events to the store's audit log until shutdown.
///
/// Subscribes before returning, so no event published after this call is
/// missed. Failed appends and lagged receivers are logged and skipped.
pub fn spawn_audit_writer(
    store: Arc<dyn InventoryStore>,
    event_bus: &EventBus,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                received = rx.recv() => match received {
                    Ok(event) => {
                        if let Err(e) = store.append_ledger_event(&event).await {
                            tracing::warn!(
                                event_type = event.event_type_str(),
                                error = %e,
                                "failed to append ledger event"
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "audit writer lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        tracing::info!("audit writer stopped");
    })
}
