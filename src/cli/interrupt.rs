//! Ctrl-C handling: the first interrupt cancels the run, the second exits

use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Exit code used when a second interrupt forces the process down
pub const FORCED_EXIT_CODE: i32 = 130;

/// Forward interrupts from `signals` to the cancellation channel
///
/// Returns `true` once a second interrupt arrives, `false` if the signal
/// source goes away first.
pub async fn relay_interrupts(
    mut signals: mpsc::UnboundedReceiver<()>,
    cancel: watch::Sender<bool>,
) -> bool {
    if signals.recv().await.is_none() {
        return false;
    }
    warn!("Interrupt received, cancelling the current step; interrupt again to exit");
    let _ = cancel.send(true);

    signals.recv().await.is_some()
}

/// Install the Ctrl-C listener and return the cancellation receiver
pub fn listen_for_interrupts() -> watch::Receiver<bool> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if signal_tx.send(()).is_err() {
                break;
            }
        }
    });
    tokio::spawn(async move {
        if relay_interrupts(signal_rx, cancel_tx).await {
            eprintln!("Interrupted again, exiting without waiting for cleanup");
            std::process::exit(FORCED_EXIT_CODE);
        }
    });

    cancel_rx
}
