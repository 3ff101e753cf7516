//! Ctrl-C handling: stop dispatching and let in-flight transfers finish.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Cancels `token` on the first ctrl-c. The task ends on its own once
/// `token` is cancelled elsewhere, or can be aborted after the batch.
pub(crate) fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    warn!("interrupt received, finishing in-flight downloads");
                    token.cancel();
                }
            }
        }
    })
}
