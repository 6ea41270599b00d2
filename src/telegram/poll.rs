//! Long-poll update loop.
//!
//! One loop owns the `getUpdates` offset. Each received update is dispatched
//! on its own task so a five-minute conversion never blocks `/status` from
//! another user — per-user exclusivity is the active-task marker's job, not
//! the loop's. Transport errors are logged and retried after a fixed pause;
//! a polling bot that dies on the first network blip is useless.

use crate::error::BotError;
use crate::telegram::api::TelegramApi;
use crate::telegram::handlers::BotHandlers;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Poll for updates and dispatch them until `shutdown` resolves.
pub async fn run_polling<S>(
    api: Arc<TelegramApi>,
    handlers: Arc<BotHandlers>,
    shutdown: S,
) -> Result<(), BotError>
where
    S: Future<Output = ()>,
{
    let mut offset: i64 = 0;
    tokio::pin!(shutdown);

    info!("update loop started");
    loop {
        let batch = tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested; update loop stopping");
                return Ok(());
            }
            batch = api.get_updates(offset) => batch,
        };

        let updates = match batch {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "getUpdates failed; retrying");
                sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            // Advance past this update whether or not dispatch succeeds;
            // redelivering a broken update forever would wedge the loop.
            offset = offset.max(update.update_id + 1);
            debug!(update_id = update.update_id, "dispatching update");

            let handlers = Arc::clone(&handlers);
            tokio::spawn(async move {
                handlers.handle_update(update).await;
            });
        }
    }
}
