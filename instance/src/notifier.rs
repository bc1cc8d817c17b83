use wire::UPDATE_AVAILABLE_EVENT;

use crate::identity::Identity;
use crate::net::{send_payload, ChannelSpace};

/// Tell whichever process holds the default channel that an update is ready.
///
/// Best-effort: returns whether the notification was written. Nothing is retried;
/// the updater's next check simply tries again.
pub async fn notify_update(identity: &Identity, space: &ChannelSpace) -> bool {
    let channel = identity.default_channel();
    let mut stream = match space.connect(&channel).await {
        Ok(s) => s,
        Err(e) => {
            log::debug!("notify_update: {e}; skipping");
            return false;
        }
    };
    let payload = wire::notification(UPDATE_AVAILABLE_EVENT);
    match send_payload(&mut stream, &channel, payload.as_bytes()).await {
        Ok(()) => {
            log::info!("notify_update: sent to channel={}", channel);
            true
        }
        Err(e) => {
            log::debug!("notify_update: {e}");
            false
        }
    }
}
