use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::net::{read_payload, ChannelListener};
use crate::router::route;
use crate::shutdown::wait_for_shutdown;
use crate::window::WindowLayer;

/// Accept connections on `listener` until shutdown. Each connection carries one
/// message, terminated by the peer closing its side.
///
/// Used for both the per-instance channel and, once won, the default channel.
pub async fn serve(
    mut listener: ChannelListener,
    window: Arc<dyn WindowLayer>,
    max_payload_bytes: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let channel = listener.channel().to_string();
    log::info!("listener: serving channel={}", channel);

    // Connection tasks die with this future (JoinSet aborts on drop).
    let mut conns = JoinSet::new();
    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok(mut stream) => {
                        let window = window.clone();
                        let channel = channel.clone();
                        conns.spawn(async move {
                            handle_conn(&mut stream, &channel, window.as_ref(), max_payload_bytes).await;
                        });
                    }
                    Err(e) => {
                        log::warn!("listener: accept failed channel={}: {e:?}", channel);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            }
            Some(res) = conns.join_next(), if !conns.is_empty() => {
                if let Err(e) = res {
                    if e.is_panic() {
                        log::error!("listener: connection task panicked channel={}: {e:?}", channel);
                    }
                }
            }
        }
    }
    log::info!("listener: stopped channel={}", channel);
}

async fn handle_conn<S>(stream: &mut S, channel: &str, window: &dyn WindowLayer, max_payload_bytes: usize)
where
    S: AsyncRead + Unpin,
{
    let buf = match read_payload(stream, max_payload_bytes).await {
        Ok(b) => b,
        Err(e) => {
            log::warn!("listener: read failed channel={}: {e:?}", channel);
            return;
        }
    };
    // Watch connections and probes close without sending anything.
    if buf.is_empty() {
        log::debug!("listener: empty connection closed channel={}", channel);
        return;
    }
    let raw = match String::from_utf8(buf) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("listener: dropping non-utf8 payload channel={}: {e}", channel);
            return;
        }
    };
    route(&raw, window);
}
