use std::future::Future;

use tokio::sync::watch;

/// Resolve once the shutdown flag flips to `true`.
///
/// A dropped sender can never signal, so this then stays pending forever.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Run `fut` unless shutdown is signalled first (`None`).
pub async fn or_shutdown<F>(rx: &mut watch::Receiver<bool>, fut: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        out = fut => Some(out),
        _ = wait_for_shutdown(rx) => None,
    }
}
