use std::io;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::watch;

use wire::TargetInstance;

use crate::config::{Config, MissingInstancePolicy};
use crate::error::{ChannelError, ElectionError};
use crate::identity::{Identity, Role};
use crate::net::{self, ChannelListener, ChannelSpace};
use crate::paths::first_8;
use crate::shutdown::or_shutdown;
use crate::state::ElectionState;

/// How the election ended for this process.
#[derive(Debug)]
pub enum Outcome {
    /// The payload went to another process; this one should exit.
    DeliveredToOther,
    /// This process now owns the default channel.
    BecameDefault(ChannelListener),
    /// Same, and nobody else will show the pending payload: create a window for it.
    BecameDefaultAndMustCreateWindow(ChannelListener),
}

pub struct Elector<'a> {
    identity: &'a Identity,
    space: &'a ChannelSpace,
    retry_backoff: Duration,
    max_attempts: Option<u32>,
    missing_instance: MissingInstancePolicy,
}

impl<'a> Elector<'a> {
    pub fn new(identity: &'a Identity, space: &'a ChannelSpace, cfg: &Config) -> Self {
        Self {
            identity,
            space,
            retry_backoff: cfg.retry_backoff(),
            max_attempts: cfg.max_election_attempts,
            missing_instance: cfg.missing_instance,
        }
    }

    /// Deliver the pending payload to whoever should get it, or claim the default channel.
    ///
    /// Processes with nothing to deliver park on a connection to the current default
    /// instance and run another round when it goes away, so some process always
    /// ends up holding the channel. Only returns on delivery, on winning, or with an
    /// error (shutdown, attempt limit, unusable runtime directory).
    pub async fn try_become_default_or_deliver(
        &self,
        state: &mut ElectionState,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Outcome, ElectionError> {
        let mut deliver_to_default = matches!(state.target(), Some(TargetInstance::Default));

        if let Some(TargetInstance::Named(name)) = state.target().cloned() {
            let channel = self.identity.channel_name_for(&name);
            let connected = or_shutdown(shutdown, self.space.connect(&channel))
                .await
                .ok_or(ElectionError::Cancelled)?;
            match connected {
                Ok(mut stream) => {
                    self.deliver(state, &mut stream, &channel).await;
                    return Ok(Outcome::DeliveredToOther);
                }
                Err(e) => {
                    log_connect_failure(&e);
                    match self.missing_instance {
                        MissingInstancePolicy::FallbackDefault => {
                            log::info!(
                                "elector: instance {} not running, handing payload to default",
                                first_8(&name)
                            );
                            deliver_to_default = true;
                        }
                        MissingInstancePolicy::Drop => {
                            log::info!("elector: instance {} not running, dropping payload", first_8(&name));
                            state.discard_payload();
                        }
                    }
                }
            }
        }

        let channel = self.identity.default_channel();
        let mut attempts: u32 = 0;
        loop {
            if let Some(max) = self.max_attempts {
                if attempts >= max {
                    return Err(ElectionError::AttemptsExhausted(max));
                }
            }
            attempts += 1;

            let connected = or_shutdown(shutdown, self.space.connect(&channel))
                .await
                .ok_or(ElectionError::Cancelled)?;
            let backoff = match connected {
                Ok(mut stream) => {
                    if deliver_to_default && !state.already_sent() {
                        self.deliver(state, &mut stream, &channel).await;
                        return Ok(Outcome::DeliveredToOther);
                    }
                    log::info!("elector: default instance is alive, watching channel={}", channel);
                    or_shutdown(shutdown, net::wait_for_close(&mut stream))
                        .await
                        .ok_or(ElectionError::Cancelled)?;
                    log::info!("elector: default instance went away, re-electing");
                    attempts = 0;
                    continue;
                }
                Err(e) => {
                    let expected = e.is_no_listener();
                    log_connect_failure(&e);
                    match self.space.bind(&channel).await {
                        Ok(listener) => {
                            state.set_role(Role::Default);
                            log::info!(
                                "elector: became default instance={} channel={}",
                                first_8(self.identity.id().as_str()),
                                channel
                            );
                            return Ok(if state.needs_window() {
                                Outcome::BecameDefaultAndMustCreateWindow(listener)
                            } else {
                                Outcome::BecameDefault(listener)
                            });
                        }
                        Err(ChannelError::BindConflict { .. }) => {
                            // Someone else won between our connect and bind; go deliver/watch.
                            log::debug!("elector: lost bind race channel={}", channel);
                            !expected
                        }
                        Err(ChannelError::Transport { source, .. })
                            if source.kind() == io::ErrorKind::TimedOut =>
                        {
                            log::warn!("elector: bind stalled channel={}: {source}", channel);
                            true
                        }
                        Err(ChannelError::Transport { source, .. }) => {
                            return Err(ElectionError::Bind(source));
                        }
                        Err(other) => return Err(ElectionError::Bind(io::Error::other(other.to_string()))),
                    }
                }
            };

            if backoff {
                or_shutdown(shutdown, tokio::time::sleep(self.retry_backoff))
                    .await
                    .ok_or(ElectionError::Cancelled)?;
            }
        }
    }

    /// Write the pending payload at most once. A failed write loses the payload.
    pub(crate) async fn deliver<S>(&self, state: &mut ElectionState, stream: &mut S, channel: &str)
    where
        S: AsyncWrite + Unpin,
    {
        let Some(payload) = state.take_payload_for_send() else {
            log::debug!("elector: nothing left to send on channel={}", channel);
            return;
        };
        match net::send_payload(stream, channel, payload.as_bytes()).await {
            Ok(()) => log::info!("elector: delivered {} bytes to channel={}", payload.len(), channel),
            Err(e) => log::warn!("elector: {e}; payload lost"),
        }
    }
}

fn log_connect_failure(e: &ChannelError) {
    if e.is_no_listener() {
        log::debug!("elector: {e}");
    } else {
        log::warn!("elector: {e}");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::launch::ParsedLaunchInput;
    use crate::listener::serve;
    use crate::window::testing::RecordingWindow;

    fn test_config() -> Config {
        Config {
            connect_timeout_ms: 500,
            retry_backoff_ms: 20,
            ..Config::default()
        }
    }

    fn space(dir: &std::path::Path, cfg: &Config) -> ChannelSpace {
        ChannelSpace::new(dir.to_path_buf(), cfg.connect_timeout())
    }

    fn state(target: Option<TargetInstance>, payload: Option<&str>) -> ElectionState {
        ElectionState::new(ParsedLaunchInput {
            target,
            payload: payload.map(str::to_string),
        })
    }

    async fn elect(
        dir: std::path::PathBuf,
        cfg: Config,
        mut st: ElectionState,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<Outcome, ElectionError> {
        let identity = Identity::new(cfg.base_name.clone());
        let sp = space(&dir, &cfg);
        let elector = Elector::new(&identity, &sp, &cfg);
        elector.try_become_default_or_deliver(&mut st, &mut shutdown).await
    }

    async fn accept_payloads(l: &mut ChannelListener, n: usize) -> Vec<String> {
        let mut out = Vec::new();
        for _ in 0..n {
            let mut s = tokio::time::timeout(Duration::from_secs(5), l.accept())
                .await
                .expect("accept timed out")
                .unwrap();
            let b = net::read_payload(&mut s, 1024).await.unwrap();
            out.push(String::from_utf8(b).unwrap());
        }
        out
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_launches_elect_exactly_one_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config();
        let (_tx, rx) = watch::channel(false);

        let mut handles = Vec::new();
        for i in 0..6 {
            let payload = format!("orbx://default/view/{i}");
            let st = state(Some(TargetInstance::Default), Some(&payload));
            handles.push(tokio::spawn(elect(dir.path().to_path_buf(), cfg.clone(), st, rx.clone())));
        }

        let mut outcomes = Vec::new();
        for h in handles {
            outcomes.push(h.await.unwrap().unwrap());
        }
        let delivered = outcomes
            .iter()
            .filter(|o| matches!(o, Outcome::DeliveredToOther))
            .count();
        assert_eq!(delivered, 5);

        let mut winner = outcomes
            .into_iter()
            .find_map(|o| match o {
                Outcome::BecameDefaultAndMustCreateWindow(l) => Some(l),
                _ => None,
            })
            .expect("winner must create a window for its own payload");
        let got = accept_payloads(&mut winner, 5).await;
        assert!(got.iter().all(|p| p.starts_with("orbx://default/view/")));
    }

    #[tokio::test]
    async fn watcher_takes_over_when_default_exits() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config();

        let (a_tx, a_rx) = watch::channel(false);
        let a = elect(dir.path().to_path_buf(), cfg.clone(), state(None, None), a_rx.clone())
            .await
            .unwrap();
        let a_listener = match a {
            Outcome::BecameDefault(l) => l,
            other => panic!("first process should become default without a window: {other:?}"),
        };
        let a_window = Arc::new(RecordingWindow::default());
        let a_serve = tokio::spawn(serve(a_listener, a_window.clone(), 1024, a_rx));

        let (_b_tx, b_rx) = watch::channel(false);
        let b = tokio::spawn(elect(dir.path().to_path_buf(), cfg.clone(), state(None, None), b_rx));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!b.is_finished(), "second process must watch while the default is alive");

        a_tx.send(true).unwrap();
        a_serve.await.unwrap();

        let b = tokio::time::timeout(Duration::from_secs(5), b)
            .await
            .expect("takeover timed out")
            .unwrap()
            .unwrap();
        assert!(matches!(b, Outcome::BecameDefault(_)), "unexpected: {b:?}");
        // The watch connection carried no message.
        assert!(a_window.calls().is_empty());
    }

    #[tokio::test]
    async fn named_target_is_delivered_directly() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config();
        let sp = space(dir.path(), &cfg);
        let target = Identity::new(cfg.base_name.clone());
        let mut target_listener = sp.bind(&target.own_channel()).await.unwrap();

        let link = target.link_for("panel/7");
        let (_tx, rx) = watch::channel(false);
        let st = state(Some(TargetInstance::from_name(target.id().as_str())), Some(&link));
        let out = elect(dir.path().to_path_buf(), cfg, st, rx).await.unwrap();
        assert!(matches!(out, Outcome::DeliveredToOther));

        assert_eq!(accept_payloads(&mut target_listener, 1).await, vec![link]);
    }

    #[tokio::test]
    async fn missing_named_target_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config();
        let sp = space(dir.path(), &cfg);
        let mut default_listener = sp.bind(&cfg.base_name).await.unwrap();

        let (_tx, rx) = watch::channel(false);
        let st = state(Some(TargetInstance::Named("ghost".to_string())), Some("orbx://ghost/x"));
        let out = elect(dir.path().to_path_buf(), cfg, st, rx).await.unwrap();
        assert!(matches!(out, Outcome::DeliveredToOther));
        assert_eq!(
            accept_payloads(&mut default_listener, 1).await,
            vec!["orbx://ghost/x".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_named_target_can_be_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            missing_instance: MissingInstancePolicy::Drop,
            ..test_config()
        };
        let (_tx, rx) = watch::channel(false);
        let st = state(Some(TargetInstance::Named("ghost".to_string())), Some("orbx://ghost/x"));
        let out = elect(dir.path().to_path_buf(), cfg, st, rx).await.unwrap();
        // No default running: we win, but the dropped payload needs no window.
        assert!(matches!(out, Outcome::BecameDefault(_)), "unexpected: {out:?}");
    }

    #[tokio::test]
    async fn non_ascii_named_target_is_logged_safely() {
        // Make the info! arguments (and their first_8 calls) actually evaluate.
        log::set_max_level(log::LevelFilter::Info);
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config();
        let input = crate::launch::parse_launch_arg(Some("orbx://aéééé/view")).unwrap();
        assert_eq!(input.target, Some(TargetInstance::Named("aéééé".to_string())));

        let (_tx, rx) = watch::channel(false);
        let out = elect(dir.path().to_path_buf(), cfg, ElectionState::new(input), rx)
            .await
            .unwrap();
        assert!(
            matches!(out, Outcome::BecameDefaultAndMustCreateWindow(_)),
            "unexpected: {out:?}"
        );
    }

    #[tokio::test]
    async fn transport_error_on_connect_backs_off_instead_of_failing() {
        use std::os::unix::io::AsRawFd;

        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config();
        let path = crate::paths::socket_path(dir.path(), &cfg.base_name);

        // A listener that never accepts, with its queue already full: connects fail
        // with WouldBlock rather than "refused".
        let stuck = std::os::unix::net::UnixListener::bind(&path).unwrap();
        assert_eq!(unsafe { libc::listen(stuck.as_raw_fd(), 0) }, 0);
        let mut queued = Vec::new();
        let first_err = loop {
            match tokio::net::UnixStream::connect(&path).await {
                Ok(c) => queued.push(c),
                Err(e) => break e,
            }
            assert!(queued.len() < 64, "backlog never filled");
        };
        let sp = space(dir.path(), &cfg);
        let err = sp.connect(&cfg.base_name).await.unwrap_err();
        assert!(!err.is_no_listener(), "unexpected: {err:?} (first: {first_err:?})");

        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(elect(dir.path().to_path_buf(), cfg.clone(), state(None, None), rx));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!task.is_finished(), "elector must keep retrying on transport errors");

        // The stuck process dies; its socket file stays behind and gets reclaimed.
        drop(queued);
        drop(stuck);
        let out = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("election timed out")
            .unwrap()
            .unwrap();
        assert!(matches!(out, Outcome::BecameDefault(_)), "unexpected: {out:?}");
    }

    #[tokio::test]
    async fn send_guard_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config();
        let identity = Identity::new(cfg.base_name.clone());
        let sp = space(dir.path(), &cfg);
        let elector = Elector::new(&identity, &sp, &cfg);
        let mut st = state(Some(TargetInstance::Default), Some("orbx://default/a"));

        // Two "connected" callbacks for the same payload.
        let mut sink: Vec<u8> = Vec::new();
        elector.deliver(&mut st, &mut sink, "orbx-explorer").await;
        elector.deliver(&mut st, &mut sink, "orbx-explorer").await;
        assert_eq!(sink, b"orbx://default/a");
    }

    #[tokio::test]
    async fn shutdown_cancels_watching() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config();
        let sp = space(dir.path(), &cfg);
        let _default = sp.bind(&cfg.base_name).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let watcher = tokio::spawn(elect(dir.path().to_path_buf(), cfg, state(None, None), rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let res = tokio::time::timeout(Duration::from_secs(5), watcher).await.unwrap().unwrap();
        assert!(matches!(res, Err(ElectionError::Cancelled)), "unexpected: {res:?}");
    }

    #[tokio::test]
    async fn attempt_limit_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            max_election_attempts: Some(0),
            ..test_config()
        };
        let (_tx, rx) = watch::channel(false);
        let res = elect(dir.path().to_path_buf(), cfg, state(None, None), rx).await;
        assert!(matches!(res, Err(ElectionError::AttemptsExhausted(0))), "unexpected: {res:?}");
    }

    #[tokio::test]
    async fn failed_write_loses_payload() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config();
        let identity = Identity::new(cfg.base_name.clone());
        let sp = space(dir.path(), &cfg);
        let elector = Elector::new(&identity, &sp, &cfg);
        let mut st = state(Some(TargetInstance::Default), Some("{}"));

        // A closed peer: the write fails and nothing is retried.
        let (mut ours, theirs) = tokio::io::duplex(1);
        drop(theirs);
        elector.deliver(&mut st, &mut ours, "orbx-explorer").await;
        assert!(st.already_sent());
        assert_eq!(st.take_payload_for_send(), None);
        assert!(!st.needs_window());
    }
}
