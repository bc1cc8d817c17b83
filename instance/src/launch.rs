use anyhow::Context;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;

use wire::TargetInstance;

use crate::config::Config;
use crate::elector::{Elector, Outcome};
use crate::error::ElectionError;
use crate::identity::{Identity, Role};
use crate::listener::serve;
use crate::net::{ChannelListener, ChannelSpace};
use crate::paths::first_8;
use crate::shutdown::wait_for_shutdown;
use crate::state::ElectionState;
use crate::window::WindowLayer;

/// What the single command-line argument asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLaunchInput {
    pub target: Option<TargetInstance>,
    pub payload: Option<String>,
}

impl ParsedLaunchInput {
    /// No argument, or a payload without an owner / explicitly for a new window.
    /// Everything else waits for the election so a process that is about to hand
    /// off never flashes a window.
    pub fn creates_window_immediately(&self) -> bool {
        matches!(self.target, None | Some(TargetInstance::New))
    }
}

/// Interpret the argument: absent, an `orbx://` link, or a path to a JSON state file.
pub fn parse_launch_arg(arg: Option<&str>) -> anyhow::Result<ParsedLaunchInput> {
    let Some(arg) = arg else {
        return Ok(ParsedLaunchInput::default());
    };
    if let Some((target, _rest)) = wire::split_link(arg) {
        // `orbx:///path` has no instance segment; treat it as untargeted-to-default.
        let target = if target.trim().is_empty() {
            TargetInstance::Default
        } else {
            TargetInstance::from_name(target)
        };
        return Ok(ParsedLaunchInput {
            target: Some(target),
            payload: Some(arg.to_string()),
        });
    }
    let path = Path::new(arg);
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read launch file {}", path.display()))?;
    Ok(parse_state_payload(contents))
}

/// A state file may name the instance it belongs to.
pub fn parse_state_payload(contents: String) -> ParsedLaunchInput {
    ParsedLaunchInput {
        target: declared_instance(&contents),
        payload: Some(contents),
    }
}

// `Instance` wins over `instance`; the value is compared case-insensitively.
fn declared_instance(contents: &str) -> Option<TargetInstance> {
    let v: serde_json::Value = serde_json::from_str(contents).ok()?;
    let obj = v.as_object()?;
    // A present `Instance` hides `instance` even when it is not a string.
    let name = match obj.get("Instance") {
        Some(v) => v.as_str()?,
        None => obj.get("instance")?.as_str()?,
    };
    if name.trim().is_empty() {
        return None;
    }
    Some(TargetInstance::from_name(name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// Payload handed to another process; exit now.
    HandedOff,
    /// This process holds the default channel.
    ServingAsDefault { created_window: bool },
}

/// One process's view of the protocol, from argument parsing to shutdown.
pub struct Session {
    identity: Identity,
    space: ChannelSpace,
    config: Config,
    window: Arc<dyn WindowLayer>,
    state: ElectionState,
    tasks: JoinSet<()>,
    shutdown: watch::Receiver<bool>,
}

impl Session {
    pub async fn start(
        config: Config,
        window: Arc<dyn WindowLayer>,
        input: ParsedLaunchInput,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let identity = Identity::new(config.base_name.clone());
        Self::start_with_identity(identity, config, window, input, shutdown).await
    }

    /// Create the window if it can't wait, and bind this process's own channel.
    pub async fn start_with_identity(
        identity: Identity,
        config: Config,
        window: Arc<dyn WindowLayer>,
        input: ParsedLaunchInput,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let space = ChannelSpace::from_config(&config);
        let immediate = input.creates_window_immediately();
        let mut state = ElectionState::new(input);
        log::debug!(
            "launch: instance={} target={:?} immediate_window={}",
            first_8(identity.id().as_str()),
            state.target(),
            immediate
        );

        if immediate {
            let payload = state.mark_window_created();
            window.create_window(payload.as_deref());
        }

        let mut session = Self {
            identity,
            space,
            config,
            window,
            state,
            tasks: JoinSet::new(),
            shutdown,
        };

        let own = session.identity.own_channel();
        match session.space.bind(&own).await {
            Ok(listener) => {
                session.state.set_role(Role::Named);
                session.spawn_serve(listener);
            }
            Err(e) => {
                log::error!("launch: cannot bind instance channel: {e}");
                session
                    .window
                    .show_diagnostic(&format!("This window cannot receive links: {e}"));
            }
        }
        session
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn role(&self) -> Role {
        self.state.role()
    }

    /// Run the election. For a process that only watches the default instance this
    /// returns once it takes over (or on shutdown).
    pub async fn elect(&mut self) -> Result<LaunchOutcome, ElectionError> {
        let elector = Elector::new(&self.identity, &self.space, &self.config);
        let outcome = elector
            .try_become_default_or_deliver(&mut self.state, &mut self.shutdown)
            .await?;
        Ok(match outcome {
            Outcome::DeliveredToOther => LaunchOutcome::HandedOff,
            Outcome::BecameDefault(listener) => {
                self.spawn_serve(listener);
                LaunchOutcome::ServingAsDefault {
                    created_window: false,
                }
            }
            Outcome::BecameDefaultAndMustCreateWindow(listener) => {
                self.spawn_serve(listener);
                let payload = self.state.mark_window_created();
                self.window.create_window(payload.as_deref());
                LaunchOutcome::ServingAsDefault {
                    created_window: true,
                }
            }
        })
    }

    /// Keep the listeners running until shutdown is signalled.
    pub async fn serve_until_shutdown(mut self) {
        wait_for_shutdown(&mut self.shutdown).await;
        while self.tasks.join_next().await.is_some() {}
    }

    fn spawn_serve(&mut self, listener: ChannelListener) {
        self.tasks.spawn(serve(
            listener,
            self.window.clone(),
            self.config.max_payload_bytes,
            self.shutdown.clone(),
        ));
    }
}
