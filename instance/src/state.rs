use wire::TargetInstance;

use crate::identity::Role;
use crate::launch::ParsedLaunchInput;

/// Everything the election needs to remember about this process.
///
/// Owned by the launch coordinator and lent to the elector, so there is no
/// state shared implicitly between callbacks.
#[derive(Debug)]
pub struct ElectionState {
    role: Role,
    target: Option<TargetInstance>,
    pending_payload: Option<String>,
    already_sent: bool,
    window_created: bool,
}

impl ElectionState {
    pub fn new(input: ParsedLaunchInput) -> Self {
        Self {
            role: Role::Unclaimed,
            target: input.target,
            pending_payload: input.payload,
            already_sent: false,
            window_created: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn set_role(&mut self, role: Role) {
        // Never step down from Default within one process.
        if self.role != Role::Default {
            self.role = role;
        }
    }

    pub fn target(&self) -> Option<&TargetInstance> {
        self.target.as_ref()
    }

    pub fn already_sent(&self) -> bool {
        self.already_sent
    }

    pub fn window_created(&self) -> bool {
        self.window_created
    }

    pub fn pending_payload(&self) -> Option<&str> {
        self.pending_payload.as_deref()
    }

    /// The payload to write on a delivery connection. Returns `Some` at most once
    /// per process: after the first call the payload is gone whether or not the
    /// write succeeds.
    pub fn take_payload_for_send(&mut self) -> Option<String> {
        if self.already_sent {
            return None;
        }
        self.already_sent = true;
        self.pending_payload.take()
    }

    /// Record window creation and hand over whatever payload it should open.
    pub fn mark_window_created(&mut self) -> Option<String> {
        self.window_created = true;
        self.pending_payload.take()
    }

    pub fn discard_payload(&mut self) {
        self.pending_payload = None;
    }

    /// Becoming default with an undelivered payload means this process must show it.
    pub fn needs_window(&self) -> bool {
        !self.window_created && self.pending_payload.is_some()
    }
}
