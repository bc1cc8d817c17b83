use std::fmt;

use wire::TargetInstance;

/// Random per-process identifier. Never derived from the pid, so a reused pid
/// can't inherit a dead process's channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn generate() -> Self {
        InstanceId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which channel this process currently owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Listening on the well-known base channel.
    Default,
    /// Only listening on its own `base/<id>` channel.
    Named,
    /// Nothing bound yet.
    Unclaimed,
}

#[derive(Debug, Clone)]
pub struct Identity {
    id: InstanceId,
    base: String,
}

impl Identity {
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_id(base, InstanceId::generate())
    }

    pub fn with_id(base: impl Into<String>, id: InstanceId) -> Self {
        Self {
            id,
            base: base.into(),
        }
    }

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    /// `base/suffix`, suffix lower-cased. Deterministic for a given base.
    pub fn channel_name_for(&self, suffix: &str) -> String {
        format!("{}/{}", self.base, suffix.to_ascii_lowercase())
    }

    pub fn default_channel(&self) -> String {
        self.base.clone()
    }

    pub fn own_channel(&self) -> String {
        self.channel_name_for(self.id.as_str())
    }

    /// Channel for a link/file target. `default` maps to the well-known channel;
    /// `new` has no channel.
    pub fn channel_for_target(&self, target: &TargetInstance) -> Option<String> {
        match target {
            TargetInstance::Default => Some(self.default_channel()),
            TargetInstance::New => None,
            TargetInstance::Named(name) => Some(self.channel_name_for(name)),
        }
    }

    /// Deep link that reaches exactly this process while it runs.
    pub fn link_for(&self, path: &str) -> String {
        wire::link(self.id.as_str(), path)
    }
}
