/// Deep-link scheme prefix. Remainder is `instance/rest`.
pub const LINK_PREFIX: &str = "orbx://";
/// Broadcast event prefix. Remainder is the event name.
pub const NOTIFICATION_PREFIX: &str = "notification://";

pub const UPDATE_AVAILABLE_EVENT: &str = "update-available";

/// Reserved target names.
pub const TARGET_DEFAULT: &str = "default";
pub const TARGET_NEW: &str = "new";

/// Which running process a payload is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetInstance {
    /// Whichever process currently holds the well-known channel.
    Default,
    /// Always open a fresh window in this process.
    New,
    /// A specific running instance, addressed by its generated id (lower-cased).
    Named(String),
}

impl TargetInstance {
    /// Case-insensitive: `Default`, `DEFAULT` and `default` are the same target.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            TARGET_DEFAULT => TargetInstance::Default,
            TARGET_NEW => TargetInstance::New,
            _ => TargetInstance::Named(name),
        }
    }
}

/// One payload as it travels on a channel (one message per connection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    LinkActivation {
        target_instance: String,
        remainder: String,
    },
    Notification {
        event_name: String,
    },
    StateAppend {
        raw: String,
    },
}

impl Message {
    /// Classify a raw payload string. Never fails: anything that is not a link
    /// or a notification is treated as serialized application state.
    pub fn parse(raw: &str) -> Self {
        if let Some((target, rest)) = split_link(raw) {
            return Message::LinkActivation {
                target_instance: target.to_string(),
                remainder: rest.to_string(),
            };
        }
        if let Some(name) = raw.strip_prefix(NOTIFICATION_PREFIX) {
            return Message::Notification {
                event_name: name.to_string(),
            };
        }
        Message::StateAppend {
            raw: raw.to_string(),
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Message::LinkActivation { .. } => "link",
            Message::Notification { .. } => "notification",
            Message::StateAppend { .. } => "state",
        }
    }
}

/// Split `orbx://instance/rest` on the first `/` after the scheme.
///
/// A link without a path (`orbx://abc`) yields an empty remainder.
pub fn split_link(raw: &str) -> Option<(&str, &str)> {
    let body = raw.strip_prefix(LINK_PREFIX)?;
    Some(match body.split_once('/') {
        Some((target, rest)) => (target, rest),
        None => (body, ""),
    })
}

pub fn link(target: &str, path: &str) -> String {
    format!("{}{}/{}", LINK_PREFIX, target, path.trim_start_matches('/'))
}

pub fn notification(event_name: &str) -> String {
    format!("{}{}", NOTIFICATION_PREFIX, event_name)
}
