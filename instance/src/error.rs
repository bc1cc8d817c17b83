use std::io;

use thiserror::Error;

/// Channel-layer failures. None of these reach the window layer; the elector
/// and the listener decide locally what each one means.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Nobody is listening on the channel. Expected during election.
    #[error("no listener on {channel}")]
    NoListener { channel: String },

    /// Anything else that went wrong while connecting (including timeouts).
    #[error("transport error on {channel}: {source}")]
    Transport {
        channel: String,
        #[source]
        source: io::Error,
    },

    /// Another process already owns the channel.
    #[error("channel {channel} is already bound")]
    BindConflict { channel: String },

    /// The payload may or may not have arrived; it is not resent.
    #[error("write to {channel} failed: {source}")]
    WriteFailure {
        channel: String,
        #[source]
        source: io::Error,
    },
}

impl ChannelError {
    pub fn is_no_listener(&self) -> bool {
        matches!(self, ChannelError::NoListener { .. })
    }
}

#[derive(Debug, Error)]
pub enum ElectionError {
    #[error("election cancelled")]
    Cancelled,

    #[error("gave up after {0} election attempts")]
    AttemptsExhausted(u32),

    /// Binding the default channel failed for a reason other than losing the race.
    #[error("bind default channel: {0}")]
    Bind(#[source] io::Error),
}
