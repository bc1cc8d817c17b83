pub const APP_DIR_NAME: &str = "orbx";

// Logical name of the well-known default channel. Per-instance channels are `<base>/<id>`.
pub const DEFAULT_BASE_NAME: &str = "orbx-explorer";

pub const CONFIG_FILE_NAME: &str = "instance.toml";

// Env override for the socket directory (Unix only).
pub const RUNTIME_DIR_ENV: &str = "ORBX_RUNTIME_DIR";

pub const SOCKET_EXT: &str = "sock";

// Sidecar lock used only while reclaiming a stale socket file.
pub const RECLAIM_LOCK_EXT: &str = "sock.lock";
