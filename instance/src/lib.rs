// Single-instance election and message routing for orbx.
//
// One process owns the well-known default channel; every other process either
// hands its payload over and exits, or watches the default and takes over when
// it goes away. The `orbx` binary is a thin CLI around `launch::Session`.

pub mod config;
pub mod consts;
pub mod elector;
pub mod error;
pub mod identity;
pub mod launch;
pub mod listener;
pub mod net;
pub mod notifier;
pub mod paths;
pub mod router;
pub mod shutdown;
pub mod state;
pub mod window;
