pub(crate) mod console;
pub(crate) mod launch;
pub(crate) mod notify;
