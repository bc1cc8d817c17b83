/// The part of the application that owns windows. The protocol only ever
/// pushes into it; it never reads window state back.
///
/// Implementations must not block: calls arrive on the event loop.
pub trait WindowLayer: Send + Sync {
    fn create_window(&self, pending_payload: Option<&str>);

    fn forward_append_state(&self, raw: &str);

    fn forward_append_state_from_link(&self, remainder: &str);

    fn forward_named_event(&self, name: &str);

    /// Shown when the per-instance channel could not be bound.
    fn show_diagnostic(&self, message: &str);
}
