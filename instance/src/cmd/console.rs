use instance::window::WindowLayer;

/// Stand-in window layer for the CLI: the real UI lives outside this crate, so
/// every call is printed instead.
pub(crate) struct ConsoleWindow;

fn preview(s: &str) -> String {
    const MAX: usize = 80;
    match s.char_indices().nth(MAX) {
        Some((i, _)) => format!("{}... ({} bytes)", &s[..i], s.len()),
        None => s.to_string(),
    }
}

impl WindowLayer for ConsoleWindow {
    fn create_window(&self, pending_payload: Option<&str>) {
        match pending_payload {
            Some(p) => println!("window: create with payload {}", preview(p)),
            None => println!("window: create (empty)"),
        }
    }

    fn forward_append_state(&self, raw: &str) {
        println!("window: append state {}", preview(raw));
    }

    fn forward_append_state_from_link(&self, remainder: &str) {
        println!("window: append state from link '{}'", remainder);
    }

    fn forward_named_event(&self, name: &str) {
        println!("window: event '{}'", name);
    }

    fn show_diagnostic(&self, message: &str) {
        eprintln!("window: diagnostic: {}", message);
    }
}
