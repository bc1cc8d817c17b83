use wire::Message;

use crate::window::WindowLayer;

/// Classify one inbound payload and push it into the window layer.
pub fn route(raw: &str, window: &dyn WindowLayer) -> Message {
    let msg = Message::parse(raw);
    log::debug!("route: kind={} bytes={}", msg.kind_str(), raw.len());
    match &msg {
        Message::LinkActivation {
            target_instance,
            remainder,
        } => {
            log::debug!("route: link target={} remainder={}", target_instance, remainder);
            window.forward_append_state_from_link(remainder);
        }
        Message::Notification { event_name } => window.forward_named_event(event_name),
        // Parse errors in the state are the window layer's problem.
        Message::StateAppend { raw } => window.forward_append_state(raw),
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::testing::{Call, RecordingWindow};

    #[test]
    fn link_forwards_remainder_only() {
        let w = RecordingWindow::default();
        let msg = route("orbx://default/panel/42", &w);
        assert_eq!(
            msg,
            Message::LinkActivation {
                target_instance: "default".to_string(),
                remainder: "panel/42".to_string(),
            }
        );
        assert_eq!(w.calls(), vec![Call::AppendStateFromLink("panel/42".to_string())]);
    }

    #[test]
    fn notification_becomes_named_event() {
        let w = RecordingWindow::default();
        route("notification://update-available", &w);
        assert_eq!(w.calls(), vec![Call::NamedEvent("update-available".to_string())]);
    }

    #[test]
    fn invalid_json_is_still_forwarded() {
        let w = RecordingWindow::default();
        route("{not json", &w);
        assert_eq!(w.calls(), vec![Call::AppendState("{not json".to_string())]);
    }
}
