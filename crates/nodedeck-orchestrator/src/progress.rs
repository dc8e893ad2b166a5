//! Phase event sinks

use nodedeck_core::{PhaseEvent, PhaseStep, Warning};
use tokio::sync::mpsc::UnboundedSender;

/// Receives phase events while a deploy or redeploy runs
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: PhaseEvent);

    fn progress(&self, step: PhaseStep, message: String) {
        self.emit(PhaseEvent::Progress { step, message });
    }

    fn warning(&self, step: PhaseStep, warning: Warning) {
        self.emit(PhaseEvent::Warning { step, warning });
    }
}

/// Discards every event
impl ProgressSink for () {
    fn emit(&self, _event: PhaseEvent) {}
}

impl ProgressSink for UnboundedSender<PhaseEvent> {
    fn emit(&self, event: PhaseEvent) {
        // The receiver goes away when a streaming client disconnects; the
        // operation still runs to completion.
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodedeck_core::WarningKind;

    #[test]
    fn test_channel_sink() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.progress(PhaseStep::Install, "npm install".to_string());
        tx.warning(
            PhaseStep::Ssl,
            Warning::new(WarningKind::Certificate, "rate limited"),
        );

        assert!(matches!(
            rx.try_recv().unwrap(),
            PhaseEvent::Progress { step: PhaseStep::Install, .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            PhaseEvent::Warning { step: PhaseStep::Ssl, .. }
        ));
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        tx.progress(PhaseStep::Clone, "cloning".to_string());
        ().progress(PhaseStep::Clone, "cloning".to_string());
    }
}
