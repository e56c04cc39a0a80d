use tokio::sync::watch;
use tracing::info;

use super::state::Mode;

/// A change of the agent's turn state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: Mode,
    pub to: Mode,
    /// Agent utterance completed by leaving `Speaking`
    pub finalized_agent_text: Option<String>,
}

/// Follows the agent's turn state as reported by the channel
///
/// The mode only changes through [`ModeTracker::apply`]; there is no setter.
/// Subscribers are notified of every transition.
pub struct ModeTracker {
    mode_tx: watch::Sender<Mode>,
    agent_text: String,
    tentative_user_text: String,
}

impl ModeTracker {
    pub fn new() -> Self {
        let (mode_tx, _) = watch::channel(Mode::Listening);
        Self {
            mode_tx,
            agent_text: String::new(),
            tentative_user_text: String::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        *self.mode_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Mode> {
        self.mode_tx.subscribe()
    }

    /// Apply a mode-change event; repeated modes are not transitions
    pub fn apply(&mut self, mode: Mode) -> Option<ModeTransition> {
        let from = self.mode();
        if from == mode {
            return None;
        }

        let finalized_agent_text = if from == Mode::Speaking {
            self.take_agent_text()
        } else {
            None
        };

        if mode == Mode::Listening {
            // New user turn
            self.tentative_user_text.clear();
        }

        self.mode_tx.send_replace(mode);
        info!("Agent mode: {} -> {}", from, mode);

        Some(ModeTransition {
            from,
            to: mode,
            finalized_agent_text,
        })
    }

    /// Accumulate a fragment of the agent's current utterance
    pub fn agent_fragment(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.agent_text.is_empty() {
            self.agent_text.push(' ');
        }
        self.agent_text.push_str(text);
    }

    /// Replace the in-progress user transcript
    pub fn tentative_user(&mut self, text: &str) {
        self.tentative_user_text.clear();
        self.tentative_user_text.push_str(text.trim());
    }

    /// A final user transcript supersedes the tentative one
    pub fn user_final(&mut self) {
        self.tentative_user_text.clear();
    }

    pub fn tentative_user_text(&self) -> &str {
        &self.tentative_user_text
    }

    pub fn pending_agent_text(&self) -> &str {
        &self.agent_text
    }

    /// Take the unfinished agent utterance (session end)
    pub fn take_agent_text(&mut self) -> Option<String> {
        if self.agent_text.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.agent_text))
        }
    }
}

impl Default for ModeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_listening() {
        assert_eq!(ModeTracker::new().mode(), Mode::Listening);
    }

    #[test]
    fn test_repeated_mode_is_not_a_transition() {
        let mut tracker = ModeTracker::new();
        assert!(tracker.apply(Mode::Listening).is_none());
        assert!(tracker.apply(Mode::Speaking).is_some());
        assert!(tracker.apply(Mode::Speaking).is_none());
    }

    #[test]
    fn test_leaving_speaking_finalizes_agent_utterance() {
        let mut tracker = ModeTracker::new();
        tracker.apply(Mode::Speaking);
        tracker.agent_fragment("Tell me about");
        tracker.agent_fragment(" a project you led. ");

        let transition = tracker.apply(Mode::Listening).unwrap();
        assert_eq!(transition.from, Mode::Speaking);
        assert_eq!(transition.to, Mode::Listening);
        assert_eq!(
            transition.finalized_agent_text.as_deref(),
            Some("Tell me about a project you led.")
        );
        assert_eq!(tracker.pending_agent_text(), "");
    }

    #[test]
    fn test_entering_listening_clears_tentative_user_text() {
        let mut tracker = ModeTracker::new();
        tracker.tentative_user("I worked on");
        tracker.apply(Mode::Speaking);
        assert_eq!(tracker.tentative_user_text(), "I worked on");

        tracker.apply(Mode::Listening);
        assert_eq!(tracker.tentative_user_text(), "");
    }

    #[test]
    fn test_entering_speaking_keeps_agent_text() {
        let mut tracker = ModeTracker::new();
        tracker.agent_fragment("Hello");

        let transition = tracker.apply(Mode::Speaking).unwrap();
        assert!(transition.finalized_agent_text.is_none());
        assert_eq!(tracker.pending_agent_text(), "Hello");
    }

    #[tokio::test]
    async fn test_subscribers_see_every_transition() {
        let mut tracker = ModeTracker::new();
        let mut rx = tracker.subscribe();

        tracker.apply(Mode::Speaking);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Mode::Speaking);

        tracker.apply(Mode::Listening);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Mode::Listening);
    }
}
