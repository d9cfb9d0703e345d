//! Presentation sequences requested by scripts.
//!
//! A sequence requested while a line is being finalized is tied to that
//! line's subtitle. Any other request is a one-shot task that fires on the
//! host's next `end_of_frame` call.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Sequence value the runtime uses for "no presentation".
pub const NONE_SEQUENCE: &str = "None()";

/// Sequence value the runtime uses for "advance immediately".
pub const CONTINUE_SEQUENCE: &str = "Continue()";

#[derive(Debug, Clone, Default)]
pub struct Sequencer {
    tie_to_entries: bool,
    conversation_active: bool,
    with_subtitle: String,
    deferred: VecDeque<String>,
}

pub type SharedSequencer = Rc<RefCell<Sequencer>>;

impl Sequencer {
    pub fn new(tie_to_entries: bool) -> Self {
        Self {
            tie_to_entries,
            ..Self::default()
        }
    }

    pub fn set_conversation_active(&mut self, active: bool) {
        self.conversation_active = active;
    }

    pub fn conversation_active(&self) -> bool {
        self.conversation_active
    }

    /// Handle a `Sequence(...)` call from a script.
    pub fn request(&mut self, sequence: &str) {
        if self.conversation_active && self.tie_to_entries {
            if !self.with_subtitle.is_empty() {
                self.with_subtitle.push_str("; ");
            }
            self.with_subtitle.push_str(sequence);
        } else {
            self.deferred.push_back(sequence.to_string());
        }
    }

    /// The sequence waiting for the next finalized line, if any.
    pub fn pending_with_subtitle(&self) -> &str {
        &self.with_subtitle
    }

    /// Apply the tied sequence to a line's sequence directive.
    ///
    /// With nothing tied, `None()` and `Continue()` are left alone; any other
    /// directive is cleared so the runtime applies its default timing.
    pub fn finalize_line(&mut self, sequence: &mut String) {
        if self.with_subtitle.is_empty()
            && (sequence == NONE_SEQUENCE || sequence == CONTINUE_SEQUENCE)
        {
            return;
        }
        *sequence = std::mem::take(&mut self.with_subtitle);
    }

    /// Take every deferred sequence, oldest first.
    pub fn drain_deferred(&mut self) -> Vec<String> {
        self.deferred.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_outside_conversation_are_deferred() {
        let mut sequencer = Sequencer::new(true);
        sequencer.request("Camera(Closeup)");
        assert_eq!(sequencer.pending_with_subtitle(), "");
        assert_eq!(sequencer.drain_deferred(), vec!["Camera(Closeup)".to_string()]);
        assert!(sequencer.drain_deferred().is_empty());
    }

    #[test]
    fn tied_requests_join_and_apply_once() {
        let mut sequencer = Sequencer::new(true);
        sequencer.set_conversation_active(true);
        sequencer.request("Audio(Door)");
        sequencer.request("Camera(Wide)");

        let mut sequence = "Delay(2)".to_string();
        sequencer.finalize_line(&mut sequence);
        assert_eq!(sequence, "Audio(Door); Camera(Wide)");
        assert_eq!(sequencer.pending_with_subtitle(), "");
    }

    #[test]
    fn untied_requests_defer_even_in_conversation() {
        let mut sequencer = Sequencer::new(false);
        sequencer.set_conversation_active(true);
        sequencer.request("Audio(Door)");
        assert_eq!(sequencer.drain_deferred().len(), 1);
    }

    #[test]
    fn none_and_continue_untouched_without_request() {
        let mut sequencer = Sequencer::new(true);
        let mut none = NONE_SEQUENCE.to_string();
        sequencer.finalize_line(&mut none);
        assert_eq!(none, NONE_SEQUENCE);

        let mut custom = "Delay(2)".to_string();
        sequencer.finalize_line(&mut custom);
        assert_eq!(custom, "");
    }
}
