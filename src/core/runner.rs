//! A minimal dialogue runtime that plays a story through the shadow graph.
//!
//! It follows links the way a graph-based dialogue runtime does: entries
//! are prepared before they are shown, a link to a response entry puts up
//! a menu, and a dead end finishes the conversation.

use serde::Serialize;

use super::bridge::{BridgeError, StoryBridge};
use super::graph::{CHOICE_INDEX_FIELD, ENGINE_CONVERSATION_ID, START_ENTRY_ID};
use super::story::Story;
use crate::schema::dialogue::{ConversationId, EntryId, Link, Subtitle};

/// A response offered in a menu.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub entry: EntryId,
    pub text: String,
}

/// What the runtime shows next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Turn {
    Line(Subtitle),
    Menu(Vec<Response>),
    Ended,
}

#[derive(Debug, Default)]
pub struct ConversationRunner {
    links: Vec<Link>,
    active: bool,
}

impl ConversationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start the conversation for the story titled `title` and return the
    /// first turn.
    pub fn start<S: Story>(
        &mut self,
        bridge: &mut StoryBridge<S>,
        title: &str,
        actor: Option<&str>,
        conversant: Option<&str>,
    ) -> Result<Turn, BridgeError> {
        let conversation = bridge
            .story_conversation(title)
            .ok_or_else(|| BridgeError::UnknownStory(title.to_string()))?;
        if !bridge.on_conversation_start(title, actor, conversant) {
            return Err(BridgeError::UnknownStory(title.to_string()));
        }
        self.active = true;

        match self.show(bridge, conversation, START_ENTRY_ID, false) {
            Ok(Some(turn)) => Ok(self.finish_turn(bridge, turn)),
            Ok(None) => self.next(bridge),
            Err(err) => Err(self.abort(bridge, err)),
        }
    }

    /// Advance past the current line.
    pub fn next<S: Story>(&mut self, bridge: &mut StoryBridge<S>) -> Result<Turn, BridgeError> {
        if !self.active {
            return Ok(Turn::Ended);
        }

        loop {
            let Some(first) = self.links.first().copied() else {
                bridge.on_conversation_end();
                self.active = false;
                return Ok(self.finish_turn(bridge, Turn::Ended));
            };

            let responses = self.responses(bridge);
            if !responses.is_empty() {
                return Ok(self.finish_turn(bridge, Turn::Menu(responses)));
            }

            match self.show(bridge, first.destination_conversation, first.destination_entry, false) {
                Ok(Some(turn)) => return Ok(self.finish_turn(bridge, turn)),
                Ok(None) => continue,
                Err(err) => return Err(self.abort(bridge, err)),
            }
        }
    }

    /// Pick a response from the current menu.
    pub fn choose<S: Story>(
        &mut self,
        bridge: &mut StoryBridge<S>,
        entry: EntryId,
    ) -> Result<Turn, BridgeError> {
        let offered = self.links.iter().any(|l| {
            l.destination_conversation == ENGINE_CONVERSATION_ID && l.destination_entry == entry
        });
        if !self.active || !offered {
            return Err(BridgeError::UnknownEntry {
                conversation: ENGINE_CONVERSATION_ID,
                entry,
            });
        }

        let skip = bridge.settings().skip_player_subtitle_after_response_menu;
        match self.show(bridge, ENGINE_CONVERSATION_ID, entry, skip) {
            Ok(Some(turn)) => Ok(self.finish_turn(bridge, turn)),
            Ok(None) => self.next(bridge),
            Err(err) => Err(self.abort(bridge, err)),
        }
    }

    /// Prepare and show one entry. Returns `None` when it has nothing to
    /// display.
    fn show<S: Story>(
        &mut self,
        bridge: &mut StoryBridge<S>,
        conversation: ConversationId,
        entry: EntryId,
        silent: bool,
    ) -> Result<Option<Turn>, BridgeError> {
        let prepared = bridge.prepare_entry(conversation, entry)?;
        self.links = prepared.outgoing_links.clone();

        if silent || prepared.subtitle_text().is_empty() {
            return Ok(None);
        }
        let mut subtitle = Subtitle::from_entry(&prepared);
        bridge.on_conversation_line(&mut subtitle);
        Ok(Some(Turn::Line(subtitle)))
    }

    fn responses<S: Story>(&self, bridge: &StoryBridge<S>) -> Vec<Response> {
        self.links
            .iter()
            .filter_map(|link| {
                bridge
                    .graph()
                    .entry(link.destination_conversation, link.destination_entry)
            })
            .filter(|entry| entry.field(CHOICE_INDEX_FIELD).is_some())
            .map(|entry| Response {
                entry: entry.id,
                text: entry.menu_text.clone(),
            })
            .collect()
    }

    fn finish_turn<S: Story>(&mut self, bridge: &mut StoryBridge<S>, turn: Turn) -> Turn {
        bridge.end_of_frame();
        turn
    }

    fn abort<S: Story>(&mut self, bridge: &mut StoryBridge<S>, err: BridgeError) -> BridgeError {
        if bridge.lifecycle().is_active() {
            bridge.on_conversation_end();
        }
        self.links.clear();
        self.active = false;
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::script::ScriptStory;
    use crate::core::settings::BridgeSettings;

    const FERRY: &str = r#"StoryScript(
        knots: {
            "start": [
                Line(text: "Ferryman: Crossing costs a coin."),
                Choice(text: "Pay.", target: "pay"),
                Choice(text: "Swim.", target: "swim"),
            ],
            "pay": [Line(text: "The boat pushes off."), End],
            "swim": [Line(text: "The water is cold."), End],
        },
    )"#;

    fn bridge(settings: BridgeSettings) -> StoryBridge<ScriptStory> {
        StoryBridge::<ScriptStory>::builder()
            .settings(settings)
            .story("Ferry", FERRY)
            .build()
            .unwrap()
    }

    fn line_text(turn: &Turn) -> &str {
        match turn {
            Turn::Line(subtitle) => &subtitle.text,
            other => panic!("expected a line, got {:?}", other),
        }
    }

    #[test]
    fn plays_line_menu_response_and_end() {
        let mut bridge = bridge(BridgeSettings::default());
        let mut runner = ConversationRunner::new();

        let turn = runner.start(&mut bridge, "Ferry", None, None).unwrap();
        assert_eq!(line_text(&turn), "Ferryman: Crossing costs a coin.");

        let menu = runner.next(&mut bridge).unwrap();
        let Turn::Menu(responses) = menu else {
            panic!("expected a menu");
        };
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1].text, "Swim.");

        let echoed = runner.choose(&mut bridge, responses[1].entry).unwrap();
        assert_eq!(line_text(&echoed), "Swim.");

        let turn = runner.next(&mut bridge).unwrap();
        assert_eq!(line_text(&turn), "The water is cold.");
        assert_eq!(runner.next(&mut bridge).unwrap(), Turn::Ended);
        assert!(!runner.is_active());
        assert!(!bridge.lifecycle().is_active());
    }

    #[test]
    fn skipped_player_subtitle_goes_straight_on() {
        let settings = BridgeSettings {
            skip_player_subtitle_after_response_menu: true,
            ..BridgeSettings::default()
        };
        let mut bridge = bridge(settings);
        let mut runner = ConversationRunner::new();
        runner.start(&mut bridge, "Ferry", None, None).unwrap();
        let Turn::Menu(responses) = runner.next(&mut bridge).unwrap() else {
            panic!("expected a menu");
        };
        let turn = runner.choose(&mut bridge, responses[0].entry).unwrap();
        assert_eq!(line_text(&turn), "The boat pushes off.");
    }

    #[test]
    fn choosing_unoffered_entry_fails() {
        let mut bridge = bridge(BridgeSettings::default());
        let mut runner = ConversationRunner::new();
        runner.start(&mut bridge, "Ferry", None, None).unwrap();
        assert!(matches!(
            runner.choose(&mut bridge, EntryId(9)),
            Err(BridgeError::UnknownEntry { .. })
        ));
    }

    #[test]
    fn unknown_story_is_rejected() {
        let mut bridge = bridge(BridgeSettings::default());
        let mut runner = ConversationRunner::new();
        assert!(matches!(
            runner.start(&mut bridge, "Bridge", None, None),
            Err(BridgeError::UnknownStory(_))
        ));
        assert_eq!(runner.next(&mut bridge).unwrap(), Turn::Ended);
    }
}
