//! Conversation lifecycle and entry preparation.
//!
//! The dialogue runtime drives the bridge through four notifications: a
//! conversation starts, an entry is about to be shown, a line is about to be
//! displayed, and the conversation ends. Preparing the anchor advances the
//! story by one line; preparing a choice entry commits that choice.

use tracing::{debug, info, warn};

use super::actors::ActorResolver;
use super::bridge::{BridgeError, StoryBridge};
use super::graph::{
    ResponseStyle, CHOICE_INDEX_FIELD, ENGINE_CONVERSATION_ID, STORY_ENTRY_ID,
};
use super::story::{Story, StoryError};
use crate::schema::actor::{ActorId, PLAYER_ACTOR_ID, STORY_ACTOR_ID};
use crate::schema::dialogue::{ConversationId, Entry, EntryId, Link, Subtitle};
use crate::schema::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    /// A story conversation is running; `story` indexes the loaded stories.
    Active { story: usize },
}

/// Where a running conversation stands, read off the shadow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingLine,
    AwaitingChoice,
    Finished,
}

/// Per-session conversation flags.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    pub(crate) state: ConversationState,
    pub(crate) resuming: bool,
    /// Title of the story a restored save asked the host to start.
    pub(crate) resume_story: Option<String>,
    pub(crate) player_speaking: bool,
    pub(crate) player: ActorId,
    pub(crate) story_actor: ActorId,
    pub(crate) jump_to: Option<String>,
    pub(crate) last_starting_point: Option<String>,
    pub(crate) last_line: Option<(ActorId, ActorId)>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: ConversationState::Idle,
            resuming: false,
            resume_story: None,
            player_speaking: false,
            player: PLAYER_ACTOR_ID,
            story_actor: STORY_ACTOR_ID,
            jump_to: None,
            last_starting_point: None,
            last_line: None,
        }
    }
}

impl Lifecycle {
    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ConversationState::Active { .. })
    }

    pub fn is_resuming(&self) -> bool {
        self.resuming
    }

    pub fn player_speaking(&self) -> bool {
        self.player_speaking
    }

    pub fn player(&self) -> ActorId {
        self.player
    }

    pub fn story_actor(&self) -> ActorId {
        self.story_actor
    }

    pub fn last_starting_point(&self) -> Option<&str> {
        self.last_starting_point.as_deref()
    }

    fn active_story(&self) -> Option<usize> {
        match self.state {
            ConversationState::Active { story } => Some(story),
            ConversationState::Idle => None,
        }
    }
}

impl<S: Story> StoryBridge<S> {
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn active_story_title(&self) -> Option<&str> {
        self.lifecycle
            .active_story()
            .map(|i| self.stories[i].title.as_str())
    }

    pub fn active_story(&self) -> Option<&S> {
        self.lifecycle.active_story().map(|i| &self.stories[i].story)
    }

    pub fn phase(&self) -> Phase {
        let Some(index) = self.lifecycle.active_story() else {
            return Phase::Idle;
        };
        let links = &self.graph.anchor().outgoing_links;
        if links.iter().any(|l| l.destination_entry == STORY_ENTRY_ID) {
            return Phase::AwaitingLine;
        }
        if !links.is_empty() {
            return Phase::AwaitingChoice;
        }
        if self.lifecycle.resuming || self.stories[index].story.can_continue() {
            Phase::AwaitingLine
        } else {
            Phase::Finished
        }
    }

    /// The runtime started a conversation titled `title`. Returns false when
    /// no loaded story has that title; the bridge stays idle.
    pub fn on_conversation_start(
        &mut self,
        title: &str,
        actor: Option<&str>,
        conversant: Option<&str>,
    ) -> bool {
        let Some(index) = self.stories.iter().position(|l| l.title == title) else {
            debug!(conversation = %title, "not a story conversation");
            self.lifecycle.state = ConversationState::Idle;
            return false;
        };

        if let Some(resumed) = self.lifecycle.resume_story.take() {
            if resumed != title {
                debug!(resumed = %resumed, story = %title, "another story started, dropping resume");
                self.lifecycle.resuming = false;
                self.lifecycle.player_speaking = false;
            }
        }

        if self.settings.reset_state_on_conversation_start && !self.lifecycle.resuming {
            self.stories[index].story.reset_state();
        }

        {
            let host = self.shared.host.borrow();
            let resolver = ActorResolver::new(&*host, &self.reserved_actors);
            self.lifecycle.player = actor
                .and_then(|name| resolver.resolve(name))
                .unwrap_or(PLAYER_ACTOR_ID);
            self.lifecycle.story_actor = conversant
                .and_then(|name| resolver.resolve(name))
                .unwrap_or(STORY_ACTOR_ID);
        }

        self.lifecycle.state = ConversationState::Active { story: index };
        self.lifecycle.last_line = None;
        self.shared.sequencer.borrow_mut().set_conversation_active(true);
        self.graph.retain_anchor();
        self.graph.anchor_mut().dialogue_text.clear();

        info!(
            story = %title,
            resuming = self.lifecycle.resuming,
            "conversation started"
        );
        true
    }

    pub fn on_conversation_end(&mut self) {
        if let Some(title) = self.active_story_title() {
            info!(story = %title, "conversation ended");
        }
        self.lifecycle.state = ConversationState::Idle;
        self.lifecycle.last_line = None;
        self.shared.sequencer.borrow_mut().set_conversation_active(false);
    }

    /// Queue a knot or stitch path to jump to when the next conversation
    /// prepares its first line.
    pub fn set_conversation_starting_point(&mut self, path: &str) {
        self.lifecycle.jump_to = Some(path.to_string());
        self.lifecycle.last_starting_point = Some(path.to_string());
    }

    /// The runtime is about to show `entry`. Returns the entry as it should
    /// be shown. Entries outside a running story conversation are returned
    /// unchanged.
    pub fn prepare_entry(
        &mut self,
        conversation: ConversationId,
        entry: EntryId,
    ) -> Result<Entry, BridgeError> {
        let requested = self
            .graph
            .entry(conversation, entry)
            .cloned()
            .ok_or(BridgeError::UnknownEntry {
                conversation,
                entry,
            })?;

        let Some(index) = self.lifecycle.active_story() else {
            return Ok(requested);
        };
        if conversation != ENGINE_CONVERSATION_ID {
            return Ok(requested);
        }

        if entry == STORY_ENTRY_ID {
            self.prepare_story_entry(index)
        } else if requested.field(CHOICE_INDEX_FIELD).is_some() {
            self.prepare_choice_entry(index, requested)
        } else {
            Ok(requested)
        }
    }

    fn prepare_story_entry(&mut self, index: usize) -> Result<Entry, BridgeError> {
        if let Some(path) = self.lifecycle.jump_to.take() {
            if let Err(err) = self.stories[index].story.choose_path(&path) {
                warn!(path = %path, error = %err, "cannot jump to path, ending story");
                self.on_conversation_end();
                return Err(err.into());
            }
            debug!(path = %path, "jumped to starting point");
        }

        let resuming = self.lifecycle.resuming;
        let story = &mut self.stories[index].story;
        if story.can_continue() || resuming {
            let produced = if resuming {
                Ok(story.current_text().to_string())
            } else {
                story.continue_story()
            };
            let player_speaks = resuming && self.lifecycle.player_speaking;
            self.lifecycle.resuming = false;
            self.lifecycle.player_speaking = false;

            match produced {
                Ok(text) => self.render_line(index, text, player_speaks),
                Err(StoryError::EngineFault(reason)) => {
                    warn!(reason = %reason, "story failed while continuing");
                }
                Err(err) => return Err(err.into()),
            }
        }

        if self.stories[index].story.can_continue() {
            self.graph.link_anchor_to_itself();
        } else {
            self.synthesize_choices(index);
        }

        let anchor = self.graph.anchor().clone();
        self.lifecycle.last_line = Some((anchor.actor, anchor.conversant));
        Ok(anchor)
    }

    fn render_line(&mut self, index: usize, text: String, player_speaks: bool) {
        let mut text = if self.settings.trim_text {
            text.trim().to_string()
        } else {
            text
        };
        let (actor, conversant) = if player_speaks {
            (self.lifecycle.player, self.lifecycle.story_actor)
        } else {
            (self.lifecycle.story_actor, self.lifecycle.player)
        };

        let host = self.shared.host.borrow();
        let resolver = ActorResolver::new(&*host, &self.reserved_actors);
        let tags = self.stories[index].story.current_tags();
        let anchor = self.graph.anchor_mut();
        anchor.actor = actor;
        anchor.conversant = conversant;
        if self.settings.actor_names_precede_lines {
            resolver.apply_prepended_actor(&mut text, anchor);
        }
        resolver.apply_tags(tags, anchor);
        anchor.dialogue_text = text;
        anchor.sequence.clear();
    }

    fn synthesize_choices(&mut self, index: usize) -> Vec<Link> {
        let style = ResponseStyle {
            player: self.lifecycle.player,
            story_actor: self.lifecycle.story_actor,
            trim_text: self.settings.trim_text,
            skip_player_subtitle: self.settings.skip_player_subtitle_after_response_menu,
        };
        let precede = self.settings.actor_names_precede_lines;

        let host = self.shared.host.borrow();
        let resolver = ActorResolver::new(&*host, &self.reserved_actors);
        let choices = self.stories[index].story.current_choices();
        self.graph.synthesize_choices(choices, style, |text, entry| {
            if precede {
                resolver.apply_prepended_actor(text, entry);
            }
        })
    }

    fn prepare_choice_entry(
        &mut self,
        index: usize,
        mut requested: Entry,
    ) -> Result<Entry, BridgeError> {
        let choice = requested
            .field(CHOICE_INDEX_FIELD)
            .map(Value::as_int)
            .filter(|i| *i >= 0)
            .ok_or(BridgeError::MissingChoiceIndex(requested.id))? as usize;
        self.stories[index].story.choose_choice_index(choice)?;
        debug!(choice, "choice committed");

        requested.id = STORY_ENTRY_ID;

        if self.settings.player_dialogue_text_follows_response_text {
            let story = &mut self.stories[index].story;
            if story.can_continue() {
                match story.continue_story() {
                    Ok(_) => {}
                    Err(StoryError::EngineFault(reason)) => {
                        warn!(reason = %reason, "story failed while continuing");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            requested.dialogue_text = story.current_text().to_string();
        }

        if self.stories[index].story.can_continue() {
            self.graph.link_anchor_to_itself();
        } else {
            requested.outgoing_links = self.synthesize_choices(index);
        }
        for link in &mut requested.outgoing_links {
            link.origin_entry = STORY_ENTRY_ID;
        }

        let mut text = requested.subtitle_text().to_string();
        if self.settings.trim_text {
            text = text.trim().to_string();
        }
        if self.settings.append_newline_to_player_responses {
            text.push('\n');
        }
        if self.settings.actor_names_precede_lines {
            let host = self.shared.host.borrow();
            let resolver = ActorResolver::new(&*host, &self.reserved_actors);
            resolver.apply_prepended_actor(&mut text, &mut requested);
        }
        requested.dialogue_text = text;

        self.lifecycle.player_speaking = true;
        self.lifecycle.last_line = Some((requested.actor, requested.conversant));
        Ok(requested)
    }

    /// The runtime is about to display `subtitle`. Ties any pending sequence
    /// to it.
    pub fn on_conversation_line(&mut self, subtitle: &mut Subtitle) {
        self.shared
            .sequencer
            .borrow_mut()
            .finalize_line(&mut subtitle.sequence);
        if self.lifecycle.is_active() {
            self.lifecycle.last_line = Some((subtitle.speaker, subtitle.listener));
        }
    }

    /// Play every deferred sequence. Call once per host frame.
    pub fn end_of_frame(&mut self) {
        let deferred = self.shared.sequencer.borrow_mut().drain_deferred();
        if deferred.is_empty() {
            return;
        }
        let (speaker, listener) = match self.lifecycle.last_line {
            Some((speaker, listener)) if self.lifecycle.is_active() => {
                (Some(speaker), Some(listener))
            }
            _ => (None, None),
        };
        let mut host = self.shared.host.borrow_mut();
        for sequence in deferred {
            host.play_sequence(&sequence, speaker, listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::host::{MemoryHost, PlayedSequence};
    use crate::core::script::ScriptStory;
    use crate::core::settings::BridgeSettings;
    use crate::schema::actor::ActorRegistry;
    use std::cell::RefCell;
    use std::rc::Rc;

    const ROAD: &str = r#"StoryScript(
        knots: {
            "start": [
                Line(text: "  The road forks.  "),
                Choice(text: "Left", target: "left"),
                Choice(text: "Right", target: "right"),
            ],
            "left": [Line(text: "Trees close in."), End],
            "right": [Line(text: "A river glints."), Line(text: "A ferry waits."), End],
            "bridge": [Line(text: "Planks creak underfoot."), End],
        },
    )"#;

    fn bridge_with(settings: BridgeSettings) -> (StoryBridge<ScriptStory>, Rc<RefCell<MemoryHost>>) {
        let mut actors = ActorRegistry::new();
        actors.add("Guide", false);
        let host = MemoryHost::with_actors(actors).shared();
        let bridge = StoryBridge::<ScriptStory>::builder()
            .settings(settings)
            .story("Road", ROAD)
            .host(host.clone())
            .build()
            .unwrap();
        (bridge, host)
    }

    fn anchor(bridge: &mut StoryBridge<ScriptStory>) -> Entry {
        bridge
            .prepare_entry(ENGINE_CONVERSATION_ID, STORY_ENTRY_ID)
            .unwrap()
    }

    #[test]
    fn unknown_title_stays_idle() {
        let (mut bridge, _) = bridge_with(BridgeSettings::default());
        assert!(!bridge.on_conversation_start("Elsewhere", None, None));
        assert_eq!(bridge.phase(), Phase::Idle);
    }

    #[test]
    fn line_then_choices() {
        let (mut bridge, _) = bridge_with(BridgeSettings::default());
        assert!(bridge.on_conversation_start("Road", None, None));
        assert_eq!(bridge.phase(), Phase::AwaitingLine);

        let line = anchor(&mut bridge);
        assert_eq!(line.dialogue_text, "The road forks.");
        assert_eq!(line.actor, STORY_ACTOR_ID);
        assert_eq!(line.conversant, PLAYER_ACTOR_ID);
        assert_eq!(line.outgoing_links.len(), 2);
        assert_eq!(bridge.phase(), Phase::AwaitingChoice);
        assert_eq!(bridge.graph().choice_entry_ids(), vec![EntryId(2), EntryId(3)]);
    }

    #[test]
    fn choosing_commits_and_relinks() {
        let (mut bridge, _) = bridge_with(BridgeSettings::default());
        bridge.on_conversation_start("Road", None, None);
        anchor(&mut bridge);

        let response = bridge
            .prepare_entry(ENGINE_CONVERSATION_ID, EntryId(3))
            .unwrap();
        assert_eq!(response.id, STORY_ENTRY_ID);
        assert_eq!(response.dialogue_text, "Right");
        assert_eq!(response.actor, PLAYER_ACTOR_ID);
        assert_eq!(response.outgoing_links.len(), 1);
        assert_eq!(response.outgoing_links[0].origin_entry, STORY_ENTRY_ID);
        assert_eq!(response.outgoing_links[0].destination_entry, STORY_ENTRY_ID);
        assert!(bridge.lifecycle().player_speaking());

        let line = anchor(&mut bridge);
        assert_eq!(line.dialogue_text, "A river glints.");
        assert_eq!(line.actor, STORY_ACTOR_ID);
        assert_eq!(line.outgoing_links[0].destination_entry, STORY_ENTRY_ID);

        assert_eq!(anchor(&mut bridge).dialogue_text, "A ferry waits.");
        assert_eq!(bridge.phase(), Phase::Finished);
        assert!(bridge.graph().anchor().outgoing_links.is_empty());
    }

    #[test]
    fn invalid_choice_leaves_state_alone() {
        let (mut bridge, _) = bridge_with(BridgeSettings::default());
        bridge.on_conversation_start("Road", None, None);
        anchor(&mut bridge);
        bridge
            .graph
            .entry_mut(ENGINE_CONVERSATION_ID, EntryId(2))
            .unwrap()
            .set_field(CHOICE_INDEX_FIELD, Value::from(7usize));

        let result = bridge.prepare_entry(ENGINE_CONVERSATION_ID, EntryId(2));
        assert!(matches!(
            result,
            Err(BridgeError::Story(StoryError::InvalidChoice { index: 7, .. }))
        ));
        assert_eq!(bridge.active_story().unwrap().current_choices().len(), 2);
    }

    #[test]
    fn conversation_participants_resolve_by_name() {
        let (mut bridge, _) = bridge_with(BridgeSettings::default());
        bridge.on_conversation_start("Road", Some("Player"), Some("Guide"));
        let guide = bridge.lifecycle().story_actor();
        assert_ne!(guide, STORY_ACTOR_ID);
        assert_eq!(anchor(&mut bridge).actor, guide);
    }

    #[test]
    fn starting_point_jumps_before_first_line() {
        let (mut bridge, _) = bridge_with(BridgeSettings::default());
        bridge.set_conversation_starting_point("bridge");
        bridge.on_conversation_start("Road", None, None);
        assert_eq!(anchor(&mut bridge).dialogue_text, "Planks creak underfoot.");
        assert_eq!(bridge.lifecycle().last_starting_point(), Some("bridge"));
    }

    #[test]
    fn unknown_starting_point_ends_conversation() {
        let (mut bridge, _) = bridge_with(BridgeSettings::default());
        bridge.set_conversation_starting_point("nowhere");
        bridge.on_conversation_start("Road", None, None);
        let result = bridge.prepare_entry(ENGINE_CONVERSATION_ID, STORY_ENTRY_ID);
        assert!(matches!(
            result,
            Err(BridgeError::Story(StoryError::UnknownPath(_)))
        ));
        assert_eq!(bridge.phase(), Phase::Idle);
    }

    #[test]
    fn response_options_shape_player_line() {
        let settings = BridgeSettings {
            append_newline_to_player_responses: true,
            player_dialogue_text_follows_response_text: true,
            ..BridgeSettings::default()
        };
        let (mut bridge, _) = bridge_with(settings);
        bridge.on_conversation_start("Road", None, None);
        anchor(&mut bridge);
        let response = bridge
            .prepare_entry(ENGINE_CONVERSATION_ID, EntryId(2))
            .unwrap();
        assert_eq!(response.dialogue_text, "Trees close in.\n");
        assert!(response.outgoing_links.is_empty());
    }

    #[test]
    fn deferred_sequences_play_at_end_of_frame() {
        let (mut bridge, host) = bridge_with(BridgeSettings::default());
        bridge.shared.sequencer.borrow_mut().request("Fade(In)");
        bridge.end_of_frame();
        assert_eq!(
            host.borrow().sequences,
            vec![PlayedSequence {
                sequence: "Fade(In)".to_string(),
                speaker: None,
                listener: None,
            }]
        );
    }
}
