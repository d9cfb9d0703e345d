//! Save and restore of story state through the shared variable store.
//!
//! Each story's snapshot is kept under `Story_<title>`, alongside the
//! title of the story that was mid-conversation and whether the player was
//! speaking. The host persists the variable store however it likes.

use tracing::{info, warn};

use super::bridge::{BridgeError, StoryBridge};
use super::story::Story;
use crate::schema::value::Value;

pub const STORY_STATE_PREFIX: &str = "Story_";
pub const CURRENT_STORY_KEY: &str = "CurrentStory";
pub const WAS_PLAYER_SPEAKING_KEY: &str = "WasPlayerSpeaking";

pub fn story_state_key(title: &str) -> String {
    format!("{}{}", STORY_STATE_PREFIX, title)
}

impl<S: Story> StoryBridge<S> {
    /// Reset every loaded story to its initial state.
    pub fn reset_stories(&mut self) {
        for loaded in &mut self.stories {
            loaded.story.reset_state();
        }
    }

    /// Write every story's snapshot and the conversation position into the
    /// variable store. Does nothing when save data is disabled.
    pub fn record_persistent_data(&mut self) -> Result<(), BridgeError> {
        if !self.settings.include_in_save_data {
            return Ok(());
        }

        let mut snapshots = Vec::with_capacity(self.stories.len());
        for loaded in &self.stories {
            snapshots.push((story_state_key(&loaded.title), loaded.story.snapshot()?));
        }
        let current = self.active_story_title().unwrap_or_default().to_string();

        let mut store = self.shared.variables.borrow_mut();
        for (key, snapshot) in snapshots {
            store.set(&key, snapshot);
        }
        store.set(CURRENT_STORY_KEY, current.as_str());
        store.set(WAS_PLAYER_SPEAKING_KEY, self.lifecycle.player_speaking);

        info!(
            stories = self.stories.len(),
            current = %current,
            "recorded story state"
        );
        Ok(())
    }

    /// Restore every story from the variable store and ask the host to start
    /// the conversation that was running. Returns that story's title, if any.
    ///
    /// A story whose snapshot cannot be restored is reset and never resumed.
    pub fn apply_persistent_data(&mut self) -> Option<String> {
        if !self.settings.include_in_save_data {
            return None;
        }

        self.reset_stories();
        let mut failed = Vec::new();
        for i in 0..self.stories.len() {
            let key = story_state_key(&self.stories[i].title);
            let snapshot = self
                .shared
                .variables
                .borrow()
                .get(&key)
                .map(Value::as_text);
            let Some(snapshot) = snapshot.filter(|s| !s.is_empty()) else {
                continue;
            };

            let loaded = &mut self.stories[i];
            if let Err(err) = loaded.story.restore(&snapshot) {
                warn!(story = %loaded.title, error = %err, "cannot restore story state, resetting");
                loaded.story.reset_state();
                failed.push(loaded.title.clone());
            }
        }

        self.on_conversation_end();
        self.register_conversations();

        let (current, player_speaking) = {
            let store = self.shared.variables.borrow();
            (
                store.get_text(CURRENT_STORY_KEY),
                store.get_bool(WAS_PLAYER_SPEAKING_KEY),
            )
        };
        if current.is_empty() {
            return None;
        }
        if failed.contains(&current) || self.lookup_story(&current).is_none() {
            warn!(story = %current, "cannot resume conversation");
            return None;
        }

        self.lifecycle.resuming = true;
        self.lifecycle.resume_story = Some(current.clone());
        self.lifecycle.player_speaking = player_speaking;
        info!(story = %current, player_speaking, "resuming conversation");
        self.shared.host.borrow_mut().start_conversation(&current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::{ENGINE_CONVERSATION_ID, STORY_ENTRY_ID};
    use crate::core::host::MemoryHost;
    use crate::core::script::ScriptStory;
    use crate::core::settings::BridgeSettings;
    use crate::schema::actor::{PLAYER_ACTOR_ID, STORY_ACTOR_ID};
    use crate::schema::dialogue::EntryId;

    const LETTER: &str = r#"StoryScript(
        knots: {
            "start": [
                Line(text: "A letter arrives."),
                Choice(text: "Open it.", target: "open"),
                Choice(text: "Burn it.", target: "burn"),
            ],
            "open": [Line(text: "It is from your sister."), Line(text: "She is coming home."), End],
            "burn": [Line(text: "Ashes drift."), End],
        },
    )"#;

    const NOTE: &str = r#"StoryScript(
        knots: {
            "start": [Line(text: "First note line."), Line(text: "Second note line."), End],
        },
    )"#;

    fn bridge(settings: BridgeSettings) -> StoryBridge<ScriptStory> {
        StoryBridge::<ScriptStory>::builder()
            .settings(settings)
            .story("Letter", LETTER)
            .build()
            .unwrap()
    }

    #[test]
    fn state_key_uses_title() {
        assert_eq!(story_state_key("Chapter1"), "Story_Chapter1");
    }

    #[test]
    fn record_then_apply_resumes_mid_line() {
        let mut bridge = bridge(BridgeSettings::default());
        bridge.on_conversation_start("Letter", None, None);
        bridge.prepare_entry(ENGINE_CONVERSATION_ID, STORY_ENTRY_ID).unwrap();
        bridge.prepare_entry(ENGINE_CONVERSATION_ID, EntryId(2)).unwrap();
        let line = bridge
            .prepare_entry(ENGINE_CONVERSATION_ID, STORY_ENTRY_ID)
            .unwrap();
        assert_eq!(line.dialogue_text, "It is from your sister.");

        bridge.record_persistent_data().unwrap();
        assert_eq!(bridge.variables().get_text(CURRENT_STORY_KEY), "Letter");
        assert!(!bridge.variables().get_bool(WAS_PLAYER_SPEAKING_KEY));

        assert_eq!(bridge.apply_persistent_data(), Some("Letter".to_string()));
        assert!(bridge.lifecycle().is_resuming());
        assert!(bridge.on_conversation_start("Letter", None, None));
        let resumed = bridge
            .prepare_entry(ENGINE_CONVERSATION_ID, STORY_ENTRY_ID)
            .unwrap();
        assert_eq!(resumed.dialogue_text, "It is from your sister.");
        assert_eq!(resumed.actor, STORY_ACTOR_ID);
        assert!(!bridge.lifecycle().is_resuming());

        let next = bridge
            .prepare_entry(ENGINE_CONVERSATION_ID, STORY_ENTRY_ID)
            .unwrap();
        assert_eq!(next.dialogue_text, "She is coming home.");
    }

    #[test]
    fn resumed_player_line_is_spoken_by_player() {
        let settings = BridgeSettings {
            player_dialogue_text_follows_response_text: true,
            ..BridgeSettings::default()
        };
        let mut bridge = bridge(settings);
        bridge.on_conversation_start("Letter", None, None);
        bridge.prepare_entry(ENGINE_CONVERSATION_ID, STORY_ENTRY_ID).unwrap();
        bridge.prepare_entry(ENGINE_CONVERSATION_ID, EntryId(3)).unwrap();
        bridge.record_persistent_data().unwrap();
        assert!(bridge.variables().get_bool(WAS_PLAYER_SPEAKING_KEY));

        assert!(bridge.apply_persistent_data().is_some());
        bridge.on_conversation_start("Letter", None, None);
        let resumed = bridge
            .prepare_entry(ENGINE_CONVERSATION_ID, STORY_ENTRY_ID)
            .unwrap();
        assert_eq!(resumed.dialogue_text, "Ashes drift.");
        assert_eq!(resumed.actor, PLAYER_ACTOR_ID);
        assert_eq!(resumed.conversant, STORY_ACTOR_ID);
    }

    #[test]
    fn apply_asks_host_to_start_resumed_story() {
        let host = MemoryHost::new().shared();
        let mut bridge = StoryBridge::<ScriptStory>::builder()
            .story("Letter", LETTER)
            .story("Note", NOTE)
            .host(host.clone())
            .build()
            .unwrap();

        bridge.on_conversation_start("Note", None, None);
        bridge.prepare_entry(ENGINE_CONVERSATION_ID, STORY_ENTRY_ID).unwrap();
        bridge.on_conversation_end();

        bridge.on_conversation_start("Letter", None, None);
        bridge.prepare_entry(ENGINE_CONVERSATION_ID, STORY_ENTRY_ID).unwrap();
        bridge.record_persistent_data().unwrap();

        assert_eq!(bridge.apply_persistent_data(), Some("Letter".to_string()));
        assert_eq!(host.borrow().started, vec!["Letter".to_string()]);

        // The host started a different story instead.
        assert!(bridge.on_conversation_start("Note", None, None));
        assert!(!bridge.lifecycle().is_resuming());
        let line = bridge
            .prepare_entry(ENGINE_CONVERSATION_ID, STORY_ENTRY_ID)
            .unwrap();
        assert_eq!(line.dialogue_text, "Second note line.");
    }

    #[test]
    fn mismatched_choice_snapshot_resets_story() {
        let mut bridge = bridge(BridgeSettings::default());
        bridge.on_conversation_start("Letter", None, None);
        bridge.prepare_entry(ENGINE_CONVERSATION_ID, STORY_ENTRY_ID).unwrap();
        bridge.record_persistent_data().unwrap();

        let key = story_state_key("Letter");
        let mut state: serde_json::Value =
            serde_json::from_str(&bridge.variables().get_text(&key)).unwrap();
        state["choice_targets"] = serde_json::json!([]);
        bridge.variables_mut().set(&key, state.to_string());

        assert_eq!(bridge.apply_persistent_data(), None);
        let story = bridge.lookup_story("Letter").unwrap();
        assert!(story.can_continue());
        assert!(story.current_choices().is_empty());
    }

    #[test]
    fn idle_record_does_not_resume() {
        let mut bridge = bridge(BridgeSettings::default());
        bridge.record_persistent_data().unwrap();
        assert_eq!(bridge.apply_persistent_data(), None);
        assert!(!bridge.lifecycle().is_resuming());
    }

    #[test]
    fn corrupt_snapshot_resets_story() {
        let mut bridge = bridge(BridgeSettings::default());
        bridge.on_conversation_start("Letter", None, None);
        bridge.prepare_entry(ENGINE_CONVERSATION_ID, STORY_ENTRY_ID).unwrap();
        bridge.record_persistent_data().unwrap();
        bridge
            .variables_mut()
            .set(&story_state_key("Letter"), "{not json");

        assert_eq!(bridge.apply_persistent_data(), None);
        let story = bridge.lookup_story("Letter").unwrap();
        assert!(story.can_continue());
        assert_eq!(story.current_text(), "");
    }

    #[test]
    fn disabled_save_data_is_untouched() {
        let settings = BridgeSettings {
            include_in_save_data: false,
            ..BridgeSettings::default()
        };
        let mut bridge = bridge(settings);
        bridge.record_persistent_data().unwrap();
        assert!(!bridge.variables().contains(&story_state_key("Letter")));
        assert_eq!(bridge.apply_persistent_data(), None);
    }
}
