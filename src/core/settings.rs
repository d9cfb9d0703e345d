//! Bridge configuration, authored in RON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::bridge::BridgeError;

/// Options controlling how story output is shaped into conversation entries.
///
/// Every field has a default, so a settings file only lists what it changes:
///
/// ```text
/// (actor_names_precede_lines: true, trim_text: false)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Rewind a story to its beginning whenever its conversation starts.
    pub reset_state_on_conversation_start: bool,
    /// Take part in `record_persistent_data` / `apply_persistent_data`.
    pub include_in_save_data: bool,
    /// Lines may start with a speaker name, as in `Fogg: A wager.`
    pub actor_names_precede_lines: bool,
    /// Trim whitespace from both ends of lines and choice texts.
    pub trim_text: bool,
    /// Append a line feed to player response subtitles.
    pub append_newline_to_player_responses: bool,
    /// After a choice, show the next story line as the player's subtitle
    /// instead of the choice text.
    pub player_dialogue_text_follows_response_text: bool,
    /// Play script-requested sequences with the line being shown.
    pub tie_sequences_to_dialogue_entries: bool,
    /// The runtime skips the player subtitle after a response menu.
    pub skip_player_subtitle_after_response_menu: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            reset_state_on_conversation_start: false,
            include_in_save_data: true,
            actor_names_precede_lines: false,
            trim_text: true,
            append_newline_to_player_responses: false,
            player_dialogue_text_follows_response_text: false,
            tie_sequences_to_dialogue_entries: true,
            skip_player_subtitle_after_response_menu: false,
        }
    }
}

impl BridgeSettings {
    pub fn load_from_ron(path: &Path) -> Result<BridgeSettings, BridgeError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<BridgeSettings, BridgeError> {
        Ok(ron::from_str(input)?)
    }
}
