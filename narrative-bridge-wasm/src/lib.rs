//! WASM bindings for narrative-bridge: plays stories in a browser host.

use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

use narrative_bridge::core::bridge::StoryBridge;
use narrative_bridge::core::host::MemoryHost;
use narrative_bridge::core::runner::{ConversationRunner, Turn};
use narrative_bridge::core::script::ScriptStory;
use narrative_bridge::core::settings::BridgeSettings;
use narrative_bridge::core::variables::VariableStore;
use narrative_bridge::schema::actor::ActorRegistry;
use narrative_bridge::schema::dialogue::EntryId;

// ---------------------------------------------------------------------------
// Embedded demo story, compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const LIGHTHOUSE: &str = include_str!("../../stories/lighthouse.ron");
    pub const LIGHTHOUSE_ACTORS: &[&str] = &["Keeper"];
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct TurnInfo {
    kind: &'static str,
    speaker: Option<String>,
    text: Option<String>,
    sequence: Option<String>,
    responses: Vec<ResponseInfo>,
    alerts: Vec<String>,
}

#[derive(serde::Serialize)]
struct ResponseInfo {
    entry: u32,
    text: String,
}

#[derive(serde::Deserialize)]
struct StorySource {
    title: String,
    source: String,
}

// ---------------------------------------------------------------------------
// StoryPlayer, the main exported struct
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct StoryPlayer {
    bridge: StoryBridge<ScriptStory>,
    runner: ConversationRunner,
    host: Rc<RefCell<MemoryHost>>,
}

#[wasm_bindgen]
impl StoryPlayer {
    /// Create a player holding the built-in demo story.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<StoryPlayer, JsError> {
        Self::build(
            vec![StorySource {
                title: "lighthouse".to_string(),
                source: data::LIGHTHOUSE.to_string(),
            }],
            data::LIGHTHOUSE_ACTORS.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Create a player from a JSON array of `{ "title", "source" }` stories
    /// and a JSON array of actor names.
    pub fn from_json(stories_json: &str, actors_json: &str) -> Result<StoryPlayer, JsError> {
        let stories: Vec<StorySource> = serde_json::from_str(stories_json)
            .map_err(|e| JsError::new(&format!("Invalid stories JSON: {e}")))?;
        let actors: Vec<String> = serde_json::from_str(actors_json)
            .map_err(|e| JsError::new(&format!("Invalid actors JSON: {e}")))?;
        Self::build(stories, actors)
    }

    /// Start a story conversation. Returns the first turn as JSON.
    pub fn start(&mut self, title: &str) -> Result<String, JsError> {
        self.runner = ConversationRunner::new();
        let turn = self.runner.start(&mut self.bridge, title, None, None);
        self.turn_json(turn)
    }

    /// Advance past the current line. Returns the next turn as JSON.
    pub fn next(&mut self) -> Result<String, JsError> {
        let turn = self.runner.next(&mut self.bridge);
        self.turn_json(turn)
    }

    /// Pick a response by the entry id given in the menu turn.
    pub fn choose(&mut self, entry: u32) -> Result<String, JsError> {
        let turn = self.runner.choose(&mut self.bridge, EntryId(entry));
        self.turn_json(turn)
    }

    /// Queue a knot to start the next conversation at.
    pub fn jump(&mut self, path: &str) {
        self.bridge.set_conversation_starting_point(path);
    }

    /// Record story state and return the variable store as JSON.
    pub fn save(&mut self) -> Result<String, JsError> {
        self.bridge
            .record_persistent_data()
            .map_err(|e| JsError::new(&format!("Save error: {e}")))?;
        serde_json::to_string(&*self.bridge.variables())
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    /// Replace the variable store with saved JSON and restore every story.
    /// Returns the resumed turn as JSON, or `null` when nothing resumes.
    pub fn load(&mut self, saved_json: &str) -> Result<String, JsError> {
        let store: VariableStore = serde_json::from_str(saved_json)
            .map_err(|e| JsError::new(&format!("Invalid save JSON: {e}")))?;
        *self.bridge.variables_mut() = store;

        self.runner = ConversationRunner::new();
        match self.bridge.apply_persistent_data() {
            Some(title) => {
                let turn = self.runner.start(&mut self.bridge, &title, None, None);
                self.turn_json(turn)
            }
            None => Ok("null".to_string()),
        }
    }

    /// Return the variable store as JSON.
    pub fn variables(&self) -> Result<String, JsError> {
        serde_json::to_string(&*self.bridge.variables())
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    /// Return a JSON array of actor names referenced by a story.
    pub fn actors(&self, title: &str) -> Result<String, JsError> {
        let actors = self
            .bridge
            .actors_in_story(title, None)
            .map_err(|e| JsError::new(&format!("Discovery error: {e}")))?;
        serde_json::to_string(&actors)
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    /// Return a JSON array of loaded story titles.
    pub fn available_stories(&self) -> String {
        serde_json::to_string(&self.bridge.story_titles()).unwrap_or_else(|_| "[]".to_string())
    }
}

impl StoryPlayer {
    fn build(stories: Vec<StorySource>, actor_names: Vec<String>) -> Result<StoryPlayer, JsError> {
        let mut actors = ActorRegistry::with_reserved();
        for name in &actor_names {
            actors.add(name, false);
        }
        let host = MemoryHost::with_actors(actors).shared();

        let settings = BridgeSettings {
            actor_names_precede_lines: true,
            ..BridgeSettings::default()
        };
        let mut builder = StoryBridge::<ScriptStory>::builder()
            .settings(settings)
            .host(host.clone());
        for story in &stories {
            builder = builder.story(&story.title, &story.source);
        }
        let bridge = builder
            .build()
            .map_err(|e| JsError::new(&format!("Bridge build error: {e}")))?;

        Ok(StoryPlayer {
            bridge,
            runner: ConversationRunner::new(),
            host,
        })
    }

    fn turn_json(
        &mut self,
        turn: Result<Turn, narrative_bridge::core::bridge::BridgeError>,
    ) -> Result<String, JsError> {
        let turn = turn.map_err(|e| JsError::new(&format!("Story error: {e}")))?;
        let alerts: Vec<String> = self.host.borrow_mut().alerts.drain(..).collect();
        let info = match turn {
            Turn::Line(subtitle) => TurnInfo {
                kind: "line",
                speaker: Some(self.actor_name(subtitle.speaker.0)),
                text: Some(subtitle.text),
                sequence: Some(subtitle.sequence),
                responses: Vec::new(),
                alerts,
            },
            Turn::Menu(responses) => TurnInfo {
                kind: "menu",
                speaker: None,
                text: None,
                sequence: None,
                responses: responses
                    .into_iter()
                    .map(|r| ResponseInfo {
                        entry: r.entry.0,
                        text: r.text,
                    })
                    .collect(),
                alerts,
            },
            Turn::Ended => TurnInfo {
                kind: "ended",
                speaker: None,
                text: None,
                sequence: None,
                responses: Vec::new(),
                alerts,
            },
        };
        serde_json::to_string(&info).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    fn actor_name(&self, id: u32) -> String {
        self.host
            .borrow()
            .actors
            .get(narrative_bridge::schema::actor::ActorId(id))
            .map(|a| a.name.clone())
            .unwrap_or_else(|| format!("Actor {id}"))
    }
}
