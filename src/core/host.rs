//! The outbound contract to the game hosting the dialogue runtime.

use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

use crate::schema::actor::{ActorId, ActorRegistry};
use crate::schema::dialogue::ConversationId;

/// Quest state reported for quests the host has never heard of.
pub const UNASSIGNED_QUEST_STATE: &str = "unassigned";

/// Services the bridge needs from the host. All calls are synchronous and
/// must not call back into the bridge.
pub trait DialogueHost {
    /// Resolve an actor name against the host's master registry.
    fn actor_id(&self, name: &str) -> Option<ActorId>;

    /// A conversation graph joined the runtime's active set.
    fn add_conversation(&mut self, _id: ConversationId, _title: &str) {}

    /// Start the story conversation titled `title`. Called when a restored
    /// save was mid-conversation. The host should answer with
    /// `on_conversation_start` once it is ready, not from inside this call.
    fn start_conversation(&mut self, _title: &str) {}

    /// A host-callable bridge function was registered.
    fn register_function(&mut self, _name: &str) {}

    fn show_alert(&mut self, message: &str);

    fn play_sequence(&mut self, sequence: &str, speaker: Option<ActorId>, listener: Option<ActorId>);

    fn quest_state(&self, quest: &str) -> String;

    fn quest_entry_state(&self, quest: &str, entry: i64) -> String;

    fn set_quest_state(&mut self, quest: &str, state: &str);

    fn set_quest_entry_state(&mut self, quest: &str, entry: i64, state: &str);
}

pub type SharedHost = Rc<RefCell<dyn DialogueHost>>;

/// A sequence the host was asked to play.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedSequence {
    pub sequence: String,
    pub speaker: Option<ActorId>,
    pub listener: Option<ActorId>,
}

/// An in-memory host: a master actor registry, a quest log, and a record of
/// every alert, sequence and registration the bridge produced.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    pub actors: ActorRegistry,
    pub quests: FxHashMap<String, String>,
    pub quest_entries: FxHashMap<(String, i64), String>,
    pub alerts: Vec<String>,
    pub sequences: Vec<PlayedSequence>,
    pub conversations: Vec<(ConversationId, String)>,
    pub functions: Vec<String>,
    /// Conversations the bridge asked to start, in order.
    pub started: Vec<String>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actors(actors: ActorRegistry) -> Self {
        Self {
            actors,
            ..Self::default()
        }
    }

    pub fn shared(self) -> Rc<RefCell<MemoryHost>> {
        Rc::new(RefCell::new(self))
    }
}

impl DialogueHost for MemoryHost {
    fn actor_id(&self, name: &str) -> Option<ActorId> {
        self.actors.id_of(name)
    }

    fn add_conversation(&mut self, id: ConversationId, title: &str) {
        if !self.conversations.iter().any(|(existing, _)| *existing == id) {
            self.conversations.push((id, title.to_string()));
        }
    }

    fn start_conversation(&mut self, title: &str) {
        self.started.push(title.to_string());
    }

    fn register_function(&mut self, name: &str) {
        self.functions.push(name.to_string());
    }

    fn show_alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }

    fn play_sequence(&mut self, sequence: &str, speaker: Option<ActorId>, listener: Option<ActorId>) {
        self.sequences.push(PlayedSequence {
            sequence: sequence.to_string(),
            speaker,
            listener,
        });
    }

    fn quest_state(&self, quest: &str) -> String {
        self.quests
            .get(quest)
            .cloned()
            .unwrap_or_else(|| UNASSIGNED_QUEST_STATE.to_string())
    }

    fn quest_entry_state(&self, quest: &str, entry: i64) -> String {
        self.quest_entries
            .get(&(quest.to_string(), entry))
            .cloned()
            .unwrap_or_else(|| UNASSIGNED_QUEST_STATE.to_string())
    }

    fn set_quest_state(&mut self, quest: &str, state: &str) {
        self.quests.insert(quest.to_string(), state.to_string());
    }

    fn set_quest_entry_state(&mut self, quest: &str, entry: i64, state: &str) {
        self.quest_entries
            .insert((quest.to_string(), entry), state.to_string());
    }
}
