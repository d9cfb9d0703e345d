//! The shadow conversation graph presented to the dialogue runtime.
//!
//! One fixed engine conversation holds every story's live content: entry 0
//! is START, entry 1 is the story-text anchor, and entries from 2 upward are
//! the choices of the current branch point. Each loaded story also gets a stub
//! conversation whose START links into the engine's anchor.

use tracing::debug;

use super::sequence::NONE_SEQUENCE;
use super::story::Choice;
use crate::schema::actor::{ActorId, PLAYER_ACTOR_ID, STORY_ACTOR_ID};
use crate::schema::dialogue::{Conversation, ConversationId, Entry, EntryId, Link};
use crate::schema::value::Value;

pub const ENGINE_CONVERSATION_ID: ConversationId = ConversationId(999);
pub const ENGINE_CONVERSATION_TITLE: &str = "Story engine";
pub const START_ENTRY_ID: EntryId = EntryId(0);
pub const STORY_ENTRY_ID: EntryId = EntryId(1);
pub const FIRST_CHOICE_ENTRY_ID: EntryId = EntryId(2);

/// Entry field holding the story choice index a choice entry stands for.
pub const CHOICE_INDEX_FIELD: &str = "Choice Index";

/// Options applied when turning choices into entries.
#[derive(Debug, Clone, Copy)]
pub struct ResponseStyle {
    pub player: ActorId,
    pub story_actor: ActorId,
    pub trim_text: bool,
    pub skip_player_subtitle: bool,
}

/// Every conversation the bridge has produced.
#[derive(Debug, Clone)]
pub struct ShadowGraph {
    conversations: Vec<Conversation>,
    next_conversation_id: u32,
}

impl Default for ShadowGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn start_entry(conversation: ConversationId) -> Entry {
    let mut start = Entry::new(
        START_ENTRY_ID,
        conversation,
        "START",
        PLAYER_ACTOR_ID,
        STORY_ACTOR_ID,
    );
    start.sequence = NONE_SEQUENCE.to_string();
    start
}

impl ShadowGraph {
    /// A graph holding only the engine conversation.
    pub fn new() -> Self {
        let mut engine = Conversation::new(
            ENGINE_CONVERSATION_ID,
            ENGINE_CONVERSATION_TITLE,
            PLAYER_ACTOR_ID,
            STORY_ACTOR_ID,
        );

        let mut start = start_entry(ENGINE_CONVERSATION_ID);
        start.link_to(STORY_ENTRY_ID);
        engine.entries.push(start);
        engine.entries.push(Entry::new(
            STORY_ENTRY_ID,
            ENGINE_CONVERSATION_ID,
            "Story",
            STORY_ACTOR_ID,
            PLAYER_ACTOR_ID,
        ));

        Self {
            conversations: vec![engine],
            next_conversation_id: ENGINE_CONVERSATION_ID.0 + 1,
        }
    }

    /// Add a stub conversation for a story: START linking to the anchor.
    pub fn add_story_conversation(&mut self, title: &str) -> ConversationId {
        let id = ConversationId(self.next_conversation_id);
        self.next_conversation_id += 1;

        let mut conversation = Conversation::new(id, title, PLAYER_ACTOR_ID, STORY_ACTOR_ID);
        let mut start = start_entry(id);
        start.outgoing_links.push(Link::new(
            id,
            START_ENTRY_ID,
            ENGINE_CONVERSATION_ID,
            STORY_ENTRY_ID,
        ));
        conversation.entries.push(start);
        self.conversations.push(conversation);
        id
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// The first story conversation with this title.
    pub fn conversation_by_title(&self, title: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.id != ENGINE_CONVERSATION_ID && c.title == title)
    }

    pub fn entry(&self, conversation: ConversationId, entry: EntryId) -> Option<&Entry> {
        self.conversation(conversation)?.entry(entry)
    }

    #[cfg(test)]
    pub(crate) fn entry_mut(&mut self, conversation: ConversationId, entry: EntryId) -> Option<&mut Entry> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == conversation)?
            .entry_mut(entry)
    }

    pub fn engine(&self) -> &Conversation {
        &self.conversations[0]
    }

    fn engine_mut(&mut self) -> &mut Conversation {
        &mut self.conversations[0]
    }

    pub fn anchor(&self) -> &Entry {
        &self.engine().entries[STORY_ENTRY_ID.0 as usize]
    }

    pub(crate) fn anchor_mut(&mut self) -> &mut Entry {
        &mut self.engine_mut().entries[STORY_ENTRY_ID.0 as usize]
    }

    /// IDs of the currently synthesized choice entries.
    pub fn choice_entry_ids(&self) -> Vec<EntryId> {
        self.engine()
            .entries
            .iter()
            .skip(FIRST_CHOICE_ENTRY_ID.0 as usize)
            .map(|e| e.id)
            .collect()
    }

    /// Drop every choice entry and every link out of the anchor.
    pub(crate) fn retain_anchor(&mut self) {
        let engine = self.engine_mut();
        engine.entries.truncate(FIRST_CHOICE_ENTRY_ID.0 as usize);
        engine.entries[STORY_ENTRY_ID.0 as usize]
            .outgoing_links
            .clear();
    }

    /// Anchor links back to itself: more story text follows.
    pub(crate) fn link_anchor_to_itself(&mut self) {
        self.retain_anchor();
        self.anchor_mut().link_to(STORY_ENTRY_ID);
    }

    /// Replace the choice entries with one entry per choice, linked from and
    /// back to the anchor. `extract` may pull a speaker prefix off each menu
    /// text. Returns the anchor's new links.
    pub(crate) fn synthesize_choices<F>(
        &mut self,
        choices: &[Choice],
        style: ResponseStyle,
        mut extract: F,
    ) -> Vec<Link>
    where
        F: FnMut(&mut String, &mut Entry),
    {
        self.retain_anchor();

        for (i, choice) in choices.iter().enumerate() {
            let id = EntryId(FIRST_CHOICE_ENTRY_ID.0 + i as u32);
            let mut entry = Entry::new(
                id,
                ENGINE_CONVERSATION_ID,
                &format!("Choice {}", i),
                style.player,
                style.story_actor,
            );

            let mut text = if style.trim_text {
                choice.text.trim().to_string()
            } else {
                choice.text.clone()
            };
            extract(&mut text, &mut entry);
            entry.menu_text = text;
            if style.skip_player_subtitle {
                entry.sequence = NONE_SEQUENCE.to_string();
            }
            entry.set_field(CHOICE_INDEX_FIELD, Value::from(choice.index));
            entry.link_to(STORY_ENTRY_ID);

            self.engine_mut().entries.push(entry);
            self.anchor_mut().link_to(id);
        }

        debug!(choices = choices.len(), "synthesized choice entries");
        self.anchor().outgoing_links.clone()
    }
}
