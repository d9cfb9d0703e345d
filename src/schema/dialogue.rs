use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::actor::ActorId;
use super::value::Value;

/// Newtype wrapper for conversation (graph) IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub u32);

/// Newtype wrapper for entry (node) IDs, scoped to one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub u32);

/// A directed edge from one entry to another, possibly across conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub origin_conversation: ConversationId,
    pub origin_entry: EntryId,
    pub destination_conversation: ConversationId,
    pub destination_entry: EntryId,
}

impl Link {
    pub fn new(
        origin_conversation: ConversationId,
        origin_entry: EntryId,
        destination_conversation: ConversationId,
        destination_entry: EntryId,
    ) -> Self {
        Self {
            origin_conversation,
            origin_entry,
            destination_conversation,
            destination_entry,
        }
    }
}

/// A node of a conversation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub conversation_id: ConversationId,
    pub title: String,
    pub actor: ActorId,
    pub conversant: ActorId,
    pub dialogue_text: String,
    pub menu_text: String,
    pub sequence: String,
    pub fields: BTreeMap<String, Value>,
    pub outgoing_links: Vec<Link>,
}

impl Entry {
    pub fn new(
        id: EntryId,
        conversation_id: ConversationId,
        title: &str,
        actor: ActorId,
        conversant: ActorId,
    ) -> Self {
        Self {
            id,
            conversation_id,
            title: title.to_string(),
            actor,
            conversant,
            dialogue_text: String::new(),
            menu_text: String::new(),
            sequence: String::new(),
            fields: BTreeMap::new(),
            outgoing_links: Vec::new(),
        }
    }

    /// The text shown as a subtitle: dialogue text, or menu text when the
    /// dialogue text is empty.
    pub fn subtitle_text(&self) -> &str {
        if self.dialogue_text.is_empty() {
            &self.menu_text
        } else {
            &self.dialogue_text
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    /// Link this entry to `destination` in the same conversation.
    pub fn link_to(&mut self, destination: EntryId) {
        self.outgoing_links.push(Link::new(
            self.conversation_id,
            self.id,
            self.conversation_id,
            destination,
        ));
    }
}

/// A conversation graph. Entries are stored so that `entries[i].id == i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub actor: ActorId,
    pub conversant: ActorId,
    pub entries: Vec<Entry>,
}

impl Conversation {
    pub fn new(id: ConversationId, title: &str, actor: ActorId, conversant: ActorId) -> Self {
        Self {
            id,
            title: title.to_string(),
            actor,
            conversant,
            entries: Vec::new(),
        }
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(id.0 as usize).filter(|e| e.id == id)
    }

    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.get_mut(id.0 as usize).filter(|e| e.id == id)
    }

    pub fn entry_ids(&self) -> Vec<EntryId> {
        self.entries.iter().map(|e| e.id).collect()
    }
}

/// A line as finalized for display by the dialogue runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtitle {
    pub speaker: ActorId,
    pub listener: ActorId,
    pub text: String,
    pub sequence: String,
}

impl Subtitle {
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            speaker: entry.actor,
            listener: entry.conversant,
            text: entry.subtitle_text().to_string(),
            sequence: entry.sequence.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtitle_text_falls_back_to_menu_text() {
        let mut entry = Entry::new(EntryId(2), ConversationId(999), "Choice 0", ActorId(1), ActorId(2));
        entry.menu_text = "Ask about the wager".to_string();
        assert_eq!(entry.subtitle_text(), "Ask about the wager");
        entry.dialogue_text = "A wager?".to_string();
        assert_eq!(entry.subtitle_text(), "A wager?");
    }

    #[test]
    fn link_to_stays_in_conversation() {
        let mut entry = Entry::new(EntryId(1), ConversationId(999), "Story", ActorId(2), ActorId(1));
        entry.link_to(EntryId(1));
        assert_eq!(
            entry.outgoing_links,
            vec![Link::new(ConversationId(999), EntryId(1), ConversationId(999), EntryId(1))]
        );
    }

    #[test]
    fn entry_lookup_respects_arena_ids() {
        let mut conversation = Conversation::new(ConversationId(5), "Test", ActorId(1), ActorId(2));
        conversation
            .entries
            .push(Entry::new(EntryId(0), ConversationId(5), "START", ActorId(1), ActorId(2)));
        assert!(conversation.entry(EntryId(0)).is_some());
        assert!(conversation.entry(EntryId(1)).is_none());
    }
}
