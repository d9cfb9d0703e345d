//! Speaker resolution for story lines.
//!
//! Names resolve in this order: the host's master registry, then the
//! bridge's reserved actors (`Player`, `NPC`), then the caller's fallback.

use super::host::DialogueHost;
use crate::schema::actor::{ActorId, ActorRegistry};
use crate::schema::dialogue::Entry;

pub const ACTOR_TAG: &str = "Actor=";
pub const CONVERSANT_TAG: &str = "Conversant=";

pub struct ActorResolver<'a> {
    host: &'a dyn DialogueHost,
    reserved: &'a ActorRegistry,
}

impl<'a> ActorResolver<'a> {
    pub fn new(host: &'a dyn DialogueHost, reserved: &'a ActorRegistry) -> Self {
        Self { host, reserved }
    }

    pub fn resolve(&self, name: &str) -> Option<ActorId> {
        self.host
            .actor_id(name)
            .or_else(|| self.reserved.id_of(name))
    }

    pub fn resolve_or(&self, name: &str, fallback: ActorId) -> ActorId {
        self.resolve(name).unwrap_or(fallback)
    }

    /// Apply `Actor=` and `Conversant=` tags to an entry. Unknown names keep
    /// the entry's current assignment.
    pub fn apply_tags(&self, tags: &[String], entry: &mut Entry) {
        for tag in tags {
            if let Some(name) = tag.strip_prefix(ACTOR_TAG) {
                entry.actor = self.resolve_or(name, entry.actor);
            } else if let Some(name) = tag.strip_prefix(CONVERSANT_TAG) {
                entry.conversant = self.resolve_or(name, entry.conversant);
            }
        }
    }

    /// When `text` starts with a known actor's name and a colon, make that
    /// actor the speaker and strip the prefix. If the new speaker was the
    /// listener, the previous speaker becomes the listener.
    pub fn apply_prepended_actor(&self, text: &mut String, entry: &mut Entry) {
        let Some((name, rest)) = extract_prepended_actor(text) else {
            return;
        };
        let Some(actor) = self.resolve(name) else {
            return;
        };
        if entry.conversant == actor {
            entry.conversant = entry.actor;
        }
        entry.actor = actor;
        *text = rest.to_string();
    }
}

/// Split `"Name: text"` on the first colon. The colon must not be the last
/// character. Returns the name and the text with leading whitespace removed.
pub fn extract_prepended_actor(text: &str) -> Option<(&str, &str)> {
    let colon = text.find(':')?;
    if colon + 1 >= text.len() {
        return None;
    }
    Some((&text[..colon], text[colon + 1..].trim_start()))
}

/// Actor names referenced by `Actor=` / `Conversant=` tags, in tag order.
pub fn tagged_actor_names(tags: &[String]) -> impl Iterator<Item = &str> {
    tags.iter().filter_map(|tag| {
        tag.strip_prefix(ACTOR_TAG)
            .or_else(|| tag.strip_prefix(CONVERSANT_TAG))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::host::MemoryHost;
    use crate::schema::actor::{PLAYER_ACTOR_ID, STORY_ACTOR_ID};
    use crate::schema::dialogue::{ConversationId, EntryId};

    fn host() -> MemoryHost {
        let mut actors = ActorRegistry::new();
        actors.add("Fogg", false);
        actors.add("Passepartout", false);
        MemoryHost::with_actors(actors)
    }

    fn entry() -> Entry {
        Entry::new(EntryId(1), ConversationId(999), "Story", STORY_ACTOR_ID, PLAYER_ACTOR_ID)
    }

    #[test]
    fn extract_splits_on_first_colon() {
        assert_eq!(
            extract_prepended_actor("Fogg: A wager: twenty thousand."),
            Some(("Fogg", "A wager: twenty thousand."))
        );
        assert_eq!(extract_prepended_actor("No speaker here"), None);
        assert_eq!(extract_prepended_actor("Dangling:"), None);
    }

    #[test]
    fn resolution_prefers_host_then_reserved() {
        let host = host();
        let reserved = ActorRegistry::with_reserved();
        let resolver = ActorResolver::new(&host, &reserved);
        assert_eq!(resolver.resolve("Fogg"), Some(crate::schema::actor::ActorId(3)));
        assert_eq!(resolver.resolve("Player"), Some(PLAYER_ACTOR_ID));
        assert_eq!(resolver.resolve_or("Nobody", STORY_ACTOR_ID), STORY_ACTOR_ID);
    }

    #[test]
    fn prefix_sets_speaker_and_strips_once() {
        let host = host();
        let reserved = ActorRegistry::with_reserved();
        let resolver = ActorResolver::new(&host, &reserved);
        let mut entry = entry();
        let mut text = "Fogg: Hello: friend".to_string();
        resolver.apply_prepended_actor(&mut text, &mut entry);
        assert_eq!(text, "Hello: friend");
        assert_eq!(entry.actor, resolver.resolve("Fogg").unwrap());
        assert_eq!(entry.conversant, PLAYER_ACTOR_ID);
    }

    #[test]
    fn unknown_prefix_is_left_in_text() {
        let host = host();
        let reserved = ActorRegistry::with_reserved();
        let resolver = ActorResolver::new(&host, &reserved);
        let mut entry = entry();
        let mut text = "Note: the clock struck ten".to_string();
        resolver.apply_prepended_actor(&mut text, &mut entry);
        assert_eq!(text, "Note: the clock struck ten");
        assert_eq!(entry.actor, STORY_ACTOR_ID);
    }

    #[test]
    fn prefix_naming_listener_swaps_roles() {
        let host = host();
        let reserved = ActorRegistry::with_reserved();
        let resolver = ActorResolver::new(&host, &reserved);
        let mut entry = entry();
        let mut text = "Player: I accept.".to_string();
        resolver.apply_prepended_actor(&mut text, &mut entry);
        assert_eq!(entry.actor, PLAYER_ACTOR_ID);
        assert_eq!(entry.conversant, STORY_ACTOR_ID);
    }

    #[test]
    fn tags_override_roles() {
        let host = host();
        let reserved = ActorRegistry::with_reserved();
        let resolver = ActorResolver::new(&host, &reserved);
        let mut entry = entry();
        let tags = vec![
            "Actor=Passepartout".to_string(),
            "Conversant=Fogg".to_string(),
            "mood=tense".to_string(),
        ];
        resolver.apply_tags(&tags, &mut entry);
        assert_eq!(Some(entry.actor), resolver.resolve("Passepartout"));
        assert_eq!(Some(entry.conversant), resolver.resolve("Fogg"));
        assert_eq!(
            tagged_actor_names(&tags).collect::<Vec<_>>(),
            vec!["Passepartout", "Fogg"]
        );
    }
}
