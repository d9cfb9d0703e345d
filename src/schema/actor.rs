use serde::{Deserialize, Serialize};

/// Newtype wrapper for actor IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u32);

/// Reserved ID of the player actor.
pub const PLAYER_ACTOR_ID: ActorId = ActorId(1);

/// Reserved ID of the generic story speaker.
pub const STORY_ACTOR_ID: ActorId = ActorId(2);

/// A participant that can speak or listen in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    pub is_player: bool,
}

impl Actor {
    pub fn new(id: ActorId, name: &str, is_player: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            is_player,
        }
    }
}

/// An ordered set of actors, looked up by exact (case-sensitive) name.
///
/// The bridge keeps a registry holding only the two reserved actors; hosts
/// keep the master registry that every name is resolved against first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActorRegistry {
    actors: Vec<Actor>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self { actors: Vec::new() }
    }

    /// A registry holding `Player` and the generic story speaker `NPC`.
    pub fn with_reserved() -> Self {
        let mut registry = Self::new();
        registry.register(Actor::new(PLAYER_ACTOR_ID, "Player", true));
        registry.register(Actor::new(STORY_ACTOR_ID, "NPC", false));
        registry
    }

    /// Add an actor, replacing any existing actor with the same ID.
    pub fn register(&mut self, actor: Actor) {
        match self.actors.iter_mut().find(|a| a.id == actor.id) {
            Some(existing) => *existing = actor,
            None => self.actors.push(actor),
        }
    }

    /// Add a new actor under the next free ID and return that ID.
    pub fn add(&mut self, name: &str, is_player: bool) -> ActorId {
        let next = self.actors.iter().map(|a| a.id.0).max().unwrap_or(0) + 1;
        let id = ActorId(next.max(STORY_ACTOR_ID.0 + 1));
        self.register(Actor::new(id, name, is_player));
        id
    }

    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        self.actors.iter().find(|a| a.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Actor> {
        self.actors.iter().find(|a| a.name == name)
    }

    pub fn id_of(&self, name: &str) -> Option<ActorId> {
        self.by_name(name).map(|a| a.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Actor> {
        self.actors.iter()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
