//! The bridge session: loaded stories, the shadow graph, and the shared
//! state they synchronize through. Built via `StoryBridge::builder()`.

use std::cell::{Ref, RefCell, RefMut};
use std::marker::PhantomData;
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, info};

use super::functions::{self, FunctionContext};
use super::graph::{ShadowGraph, ENGINE_CONVERSATION_ID, ENGINE_CONVERSATION_TITLE};
use super::host::{DialogueHost, MemoryHost, SharedHost};
use super::lifecycle::Lifecycle;
use super::sequence::Sequencer;
use super::settings::BridgeSettings;
use super::story::{Story, StoryError};
use super::variables::{self, SharedVariables, VariableStore};
use crate::schema::actor::ActorRegistry;
use crate::schema::dialogue::{Conversation, ConversationId, EntryId};
use crate::schema::value::Value;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("story error: {0}")]
    Story(#[from] StoryError),
    #[error("no story titled '{0}'")]
    UnknownStory(String),
    #[error("no entry {entry:?} in conversation {conversation:?}")]
    UnknownEntry {
        conversation: ConversationId,
        entry: EntryId,
    },
    #[error("choice entry {0:?} carries no choice index")]
    MissingChoiceIndex(EntryId),
    #[error("unknown host function '{0}'")]
    UnknownFunction(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

pub const SET_STORY_BOOL: &str = "SetStoryBool";
pub const SET_STORY_NUMBER: &str = "SetStoryNumber";
pub const SET_STORY_STRING: &str = "SetStoryString";
pub const GET_STORY_BOOL: &str = "GetStoryBool";
pub const GET_STORY_NUMBER: &str = "GetStoryNumber";
pub const GET_STORY_STRING: &str = "GetStoryString";

/// Functions the host's own scripting layer may call on the bridge.
pub const HOST_FUNCTIONS: [&str; 6] = [
    SET_STORY_BOOL,
    SET_STORY_NUMBER,
    SET_STORY_STRING,
    GET_STORY_BOOL,
    GET_STORY_NUMBER,
    GET_STORY_STRING,
];

/// A story owned by the session, with what is needed to rebuild it.
pub(crate) struct LoadedStory<S> {
    pub title: String,
    pub source: String,
    pub conversation: ConversationId,
    pub story: S,
}

/// A running bridge between narrative stories and a dialogue runtime.
pub struct StoryBridge<S: Story> {
    pub(crate) settings: BridgeSettings,
    pub(crate) stories: Vec<LoadedStory<S>>,
    pub(crate) graph: ShadowGraph,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) reserved_actors: ActorRegistry,
    pub(crate) shared: FunctionContext,
    host_functions_registered: bool,
}

/// Builder for constructing a `StoryBridge`.
pub struct StoryBridgeBuilder<S> {
    settings: Option<BridgeSettings>,
    settings_path: Option<String>,
    stories: Vec<(String, String)>,
    story_paths: Vec<String>,
    stories_dir: Option<String>,
    host: Option<SharedHost>,
    _story: PhantomData<S>,
}

impl<S: Story> StoryBridge<S> {
    pub fn builder() -> StoryBridgeBuilder<S> {
        StoryBridgeBuilder {
            settings: None,
            settings_path: None,
            stories: Vec::new(),
            story_paths: Vec::new(),
            stories_dir: None,
            host: None,
            _story: PhantomData,
        }
    }

    /// Load a story at runtime. An empty source is ignored.
    pub fn add_story(&mut self, title: &str, source: &str) -> Result<(), BridgeError> {
        if source.trim().is_empty() {
            debug!(story = %title, "ignoring story with empty source");
            return Ok(());
        }
        self.load_story(title, source)
    }

    fn load_story(&mut self, title: &str, source: &str) -> Result<(), BridgeError> {
        info!(story = %title, "loading story");
        let mut story = S::from_source(source)?;

        let conversation = self.graph.add_story_conversation(title);
        variables::mirror_story_variables(&mut story, &self.shared.variables);
        functions::bind_external_functions(&mut story, &self.shared);
        self.shared
            .host
            .borrow_mut()
            .add_conversation(conversation, title);

        self.stories.push(LoadedStory {
            title: title.to_string(),
            source: source.to_string(),
            conversation,
            story,
        });
        Ok(())
    }

    /// Tell the host about every host-callable function. Runs once per
    /// session.
    pub fn register_host_functions(&mut self) {
        if self.host_functions_registered {
            return;
        }
        self.host_functions_registered = true;
        let mut host = self.shared.host.borrow_mut();
        for name in HOST_FUNCTIONS {
            host.register_function(name);
        }
    }

    pub fn host_functions_registered(&self) -> bool {
        self.host_functions_registered
    }

    /// Dispatch a host-callable function by name. Arguments are the
    /// variable name and, for setters, the value.
    pub fn call_host_function(&mut self, name: &str, args: &[Value]) -> Result<Value, BridgeError> {
        let variable = args.first().map(Value::as_text).unwrap_or_default();
        let value = args.get(1).cloned().unwrap_or_default();
        match name {
            SET_STORY_BOOL => Ok(Value::Bool(
                self.set_story_variable(&variable, Value::Bool(value.as_bool())),
            )),
            SET_STORY_NUMBER => Ok(Value::Bool(
                self.set_story_variable(&variable, Value::Number(value.as_number())),
            )),
            SET_STORY_STRING => Ok(Value::Bool(
                self.set_story_variable(&variable, Value::Text(value.as_text())),
            )),
            GET_STORY_BOOL => Ok(Value::Bool(self.story_bool(&variable))),
            GET_STORY_NUMBER => Ok(Value::Number(self.story_number(&variable))),
            GET_STORY_STRING => Ok(Value::Text(self.story_string(&variable))),
            _ => Err(BridgeError::UnknownFunction(name.to_string())),
        }
    }

    /// Write a variable into the first loaded story declaring it. Returns
    /// false when no story declares `name`.
    pub fn set_story_variable(&mut self, name: &str, value: Value) -> bool {
        let stories = self.stories.iter_mut().map(|loaded| &mut loaded.story);
        match variables::find_declaring_story(stories, name) {
            Some(story) => story.set_variable(name, value).is_ok(),
            None => false,
        }
    }

    /// Read a variable from the first loaded story declaring it.
    pub fn story_variable(&self, name: &str) -> Option<Value> {
        self.stories
            .iter()
            .find(|loaded| loaded.story.declares_variable(name))
            .and_then(|loaded| loaded.story.variable(name))
    }

    pub fn story_bool(&self, name: &str) -> bool {
        self.story_variable(name)
            .map(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn story_number(&self, name: &str) -> f64 {
        self.story_variable(name)
            .map(|v| v.as_number())
            .unwrap_or(0.0)
    }

    pub fn story_string(&self, name: &str) -> String {
        self.story_variable(name)
            .map(|v| v.as_text())
            .unwrap_or_default()
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn graph(&self) -> &ShadowGraph {
        &self.graph
    }

    pub fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.graph.conversation(id)
    }

    pub fn variables(&self) -> Ref<'_, VariableStore> {
        self.shared.variables.borrow()
    }

    pub fn variables_mut(&self) -> RefMut<'_, VariableStore> {
        self.shared.variables.borrow_mut()
    }

    pub fn shared_variables(&self) -> SharedVariables {
        self.shared.variables.clone()
    }

    pub fn host(&self) -> SharedHost {
        self.shared.host.clone()
    }

    pub fn reserved_actors(&self) -> &ActorRegistry {
        &self.reserved_actors
    }

    pub fn story_titles(&self) -> Vec<&str> {
        self.stories.iter().map(|l| l.title.as_str()).collect()
    }

    pub fn lookup_story(&self, title: &str) -> Option<&S> {
        self.stories
            .iter()
            .find(|l| l.title == title)
            .map(|l| &l.story)
    }

    pub fn lookup_story_mut(&mut self, title: &str) -> Option<&mut S> {
        self.stories
            .iter_mut()
            .find(|l| l.title == title)
            .map(|l| &mut l.story)
    }

    /// The stub conversation the host starts to play a story.
    pub fn story_conversation(&self, title: &str) -> Option<ConversationId> {
        self.stories
            .iter()
            .find(|l| l.title == title)
            .map(|l| l.conversation)
    }

    /// Tell the host about every conversation graph again.
    pub(crate) fn register_conversations(&self) {
        let mut host = self.shared.host.borrow_mut();
        for conversation in self.graph.conversations() {
            host.add_conversation(conversation.id, &conversation.title);
        }
    }
}

impl<S: Story> StoryBridgeBuilder<S> {
    /// Provide settings directly.
    pub fn settings(mut self, settings: BridgeSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Load settings from a RON file. Ignored when settings are given
    /// directly.
    pub fn settings_file(mut self, path: &str) -> Self {
        self.settings_path = Some(path.to_string());
        self
    }

    /// Provide a story source directly.
    pub fn story(mut self, title: &str, source: &str) -> Self {
        self.stories.push((title.to_string(), source.to_string()));
        self
    }

    /// Load a story file; its title is the file stem.
    pub fn story_file(mut self, path: &str) -> Self {
        self.story_paths.push(path.to_string());
        self
    }

    /// Load every `.ron` story in a directory, in file-name order.
    pub fn stories_dir(mut self, path: &str) -> Self {
        self.stories_dir = Some(path.to_string());
        self
    }

    pub fn host<H: DialogueHost + 'static>(mut self, host: Rc<RefCell<H>>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn build(self) -> Result<StoryBridge<S>, BridgeError> {
        let settings = match (self.settings, &self.settings_path) {
            (Some(settings), _) => settings,
            (None, Some(path)) => BridgeSettings::load_from_ron(Path::new(path))?,
            (None, None) => BridgeSettings::default(),
        };
        let host: SharedHost = match self.host {
            Some(host) => host,
            None => Rc::new(RefCell::new(MemoryHost::new())),
        };

        let mut sources = self.stories;
        for path in &self.story_paths {
            sources.push(read_story_file(Path::new(path))?);
        }
        if let Some(ref dir) = self.stories_dir {
            if Path::new(dir).exists() {
                sources.extend(read_story_dir(dir)?);
            }
        }

        let shared = FunctionContext {
            host,
            variables: Rc::new(RefCell::new(VariableStore::new())),
            sequencer: Rc::new(RefCell::new(Sequencer::new(
                settings.tie_sequences_to_dialogue_entries,
            ))),
        };

        let mut bridge = StoryBridge {
            settings,
            stories: Vec::new(),
            graph: ShadowGraph::new(),
            lifecycle: Lifecycle::default(),
            reserved_actors: ActorRegistry::with_reserved(),
            shared,
            host_functions_registered: false,
        };

        bridge
            .shared
            .host
            .borrow_mut()
            .add_conversation(ENGINE_CONVERSATION_ID, ENGINE_CONVERSATION_TITLE);
        for (title, source) in sources {
            bridge.load_story(&title, &source)?;
        }
        bridge.register_host_functions();

        Ok(bridge)
    }
}

fn read_story_file(path: &Path) -> Result<(String, String), BridgeError> {
    let source = std::fs::read_to_string(path)?;
    let title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();
    Ok((title, source))
}

fn read_story_dir(dir: &str) -> Result<Vec<(String, String)>, BridgeError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            paths.push(path);
        }
    }
    paths.sort();
    paths.iter().map(|p| read_story_file(p)).collect()
}
