pub mod actors;
pub mod bridge;
pub mod discovery;
pub mod functions;
pub mod graph;
pub mod host;
pub mod lifecycle;
pub mod persistence;
pub mod runner;
pub mod script;
pub mod sequence;
pub mod settings;
pub mod story;
pub mod variables;
