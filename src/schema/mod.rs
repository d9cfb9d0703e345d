//! Data shared across the bridge: typed values, actors and conversation graphs.

pub mod actor;
pub mod dialogue;
pub mod value;
