//! Narrative Bridge: runs branching narrative stories behind a graph-based
//! dialogue runtime.
//!
//! A story engine advances one line at a time and offers ad-hoc choice lists.
//! The bridge presents it as an ordinary conversation graph: a fixed engine
//! conversation whose anchor entry is rewritten with each line and whose
//! choice entries are regenerated at every branch point. Story variables are
//! mirrored into a shared variable store, and story state round-trips through
//! that store for save and restore.

pub mod core;
pub mod schema;
