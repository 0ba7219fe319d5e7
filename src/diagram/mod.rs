//! Diagram and project representation.
//!
//! This module holds the editor-owned data the engine reads: a [`Project`]
//! of [`Diagram`]s, each a list of [`NodeInstance`]s wired together by
//! [`Edge`]s. The engine never mutates these during a solve; results are
//! merged back explicitly with [`Diagram::apply`].

mod graph;
mod types;

pub use graph::{Diagram, NodeInstance, Project};
pub use types::*;
