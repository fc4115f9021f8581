//! ywx document model
//!
//! The in-memory representation shared by both project file codecs:
//! typed-prefix identifiers, the entity types (novel, chapters, sections,
//! plot lines/points, world elements, project notes), and the ordered
//! project tree that records containment separate from entity storage.
//!
//! Codecs populate a [`Novel`] on read and flatten it again on write; the
//! model itself never touches the filesystem.

pub mod dates;
pub mod entity;
pub mod id;
pub mod text;
pub mod tree;

mod hook;

pub use entity::{
    Chapter, Character, ElementType, Links, Novel, PlotLine, PlotPoint, ProjectNote, SceneKind,
    Section, WorldElement,
};
pub use hook::ChangeHook;
pub use tree::ProjectTree;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("bad ID: '{id}' (expected prefix '{prefix}')")]
    BadId { id: String, prefix: &'static str },

    #[error("invalid ISO date: '{0}'")]
    InvalidDate(String),

    #[error("invalid ISO time: '{0}'")]
    InvalidTime(String),

    #[error("invalid integer: '{0}'")]
    InvalidInt(String),
}
