//! coursesync core library: domain types, content discovery, configuration.
//!
//! - [`types`]: content and remote kinds, descriptors, tri-state updates
//! - [`frontmatter`]: YAML frontmatter parsing
//! - [`discovery`]: `NN_`-prefixed content tree walking
//! - [`config`]: credentials and course id resolution
//! - [`retry`]: bounded fixed-backoff retry
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod discovery;
pub mod error;
pub mod frontmatter;
pub mod retry;
pub mod types;

pub use error::CoreError;
pub use types::{
    Answer, Body, CanvasMeta, ContentDescriptor, ContentKind, EventSpec, FieldUpdate,
    FrontMatter, Question, RemoteId, RemoteKind,
};
