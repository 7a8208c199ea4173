//! # coursesync-sync
//!
//! Reconciles a content tree against a Canvas course.
//!
//! Call [`run`] with a [`RemoteApi`] (normally [`CanvasClient`]) and a
//! renderer. Local identity lives in `.canvas_sync_map.json` under the
//! content root; see [`IdentityStore`].

pub mod assets;
pub mod canvas;
pub mod change;
pub mod context;
pub mod error;
pub mod identity;
pub mod links;
pub mod modules;
pub mod payload;
pub mod pipeline;
pub mod prune;
pub mod publish;
pub mod quiz;
pub mod reconcile;
pub mod remote;
pub mod report;
pub mod resolver;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use canvas::CanvasClient;
pub use change::Freshness;
pub use error::SyncError;
pub use identity::{IdentityRecord, IdentityStore};
pub use pipeline::{run, SyncOptions};
pub use remote::RemoteApi;
pub use report::SyncReport;
