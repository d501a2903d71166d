//! # py-feed
//!
//! Client-side catalog logic for PerdidosYa!: the paginated feed, optimistic
//! mutations, per-tab scroll loaders and the session that ties them together.

pub mod entry;
pub mod feed;
pub mod loader;
pub mod mutations;
pub mod notify;
pub mod remote;
pub mod session;
pub mod settings;
pub mod share;

pub use feed::{FeedController, FeedHandle, PageLoad};
pub use loader::{ScrollLoader, Sentinel, TabLoaders};
pub use mutations::{CatalogPorts, Confirmation, DeleteOutcome, MutationCoordinator};
pub use session::{CatalogSession, CatalogView, TabView};
pub use settings::FeedSettings;
pub use share::SharePayload;
