//! Trace store engine
//!
//! This crate binds the storage layer into the per-host trace store:
//! - [`channel::TraceChannel`]: a record codec bound to one rotating store,
//!   in either the full-data or the slim-index role
//! - [`catalog::Catalog`]: the offset-indexed table of trace summaries
//! - [`search`]: the budget-bounded, paginated search executor
//! - [`retention::RetentionCoordinator`]: keeps catalog and index channel
//!   consistent as the data channel trims old segments
//! - [`rebuild`]: offline regeneration of catalog and index from raw
//!   data-channel segments
//! - [`host::HostStore`] / [`host::HostManager`]: lifecycle and public API

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod channel;
pub mod host;
pub mod rebuild;
pub mod retention;
pub mod search;

pub use catalog::Catalog;
pub use channel::{ChannelRole, TraceChannel};
pub use host::{HostDescriptor, HostManager, HostStore};
pub use rebuild::RebuildStats;
pub use retention::RetentionCoordinator;
