//! Mock Infrastructure for Testing Herald
//!
//! Reusable adapters, channels and stores for exercising the engine without real data
//! sources or delivery backends.
//!
//! ## Components
//!
//! - `sources`: static, slow (concurrency-tracking) and failing data source adapters
//! - `channels`: a channel that records every notification, one that always fails and one
//!   that panics
//! - `stores`: an artifact store that fails for selected definitions
//! - Test helpers for common definitions, rules and snapshots
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{RecordingChannel, SlowSource};
//!
//! let channel = Arc::new(RecordingChannel::new());
//! let runtime = HeraldRuntime::builder()
//!     .with_config(config)
//!     .with_channel("recording", channel.clone())
//!     .build()
//!     .await?;
//! ```

pub mod stores;
pub mod test_helpers;

pub use channels::{FailingChannel, PanickingChannel, RecordingChannel};
pub use sources::{FailingSource, SlowSource, StaticSource};
pub use stores::SelectiveFailingStore;
pub use test_helpers::*;
