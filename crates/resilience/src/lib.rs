//! Resilience helpers for the sync engine
//!
//! Currently this is bounded-time execution: shutdown paths must not hang on
//! a slow remote store, so they run their last flush under a [`Timeout`].
//!
//! # Example
//!
//! ```rust
//! use shoplist_resilience::Timeout;
//! use std::time::Duration;
//!
//! let rt = tokio::runtime::Builder::new_current_thread()
//!     .enable_time()
//!     .build()
//!     .unwrap();
//!
//! rt.block_on(async {
//!     let timeout = Timeout::new(Duration::from_secs(2));
//!     let value = timeout.run("final flush", async { 42 }).await.unwrap();
//!     assert_eq!(value, 42);
//! });
//! ```

mod error;
mod timeout;

pub use error::{ResilienceError, ResilienceResult};
pub use timeout::{with_timeout, Timeout};
