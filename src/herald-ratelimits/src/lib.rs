//! Rate-limit backoff for herald.
//!
//! A single [`RateLimitHandler`] is shared by every call the dispatcher makes
//! against the message bus. A rate-limit signal from any call site pauses the
//! whole loop; a success from any call site clears the backoff.

pub mod display;
pub mod limits;
pub mod tracker;

pub use display::{format_backoff_status, format_secs};
pub use limits::{BackoffPolicy, RateLimitState};
pub use tracker::RateLimitHandler;
