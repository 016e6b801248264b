//! Time abstractions
//!
//! - **[`clock`]**: the `Clock` trait with the real [`SystemClock`] and the
//!   test-controlled [`MockClock`]
//!
//! ```rust
//! use std::time::Duration;
//!
//! use memcache_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::at_millis(1_000);
//! clock.advance(Duration::from_millis(250));
//! assert_eq!(clock.now_millis(), 1_250);
//! ```

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
