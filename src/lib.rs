//! Burst coalescing for expensive side-effecting operations.
//!
//! A [`Debouncer`] wraps a fallible action and a quiescence period. Each
//! call to [`Debouncer::trigger`] joins the in-flight coalescing session
//! (starting one if none is active) and receives a [`Handle`] resolving to
//! that session's single outcome: the action runs once per burst, after no
//! new trigger has arrived for the full period.

pub mod debounce;
pub mod error;
pub mod handle;

pub use debounce::Debouncer;
pub use error::DebounceError;
pub use handle::{Handle, Outcome};
