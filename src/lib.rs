//! A reference-counted shared-ownership handle with an explicit control block.
//!
//! `SharedHandle<T>` lets any number of owners share one heap-allocated value
//! and destroys the value when the last owner lets go. Unlike `Rc`, the
//! ownership record lives in its own allocation next to the payload, the
//! way a C++ `shared_ptr` does it, which makes it possible to:
//!
//! - adopt raw pointers, including null ones,
//! - supply a custom destroyer in place of dropping the payload,
//! - share a boxed slice through a pointer to its first element and index it,
//! - move, reset and swap ownership explicitly and observe the counts.
//!
//! `WeakObserver<T>` keeps a control block (not its payload) alive and can
//! report on the payload's owners.
//!
//! Allocation and release of control blocks is tallied per thread, see
//! [`thread_local_stats`]. With the `global` feature, threads merge their
//! tallies into [`global_stats`] as they exit.
//!
//! Counts are not atomic; nothing in this crate is `Send` or `Sync`.

pub(crate) mod control;
pub mod error;
pub(crate) mod ledger;
pub mod pointers;
pub mod stats;


pub use error::AllocError;
#[cfg(feature = "global")]
pub use ledger::global_stats;
pub use ledger::thread_local_stats;
pub use pointers::{SharedHandle, WeakObserver};
pub use stats::Stats;
