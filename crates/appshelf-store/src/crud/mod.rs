//! Orchestrators for the app-storage operations.
//!
//! Each takes a [`LockedStorage`](crate::LockedStorage) context, i.e. it
//! can only run while the storage lock is held.  The mutating ones touch
//! the stores in a fixed order (metadata, package, icon), commit the
//! metadata step on its own, and run the consistency pass exactly once
//! before returning, on success and failure alike.

pub mod adder;
pub mod deleter;
pub mod getter;
pub mod updater;
