//! Tessera working-copy layer
//!
//! The client side of the system: the administrative area that tracks
//! what a working copy has, the reporter/editor streaming interfaces
//! that describe tree deltas, the remote-access session abstraction
//! (with a local-disk implementation), and the status driver that
//! compares a working copy against repository HEAD.

pub mod checkout;
mod crawler;
pub mod editor;
pub mod entries;
pub mod lock;
pub mod ra;
pub mod reporter;
pub mod status;

pub use checkout::checkout;
pub use editor::Editor;
pub use entries::{Entries, Entry, Schedule};
pub use lock::{AdminLock, AdminLockSet};
pub use ra::{LocalSession, RaSession};
pub use reporter::Reporter;
pub use status::{status, Status, StatusFlags, StatusKind};
