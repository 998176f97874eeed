//! Directory: where each actor lives and whether it is still alive

mod core;
mod entry;

pub use core::{Directory, DirectorySnapshot, Transition};
pub use entry::{Address, DirectoryEntry, EntryStatus};
