//! Links: explicit sharing relationships between two actors
//!
//! A link names what is shared (per direction), how transfers are initiated
//! (push/pull) and whether producers wait for receipt (sync/async).

mod table;
mod types;

pub use table::LinkTable;
pub use types::{Consistency, Link, LinkMode, LinkSpec, LinkStatus};
