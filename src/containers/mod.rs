//! Plain in-memory containers.
//!
//! These back the proxies as their exclusively-owned delegates and double as
//! the disconnected-snapshot types produced by detachment. They carry no
//! synchronization behavior of their own.

mod bag;
mod multimap;

pub use bag::Bag;
pub use multimap::Multimap;
