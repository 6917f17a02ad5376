//! Shared keyscan model types.
//!
//! Pure data types used by the state backends and the extraction engine.
//! Kept in their own crate so both sides can share them without circular
//! dependencies.

pub mod key;
pub mod namespace;
pub mod record;
pub mod state;

pub use key::{Key, KeyRange, KeyType};
pub use namespace::Namespace;
pub use record::{Operation, Record};
