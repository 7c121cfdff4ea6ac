//! Persisted profiles and their index.

pub mod model;
pub mod store;

pub use model::{AppliesTo, IndexEntry, Profile, ProfileDraft};
pub use store::{ProfileStore, StoreError};
