//! Database layer (Firestore, with an in-memory backend for tests).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Encrypted OAuth credentials (keyed by user_id)
    pub const CREDENTIALS: &str = "credentials";
    /// Friendship edges (keyed by canonical pair key)
    pub const FRIENDSHIPS: &str = "friendships";
}
