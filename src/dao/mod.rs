/// Error type shared by collaborator backends.
pub mod collaborator;
/// Records exchanged with the profile store.
pub mod models;
/// Song suggestion, catalog and commentary collaborators.
pub mod music;
/// Player profile lookups.
pub mod profile_store;
