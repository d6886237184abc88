//! Cryptography used by the backend: the envelope cipher that protects the
//! submission store, admin password hashing, and hashing/derivation helpers.

pub mod envelope;
pub mod integrity;
pub mod passwords;
