//! Security primitives for the tool layer: path allowlisting and
//! key-value key validation.

pub mod keys;
pub mod path;

pub use keys::validate_kv_key;
pub use path::{PathPolicy, PathPolicyError};
