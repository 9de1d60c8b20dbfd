//! SQLite parameter-value database mapping.
//!
//! The rest of the system treats this as an opaque API: open a mapping by
//! URL, import entities and values, commit, query. Value encoding and
//! decoding live in `value`.

pub mod mapping;
pub mod value;

pub use mapping::{url_to_path, ParameterDb, ParameterValueRow};
pub use value::{from_database, ParameterValue};
