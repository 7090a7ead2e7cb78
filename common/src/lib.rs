//! Pieces shared by every Exanodes-core crate: the UUID type, the
//! superblock checksum, the stable error kinds, and a few byte/time
//! helpers.

pub mod checksum;
pub mod error;
pub mod units;
pub mod uuid;

pub use error::{Error, Result};
pub use uuid::Uuid;
