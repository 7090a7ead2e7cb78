//! Error kinds shared across the core, matching spec §7 and the stable
//! negative return codes of the original `ADMIND_ERR_*`/`VRT_ERR_*`
//! families (see `examples/original_source/admind`,
//! `examples/original_source/vrt`).

use std::io;

use crate::Uuid;

/// A core-wide error. Every public operation in `exa-vrt`, `exa-bdtarget`
/// and `exa-rdev` returns `Result<T, Error>`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("bad magic number in superblock slot")]
	BadMagic,

	#[error("checksum mismatch in superblock slot")]
	BadChecksum,

	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	#[error("device is already in use")]
	InUse,

	#[error("not found")]
	NotFound,

	#[error("name already taken: {0}")]
	NameTaken(String),

	#[error("not enough free space")]
	NoSpace,

	#[error("rdev too small: {size_kb} KiB < minimum {min_kb} KiB")]
	RdevTooSmall { size_kb: u64, min_kb: u64 },

	#[error("unknown disk {0}")]
	UnknownDisk(Uuid),

	#[error("disk {0} has moved and could not be relocated")]
	MovedDisk(Uuid),

	#[error("corrupt persisted state: {0}")]
	Corrupt(String),

	#[error("incompatible access mode")]
	AccessMode,

	#[error("node is down")]
	NodeDown,

	#[error("operation timed out")]
	Timeout,

	#[error("group needs at least one rdev")]
	TooFewRdevs,
}

impl Error {
	/// Stable negative error code, matching the naming convention of the
	/// original C return codes so external callers can match on a value
	/// rather than parse a message (spec §7).
	pub fn code(&self) -> i32 {
		match self {
			Error::BadMagic => -1001,
			Error::BadChecksum => -1002,
			Error::Io(e) => -e.raw_os_error().unwrap_or_else(libc_like_eio),
			Error::InUse => -1003, // ADMIND_ERR_DEVICE_IS_USED
			Error::NotFound => -1004,
			Error::NameTaken(_) => -1005, // ADMIND_ERR_GROUP_ALREADY_EXISTS
			Error::NoSpace => -1006,      // VRT_ERR_GROUP_FULL
			Error::RdevTooSmall { .. } => -1007,
			Error::UnknownDisk(_) => -1008,
			Error::MovedDisk(_) => -1009,
			Error::Corrupt(_) => -1010,
			Error::AccessMode => -1011, // ADMIND_ERR_VOLUME_NOT_STARTED family
			Error::NodeDown => -1012,   // ADMIND_ERR_NODE_DOWN
			Error::Timeout => -1013,
			Error::TooFewRdevs => -1014,
		}
	}
}

/// `EIO`, used for the generic I/O-error code when the underlying
/// `io::Error` carries no OS errno (e.g. an in-memory test fixture).
fn libc_like_eio() -> i32 {
	5
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
