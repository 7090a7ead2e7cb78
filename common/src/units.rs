//! Byte and time helpers shared across the core, adapted from the
//! teacher's `util.rs` (`get_timestamp`, `ByteSize`, `log2`).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current time as unsigned 32-bit epoch seconds, the
/// width used by `create_time`/`update_time` in every superblock
/// (spec §3).
pub fn epoch_secs() -> u32 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("system clock is before the Unix epoch")
		.as_secs() as u32
}

/// Integer `log2`, returning `None` for `n == 0`.
pub fn log2(n: u64) -> Option<u64> {
	if n == 0 {
		None
	} else {
		Some(63 - n.leading_zeros() as u64)
	}
}

/// Ceiling division on unsigned 64-bit integers, used throughout the
/// placement engine (spec §4.C: "Integer divisions are floor; ceilings
/// are explicit").
pub const fn ceil_div(n: u64, d: u64) -> u64 {
	(n + d - 1) / d
}

/// A byte count, formatted with a binary (KiB/MiB/...) suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteSize(pub u64);

impl ByteSize {
	/// Builds a size from a number of 512-byte sectors.
	pub const fn from_sectors(count: u64) -> Self {
		Self(count * 512)
	}

	/// Builds a size from a number of kibibytes.
	pub const fn from_kb(count: u64) -> Self {
		Self(count * 1024)
	}
}

impl fmt::Display for ByteSize {
	fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
		const SUFFIXES: [&str; 7] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB"];

		if self.0 < 1024 {
			return write!(fmt, "{} bytes", self.0);
		}

		let mut order = log2(self.0).unwrap_or(0) / log2(1024).unwrap();
		if order == 0 || order as usize > SUFFIXES.len() {
			return write!(fmt, "{} bytes", self.0);
		}
		order = order.min(SUFFIXES.len() as u64);

		let unit = 1024u64.pow(order as u32);
		write!(fmt, "{} {}", self.0 / unit, SUFFIXES[order as usize - 1])
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn bytesize_formatting() {
		assert_eq!(format!("{}", ByteSize(0)), "0 bytes");
		assert_eq!(format!("{}", ByteSize(1023)), "1023 bytes");
		assert_eq!(format!("{}", ByteSize(1024)), "1 KiB");
		assert_eq!(format!("{}", ByteSize(2 * 1024 * 1024)), "2 MiB");
		assert_eq!(format!("{}", ByteSize::from_kb(128 * 1024)), "128 MiB");
	}

	#[test]
	fn ceil_div_basic() {
		assert_eq!(ceil_div(0, 4), 0);
		assert_eq!(ceil_div(1, 4), 1);
		assert_eq!(ceil_div(4, 4), 1);
		assert_eq!(ceil_div(5, 4), 2);
	}

	#[test]
	fn epoch_secs_is_recent() {
		// Sanity check only: must be after 2020-01-01.
		assert!(epoch_secs() > 1_577_836_800);
	}
}
