//! The UUID type used by every on-disk structure and every in-memory
//! identity (group, rdev, zone).
//!
//! Unlike a conventional 128-bit UUID, this one is defined the way the
//! original superblocks store it: four 32-bit words, compared and
//! hashed word-by-word, with no version/variant bits of its own.

use std::fmt;

use rand_core::{OsRng, RngCore};

/// A 128-bit identifier stored as four 32-bit words.
///
/// Two UUIDs are equal iff all four words are equal (spec §3).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[repr(C)]
pub struct Uuid(pub [u32; 4]);

impl Uuid {
	/// The all-zero UUID, used as a "no value" sentinel in broken-disk
	/// tables and unused superblock slots.
	pub const NIL: Self = Self([0; 4]);

	/// Generates a random UUID from the OS entropy source.
	pub fn random() -> Self {
		let mut words = [0u32; 4];
		let mut bytes = [0u8; 16];
		OsRng.fill_bytes(&mut bytes);
		for (w, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
			*w = u32::from_le_bytes(chunk.try_into().unwrap());
		}
		Self(words)
	}

	/// Builds a UUID from its four words, in order.
	pub const fn from_words(words: [u32; 4]) -> Self {
		Self(words)
	}

	/// Returns the four words, in order.
	pub const fn words(&self) -> [u32; 4] {
		self.0
	}

	/// True for the all-zero UUID.
	pub fn is_nil(&self) -> bool {
		self.0 == [0; 4]
	}
}

impl fmt::Display for Uuid {
	fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			fmt,
			"{:08x}:{:08x}:{:08x}:{:08x}",
			self.0[0], self.0[1], self.0[2], self.0[3]
		)
	}
}

/// Error returned when parsing a textual UUID fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid UUID string")]
pub struct ParseUuidError;

impl std::str::FromStr for Uuid {
	type Err = ParseUuidError;

	/// Parses the `XX:XX:XX:XX` format produced by `Display`.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut words = [0u32; 4];
		let mut parts = s.split(':');
		for word in &mut words {
			let part = parts.next().ok_or(ParseUuidError)?;
			*word = u32::from_str_radix(part, 16).map_err(|_| ParseUuidError)?;
		}
		if parts.next().is_some() {
			return Err(ParseUuidError);
		}
		Ok(Self(words))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn display_roundtrip() {
		let u = Uuid::from_words([0x6DCA6E8E, 1, 2, 0xdeadbeef]);
		let s = u.to_string();
		assert_eq!(s.parse::<Uuid>().unwrap(), u);
	}

	#[test]
	fn equality_is_wordwise() {
		let a = Uuid::from_words([1, 2, 3, 4]);
		let b = Uuid::from_words([1, 2, 3, 4]);
		let c = Uuid::from_words([1, 2, 3, 5]);
		assert_eq!(a, b);
		assert_ne!(a, c);
	}

	#[test]
	fn nil_is_zero() {
		assert!(Uuid::NIL.is_nil());
		assert!(!Uuid::random().is_nil());
	}
}
