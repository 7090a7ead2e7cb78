//! The superblock checksum: a 32-bit generalization of the classic
//! Internet checksum (RFC 1071), folding 32-bit words instead of
//! 16-bit ones, computed over a whole superblock slot with the
//! checksum field zeroed.

/// Computes the checksum of `data`, which must have a length that is a
/// multiple of 4 bytes (every superblock slot does).
///
/// The algorithm sums the buffer as little-endian `u32` words into a
/// 64-bit accumulator, folds the carries back into 32 bits, and takes
/// the one's complement — the same shape as the 16-bit Internet
/// checksum, widened to 32-bit words per spec §4.A.
pub fn compute(data: &[u8]) -> u32 {
	debug_assert_eq!(data.len() % 4, 0, "checksum input must be word-aligned");

	let mut sum: u64 = 0;
	for chunk in data.chunks_exact(4) {
		sum += u32::from_le_bytes(chunk.try_into().unwrap()) as u64;
	}
	while sum >> 32 != 0 {
		sum = (sum & 0xFFFF_FFFF) + (sum >> 32);
	}
	!(sum as u32)
}

/// Verifies that `data` (with its checksum field already zeroed by the
/// caller) carries checksum `expected`.
pub fn verify(data: &[u8], expected: u32) -> bool {
	compute(data) == expected
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn checksum_of_zeroed_checksum_field_round_trips() {
		let mut buf = [0u8; 16];
		buf[0..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
		buf[4..8].copy_from_slice(&0u32.to_le_bytes()); // checksum field
		buf[8..12].copy_from_slice(&1u32.to_le_bytes());

		let sum = compute(&buf);
		buf[4..8].copy_from_slice(&sum.to_le_bytes());

		let mut check_buf = buf;
		check_buf[4..8].copy_from_slice(&0u32.to_le_bytes());
		assert!(verify(&check_buf, sum));
	}

	#[test]
	fn single_bit_flip_changes_checksum() {
		let buf = [1u8, 0, 0, 0, 2, 0, 0, 0];
		let mut flipped = buf;
		flipped[0] ^= 1;
		assert_ne!(compute(&buf), compute(&flipped));
	}
}
