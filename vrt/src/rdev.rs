//! Real device (rdev) state (spec §3).

use exa_common::Uuid;
use std::path::PathBuf;

use crate::superblock::{NBMAX_ZONES, SB_SIZE};

/// Size in bytes of the reserved tail area: SBG + SBR + one SBZ slot
/// per possible zone (spec §6).
pub const METADATA_AREA_BYTES: u64 = (2 + NBMAX_ZONES as u64) * SB_SIZE as u64;

/// Smallest usable rdev size: twice the metadata area (spec §3).
pub fn min_rdev_size_kb() -> u64 {
	2 * METADATA_AREA_BYTES.div_ceil(1024)
}

/// Usable capacity of an rdev of `size_kb`, net of its metadata area;
/// `0` if the rdev is too small to hold any data past its metadata.
pub fn usable_size_kb(size_kb: u64) -> u64 {
	size_kb.saturating_sub(METADATA_AREA_BYTES.div_ceil(1024))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdevState {
	Ok,
	Fail,
	Missing,
}

/// A real device backing a group (spec §3).
#[derive(Debug, Clone)]
pub struct Rdev {
	pub uuid: Uuid,
	pub path: PathBuf,
	pub size_kb: u64,
	pub state: RdevState,
	pub capa_used_kb: u64,
	pub broken: bool,
	pub node_id: u32,
}

impl Rdev {
	pub fn new(uuid: Uuid, path: PathBuf, size_kb: u64, node_id: u32) -> Self {
		Self {
			uuid,
			path,
			size_kb,
			state: RdevState::Ok,
			capa_used_kb: 0,
			broken: false,
			node_id,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn min_size_is_twice_metadata_area() {
		let metadata_kb = METADATA_AREA_BYTES.div_ceil(1024);
		assert_eq!(min_rdev_size_kb(), 2 * metadata_kb);
	}

	#[test]
	fn rdev_smaller_than_metadata_has_no_usable_capacity() {
		assert_eq!(usable_size_kb(0), 0);
		assert_eq!(usable_size_kb(METADATA_AREA_BYTES.div_ceil(1024) / 2), 0);
	}
}
