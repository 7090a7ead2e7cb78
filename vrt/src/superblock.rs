//! The on-disk superblock codec (spec §4.A, §6): `sb_group`, `sb_rdevs`
//! and `sb_zone_sstriping`, each a fixed 4 KiB slot at the disk tail.
//!
//! Every struct here is `#[repr(C, packed)]` and is read from / written
//! to disk by reinterpreting its raw bytes, the way the teacher's GPT
//! and MBR codecs do (`fdisk/src/partition.rs`). A torn write is
//! detected on the next read by checksum mismatch (spec §4.A); this
//! module never retries across replicas itself — that's
//! `crate::group::Group::start`'s job, since only it knows the other
//! rdevs of the group.

use std::mem::size_of;

use exa_common::{checksum, Error, Result, Uuid};

/// Size in bytes of every superblock slot.
pub const SB_SIZE: usize = 4096;

/// Maximum number of rdevs in a group (spec §3, `NBMAX_RDEVS`).
pub const NBMAX_RDEVS: usize = 128;

/// Maximum number of zone slots in a group (spec §3, `NBMAX_ZONES`).
pub const NBMAX_ZONES: usize = 256;

/// Maximum length in bytes of a group or zone name.
pub const NAME_MAX_SZ: usize = 16;

/// Maximum number of extents recorded in a zone's superblock
/// (`NB_ETENDUES` in the original).
pub const NB_ETENDUES: usize = 127;

pub const SBG_MAGIC: u32 = 0x6DCA_6E8E;
pub const SBR_MAGIC: u32 = 0x7B91_20A1;
pub const SBZ_SSTRIPING_MAGIC: u32 = 0x1EBB_790D;

/// Layout code for single striping, the only layout implemented.
pub const SSTRIPING_LAYOUT: u8 = 0x01;

const SBG_PAYLOAD: usize =
	4 * 4 + 4 + 4 + 4 * 4 + 4 * 4 + NAME_MAX_SZ + 4 + 1 + 4 + 4 + 4 + 4 + NBMAX_ZONES;
const SBR_PAYLOAD: usize = 4 + 4 + NBMAX_RDEVS * 4 * 4;
const SBZ_PAYLOAD: usize = 4 + NAME_MAX_SZ + 4 * 4 + 4 + 4 * 3 + 4 + 8 + 4 + NB_ETENDUES * 4 * 2;

const _: () = assert!(SBG_PAYLOAD <= SB_SIZE);
const _: () = assert!(SBR_PAYLOAD <= SB_SIZE);
const _: () = assert!(SBZ_PAYLOAD <= SB_SIZE);

/// The group superblock, replicated on every rdev of the group with a
/// per-rdev `rdev_uuid` identifying the owning disk (spec §4.A).
#[derive(Clone, Copy)]
#[repr(C, packed)]
pub struct SbGroup {
	/// UUID of the rdev carrying this copy of the superblock.
	pub rdev_uuid: [u32; 4],
	pub magic: u32,
	pub vrt_version: u32,
	pub uuid: [u32; 4],
	pub thisdev_uuid: [u32; 4],
	pub gname: [u8; NAME_MAX_SZ],
	pub create_time: u32,
	pub layout: u8,
	pub checksum: u32,
	pub update_time: u32,
	pub nb_zones: u32,
	pub nb_rdevs: u32,
	pub zone_exist: [u8; NBMAX_ZONES],
	_pad: [u8; SB_SIZE - SBG_PAYLOAD],
}

/// The rdev-list superblock: the UUID of every rdev in the group,
/// identical on every rdev (spec §4.A).
#[derive(Clone, Copy)]
#[repr(C, packed)]
pub struct SbRdevs {
	pub magic: u32,
	pub checksum: u32,
	pub uuid_rdevs: [[u32; 4]; NBMAX_RDEVS],
	_pad: [u8; SB_SIZE - SBR_PAYLOAD],
}

/// The zone superblock for the `sstriping` layout: a run-length-coded
/// list of extent indices (spec §6).
#[derive(Clone, Copy)]
#[repr(C, packed)]
pub struct SbZoneSstriping {
	pub magic: u32,
	pub name: [u8; NAME_MAX_SZ],
	pub zone_uuid: [u32; 4],
	pub create_time: u32,
	_pad1: [u32; 3],
	pub update_time: u32,
	pub zone_size: u64,
	pub nb_etendues: u32,
	pub pl_start: [u32; NB_ETENDUES],
	pub pl_end: [u32; NB_ETENDUES],
	_pad2: [u8; SB_SIZE - SBZ_PAYLOAD],
}

/// Reinterprets `value` as its raw `SB_SIZE`-byte representation.
///
/// # Safety
/// `T` must be a `#[repr(C, packed)]` struct whose size is exactly
/// `SB_SIZE` and which contains no padding bytes with uninitialized
/// meaning (all fields here are plain integers/arrays, so any bit
/// pattern is valid).
unsafe fn as_bytes<T>(value: &T) -> [u8; SB_SIZE] {
	debug_assert_eq!(size_of::<T>(), SB_SIZE);
	let ptr = value as *const T as *const u8;
	let mut out = [0u8; SB_SIZE];
	std::ptr::copy_nonoverlapping(ptr, out.as_mut_ptr(), SB_SIZE);
	out
}

/// Reinterprets a `SB_SIZE`-byte buffer as `T`.
///
/// # Safety
/// Same requirements as [`as_bytes`]: `T` must be `SB_SIZE` bytes of
/// plain-old-data with no invalid bit patterns.
unsafe fn from_bytes<T: Copy>(buf: &[u8; SB_SIZE]) -> T {
	debug_assert_eq!(size_of::<T>(), SB_SIZE);
	std::ptr::read_unaligned(buf.as_ptr() as *const T)
}

fn name_to_array(name: &str) -> [u8; NAME_MAX_SZ] {
	let mut arr = [0u8; NAME_MAX_SZ];
	let bytes = name.as_bytes();
	let n = bytes.len().min(NAME_MAX_SZ);
	arr[..n].copy_from_slice(&bytes[..n]);
	arr
}

fn name_from_array(arr: &[u8; NAME_MAX_SZ]) -> String {
	let end = arr.iter().position(|&b| b == 0).unwrap_or(arr.len());
	String::from_utf8_lossy(&arr[..end]).into_owned()
}

fn uuid_to_words(u: Uuid) -> [u32; 4] {
	u.words()
}

fn uuid_from_words(words: [u32; 4]) -> Uuid {
	Uuid::from_words(words)
}

impl SbGroup {
	/// Builds a new group superblock, computing its checksum.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		rdev_uuid: Uuid,
		group_uuid: Uuid,
		thisdev_uuid: Uuid,
		gname: &str,
		create_time: u32,
		update_time: u32,
		nb_zones: u32,
		nb_rdevs: u32,
		zone_exist: [bool; NBMAX_ZONES],
	) -> Self {
		let mut sbg = Self {
			rdev_uuid: uuid_to_words(rdev_uuid),
			magic: SBG_MAGIC,
			vrt_version: 1,
			uuid: uuid_to_words(group_uuid),
			thisdev_uuid: uuid_to_words(thisdev_uuid),
			gname: name_to_array(gname),
			create_time,
			layout: SSTRIPING_LAYOUT,
			checksum: 0,
			update_time,
			nb_zones,
			nb_rdevs,
			zone_exist: zone_exist.map(|b| b as u8),
			_pad: [0; SB_SIZE - SBG_PAYLOAD],
		};
		sbg.recompute_checksum();
		sbg
	}

	pub fn group_uuid(&self) -> Uuid {
		uuid_from_words(self.uuid)
	}

	pub fn thisdev_uuid(&self) -> Uuid {
		uuid_from_words(self.thisdev_uuid)
	}

	pub fn rdev_uuid(&self) -> Uuid {
		uuid_from_words(self.rdev_uuid)
	}

	pub fn name(&self) -> String {
		name_from_array(&self.gname)
	}

	pub fn zone_exists(&self, slot: usize) -> bool {
		self.zone_exist[slot] != 0
	}

	/// Recomputes `checksum` over the whole slot with the field zeroed.
	pub fn recompute_checksum(&mut self) {
		self.checksum = 0;
		let bytes = unsafe { as_bytes(self) };
		self.checksum = checksum::compute(&bytes);
	}

	pub fn to_bytes(&self) -> [u8; SB_SIZE] {
		unsafe { as_bytes(self) }
	}

	/// Parses and validates a group superblock slot.
	pub fn parse(buf: &[u8; SB_SIZE]) -> Result<Self> {
		let sbg: Self = unsafe { from_bytes(buf) };
		if sbg.magic != SBG_MAGIC {
			return Err(Error::BadMagic);
		}
		let mut zeroed = sbg;
		zeroed.checksum = 0;
		let expected = sbg.checksum;
		if !checksum::verify(&unsafe { as_bytes(&zeroed) }, expected) {
			return Err(Error::BadChecksum);
		}
		Ok(sbg)
	}

	/// `true` if `self` and `other` agree on every field except
	/// `rdev_uuid` and `checksum` (spec §8 invariant 3).
	pub fn agrees_with(&self, other: &Self) -> bool {
		let (a_uuid, b_uuid) = ({ self.uuid }, { other.uuid });
		let (a_thisdev, b_thisdev) = ({ self.thisdev_uuid }, { other.thisdev_uuid });
		let (a_gname, b_gname) = ({ self.gname }, { other.gname });
		let (a_zone_exist, b_zone_exist) = ({ self.zone_exist }, { other.zone_exist });
		self.magic == other.magic
			&& self.vrt_version == other.vrt_version
			&& a_uuid == b_uuid
			&& a_thisdev == b_thisdev
			&& a_gname == b_gname
			&& self.create_time == other.create_time
			&& self.layout == other.layout
			&& self.update_time == other.update_time
			&& self.nb_zones == other.nb_zones
			&& self.nb_rdevs == other.nb_rdevs
			&& a_zone_exist == b_zone_exist
	}
}

impl SbRdevs {
	pub fn new(uuids: &[Uuid]) -> Result<Self> {
		if uuids.len() > NBMAX_RDEVS {
			return Err(Error::Corrupt("too many rdevs for SBR".into()));
		}
		let mut uuid_rdevs = [[0u32; 4]; NBMAX_RDEVS];
		for (slot, uuid) in uuid_rdevs.iter_mut().zip(uuids) {
			*slot = uuid_to_words(*uuid);
		}
		let mut sbr = Self {
			magic: SBR_MAGIC,
			checksum: 0,
			uuid_rdevs,
			_pad: [0; SB_SIZE - SBR_PAYLOAD],
		};
		sbr.recompute_checksum();
		Ok(sbr)
	}

	pub fn recompute_checksum(&mut self) {
		self.checksum = 0;
		let bytes = unsafe { as_bytes(self) };
		self.checksum = checksum::compute(&bytes);
	}

	pub fn to_bytes(&self) -> [u8; SB_SIZE] {
		unsafe { as_bytes(self) }
	}

	pub fn parse(buf: &[u8; SB_SIZE]) -> Result<Self> {
		let sbr: Self = unsafe { from_bytes(buf) };
		if sbr.magic != SBR_MAGIC {
			return Err(Error::BadMagic);
		}
		let mut zeroed = sbr;
		zeroed.checksum = 0;
		if !checksum::verify(&unsafe { as_bytes(&zeroed) }, sbr.checksum) {
			return Err(Error::BadChecksum);
		}
		Ok(sbr)
	}

	/// Returns the non-nil UUIDs stored in this slot, in slot order.
	pub fn uuids(&self) -> impl Iterator<Item = Uuid> + 'static {
		let words = { self.uuid_rdevs };
		words
			.into_iter()
			.map(uuid_from_words)
			.filter(|u| !u.is_nil())
			.collect::<Vec<_>>()
			.into_iter()
	}
}

impl SbZoneSstriping {
	pub fn new(
		name: &str,
		zone_uuid: Uuid,
		create_time: u32,
		update_time: u32,
		zone_size_kb: u64,
		extents: &[(u32, u32)],
	) -> Result<Self> {
		if extents.len() > NB_ETENDUES {
			return Err(Error::Corrupt("too many extents for SBZ".into()));
		}
		let mut pl_start = [0u32; NB_ETENDUES];
		let mut pl_end = [0u32; NB_ETENDUES];
		for (i, (start, end)) in extents.iter().enumerate() {
			pl_start[i] = *start;
			pl_end[i] = *end;
		}
		let mut sbz = Self {
			magic: SBZ_SSTRIPING_MAGIC,
			name: name_to_array(name),
			zone_uuid: uuid_to_words(zone_uuid),
			create_time,
			_pad1: [0; 3],
			update_time,
			zone_size: zone_size_kb,
			nb_etendues: extents.len() as u32,
			pl_start,
			pl_end,
			_pad2: [0; SB_SIZE - SBZ_PAYLOAD],
		};
		sbz.recompute_checksum();
		Ok(sbz)
	}

	/// This superblock variant has no standalone checksum field of its
	/// own in the original layout (spec §6); integrity for zone slots
	/// is instead provided by the group's replicated SBG/SBR agreement
	/// check. This hook exists for symmetry with the other two codecs
	/// and currently is a no-op, kept so a future on-disk revision can
	/// add one without changing every call site.
	pub fn recompute_checksum(&mut self) {}

	pub fn name(&self) -> String {
		name_from_array(&self.name)
	}

	pub fn zone_uuid(&self) -> Uuid {
		uuid_from_words(self.zone_uuid)
	}

	/// The extent list, decoded from the run-length-coded `pl_start`/`pl_end` pairs.
	pub fn extents(&self) -> Vec<(u32, u32)> {
		(0..self.nb_etendues as usize)
			.map(|i| (self.pl_start[i], self.pl_end[i]))
			.collect()
	}

	pub fn to_bytes(&self) -> [u8; SB_SIZE] {
		unsafe { as_bytes(self) }
	}

	pub fn parse(buf: &[u8; SB_SIZE]) -> Result<Self> {
		let sbz: Self = unsafe { from_bytes(buf) };
		if sbz.magic != SBZ_SSTRIPING_MAGIC {
			return Err(Error::BadMagic);
		}
		if sbz.nb_etendues as usize > NB_ETENDUES {
			return Err(Error::Corrupt("SBZ nb_etendues out of range".into()));
		}
		Ok(sbz)
	}
}
