//! Broken-disk table persistence (spec §4.G) and cluster-wide
//! reconciliation (spec §4.F "Cluster-wide synchronization").
//!
//! Grounded on `broken_disk_table_*` usage in
//! `examples/original_source/admind/services/rdev/src/service_rdev.c`:
//! an in-memory `{version, uuids[]}` table that is the source of truth
//! while the node is up, flushed on every change, with peer tables
//! merged by `rdev_synchronise_broken_disk_table`. On-disk encoding
//! follows the superblock codec's raw-byte-copy style
//! (`exa-vrt`'s `superblock.rs`) rather than the original's bespoke
//! binary reader, since both are fixed-size C-layout records.

use std::mem::size_of;
use std::path::{Path, PathBuf};

use exa_common::{Error, Result, Uuid};

use crate::atomic_file::write_atomic;

/// Upper bound on distinct broken disks tracked cluster-wide. The
/// original's `NBMAX_DISKS` is defined in a header outside the
/// retrieval pack; this doubles `exa_vrt::superblock::NBMAX_RDEVS`
/// (128) to comfortably cover a multi-group cluster (see DESIGN.md).
pub const NBMAX_DISKS: usize = 256;

#[repr(C)]
struct RawTable {
	version: u64,
	uuids: [[u32; 4]; NBMAX_DISKS],
}

const RAW_SIZE: usize = size_of::<RawTable>();

/// The cluster's broken-disk table: a version counter and a fixed-size
/// set of disk UUIDs currently considered broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenDiskTable {
	pub version: u64,
	uuids: Vec<Uuid>,
}

impl BrokenDiskTable {
	pub fn empty() -> Self {
		Self {
			version: 0,
			uuids: Vec::new(),
		}
	}

	pub fn contains(&self, uuid: &Uuid) -> bool {
		self.uuids.contains(uuid)
	}

	pub fn uuids(&self) -> &[Uuid] {
		&self.uuids
	}

	/// Replaces the broken-disk set (`broken_disk_table_clear` +
	/// repeated `broken_disk_table_set_disk` in the original), without
	/// touching `version` — callers bump that explicitly.
	pub fn set_disks(&mut self, uuids: impl IntoIterator<Item = Uuid>) -> Result<()> {
		let uuids: Vec<Uuid> = uuids.into_iter().collect();
		if uuids.len() > NBMAX_DISKS {
			return Err(Error::Corrupt(format!(
				"{} broken disks exceeds table capacity {NBMAX_DISKS}",
				uuids.len()
			)));
		}
		self.uuids = uuids;
		Ok(())
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		let mut raw = RawTable {
			version: self.version,
			uuids: [[0u32; 4]; NBMAX_DISKS],
		};
		for (slot, uuid) in raw.uuids.iter_mut().zip(self.uuids.iter()) {
			*slot = uuid.words();
		}
		unsafe { std::slice::from_raw_parts(&raw as *const RawTable as *const u8, RAW_SIZE) }.to_vec()
	}

	pub fn parse(bytes: &[u8]) -> Result<Self> {
		if bytes.len() != RAW_SIZE {
			return Err(Error::Corrupt(format!(
				"broken-disk table is {} bytes, expected {RAW_SIZE}",
				bytes.len()
			)));
		}
		let mut raw = std::mem::MaybeUninit::<RawTable>::uninit();
		unsafe {
			std::ptr::copy_nonoverlapping(bytes.as_ptr(), raw.as_mut_ptr() as *mut u8, RAW_SIZE);
			let raw = raw.assume_init();
			let version = raw.version;
			let uuids = raw
				.uuids
				.into_iter()
				.map(Uuid::from_words)
				.filter(|u| !u.is_nil())
				.collect();
			Ok(Self { version, uuids })
		}
	}

	fn path(cache_dir: &Path) -> PathBuf {
		cache_dir.join("broken_disks")
	}

	/// Loads the table from `<cache_dir>/broken_disks`, or an empty
	/// table at version 0 if the file doesn't exist yet.
	pub fn load(cache_dir: &Path) -> Result<Self> {
		let path = Self::path(cache_dir);
		match std::fs::read(&path) {
			Ok(bytes) => Self::parse(&bytes),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::empty()),
			Err(e) => Err(Error::Io(e)),
		}
	}

	pub fn save(&self, cache_dir: &Path) -> Result<()> {
		write_atomic(&Self::path(cache_dir), &self.to_bytes())
	}

	pub fn remove_file(cache_dir: &Path) -> Result<()> {
		match std::fs::remove_file(Self::path(cache_dir)) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(Error::Io(e)),
		}
	}
}

/// One node's contribution to a `BROKEN_DISKS_EXCHANGE` recovery pass
/// (spec §4.F, §6).
#[derive(Debug, Clone)]
pub struct NodeReply {
	pub node_id: u32,
	pub version: u64,
	pub table: BrokenDiskTable,
}

/// Picks the winning table among every live node's reply: highest
/// `version` wins, ties broken by lowest `node_id`.
///
/// The original's `rdev_synchronise_broken_disk_table` accepts a reply
/// only if `version >= best_version && node_id < best_node_id` — which
/// silently rejects a strictly higher version carried by a
/// higher-numbered node. Spec §9's Open Questions flags this as an
/// apparent inversion and mandates "lowest node_id wins ties"; this
/// implements that corrected rule rather than the original's.
pub fn reconcile<'a>(replies: impl IntoIterator<Item = &'a NodeReply>) -> Option<&'a NodeReply> {
	let winner = replies.into_iter().fold(None, |best, reply| match best {
		None => Some(reply),
		Some(b) if reply.version > b.version => Some(reply),
		Some(b) if reply.version == b.version && reply.node_id < b.node_id => Some(reply),
		Some(b) => Some(b),
	});
	if let Some(w) = winner {
		log::info!("broken-disk table reconciled: node {} wins at version {}", w.node_id, w.version);
	}
	winner
}
