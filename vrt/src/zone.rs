//! Zone (volume) state (spec §3, §4.D).

use exa_common::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
	ReadOnly,
	ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneState {
	Idle,
	Active(AccessMode),
}

/// A logical block device carved from a group.
#[derive(Debug, Clone)]
pub struct Zone {
	pub uuid: Uuid,
	pub name: String,
	pub size_kb: u64,
	pub create_time: u32,
	pub state: ZoneState,
	/// Ordered extent indices into the group's extent table; the
	/// concatenation of their contents is this zone's address space.
	pub plages: Vec<usize>,
	/// Slot this zone occupies in the group's `zone_exist` bitmap,
	/// i.e. which SBZ copy on each rdev holds its superblock.
	pub slot: usize,
	/// Assigned minor number while active; `None` when idle.
	pub minor: Option<u32>,
	/// Number of open handles on this zone's block device; `zone_stop`
	/// refuses while this is nonzero (spec §4.D).
	pub open_count: u32,
}

impl Zone {
	pub fn is_active(&self) -> bool {
		matches!(self.state, ZoneState::Active(_))
	}
}
