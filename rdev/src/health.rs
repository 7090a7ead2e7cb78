//! Health monitor (spec §4.F): one tick per second, per local disk, a
//! synchronous probe I/O; `OK`→`FAIL` transitions are what trigger a
//! cluster recovery pass. Kept as a pure state machine driven by
//! already-performed probe results so it can be ticked from a real
//! timer thread or from a test without waiting a second at a time.

use std::collections::HashMap;

use exa_common::{Result, Uuid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskHealth {
	Ok,
	Fail,
}

/// Per-disk status, as observed by the most recent probe tick.
#[derive(Default)]
pub struct HealthMonitor {
	status: HashMap<Uuid, DiskHealth>,
}

impl HealthMonitor {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn status(&self, disk: Uuid) -> Option<DiskHealth> {
		self.status.get(&disk).copied()
	}

	/// Records one probe result per disk and returns every disk that
	/// just transitioned `Ok` → `Fail` this tick — those are the ones
	/// that broadcast `CHECK_DOWN` (spec §4.F). A disk probed for the
	/// first time is assumed to have been `Ok` beforehand, so an
	/// immediate failure still counts as a transition.
	pub fn tick(&mut self, probes: impl IntoIterator<Item = (Uuid, Result<()>)>) -> Vec<Uuid> {
		let mut transitioned = Vec::new();
		for (disk, probe) in probes {
			let new_status = if probe.is_ok() { DiskHealth::Ok } else { DiskHealth::Fail };
			let old_status = self.status.get(&disk).copied().unwrap_or(DiskHealth::Ok);
			self.status.insert(disk, new_status);
			if old_status == DiskHealth::Ok && new_status == DiskHealth::Fail {
				log::warn!("disk {disk} transitioned OK -> FAIL");
				transitioned.push(disk);
			}
		}
		transitioned
	}
}
