//! Node-up recovery orchestration (spec §4.H): scan candidate device
//! paths, identify disks by superblock magic and UUID, match against
//! the cluster's known rdev set, and build the path map to broadcast.
//!
//! Grounded on `rdev_recover_local`/`rdev_start_all_disks_matching_pattern`
//! in `examples/original_source/admind/services/rdev/src/service_rdev.c`:
//! scan, open exclusive+direct, read+identify, register if the owning
//! group is active, then broadcast. Superblock I/O failures
//! (`ErrInUse`, `ErrBadMagic`) just drop that candidate from the set
//! rather than aborting the scan (spec §7 propagation policy).

use std::collections::{HashMap, HashSet};

use exa_common::{Result, Uuid};

use crate::allowlist::DiskAllowlist;

/// What a successful superblock probe of a candidate path reports.
#[derive(Debug, Clone, Copy)]
pub struct ProbedDisk {
	pub rdev_uuid: Uuid,
}

/// Abstracts "open the device and read its first superblock", so tests
/// can supply a fake mapping instead of real disks.
pub trait DiskProber {
	fn probe(&self, path: &str) -> Result<ProbedDisk>;
}

/// The subset of cluster configuration recovery needs: which rdev
/// UUIDs exist and which group they belong to, and which groups are
/// currently active.
#[derive(Debug, Clone, Default)]
pub struct ClusterView {
	pub rdev_group: HashMap<Uuid, Uuid>,
	pub active_groups: HashSet<Uuid>,
}

impl ClusterView {
	pub fn is_known_and_active(&self, rdev: Uuid) -> bool {
		self.rdev_group
			.get(&rdev)
			.is_some_and(|group| self.active_groups.contains(group))
	}
}

/// Result of one recovery pass: disks identified and ready to register
/// with the request pipeline.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
	pub path_of: HashMap<Uuid, String>,
}

/// Scans `candidate_paths`, keeping only those the allowlist permits,
/// probing each; a disk is registered only if its UUID is known to the
/// cluster and its group is active (spec §4.H). Idempotent: the same
/// inputs always produce the same [`RecoveryResult`].
pub fn recover(
	candidate_paths: &[String],
	allow: &DiskAllowlist,
	prober: &dyn DiskProber,
	cluster: &ClusterView,
) -> RecoveryResult {
	let mut path_of = HashMap::new();
	for path in candidate_paths {
		if !allow.is_allowed(path) {
			log::debug!("recovery: {path} rejected by the disk allowlist");
			continue;
		}
		let probed = match prober.probe(path) {
			Ok(probed) => probed,
			Err(e) => {
				log::warn!("recovery: probe of {path} failed: {e}");
				continue;
			}
		};
		if cluster.is_known_and_active(probed.rdev_uuid) {
			log::info!("recovery: registered {} at {path}", probed.rdev_uuid);
			path_of.insert(probed.rdev_uuid, path.clone());
		}
	}
	RecoveryResult { path_of }
}
