//! Disk lifecycle support: the per-node path allowlist, the
//! incarnation counter, broken-disk table persistence and cluster
//! reconciliation, the health monitor, and node-up recovery
//! orchestration (spec §4.F-H).

mod atomic_file;
pub mod allowlist;
pub mod broken_disks;
pub mod cluster;
pub mod health;
pub mod incarnation;
pub mod recovery;

pub use allowlist::DiskAllowlist;
pub use broken_disks::{BrokenDiskTable, NodeReply};
pub use cluster::{run_recovery_pass, ClusterTransport, FakeCluster, PeerReply};
pub use health::{DiskHealth, HealthMonitor};
pub use recovery::{recover, ClusterView, DiskProber, ProbedDisk, RecoveryResult};

#[cfg(test)]
mod test {
	use std::collections::{HashMap, HashSet};

	use exa_common::{Error, Result, Uuid};

	use super::*;

	fn uuid(n: u32) -> Uuid {
		Uuid::from_words([n, 0, 0, 0])
	}

	struct FlakyProber {
		/// disks this node can see, and whether each currently answers.
		disks: HashMap<String, (Uuid, bool)>,
	}

	impl DiskProber for FlakyProber {
		fn probe(&self, path: &str) -> Result<ProbedDisk> {
			match self.disks.get(path) {
				Some((uuid, true)) => Ok(ProbedDisk { rdev_uuid: *uuid }),
				Some((_, false)) => Err(Error::Io(std::io::Error::other("probe timed out"))),
				None => Err(Error::BadMagic),
			}
		}
	}

	/// Spec §8 Scenario 4: three nodes, node B's local disk fails its
	/// probe; after one recovery cycle every node's broken table agrees,
	/// and the disk is no longer recoverable anywhere in the cluster.
	#[test]
	fn scenario_broken_disk_propagates_to_every_node() {
		let failing_disk = uuid(99);
		let group = uuid(1);

		let mut health_b = HealthMonitor::new();
		let failures = health_b.tick([(failing_disk, Err(Error::Io(std::io::Error::other("io error"))))]);
		assert_eq!(failures, vec![failing_disk]);

		// Node B's health monitor reacts to the transition by bumping its
		// local broken-disk table ahead of the cluster-wide sync.
		let cluster = FakeCluster::new([1, 2, 3]);
		let mut table_b = BrokenDiskTable::empty();
		table_b.version = 1;
		table_b.set_disks([failing_disk]).unwrap();
		cluster.adopt_broken_disks(2, table_b);

		let winner = run_recovery_pass(&cluster, &[1, 2, 3]);
		assert!(winner.contains(&failing_disk));
		for node in [1, 2, 3] {
			assert_eq!(cluster.table_of(node), winner);
		}

		// Any node attempting to recover a group containing the broken
		// disk now excludes it from the candidate set.
		let view = ClusterView {
			rdev_group: HashMap::from([(failing_disk, group)]),
			active_groups: HashSet::from([group]),
		};
		let allow = DiskAllowlist::load(std::path::Path::new("/nonexistent")).unwrap();
		let prober = FlakyProber {
			disks: HashMap::from([("/dev/sdz".to_string(), (failing_disk, false))]),
		};
		let result = recover(&["/dev/sdz".to_string()], &allow, &prober, &view);
		assert!(result.path_of.is_empty());
	}
}
