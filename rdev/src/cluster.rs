//! Cluster RPC abstraction (spec §6): the two barriered broadcasts used
//! during a recovery pass, `BROKEN_DISKS_EXCHANGE` and `DISK_VERSION`.
//! A real deployment would carry these over the cluster's transport
//! (the original's `admwrk_bcast`/`admwrk_get_bcast`); here they're a
//! trait so tests can run an in-process fake with no networking at all.

use std::collections::HashMap;

use exa_common::Uuid;

use crate::broken_disks::{BrokenDiskTable, NodeReply};

/// Outcome of one peer's contribution to a barriered broadcast. A node
/// observed down contributes nothing and is excluded from reconciliation
/// (spec §6: "Down nodes contribute `-ADMIND_ERR_NODE_DOWN` and are
/// ignored").
pub enum PeerReply<T> {
	Reply(T),
	NodeDown,
}

/// Abstracts the cluster-wide broadcasts a recovery pass needs.
/// Every call blocks until every live peer has replied (spec §6:
/// "Both are barriered").
pub trait ClusterTransport: Send + Sync {
	/// `BROKEN_DISKS_EXCHANGE`: exchanges `{version, uuids}` with every
	/// peer, and returns every peer's reply (this node's own table is
	/// not included).
	fn exchange_broken_disks(&self, node_id: u32, mine: &BrokenDiskTable) -> Vec<PeerReply<NodeReply>>;

	/// Adopts `table` as this node's broken-disk table, both in memory
	/// and on disk.
	fn adopt_broken_disks(&self, node_id: u32, table: BrokenDiskTable);

	/// `DISK_VERSION`: broadcasts this node's disk path map and
	/// collects every peer's.
	fn exchange_disk_paths(
		&self,
		node_id: u32,
		mine: &HashMap<Uuid, String>,
	) -> Vec<PeerReply<HashMap<Uuid, String>>>;
}

/// An in-process stand-in for the cluster transport: every "node" is
/// just an entry in a shared table, with no real networking. Used by
/// tests exercising recovery end to end (spec §8 Scenario 4).
pub struct FakeCluster {
	nodes: std::sync::Mutex<HashMap<u32, NodeState>>,
}

struct NodeState {
	up: bool,
	table: BrokenDiskTable,
	paths: HashMap<Uuid, String>,
}

impl FakeCluster {
	pub fn new(node_ids: impl IntoIterator<Item = u32>) -> Self {
		let nodes = node_ids
			.into_iter()
			.map(|id| {
				(
					id,
					NodeState {
						up: true,
						table: BrokenDiskTable::empty(),
						paths: HashMap::new(),
					},
				)
			})
			.collect();
		Self {
			nodes: std::sync::Mutex::new(nodes),
		}
	}

	pub fn set_up(&self, node_id: u32, up: bool) {
		self.nodes.lock().unwrap().get_mut(&node_id).unwrap().up = up;
	}

	pub fn table_of(&self, node_id: u32) -> BrokenDiskTable {
		self.nodes.lock().unwrap()[&node_id].table.clone()
	}
}

impl ClusterTransport for FakeCluster {
	fn exchange_broken_disks(&self, node_id: u32, mine: &BrokenDiskTable) -> Vec<PeerReply<NodeReply>> {
		let mut nodes = self.nodes.lock().unwrap();
		nodes.get_mut(&node_id).unwrap().table = mine.clone();
		nodes
			.iter()
			.filter(|(&id, _)| id != node_id)
			.map(|(&id, state)| {
				if state.up {
					PeerReply::Reply(NodeReply {
						node_id: id,
						version: state.table.version,
						table: state.table.clone(),
					})
				} else {
					PeerReply::NodeDown
				}
			})
			.collect()
	}

	fn adopt_broken_disks(&self, node_id: u32, table: BrokenDiskTable) {
		self.nodes.lock().unwrap().get_mut(&node_id).unwrap().table = table;
	}

	fn exchange_disk_paths(
		&self,
		node_id: u32,
		mine: &HashMap<Uuid, String>,
	) -> Vec<PeerReply<HashMap<Uuid, String>>> {
		let mut nodes = self.nodes.lock().unwrap();
		nodes.get_mut(&node_id).unwrap().paths = mine.clone();
		nodes
			.iter()
			.filter(|(&id, _)| id != node_id)
			.map(|(&id, state)| {
				if state.up {
					PeerReply::Reply(state.paths.clone())
				} else {
					let _ = id;
					PeerReply::NodeDown
				}
			})
			.collect()
	}
}

/// Runs one full recovery pass for every currently-up node in `cluster`
/// (spec §4.F): gathers every node's local table plus its peers',
/// reconciles to a single winner, and adopts+persists it everywhere,
/// with the version incremented once. Returns the winning table.
pub fn run_recovery_pass(cluster: &FakeCluster, up_node_ids: &[u32]) -> BrokenDiskTable {
	let mut all_replies: Vec<NodeReply> = Vec::new();
	for &id in up_node_ids {
		let mine = cluster.table_of(id);
		all_replies.push(NodeReply {
			node_id: id,
			version: mine.version,
			table: mine.clone(),
		});
		for reply in cluster.exchange_broken_disks(id, &mine) {
			if let PeerReply::Reply(r) = reply {
				all_replies.push(r);
			}
		}
	}
	let winner = crate::broken_disks::reconcile(all_replies.iter())
		.cloned()
		.unwrap_or_else(|| NodeReply {
			node_id: 0,
			version: 0,
			table: BrokenDiskTable::empty(),
		});
	let mut adopted = winner.table;
	adopted.version += 1;
	for &id in up_node_ids {
		cluster.adopt_broken_disks(id, adopted.clone());
	}
	log::info!(
		"recovery pass adopted broken-disk table version {} across {} node(s)",
		adopted.version,
		up_node_ids.len()
	);
	adopted
}

#[cfg(test)]
mod test {
	use super::*;
	use exa_common::Uuid;

	fn disk(n: u32) -> Uuid {
		Uuid::from_words([n, 0, 0, 0])
	}

	#[test]
	fn recovery_pass_propagates_newly_broken_disk_to_every_up_node() {
		let cluster = FakeCluster::new([1, 2, 3]);
		let mut broken = BrokenDiskTable::empty();
		// Node 2's health monitor already bumped its local version on
		// detecting the failure, ahead of nodes 1 and 3 (still at 0).
		broken.version = 1;
		broken.set_disks([disk(42)]).unwrap();
		cluster.adopt_broken_disks(2, broken);

		let winner = run_recovery_pass(&cluster, &[1, 2, 3]);

		assert_eq!(winner.version, 2);
		assert!(winner.contains(&disk(42)));
		for id in [1, 2, 3] {
			assert_eq!(cluster.table_of(id), winner);
		}
	}

	#[test]
	fn down_node_is_excluded_from_reconciliation_and_not_updated() {
		let cluster = FakeCluster::new([1, 2, 3]);
		cluster.set_up(3, false);
		let mut broken = BrokenDiskTable::empty();
		broken.set_disks([disk(7)]).unwrap();
		cluster.adopt_broken_disks(1, broken.clone());

		let winner = run_recovery_pass(&cluster, &[1, 2]);
		assert!(winner.contains(&disk(7)));
		assert_eq!(cluster.table_of(1), winner);
		assert_eq!(cluster.table_of(2), winner);
		// node 3 was never contacted, so its table is untouched.
		assert_ne!(cluster.table_of(3), winner);
	}
}
