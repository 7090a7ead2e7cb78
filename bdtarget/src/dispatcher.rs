//! Per-minor queues, bio merging, barrier markers, and round-robin
//! dispatch (spec §4.E). Kept as a plain `Mutex`-guarded state machine
//! with no I/O of its own — callers drive it one step at a time via
//! [`Dispatcher::dispatch_one`] and report results via
//! [`Dispatcher::complete`], which keeps the barrier-draining and
//! fairness logic unit-testable without a real thread or real disks.

use std::collections::{HashMap, VecDeque};

use crate::request::{new_handle, BdRequest, MarkerKind, Opcode, Outcome, QueueEntry, SubmitHandle};

#[derive(Default)]
struct MinorQueue {
	pending: VecDeque<QueueEntry>,
	/// Requests dispatched but not yet acked (spec §4.E "in-flight").
	in_flight: u32,
	/// Count of requests served since the minor was created, used only
	/// for diagnostics/fairness inspection in tests.
	current_run: u64,
}

/// What [`Dispatcher::dispatch_one`] handed the caller for this step.
pub enum Dispatched {
	/// A real request was dequeued; the caller must perform the I/O and
	/// report the outcome back via [`Dispatcher::complete`].
	Io { minor: u32, id: u64, request_summary: RequestSummary },
	/// A barrier marker drained with no I/O of its own.
	Marker { minor: u32, kind: MarkerKind },
}

/// Plain-data snapshot of a request handed to the caller performing
/// physical I/O, decoupled from the queue-internal completion senders.
#[derive(Debug, Clone, Copy)]
pub struct RequestSummary {
	pub opcode: Opcode,
	pub first_sector: u64,
	pub nr_sectors: u64,
	pub barrier: bool,
}

/// The dispatcher owns every minor's queue. One instance per session.
pub struct Dispatcher {
	minors: HashMap<u32, MinorQueue>,
	/// Round-robin cursor: minor served on the previous pass, if any.
	last_served: Option<u32>,
	next_request_id: u64,
	/// In-flight requests kept here so `complete` can find them again;
	/// absent entries (after `cancel_minor`) make `complete` a no-op.
	in_flight: HashMap<u64, BdRequest>,
}

impl Dispatcher {
	pub fn new() -> Self {
		Self {
			minors: HashMap::new(),
			last_served: None,
			next_request_id: 1,
			in_flight: HashMap::new(),
		}
	}

	pub fn add_minor(&mut self, minor: u32) {
		self.minors.entry(minor).or_default();
	}

	pub fn remove_minor(&mut self, minor: u32) {
		self.minors.remove(&minor);
	}

	/// Submits one bio. Barrier bios are expanded into
	/// pre-marker/write/post-marker per spec §4.E; non-barrier bios try
	/// to merge into the queue's tail request first.
	pub fn submit_bio(
		&mut self,
		minor: u32,
		opcode: Opcode,
		first_sector: u64,
		nr_sectors: u64,
		barrier: bool,
	) -> SubmitHandle {
		self.submit_bio_with_id(minor, opcode, first_sector, nr_sectors, barrier).1
	}

	/// Same as [`submit_bio`](Self::submit_bio), but also returns the id
	/// of the request this bio ended up part of — either a freshly
	/// allocated one or the tail request it merged into. Lets a caller
	/// that drives its own dispatch loop (e.g. a single-threaded block
	/// device surface) recognize when its own submission comes back
	/// around from [`dispatch_one`](Self::dispatch_one).
	pub fn submit_bio_with_id(
		&mut self,
		minor: u32,
		opcode: Opcode,
		first_sector: u64,
		nr_sectors: u64,
		barrier: bool,
	) -> (u64, SubmitHandle) {
		let (tx, handle) = new_handle();
		let queue = self.minors.entry(minor).or_default();

		if barrier {
			let id = self.next_request_id;
			self.next_request_id += 1;
			queue.pending.push_back(QueueEntry::Marker(MarkerKind::PreBarrier));
			queue
				.pending
				.push_back(QueueEntry::Io(BdRequest::new(id, minor, opcode, first_sector, nr_sectors, true, tx)));
			queue.pending.push_back(QueueEntry::Marker(MarkerKind::PostBarrier));
			return (id, handle);
		}

		if let Some(QueueEntry::Io(tail)) = queue.pending.back_mut() {
			if tail.can_absorb(opcode, first_sector, nr_sectors, false) {
				let id = tail.id;
				tail.absorb(nr_sectors, tx);
				return (id, handle);
			}
		}

		let id = self.next_request_id;
		self.next_request_id += 1;
		let queue = self.minors.get_mut(&minor).unwrap();
		queue
			.pending
			.push_back(QueueEntry::Io(BdRequest::new(id, minor, opcode, first_sector, nr_sectors, false, tx)));
		(id, handle)
	}

	/// One fairness pass: starting just after the last-served minor,
	/// finds the first minor whose head-of-queue entry is ready (a
	/// `Marker` is ready only once that minor's `in_flight` is zero)
	/// and dequeues exactly that one entry.
	pub fn dispatch_one(&mut self) -> Option<Dispatched> {
		let mut ids: Vec<u32> = self.minors.keys().copied().collect();
		ids.sort_unstable();
		if ids.is_empty() {
			return None;
		}
		let start = match self.last_served {
			Some(m) => ids.iter().position(|&x| x == m).map(|p| (p + 1) % ids.len()).unwrap_or(0),
			None => 0,
		};

		for step in 0..ids.len() {
			let minor = ids[(start + step) % ids.len()];
			let queue = self.minors.get_mut(&minor).unwrap();
			let ready = match queue.pending.front() {
				Some(QueueEntry::Marker(_)) => queue.in_flight == 0,
				Some(QueueEntry::Io(_)) => true,
				None => false,
			};
			if !ready {
				continue;
			}
			self.last_served = Some(minor);
			match queue.pending.pop_front().unwrap() {
				QueueEntry::Marker(kind) => return Some(Dispatched::Marker { minor, kind }),
				QueueEntry::Io(req) => {
					queue.in_flight += 1;
					queue.current_run += 1;
					let summary = RequestSummary {
						opcode: req.opcode,
						first_sector: req.first_sector,
						nr_sectors: req.nr_sectors,
						barrier: req.barrier,
					};
					let id = req.id;
					self.in_flight.insert(id, req);
					return Some(Dispatched::Io { minor, id, request_summary: summary });
				}
			}
		}
		None
	}

	/// Reports the outcome of a previously dispatched `Io` request,
	/// waking every bio merged into it and decrementing the minor's
	/// in-flight count so queued barrier markers can drain.
	pub fn complete(&mut self, minor: u32, id: u64, outcome: Outcome) {
		if let Some(req) = self.in_flight.remove(&id) {
			req.complete(outcome);
		}
		if let Some(queue) = self.minors.get_mut(&minor) {
			queue.in_flight = queue.in_flight.saturating_sub(1);
		}
	}

	/// Walks a minor's queue, completing every queued request with
	/// `Outcome::Io` and dropping markers, then removes the minor
	/// entirely so any still-in-flight completion for it is discarded
	/// (spec §4.E cancellation).
	pub fn cancel_minor(&mut self, minor: u32) {
		if let Some(queue) = self.minors.remove(&minor) {
			for entry in queue.pending {
				if let QueueEntry::Io(req) = entry {
					req.complete(Outcome::Io);
				}
			}
		}
		self.in_flight.retain(|_, req| req.minor != minor);
	}

	pub fn current_run(&self, minor: u32) -> u64 {
		self.minors.get(&minor).map(|q| q.current_run).unwrap_or(0)
	}

	pub fn has_pending(&self, minor: u32) -> bool {
		self.minors.get(&minor).map(|q| !q.pending.is_empty()).unwrap_or(false)
	}
}

impl Default for Dispatcher {
	fn default() -> Self {
		Self::new()
	}
}
