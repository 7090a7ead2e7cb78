//! Request/queue-entry types for the per-minor pipeline (spec §4.E).

use std::sync::mpsc;

use exa_common::Uuid;

/// I/O direction of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
	Read,
	Write,
}

/// Maximum sectors a merged request may span, taken from the readahead
/// size quoted for the block-device surface (spec §6: "readahead 8192
/// sectors").
pub const MAX_REQUEST_SECTORS: u64 = 8192;

/// Outcome of a completed request, reported back to every bio merged
/// into it. Kept small and `Copy` so it can be fanned out to several
/// waiting [`SubmitHandle`]s without cloning an [`exa_common::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Ok,
	Io,
}

impl Outcome {
	pub fn into_result(self) -> exa_common::Result<()> {
		match self {
			Outcome::Ok => Ok(()),
			Outcome::Io => Err(exa_common::Error::Io(std::io::Error::other(
				"request failed or was cancelled",
			))),
		}
	}
}

/// A queued I/O request, possibly the merge of several submitted bios
/// sharing the same (opcode, barrier) and a contiguous sector range.
#[derive(Debug)]
pub struct BdRequest {
	pub id: u64,
	pub minor: u32,
	pub opcode: Opcode,
	pub first_sector: u64,
	pub nr_sectors: u64,
	/// Set on the write that carries the `BARRIER` info bit (spec §4.E).
	pub barrier: bool,
	completions: Vec<mpsc::Sender<Outcome>>,
}

impl BdRequest {
	pub(crate) fn new(
		id: u64,
		minor: u32,
		opcode: Opcode,
		first_sector: u64,
		nr_sectors: u64,
		barrier: bool,
		completion: mpsc::Sender<Outcome>,
	) -> Self {
		Self {
			id,
			minor,
			opcode,
			first_sector,
			nr_sectors,
			barrier,
			completions: vec![completion],
		}
	}

	/// Whether `other` is contiguous with this request, shares its
	/// (opcode, barrier) pair, and the merged extent still fits under
	/// [`MAX_REQUEST_SECTORS`] (spec §4.E merge rule).
	pub(crate) fn can_absorb(&self, opcode: Opcode, first_sector: u64, nr_sectors: u64, barrier: bool) -> bool {
		self.opcode == opcode
			&& self.barrier == barrier
			&& self.first_sector + self.nr_sectors == first_sector
			&& self.nr_sectors + nr_sectors <= MAX_REQUEST_SECTORS
	}

	pub(crate) fn absorb(&mut self, nr_sectors: u64, completion: mpsc::Sender<Outcome>) {
		self.nr_sectors += nr_sectors;
		self.completions.push(completion);
	}

	pub fn complete(&self, outcome: Outcome) {
		for tx in &self.completions {
			let _ = tx.send(outcome);
		}
	}
}

/// The two synthetic markers bracketing a barrier write (spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
	PreBarrier,
	PostBarrier,
}

/// One slot in a minor's FIFO: either a real request or a barrier
/// marker that the dispatcher must drain around.
#[derive(Debug)]
pub enum QueueEntry {
	Marker(MarkerKind),
	Io(BdRequest),
}

/// Handle returned to a caller submitting a bio; `wait` blocks until
/// the (possibly merged) request it became part of completes.
pub struct SubmitHandle {
	rx: mpsc::Receiver<Outcome>,
}

impl SubmitHandle {
	pub fn wait(self) -> exa_common::Result<()> {
		match self.rx.recv() {
			Ok(outcome) => outcome.into_result(),
			Err(_) => Err(exa_common::Error::Io(std::io::Error::other(
				"request dropped without completion",
			))),
		}
	}
}

pub(crate) fn new_handle() -> (mpsc::Sender<Outcome>, SubmitHandle) {
	let (tx, rx) = mpsc::channel();
	(tx, SubmitHandle { rx })
}

/// Identifies the zone a minor's queue belongs to, for diagnostics
/// only — the dispatcher itself only knows minors.
#[derive(Debug, Clone, Copy)]
pub struct MinorInfo {
	pub zone_uuid: Uuid,
}
