//! The request pipeline: per-minor queues, bio merging, barrier
//! ordering, and round-robin dispatch (spec §4.E) plus the session
//! wiring that drives them against a physical I/O backend (spec §5).

pub mod dispatcher;
pub mod request;
pub mod session;

pub use dispatcher::{Dispatched, Dispatcher, RequestSummary};
pub use request::{MarkerKind, Opcode, Outcome, SubmitHandle};
pub use session::{BlockBackend, Session, SessionConfig};

#[cfg(test)]
mod test {
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::{Arc, Mutex};
	use std::time::Duration;

	use exa_common::Result;

	use super::*;

	impl std::fmt::Debug for Dispatched {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			match self {
				Dispatched::Io { minor, id, .. } => write!(f, "Io{{minor:{minor}, id:{id}}}"),
				Dispatched::Marker { minor, kind } => write!(f, "Marker{{minor:{minor}, kind:{kind:?}}}"),
			}
		}
	}

	#[test]
	fn merges_contiguous_same_opcode_bios() {
		let mut d = Dispatcher::new();
		d.add_minor(0);
		let _h1 = d.submit_bio(0, Opcode::Write, 0, 8, false);
		let _h2 = d.submit_bio(0, Opcode::Write, 8, 8, false);
		assert!(d.has_pending(0));
		match d.dispatch_one() {
			Some(Dispatched::Io { request_summary, .. }) => {
				assert_eq!(request_summary.first_sector, 0);
				assert_eq!(request_summary.nr_sectors, 16);
			}
			other => panic!("expected a single merged Io, got {other:?}"),
		}
		assert!(d.dispatch_one().is_none());
	}

	#[test]
	fn non_contiguous_bios_do_not_merge() {
		let mut d = Dispatcher::new();
		d.add_minor(0);
		let _h1 = d.submit_bio(0, Opcode::Write, 0, 8, false);
		let _h2 = d.submit_bio(0, Opcode::Write, 16, 8, false);
		let first = d.dispatch_one().unwrap();
		let Dispatched::Io { request_summary, .. } = first else {
			panic!("expected Io")
		};
		assert_eq!(request_summary.nr_sectors, 8);
	}

	#[test]
	fn round_robin_serves_each_minor_once_per_pass() {
		let mut d = Dispatcher::new();
		for m in [0, 1, 2] {
			d.add_minor(m);
			let _ = d.submit_bio(m, Opcode::Read, 0, 1, false);
			let _ = d.submit_bio(m, Opcode::Read, 5, 1, false);
		}
		let mut served = Vec::new();
		for _ in 0..3 {
			match d.dispatch_one().unwrap() {
				Dispatched::Io { minor, .. } => served.push(minor),
				_ => panic!("expected Io"),
			}
		}
		served.sort_unstable();
		assert_eq!(served, vec![0, 1, 2]);
		// every minor still has its second bio queued
		assert!([0, 1, 2].iter().all(|&m| d.has_pending(m)));
	}

	#[test]
	fn barrier_drains_in_flight_before_and_after() {
		let mut d = Dispatcher::new();
		d.add_minor(0);
		let _w1 = d.submit_bio(0, Opcode::Write, 0, 1, false);
		let _w2 = d.submit_bio(0, Opcode::Write, 10, 1, true);
		let _w3 = d.submit_bio(0, Opcode::Write, 20, 1, false);

		// W1 dequeues first.
		let Dispatched::Io { id: w1_id, .. } = d.dispatch_one().unwrap() else {
			panic!()
		};
		// The pre-barrier marker cannot drain while W1 is still in flight.
		assert!(d.dispatch_one().is_none());
		d.complete(0, w1_id, Outcome::Ok);

		// Now the pre-marker drains...
		assert!(matches!(
			d.dispatch_one().unwrap(),
			Dispatched::Marker { kind: MarkerKind::PreBarrier, .. }
		));
		// ...then the barrier-carrying write itself dequeues.
		let Dispatched::Io { id: w2_id, request_summary, .. } = d.dispatch_one().unwrap() else {
			panic!()
		};
		assert!(request_summary.barrier);
		// The post-marker can't drain until W2 completes.
		assert!(d.dispatch_one().is_none());
		d.complete(0, w2_id, Outcome::Ok);
		assert!(matches!(
			d.dispatch_one().unwrap(),
			Dispatched::Marker { kind: MarkerKind::PostBarrier, .. }
		));
		// Only now does W3 become dispatchable.
		assert!(matches!(d.dispatch_one().unwrap(), Dispatched::Io { .. }));
	}

	#[test]
	fn cancel_minor_completes_queued_requests_with_io_error() {
		let mut d = Dispatcher::new();
		d.add_minor(0);
		let h1 = d.submit_bio(0, Opcode::Write, 0, 1, false);
		let h2 = d.submit_bio(0, Opcode::Write, 8, 1, false);
		d.cancel_minor(0);
		assert!(h1.wait().is_err());
		assert!(h2.wait().is_err());
	}

	#[test]
	fn session_config_rejects_small_ring_and_misaligned_buffer() {
		assert!(SessionConfig { nb_slots: 1, buffer_size_per_slot: 4096 }.validate().is_err());
		assert!(SessionConfig { nb_slots: 4, buffer_size_per_slot: 100 }.validate().is_err());
		assert!(SessionConfig { nb_slots: 4, buffer_size_per_slot: 4096 }.validate().is_ok());
	}

	struct CountingBackend {
		calls: AtomicU32,
		fail_minor: Option<u32>,
	}

	impl BlockBackend for CountingBackend {
		fn perform(&self, minor: u32, _req: RequestSummary) -> Result<()> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			if self.fail_minor == Some(minor) {
				return Err(exa_common::Error::Io(std::io::Error::other("injected failure")));
			}
			Ok(())
		}
	}

	#[test]
	fn session_end_to_end_dispatches_and_completes() {
		let backend = Arc::new(CountingBackend {
			calls: AtomicU32::new(0),
			fail_minor: None,
		});
		let session = Session::new(SessionConfig { nb_slots: 4, buffer_size_per_slot: 4096 }, backend.clone()).unwrap();
		session.add_minor(0);
		let h = session.submit(0, Opcode::Write, 0, 8, false);
		h.wait().unwrap();
		assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
		session.kill();
	}

	#[test]
	fn session_stop_minor_cancels_pending_work() {
		let backend = Arc::new(CountingBackend {
			calls: AtomicU32::new(0),
			fail_minor: None,
		});
		let session = Session::new(SessionConfig { nb_slots: 4, buffer_size_per_slot: 4096 }, backend).unwrap();
		session.add_minor(0);
		// Submit and immediately stop; racy by nature, so just assert the
		// handle resolves one way or the other instead of hanging.
		let h = session.submit(0, Opcode::Write, 0, 8, false);
		session.stop_minor(0);
		let _ = h.wait();
		session.kill();
	}

	#[test]
	fn slow_backend_does_not_block_other_minors() {
		struct GatedBackend {
			gate: Arc<Mutex<()>>,
		}
		impl BlockBackend for GatedBackend {
			fn perform(&self, minor: u32, _req: RequestSummary) -> Result<()> {
				if minor == 0 {
					let _g = self.gate.lock().unwrap();
				}
				Ok(())
			}
		}
		let gate = Arc::new(Mutex::new(()));
		let lock = gate.lock().unwrap();
		let session = Session::new(
			SessionConfig { nb_slots: 4, buffer_size_per_slot: 4096 },
			Arc::new(GatedBackend { gate: gate.clone() }),
		)
		.unwrap();
		session.add_minor(0);
		session.add_minor(1);
		let slow = session.submit(0, Opcode::Write, 0, 1, false);
		std::thread::sleep(Duration::from_millis(20));
		let fast = session.submit(1, Opcode::Write, 0, 1, false);
		fast.wait().unwrap();
		drop(lock);
		slow.wait().unwrap();
		session.kill();
	}
}
