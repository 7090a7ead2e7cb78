//! Session-level wiring: memory-budget validation, the physical I/O
//! backend trait, and the background dispatch thread that drives a
//! [`Dispatcher`] against it (spec §4.E dispatch/fairness, §5 threads).
//!
//! The original keeps the dispatcher and the physical I/O worker on
//! opposite sides of a kernel/user-space boundary, talking through a
//! pair of SPSC ring buffers. Design Notes §9 says that split collapses
//! to in-process queues once both halves live in one process, and
//! that's what this does: `Dispatcher` plays the kernel-side role,
//! `BlockBackend` the user-worker role, and the ring discipline reduces
//! to "one dispatch thread, one lock, one condvar".

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use exa_common::{Error, Result};

use crate::dispatcher::{Dispatched, Dispatcher, RequestSummary};
use crate::request::{Opcode, Outcome, SubmitHandle};

/// One page, for memory-budget validation (spec §4.E).
pub const PAGE_SIZE: usize = 4096;
pub const MIN_SLOTS: usize = 4;

/// Ring/scratch sizing parameters, validated at session init.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
	pub nb_slots: usize,
	pub buffer_size_per_slot: usize,
}

impl SessionConfig {
	pub fn validate(self) -> Result<Self> {
		if self.nb_slots < MIN_SLOTS {
			return Err(Error::Corrupt(format!(
				"nb_slots {} below minimum {MIN_SLOTS}",
				self.nb_slots
			)));
		}
		if self.buffer_size_per_slot == 0 || self.buffer_size_per_slot % PAGE_SIZE != 0 {
			return Err(Error::Corrupt(format!(
				"buffer_size_per_slot {} is not a positive multiple of the page size",
				self.buffer_size_per_slot
			)));
		}
		Ok(self)
	}
}

/// The physical-I/O side ("user worker" in the original). Implementors
/// perform the actual read/write for one dispatched request.
pub trait BlockBackend: Send + Sync {
	fn perform(&self, minor: u32, req: RequestSummary) -> Result<()>;
}

/// Runs a dispatch thread over a [`Dispatcher`] and a [`BlockBackend`].
pub struct Session {
	inner: Arc<SessionInner>,
	worker: Option<JoinHandle<()>>,
}

struct SessionInner {
	state: Mutex<State>,
	wake: Condvar,
}

struct State {
	dispatcher: Dispatcher,
	backend: Arc<dyn BlockBackend>,
	shutdown: bool,
}

impl Session {
	pub fn new(config: SessionConfig, backend: Arc<dyn BlockBackend>) -> Result<Self> {
		config.validate()?;
		let inner = Arc::new(SessionInner {
			state: Mutex::new(State {
				dispatcher: Dispatcher::new(),
				backend,
				shutdown: false,
			}),
			wake: Condvar::new(),
		});
		let thread_inner = Arc::clone(&inner);
		let worker = thread::spawn(move || dispatch_loop(thread_inner));
		Ok(Self {
			inner,
			worker: Some(worker),
		})
	}

	pub fn add_minor(&self, minor: u32) {
		let mut state = self.inner.state.lock().unwrap();
		state.dispatcher.add_minor(minor);
		log::debug!("minor {minor} added to dispatch session");
	}

	/// Stops a minor: cancels every queued request with `ErrIo`
	/// (spec §4.E cancellation), then drops it from the round-robin set.
	pub fn stop_minor(&self, minor: u32) {
		let mut state = self.inner.state.lock().unwrap();
		state.dispatcher.cancel_minor(minor);
		state.dispatcher.remove_minor(minor);
		log::info!("minor {minor} stopped, pending requests cancelled");
	}

	pub fn submit(
		&self,
		minor: u32,
		opcode: Opcode,
		first_sector: u64,
		nr_sectors: u64,
		barrier: bool,
	) -> SubmitHandle {
		let mut state = self.inner.state.lock().unwrap();
		let handle = state.dispatcher.submit_bio(minor, opcode, first_sector, nr_sectors, barrier);
		drop(state);
		self.inner.wake.notify_one();
		handle
	}

	/// Sends the `KILL` control event (spec §6): stops the dispatch
	/// thread and waits for it to drain its current step.
	pub fn kill(mut self) {
		{
			let mut state = self.inner.state.lock().unwrap();
			state.shutdown = true;
		}
		self.inner.wake.notify_one();
		if let Some(handle) = self.worker.take() {
			let _ = handle.join();
		}
		log::info!("dispatch session killed");
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		if let Some(handle) = self.worker.take() {
			{
				let mut state = self.inner.state.lock().unwrap();
				state.shutdown = true;
			}
			self.inner.wake.notify_one();
			let _ = handle.join();
		}
	}
}

fn dispatch_loop(inner: Arc<SessionInner>) {
	loop {
		let dispatched = {
			let mut state = inner.state.lock().unwrap();
			loop {
				if state.shutdown {
					return;
				}
				if let Some(d) = state.dispatcher.dispatch_one() {
					break d;
				}
				state = inner.wake.wait(state).unwrap();
			}
		};

		match dispatched {
			Dispatched::Marker { .. } => {
				inner.wake.notify_one();
			}
			Dispatched::Io { minor, id, request_summary } => {
				// The dispatch thread itself stays cooperative and never
				// blocks on physical I/O (spec §5): hand the request off
				// to a worker ("user-space" in the original split) and
				// go straight back to finding the next ready minor.
				let backend = {
					let state = inner.state.lock().unwrap();
					Arc::clone(&state.backend)
				};
				let worker_inner = Arc::clone(&inner);
				thread::spawn(move || {
					let outcome = match backend.perform(minor, request_summary) {
						Ok(()) => Outcome::Ok,
						Err(e) => {
							log::warn!("minor {minor} request {id} failed: {e}");
							Outcome::Io
						}
					};
					let mut state = worker_inner.state.lock().unwrap();
					state.dispatcher.complete(minor, id, outcome);
					drop(state);
					worker_inner.wake.notify_one();
				});
			}
		}
	}
}
