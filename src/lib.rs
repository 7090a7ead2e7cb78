//! The top-level facade: a `Session` object wiring group lifecycle
//! (`exa_vrt`), the request pipeline (`exa_bdtarget`), and per-node
//! disk services (`exa_rdev`) together (spec §9 Design Notes: "a
//! reimplementation should encapsulate [the global dispatch state] as
//! a `Session` object passed explicitly").

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use exa_bdtarget::dispatcher::Dispatched;
use exa_bdtarget::{Dispatcher, Opcode};
use exa_common::{Error, Result, Uuid};
use exa_rdev::{BrokenDiskTable, DiskAllowlist, HealthMonitor};
use exa_vrt::diskhandle::SECTOR_SIZE;
use exa_vrt::group::{Group, RdevSeed};
use exa_vrt::placement::SECTORS_PER_UE;
use exa_vrt::zone::AccessMode;

/// One running instance of the storage core on a node: every active
/// group, the request-pipeline dispatcher shared across all of them,
/// and the per-node disk services.
pub struct Session {
	cache_dir: PathBuf,
	pub node_id: u32,
	pub incarnation: u16,
	pub allowlist: DiskAllowlist,
	pub broken_disks: Mutex<BrokenDiskTable>,
	pub health: Mutex<HealthMonitor>,
	groups: Mutex<HashMap<Uuid, Group>>,
	dispatcher: Mutex<Dispatcher>,
	minors: Mutex<HashMap<u32, (Uuid, String)>>,
	next_minor: Mutex<u32>,
}

impl Session {
	/// Opens a session for node `node_id`: bumps the incarnation counter,
	/// loads the disk allowlist and the broken-disk table from
	/// `cache_dir`/`conf_dir` (spec §6 persisted control files).
	pub fn open(cache_dir: &Path, conf_dir: &Path, node_id: u32) -> Result<Self> {
		std::fs::create_dir_all(cache_dir)?;
		let incarnation = exa_rdev::incarnation::bump(cache_dir)?;
		let allowlist = DiskAllowlist::load(conf_dir)?;
		let broken_disks = BrokenDiskTable::load(cache_dir)?;
		log::info!("session opened for node {node_id}, incarnation {incarnation}");
		Ok(Self {
			cache_dir: cache_dir.to_path_buf(),
			node_id,
			incarnation,
			allowlist,
			broken_disks: Mutex::new(broken_disks),
			health: Mutex::new(HealthMonitor::new()),
			groups: Mutex::new(HashMap::new()),
			dispatcher: Mutex::new(Dispatcher::new()),
			minors: Mutex::new(HashMap::new()),
			next_minor: Mutex::new(0),
		})
	}

	pub fn cache_dir(&self) -> &Path {
		&self.cache_dir
	}

	/// `group_create`: formats and registers a new group. Rejects a name
	/// already used by another group in this session with
	/// `ErrNameTaken` (spec §3/§4.D: group names are unique cluster-wide).
	pub fn create_group(&self, name: &str, seeds: &[RdevSeed], now: u32) -> Result<Uuid> {
		if self.groups.lock().unwrap().values().any(|g| g.name == name) {
			return Err(Error::NameTaken(name.to_string()));
		}
		for seed in seeds {
			let path_str = seed.path.to_string_lossy();
			if !self.allowlist.is_allowed(&path_str) {
				return Err(Error::UnknownDisk(seed.uuid));
			}
		}
		let group = Group::create(name, seeds, now)?;
		let uuid = group.uuid;
		log::info!("group {uuid} ({name}) registered with session");
		self.groups.lock().unwrap().insert(uuid, group);
		Ok(uuid)
	}

	pub fn start_group(&self, group: Uuid) -> Result<()> {
		self.with_group_mut(group, |g| g.start())
	}

	pub fn stop_group(&self, group: Uuid) -> Result<()> {
		self.with_group_mut(group, |g| g.stop())
	}

	/// `group_start` after a restart (spec §4.D `reload`): scans
	/// `candidate_paths`, rebuilds the group from the highest-
	/// `update_time` SBG copy, and registers it under the session.
	pub fn reload_group(&self, candidate_paths: &[PathBuf]) -> Result<Uuid> {
		let group = Group::reload(candidate_paths)?;
		let uuid = group.uuid;
		log::info!("group {uuid} reloaded and registered with session");
		self.groups.lock().unwrap().insert(uuid, group);
		Ok(uuid)
	}

	pub fn zone_create(&self, group: Uuid, name: &str, size_kb: u64, now: u32) -> Result<Uuid> {
		self.with_group_mut(group, |g| g.zone_create(name, size_kb, now))
	}

	/// `zone_start`: activates the zone and assigns it a session-wide
	/// minor number, registering it with the request pipeline (spec
	/// §4.E/§6 control message `NEW`).
	pub fn zone_start(&self, group: Uuid, name: &str, mode: AccessMode) -> Result<u32> {
		self.with_group_mut(group, |g| g.zone_start(name, mode))?;
		let minor = {
			let mut next = self.next_minor.lock().unwrap();
			let m = *next;
			*next += 1;
			m
		};
		self.minors.lock().unwrap().insert(minor, (group, name.to_string()));
		self.dispatcher.lock().unwrap().add_minor(minor);
		log::info!("zone {name} in group {group} bound to session minor {minor}");
		Ok(minor)
	}

	/// `zone_stop` (`DEL`): cancels any queued work for the zone's minor
	/// with `ErrIo` (spec §4.E cancellation), then idles it.
	pub fn zone_stop(&self, group: Uuid, name: &str) -> Result<()> {
		if let Some(minor) = self.minor_for(group, name) {
			let mut dispatcher = self.dispatcher.lock().unwrap();
			dispatcher.cancel_minor(minor);
			dispatcher.remove_minor(minor);
			self.minors.lock().unwrap().remove(&minor);
		}
		self.with_group_mut(group, |g| g.zone_stop(name))
	}

	pub fn zone_resize(&self, group: Uuid, name: &str, new_size_kb: u64, now: u32) -> Result<()> {
		self.with_group_mut(group, |g| g.zone_resize(name, new_size_kb, now))
	}

	pub fn zone_delete(&self, group: Uuid, name: &str) -> Result<()> {
		self.with_group_mut(group, |g| g.zone_delete(name))
	}

	fn minor_for(&self, group: Uuid, name: &str) -> Option<u32> {
		self.minors
			.lock()
			.unwrap()
			.iter()
			.find(|(_, (g, n))| *g == group && n == name)
			.map(|(&m, _)| m)
	}

	fn with_group_mut<T>(&self, group: Uuid, f: impl FnOnce(&mut Group) -> Result<T>) -> Result<T> {
		let mut groups = self.groups.lock().unwrap();
		let g = groups.get_mut(&group).ok_or(Error::NotFound)?;
		f(g)
	}

	/// Writes `data` (a whole number of 512-byte sectors) to a started
	/// zone at byte offset `offset`, through the request pipeline — a
	/// barrier write drains the minor's in-flight requests before and
	/// after, per spec §4.E.
	pub fn write_zone(&self, group: Uuid, name: &str, offset: u64, data: &[u8], barrier: bool) -> Result<()> {
		let minor = self.minor_for(group, name).ok_or(Error::AccessMode)?;
		self.submit_and_run(group, minor, Opcode::Write, offset, data.len(), barrier, |g, first_sector, nr_sectors| {
			zone_io(g, name, first_sector, nr_sectors, Io::Write(data))
		})
	}

	/// Reads `len` bytes (a whole number of sectors) from a started zone
	/// at byte offset `offset`.
	pub fn read_zone(&self, group: Uuid, name: &str, offset: u64, len: usize) -> Result<Vec<u8>> {
		let minor = self.minor_for(group, name).ok_or(Error::AccessMode)?;
		let mut out = vec![0u8; len];
		self.submit_and_run(group, minor, Opcode::Read, offset, len, false, |g, first_sector, nr_sectors| {
			zone_io(g, name, first_sector, nr_sectors, Io::Read(&mut out))
		})?;
		Ok(out)
	}

	/// Submits one bio to the shared dispatcher and, since this session
	/// drives its own dispatch loop synchronously from the calling
	/// thread, drains exactly that bio back out (draining any barrier
	/// markers along the way) before performing the physical I/O
	/// in-place and completing it.
	fn submit_and_run(
		&self,
		group: Uuid,
		minor: u32,
		opcode: Opcode,
		offset: u64,
		len: usize,
		barrier: bool,
		mut perform: impl FnMut(&Group, u64, u64) -> Result<()>,
	) -> Result<()> {
		if offset as usize % SECTOR_SIZE != 0 || len % SECTOR_SIZE != 0 {
			return Err(Error::Corrupt("zone I/O must be sector-aligned".into()));
		}
		let first_sector = offset / SECTOR_SIZE as u64;
		let nr_sectors = (len / SECTOR_SIZE) as u64;

		let (my_id, handle) = {
			let mut dispatcher = self.dispatcher.lock().unwrap();
			dispatcher.submit_bio_with_id(minor, opcode, first_sector, nr_sectors, barrier)
		};

		loop {
			let dispatched = {
				let mut dispatcher = self.dispatcher.lock().unwrap();
				dispatcher.dispatch_one()
			};
			match dispatched {
				Some(Dispatched::Marker { .. }) => continue,
				Some(Dispatched::Io { minor: m, id, request_summary }) => {
					let groups = self.groups.lock().unwrap();
					let g = groups.get(&group).ok_or(Error::NotFound)?;
					let result = perform(g, request_summary.first_sector, request_summary.nr_sectors);
					drop(groups);
					let mut dispatcher = self.dispatcher.lock().unwrap();
					dispatcher.complete(m, id, if result.is_ok() { exa_bdtarget::Outcome::Ok } else { exa_bdtarget::Outcome::Io });
					drop(dispatcher);
					if id == my_id {
						result?;
						break;
					}
				}
				None => return Err(Error::Corrupt("dispatcher starved with a bio still pending".into())),
			}
		}
		handle.wait()
	}
}

enum Io<'a> {
	Write(&'a [u8]),
	Read(&'a mut [u8]),
}

/// Performs one logical sector-range I/O against a zone, splitting at
/// every UE boundary so each physical write/read lands on a single
/// rdev (spec §8 boundary case: "bio crossing a UE boundary is split
/// into exactly two sub-bios").
fn zone_io(group: &Group, zone_name: &str, first_sector: u64, nr_sectors: u64, mut io: Io) -> Result<()> {
	let mut sector = first_sector;
	let end = first_sector + nr_sectors;
	let mut buf_offset = 0usize;

	while sector < end {
		let ue_end = (sector / SECTORS_PER_UE + 1) * SECTORS_PER_UE;
		let chunk_end = end.min(ue_end);
		let chunk_sectors = chunk_end - sector;
		let chunk_bytes = (chunk_sectors as usize) * SECTOR_SIZE;

		let (path, phys_sector) = group.translate(zone_name, sector)?;
		let rdev_idx = group.rdev_index_for_path(path).ok_or(Error::NotFound)?;
		let handle = group.handle_for_rdev(rdev_idx);
		let byte_offset = phys_sector * SECTOR_SIZE as u64;

		page_aligned_io(handle, byte_offset, &mut io, buf_offset, chunk_bytes)?;

		buf_offset += chunk_bytes;
		sector = chunk_end;
	}
	Ok(())
}

/// Rdev handles are opened `O_DIRECT` (spec §4.B), which demands every
/// I/O length be a multiple of the buffer alignment — but a sector-
/// granularity bio need not land on a page boundary. Widens the access
/// to the surrounding aligned page(s), read-modify-writing through it
/// the way a page-cache-backed write would, rather than relaxing the
/// handle's own alignment contract.
fn page_aligned_io(handle: &exa_vrt::diskhandle::DiskHandle, byte_offset: u64, io: &mut Io, buf_offset: usize, chunk_bytes: usize) -> Result<()> {
	use exa_vrt::diskhandle::BUFFER_ALIGN;
	let align = BUFFER_ALIGN as u64;
	let aligned_start = (byte_offset / align) * align;
	let aligned_end = (byte_offset + chunk_bytes as u64).div_ceil(align) * align;
	let aligned_len = (aligned_end - aligned_start) as usize;
	let inner_off = (byte_offset - aligned_start) as usize;

	if inner_off == 0 && aligned_len == chunk_bytes {
		return match io {
			Io::Write(data) => handle.write(byte_offset, &data[buf_offset..buf_offset + chunk_bytes]),
			Io::Read(out) => handle.read(byte_offset, &mut out[buf_offset..buf_offset + chunk_bytes]),
		};
	}

	match io {
		Io::Write(data) => {
			let mut page = vec![0u8; aligned_len];
			handle.read(aligned_start, &mut page)?;
			page[inner_off..inner_off + chunk_bytes].copy_from_slice(&data[buf_offset..buf_offset + chunk_bytes]);
			handle.write(aligned_start, &page)
		}
		Io::Read(out) => {
			let mut page = vec![0u8; aligned_len];
			handle.read(aligned_start, &mut page)?;
			out[buf_offset..buf_offset + chunk_bytes].copy_from_slice(&page[inner_off..inner_off + chunk_bytes]);
			Ok(())
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use exa_vrt::placement::UE_SIZE_KB;
	use std::io::Write as _;

	fn make_rdev_file(size_kb: u64) -> tempfile::NamedTempFile {
		let mut f = tempfile::NamedTempFile::new().unwrap();
		f.as_file_mut().set_len(size_kb * 1024).unwrap();
		f.flush().unwrap();
		f
	}

	fn seed(uuid_word: u32, path: PathBuf) -> RdevSeed {
		RdevSeed {
			uuid: Uuid::from_words([uuid_word, 0, 0, 0]),
			path,
			node_id: 0,
		}
	}

	fn open_session() -> (Session, tempfile::TempDir) {
		let _ = env_logger::builder().is_test(true).try_init();
		let dir = tempfile::tempdir().unwrap();
		let session = Session::open(dir.path(), dir.path(), 1).unwrap();
		(session, dir)
	}

	#[test]
	fn write_then_read_back_a_zone() {
		let (session, _dir) = open_session();
		let f = make_rdev_file(1024 * 1024);
		let group = session
			.create_group("g", &[seed(1, f.path().to_path_buf())], 1000)
			.unwrap();
		session.start_group(group).unwrap();
		session.zone_create(group, "v1", 256 * 1024, 1000).unwrap();
		let minor = session.zone_start(group, "v1", AccessMode::ReadWrite).unwrap();
		assert_eq!(minor, 0);

		let data = vec![0x5Au8; 4096];
		session.write_zone(group, "v1", 0, &data, false).unwrap();
		let back = session.read_zone(group, "v1", 0, 4096).unwrap();
		assert_eq!(back, data);
	}

	/// Spec §8 Scenario 6: a bio spanning a UE boundary is split into
	/// one physical op per chunk, each landing on the rdev the
	/// placement engine assigns that chunk to.
	#[test]
	fn write_spanning_a_ue_boundary_splits_and_reads_back_correctly() {
		let (session, _dir) = open_session();
		let f1 = make_rdev_file(4 * 1024 * 1024);
		let f2 = make_rdev_file(4 * 1024 * 1024);
		let group = session
			.create_group(
				"g",
				&[seed(1, f1.path().to_path_buf()), seed(2, f2.path().to_path_buf())],
				1000,
			)
			.unwrap();
		session.start_group(group).unwrap();
		session.zone_create(group, "v1", 2 * 1024 * 1024, 1000).unwrap();
		session.zone_start(group, "v1", AccessMode::ReadWrite).unwrap();

		// Straddle the first UE boundary: start one sector before it and
		// write two UEs' worth, crossing into the next (possibly
		// different) rdev.
		let ue_bytes = (UE_SIZE_KB * 1024) as usize;
		let offset = (ue_bytes - SECTOR_SIZE) as u64;
		let len = ue_bytes * 2;
		let mut data = vec![0u8; len];
		for (i, b) in data.iter_mut().enumerate() {
			*b = (i % 256) as u8;
		}

		session.write_zone(group, "v1", offset, &data, false).unwrap();
		let back = session.read_zone(group, "v1", offset, len).unwrap();
		assert_eq!(back, data);
	}

	#[test]
	fn barrier_write_completes_successfully() {
		let (session, _dir) = open_session();
		let f = make_rdev_file(1024 * 1024);
		let group = session
			.create_group("g", &[seed(1, f.path().to_path_buf())], 1000)
			.unwrap();
		session.start_group(group).unwrap();
		session.zone_create(group, "v1", 256 * 1024, 1000).unwrap();
		session.zone_start(group, "v1", AccessMode::ReadWrite).unwrap();

		session.write_zone(group, "v1", 0, &[0xAAu8; 512], false).unwrap();
		session.write_zone(group, "v1", 512, &[0xBBu8; 512], true).unwrap();
		session.write_zone(group, "v1", 1024, &[0xCCu8; 512], false).unwrap();

		let back = session.read_zone(group, "v1", 0, 1536).unwrap();
		assert_eq!(&back[0..512], &[0xAAu8; 512][..]);
		assert_eq!(&back[512..1024], &[0xBBu8; 512][..]);
		assert_eq!(&back[1024..1536], &[0xCCu8; 512][..]);
	}

	#[test]
	fn zone_stop_cancels_pipeline_minor() {
		let (session, _dir) = open_session();
		let f = make_rdev_file(1024 * 1024);
		let group = session
			.create_group("g", &[seed(1, f.path().to_path_buf())], 1000)
			.unwrap();
		session.start_group(group).unwrap();
		session.zone_create(group, "v1", 256 * 1024, 1000).unwrap();
		session.zone_start(group, "v1", AccessMode::ReadWrite).unwrap();
		session.zone_stop(group, "v1").unwrap();

		// Once stopped, the zone's minor no longer exists in the
		// pipeline, so I/O against it fails instead of hanging.
		assert!(session.write_zone(group, "v1", 0, &[0u8; 512], false).is_err());
	}

	/// Spec §8 Scenario 5: restarting a node rediscovers a previously
	/// created group from its on-disk superblocks.
	#[test]
	fn group_survives_a_restart_via_reload() {
		let (session, _dir) = open_session();
		let f = make_rdev_file(2 * 1024 * 1024);
		let group = session
			.create_group("g", &[seed(1, f.path().to_path_buf())], 1000)
			.unwrap();
		session.start_group(group).unwrap();
		session.zone_create(group, "v1", 128 * 1024, 1000).unwrap();
		drop(session);

		let dir2 = tempfile::tempdir().unwrap();
		let session2 = Session::open(dir2.path(), dir2.path(), 1).unwrap();
		let reloaded = session2.reload_group(&[f.path().to_path_buf()]).unwrap();
		session2.zone_start(reloaded, "v1", AccessMode::ReadWrite).unwrap();
		let back = session2.read_zone(reloaded, "v1", 0, 512).unwrap();
		assert_eq!(back, vec![0u8; 512]);
	}

	#[test]
	fn disallowed_disk_path_is_rejected_at_group_create() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("disks.conf"), "/dev/sd*\n").unwrap();
		let session = Session::open(dir.path(), dir.path(), 1).unwrap();
		let f = make_rdev_file(1024 * 1024);
		let result = session.create_group("g", &[seed(1, f.path().to_path_buf())], 1000);
		assert!(matches!(result, Err(Error::UnknownDisk(_))));
	}

	#[test]
	fn duplicate_group_name_is_rejected() {
		let (session, _dir) = open_session();
		let f1 = make_rdev_file(1024 * 1024);
		session
			.create_group("g", &[seed(1, f1.path().to_path_buf())], 1000)
			.unwrap();
		let f2 = make_rdev_file(1024 * 1024);
		let result = session.create_group("g", &[seed(2, f2.path().to_path_buf())], 1000);
		assert!(matches!(result, Err(Error::NameTaken(_))));
	}

	#[test]
	fn incarnation_bumps_across_session_restarts() {
		let dir = tempfile::tempdir().unwrap();
		let s1 = Session::open(dir.path(), dir.path(), 1).unwrap();
		let first = s1.incarnation;
		drop(s1);
		let s2 = Session::open(dir.path(), dir.path(), 1).unwrap();
		assert_eq!(s2.incarnation, first + 1);
	}
}
