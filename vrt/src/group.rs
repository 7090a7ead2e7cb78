//! The group/zone in-memory model (spec §4.D) and its lifecycle
//! operations: `group_create`, `group_start` (here: `start`/`reload`),
//! `group_stop`, and the `zone_*` family.
//!
//! Follows the arena shape spec'd in the Design Notes: `Group` owns
//! `Vec<Rdev>` and `Vec<Zone>`; a `Zone`'s `plages` are indices into the
//! group's flat extent table, never pointers. This sidesteps the
//! group↔rdev↔zone back-pointer cycles of the original C (`vrt_group.h`,
//! `vrt_zone.h`).

use std::path::{Path, PathBuf};

use exa_common::{Error, Result, Uuid};

use crate::diskhandle::{DiskHandle, OpenFlags};
use crate::placement::{extents_needed, PlacementEngine, UE_SIZE_KB};
use crate::rdev::{min_rdev_size_kb, usable_size_kb, Rdev, RdevState};
use crate::superblock::{
	SbGroup, SbRdevs, SbZoneSstriping, NAME_MAX_SZ, NBMAX_ZONES, SB_SIZE, SSTRIPING_LAYOUT,
};
use crate::zone::{AccessMode, Zone, ZoneState};

/// Disk tail area reserved for superblocks: 32 KiB, rounded down from
/// the disk's true size (spec §6).
const TAIL_RESERVED_BYTES: u64 = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
	Idle,
	Active,
}

/// Where to find an rdev and what identity it carries, supplied by the
/// caller (path discovery is out of scope here — spec §1 treats that as
/// an external collaborator).
#[derive(Debug, Clone)]
pub struct RdevSeed {
	pub uuid: Uuid,
	pub path: PathBuf,
	pub node_id: u32,
}

fn tail_base(disk_size_bytes: u64) -> u64 {
	let aligned = (disk_size_bytes / TAIL_RESERVED_BYTES) * TAIL_RESERVED_BYTES;
	aligned.saturating_sub(TAIL_RESERVED_BYTES)
}

fn sbz_offset(slot: usize) -> u64 {
	2 * SB_SIZE as u64 + slot as u64 * SB_SIZE as u64
}

/// A device group: a set of rdevs sharing a placement layout, and the
/// zones carved out of it.
pub struct Group {
	pub uuid: Uuid,
	pub name: String,
	pub layout: u8,
	pub create_time: u32,
	pub update_time: u32,
	pub state: GroupState,
	pub rdevs: Vec<Rdev>,
	pub zones: Vec<Zone>,

	zone_exist: [bool; NBMAX_ZONES],
	placement: Option<PlacementEngine>,
	capa_used_kb: Vec<u64>,
	tail_bases: Vec<u64>,
	handles: Vec<DiskHandle>,
	next_minor: u32,
}

impl Group {
	/// `group_create`: formats a fresh group across `seeds`, writing
	/// SBG/SBR to every rdev (spec §4.D). The group is left `Idle`.
	pub fn create(name: &str, seeds: &[RdevSeed], now: u32) -> Result<Self> {
		if name.len() > NAME_MAX_SZ {
			return Err(Error::Corrupt("group name too long".into()));
		}
		if seeds.is_empty() {
			return Err(Error::TooFewRdevs);
		}

		let mut rdevs = Vec::with_capacity(seeds.len());
		let mut tail_bases = Vec::with_capacity(seeds.len());
		for seed in seeds {
			let handle = DiskHandle::open(&seed.path, OpenFlags::read_write_direct_excl())?;
			let size_kb = handle.size_bytes()? / 1024;
			if size_kb < min_rdev_size_kb() {
				return Err(Error::RdevTooSmall {
					size_kb,
					min_kb: min_rdev_size_kb(),
				});
			}
			tail_bases.push(tail_base(handle.size_bytes()?));
			rdevs.push(Rdev::new(seed.uuid, seed.path.clone(), size_kb, seed.node_id));
		}

		let usable_ue: Vec<u64> = rdevs
			.iter()
			.map(|r| usable_size_kb(r.size_kb) / UE_SIZE_KB)
			.collect();
		let placement = PlacementEngine::build(&usable_ue);

		let group_uuid = Uuid::random();
		let rdev_uuids: Vec<Uuid> = rdevs.iter().map(|r| r.uuid).collect();
		let sbr = SbRdevs::new(&rdev_uuids)?;

		let group = Self {
			uuid: group_uuid,
			name: name.to_string(),
			layout: SSTRIPING_LAYOUT,
			create_time: now,
			update_time: now,
			state: GroupState::Idle,
			capa_used_kb: vec![0; rdevs.len()],
			rdevs,
			zones: Vec::new(),
			zone_exist: [false; NBMAX_ZONES],
			placement: Some(placement),
			tail_bases,
			handles: Vec::new(),
			next_minor: 0,
		};

		for i in 0..group.rdevs.len() {
			let handle = DiskHandle::open(&group.rdevs[i].path, OpenFlags::read_write_direct_excl())?;
			let sbg = group.build_sbg(i);
			handle.write(group.tail_bases[i], &sbg.to_bytes())?;
			handle.write(group.tail_bases[i] + SB_SIZE as u64, &sbr.to_bytes())?;
			handle.sync()?;
		}

		log::info!("group {} ({}) created across {} rdev(s)", group.uuid, name, group.rdevs.len());
		Ok(group)
	}

	/// Builds this rdev's copy of the group superblock. `thisdev_uuid`
	/// names the group's primary rdev (its first member at creation)
	/// and is constant across every copy, unlike `rdev_uuid` which
	/// identifies the specific disk this copy lives on — that's what
	/// lets [`SbGroup::agrees_with`] treat every field but `rdev_uuid`
	/// and `checksum` as an invariant (spec §8, invariant 3).
	fn build_sbg(&self, rdev_idx: usize) -> SbGroup {
		SbGroup::new(
			self.rdevs[rdev_idx].uuid,
			self.uuid,
			self.rdevs[0].uuid,
			&self.name,
			self.create_time,
			self.update_time,
			self.zones.len() as u32,
			self.rdevs.len() as u32,
			self.zone_exist,
		)
	}

	/// `group_start`: opens exclusive handles to every rdev this
	/// in-memory group already knows about and marks it `Active`.
	pub fn start(&mut self) -> Result<()> {
		if self.state == GroupState::Active {
			return Ok(());
		}
		let mut handles = Vec::with_capacity(self.rdevs.len());
		for rdev in &self.rdevs {
			handles.push(DiskHandle::open(
				&rdev.path,
				OpenFlags::read_write_direct_excl(),
			)?);
		}
		self.handles = handles;
		self.state = GroupState::Active;
		log::info!("group {} started", self.uuid);
		Ok(())
	}

	/// `group_stop`: requires every zone be stopped first.
	pub fn stop(&mut self) -> Result<()> {
		if self.zones.iter().any(Zone::is_active) {
			return Err(Error::InUse);
		}
		self.handles.clear();
		self.state = GroupState::Idle;
		log::info!("group {} stopped", self.uuid);
		Ok(())
	}

	/// `group_start` after a restart: rediscovers the group from its
	/// on-disk superblocks. Disks that answer `ErrInUse`/`ErrBadMagic`
	/// are excluded from the candidate set, not treated as fatal (spec
	/// §7). The highest-`update_time` SBG copy wins, re-establishing
	/// consistency after a partial write (spec §7).
	pub fn reload(candidate_paths: &[PathBuf]) -> Result<Self> {
		let mut candidates: Vec<(PathBuf, DiskHandle, SbGroup, u64)> = Vec::new();
		for path in candidate_paths {
			let handle = match DiskHandle::open(path, OpenFlags::read_write_direct_excl()) {
				Ok(h) => h,
				Err(Error::InUse) => continue,
				Err(e) => return Err(e),
			};
			let size_bytes = handle.size_bytes()?;
			let base = tail_base(size_bytes);
			let mut buf = [0u8; SB_SIZE];
			if handle.read(base, &mut buf).is_err() {
				continue;
			}
			let sbg = match SbGroup::parse(&buf) {
				Ok(sbg) => sbg,
				Err(Error::BadMagic) | Err(Error::BadChecksum) => continue,
				Err(e) => return Err(e),
			};
			candidates.push((path.clone(), handle, sbg, base));
		}
		if candidates.is_empty() {
			return Err(Error::NotFound);
		}

		let (_, _, authoritative, _) = candidates
			.iter()
			.max_by_key(|(_, _, sbg, _)| sbg.update_time)
			.expect("checked non-empty above");
		let authoritative = *authoritative;

		let mut rdevs = Vec::new();
		let mut tail_bases = Vec::new();
		let mut handles = Vec::new();
		for (path, handle, sbg, base) in candidates {
			if !sbg.agrees_with(&authoritative) {
				continue;
			}
			let size_kb = handle.size_bytes()? / 1024;
			rdevs.push(Rdev::new(sbg.rdev_uuid(), path, size_kb, 0));
			tail_bases.push(base);
			handles.push(handle);
		}

		let usable_ue: Vec<u64> = rdevs
			.iter()
			.map(|r| usable_size_kb(r.size_kb) / UE_SIZE_KB)
			.collect();
		let mut placement = PlacementEngine::build(&usable_ue);

		let mut zones = Vec::new();
		let mut capa_used_kb = vec![0u64; rdevs.len()];
		for slot in 0..NBMAX_ZONES {
			if !authoritative.zone_exists(slot) {
				continue;
			}
			let handle = &handles[0];
			let mut buf = [0u8; SB_SIZE];
			handle.read(tail_bases[0] + sbz_offset(slot), &mut buf)?;
			let sbz = SbZoneSstriping::parse(&buf)?;
			let mut plages = Vec::new();
			for (start, end) in sbz.extents() {
				let idx = placement
					.extents()
					.iter()
					.position(|e| e.stripe_start == start as u64 && e.stripe_end == end as u64)
					.ok_or_else(|| Error::Corrupt("SBZ extent not found in rebuilt table".into()))?;
				plages.push(idx);
			}
			placement.mark_busy(plages.iter().copied());
			for &idx in &plages {
				let extent = placement.extents()[idx];
				let nb_rdevs = placement.nb_rdevs();
				for slot_idx in nb_rdevs - extent.width as usize..nb_rdevs {
					capa_used_kb[placement.sorted_devs()[slot_idx]] += extent.height * UE_SIZE_KB;
				}
			}
			zones.push(Zone {
				uuid: sbz.zone_uuid(),
				name: sbz.name(),
				size_kb: sbz.zone_size,
				create_time: sbz.create_time,
				state: ZoneState::Idle,
				plages,
				slot,
				minor: None,
				open_count: 0,
			});
		}

		log::info!(
			"group {} ({}) reloaded from {} rdev(s), {} zone(s)",
			authoritative.group_uuid(),
			authoritative.name(),
			rdevs.len(),
			zones.len()
		);
		Ok(Self {
			uuid: authoritative.group_uuid(),
			name: authoritative.name(),
			layout: authoritative.layout,
			create_time: authoritative.create_time,
			update_time: authoritative.update_time,
			state: GroupState::Active,
			capa_used_kb,
			rdevs,
			zones,
			zone_exist: std::array::from_fn(|i| authoritative.zone_exists(i)),
			placement: Some(placement),
			tail_bases,
			handles,
			next_minor: 0,
		})
	}

	fn require_active(&self) -> Result<()> {
		if self.state != GroupState::Active {
			return Err(Error::AccessMode);
		}
		Ok(())
	}

	fn write_sbg_all(&self) -> Result<()> {
		for i in 0..self.rdevs.len() {
			let sbg = self.build_sbg(i);
			self.handles[i].write(self.tail_bases[i], &sbg.to_bytes())?;
		}
		Ok(())
	}

	fn write_sbz_all(&self, slot: usize, sbz: &SbZoneSstriping) -> Result<()> {
		for i in 0..self.rdevs.len() {
			self.handles[i].write(self.tail_bases[i] + sbz_offset(slot), &sbz.to_bytes())?;
		}
		Ok(())
	}

	/// `zone_create`.
	pub fn zone_create(&mut self, name: &str, size_kb: u64, now: u32) -> Result<Uuid> {
		self.require_active()?;
		if size_kb == 0 {
			return Err(Error::NoSpace);
		}
		if self.zones.iter().any(|z| z.name == name) {
			return Err(Error::NameTaken(name.to_string()));
		}
		let slot = (0..NBMAX_ZONES)
			.find(|&s| !self.zone_exist[s])
			.ok_or(Error::NoSpace)?;

		let n = extents_needed(size_kb);
		let placement = self.placement.as_mut().expect("active group has placement");
		let chosen = placement.allocate(n, &mut self.capa_used_kb)?;
		for (rdev, &used) in self.rdevs.iter_mut().zip(self.capa_used_kb.iter()) {
			rdev.capa_used_kb = used;
		}

		let extents: Vec<(u32, u32)> = chosen
			.iter()
			.map(|&idx| {
				let e = placement.extents()[idx];
				(e.stripe_start as u32, e.stripe_end as u32)
			})
			.collect();
		let zone_uuid = Uuid::random();
		let sbz = SbZoneSstriping::new(name, zone_uuid, now, now, size_kb, &extents)?;
		self.write_sbz_all(slot, &sbz)?;

		self.zone_exist[slot] = true;
		self.update_time = now;
		self.write_sbg_all()?;

		self.zones.push(Zone {
			uuid: zone_uuid,
			name: name.to_string(),
			size_kb,
			create_time: now,
			state: ZoneState::Idle,
			plages: chosen,
			slot,
			minor: None,
			open_count: 0,
		});
		log::info!("zone {name} ({zone_uuid}) created in group {}, {size_kb} KiB", self.uuid);
		Ok(zone_uuid)
	}

	fn zone_index(&self, name: &str) -> Result<usize> {
		self.zones
			.iter()
			.position(|z| z.name == name)
			.ok_or(Error::NotFound)
	}

	/// `zone_start`.
	pub fn zone_start(&mut self, name: &str, mode: AccessMode) -> Result<u32> {
		self.require_active()?;
		let idx = self.zone_index(name)?;
		let zone = &mut self.zones[idx];
		match zone.state {
			ZoneState::Active(existing) if existing != mode => return Err(Error::AccessMode),
			ZoneState::Active(_) => return Ok(zone.minor.expect("active zone has a minor")),
			ZoneState::Idle => {}
		}
		let minor = self.next_minor;
		self.next_minor += 1;
		let zone = &mut self.zones[idx];
		zone.state = ZoneState::Active(mode);
		zone.minor = Some(minor);
		log::info!("zone {name} started in group {} at minor {minor} ({mode:?})", self.uuid);
		Ok(minor)
	}

	/// `zone_stop`.
	pub fn zone_stop(&mut self, name: &str) -> Result<()> {
		let idx = self.zone_index(name)?;
		let zone = &mut self.zones[idx];
		if zone.open_count > 0 {
			return Err(Error::InUse);
		}
		zone.state = ZoneState::Idle;
		zone.minor = None;
		log::info!("zone {name} stopped in group {}", self.uuid);
		Ok(())
	}

	/// `zone_resize`.
	pub fn zone_resize(&mut self, name: &str, new_size_kb: u64, now: u32) -> Result<()> {
		self.require_active()?;
		if new_size_kb == 0 {
			return Err(Error::NoSpace);
		}
		let idx = self.zone_index(name)?;
		let new_n = extents_needed(new_size_kb);
		let old_n = self.zones[idx].plages.len();
		let placement = self.placement.as_mut().expect("active group has placement");

		if new_n > old_n {
			let extra = placement.allocate(new_n - old_n, &mut self.capa_used_kb)?;
			self.zones[idx].plages.extend(extra);
		} else if new_n < old_n {
			let tail: Vec<usize> = self.zones[idx].plages.split_off(new_n);
			placement.free(&tail, &mut self.capa_used_kb);
		}
		for (rdev, &used) in self.rdevs.iter_mut().zip(self.capa_used_kb.iter()) {
			rdev.capa_used_kb = used;
		}

		let extents: Vec<(u32, u32)> = self.zones[idx]
			.plages
			.iter()
			.map(|&i| {
				let e = placement.extents()[i];
				(e.stripe_start as u32, e.stripe_end as u32)
			})
			.collect();
		self.zones[idx].size_kb = new_size_kb;
		let slot = self.zones[idx].slot;
		let sbz = SbZoneSstriping::new(
			&self.zones[idx].name,
			self.zones[idx].uuid,
			self.zones[idx].create_time,
			now,
			new_size_kb,
			&extents,
		)?;
		self.write_sbz_all(slot, &sbz)?;
		self.update_time = now;
		self.write_sbg_all()?;
		Ok(())
	}

	/// `zone_delete`.
	pub fn zone_delete(&mut self, name: &str) -> Result<()> {
		let idx = self.zone_index(name)?;
		if self.zones[idx].is_active() {
			return Err(Error::InUse);
		}
		let plages = std::mem::take(&mut self.zones[idx].plages);
		let slot = self.zones[idx].slot;
		if let Some(placement) = self.placement.as_mut() {
			placement.free(&plages, &mut self.capa_used_kb);
		}
		for (rdev, &used) in self.rdevs.iter_mut().zip(self.capa_used_kb.iter()) {
			rdev.capa_used_kb = used;
		}
		self.zone_exist[slot] = false;
		self.zones.remove(idx);
		self.write_sbg_all()?;
		log::info!("zone {name} deleted from group {}", self.uuid);
		Ok(())
	}

	/// Translates a zone-relative sector to `(rdev_path, physical_sector)`.
	pub fn translate(&self, zone_name: &str, zs: u64) -> Result<(&Path, u64)> {
		let idx = self.zone_index(zone_name)?;
		let placement = self.placement.as_ref().expect("group has placement");
		let (rdev_idx, sector) = placement.translate(&self.zones[idx].plages, zs)?;
		Ok((&self.rdevs[rdev_idx].path, sector))
	}

	pub fn handle_for_rdev(&self, rdev_idx: usize) -> &DiskHandle {
		&self.handles[rdev_idx]
	}

	pub fn rdev_index_for_path(&self, path: &Path) -> Option<usize> {
		self.rdevs.iter().position(|r| r.path == path)
	}

	pub fn placement(&self) -> Option<&PlacementEngine> {
		self.placement.as_ref()
	}

	pub fn mark_rdev_broken(&mut self, uuid: Uuid) {
		for rdev in &mut self.rdevs {
			if rdev.uuid == uuid {
				rdev.broken = true;
				rdev.state = RdevState::Fail;
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::io::Write as _;

	fn make_rdev_file(size_kb: u64) -> tempfile::NamedTempFile {
		let mut f = tempfile::NamedTempFile::new().unwrap();
		f.as_file_mut()
			.set_len(size_kb * 1024)
			.expect("set_len should not fail for a regular file");
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

	#[test]
	fn group_create_rejects_too_small_rdev() {
		let f = make_rdev_file(1);
		let seeds = vec![seed(1, f.path().to_path_buf())];
		assert!(matches!(
			Group::create("g", &seeds, 1000),
			Err(Error::RdevTooSmall { .. })
		));
	}

	#[test]
	fn group_create_rejects_empty_rdev_list() {
		assert!(matches!(
			Group::create("g", &[], 1000),
			Err(Error::TooFewRdevs)
		));
	}

	#[test]
	fn scenario_create_write_read_back() {
		let f1 = make_rdev_file(1024 * 1024);
		let f2 = make_rdev_file(1024 * 1024);
		let seeds = vec![
			seed(1, f1.path().to_path_buf()),
			seed(2, f2.path().to_path_buf()),
		];
		let mut group = Group::create("mygroup", &seeds, 1000).unwrap();
		group.start().unwrap();
		group.zone_create("v1", 128 * 1024, 1000).unwrap();
		group.zone_start("v1", AccessMode::ReadWrite).unwrap();

		let (path, sector) = group.translate("v1", 0).unwrap();
		let path = path.to_path_buf();
		let rdev_idx = group.rdev_index_for_path(&path).unwrap();
		assert_eq!(rdev_idx, 0); // sorted_devs[0]: both rdevs equal size, stable order

		let pattern = [0xA5u8; 4096];
		group.handle_for_rdev(rdev_idx).write(sector * 512, &pattern).unwrap();

		let mut readback = [0u8; 4096];
		group
			.handle_for_rdev(rdev_idx)
			.read(sector * 512, &mut readback)
			.unwrap();
		assert_eq!(readback, pattern);
	}

	#[test]
	fn zone_name_uniqueness_enforced() {
		let f1 = make_rdev_file(1024 * 1024);
		let seeds = vec![seed(1, f1.path().to_path_buf())];
		let mut group = Group::create("g", &seeds, 1000).unwrap();
		group.start().unwrap();
		group.zone_create("v1", 1024, 1000).unwrap();
		assert!(matches!(
			group.zone_create("v1", 1024, 1000),
			Err(Error::NameTaken(_))
		));
	}

	#[test]
	fn zone_resize_grows_and_shrinks() {
		let f1 = make_rdev_file(2 * 1024 * 1024);
		let seeds = vec![seed(1, f1.path().to_path_buf())];
		let mut group = Group::create("g", &seeds, 1000).unwrap();
		group.start().unwrap();
		group.zone_create("v1", 128 * 1024, 1000).unwrap();
		group.zone_resize("v1", 3 * 128 * 1024, 1001).unwrap();
		assert_eq!(group.zones[0].plages.len(), 3);
		group.zone_resize("v1", 128 * 1024, 1002).unwrap();
		assert_eq!(group.zones[0].plages.len(), 1);
	}

	#[test]
	fn zone_stop_refuses_while_open() {
		let f1 = make_rdev_file(1024 * 1024);
		let seeds = vec![seed(1, f1.path().to_path_buf())];
		let mut group = Group::create("g", &seeds, 1000).unwrap();
		group.start().unwrap();
		group.zone_create("v1", 1024, 1000).unwrap();
		group.zone_start("v1", AccessMode::ReadWrite).unwrap();
		group.zones[0].open_count = 1;
		assert!(matches!(group.zone_stop("v1"), Err(Error::InUse)));
		group.zones[0].open_count = 0;
		assert!(group.zone_stop("v1").is_ok());
	}

	#[test]
	fn group_stop_refuses_while_zone_active() {
		let f1 = make_rdev_file(1024 * 1024);
		let seeds = vec![seed(1, f1.path().to_path_buf())];
		let mut group = Group::create("g", &seeds, 1000).unwrap();
		group.start().unwrap();
		group.zone_create("v1", 1024, 1000).unwrap();
		group.zone_start("v1", AccessMode::ReadWrite).unwrap();
		assert!(matches!(group.stop(), Err(Error::InUse)));
		group.zone_stop("v1").unwrap();
		assert!(group.stop().is_ok());
	}

	#[test]
	fn reload_after_restart_rebuilds_zones() {
		let f1 = make_rdev_file(2 * 1024 * 1024);
		let f2 = make_rdev_file(2 * 1024 * 1024);
		let seeds = vec![
			seed(1, f1.path().to_path_buf()),
			seed(2, f2.path().to_path_buf()),
		];
		let mut group = Group::create("g", &seeds, 1000).unwrap();
		group.start().unwrap();
		group.zone_create("v1", 128 * 1024, 1000).unwrap();
		drop(group);

		let paths = vec![f1.path().to_path_buf(), f2.path().to_path_buf()];
		let reloaded = Group::reload(&paths).unwrap();
		assert_eq!(reloaded.name, "g");
		assert_eq!(reloaded.zones.len(), 1);
		assert_eq!(reloaded.zones[0].name, "v1");
		assert_eq!(reloaded.zones[0].size_kb, 128 * 1024);
	}

	#[test]
	fn heterogeneous_scenario_all_invariant_holds() {
		let f1 = make_rdev_file(1024 * 1024);
		let f2 = make_rdev_file(2 * 1024 * 1024);
		let f3 = make_rdev_file(4 * 1024 * 1024);
		let seeds = vec![
			seed(1, f1.path().to_path_buf()),
			seed(2, f2.path().to_path_buf()),
			seed(3, f3.path().to_path_buf()),
		];
		let mut group = Group::create("g", &seeds, 1000).unwrap();
		group.start().unwrap();
		group.zone_create("v1", 256 * 1024, 1000).unwrap();
		group.zone_create("v2", 512 * 1024, 1000).unwrap();

		let placement = group.placement().unwrap();
		let used_pages: u64 = placement.extents().iter().filter(|e| !e.free).count() as u64;
		let zones_pages: u64 = group
			.zones
			.iter()
			.map(|z| extents_needed(z.size_kb) as u64)
			.sum();
		assert_eq!(used_pages, zones_pages);
	}
}
