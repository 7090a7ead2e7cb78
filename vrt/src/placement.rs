//! The `sstriping` placement engine (spec §4.C): builds the staircase
//! extent table for a group's rdevs, allocates/frees extents to zones,
//! and translates zone-relative sectors to physical (rdev, sector)
//! pairs.
//!
//! Grounded directly on `init_plages_sstriping`/`init_zone_layout_sstriping`
//! in `examples/original_source/vrt/virtualiseur/vrt_layout.c`: the
//! narrowing-staircase loop, the "doesn't fit, drop the smallest rdev
//! and retry" branch, and the per-rdev capacity bookkeeping are all
//! carried over arithmetic-for-arithmetic, just with `Vec` in place of
//! `vmalloc`'d C arrays.

use exa_common::{Error, Result};

/// Size of one "unit of extent" in KiB (16 KiB).
pub const UE_SIZE_KB: u64 = 16;
/// Sectors (512 B) per UE.
pub const SECTORS_PER_UE: u64 = (UE_SIZE_KB * 1024) / 512;
/// Size of one logical page in KiB (128 MiB).
pub const PAGE_SIZE_KB: u64 = 128 * 1024;
/// UEs per logical page (`ue_par_plage` in the original).
pub const UE_PER_PAGE: u64 = PAGE_SIZE_KB / UE_SIZE_KB;

/// A placement unit: a rectangular region of the striping grid shared
/// by `width` rdevs, spanning stripe rows `[stripe_start, stripe_end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
	pub stripe_start: u64,
	pub stripe_end: u64,
	pub width: u32,
	pub height: u64,
	pub free: bool,
}

impl Extent {
	/// Rdev slots (into the engine's `sorted_devs`) this extent stripes
	/// across: the `width` largest rdevs.
	fn sorted_devs_range(&self, nb_rdevs: usize) -> std::ops::Range<usize> {
		nb_rdevs - self.width as usize..nb_rdevs
	}
}

/// The extent table for one group, plus the rdev-size ordering it was
/// built from.
#[derive(Debug, Clone)]
pub struct PlacementEngine {
	/// Original rdev indices, sorted ascending by size.
	sorted_devs: Vec<usize>,
	extents: Vec<Extent>,
}

impl PlacementEngine {
	/// Builds the staircase extent table from each rdev's *usable*
	/// size, in UE (spec §4.C). The caller has already subtracted the
	/// per-rdev metadata area.
	pub fn build(usable_sizes_ue: &[u64]) -> Self {
		let n = usable_sizes_ue.len();
		let mut sorted_devs: Vec<usize> = (0..n).collect();
		sorted_devs.sort_by_key(|&i| usable_sizes_ue[i]);

		let mut extents = Vec::new();
		if n == 0 {
			return Self {
				sorted_devs,
				extents,
			};
		}

		let largest_ue = usable_sizes_ue[sorted_devs[n - 1]];
		let mut base = 0u64;
		let mut width = n as u32;
		let mut smallest_idx = 0usize;

		while base < largest_ue && width > 0 {
			let height = UE_PER_PAGE.div_ceil(width as u64);
			let smallest_cap = usable_sizes_ue[sorted_devs[smallest_idx]];
			if smallest_cap < base + height {
				smallest_idx += 1;
				width -= 1;
				base = usable_sizes_ue[sorted_devs[smallest_idx - 1]];
				continue;
			}
			extents.push(Extent {
				stripe_start: base,
				stripe_end: base + height - 1,
				width,
				height,
				free: true,
			});
			base += height;
		}

		Self {
			sorted_devs,
			extents,
		}
	}

	pub fn sorted_devs(&self) -> &[usize] {
		&self.sorted_devs
	}

	pub fn extents(&self) -> &[Extent] {
		&self.extents
	}

	pub fn nb_rdevs(&self) -> usize {
		self.sorted_devs.len()
	}

	/// Total number of extents in the group, i.e. the usable capacity
	/// in units of `PAGE_SIZE_KB` (`usable_cs_sstriping` in the
	/// original).
	pub fn usable_cs_pages(&self) -> u64 {
		self.extents.len() as u64
	}

	/// Rebuilds the free/busy bitmap from a set of zones' extent lists,
	/// as done on `group_start` (`get_busy_plages_sstriping`).
	pub fn mark_busy(&mut self, zone_plages: impl IntoIterator<Item = usize>) {
		for idx in zone_plages {
			if let Some(e) = self.extents.get_mut(idx) {
				e.free = false;
			}
		}
	}

	/// Allocates `n` free extents for a new or growing zone, in
	/// ascending index order (`init_zone_layout_sstriping`). Updates
	/// each participating rdev's `capa_used_kb` on success.
	pub fn allocate(&mut self, n: usize, capa_used_kb: &mut [u64]) -> Result<Vec<usize>> {
		let mut chosen = Vec::with_capacity(n);
		for (idx, extent) in self.extents.iter().enumerate() {
			if chosen.len() == n {
				break;
			}
			if extent.free {
				chosen.push(idx);
			}
		}
		if chosen.len() < n {
			return Err(Error::NoSpace);
		}
		let nb_rdevs = self.nb_rdevs();
		for &idx in &chosen {
			let extent = &mut self.extents[idx];
			extent.free = false;
			let height = extent.height;
			for slot in extent.sorted_devs_range(nb_rdevs) {
				capa_used_kb[self.sorted_devs[slot]] += height * UE_SIZE_KB;
			}
		}
		Ok(chosen)
	}

	/// Frees extents previously returned by [`allocate`](Self::allocate),
	/// releasing their capacity accounting.
	pub fn free(&mut self, indices: &[usize], capa_used_kb: &mut [u64]) {
		let nb_rdevs = self.nb_rdevs();
		for &idx in indices {
			let extent = &mut self.extents[idx];
			extent.free = true;
			let height = extent.height;
			for slot in extent.sorted_devs_range(nb_rdevs) {
				capa_used_kb[self.sorted_devs[slot]] =
					capa_used_kb[self.sorted_devs[slot]].saturating_sub(height * UE_SIZE_KB);
			}
		}
	}

	/// Translates a zone-relative sector `zs` to a physical (original
	/// rdev index, physical sector) pair, given the zone's ordered
	/// extent-index list (spec §4.C, step by step).
	pub fn translate(&self, zone_plages: &[usize], zs: u64) -> Result<(usize, u64)> {
		let ue_in_zone = zs / SECTORS_PER_UE;
		let page_index = (ue_in_zone / UE_PER_PAGE) as usize;
		let extent_idx = *zone_plages
			.get(page_index)
			.ok_or(Error::Corrupt("zone sector out of range".into()))?;
		let extent = self
			.extents
			.get(extent_idx)
			.ok_or(Error::Corrupt("dangling plage index".into()))?;

		let ue_in_page = ue_in_zone % UE_PER_PAGE;
		let width = extent.width as u64;
		let col = (ue_in_page % width) as usize;
		let nb_rdevs = self.nb_rdevs();
		let sorted_idx = nb_rdevs - extent.width as usize + col;
		let rdev = self.sorted_devs[sorted_idx];

		let ue_in_rdev = extent.stripe_start + ue_in_page / width;
		let physical_sector = ue_in_rdev * SECTORS_PER_UE + (zs % SECTORS_PER_UE);
		Ok((rdev, physical_sector))
	}
}

/// Number of extents a zone of `size_kb` needs (`ceil(size / page_size)`).
pub fn extents_needed(size_kb: u64) -> usize {
	size_kb.div_ceil(PAGE_SIZE_KB) as usize
}

#[cfg(test)]
mod test {
	use super::*;

	fn kb_to_ue(kb: u64) -> u64 {
		kb / UE_SIZE_KB
	}

	#[test]
	fn heterogeneous_staircase_has_descending_width_bands() {
		let sizes_ue = [
			kb_to_ue(1024 * 1024),     // 1 GiB
			kb_to_ue(2 * 1024 * 1024), // 2 GiB
			kb_to_ue(4 * 1024 * 1024), // 4 GiB
		];
		let engine = PlacementEngine::build(&sizes_ue);
		let widths: Vec<u32> = engine.extents().iter().map(|e| e.width).collect();
		assert!(widths.windows(2).all(|w| w[0] >= w[1]));
		assert_eq!(*widths.first().unwrap(), 3);
		assert_eq!(*widths.last().unwrap(), 1);
		assert!(widths.contains(&2));

		// extents form a contiguous, non-overlapping stripe-row cover per band.
		for pair in engine.extents().windows(2) {
			if pair[0].width == pair[1].width {
				assert_eq!(pair[0].stripe_end + 1, pair[1].stripe_start);
			}
		}
	}

	#[test]
	fn identical_sizes_degenerate_to_full_width_rows() {
		let sizes_ue = [kb_to_ue(1024 * 1024); 4];
		let engine = PlacementEngine::build(&sizes_ue);
		assert!(engine.extents().iter().all(|e| e.width == 4));
	}

	#[test]
	fn single_rdev_group_is_one_wide() {
		let sizes_ue = [kb_to_ue(512 * 1024)];
		let engine = PlacementEngine::build(&sizes_ue);
		assert!(engine.extents().iter().all(|e| e.width == 1));
		assert_eq!(engine.nb_rdevs(), 1);
	}

	#[test]
	fn allocate_and_free_round_trip_capacity() {
		let sizes_ue = [kb_to_ue(2 * 1024 * 1024); 2];
		let mut engine = PlacementEngine::build(&sizes_ue);
		let mut capa = vec![0u64; 2];
		let chosen = engine.allocate(3, &mut capa).unwrap();
		assert_eq!(chosen.len(), 3);
		assert!(capa.iter().all(|&c| c > 0));
		engine.free(&chosen, &mut capa);
		assert!(capa.iter().all(|&c| c == 0));
		assert!(engine.extents().iter().all(|e| e.free));
	}

	#[test]
	fn allocate_more_than_available_fails_with_no_space() {
		let sizes_ue = [kb_to_ue(256 * 1024)];
		let mut engine = PlacementEngine::build(&sizes_ue);
		let total = engine.extents().len();
		let mut capa = vec![0u64; 1];
		assert!(engine.allocate(total + 1, &mut capa).is_err());
	}

	#[test]
	fn address_translation_stays_within_a_single_ue_aligned_rdev() {
		let sizes_ue = [kb_to_ue(4 * 1024 * 1024); 3];
		let mut engine = PlacementEngine::build(&sizes_ue);
		let mut capa = vec![0u64; 3];
		let zone_plages = engine.allocate(2, &mut capa).unwrap();

		// Two sectors inside the same UE must land on the same rdev.
		let (rdev0, sector0) = engine.translate(&zone_plages, 0).unwrap();
		let (rdev1, sector1) = engine.translate(&zone_plages, SECTORS_PER_UE - 1).unwrap();
		assert_eq!(rdev0, rdev1);
		assert_eq!(sector1 - sector0, SECTORS_PER_UE - 1);

		// The next UE may land on a different rdev (round-robin across width).
		let (_rdev2, sector2) = engine.translate(&zone_plages, SECTORS_PER_UE).unwrap();
		assert_ne!(sector2, sector1 + 1);
	}

	#[test]
	fn extents_needed_rounds_up() {
		assert_eq!(extents_needed(1), 1);
		assert_eq!(extents_needed(PAGE_SIZE_KB), 1);
		assert_eq!(extents_needed(PAGE_SIZE_KB + 1), 2);
	}
}
