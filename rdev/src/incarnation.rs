//! The per-node incarnation counter (spec §6, §9): a 16-bit decimal
//! value in `<cache_dir>/incarnation`, bumped on every node start so
//! peers can tell a restarted node from one that never went down.
//!
//! Grounded on `adm_set_incarnation`/`adm_load_incarnation` in
//! `examples/original_source/admind/src/adm_incarnation.c`: load,
//! increment with 0 treated as "no value" (wraps straight to 1), save.
//! The original falls back to a random starting value when the file is
//! missing (bug #3142: makes a reinstalled machine's incarnation less
//! likely to collide with a peer's) — kept here via `exa_common::Uuid`'s
//! OS-entropy source reduced to 16 bits, rather than pulling in a
//! second RNG dependency.

use std::path::{Path, PathBuf};

use exa_common::{Error, Result, Uuid};

use crate::atomic_file::write_atomic;

fn incarnation_path(cache_dir: &Path) -> PathBuf {
	cache_dir.join("incarnation")
}

fn random_u16() -> u16 {
	(Uuid::random().words()[0] & 0xFFFF) as u16
}

/// Loads the current incarnation, or a random value if the file is
/// absent (first boot, or a freshly reinstalled node).
pub fn load(cache_dir: &Path) -> Result<u16> {
	let path = incarnation_path(cache_dir);
	match std::fs::read_to_string(&path) {
		Ok(contents) => contents
			.trim()
			.parse::<u16>()
			.map_err(|_| Error::Corrupt(format!("malformed incarnation file at {}", path.display()))),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(random_u16()),
		Err(e) => Err(Error::Io(e)),
	}
}

fn save(cache_dir: &Path, value: u16) -> Result<()> {
	write_atomic(&incarnation_path(cache_dir), format!("{value}\n").as_bytes())
}

/// Loads, increments (wrapping `0 -> 1`, never settling on the
/// "no value" sentinel), and atomically saves the new incarnation.
pub fn bump(cache_dir: &Path) -> Result<u16> {
	let mut value = load(cache_dir)?;
	value = value.wrapping_add(1);
	if value == 0 {
		value = 1;
	}
	save(cache_dir, value)?;
	log::info!("incarnation bumped to {value}");
	Ok(value)
}

pub fn delete(cache_dir: &Path) -> Result<()> {
	match std::fs::remove_file(incarnation_path(cache_dir)) {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
		Err(e) => Err(Error::Io(e)),
	}
}
