//! Atomic "write sibling `.new`, fsync, rename over original" helper
//! shared by the incarnation counter and the broken-disk table (spec
//! §4.G, §6), grounded on `adm_save_incarnation` in
//! `examples/original_source/admind/src/adm_incarnation.c` (which
//! writes to a `.new` sibling and renames) tightened with an explicit
//! `fsync` per the spec's stronger durability wording.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use exa_common::Result;

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
	let tmp_path = sibling_new_path(path);
	let mut f = File::create(&tmp_path)?;
	f.write_all(bytes)?;
	f.sync_all()?;
	fs::rename(&tmp_path, path)?;
	Ok(())
}

fn sibling_new_path(path: &Path) -> std::path::PathBuf {
	let mut name = path.file_name().unwrap_or_default().to_os_string();
	name.push(".new");
	path.with_file_name(name)
}
