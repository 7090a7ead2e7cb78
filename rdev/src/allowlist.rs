//! Per-node disk path allowlist (spec §4.H, §9 supplement), grounded on
//! `rdev_read_disk_conf_file`/`rdev_is_path_available` in
//! `examples/original_source/admind/services/rdev/src/rdev_config.c`:
//! a config file of one path (or, here, one shell-style glob pattern)
//! per line; a missing file means every path is allowed ("any" in the
//! original).

use std::path::{Path, PathBuf};

use exa_common::Result;

/// The set of device-path patterns an operator has allowed on this
/// node. `None` means "no config file" — every candidate is allowed.
#[derive(Debug, Clone)]
pub struct DiskAllowlist {
	patterns: Option<Vec<String>>,
}

impl DiskAllowlist {
	/// Loads `<conf_dir>/disks.conf`: one glob pattern per line, blank
	/// lines and lines starting with `#` ignored. A missing file yields
	/// an allowlist that accepts any path.
	pub fn load(conf_dir: &Path) -> Result<Self> {
		let path = Self::conf_path(conf_dir);
		match std::fs::read_to_string(&path) {
			Ok(contents) => {
				let patterns = contents
					.lines()
					.map(str::trim)
					.filter(|l| !l.is_empty() && !l.starts_with('#'))
					.map(str::to_owned)
					.collect();
				log::debug!("loaded disk allowlist from {}", path.display());
				Ok(Self { patterns: Some(patterns) })
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self { patterns: None }),
			Err(e) => Err(exa_common::Error::Io(e)),
		}
	}

	fn conf_path(conf_dir: &Path) -> PathBuf {
		conf_dir.join("disks.conf")
	}

	pub fn allows_any(&self) -> bool {
		self.patterns.is_none()
	}

	/// Whether `path` matches one of the configured patterns (or
	/// trivially, if there is no config file at all).
	pub fn is_allowed(&self, path: &str) -> bool {
		match &self.patterns {
			None => true,
			Some(patterns) => patterns.iter().any(|p| glob_match(p, path)),
		}
	}
}

/// Minimal shell-style glob: `*` matches any run of characters, every
/// other byte must match literally. Sufficient for device-path
/// patterns like `/dev/sd*` or `/dev/disk/by-id/*-part1`.
fn glob_match(pattern: &str, text: &str) -> bool {
	fn helper(pattern: &[u8], text: &[u8]) -> bool {
		match pattern.first() {
			None => text.is_empty(),
			Some(b'*') => {
				(0..=text.len()).any(|i| helper(&pattern[1..], &text[i..]))
			}
			Some(&c) => !text.is_empty() && text[0] == c && helper(&pattern[1..], &text[1..]),
		}
	}
	helper(pattern.as_bytes(), text.as_bytes())
}
