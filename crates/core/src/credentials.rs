//! Credential store contract and implementations.
//!
//! The blob contents are opaque driver material; the store only moves bytes.
//! Discarding keeps a short-lived safety backup next to the original so a
//! wrongly rejected blob can be recovered by hand.

use std::path::{Path, PathBuf};

use mb_protocol::CredentialBlob;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::Result;

/// Outcome of loading stored credentials.
#[derive(Debug)]
pub enum LoadedCredentials {
	/// Nothing stored; a fresh start.
	Absent,
	/// Something is stored but cannot be parsed.
	Unreadable,
	/// A well-formed blob. Structural validation still applies.
	Present(CredentialBlob),
}

/// Durable storage for the driver's session credentials.
pub trait CredentialStore: Send + Sync {
	fn load(&self) -> Result<LoadedCredentials>;
	fn save(&self, blob: &CredentialBlob) -> Result<()>;
	/// Removes stored credentials, returning `true` when something was
	/// removed. Implementations keep a safety backup where feasible.
	fn discard(&self) -> Result<bool>;
}

/// JSON-file-backed credential store.
pub struct FsCredentialStore {
	path: PathBuf,
}

impl FsCredentialStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn backup_path(&self) -> PathBuf {
		let mut name = self.path.file_name().unwrap_or_default().to_os_string();
		name.push(".bak");
		self.path.with_file_name(name)
	}
}

impl CredentialStore for FsCredentialStore {
	fn load(&self) -> Result<LoadedCredentials> {
		let contents = match std::fs::read_to_string(&self.path) {
			Ok(contents) => contents,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				return Ok(LoadedCredentials::Absent);
			}
			Err(err) => return Err(err.into()),
		};

		match serde_json::from_str(&contents) {
			Ok(blob) => Ok(LoadedCredentials::Present(blob)),
			Err(err) => {
				warn!(
					target = "mb.auth",
					path = %self.path.display(),
					error = %err,
					"stored credential blob is unreadable"
				);
				Ok(LoadedCredentials::Unreadable)
			}
		}
	}

	fn save(&self, blob: &CredentialBlob) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let json = serde_json::to_string_pretty(blob)?;
		std::fs::write(&self.path, json)?;
		debug!(target = "mb.auth", path = %self.path.display(), "credentials saved");
		Ok(())
	}

	fn discard(&self) -> Result<bool> {
		if !self.path.exists() {
			return Ok(false);
		}

		let backup = self.backup_path();
		if let Err(err) = std::fs::copy(&self.path, &backup) {
			warn!(
				target = "mb.auth",
				path = %self.path.display(),
				error = %err,
				"could not write credential backup before discard"
			);
		}
		std::fs::remove_file(&self.path)?;
		debug!(
			target = "mb.auth",
			path = %self.path.display(),
			backup = %backup.display(),
			"credentials discarded"
		);
		Ok(true)
	}
}

/// In-memory credential store for tests and demos.
#[derive(Default)]
pub struct MemoryCredentialStore {
	slot: Mutex<Option<CredentialBlob>>,
}

impl MemoryCredentialStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_blob(blob: CredentialBlob) -> Self {
		Self {
			slot: Mutex::new(Some(blob)),
		}
	}

	pub fn current(&self) -> Option<CredentialBlob> {
		self.slot.lock().clone()
	}
}

impl CredentialStore for MemoryCredentialStore {
	fn load(&self) -> Result<LoadedCredentials> {
		Ok(match self.slot.lock().clone() {
			Some(blob) => LoadedCredentials::Present(blob),
			None => LoadedCredentials::Absent,
		})
	}

	fn save(&self, blob: &CredentialBlob) -> Result<()> {
		*self.slot.lock() = Some(blob.clone());
		Ok(())
	}

	fn discard(&self) -> Result<bool> {
		Ok(self.slot.lock().take().is_some())
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn missing_file_loads_as_absent() {
		let dir = tempfile::tempdir().unwrap();
		let store = FsCredentialStore::new(dir.path().join("credentials.json"));
		assert!(matches!(store.load().unwrap(), LoadedCredentials::Absent));
		assert!(!store.discard().unwrap());
	}

	#[test]
	fn save_then_load_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let store = FsCredentialStore::new(dir.path().join("credentials.json"));
		let blob = CredentialBlob::new(7, json!({"token": "abc"}));
		store.save(&blob).unwrap();
		match store.load().unwrap() {
			LoadedCredentials::Present(loaded) => assert_eq!(loaded, blob),
			other => panic!("expected present, got {other:?}"),
		}
	}

	#[test]
	fn corrupt_file_loads_as_unreadable() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("credentials.json");
		std::fs::write(&path, "not json at all").unwrap();
		let store = FsCredentialStore::new(&path);
		assert!(matches!(store.load().unwrap(), LoadedCredentials::Unreadable));
	}

	#[test]
	fn discard_keeps_a_backup() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("credentials.json");
		let store = FsCredentialStore::new(&path);
		store.save(&CredentialBlob::new(7, json!({"token": "abc"}))).unwrap();

		assert!(store.discard().unwrap());
		assert!(!path.exists());
		assert!(dir.path().join("credentials.json.bak").exists());
	}
}
