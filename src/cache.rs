//! On-disk forecast cache.
//!
//! One file per station, named after the SHA-256 of the station name.
//! Entries expire passively: a file older than the freshness window is
//! ignored and later overwritten, never deleted.

use crate::error::{AppError, Result};
use sha2::{Digest, Sha256};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// A cached forecast body and whether it is still inside the window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedForecast {
    pub body: Vec<u8>,
    pub age: Duration,
    pub is_fresh: bool,
}

#[derive(Debug, Clone)]
pub struct PredictionCache {
    directory: PathBuf,
    freshness: Duration,
}

impl PredictionCache {
    pub fn new(directory: impl Into<PathBuf>, freshness: Duration) -> Self {
        Self {
            directory: directory.into(),
            freshness,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    /// Stable, filesystem-safe key for a station name
    pub fn key(station: &str) -> String {
        let digest = Sha256::digest(station.trim().as_bytes());
        format!("{digest:x}")
    }

    pub fn path_for(&self, station: &str) -> PathBuf {
        self.directory.join(format!("{}.json", Self::key(station)))
    }

    /// Read the entry for `station`, `None` when nothing was ever written
    pub fn get(&self, station: &str) -> Result<Option<CachedForecast>> {
        self.get_at(station, SystemTime::now())
    }

    /// Same as [`get`](Self::get) with an explicit clock
    pub fn get_at(&self, station: &str, now: SystemTime) -> Result<Option<CachedForecast>> {
        let path = self.path_for(station);

        let modified = match std::fs::metadata(&path) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::Io(e)),
        };

        // A write stamped in the future counts as brand new
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        let is_fresh = age < self.freshness;

        let body = match std::fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::Io(e)),
        };

        debug!(
            "Cache entry for {} is {}s old ({})",
            station,
            age.as_secs(),
            if is_fresh { "fresh" } else { "stale" }
        );

        Ok(Some(CachedForecast {
            body,
            age,
            is_fresh,
        }))
    }

    /// Body of the entry for `station` if it is still fresh
    pub fn get_fresh(&self, station: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .get(station)?
            .filter(|entry| entry.is_fresh)
            .map(|entry| entry.body))
    }

    /// Replace the entry for `station` with `body`
    ///
    /// The body is written to a temporary file in the cache directory and
    /// renamed over the old entry, so readers see either the old or the
    /// new bytes in full.
    pub fn put(&self, station: &str, body: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.directory).map_err(AppError::CacheWrite)?;

        let path = self.path_for(station);
        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.directory).map_err(AppError::CacheWrite)?;
        tmp.write_all(body).map_err(AppError::CacheWrite)?;
        tmp.flush().map_err(AppError::CacheWrite)?;
        tmp.persist(&path)
            .map_err(|err| AppError::CacheWrite(err.error))?;

        debug!("Cached {} bytes for {} at {}", body.len(), station, path.display());
        Ok(())
    }

    /// [`get`](Self::get) run on the blocking pool
    pub async fn load(&self, station: &str) -> Result<Option<CachedForecast>> {
        let cache = self.clone();
        let station = station.to_string();
        tokio::task::spawn_blocking(move || cache.get(&station))
            .await
            .map_err(|e| AppError::Io(std::io::Error::other(e)))?
    }

    /// [`put`](Self::put) run on the blocking pool
    pub async fn store(&self, station: &str, body: Vec<u8>) -> Result<()> {
        let cache = self.clone();
        let station = station.to_string();
        tokio::task::spawn_blocking(move || cache.put(&station, &body))
            .await
            .map_err(|e| AppError::CacheWrite(std::io::Error::other(e)))?
    }
}
