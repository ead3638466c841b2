//! Session store - one JSON file per recording plus a catalog index
//!
//! Recordings are written through a temporary file in the store directory
//! and moved into place without clobbering, so a failed save never leaves a
//! half-written recording behind. The catalog is rewritten in full on every
//! append, again via a temporary file.

use crate::error::{Error, Result};
use crate::events::Recording;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const CATALOG_FILE: &str = "catalog.json";

/// Collisions tolerated for one name within the same millisecond
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Index entry for one persisted recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    /// File name relative to the store directory
    pub file_reference: String,
}

impl CatalogEntry {
    pub fn for_recording(recording: &Recording, file_reference: impl Into<String>) -> Self {
        Self {
            name: recording.name.clone(),
            description: recording.description.clone(),
            file_reference: file_reference.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Store rooted at the current working directory
    pub fn new() -> Result<Self> {
        let dir = std::env::current_dir()
            .map_err(|e| Error::store_read(Path::new("."), e))?;
        Ok(Self { dir })
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| Error::store_write(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Persist a recording; returns the file reference to load it back
    pub fn save(&self, recording: &Recording) -> Result<String> {
        if recording.name.trim().is_empty() {
            return Err(Error::invalid_name(&recording.name));
        }

        let ts = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let base = format!("{}_{}", sanitize(&recording.name), ts);

        let mut tmp = self.write_temp(|w| {
            serde_json::to_writer_pretty(w, recording).map_err(io::Error::from)
        })?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let file_name = if attempt == 0 {
                format!("{}.json", base)
            } else {
                format!("{}_{}.json", base, attempt)
            };
            let path = self.dir.join(&file_name);
            match tmp.persist_noclobber(&path) {
                Ok(_) => {
                    tracing::info!(
                        name = %recording.name,
                        events = recording.events.len(),
                        path = %path.display(),
                        "recording saved"
                    );
                    return Ok(file_name);
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => tmp = e.file,
                Err(e) => return Err(Error::store_write(&path, e.error)),
            }
        }

        Err(Error::store_write(
            &self.dir.join(format!("{}.json", base)),
            "too many recordings with the same name and timestamp",
        ))
    }

    pub fn load(&self, file_reference: &str) -> Result<Recording> {
        let path = self.dir.join(file_reference);
        let file = File::open(&path).map_err(|e| Error::store_read(&path, e))?;
        let recording: Recording = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::store_read(&path, e))?;
        tracing::debug!(
            name = %recording.name,
            events = recording.events.len(),
            "recording loaded"
        );
        Ok(recording)
    }

    /// Catalog entries in insertion order. A missing catalog is empty.
    pub fn load_catalog(&self) -> Result<Vec<CatalogEntry>> {
        let path = self.catalog_path();
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::store_read(&path, e)),
        };
        serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::store_read(&path, e))
    }

    pub fn append_catalog_entry(&self, entry: CatalogEntry) -> Result<()> {
        let mut entries = self.load_catalog()?;
        entries.push(entry);

        let path = self.catalog_path();
        let tmp = self.write_temp(|w| {
            serde_json::to_writer_pretty(w, &entries).map_err(io::Error::from)
        })?;
        tmp.persist(&path).map_err(|e| Error::store_write(&path, e.error))?;

        tracing::debug!(entries = entries.len(), "catalog rewritten");
        Ok(())
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.dir.join(CATALOG_FILE)
    }

    fn write_temp<F>(&self, write: F) -> Result<NamedTempFile>
    where
        F: FnOnce(&mut BufWriter<&File>) -> io::Result<()>,
    {
        let tmp = NamedTempFile::new_in(&self.dir).map_err(|e| Error::store_write(&self.dir, e))?;
        let fail = |e: io::Error| Error::store_write(tmp.path(), e);

        let mut w = BufWriter::new(tmp.as_file());
        write(&mut w).map_err(fail)?;
        w.flush().map_err(fail)?;
        drop(w);
        tmp.as_file().sync_all().map_err(fail)?;
        Ok(tmp)
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
