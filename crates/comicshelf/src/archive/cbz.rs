use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::ArchiveError;

/// Upper bound on the preallocation taken from a member's declared size.
/// Headers are untrusted; larger members still read, just without the hint.
const MAX_PREALLOC: u64 = 64 << 20;

/// In-process reader for CBZ/ZIP containers.
pub struct CbzBackend {
    archive: zip::ZipArchive<File>,
    names: Vec<String>,
}

impl CbzBackend {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path).map_err(|e| ArchiveError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut archive = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        // Central directory order; directory entries are not members.
        let mut names = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index).map_err(|e| ArchiveError::Open {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            if !entry.is_dir() {
                names.push(entry.name().to_string());
            }
        }

        Ok(Self { archive, names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn read(&mut self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut entry = self.archive.by_name(name).map_err(|e| match e {
            zip::result::ZipError::FileNotFound => ArchiveError::MemberNotFound(name.to_string()),
            other => ArchiveError::Read {
                name: name.to_string(),
                reason: other.to_string(),
            },
        })?;

        let mut bytes = Vec::with_capacity(entry.size().min(MAX_PREALLOC) as usize);
        entry.read_to_end(&mut bytes).map_err(|e| ArchiveError::Read {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(bytes)
    }
}
