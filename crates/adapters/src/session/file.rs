// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use fleet_core::{SessionToken, VersionKey};

use super::{SessionError, SessionStore};

const EXTENSION: &str = "session";

/// One `<key>.session` file per version key, readable only by the owner.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Use `dir` for session files. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &VersionKey) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", key.as_str()))
    }

    fn ensure_dir(&self) -> Result<(), SessionError> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&self.dir).map_err(|e| SessionError::io(&self.dir, e))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, key: &VersionKey) -> Result<Option<SessionToken>, SessionError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(SessionToken::parse(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SessionError::io(&path, e)),
        }
    }

    fn save(&self, key: &VersionKey, token: &SessionToken) -> Result<(), SessionError> {
        self.ensure_dir()?;
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp).map_err(|e| SessionError::io(&tmp, e))?;
        file.write_all(token.as_str().as_bytes()).map_err(|e| SessionError::io(&tmp, e))?;
        file.sync_all().map_err(|e| SessionError::io(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|e| SessionError::io(&path, e))
    }

    fn clear(&self, key: &VersionKey) -> Result<(), SessionError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::io(&path, e)),
        }
    }

    fn list(&self) -> Result<Vec<VersionKey>, SessionError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SessionError::io(&self.dir, e)),
        };
        let mut keys: Vec<VersionKey> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == EXTENSION))
            .filter_map(|path| {
                let stem = path.file_stem()?.to_str()?;
                VersionKey::new(stem).ok()
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
