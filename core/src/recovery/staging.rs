// ## 📦 `src/recovery/staging.rs`

//! Persisted snapshot of pending cell edits.
//!
//! - **Save**: write the whole map to `<path>.tmp`, flush, rename over `<path>`.
//! - **Load**: read back after a crash; a missing file means nothing pending.
//! - **Clear**: remove the snapshot once an update committed.

use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::coordinator::update::ModifiedCellMap;
use crate::types::PipelineError;

#[derive(Debug, Clone)]
pub struct ChangeStaging {
    path: PathBuf,
}

impl ChangeStaging {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Replace the snapshot with `changes`. Readers see the old or the new file, never a mix.
    pub fn save(&self, changes: &ModifiedCellMap) -> Result<(), PipelineError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.tmp_path();
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, changes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        log::debug!("[UPDATE] staged {} pending cells to {:?}", changes.len(), self.path);
        Ok(())
    }

    pub fn load(&self) -> Result<Option<ModifiedCellMap>, PipelineError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn clear(&self) -> io::Result<()> {
        for path in [self.path.clone(), self.tmp_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_clear() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = ChangeStaging::new(tmp.path().join("pending.json"));
        assert!(staging.load().unwrap().is_none());

        let mut changes = ModifiedCellMap::new();
        changes.insert(5, "col1", "x");
        staging.save(&changes).unwrap();
        assert_eq!(staging.load().unwrap(), Some(changes));
        assert!(!staging.tmp_path().exists());

        staging.clear().unwrap();
        assert!(staging.load().unwrap().is_none());
        staging.clear().unwrap();
    }
}
