//! Directory-backed record store: one text file per record.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chalet_traits::{BoxError, RecordStore};

/// Stores each record as `<dir>/<name>`, terminated by a newline.
///
/// Writes go to a sibling temp file that is synced and renamed over the
/// record, so a power cut leaves either the old or the new record.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

fn replace_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

impl RecordStore for FileStore {
    fn read(&mut self, name: &str) -> Result<Option<String>, BoxError> {
        match fs::read_to_string(self.path_of(name)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    fn write(&mut self, name: &str, record: &str) -> Result<(), BoxError> {
        let mut line = String::with_capacity(record.len() + 1);
        line.push_str(record);
        line.push('\n');
        replace_file(&self.path_of(name), line.as_bytes())?;
        Ok(())
    }
}
