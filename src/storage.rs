use std::io;
use std::path::{Path, PathBuf};

/// Byte store for uploaded files. Stored names are generated server-side so
/// user-supplied names never touch the filesystem layout.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(dir: &str) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            root: PathBuf::from(dir),
        })
    }

    /// Writes the bytes and returns the generated stored name. The original
    /// extension is kept for convenience; the name itself is a fresh UUID.
    pub fn put(&self, original_name: &str, bytes: &[u8]) -> io::Result<String> {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("bin");
        let stored_name = format!("{}.{}", uuid::Uuid::new_v4(), ext);
        std::fs::write(self.root.join(&stored_name), bytes)?;
        Ok(stored_name)
    }

    pub fn path(&self, stored_name: &str) -> PathBuf {
        self.root.join(stored_name)
    }

    /// Removes stored bytes. Already-missing bytes are not an error: a file
    /// record whose bytes vanished must still be deletable.
    pub fn delete(&self, stored_name: &str) -> io::Result<()> {
        match std::fs::remove_file(self.root.join(stored_name)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
