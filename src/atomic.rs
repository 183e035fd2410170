//! Commit-or-discard file output.
//!
//! [AtomicFile] writes into a temporary file next to the destination and
//! renames it into place on [commit](AtomicFile::commit). Readers of the
//! destination see either the previous content or the complete new content.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::debug;

pub struct AtomicFile {
    temp: NamedTempFile,
    path: PathBuf,
}

impl AtomicFile {
    /// Starts replacing `path`. Nothing is visible at `path` until commit.
    pub fn open_for_replace(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        if !dir.is_dir() {
            fs::create_dir_all(dir).with_context(|| format!("Unable to create directory: {}", dir.display()))?;
        }

        let temp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Unable to create temporary file in {}", dir.display()))?;

        debug!(path = %path.display(), temp = %temp.path().display(), "open for replace");

        Ok(Self {
            temp,
            path: path.to_path_buf(),
        })
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes and moves the written content to the destination.
    pub fn commit(mut self) -> Result<()> {
        self.temp.flush()?;
        self.temp
            .as_file()
            .sync_all()
            .with_context(|| format!("Unable to sync {}", self.path.display()))?;

        self.temp
            .persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("Unable to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), "committed");
        Ok(())
    }

    /// Drops everything written so far. Dropping without commit does the same.
    pub fn discard(self) -> Result<()> {
        let path = self.path;
        self.temp
            .close()
            .with_context(|| format!("Unable to remove temporary file for {}", path.display()))?;

        debug!(path = %path.display(), "discarded");
        Ok(())
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

impl io::Seek for AtomicFile {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        io::Seek::seek(&mut self.temp, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn commit_replaces() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("layer.usda");
        fs::write(&path, "old")?;

        let mut file = AtomicFile::open_for_replace(&path)?;
        file.write_all(b"#usda 1.0\n")?;

        // Not visible before commit.
        assert_eq!(fs::read_to_string(&path)?, "old");

        file.commit()?;
        assert_eq!(fs::read_to_string(&path)?, "#usda 1.0\n");
        assert_eq!(entries(dir.path()), 1);

        Ok(())
    }

    #[test]
    fn discard_keeps_original() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("layer.usda");
        fs::write(&path, "old")?;

        let mut file = AtomicFile::open_for_replace(&path)?;
        file.write_all(b"partial")?;
        file.discard()?;

        assert_eq!(fs::read_to_string(&path)?, "old");
        assert_eq!(entries(dir.path()), 1);

        {
            let mut file = AtomicFile::open_for_replace(&path)?;
            file.write_all(b"dropped")?;
        }

        assert_eq!(fs::read_to_string(&path)?, "old");
        assert_eq!(entries(dir.path()), 1);

        Ok(())
    }

    #[test]
    fn creates_parent_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out/nested/layer.usda");

        let mut file = AtomicFile::open_for_replace(&path)?;
        file.write_all(b"x")?;
        file.commit()?;

        assert_eq!(fs::read(&path)?, b"x");

        Ok(())
    }
}
