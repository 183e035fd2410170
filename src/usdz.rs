//! USDZ archive format.
//!
//! USDZ is an uncompressed, unencrypted ZIP archive. The data of every entry
//! starts on a 64 byte boundary so that readers can map entries directly
//! without extraction.

use std::{
    fs::File,
    io::{Read, Write},
    path::{Component, Path},
};

use anyhow::{bail, ensure, Context, Result};
use tracing::debug;
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::{atomic::AtomicFile, usda};

/// Data alignment of archive entries.
pub const DATA_ALIGNMENT: u16 = 64;

/// USDZ archive reader.
///
/// Provides access to layers within a USDZ archive.
pub struct Archive {
    archive: ZipArchive<File>,
}

impl Archive {
    /// Open a USDZ archive from a file path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open USDZ archive: {}", path.display()))?;

        let archive =
            ZipArchive::new(file).with_context(|| format!("Failed to read ZIP archive: {}", path.display()))?;

        Ok(Self { archive })
    }

    /// Entry names in archive order.
    pub fn files(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Raw content of an entry.
    pub fn read_bytes(&mut self, file_path: &str) -> Result<Vec<u8>> {
        let mut file = self
            .archive
            .by_name(file_path)
            .with_context(|| format!("File '{}' not found in archive", file_path))?;

        if file.compression() != CompressionMethod::Stored {
            debug!(file_path, "compressed entry in usdz archive");
        }

        let mut buffer = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read file '{}' from archive", file_path))?;

        Ok(buffer)
    }

    /// Parses a text layer from the archive.
    pub fn read(&mut self, file_path: &str) -> Result<usda::TextReader> {
        if file_path.ends_with(".usda") {
            let buffer = self.read_bytes(file_path)?;
            let content =
                String::from_utf8(buffer).with_context(|| format!("File '{}' is not valid UTF-8", file_path))?;

            usda::TextReader::from_str(&content, file_path)
                .with_context(|| format!("Failed to parse USDA data from '{}'", file_path))
        } else if file_path.ends_with(".usdc") {
            bail!("Binary layers are not supported: '{}'", file_path)
        } else if file_path.ends_with(".usdz") {
            bail!("Nested USDZ files are not supported: '{}'", file_path)
        } else {
            bail!("Unsupported file format for '{}'. Expected .usda extension", file_path)
        }
    }
}

/// USDZ archive writer.
///
/// Entries are collected in memory and written on [save](Writer::save),
/// which replaces the destination atomically.
#[derive(Debug, Default)]
pub struct Writer {
    files: Vec<(String, Vec<u8>)>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `bytes` as `path_in_archive` and returns the name it is stored
    /// under. Adding a name twice keeps the first content.
    pub fn add_file(&mut self, bytes: impl Into<Vec<u8>>, path_in_archive: &str) -> Result<String> {
        let name = archive_path(path_in_archive);
        ensure!(!name.is_empty(), "Invalid path in archive: '{}'", path_in_archive);

        if self.files.iter().any(|(existing, _)| *existing == name) {
            debug!(name, "skip file already in archive");
            return Ok(name);
        }

        self.files.push((name.clone(), bytes.into()));
        Ok(name)
    }

    /// Stored names in the order they were added.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|(name, _)| name.as_str())
    }

    /// Writes the archive to `path`.
    pub fn save(self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let out = AtomicFile::open_for_replace(path)?;
        let mut zip = ZipWriter::new(out);

        let options = FileOptions::default().compression_method(CompressionMethod::Stored);

        for (name, bytes) in &self.files {
            zip.start_file_aligned(name.as_str(), options, DATA_ALIGNMENT)
                .with_context(|| format!("Failed to add '{}' to {}", name, path.display()))?;
            zip.write_all(bytes)?;
        }

        let out = zip
            .finish()
            .with_context(|| format!("Failed to finish ZIP archive: {}", path.display()))?;
        out.commit()?;

        debug!(path = %path.display(), files = self.files.len(), "saved usdz archive");
        Ok(())
    }
}

/// Conforms a path to ZIP conventions: forward slashes, no drive letter, no
/// leading slash, `.` and `..` resolved.
fn archive_path(path: &str) -> String {
    let path = path.replace('\\', "/");

    let path = match path.split_once(':') {
        Some((drive, rest)) if drive.len() == 1 && drive.chars().all(|c| c.is_ascii_alphabetic()) => rest.to_string(),
        _ => path,
    };

    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(&path).components() {
        match component {
            Component::Normal(part) => parts.extend(part.to_str()),
            Component::ParentDir => {
                parts.pop();
            }
            _ => {}
        }
    }

    parts.join("/")
}

#[cfg(test)]
mod tests {
    use crate::sdf::{self, AbstractData};

    use super::*;

    #[test]
    fn conform_archive_paths() {
        #[rustfmt::skip]
        const CASES: &[(&str, &str)] = &[
            ("layer.usda", "layer.usda"),
            ("/abs/layer.usda", "abs/layer.usda"),
            ("./sub/../layer.usda", "layer.usda"),
            ("textures\\wood.png", "textures/wood.png"),
            ("C:\\assets\\model.usda", "assets/model.usda"),
            ("", ""),
        ];

        for (input, expected) in CASES {
            assert_eq!(archive_path(input), *expected, "{input}");
        }
    }

    #[test]
    fn write_and_read_back() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("scene.usdz");

        let mut writer = Writer::new();
        assert_eq!(
            writer.add_file("#usda 1.0\ndef Xform \"World\" {}\n", "./scene.usda")?,
            "scene.usda"
        );
        assert_eq!(writer.add_file(vec![1u8, 2, 3], "textures\\a.bin")?, "textures/a.bin");
        assert_eq!(writer.add_file(vec![9u8], "scene.usda")?, "scene.usda");
        assert!(writer.add_file(Vec::new(), "/").is_err());

        assert_eq!(writer.files().collect::<Vec<_>>(), vec!["scene.usda", "textures/a.bin"]);
        writer.save(&path)?;

        let mut archive = Archive::open(&path)?;
        assert_eq!(archive.files().len(), 2);
        assert_eq!(archive.read_bytes("textures/a.bin")?, vec![1, 2, 3]);

        let layer = archive.read("scene.usda")?;
        let world = sdf::path("/World")?;
        assert!(layer.has_spec(&world));
        assert_eq!(layer.spec_type(&world), Some(sdf::SpecType::Prim));

        assert!(archive.read("textures/a.bin").is_err());
        assert!(archive.read("missing.usda").is_err());

        Ok(())
    }

    #[test]
    fn entries_are_aligned() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("aligned.usdz");

        let mut writer = Writer::new();
        for (i, name) in ["a.usda", "odd_name_length.usda", "x/y/z.bin"].iter().enumerate() {
            writer.add_file(vec![b'#'; 7 + i * 13], name)?;
        }
        writer.save(&path)?;

        let file = File::open(&path)?;
        let mut archive = ZipArchive::new(file)?;

        for index in 0..archive.len() {
            let entry = archive.by_index(index)?;
            assert_eq!(entry.compression(), CompressionMethod::Stored);
            assert_eq!(entry.data_start() % DATA_ALIGNMENT as u64, 0, "{}", entry.name());
        }

        Ok(())
    }
}
