//! Zip archive assembly.
//!
//! Entries are written in a fixed order:
//!
//! | Order | Entry                  |
//! |-------|------------------------|
//! | 1     | `<filename>` (the CQL) |
//! | 2     | `<unit>.json` per compiled unit, in unit order |
//! | 3     | the helper directory, relative paths, sorted by name |
//!
//! The writer streams to the sink with data descriptors, so the sink only
//! needs [`Write`]. Helper files are read before the first byte is written;
//! an unreadable helper directory leaves the sink untouched.

use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{PackagerError, PackagerResult};
use crate::multipart::{validate_unit_names, CompiledUnit};

/// Highest deflate level.
pub const MAX_COMPRESSION: i64 = 9;

/// Writes generated libraries into a zip archive.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveAssembler {
    level: i64,
}

impl Default for ArchiveAssembler {
    fn default() -> Self {
        Self {
            level: MAX_COMPRESSION,
        }
    }
}

enum HelperEntry {
    Directory(String),
    File(String, Vec<u8>),
}

impl ArchiveAssembler {
    /// Creates an assembler at maximum compression.
    pub fn new() -> Self {
        Self::default()
    }

    /// Streams the archive into `sink` and returns the number of entries.
    ///
    /// Unit names are checked with [`validate_unit_names`] before anything is
    /// written. On [`PackagerError::ArchiveWrite`] the sink holds a partial
    /// archive and must be discarded by the caller.
    pub fn assemble<W: Write>(
        &self,
        sink: W,
        source: &str,
        filename: &str,
        units: &[CompiledUnit],
        helper_dir: Option<&Path>,
    ) -> PackagerResult<usize> {
        validate_unit_names(units)?;
        let helpers = match helper_dir {
            Some(dir) => helper_entries(dir)?,
            None => Vec::new(),
        };

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(self.level));
        let mut zip = ZipWriter::new_stream(sink);
        let mut entries = 0;

        write_file(&mut zip, filename, source.as_bytes(), options)?;
        entries += 1;

        for unit in units {
            write_file(&mut zip, &format!("{}.json", unit.name), unit.content.as_bytes(), options)?;
            entries += 1;
        }

        for helper in &helpers {
            match helper {
                HelperEntry::Directory(name) => {
                    debug!(entry = %name, "Adding archive directory");
                    zip.add_directory(name.as_str(), options)?;
                }
                HelperEntry::File(name, bytes) => write_file(&mut zip, name, bytes, options)?,
            }
            entries += 1;
        }

        zip.finish()?;
        info!(entries, filename = %filename, "Archive written");
        Ok(entries)
    }
}

fn write_file<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    bytes: &[u8],
    options: SimpleFileOptions,
) -> PackagerResult<()> {
    debug!(entry = %name, bytes = bytes.len(), "Adding archive entry");
    zip.start_file(name, options)?;
    zip.write_all(bytes).map_err(ZipError::from)?;
    Ok(())
}

/// Collects the helper directory tree. Symlinks are skipped so nothing
/// outside `dir` can enter the archive.
fn helper_entries(dir: &Path) -> PackagerResult<Vec<HelperEntry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            PackagerError::io_error(path, e.into())
        })?;
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            continue;
        }

        let name = archive_name(dir, entry.path());
        if file_type.is_dir() {
            entries.push(HelperEntry::Directory(name));
        } else {
            let bytes =
                std::fs::read(entry.path()).map_err(|e| PackagerError::io_error(entry.path(), e))?;
            entries.push(HelperEntry::File(name, bytes));
        }
    }
    Ok(entries)
}

/// Relative path with `/` separators, as zip entry names require.
fn archive_name(root: &Path, path: &Path) -> String {
    let relative: PathBuf = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor, Read};
    use zip::ZipArchive;

    fn names(bytes: &[u8]) -> Vec<String> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn test_entry_order() {
        let helpers = tempfile::tempdir().unwrap();
        std::fs::write(helpers.path().join("FHIRHelpers.cql"), "library FHIRHelpers").unwrap();
        std::fs::create_dir(helpers.path().join("elm")).unwrap();
        std::fs::write(helpers.path().join("elm").join("FHIRHelpers.json"), "{}").unwrap();

        let units = vec![CompiledUnit::new("Lib", "{\"library\":{}}")];
        let mut sink = Vec::new();
        let entries = ArchiveAssembler::new()
            .assemble(&mut sink, "library Lib", "Lib.cql", &units, Some(helpers.path()))
            .unwrap();

        assert_eq!(entries, 5);
        let mut listed = names(&sink);
        assert_eq!(listed.remove(0), "Lib.cql");
        assert_eq!(listed.remove(0), "Lib.json");
        listed.sort();
        assert_eq!(listed, ["FHIRHelpers.cql", "elm/", "elm/FHIRHelpers.json"]);

        assert_eq!(read_entry(&sink, "Lib.cql"), "library Lib");
        assert_eq!(read_entry(&sink, "elm/FHIRHelpers.json"), "{}");
    }

    #[test]
    fn test_source_only() {
        let mut sink = Vec::new();
        let entries = ArchiveAssembler::new()
            .assemble(&mut sink, "library Lib", "Lib.cql", &[], None)
            .unwrap();
        assert_eq!(entries, 1);
        assert_eq!(names(&sink), ["Lib.cql"]);
    }

    #[test]
    fn test_missing_helper_dir_writes_nothing() {
        let mut sink = Vec::new();
        let err = ArchiveAssembler::new()
            .assemble(&mut sink, "x", "Lib.cql", &[], Some(Path::new("/nonexistent/helpers")))
            .unwrap_err();
        assert!(matches!(err, PackagerError::Io { .. }));
        assert!(sink.is_empty());
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_failure_is_archive_write_error() {
        let err = ArchiveAssembler::new()
            .assemble(FailingSink, "library Lib", "Lib.cql", &[], None)
            .unwrap_err();
        assert!(matches!(err, PackagerError::ArchiveWrite(_)));
    }

    #[test]
    fn test_traversal_unit_name_writes_nothing() {
        let mut sink = Vec::new();
        let err = ArchiveAssembler::new()
            .assemble(
                &mut sink,
                "library Lib",
                "Lib.cql",
                &[CompiledUnit::new("../../etc/evil", "{}")],
                None,
            )
            .unwrap_err();
        assert!(
            matches!(err, PackagerError::InvalidUnitName { ref name, .. } if name == "../../etc/evil"),
            "{err}"
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_duplicate_unit_name_writes_nothing() {
        let units = [CompiledUnit::new("Lib", "{}"), CompiledUnit::new("Lib", "{}")];
        let mut sink = Vec::new();
        let err = ArchiveAssembler::new()
            .assemble(&mut sink, "library Lib", "Lib.cql", &units, None)
            .unwrap_err();
        assert!(matches!(err, PackagerError::InvalidUnitName { reason: "duplicate name", .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_archive_name_uses_forward_slashes() {
        let root = Path::new("/helpers");
        assert_eq!(archive_name(root, &root.join("a").join("b.cql")), "a/b.cql");
    }
}
