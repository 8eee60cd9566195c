//! Extraction of `.tgz` chart archives
//!
//! Archives are untrusted input: every entry path is normalized and checked
//! so nothing can be written outside the destination directory.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::error::{CoreError, Result};

/// Extract a gzip-compressed tar stream into `dest`
///
/// With `flatten`, every file lands directly under `dest` under its final
/// file name and directory entries are ignored. Existing files are
/// overwritten. On failure `dest` may be partially populated; removing it is
/// the caller's job.
pub fn extract<R: Read>(source: R, dest: &Path, flatten: bool) -> Result<()> {
    let io_err = |source: std::io::Error| CoreError::ExtractionFailed {
        dest: dest.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dest).map_err(io_err)?;

    let mut archive = Archive::new(GzDecoder::new(source));
    for entry in archive.entries().map_err(io_err)? {
        let mut entry = entry.map_err(io_err)?;
        let raw_path = entry.path().map_err(io_err)?.into_owned();
        let Some(relative) = sanitize(&raw_path)? else {
            continue;
        };

        match entry.header().entry_type() {
            EntryType::Directory => {
                if flatten {
                    continue;
                }
                let target = dest.join(&relative);
                if !target.is_dir() {
                    std::fs::create_dir_all(&target).map_err(io_err)?;
                }
            }
            EntryType::Regular | EntryType::Continuous => {
                let target = if flatten {
                    match relative.file_name() {
                        Some(name) => dest.join(name),
                        None => continue,
                    }
                } else {
                    let target = dest.join(&relative);
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent).map_err(io_err)?;
                    }
                    target
                };

                let mut file = File::create(&target).map_err(io_err)?;
                std::io::copy(&mut entry, &mut file).map_err(io_err)?;
            }
            other => {
                tracing::debug!(
                    entry = %raw_path.display(),
                    "skipping unsupported archive entry type {:?}",
                    other
                );
            }
        }
    }

    Ok(())
}

/// Extract an archive file from disk
pub fn extract_file(archive: &Path, dest: &Path, flatten: bool) -> Result<()> {
    let file = File::open(archive).map_err(|source| CoreError::ExtractionFailed {
        dest: dest.to_path_buf(),
        source,
    })?;
    extract(std::io::BufReader::new(file), dest, flatten)
}

/// Normalize an entry path to a relative path inside the destination
///
/// Returns `None` for entries that name the archive root itself (`./`).
fn sanitize(path: &Path) -> Result<Option<PathBuf>> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(CoreError::UnsafeEntryPath {
                    entry: path.display().to_string(),
                });
            }
        }
    }

    if clean.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(clean))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tar::{Builder, Header};
    use tempfile::TempDir;

    /// Entry for building test archives: `(path, Some(content))` for files,
    /// `(path, None)` for directories
    pub(crate) fn build_archive(entries: &[(&str, Option<&str>)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);

        for (path, content) in entries {
            let mut header = Header::new_gnu();
            match content {
                Some(content) => {
                    header.set_entry_type(EntryType::Regular);
                    header.set_size(content.len() as u64);
                    header.set_mode(0o644);
                    header.set_mtime(0);
                    header.set_cksum();
                    builder
                        .append_data(&mut header, path, content.as_bytes())
                        .unwrap();
                }
                None => {
                    header.set_entry_type(EntryType::Directory);
                    header.set_size(0);
                    header.set_mode(0o755);
                    header.set_mtime(0);
                    header.set_cksum();
                    builder
                        .append_data(&mut header, path, std::io::empty())
                        .unwrap();
                }
            }
        }

        builder.into_inner().unwrap().finish().unwrap()
    }

    /// Build an archive with a raw entry name, bypassing tar's own path checks
    fn build_raw_archive(name: &str, content: &str) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);

        let mut header = Header::new_old();
        header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_entry_type(EntryType::Regular);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, content.as_bytes()).unwrap();

        builder.into_inner().unwrap().finish().unwrap()
    }

    fn list_files(dir: &Path) -> Vec<String> {
        let mut files: Vec<String> = walkdir::WalkDir::new(dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| {
                e.path()
                    .strip_prefix(dir)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_extract_preserves_structure() {
        let temp = TempDir::new().unwrap();
        let data = build_archive(&[
            ("nginx/", None),
            ("nginx/Chart.yaml", Some("name: nginx\n")),
            ("nginx/templates/deployment.yaml", Some("kind: Deployment\n")),
        ]);

        extract(data.as_slice(), temp.path(), false).unwrap();

        assert_eq!(
            list_files(temp.path()),
            vec![
                "nginx",
                "nginx/Chart.yaml",
                "nginx/templates",
                "nginx/templates/deployment.yaml"
            ]
        );
        assert_eq!(
            std::fs::read_to_string(temp.path().join("nginx/Chart.yaml")).unwrap(),
            "name: nginx\n"
        );
    }

    #[test]
    fn test_extract_flatten() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out");
        let data = build_archive(&[
            ("a/", None),
            ("a/b/", None),
            ("a/b/c.txt", Some("c")),
            ("a/d.txt", Some("d")),
        ]);

        extract(data.as_slice(), &dest, true).unwrap();

        assert_eq!(list_files(&dest), vec!["c.txt", "d.txt"]);
        assert!(!dest.join("a").exists());
    }

    #[test]
    fn test_file_before_parent_directory() {
        let temp = TempDir::new().unwrap();
        let data = build_archive(&[("chart/templates/svc.yaml", Some("kind: Service\n"))]);

        extract(data.as_slice(), temp.path(), false).unwrap();

        assert!(temp.path().join("chart/templates/svc.yaml").is_file());
    }

    #[test]
    fn test_existing_files_are_overwritten() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("chart")).unwrap();
        std::fs::write(temp.path().join("chart/values.yaml"), "old: true\n").unwrap();

        let data = build_archive(&[("chart/values.yaml", Some("new: true\n"))]);
        extract(data.as_slice(), temp.path(), false).unwrap();

        assert_eq!(
            std::fs::read_to_string(temp.path().join("chart/values.yaml")).unwrap(),
            "new: true\n"
        );
    }

    #[test]
    fn test_parent_traversal_rejected() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("dest");
        let data = build_raw_archive("../escape.txt", "gotcha");

        let err = extract(data.as_slice(), &dest, false).unwrap_err();

        assert!(matches!(err, CoreError::UnsafeEntryPath { .. }));
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn test_failing_stream_reports_extraction_failure() {
        struct FailAfter {
            data: Vec<u8>,
            pos: usize,
            limit: usize,
        }

        impl Read for FailAfter {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.pos >= self.limit {
                    return Err(std::io::Error::other("disk on fire"));
                }
                let end = (self.pos + buf.len()).min(self.limit).min(self.data.len());
                let n = end - self.pos;
                buf[..n].copy_from_slice(&self.data[self.pos..end]);
                self.pos = end;
                Ok(n)
            }
        }

        let temp = TempDir::new().unwrap();
        let big = "x".repeat(256 * 1024);
        let data = build_archive(&[("chart/a.txt", Some("a")), ("chart/big.txt", Some(&big))]);
        let limit = data.len() / 2;

        let err = extract(FailAfter { data, pos: 0, limit }, temp.path(), false).unwrap_err();
        assert_eq!(err.code(), "EXTRACTION_FAILED");
    }

    #[test]
    fn test_extract_file_missing_archive() {
        let temp = TempDir::new().unwrap();
        let err = extract_file(&temp.path().join("missing.tgz"), temp.path(), false).unwrap_err();
        assert!(matches!(err, CoreError::ExtractionFailed { .. }));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(
            sanitize(Path::new("./chart/Chart.yaml")).unwrap(),
            Some(PathBuf::from("chart/Chart.yaml"))
        );
        assert_eq!(sanitize(Path::new("./")).unwrap(), None);
        assert!(sanitize(Path::new("/etc/passwd")).is_err());
        assert!(sanitize(Path::new("chart/../../x")).is_err());
    }
}
