//! Gzip tar archives for DRP snapshots
//!
//! Writing is atomic (temp file in the destination directory, then a
//! no-clobber rename).
//! Reading is two-pass: every member is validated against the extraction
//! root before a single byte is written, so a hostile archive leaves the
//! filesystem untouched.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, EntryType};

use crate::errors::DrpError;
use crate::logger::{self, LogTag};

/// A filesystem path and the name it takes inside the archive
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    pub path: PathBuf,
    pub name: String,
}

impl ArchiveSource {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

/// Write `sources` into a gzip tar at `archive_path`
///
/// Directories are added recursively under their archive name. Missing
/// sources are skipped. Returns the archive names that were included.
/// An existing file at `archive_path` is never replaced; that case fails
/// with an `Io` error of kind `AlreadyExists`.
pub fn write_archive(archive_path: &Path, sources: &[ArchiveSource]) -> Result<Vec<String>, DrpError> {
    let dir = archive_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(DrpError::io(dir))?;

    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(DrpError::io(dir))?;
    let encoder = GzEncoder::new(tmp.reopen().map_err(DrpError::io(tmp.path()))?, Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut included = Vec::new();
    for source in sources {
        if !source.path.exists() {
            logger::debug(
                LogTag::Drp,
                &format!("Skipping missing archive source {}", source.path.display()),
            );
            continue;
        }
        let result = if source.path.is_dir() {
            builder.append_dir_all(&source.name, &source.path)
        } else {
            builder.append_path_with_name(&source.path, &source.name)
        };
        result.map_err(DrpError::io(&source.path))?;
        included.push(source.name.clone());
    }

    let encoder = builder.into_inner().map_err(DrpError::io(archive_path))?;
    encoder.finish().map_err(DrpError::io(archive_path))?;
    tmp.persist_noclobber(archive_path)
        .map_err(|e| DrpError::io(archive_path)(e.error))?;

    logger::debug(
        LogTag::Drp,
        &format!(
            "Wrote archive {} ({} sources)",
            archive_path.display(),
            included.len()
        ),
    );
    Ok(included)
}

fn open(archive_path: &Path) -> Result<Archive<GzDecoder<File>>, DrpError> {
    let file = File::open(archive_path).map_err(DrpError::io(archive_path))?;
    Ok(Archive::new(GzDecoder::new(file)))
}

/// Member names in archive order
pub fn list_members(archive_path: &Path) -> Result<Vec<String>, DrpError> {
    let mut archive = open(archive_path)?;
    let mut names = Vec::new();
    for entry in archive.entries().map_err(DrpError::io(archive_path))? {
        let entry = entry.map_err(DrpError::io(archive_path))?;
        let path = entry.path().map_err(DrpError::io(archive_path))?;
        names.push(path.to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Depth of `path` relative to the root after resolving `.` and `..`
///
/// `None` when the path is absolute or climbs above the root at any point.
fn contained_depth(path: &Path, start: usize) -> Option<usize> {
    let mut depth = start;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => depth = depth.checked_sub(1)?,
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(depth)
}

/// Check one member; `link` is the link target for symlinks and hard links
pub fn validate_member(name: &Path, entry_type: EntryType, link: Option<&Path>) -> Result<(), DrpError> {
    let member = name.to_string_lossy().into_owned();
    let invalid = |reason: &str| DrpError::ArchiveInvalid {
        member: member.clone(),
        reason: reason.to_string(),
    };

    if name.is_absolute() || name.has_root() {
        return Err(invalid("has an absolute path"));
    }
    let depth = contained_depth(name, 0).ok_or_else(|| invalid("escapes the extraction root"))?;
    if depth == 0 && !entry_type.is_dir() {
        return Err(invalid("has an empty path"));
    }

    match entry_type {
        EntryType::Regular | EntryType::Directory | EntryType::Continuous => Ok(()),
        EntryType::Symlink => {
            let target = link.ok_or_else(|| invalid("symlink without target"))?;
            // Symlink targets resolve against the member's parent directory
            contained_depth(target, depth.saturating_sub(1))
                .map(|_| ())
                .ok_or_else(|| invalid("links outside the extraction root"))
        }
        EntryType::Link => {
            let target = link.ok_or_else(|| invalid("hard link without target"))?;
            contained_depth(target, 0)
                .map(|_| ())
                .ok_or_else(|| invalid("links outside the extraction root"))
        }
        _ => Err(invalid("has an unsupported entry type")),
    }
}

/// Validate every member without extracting anything
pub fn validate_archive(archive_path: &Path) -> Result<Vec<String>, DrpError> {
    let mut archive = open(archive_path)?;
    let mut names = Vec::new();
    for entry in archive.entries().map_err(DrpError::io(archive_path))? {
        let entry = entry.map_err(DrpError::io(archive_path))?;
        let path = entry.path().map_err(DrpError::io(archive_path))?.into_owned();
        let link = entry
            .link_name()
            .map_err(DrpError::io(archive_path))?
            .map(|l| l.into_owned());
        validate_member(&path, entry.header().entry_type(), link.as_deref())?;
        names.push(path.to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Validate, then extract into `target`
pub fn extract_archive(archive_path: &Path, target: &Path) -> Result<Vec<String>, DrpError> {
    let names = validate_archive(archive_path)?;

    std::fs::create_dir_all(target).map_err(DrpError::io(target))?;
    let mut archive = open(archive_path)?;
    archive.set_overwrite(true);
    for entry in archive.entries().map_err(DrpError::io(archive_path))? {
        let mut entry = entry.map_err(DrpError::io(archive_path))?;
        let unpacked = entry.unpack_in(target).map_err(DrpError::io(target))?;
        if !unpacked {
            let member = entry
                .path()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(DrpError::ArchiveInvalid {
                member,
                reason: "refused during extraction".to_string(),
            });
        }
    }

    logger::debug(
        LogTag::Drp,
        &format!(
            "Extracted {} members from {} into {}",
            names.len(),
            archive_path.display(),
            target.display()
        ),
    );
    Ok(names)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Build an archive with a raw member name, bypassing the builder's path checks
    pub(crate) fn write_raw_member(archive_path: &Path, name: &str, entry_type: EntryType, link: Option<&str>) {
        let file = File::create(archive_path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));

        let data = b"owned";
        let mut header = tar::Header::new_gnu();
        {
            let gnu = header.as_gnu_mut().unwrap();
            gnu.name[..name.len()].copy_from_slice(name.as_bytes());
        }
        header.set_entry_type(entry_type);
        header.set_mode(0o644);
        if let Some(link) = link {
            header.set_link_name(link).unwrap();
            header.set_size(0);
            header.set_cksum();
            builder.append(&header, std::io::empty()).unwrap();
        } else {
            header.set_size(data.len() as u64);
            header.set_cksum();
            builder.append(&header, &data[..]).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn tree_listing(root: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path.clone());
                }
                out.push(path);
            }
        }
        out.sort();
        out
    }

    #[test]
    fn test_roundtrip_is_byte_identical() {
        let src = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("state/nested")).unwrap();
        std::fs::write(src.path().join("state/nonce_cache.json"), br#"{"0xabc":7}"#).unwrap();
        std::fs::write(src.path().join("state/nested/blob.bin"), [0u8, 159, 146, 150, 255]).unwrap();
        std::fs::write(src.path().join("tx_log.json"), "{\"status\":\"sent\"}\n").unwrap();

        let out = TempDir::new().unwrap();
        let archive = out.path().join("a.tar.gz");
        let included = write_archive(
            &archive,
            &[
                ArchiveSource::new(src.path().join("state"), "state"),
                ArchiveSource::new(src.path().join("tx_log.json"), "tx_log.json"),
                ArchiveSource::new(src.path().join("missing"), "missing"),
            ],
        )
        .unwrap();
        assert_eq!(included, vec!["state", "tx_log.json"]);

        let dest = TempDir::new().unwrap();
        extract_archive(&archive, dest.path()).unwrap();
        for rel in ["state/nonce_cache.json", "state/nested/blob.bin", "tx_log.json"] {
            assert_eq!(
                std::fs::read(src.path().join(rel)).unwrap(),
                std::fs::read(dest.path().join(rel)).unwrap(),
                "{} differs",
                rel
            );
        }
    }

    #[test]
    fn test_parent_escape_rejected_and_nothing_written() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.tar.gz");
        write_raw_member(&archive, "../../x.txt", EntryType::Regular, None);

        let target = dir.path().join("restore/deep");
        std::fs::create_dir_all(&target).unwrap();
        let before = tree_listing(dir.path());

        let err = extract_archive(&archive, &target).unwrap_err();
        assert!(matches!(err, DrpError::ArchiveInvalid { ref member, .. } if member == "../../x.txt"));
        assert_eq!(tree_listing(dir.path()), before);
        assert!(!dir.path().join("x.txt").exists());
    }

    #[test]
    fn test_absolute_member_rejected() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("abs.tar.gz");
        write_raw_member(&archive, "/tmp/tradeguard_abs.txt", EntryType::Regular, None);
        assert!(matches!(
            validate_archive(&archive),
            Err(DrpError::ArchiveInvalid { .. })
        ));
    }

    #[test]
    fn test_symlink_pointing_outside_rejected() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("link.tar.gz");
        write_raw_member(&archive, "state/link", EntryType::Symlink, Some("../../etc/passwd"));
        assert!(validate_archive(&archive).is_err());
    }

    #[test]
    fn test_validate_member_rules() {
        let p = Path::new;
        assert!(validate_member(p("a/../b.txt"), EntryType::Regular, None).is_ok());
        assert!(validate_member(p("a/../../b.txt"), EntryType::Regular, None).is_err());
        assert!(validate_member(p("a/b/link"), EntryType::Symlink, Some(p("../c"))).is_ok());
        assert!(validate_member(p("a/link"), EntryType::Symlink, Some(p("../../c"))).is_err());
        assert!(validate_member(p("a/link"), EntryType::Symlink, Some(p("/etc"))).is_err());
        assert!(validate_member(p("dev"), EntryType::Char, None).is_err());
    }
}
