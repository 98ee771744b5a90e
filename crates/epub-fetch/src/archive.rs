//! Rebuild the packaged document with fetched resources swapped in.
//!
//! The output is written to a temporary file next to the destination and
//! renamed into place only once the archive is complete, so a failed run
//! never leaves a truncated file behind.

use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::fetcher::basename;
use crate::types::{ExtractError, ExtractResult, FetchedFileTable};

/// Name of the media-type marker entry.
pub const MIMETYPE_ENTRY: &str = "mimetype";

/// Basenames never copied into the output.
pub const DROPPED_ENTRIES: [&str; 2] = ["encryption.xml", "license.lcpl"];

/// What happened to the source entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Entries in the output, including the mimetype entry.
    pub written: usize,
    /// Entries whose content came from the fetched table.
    pub overridden: usize,
    pub dropped: usize,
}

pub fn is_dropped(name: &str) -> bool {
    DROPPED_ENTRIES.contains(&basename(name))
}

/// Rebuild `source` into `output`.
pub fn rebuild(
    source: &Path,
    overrides: &FetchedFileTable,
    output: &Path,
) -> ExtractResult<RebuildSummary> {
    let mut archive = ZipArchive::new(BufReader::new(File::open(source)?))?;

    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    let tmp = tempfile::NamedTempFile::new_in(&dir)?;

    let mut zip = ZipWriter::new(tmp);
    let summary = rebuild_into(&mut archive, overrides, &mut zip)?;
    let tmp = zip.finish()?;
    match_source_permissions(tmp.as_file(), source)?;

    tmp.persist(output).map_err(|e| ExtractError::Io(e.error))?;
    tracing::info!(
        output = %output.display(),
        written = summary.written,
        overridden = summary.overridden,
        dropped = summary.dropped,
        "archive rebuilt"
    );
    Ok(summary)
}

/// Give the output the source's permission bits, keeping it writable by its
/// owner. Temporary files start out as 0600.
#[cfg(unix)]
fn match_source_permissions(file: &File, source: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(source)?.permissions().mode() & 0o777;
    file.set_permissions(std::fs::Permissions::from_mode(mode | 0o200))
}

#[cfg(not(unix))]
fn match_source_permissions(_file: &File, _source: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Copy every entry of `archive` into `zip`, mimetype first.
pub fn rebuild_into<R, W>(
    archive: &mut ZipArchive<R>,
    overrides: &FetchedFileTable,
    zip: &mut ZipWriter<W>,
) -> ExtractResult<RebuildSummary>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let mut summary = RebuildSummary::default();

    let mimetype = {
        let mut entry = match archive.by_name(MIMETYPE_ENTRY) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(ExtractError::MissingEntry(MIMETYPE_ENTRY.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        bytes
    };
    zip.start_file(
        MIMETYPE_ENTRY,
        SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
    )?;
    zip.write_all(&mimetype)?;
    summary.written += 1;

    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        let name = entry.name().to_string();

        if name == MIMETYPE_ENTRY {
            continue;
        }
        if is_dropped(&name) {
            tracing::debug!(entry = %name, "dropping entry");
            summary.dropped += 1;
            continue;
        }

        match overrides.get(basename(&name)).filter(|_| !entry.is_dir()) {
            Some(payload) => {
                let method = match entry.compression() {
                    CompressionMethod::Stored => CompressionMethod::Stored,
                    _ => CompressionMethod::Deflated,
                };
                let mut options = SimpleFileOptions::default().compression_method(method);
                if let Some(modified) = entry.last_modified() {
                    options = options.last_modified_time(modified);
                }
                if let Some(mode) = entry.unix_mode() {
                    options = options.unix_permissions(mode);
                }
                drop(entry);

                zip.start_file(name.as_str(), options)?;
                zip.write_all(payload.as_bytes())?;
                tracing::debug!(entry = %name, bytes = payload.len(), "replaced entry");
                summary.overridden += 1;
            }
            None => zip.raw_copy_file(entry)?,
        }
        summary.written += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;
    use std::io::Cursor;

    fn source_epub(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("book.epub");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        // Deliberately not first in the source.
        zip.start_file("META-INF/container.xml", deflated).unwrap();
        zip.write_all(b"<container/>").unwrap();
        zip.start_file(
            "mimetype",
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
        )
        .unwrap();
        zip.write_all(b"application/epub+zip").unwrap();
        zip.start_file("META-INF/encryption.xml", deflated).unwrap();
        zip.write_all(b"<encryption/>").unwrap();
        zip.start_file("META-INF/license.lcpl", deflated).unwrap();
        zip.write_all(b"{}").unwrap();
        zip.start_file("EPUB/ch1.xhtml", deflated).unwrap();
        zip.write_all(b"encrypted chapter").unwrap();
        zip.start_file("EPUB/nav.xhtml", deflated).unwrap();
        zip.write_all(b"nav").unwrap();
        zip.start_file(
            "EPUB/images/cover.png",
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
        )
        .unwrap();
        zip.write_all(b"encrypted image").unwrap();
        zip.finish().unwrap();
        path
    }

    fn read_all(path: &Path) -> Vec<(String, CompressionMethod, Vec<u8>)> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut f = archive.by_index(i).unwrap();
                let mut buf = Vec::new();
                f.read_to_end(&mut buf).unwrap();
                (f.name().to_string(), f.compression(), buf)
            })
            .collect()
    }

    #[test]
    fn test_rebuild_without_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_epub(dir.path());
        let out = dir.path().join("book_fetched.epub");

        let summary = rebuild(&src, &FetchedFileTable::new(), &out).unwrap();
        assert_eq!(
            summary,
            RebuildSummary {
                written: 5,
                overridden: 0,
                dropped: 2
            }
        );

        let entries = read_all(&out);
        assert_eq!(entries[0].0, "mimetype");
        assert_eq!(entries[0].1, CompressionMethod::Stored);
        assert_eq!(entries[0].2, b"application/epub+zip");

        // Same entries, bytes and compression as the source, minus the dropped
        // names and with mimetype moved to the front.
        let mut expected: Vec<_> = read_all(&src)
            .into_iter()
            .filter(|e| !is_dropped(&e.0))
            .collect();
        let at = expected.iter().position(|e| e.0 == MIMETYPE_ENTRY).unwrap();
        let mimetype = expected.remove(at);
        expected.insert(0, mimetype);
        assert_eq!(entries, expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_output_takes_source_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let src = source_epub(dir.path());
        std::fs::set_permissions(&src, std::fs::Permissions::from_mode(0o644)).unwrap();
        let out = dir.path().join("out.epub");

        rebuild(&src, &FetchedFileTable::new(), &out).unwrap();
        let mode = std::fs::metadata(&out).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn test_overrides_match_by_basename() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_epub(dir.path());
        let out = dir.path().join("out.epub");

        let mut table = FetchedFileTable::new();
        table.insert("ch1.xhtml", Payload::Text("<html>plain</html>".into()));
        table.insert("cover.png", Payload::Binary(vec![0x89, b'P', b'N', b'G']));
        table.insert("unused.css", Payload::Text("body{}".into()));

        let summary = rebuild(&src, &table, &out).unwrap();
        assert_eq!(summary.overridden, 2);

        let entries = read_all(&out);
        let find = |name: &str| entries.iter().find(|e| e.0 == name).unwrap();
        assert_eq!(find("EPUB/ch1.xhtml").2, b"<html>plain</html>");
        assert_eq!(find("EPUB/ch1.xhtml").1, CompressionMethod::Deflated);
        assert_eq!(find("EPUB/images/cover.png").2, vec![0x89, b'P', b'N', b'G']);
        assert_eq!(find("EPUB/images/cover.png").1, CompressionMethod::Stored);
        assert_eq!(find("EPUB/nav.xhtml").2, b"nav");
        assert!(!entries.iter().any(|e| e.0.ends_with("unused.css")));
    }

    #[test]
    fn test_missing_mimetype() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buf);
            zip.start_file("a.txt", SimpleFileOptions::default()).unwrap();
            zip.write_all(b"a").unwrap();
            zip.finish().unwrap();
        }
        buf.set_position(0);
        let mut archive = ZipArchive::new(buf).unwrap();
        let mut out = ZipWriter::new(Cursor::new(Vec::new()));
        match rebuild_into(&mut archive, &FetchedFileTable::new(), &mut out) {
            Err(ExtractError::MissingEntry(name)) => assert_eq!(name, MIMETYPE_ENTRY),
            other => panic!("expected missing mimetype, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_rebuild_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("not-a-zip.epub");
        std::fs::write(&src, b"plain text").unwrap();
        let out = dir.path().join("out.epub");

        assert!(rebuild(&src, &FetchedFileTable::new(), &out).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_is_dropped() {
        assert!(is_dropped("META-INF/encryption.xml"));
        assert!(is_dropped("license.lcpl"));
        assert!(!is_dropped("META-INF/container.xml"));
    }
}
