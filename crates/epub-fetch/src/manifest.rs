//! Read the package manifest out of the source archive.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use crate::types::{ExtractError, ExtractResult, ManifestEntry, Package};

/// Fixed location of the container descriptor.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Open `archive` and read its package manifest.
pub fn read(archive: &Path) -> ExtractResult<Package> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(BufReader::new(file))?;
    read_package(&mut zip)
}

/// Read the package manifest from an already opened archive.
pub fn read_package<R: Read + Seek>(zip: &mut ZipArchive<R>) -> ExtractResult<Package> {
    let container = read_entry_text(zip, CONTAINER_PATH)?;
    let opf_path = parse_container(&container)?;
    let opf = read_entry_text(zip, &opf_path)?;
    let entries = parse_manifest(&opf, &opf_path)?;

    tracing::info!(opf = %opf_path, entries = entries.len(), "manifest read");
    Ok(Package { opf_path, entries })
}

fn read_entry_text<R: Read + Seek>(zip: &mut ZipArchive<R>, name: &str) -> ExtractResult<String> {
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(ExtractError::MissingEntry(name.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> ExtractResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ExtractError::Xml(e.to_string()))?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Path of the package document named by the first `rootfile` element.
pub fn parse_container(xml: &str) -> ExtractResult<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                return attribute(&e, b"full-path")?
                    .filter(|p| !p.is_empty())
                    .ok_or(ExtractError::MissingRootfile);
            }
            Event::Eof => return Err(ExtractError::MissingRootfile),
            _ => {}
        }
    }
}

/// `(media-type, href)` of every manifest item, in document order.
pub fn parse_manifest(xml: &str, opf_path: &str) -> ExtractResult<Vec<ManifestEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_manifest = false;
    let mut seen_manifest = false;
    let mut entries = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"manifest" => {
                in_manifest = true;
                seen_manifest = true;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"manifest" => {
                seen_manifest = true;
            }
            Event::End(e) if e.local_name().as_ref() == b"manifest" => {
                in_manifest = false;
            }
            Event::Start(e) | Event::Empty(e)
                if in_manifest && e.local_name().as_ref() == b"item" =>
            {
                match (attribute(&e, b"media-type")?, attribute(&e, b"href")?) {
                    (Some(media_type), Some(href)) => {
                        entries.push(ManifestEntry { media_type, href })
                    }
                    _ => tracing::warn!("manifest item without media-type or href skipped"),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_manifest {
        return Err(ExtractError::MissingManifest(opf_path.to_string()));
    }
    Ok(entries)
}
