//! Strip host-injected content from fetched markup documents.
//!
//! Works on the XML event stream so the document stays well-formed XHTML:
//! everything outside `<head>` is written back byte for byte, except the root
//! element's vendor attributes.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::config::ExtractConfig;
use crate::types::{ExtractError, ExtractResult};

/// Extension of fetched documents that get sanitized.
pub const MARKUP_EXTENSION: &str = ".xhtml";

pub fn is_markup(basename: &str) -> bool {
    basename.ends_with(MARKUP_EXTENSION)
}

/// What counts as host-injected content.
#[derive(Debug, Clone)]
pub struct SanitizeRules {
    pub stylesheet_markers: Vec<String>,
    pub attribute_marker: String,
}

impl From<&ExtractConfig> for SanitizeRules {
    fn from(cfg: &ExtractConfig) -> Self {
        Self {
            stylesheet_markers: cfg.stylesheet_markers.clone(),
            attribute_marker: cfg.attribute_marker.clone(),
        }
    }
}

impl Default for SanitizeRules {
    fn default() -> Self {
        SanitizeRules::from(&ExtractConfig::default())
    }
}

/// A direct child of `<head>` with all of its events.
struct HeadChild<'a> {
    name: Vec<u8>,
    start: BytesStart<'a>,
    events: Vec<Event<'a>>,
}

impl HeadChild<'_> {
    fn attr(&self, key: &[u8]) -> Option<String> {
        self.start
            .attributes()
            .flatten()
            .find(|a| a.key.local_name().as_ref() == key)
            .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
    }

    fn is_stylesheet(&self) -> bool {
        self.attr(b"rel").is_some_and(|rel| {
            rel.split_ascii_whitespace()
                .any(|t| t.eq_ignore_ascii_case("stylesheet"))
        })
    }
}

/// Rebuild `<head>` and scrub the root element of `markup`.
///
/// The new head holds the first title, the stylesheet links whose `href`
/// carries none of the vendor markers, then every meta element. Other head
/// children are dropped.
pub fn sanitize(markup: &str, rules: &SanitizeRules) -> ExtractResult<String> {
    let mut reader = Reader::from_str(markup);
    let mut writer = Writer::new(Vec::with_capacity(markup.len()));

    let mut root_seen = false;
    let mut head: Option<(Vec<u8>, Vec<HeadChild<'_>>)> = None;
    let mut current: Option<HeadChild<'_>> = None;
    let mut nesting = 0usize;

    loop {
        let event = reader.read_event()?;
        if matches!(event, Event::Eof) {
            break;
        }

        if let Some((head_name, children)) = head.as_mut() {
            if let Some(child) = current.as_mut() {
                match &event {
                    Event::Start(_) => nesting += 1,
                    Event::End(_) => nesting -= 1,
                    _ => {}
                }
                child.events.push(event);
                if nesting == 0 {
                    children.extend(current.take());
                }
                continue;
            }

            match event {
                Event::Start(e) => {
                    nesting = 1;
                    current = Some(HeadChild {
                        name: e.local_name().as_ref().to_vec(),
                        start: e.clone(),
                        events: vec![Event::Start(e)],
                    });
                }
                Event::Empty(e) => children.push(HeadChild {
                    name: e.local_name().as_ref().to_vec(),
                    start: e.clone(),
                    events: vec![Event::Empty(e)],
                }),
                Event::End(_) => {
                    let head_name = std::mem::take(head_name);
                    let children = std::mem::take(children);
                    head = None;
                    write_head(&mut writer, &head_name, children, rules)?;
                }
                // Whitespace, comments and the like between head children.
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) if !root_seen => {
                root_seen = true;
                writer.write_event(Event::Start(scrub_root(&e, &rules.attribute_marker)?))?;
            }
            Event::Empty(e) if !root_seen => {
                root_seen = true;
                writer.write_event(Event::Empty(scrub_root(&e, &rules.attribute_marker)?))?;
            }
            Event::Start(e) if e.local_name().as_ref() == b"head" => {
                head = Some((e.name().as_ref().to_vec(), Vec::new()));
            }
            other => writer.write_event(other)?,
        }
    }

    if head.is_some() {
        return Err(ExtractError::Markup("unterminated head element".to_string()));
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| ExtractError::Markup(format!("sanitized output is not UTF-8: {e}")))
}

fn write_head(
    writer: &mut Writer<Vec<u8>>,
    head_name: &[u8],
    children: Vec<HeadChild<'_>>,
    rules: &SanitizeRules,
) -> ExtractResult<()> {
    let mut title = None;
    let mut links = Vec::new();
    let mut metas = Vec::new();

    for child in children {
        let name = child.name.clone();
        match name.as_slice() {
            b"title" if title.is_none() => title = Some(child),
            b"link" if child.is_stylesheet() => {
                let href = child.attr(b"href").unwrap_or_default();
                if rules.stylesheet_markers.iter().any(|m| href.contains(m.as_str())) {
                    tracing::debug!(href = %href, "dropping host stylesheet");
                } else {
                    links.push(child);
                }
            }
            b"meta" => metas.push(child),
            _ => {}
        }
    }

    let name = String::from_utf8_lossy(head_name).into_owned();
    writer.write_event(Event::Start(BytesStart::new(name.as_str())))?;
    for child in title.into_iter().chain(links).chain(metas) {
        writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
        for event in child.events {
            writer.write_event(event)?;
        }
    }
    writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
    Ok(())
}

/// Copy of the root start tag without attributes whose name contains `marker`.
fn scrub_root(e: &BytesStart<'_>, marker: &str) -> ExtractResult<BytesStart<'static>> {
    let marker = marker.to_ascii_lowercase();
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut scrubbed = BytesStart::new(name);

    for attr in e.attributes() {
        let attr = attr.map_err(|err| ExtractError::Markup(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        if !marker.is_empty() && key.contains(&marker) {
            continue;
        }
        scrubbed.push_attribute(attr);
    }
    Ok(scrubbed)
}
