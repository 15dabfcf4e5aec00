//! XML download manifests
//!
//! Both manifest dialects are a document element holding `<File>` records.
//! Only the first occurrence of each direct child of a `<File>` is used;
//! unknown children are ignored and whitespace-only text counts as absent.
//!
//! Splashscreen dialect:
//!
//! ```xml
//! <root>
//!   <File>
//!     <Description>Main Splash</Description>
//!     <FileName>splash\main.jpg</FileName>
//!     <DownloadUrl>https://cdn.example/splash/main.jpg</DownloadUrl>
//!   </File>
//! </root>
//! ```
//!
//! Patching dialect:
//!
//! ```xml
//! <root>
//!   <File>
//!     <From>textures/foo.dat</From>
//!     <To>client/textures/foo.dat</To>
//!     <Size>1048576</Size>
//!     <MD5>d41d8cd98f00b204e9800998ecf8427e</MD5>
//!   </File>
//! </root>
//! ```

use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use serde::Serialize;
use tracing::debug;

use crate::error::{PatchError, Result};

const FILE_ELEMENT: &str = "File";

/// One file a manifest asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadItem {
    /// Absolute URL (splashscreens) or a fragment relative to the base
    /// download URL (patching)
    pub source_url: String,
    /// Installation-relative destination, always `/`-separated
    pub destination_rel_path: String,
    /// Size announced by the manifest
    pub expected_size: Option<u64>,
    /// Lowercase hex MD5 of the file body
    pub md5_hex: Option<String>,
    /// Human readable label
    pub description: Option<String>,
}

impl DownloadItem {
    /// Name used in logs, errors and progress events
    pub fn display_name(&self) -> &str {
        if self.destination_rel_path.is_empty() {
            &self.source_url
        } else {
            &self.destination_rel_path
        }
    }
}

/// Parse a splashscreen manifest. Records without a `<DownloadUrl>` are
/// dropped.
pub fn parse_splashscreen_manifest(xml: &[u8]) -> Result<Vec<DownloadItem>> {
    let records = read_file_records(xml)?;
    let total = records.len();

    let items: Vec<DownloadItem> = records
        .iter()
        .filter_map(|record| {
            let url = record.get("DownloadUrl")?;
            Some(DownloadItem {
                source_url: url.to_string(),
                destination_rel_path: record.get("FileName").map(normalize).unwrap_or_default(),
                expected_size: None,
                md5_hex: None,
                description: record.get("Description").map(str::to_string),
            })
        })
        .collect();

    debug!("splashscreen manifest: {} of {} records usable", items.len(), total);
    Ok(items)
}

/// Parse a patching manifest. Records missing `<From>` or `<To>` are dropped;
/// an unparsable `<Size>` is treated as unknown.
pub fn parse_patching_manifest(xml: &[u8]) -> Result<Vec<DownloadItem>> {
    let records = read_file_records(xml)?;
    let total = records.len();

    let items: Vec<DownloadItem> = records
        .iter()
        .filter_map(|record| {
            let from = record.get("From")?;
            let to = record.get("To")?;
            Some(DownloadItem {
                source_url: normalize(from),
                destination_rel_path: normalize(to),
                expected_size: record.get("Size").and_then(|s| s.parse().ok()),
                md5_hex: record.get("MD5").map(str::to_ascii_lowercase),
                description: None,
            })
        })
        .collect();

    debug!("patching manifest: {} of {} records usable", items.len(), total);
    Ok(items)
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Direct children of one `<File>` element, in document order
#[derive(Debug, Default)]
struct FileRecord {
    fields: Vec<(String, String)>,
}

impl FileRecord {
    fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, text)| text.trim())
            .filter(|text| !text.is_empty())
    }
}

/// Element whose text is being collected
struct OpenField {
    name: String,
    depth: usize,
    text: String,
}

fn bad_manifest(reader: &Reader<&[u8]>, what: impl std::fmt::Display) -> PatchError {
    PatchError::BadManifest(format!("{what} (at byte {})", reader.buffer_position()))
}

fn read_file_records(xml: &[u8]) -> Result<Vec<FileRecord>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().expand_empty_elements = true;

    let mut buf = Vec::new();
    let mut records = Vec::new();
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut file: Option<(usize, FileRecord)> = None;
    let mut field: Option<OpenField> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| bad_manifest(&reader, e))?;

        match event {
            Event::Start(start) => {
                if depth == 0 && saw_root {
                    return Err(bad_manifest(&reader, "more than one document element"));
                }
                depth += 1;
                saw_root = true;
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();

                let child_of_file = file
                    .as_ref()
                    .is_some_and(|(file_depth, _)| depth == file_depth + 1);

                if file.is_none() && name == FILE_ELEMENT {
                    file = Some((depth, FileRecord::default()));
                } else if child_of_file && field.is_none() {
                    field = Some(OpenField {
                        name,
                        depth,
                        text: String::new(),
                    });
                }
            }
            Event::End(_) => {
                if field.as_ref().is_some_and(|f| f.depth == depth)
                    && let (Some(done), Some((_, record))) = (field.take(), file.as_mut())
                {
                    record.fields.push((done.name, done.text));
                }
                if file.as_ref().is_some_and(|(file_depth, _)| *file_depth == depth)
                    && let Some((_, record)) = file.take()
                {
                    records.push(record);
                }
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| bad_manifest(&reader, "unmatched closing tag"))?;
            }
            Event::Text(text) => {
                if let Some(open) = field.as_mut() {
                    let text = text.decode().map_err(|e| bad_manifest(&reader, e))?;
                    open.text.push_str(&text);
                }
            }
            Event::CData(cdata) => {
                if let Some(open) = field.as_mut() {
                    let text = cdata.decode().map_err(|e| bad_manifest(&reader, e))?;
                    open.text.push_str(&text);
                }
            }
            Event::GeneralRef(entity) => {
                if let Some(open) = field.as_mut() {
                    if let Some(ch) = entity
                        .resolve_char_ref()
                        .map_err(|e| bad_manifest(&reader, e))?
                    {
                        open.text.push(ch);
                    } else {
                        let name = entity.decode().map_err(|e| bad_manifest(&reader, e))?;
                        let resolved = resolve_predefined_entity(&name).ok_or_else(|| {
                            bad_manifest(&reader, format!("unknown entity &{name};"))
                        })?;
                        open.text.push_str(resolved);
                    }
                }
            }
            Event::Eof => {
                if depth != 0 {
                    return Err(bad_manifest(&reader, "unexpected end of document"));
                }
                if !saw_root {
                    return Err(bad_manifest(&reader, "no document element"));
                }
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SPLASH: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<SplashScreens>
  <File>
    <Description>Main Splash</Description>
    <FileName>splash\main.jpg</FileName>
    <DownloadUrl>https://cdn.example/splash/main.jpg</DownloadUrl>
  </File>
  <File>
    <Description>Second</Description>
    <FileName>splash\second.jpg</FileName>
    <DownloadUrl/>
  </File>
</SplashScreens>"#;

    const PATCHING: &str = r"<root>
  <File>
    <From>textures/foo.dat</From>
    <To>client\textures\foo.dat</To>
    <Size>1048576</Size>
    <MD5>D41D8CD98F00B204E9800998ECF8427E</MD5>
  </File>
  <File>
    <From>bar.dat</From>
    <To>   </To>
  </File>
  <File>
    <From>baz.dat</From>
    <To>baz.dat</To>
    <Size>lots</Size>
    <Extra><Nested>ignored</Nested></Extra>
  </File>
</root>";

    #[test]
    fn splash_skips_empty_urls() {
        let items = parse_splashscreen_manifest(SPLASH.as_bytes()).unwrap();
        assert_eq!(
            items,
            vec![DownloadItem {
                source_url: "https://cdn.example/splash/main.jpg".to_string(),
                destination_rel_path: "splash/main.jpg".to_string(),
                expected_size: None,
                md5_hex: None,
                description: Some("Main Splash".to_string()),
            }]
        );
    }

    #[test]
    fn patching_items() {
        let items = parse_patching_manifest(PATCHING.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].source_url, "textures/foo.dat");
        assert_eq!(items[0].destination_rel_path, "client/textures/foo.dat");
        assert_eq!(items[0].expected_size, Some(1_048_576));
        assert_eq!(
            items[0].md5_hex.as_deref(),
            Some("d41d8cd98f00b204e9800998ecf8427e")
        );

        assert_eq!(items[1].destination_rel_path, "baz.dat");
        assert_eq!(items[1].expected_size, None);
        assert_eq!(items[1].md5_hex, None);
    }

    #[test]
    fn parsing_is_idempotent() {
        let first = parse_patching_manifest(PATCHING.as_bytes()).unwrap();
        let second = parse_patching_manifest(PATCHING.as_bytes()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn destinations_never_contain_backslashes() {
        let xml = r"<r>
  <File><From>a\b\c.dat</From><To>x\y\z.dat</To></File>
  <File><From>\\lead</From><To>\\lead\\double</To></File>
</r>";
        let items = parse_patching_manifest(xml.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        for item in &items {
            assert!(!item.destination_rel_path.contains('\\'));
            assert!(!item.source_url.contains('\\'));
        }
    }

    #[test]
    fn entities_and_cdata_are_decoded() {
        let xml = r"<r><File>
  <FileName>a&amp;b.jpg</FileName>
  <DownloadUrl><![CDATA[https://cdn.example/x?a=1&b=2]]></DownloadUrl>
  <Description>caf&#233;</Description>
</File></r>";
        let items = parse_splashscreen_manifest(xml.as_bytes()).unwrap();
        assert_eq!(items[0].destination_rel_path, "a&b.jpg");
        assert_eq!(items[0].source_url, "https://cdn.example/x?a=1&b=2");
        assert_eq!(items[0].description.as_deref(), Some("café"));
    }

    #[test]
    fn first_occurrence_wins_and_nested_files_are_found() {
        let xml = r"<r><Group><File>
  <From>one.dat</From><From>two.dat</From><To>one.dat</To>
</File></Group></r>";
        let items = parse_patching_manifest(xml.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source_url, "one.dat");
    }

    #[test]
    fn empty_manifest_is_not_an_error() {
        assert!(parse_splashscreen_manifest(b"<root/>").unwrap().is_empty());
        assert!(parse_patching_manifest(b"<root></root>").unwrap().is_empty());
    }

    #[test]
    fn malformed_xml_is_rejected() {
        for bad in [
            "",
            "not xml at all",
            "<root><File><From>a</To></File></root>",
            "<root><File><From>a</From>",
            "<root><File><To>&bogus;</To></File></root>",
        ] {
            assert!(
                matches!(
                    parse_patching_manifest(bad.as_bytes()),
                    Err(PatchError::BadManifest(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn second_document_element_is_rejected() {
        for bad in [
            "<root/><root/>",
            "<root><File><From>a</From></File></root><File><From>b</From></File>",
        ] {
            let err = parse_patching_manifest(bad.as_bytes()).unwrap_err();
            assert!(
                err.to_string().contains("more than one document element"),
                "{bad:?}: {err}"
            );
        }
    }
}
