//! XLSX text layer: read and rewrite cell text without touching anything else.
//!
//! An XLSX file is a ZIP archive of XML parts. All cell text lives in two
//! places: the shared-strings table (`xl/sharedStrings.xml`, `<si><t>` runs)
//! and inline strings inside worksheets (`xl/worksheets/*.xml`, `<is><t>`
//! runs). Everything else — styles, formulas, merged-cell maps, drawings —
//! is opaque to the post-processor and must round-trip byte-for-byte, or
//! Excel will "repair" the file and drop formatting.
//!
//! A full XML parse buys nothing here: only `<t>` element *content* changes,
//! never structure, so a targeted scanner over the raw markup is both safer
//! (no re-serialisation drift) and simpler. Entities are unescaped before the
//! caller sees the text and re-escaped afterwards.

use crate::error::ConvertError;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// An XLSX archive held as an ordered list of named parts.
///
/// Entry order is preserved on write; Excel tolerates reordering, but
/// keeping the original order makes before/after archives diffable.
pub struct Workbook {
    entries: Vec<Entry>,
}

struct Entry {
    name: String,
    bytes: Vec<u8>,
}

impl Workbook {
    /// Parse the archive. Fails if the bytes are not a readable ZIP or the
    /// mandatory workbook part is missing.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConvertError> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(|e| ConvertError::BadWorkbook {
                detail: format!("not a zip archive: {e}"),
            })?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(|e| ConvertError::BadWorkbook {
                detail: format!("entry {i}: {e}"),
            })?;
            if file.is_dir() {
                continue;
            }
            let mut bytes = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut bytes)
                .map_err(|e| ConvertError::BadWorkbook {
                    detail: format!("entry {}: {e}", file.name()),
                })?;
            entries.push(Entry {
                name: file.name().to_string(),
                bytes,
            });
        }

        let wb = Self { entries };
        if !wb.entries.iter().any(|e| e.name == "xl/workbook.xml") {
            return Err(ConvertError::BadWorkbook {
                detail: "xl/workbook.xml missing".into(),
            });
        }
        Ok(wb)
    }

    /// Serialise back to an XLSX byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConvertError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in &self.entries {
            writer
                .start_file(entry.name.as_str(), options)
                .map_err(|e| ConvertError::BadWorkbook {
                    detail: format!("writing {}: {e}", entry.name),
                })?;
            writer
                .write_all(&entry.bytes)
                .map_err(|e| ConvertError::BadWorkbook {
                    detail: format!("writing {}: {e}", entry.name),
                })?;
        }

        writer
            .finish()
            .map(|cursor| cursor.into_inner())
            .map_err(|e| ConvertError::BadWorkbook {
                detail: format!("finalising archive: {e}"),
            })
    }

    /// All text nodes in document order: shared strings first, then inline
    /// strings per worksheet. Entities are unescaped.
    pub fn texts(&self) -> Vec<String> {
        let mut out = Vec::new();
        for entry in &self.entries {
            if !is_text_part(&entry.name) {
                continue;
            }
            if let Ok(xml) = std::str::from_utf8(&entry.bytes) {
                collect_t_nodes(xml, &mut out);
            }
        }
        out
    }

    /// Rewrite every text node with `f`. Returns the number of nodes whose
    /// content actually changed.
    pub fn map_texts<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&str) -> String,
    {
        self.splice_texts(|_, text| Some(f(text)))
    }

    /// Replace text nodes positionally: node `i` becomes `new[i]` when that
    /// slot is `Some`. Slots beyond `new.len()` are left untouched. Returns
    /// the number of changed nodes.
    ///
    /// The index space matches [`Workbook::texts`] exactly, which is what
    /// lets the enhancement pass splice a batched LLM response back by
    /// position.
    pub fn apply_texts(&mut self, new: &[Option<String>]) -> usize {
        self.splice_texts(|idx, _| new.get(idx).cloned().flatten())
    }

    fn splice_texts<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(usize, &str) -> Option<String>,
    {
        let mut changed = 0usize;
        let mut idx = 0usize;
        for entry in &mut self.entries {
            if !is_text_part(&entry.name) {
                continue;
            }
            let Ok(xml) = std::str::from_utf8(&entry.bytes) else {
                continue;
            };
            let (rewritten, part_changed) = rewrite_t_nodes(xml, &mut idx, &mut f);
            if part_changed > 0 {
                entry.bytes = rewritten.into_bytes();
                changed += part_changed;
            }
        }
        changed
    }
}

fn is_text_part(name: &str) -> bool {
    name == "xl/sharedStrings.xml"
        || (name.starts_with("xl/worksheets/") && name.ends_with(".xml"))
}

// ── <t> scanner ─────────────────────────────────────────────────────────────
//
// Worksheet parts contain `<t>` only inside `<is>` inline strings; the
// shared-strings part contains it inside `<si>`/`<r>` runs. In both cases
// the element body is character data, so scanning for the literal tags is
// exact. Self-closing `<t/>` carries no text and is skipped.

fn collect_t_nodes(xml: &str, out: &mut Vec<String>) {
    for_each_t_node(xml, |content| {
        out.push(unescape_xml(content));
        None
    });
}

fn rewrite_t_nodes<F>(xml: &str, idx: &mut usize, f: &mut F) -> (String, usize)
where
    F: FnMut(usize, &str) -> Option<String>,
{
    let mut changed = 0usize;
    let rewritten = for_each_t_node(xml, |content| {
        let text = unescape_xml(content);
        let i = *idx;
        *idx += 1;
        match f(i, &text) {
            Some(new_text) if new_text != text => {
                changed += 1;
                Some(escape_xml(&new_text))
            }
            _ => None,
        }
    });
    (rewritten, changed)
}

/// Walk `<t …>…</t>` spans; the visitor returns `Some(replacement)` (already
/// escaped) to substitute the body, `None` to keep it. Returns the document
/// with substitutions applied.
fn for_each_t_node<F>(xml: &str, mut visit: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;

    while let Some(open_pos) = find_t_open(rest) {
        let (before, from_tag) = rest.split_at(open_pos);
        out.push_str(before);

        let Some(tag_end) = from_tag.find('>') else {
            // Malformed tail; emit as-is.
            out.push_str(from_tag);
            return out;
        };
        let tag = &from_tag[..=tag_end];
        out.push_str(tag);

        if tag.ends_with("/>") {
            rest = &from_tag[tag_end + 1..];
            continue;
        }

        let body_and_rest = &from_tag[tag_end + 1..];
        let Some(close_pos) = body_and_rest.find("</t>") else {
            out.push_str(body_and_rest);
            return out;
        };
        let body = &body_and_rest[..close_pos];
        match visit(body) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(body),
        }
        out.push_str("</t>");
        rest = &body_and_rest[close_pos + 4..];
    }

    out.push_str(rest);
    out
}

/// Find the next `<t>` / `<t ` / `<t/` opening, skipping tags that merely
/// start with `t` (`<table…>` and friends).
fn find_t_open(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut from = 0;
    while let Some(rel) = s[from..].find("<t") {
        let pos = from + rel;
        match bytes.get(pos + 2) {
            Some(b'>') | Some(b' ') | Some(b'/') => return Some(pos),
            _ => from = pos + 2,
        }
    }
    None
}

fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHARED_STRINGS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3"><si><t>Свідоцтво</t></si><si><t xml:space="preserve"> ІНН &amp; КПП </t></si><si><t/></si></sst>"#;

    const SHEET1: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>на 2024 року</t></is></c><c r="C1"><v>42</v></c></row></sheetData></worksheet>"#;

    const STYLES: &str = r#"<?xml version="1.0"?><styleSheet><fonts count="1"><font/></fonts></styleSheet>"#;

    fn sample_xlsx() -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, body) in [
            ("[Content_Types].xml", "<Types/>"),
            ("xl/workbook.xml", "<workbook/>"),
            ("xl/styles.xml", STYLES),
            ("xl/sharedStrings.xml", SHARED_STRINGS),
            ("xl/worksheets/sheet1.xml", SHEET1),
        ] {
            writer.start_file(name, options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn texts_are_collected_in_document_order() {
        let wb = Workbook::from_bytes(&sample_xlsx()).unwrap();
        let texts = wb.texts();
        assert_eq!(
            texts,
            vec![
                "Свідоцтво".to_string(),
                " ІНН & КПП ".to_string(),
                "на 2024 року".to_string(),
            ]
        );
    }

    #[test]
    fn map_texts_rewrites_and_counts() {
        let mut wb = Workbook::from_bytes(&sample_xlsx()).unwrap();
        let changed = wb.map_texts(|t| t.replace("Свідоцтво", "Свидетельство"));
        assert_eq!(changed, 1);
        assert_eq!(wb.texts()[0], "Свидетельство");
    }

    #[test]
    fn apply_texts_splices_by_position() {
        let mut wb = Workbook::from_bytes(&sample_xlsx()).unwrap();
        let changed = wb.apply_texts(&[
            None,
            Some(" ИНН & КПП ".to_string()),
            Some("на 2024 года".to_string()),
        ]);
        assert_eq!(changed, 2);
        let texts = wb.texts();
        assert_eq!(texts[0], "Свідоцтво");
        assert_eq!(texts[1], " ИНН & КПП ");
        assert_eq!(texts[2], "на 2024 года");
    }

    #[test]
    fn unrelated_parts_round_trip_byte_for_byte() {
        let original = sample_xlsx();
        let mut wb = Workbook::from_bytes(&original).unwrap();
        wb.map_texts(|t| t.replace("року", "года"));
        let rebuilt = wb.to_bytes().unwrap();

        let mut reread = ZipArchive::new(Cursor::new(rebuilt.as_slice())).unwrap();
        let names: Vec<String> = (0..reread.len())
            .map(|i| reread.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "[Content_Types].xml",
                "xl/workbook.xml",
                "xl/styles.xml",
                "xl/sharedStrings.xml",
                "xl/worksheets/sheet1.xml",
            ]
        );

        let mut styles = String::new();
        reread
            .by_name("xl/styles.xml")
            .unwrap()
            .read_to_string(&mut styles)
            .unwrap();
        assert_eq!(styles, STYLES);
    }

    #[test]
    fn entities_survive_a_noop_rewrite() {
        let mut wb = Workbook::from_bytes(&sample_xlsx()).unwrap();
        // Identity mapping must not corrupt escaped content.
        let changed = wb.map_texts(|t| t.to_string());
        assert_eq!(changed, 0);
        assert_eq!(wb.texts()[1], " ІНН & КПП ");
    }

    #[test]
    fn preserve_attribute_kept_on_rewrite() {
        let mut wb = Workbook::from_bytes(&sample_xlsx()).unwrap();
        wb.apply_texts(&[None, Some(" ИНН & КПП ".to_string())]);
        let rebuilt = wb.to_bytes().unwrap();
        let mut reread = ZipArchive::new(Cursor::new(rebuilt.as_slice())).unwrap();
        let mut sst = String::new();
        reread
            .by_name("xl/sharedStrings.xml")
            .unwrap()
            .read_to_string(&mut sst)
            .unwrap();
        assert!(sst.contains(r#"<t xml:space="preserve"> ИНН &amp; КПП </t>"#));
    }

    #[test]
    fn self_closing_t_is_not_a_text_node() {
        let wb = Workbook::from_bytes(&sample_xlsx()).unwrap();
        assert_eq!(wb.texts().len(), 3);
    }

    #[test]
    fn garbage_bytes_rejected() {
        let err = Workbook::from_bytes(b"%PDF-1.7 not a zip").unwrap_err();
        assert!(matches!(err, ConvertError::BadWorkbook { .. }));
    }

    #[test]
    fn zip_without_workbook_part_rejected() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.start_file("hello.txt", options).unwrap();
        writer.write_all(b"hi").unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        let err = Workbook::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ConvertError::BadWorkbook { .. }));
    }
}
