//! Streaming extraction of embedded images from an OOXML spreadsheet
//! container.
//!
//! The container is a zip holding an image bank (`xl/cellimages.xml`), a
//! relationship table mapping bank entry names to blob paths, and per-sheet
//! XML where a cell formula embeds a bank entry name as a string literal to
//! the vendor display function (`_xlfn.DISPIMG`). Extraction runs in three
//! bounded passes so a multi-gigabyte workbook never has to fit in memory:
//!
//! 1. Read only the small control XML files (bank, relationships, sheet map,
//!    and the selected worksheets).
//! 2. Stream exactly the blob entries the bank references, skipping every
//!    unrelated archive entry.
//! 3. Re-scan the retained worksheet XML for every cell referencing each
//!    bank entry, yielding one record per (image-ID, cell) pair that shares
//!    the blob buffer by reference.

use crate::core::cell::parse_cell_ref;
use crate::progress::{AuditPhase, CancelToken, ProgressSink};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use zip::result::ZipError;
use zip::ZipArchive;

const CELL_IMAGES_PART: &str = "xl/cellimages.xml";
const CELL_IMAGES_RELS: &str = "xl/_rels/cellimages.xml.rels";
const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("worksheet not found: {name}")]
    MissingSheet { name: String },

    #[error("operation cancelled")]
    Cancelled,
}

/// One embedded image reference: the same logical photo pasted into N cells
/// yields N records sharing one buffer.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddedImage {
    pub id: String,
    /// Bank entry name referenced by the cell formula.
    pub image_id: String,
    pub sheet: String,
    /// 0-based cell coordinates.
    pub row: u32,
    pub column: u32,
    #[serde(skip)]
    pub data: Arc<Vec<u8>>,
    /// SHA-256 of the blob; records sharing a buffer share this hash.
    pub content_hash: String,
}

#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    /// Ordered by sheet order, then document position within the sheet.
    pub images: Vec<EmbeddedImage>,
    /// False when the container lacks the image bank entirely.
    pub format_supported: bool,
    /// User-facing degradation notes; never silently empty results.
    pub notes: Vec<String>,
}

pub struct ExtractorService;

impl ExtractorService {
    pub fn new() -> Self {
        Self
    }

    /// Resolve every embedded-image reference in `path` to (buffer, row,
    /// column). Only a failure to open or stream the container itself is
    /// fatal; per-reference problems degrade with a logged note.
    pub fn extract(
        &self,
        path: &Path,
        worksheet: Option<&str>,
        cancel: &CancelToken,
        progress: &ProgressSink,
    ) -> Result<ExtractionOutcome, ExtractError> {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        // Pass 1: control XML only.
        progress.send(AuditPhase::Extraction, 5, "Reading container structure");
        let Some(bank_xml) = read_entry(&mut archive, CELL_IMAGES_PART)? else {
            log::info!("container has no image bank; format not supported");
            return Ok(ExtractionOutcome {
                images: Vec::new(),
                format_supported: false,
                notes: vec!["container format not supported: no embedded image bank".to_string()],
            });
        };
        let bank = parse_image_bank(&bank_xml)?;

        let bank_rels = match read_entry(&mut archive, CELL_IMAGES_RELS)? {
            Some(xml) => parse_relationships(&xml, "xl")?,
            None => HashMap::new(),
        };

        let sheet_map = match read_entry(&mut archive, WORKBOOK_PART)? {
            Some(xml) => parse_sheet_map(&xml)?,
            None => Vec::new(),
        };
        let workbook_rels = match read_entry(&mut archive, WORKBOOK_RELS)? {
            Some(xml) => parse_relationships(&xml, "xl")?,
            None => HashMap::new(),
        };

        let mut notes = Vec::new();
        let mut sheets: Vec<(String, String)> = Vec::new();
        for (name, rid) in &sheet_map {
            if let Some(target) = worksheet {
                if name != target {
                    continue;
                }
            }
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }
            let Some(part) = workbook_rels.get(rid) else {
                log::warn!("sheet {name} has no relationship target; skipping");
                continue;
            };
            match read_entry(&mut archive, part)? {
                Some(xml) => sheets.push((name.clone(), xml)),
                None => log::warn!("sheet part {part} missing from archive; skipping {name}"),
            }
        }
        if let Some(target) = worksheet {
            if sheets.is_empty() {
                return Err(ExtractError::MissingSheet {
                    name: target.to_string(),
                });
            }
        }

        // Pass 2: stream exactly the referenced blobs.
        progress.send(AuditPhase::Extraction, 40, "Streaming image blobs");
        let mut blobs_by_part: HashMap<String, (Arc<Vec<u8>>, String)> = HashMap::new();
        let mut blobs: HashMap<String, (Arc<Vec<u8>>, String)> = HashMap::new();
        for (image_id, rid) in &bank {
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }
            let Some(part) = bank_rels.get(rid) else {
                log::warn!("image {image_id} has no relationship entry; dropping reference");
                notes.push(format!("image {image_id} dropped: unresolved relationship"));
                continue;
            };
            if let Some(existing) = blobs_by_part.get(part) {
                blobs.insert(image_id.clone(), existing.clone());
                continue;
            }
            match read_entry_bytes(&mut archive, part)? {
                Some(bytes) => {
                    let hash = format!("{:x}", Sha256::digest(&bytes));
                    let blob = (Arc::new(bytes), hash);
                    blobs_by_part.insert(part.clone(), blob.clone());
                    blobs.insert(image_id.clone(), blob);
                }
                None => {
                    log::warn!("blob {part} for image {image_id} missing; dropping reference");
                    notes.push(format!("image {image_id} dropped: blob missing from archive"));
                }
            }
        }

        // Pass 3: re-scan the retained worksheet XML for display-function
        // cells, in document order.
        progress.send(AuditPhase::Extraction, 75, "Resolving cell references");
        let mut images = Vec::new();
        for (sheet_name, xml) in &sheets {
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }
            for (reference, image_id) in scan_display_cells(xml)? {
                let Some((row, column)) = parse_cell_ref(&reference) else {
                    log::warn!("unparseable cell reference {reference} on {sheet_name}");
                    continue;
                };
                let Some((data, content_hash)) = blobs.get(&image_id) else {
                    log::warn!(
                        "cell {reference} on {sheet_name} references unknown image {image_id}"
                    );
                    notes.push(format!(
                        "cell {reference} dropped: image {image_id} not in bank"
                    ));
                    continue;
                };
                images.push(EmbeddedImage {
                    id: format!("img_{}", Uuid::new_v4().simple()),
                    image_id,
                    sheet: sheet_name.clone(),
                    row,
                    column,
                    data: data.clone(),
                    content_hash: content_hash.clone(),
                });
            }
        }

        progress.send(
            AuditPhase::Extraction,
            100,
            format!("Extracted {} embedded image reference(s)", images.len()),
        );
        Ok(ExtractionOutcome {
            images,
            format_supported: true,
            notes,
        })
    }
}

impl Default for ExtractorService {
    fn default() -> Self {
        Self::new()
    }
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, ExtractError> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            Ok(Some(content))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_entry_bytes<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, ExtractError> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut content = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut content)?;
            Ok(Some(content))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn attr_value(element: &BytesStart<'_>, keys: &[&[u8]]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| keys.iter().any(|k| a.key.as_ref() == *k))
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Bank definition: ordered (entry name, relationship id) pairs. The entry
/// name is the `name` attribute of the picture's non-visual properties; the
/// relationship id comes from the following blip fill.
fn parse_image_bank(xml: &str) -> Result<Vec<(String, String)>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut entries = Vec::new();
    let mut pending_name: Option<String> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => match e.name().local_name().as_ref() {
                b"cNvPr" => {
                    if let Some(name) = attr_value(&e, &[b"name"]) {
                        pending_name = Some(name);
                    }
                }
                b"blip" => {
                    if let (Some(name), Some(rid)) =
                        (pending_name.take(), attr_value(&e, &[b"r:embed"]))
                    {
                        entries.push((name, rid));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}

/// Relationship table: id -> archive path, targets resolved against `base`.
fn parse_relationships(
    xml: &str,
    base: &str,
) -> Result<HashMap<String, String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut map = HashMap::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                if e.name().local_name().as_ref() == b"Relationship" {
                    if let (Some(id), Some(target)) =
                        (attr_value(&e, &[b"Id"]), attr_value(&e, &[b"Target"]))
                    {
                        map.insert(id, resolve_part_path(base, &target));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(map)
}

/// Sheet map in workbook order: (sheet name, relationship id).
fn parse_sheet_map(xml: &str) -> Result<Vec<(String, String)>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                if e.name().local_name().as_ref() == b"sheet" {
                    if let (Some(name), Some(rid)) =
                        (attr_value(&e, &[b"name"]), attr_value(&e, &[b"r:id"]))
                    {
                        sheets.push((name, rid));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sheets)
}

/// Resolve a relationship target to a full archive path. Absolute targets
/// strip the leading slash; relative targets resolve against `base` with
/// `..` segments collapsed.
fn resolve_part_path(base: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Scan one worksheet's XML for cells whose formula invokes the embedded
/// image display function, in document order. Returns (cell reference, bank
/// entry name) pairs.
fn scan_display_cells(xml: &str) -> Result<Vec<(String, String)>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut found = Vec::new();
    let mut current_cell: Option<String> = None;
    let mut formula: Option<String> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => match e.name().local_name().as_ref() {
                b"c" => current_cell = attr_value(&e, &[b"r"]),
                b"f" => formula = Some(String::new()),
                _ => {}
            },
            Event::Text(t) => {
                if let Some(buf) = formula.as_mut() {
                    buf.push_str(&t.unescape()?);
                }
            }
            Event::End(e) => {
                if e.name().local_name().as_ref() == b"f" {
                    if let (Some(text), Some(cell)) = (formula.take(), current_cell.as_ref()) {
                        if let Some(image_id) = extract_image_id(&text) {
                            found.push((cell.clone(), image_id));
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(found)
}

/// Pull the quoted bank entry name out of a display-function formula.
/// Real files carry the literal in either HTML-escaped or plain-quote form,
/// so both are recognized.
pub fn extract_image_id(formula: &str) -> Option<String> {
    let start = formula.find("DISPIMG")?;
    let rest = &formula[start..];
    for delimiter in ["&quot;", "\""] {
        if let Some(open) = rest.find(delimiter) {
            let after = &rest[open + delimiter.len()..];
            if let Some(close) = after.find(delimiter) {
                let id = after[..close].trim();
                if !id.is_empty() {
                    return Some(id.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::{Cursor, Write};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn png_bytes(seed: u8) -> Vec<u8> {
        let img = ImageBuffer::from_fn(24, 24, |x, y| {
            Rgb([seed, (x % 256) as u8, (y % 256) as u8])
        });
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    struct Fixture {
        bank: Vec<(String, String)>,
        rels: Vec<(String, String)>,
        sheets: Vec<(String, String)>, // (name, sheet xml)
        blobs: Vec<(String, Vec<u8>)>, // (archive path, bytes)
        include_bank: bool,
    }

    impl Fixture {
        fn write(self, dir: &TempDir) -> std::path::PathBuf {
            let path = dir.path().join("book.xlsx");
            let file = File::create(&path).unwrap();
            let mut zip = ZipWriter::new(file);
            let options = SimpleFileOptions::default();

            if self.include_bank {
                let mut bank_xml = String::from(
                    "<etc:cellImages xmlns:etc=\"http://www.wps.cn/officeDocument/2017/etCustomData\">",
                );
                for (name, rid) in &self.bank {
                    bank_xml.push_str(&format!(
                        "<etc:cellImage><xdr:pic><xdr:nvPicPr><xdr:cNvPr id=\"1\" name=\"{name}\"/>\
                         </xdr:nvPicPr><xdr:blipFill><a:blip r:embed=\"{rid}\"/></xdr:blipFill>\
                         </xdr:pic></etc:cellImage>"
                    ));
                }
                bank_xml.push_str("</etc:cellImages>");
                zip.start_file(CELL_IMAGES_PART, options).unwrap();
                zip.write_all(bank_xml.as_bytes()).unwrap();

                let mut rels_xml = String::from("<Relationships>");
                for (id, target) in &self.rels {
                    rels_xml.push_str(&format!(
                        "<Relationship Id=\"{id}\" Type=\"image\" Target=\"{target}\"/>"
                    ));
                }
                rels_xml.push_str("</Relationships>");
                zip.start_file(CELL_IMAGES_RELS, options).unwrap();
                zip.write_all(rels_xml.as_bytes()).unwrap();
            }

            let mut workbook = String::from("<workbook><sheets>");
            let mut workbook_rels = String::from("<Relationships>");
            for (i, (name, _)) in self.sheets.iter().enumerate() {
                workbook.push_str(&format!(
                    "<sheet name=\"{name}\" sheetId=\"{}\" r:id=\"rSheet{i}\"/>",
                    i + 1
                ));
                workbook_rels.push_str(&format!(
                    "<Relationship Id=\"rSheet{i}\" Type=\"worksheet\" \
                     Target=\"worksheets/sheet{i}.xml\"/>"
                ));
            }
            workbook.push_str("</sheets></workbook>");
            workbook_rels.push_str("</Relationships>");
            zip.start_file(WORKBOOK_PART, options).unwrap();
            zip.write_all(workbook.as_bytes()).unwrap();
            zip.start_file(WORKBOOK_RELS, options).unwrap();
            zip.write_all(workbook_rels.as_bytes()).unwrap();

            for (i, (_, sheet_xml)) in self.sheets.iter().enumerate() {
                zip.start_file(format!("xl/worksheets/sheet{i}.xml"), options)
                    .unwrap();
                zip.write_all(sheet_xml.as_bytes()).unwrap();
            }

            for (part, bytes) in &self.blobs {
                zip.start_file(part.as_str(), options).unwrap();
                zip.write_all(bytes).unwrap();
            }

            zip.finish().unwrap();
            path
        }
    }

    fn sheet_with_cells(cells: &[(&str, &str)]) -> String {
        let mut xml = String::from("<worksheet><sheetData><row>");
        for (reference, formula) in cells {
            xml.push_str(&format!(
                "<c r=\"{reference}\"><f>{formula}</f><v>0</v></c>"
            ));
        }
        xml.push_str("</row></sheetData></worksheet>");
        xml
    }

    fn extract(path: &std::path::Path, worksheet: Option<&str>) -> ExtractionOutcome {
        ExtractorService::new()
            .extract(path, worksheet, &CancelToken::new(), &ProgressSink::disabled())
            .unwrap()
    }

    #[test]
    fn extracts_one_record_per_cell_sharing_buffers() {
        let dir = TempDir::new().unwrap();
        let path = Fixture {
            bank: vec![("ID_AAA".into(), "rId1".into())],
            rels: vec![("rId1".into(), "media/image1.png".into())],
            sheets: vec![(
                "Sheet1".into(),
                sheet_with_cells(&[
                    ("B2", "_xlfn.DISPIMG(&quot;ID_AAA&quot;,1)"),
                    ("C5", "_xlfn.DISPIMG(&quot;ID_AAA&quot;,1)"),
                ]),
            )],
            blobs: vec![("xl/media/image1.png".into(), png_bytes(1))],
            include_bank: true,
        }
        .write(&dir);

        let outcome = extract(&path, None);
        assert!(outcome.format_supported);
        assert_eq!(outcome.images.len(), 2);
        assert_eq!((outcome.images[0].row, outcome.images[0].column), (1, 1));
        assert_eq!((outcome.images[1].row, outcome.images[1].column), (4, 2));
        // Same logical photo pasted twice: one buffer, two records.
        assert!(Arc::ptr_eq(&outcome.images[0].data, &outcome.images[1].data));
        assert_eq!(outcome.images[0].content_hash, outcome.images[1].content_hash);
        assert_ne!(outcome.images[0].id, outcome.images[1].id);
    }

    #[test]
    fn recognizes_both_quoting_encodings() {
        let dir = TempDir::new().unwrap();
        let path = Fixture {
            bank: vec![
                ("ID_ESC".into(), "rId1".into()),
                ("ID_PLAIN".into(), "rId2".into()),
            ],
            rels: vec![
                ("rId1".into(), "media/image1.png".into()),
                ("rId2".into(), "media/image2.png".into()),
            ],
            sheets: vec![(
                "Sheet1".into(),
                // The first formula carries a literal &quot; (double-escaped
                // in XML); the second uses plain quotes (escaped once).
                sheet_with_cells(&[
                    ("A1", "_xlfn.DISPIMG(&amp;quot;ID_ESC&amp;quot;,1)"),
                    ("A2", "_xlfn.DISPIMG(&quot;ID_PLAIN&quot;,1)"),
                ]),
            )],
            blobs: vec![
                ("xl/media/image1.png".into(), png_bytes(1)),
                ("xl/media/image2.png".into(), png_bytes(2)),
            ],
            include_bank: true,
        }
        .write(&dir);

        let outcome = extract(&path, None);
        let ids: Vec<&str> = outcome.images.iter().map(|i| i.image_id.as_str()).collect();
        assert_eq!(ids, vec!["ID_ESC", "ID_PLAIN"]);
    }

    #[test]
    fn missing_bank_degrades_to_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = Fixture {
            bank: vec![],
            rels: vec![],
            sheets: vec![("Sheet1".into(), sheet_with_cells(&[]))],
            blobs: vec![],
            include_bank: false,
        }
        .write(&dir);

        let outcome = extract(&path, None);
        assert!(!outcome.format_supported);
        assert!(outcome.images.is_empty());
        assert!(outcome.notes[0].contains("not supported"));
    }

    #[test]
    fn missing_blob_drops_reference_without_failing() {
        let dir = TempDir::new().unwrap();
        let path = Fixture {
            bank: vec![
                ("ID_OK".into(), "rId1".into()),
                ("ID_GONE".into(), "rId2".into()),
            ],
            rels: vec![
                ("rId1".into(), "media/image1.png".into()),
                ("rId2".into(), "media/missing.png".into()),
            ],
            sheets: vec![(
                "Sheet1".into(),
                sheet_with_cells(&[
                    ("A1", "_xlfn.DISPIMG(&quot;ID_OK&quot;,1)"),
                    ("A2", "_xlfn.DISPIMG(&quot;ID_GONE&quot;,1)"),
                ]),
            )],
            blobs: vec![("xl/media/image1.png".into(), png_bytes(1))],
            include_bank: true,
        }
        .write(&dir);

        let outcome = extract(&path, None);
        assert!(outcome.format_supported);
        assert_eq!(outcome.images.len(), 1);
        assert_eq!(outcome.images[0].image_id, "ID_OK");
        assert!(outcome.notes.iter().any(|n| n.contains("ID_GONE")));
    }

    #[test]
    fn worksheet_filter_restricts_scanning() {
        let dir = TempDir::new().unwrap();
        let path = Fixture {
            bank: vec![("ID_AAA".into(), "rId1".into())],
            rels: vec![("rId1".into(), "media/image1.png".into())],
            sheets: vec![
                (
                    "January".into(),
                    sheet_with_cells(&[("A1", "_xlfn.DISPIMG(&quot;ID_AAA&quot;,1)")]),
                ),
                (
                    "February".into(),
                    sheet_with_cells(&[("A1", "_xlfn.DISPIMG(&quot;ID_AAA&quot;,1)")]),
                ),
            ],
            blobs: vec![("xl/media/image1.png".into(), png_bytes(1))],
            include_bank: true,
        }
        .write(&dir);

        let outcome = extract(&path, Some("February"));
        assert_eq!(outcome.images.len(), 1);
        assert_eq!(outcome.images[0].sheet, "February");

        let err = ExtractorService::new()
            .extract(
                &path,
                Some("March"),
                &CancelToken::new(),
                &ProgressSink::disabled(),
            )
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingSheet { .. }));
    }

    #[test]
    fn cancellation_is_a_distinct_error() {
        let dir = TempDir::new().unwrap();
        let path = Fixture {
            bank: vec![],
            rels: vec![],
            sheets: vec![],
            blobs: vec![],
            include_bank: true,
        }
        .write(&dir);

        let token = CancelToken::new();
        token.cancel();
        let err = ExtractorService::new()
            .extract(&path, None, &token, &ProgressSink::disabled())
            .unwrap_err();
        assert!(matches!(err, ExtractError::Cancelled));
    }

    #[test]
    fn image_id_extraction_handles_both_forms() {
        assert_eq!(
            extract_image_id("_xlfn.DISPIMG(&quot;ID_X&quot;,1)").as_deref(),
            Some("ID_X")
        );
        assert_eq!(
            extract_image_id("_xlfn.DISPIMG(\"ID_Y\",1)").as_deref(),
            Some("ID_Y")
        );
        assert_eq!(extract_image_id("SUM(A1:A3)"), None);
        assert_eq!(extract_image_id("_xlfn.DISPIMG(&quot;&quot;,1)"), None);
    }

    #[test]
    fn part_path_resolution() {
        assert_eq!(resolve_part_path("xl", "media/image1.png"), "xl/media/image1.png");
        assert_eq!(resolve_part_path("xl", "/xl/media/a.png"), "xl/media/a.png");
        assert_eq!(
            resolve_part_path("xl", "../customData/img.png"),
            "customData/img.png"
        );
        assert_eq!(resolve_part_path("xl", "./media/b.png"), "xl/media/b.png");
    }
}
