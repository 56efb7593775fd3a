use std::fs;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use zip::ZipArchive;

use crate::error::HarvestError;

use super::{IdentifierSource, issn_column};

const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";

/// Office Open XML workbook. Only the first worksheet is read; its first row
/// is the header.
#[derive(Debug, Clone)]
pub struct SpreadsheetFile {
    path: PathBuf,
}

impl SpreadsheetFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn error(&self, message: impl ToString) -> HarvestError {
        HarvestError::Spreadsheet {
            path: self.path.display().to_string(),
            message: message.to_string(),
        }
    }
}

impl IdentifierSource for SpreadsheetFile {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn read_identifiers(&self) -> Result<Vec<String>, HarvestError> {
        let file = fs::File::open(&self.path).map_err(|err| HarvestError::InputRead {
            path: self.label(),
            message: err.to_string(),
        })?;
        let mut archive = ZipArchive::new(file).map_err(|err| self.error(err))?;

        let shared = match read_entry(&mut archive, SHARED_STRINGS) {
            Ok(xml) => parse_shared_strings(&xml).map_err(|err| self.error(err))?,
            Err(_) => Vec::new(),
        };
        let sheet_path = match first_listed_sheet(&mut archive).map_err(|err| self.error(err))? {
            Some(path) => path,
            None => first_sheet_entry(&archive)
                .ok_or_else(|| self.error("workbook has no worksheets"))?,
        };
        let sheet = read_entry(&mut archive, &sheet_path).map_err(|err| self.error(err))?;
        let rows = parse_sheet_rows(&sheet, &shared).map_err(|err| self.error(err))?;

        identifiers_from_rows(&rows, &self.label())
    }
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, String> {
    let mut entry = archive.by_name(name).map_err(|err| err.to_string())?;
    let mut buffer = Vec::new();
    entry
        .read_to_end(&mut buffer)
        .map_err(|err| err.to_string())?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Archive path of the first `<sheet>` in `xl/workbook.xml`, resolved through
/// the workbook relationships. `None` when either part is missing.
fn first_listed_sheet<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Option<String>, quick_xml::Error> {
    let (Ok(workbook), Ok(rels)) = (
        read_entry(archive, WORKBOOK),
        read_entry(archive, WORKBOOK_RELS),
    ) else {
        return Ok(None);
    };
    let Some(relation) = first_sheet_relation(&workbook)? else {
        return Ok(None);
    };
    let Some(target) = relationship_target(&rels, &relation)? else {
        return Ok(None);
    };
    let path = resolve_part(&target);
    Ok(archive
        .file_names()
        .any(|name| name == path)
        .then_some(path))
}

/// Fallback for workbooks without relationship parts: the lowest-numbered
/// `xl/worksheets/sheetN.xml`.
fn first_sheet_entry<R: Read + Seek>(archive: &ZipArchive<R>) -> Option<String> {
    archive
        .file_names()
        .filter(|name| name.starts_with("xl/worksheets/sheet") && name.ends_with(".xml"))
        .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
        .map(str::to_string)
}

pub(crate) fn first_sheet_relation(workbook: &str) -> Result<Option<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(workbook);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                return Ok(attribute(&e, b"id"));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

pub(crate) fn relationship_target(
    rels: &str,
    relation: &str,
) -> Result<Option<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(rels);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e)
                if e.local_name().as_ref() == b"Relationship"
                    && attribute(&e, b"Id").as_deref() == Some(relation) =>
            {
                return Ok(attribute(&e, b"Target"));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Relationship targets are relative to `xl/` unless rooted.
fn resolve_part(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(rooted) => rooted.to_string(),
        None => format!("xl/{target}"),
    }
}

/// Value of the attribute whose local name is `name`, namespace prefix ignored.
fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

/// Shared string table in index order. An empty `<si/>` still takes a slot;
/// phonetic runs are not part of the text.
pub(crate) fn parse_shared_strings(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Text(e) if in_text && !in_phonetic => {
                if let Some(current) = current.as_mut() {
                    current.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) if in_text && !in_phonetic => {
                if let Some(current) = current.as_mut() {
                    current.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

struct PendingCell {
    column: usize,
    kind: Option<String>,
    text: String,
}

impl PendingCell {
    fn open(element: &BytesStart<'_>, next_column: usize) -> Self {
        let column = attribute(element, b"r")
            .and_then(|reference| column_from_reference(&reference))
            .unwrap_or(next_column);
        Self {
            column,
            kind: attribute(element, b"t"),
            text: String::new(),
        }
    }

    fn resolve(self, shared: &[String]) -> (usize, String) {
        let value = match self.kind.as_deref() {
            Some("s") => self
                .text
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|index| shared.get(index).cloned())
                .unwrap_or_default(),
            _ => self.text,
        };
        (self.column, value)
    }
}

/// Dense rows; missing cells are empty strings. Element prefixes such as
/// `x:row` are ignored.
pub(crate) fn parse_sheet_rows(
    xml: &str,
    shared: &[String],
) -> Result<Vec<Vec<String>>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut rows = Vec::new();
    let mut row: Option<Vec<String>> = None;
    let mut cell: Option<PendingCell> = None;
    let mut capture = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => row = Some(Vec::new()),
                b"c" => cell = Some(PendingCell::open(&e, row.as_ref().map_or(0, Vec::len))),
                b"v" | b"t" => capture = cell.is_some(),
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"row" => rows.push(Vec::new()),
            Event::Text(e) if capture => {
                if let Some(cell) = cell.as_mut() {
                    cell.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) if capture => {
                if let Some(cell) = cell.as_mut() {
                    cell.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    if let (Some(done), Some(cells)) = (cell.take(), row.as_mut()) {
                        let (column, value) = done.resolve(shared);
                        if cells.len() <= column {
                            cells.resize(column + 1, String::new());
                        }
                        cells[column] = value;
                    }
                }
                b"row" => rows.extend(row.take()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rows)
}

pub(crate) fn identifiers_from_rows(
    rows: &[Vec<String>],
    label: &str,
) -> Result<Vec<String>, HarvestError> {
    let Some(header) = rows.first().filter(|row| row.iter().any(|c| !c.trim().is_empty()))
    else {
        return Err(HarvestError::MissingHeader(label.to_string()));
    };
    let column = issn_column(header.as_slice())
        .ok_or_else(|| HarvestError::MissingIssnColumn(label.to_string()))?;

    Ok(rows[1..]
        .iter()
        .filter_map(|row| row.get(column))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect())
}

/// `A1` → 0, `Z7` → 25, `AA3` → 26.
fn column_from_reference(reference: &str) -> Option<usize> {
    let letters = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase());
    let index = letters.fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize);
    index.checked_sub(1)
}
