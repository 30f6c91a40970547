//! Reading uploaded sample files (CSV, Excel, ZIP bundles of those) into
//! string frames.

use std::io::{Cursor, Read};
use std::path::Path;

use calamine::{Data, DataType, Reader};

const SUPPORTED_EXTENSIONS: [&str; 2] = ["csv", "xlsx"];

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Unsupported file type.")]
    Unsupported,
    #[error("Error reading CSV file: {0}")]
    Csv(#[from] csv::Error),
    #[error("Error reading Excel file: {0}")]
    Excel(#[from] calamine::Error),
    #[error("Error reading Excel file: workbook has no sheets")]
    NoSheets,
    #[error("Error reading ZIP file: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Error reading ZIP entry: {0}")]
    Io(#[from] std::io::Error),
}

/// Tabular sample data with every cell kept as an optional string.
/// Empty cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Frame {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    /// Values of one column, in row order.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows
            .iter()
            .map(move |r| r.get(idx).and_then(|c| c.as_deref()))
    }
}

/// One parsed file from an upload; ZIP bundles yield several.
#[derive(Debug, Clone)]
pub struct UploadedTable {
    pub file_name: String,
    pub frame: Frame,
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Single ASCII delimiter codes are honoured; anything else falls back to a comma.
pub fn delimiter_byte(code: &str) -> u8 {
    match code.as_bytes() {
        [b] if b.is_ascii() => *b,
        _ if code == "\\t" => b'\t',
        _ => b',',
    }
}

pub fn read_csv(bytes: &[u8], delimiter: u8) -> Result<Frame, UploadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let mut row: Vec<Option<String>> = record.iter().map(non_empty).collect();
        row.resize(columns.len(), None);
        rows.push(row);
    }
    Ok(Frame { columns, rows })
}

fn excel_cell(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => non_empty(&cell.to_string()),
        },
        other => non_empty(&other.to_string()),
    }
}

/// First worksheet only; its first row is the header.
pub fn read_excel(bytes: &[u8]) -> Result<Frame, UploadError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(UploadError::NoSheets)??;

    let mut rows_iter = range.rows();
    let Some(header) = rows_iter.next() else {
        return Ok(Frame::default());
    };
    let columns: Vec<String> = header
        .iter()
        .map(|c| excel_cell(c).unwrap_or_default())
        .collect();
    let rows = rows_iter
        .map(|r| r.iter().map(excel_cell).collect())
        .filter(|r: &Vec<Option<String>>| r.iter().any(Option::is_some))
        .collect();
    Ok(Frame { columns, rows })
}

fn read_by_extension(ext: &str, bytes: &[u8], delimiter: u8) -> Result<Frame, UploadError> {
    match ext {
        "csv" => read_csv(bytes, delimiter),
        "xlsx" => read_excel(bytes),
        _ => Err(UploadError::Unsupported),
    }
}

/// Read every supported file inside a ZIP bundle. Entries that fail to parse
/// are logged and skipped.
pub fn read_zip(bytes: &[u8], delimiter: u8) -> Result<Vec<UploadedTable>, UploadError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut tables = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let base_name = Path::new(entry.name())
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let ext = extension(&base_name);
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }

        let mut buf = Vec::new();
        if let Err(e) = entry.read_to_end(&mut buf) {
            tracing::error!(file = %base_name, error = %e, "error reading file in zip");
            continue;
        }
        match read_by_extension(&ext, &buf, delimiter) {
            Ok(frame) => tables.push(UploadedTable {
                file_name: base_name,
                frame,
            }),
            Err(e) => {
                tracing::error!(file = %base_name, error = %e, "error processing file in zip");
            }
        }
    }
    Ok(tables)
}

/// Dispatch on the upload's extension.
pub fn read_upload(
    file_name: &str,
    bytes: &[u8],
    delimiter: u8,
) -> Result<Vec<UploadedTable>, UploadError> {
    tracing::info!(file = %file_name, size = bytes.len(), "processing uploaded file");
    match extension(file_name).as_str() {
        "zip" => read_zip(bytes, delimiter),
        ext @ ("csv" | "xlsx") => Ok(vec![UploadedTable {
            file_name: file_name.to_string(),
            frame: read_by_extension(ext, bytes, delimiter)?,
        }]),
        _ => Err(UploadError::Unsupported),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            w.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            w.write_all(data).unwrap();
        }
        w.finish().unwrap().into_inner()
    }

    #[test]
    fn csv_empty_cells_become_none() {
        let frame = read_csv(b"id,name\n1,\n2,b\n", b',').unwrap();
        assert_eq!(frame.columns, vec!["id", "name"]);
        assert_eq!(frame.rows[0], vec![Some("1".to_string()), None]);
        assert_eq!(frame.rows[1][1].as_deref(), Some("b"));
    }

    #[test]
    fn csv_short_rows_are_padded() {
        let frame = read_csv(b"a,b,c\n1\n", b',').unwrap();
        assert_eq!(frame.rows[0].len(), 3);
    }

    #[test]
    fn csv_header_only_is_empty() {
        let frame = read_csv(b"a,b\n", b',').unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn csv_honours_pipe_delimiter() {
        let frame = read_csv(b"a|b\n1|2\n", delimiter_byte("|")).unwrap();
        assert_eq!(frame.columns, vec!["a", "b"]);
    }

    #[test]
    fn delimiter_falls_back_to_comma() {
        assert_eq!(delimiter_byte(""), b',');
        assert_eq!(delimiter_byte("||"), b',');
        assert_eq!(delimiter_byte(";"), b';');
        assert_eq!(delimiter_byte("\\t"), b'\t');
    }

    #[test]
    fn unsupported_extension_rejected() {
        let err = read_upload("data.json", b"{}", b',').unwrap_err();
        assert!(matches!(err, UploadError::Unsupported));
    }

    #[test]
    fn upload_extension_is_case_insensitive() {
        let tables = read_upload("Sales.CSV", b"a\n1\n", b',').unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].file_name, "Sales.CSV");
    }

    #[test]
    fn zip_reads_supported_entries_and_skips_rest() {
        let bundle = zip_of(&[
            ("nested/orders.csv", &b"id\n1\n"[..]),
            ("readme.txt", &b"ignore me"[..]),
            ("broken.xlsx", &b"not a workbook"[..]),
            ("customers.csv", &b"cust\nx\n"[..]),
        ]);
        let tables = read_upload("bundle.zip", &bundle, b',').unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.file_name.as_str()).collect();
        assert_eq!(names, vec!["orders.csv", "customers.csv"]);
    }

    #[test]
    fn corrupt_zip_is_an_error() {
        assert!(matches!(
            read_upload("bundle.zip", b"garbage", b','),
            Err(UploadError::Zip(_))
        ));
    }
}
