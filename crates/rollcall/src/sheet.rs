//! Attendance spreadsheet persistence.
//!
//! The sheet has the columns `S.No, Name, Date, Status, Time` and is always
//! read and rewritten whole. XLSX files are written with `rust_xlsxwriter` and
//! read back with `calamine`; `.csv` files go through the `csv` crate.

use chrono::{NaiveDate, NaiveTime};
use rust_xlsxwriter::{Color, Format, FormatBorder, FormatPattern, Workbook};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const HEADERS: [&str; 5] = ["S.No", "Name", "Date", "Status", "Time"];
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("xlsx write: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),
    #[error("xlsx read: {0}")]
    XlsxRead(#[from] calamine::XlsxError),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed sheet: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Present,
    Absent,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Status::Present => "Present",
            Status::Absent => "Absent",
        })
    }
}

impl FromStr for Status {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Present" => Ok(Status::Present),
            "Absent" => Ok(Status::Absent),
            other => Err(SheetError::Malformed(format!("unknown status {other:?}"))),
        }
    }
}

/// One persisted attendance row. Exactly one exists per (name, date).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRow {
    pub sno: u32,
    pub name: String,
    pub date: NaiveDate,
    pub status: Status,
    pub time: Option<NaiveTime>,
}

impl AttendanceRow {
    pub fn absent(sno: u32, name: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            sno,
            name: name.into(),
            date,
            status: Status::Absent,
            time: None,
        }
    }

    fn to_fields(&self) -> [String; 5] {
        [
            self.sno.to_string(),
            self.name.clone(),
            self.date.format(DATE_FORMAT).to_string(),
            self.status.to_string(),
            self.time
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_default(),
        ]
    }

    fn from_fields(fields: [&str; 5]) -> Result<Self, SheetError> {
        let [sno, name, date, status, time] = fields.map(str::trim);

        let sno = sno
            .parse::<u32>()
            .ok()
            .or_else(|| sno.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u32))
            .ok_or_else(|| SheetError::Malformed(format!("bad S.No {sno:?}")))?;
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map_err(|e| SheetError::Malformed(format!("bad date {date:?}: {e}")))?;
        let time = if time.is_empty() {
            None
        } else {
            Some(
                NaiveTime::parse_from_str(time, TIME_FORMAT)
                    .map_err(|e| SheetError::Malformed(format!("bad time {time:?}: {e}")))?,
            )
        };

        Ok(Self {
            sno,
            name: name.to_string(),
            date,
            status: status.parse()?,
            time,
        })
    }
}

/// Whole-file attendance storage.
pub trait SheetStore {
    fn exists(&self) -> bool;
    fn load(&self) -> Result<Vec<AttendanceRow>, SheetError>;
    /// Replace the stored rows with `rows`.
    fn save(&self, rows: &[AttendanceRow]) -> Result<(), SheetError>;
    fn describe(&self) -> String;
}

/// Pick a store from the file extension: `.csv` for CSV, anything else XLSX.
pub fn open_sheet(path: &Path) -> Box<dyn SheetStore> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if is_csv {
        Box::new(CsvSheet::new(path))
    } else {
        Box::new(XlsxSheet::new(path))
    }
}

/// Column positions resolved from a header row.
struct Columns([usize; 5]);

impl Columns {
    fn resolve<S: AsRef<str>>(header: &[S]) -> Result<Self, SheetError> {
        let mut idx = [0usize; 5];
        for (slot, wanted) in idx.iter_mut().zip(HEADERS) {
            *slot = header
                .iter()
                .position(|h| h.as_ref().trim() == wanted)
                .ok_or_else(|| SheetError::Malformed(format!("missing column {wanted:?}")))?;
        }
        Ok(Self(idx))
    }

    fn pick<'a, S: AsRef<str>>(&self, row: &'a [S]) -> [&'a str; 5] {
        self.0
            .map(|i| row.get(i).map(|c| c.as_ref()).unwrap_or(""))
    }
}

pub struct XlsxSheet {
    path: PathBuf,
}

impl XlsxSheet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SheetStore for XlsxSheet {
    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn load(&self) -> Result<Vec<AttendanceRow>, SheetError> {
        use calamine::{open_workbook, Reader, Xlsx};

        let mut workbook: Xlsx<_> = open_workbook(&self.path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| SheetError::Malformed("workbook has no worksheets".into()))??;

        let mut rows = range
            .rows()
            .map(|r| r.iter().map(|c| c.to_string()).collect::<Vec<String>>());

        let Some(header) = rows.next() else {
            return Ok(Vec::new());
        };
        let columns = Columns::resolve(&header)?;

        rows.filter(|r| r.iter().any(|c| !c.trim().is_empty()))
            .map(|r| AttendanceRow::from_fields(columns.pick(&r)))
            .collect()
    }

    fn save(&self, rows: &[AttendanceRow]) -> Result<(), SheetError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();

        let header_format = Format::new()
            .set_bold()
            .set_font_color(Color::RGB(0xFFFFFF))
            .set_background_color(Color::RGB(0x2F75B5))
            .set_pattern(FormatPattern::Solid)
            .set_border(FormatBorder::Thin);

        for (col, header) in HEADERS.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
        }
        worksheet.set_freeze_panes(1, 0)?;

        let mut widths: Vec<usize> = HEADERS.iter().map(|h| h.len()).collect();
        for (i, row) in rows.iter().enumerate() {
            let r = (i + 1) as u32;
            let fields = row.to_fields();
            worksheet.write_number(r, 0, row.sno as f64)?;
            for (col, value) in fields.iter().enumerate().skip(1) {
                if !value.is_empty() {
                    worksheet.write_string(r, col as u16, value)?;
                }
            }
            for (w, value) in widths.iter_mut().zip(fields.iter()) {
                *w = (*w).max(value.chars().count());
            }
        }

        for (col, w) in widths.iter().enumerate() {
            worksheet.set_column_width(col as u16, *w as f64 + 2.0)?;
        }

        workbook.save(&self.path)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub struct CsvSheet {
    path: PathBuf,
}

impl CsvSheet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SheetStore for CsvSheet {
    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn load(&self) -> Result<Vec<AttendanceRow>, SheetError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;
        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let columns = Columns::resolve(&header)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let fields: Vec<&str> = record.iter().collect();
            if fields.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            rows.push(AttendanceRow::from_fields(columns.pick(&fields))?);
        }
        Ok(rows)
    }

    fn save(&self, rows: &[AttendanceRow]) -> Result<(), SheetError> {
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(HEADERS)?;
        for row in rows {
            writer.write_record(row.to_fields())?;
        }
        writer.flush()?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Shared access through a reference, so callers can keep inspecting a store
/// they lent to the ledger.
impl<S: SheetStore + ?Sized> SheetStore for &S {
    fn exists(&self) -> bool {
        (**self).exists()
    }

    fn load(&self) -> Result<Vec<AttendanceRow>, SheetError> {
        (**self).load()
    }

    fn save(&self, rows: &[AttendanceRow]) -> Result<(), SheetError> {
        (**self).save(rows)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<S: SheetStore + ?Sized> SheetStore for Box<S> {
    fn exists(&self) -> bool {
        (**self).exists()
    }

    fn load(&self) -> Result<Vec<AttendanceRow>, SheetError> {
        (**self).load()
    }

    fn save(&self, rows: &[AttendanceRow]) -> Result<(), SheetError> {
        (**self).save(rows)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySheet;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn sample_rows() -> Vec<AttendanceRow> {
        vec![
            AttendanceRow {
                sno: 1,
                name: "Alice".into(),
                date: date("2026-10-19"),
                status: Status::Present,
                time: NaiveTime::from_hms_opt(9, 5, 30),
            },
            AttendanceRow::absent(2, "Bob", date("2026-10-19")),
        ]
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Present".parse::<Status>().unwrap(), Status::Present);
        assert_eq!(" Absent ".parse::<Status>().unwrap(), Status::Absent);
        assert!("Late".parse::<Status>().is_err());
    }

    #[test]
    fn test_fields_accept_float_sno() {
        let row = AttendanceRow::from_fields(["3", "Carol", "2026-10-19", "Absent", ""]).unwrap();
        assert_eq!(row.sno, 3);
        let row = AttendanceRow::from_fields(["4.0", "Dan", "2026-10-19", "Absent", ""]).unwrap();
        assert_eq!(row.sno, 4);
        assert!(AttendanceRow::from_fields(["x", "Dan", "2026-10-19", "Absent", ""]).is_err());
        assert!(AttendanceRow::from_fields(["1", "Dan", "19/10/2026", "Absent", ""]).is_err());
    }

    #[test]
    fn test_columns_resolved_by_header_name() {
        let header = ["Name", "S.No", "Status", "Date", "Time"];
        let columns = Columns::resolve(&header).unwrap();
        let row = ["Alice", "7", "Absent", "2026-10-19", ""];
        assert_eq!(columns.pick(&row), ["7", "Alice", "2026-10-19", "Absent", ""]);
        assert!(Columns::resolve(&["Name", "Date"]).is_err());
    }

    #[test]
    fn test_xlsx_file_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = XlsxSheet::new(dir.path().join("attendance.xlsx"));
        assert!(!sheet.exists());

        sheet.save(&sample_rows()).unwrap();
        assert!(sheet.exists());
        assert_eq!(sheet.load().unwrap(), sample_rows());
    }

    #[test]
    fn test_csv_file_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        let sheet = CsvSheet::new(&path);
        sheet.save(&sample_rows()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("S.No,Name,Date,Status,Time"));
        assert!(text.contains("2,Bob,2026-10-19,Absent,"));
        assert_eq!(sheet.load().unwrap(), sample_rows());
    }

    #[test]
    fn test_open_sheet_by_extension() {
        assert!(open_sheet(Path::new("a.CSV")).describe().ends_with("a.CSV"));
        assert!(open_sheet(Path::new("attendance.xlsx"))
            .describe()
            .ends_with("attendance.xlsx"));
    }

    #[test]
    fn test_memory_sheet_failure_injection() {
        let sheet = MemorySheet::new();
        assert!(!sheet.exists());
        assert!(sheet.load().is_err());
        sheet.save(&sample_rows()).unwrap();
        sheet.set_fail_writes(true);
        assert!(sheet.save(&[]).is_err());
        assert_eq!(sheet.rows().len(), 2);
        assert_eq!(sheet.write_count(), 1);
    }
}
