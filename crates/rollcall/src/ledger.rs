//! In-memory attendance state for one day, mirrored to the spreadsheet.

use crate::config::StudentEntry;
use crate::sheet::{AttendanceRow, SheetError, SheetStore, Status};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use std::collections::HashMap;

/// A roster member and their attendance for the session.
#[derive(Debug, Clone)]
pub struct Student {
    pub name: String,
    pub email: String,
    pub present: bool,
    pub marked_time: Option<NaiveTime>,
    /// Set once the "already marked" notice has been shown.
    pub alert_shown: bool,
}

impl Student {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            present: false,
            marked_time: None,
            alert_shown: false,
        }
    }
}

impl From<&StudentEntry> for Student {
    fn from(entry: &StudentEntry) -> Self {
        Student::new(entry.name.clone(), entry.email.clone())
    }
}

/// What `initialize_for_today` did to the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// No sheet existed; one was written with today's batch.
    Created { rows: usize },
    /// Today's batch was appended after `last_sno`.
    Appended { rows: usize, last_sno: u32 },
    /// Today's rows were already there.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// Newly marked present. `persisted` is false when the sheet was not
    /// updated: the write failed or there is no row for today.
    Marked { persisted: bool },
    /// Already present; the notice was shown now and will not be shown again.
    AlreadyMarked,
    /// Already present and already notified.
    Suppressed,
    UnknownStudent,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryEntry {
    pub index: usize,
    pub name: String,
    pub present: bool,
    pub time: Option<NaiveTime>,
}

impl SummaryEntry {
    pub fn status(&self) -> Status {
        if self.present {
            Status::Present
        } else {
            Status::Absent
        }
    }

    /// Time as `HH:MM:SS`, or `-` when not marked.
    pub fn time_label(&self) -> String {
        self.time
            .map(|t| t.format(crate::sheet::TIME_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub date: NaiveDate,
    pub entries: Vec<SummaryEntry>,
    pub present: usize,
    pub absent: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.entries.len()
    }
}

pub struct Ledger<S: SheetStore> {
    students: Vec<Student>,
    index: HashMap<String, usize>,
    sheet: S,
    date: NaiveDate,
}

impl<S: SheetStore> Ledger<S> {
    /// Build a ledger for `date`. The roster order is kept for reports and new rows.
    pub fn new(students: Vec<Student>, sheet: S, date: NaiveDate) -> Self {
        let index = students
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        Self {
            students,
            index,
            sheet,
            date,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Ensure the sheet holds one row per roster student for today.
    ///
    /// Existing rows for today are left untouched; students they already mark
    /// present are restored as present so a restarted session keeps them.
    pub fn initialize_for_today(&mut self) -> Result<InitOutcome, SheetError> {
        if !self.sheet.exists() {
            let rows = self.batch_after(0);
            self.sheet.save(&rows)?;
            tracing::info!(sheet = %self.sheet.describe(), rows = rows.len(), "created new attendance sheet");
            return Ok(InitOutcome::Created { rows: rows.len() });
        }

        let mut rows = self.sheet.load()?;
        if rows.iter().any(|r| r.date == self.date) {
            self.restore(&rows);
            tracing::debug!(date = %self.date, "attendance rows for today already present");
            return Ok(InitOutcome::Unchanged);
        }

        let last_sno = rows.iter().map(|r| r.sno).max().unwrap_or(0);
        let batch = self.batch_after(last_sno);
        let added = batch.len();
        rows.extend(batch);
        self.sheet.save(&rows)?;
        tracing::info!(date = %self.date, rows = added, last_sno, "added attendance records for today");
        Ok(InitOutcome::Appended {
            rows: added,
            last_sno,
        })
    }

    /// Read today's rows into memory without writing anything.
    pub fn load_today(&mut self) -> Result<usize, SheetError> {
        if !self.sheet.exists() {
            return Ok(0);
        }
        let rows = self.sheet.load()?;
        Ok(self.restore(&rows))
    }

    fn batch_after(&self, last_sno: u32) -> Vec<AttendanceRow> {
        (last_sno + 1..)
            .zip(self.students.iter())
            .map(|(sno, s)| AttendanceRow::absent(sno, s.name.clone(), self.date))
            .collect()
    }

    /// Apply today's Present rows to the in-memory roster. Returns today's row count.
    fn restore(&mut self, rows: &[AttendanceRow]) -> usize {
        let mut today = 0;
        for row in rows.iter().filter(|r| r.date == self.date) {
            today += 1;
            if row.status != Status::Present {
                continue;
            }
            if let Some(&i) = self.index.get(&row.name) {
                let student = &mut self.students[i];
                student.present = true;
                student.marked_time = row.time;
            }
        }
        today
    }

    /// Record `name` as present at `at`. Never un-marks anyone.
    pub fn mark_present(&mut self, name: &str, at: NaiveTime) -> MarkOutcome {
        let Some(&i) = self.index.get(name) else {
            tracing::warn!(name, "not found in student list");
            return MarkOutcome::UnknownStudent;
        };

        let student = &mut self.students[i];
        if student.present {
            if student.alert_shown {
                return MarkOutcome::Suppressed;
            }
            student.alert_shown = true;
            tracing::info!(name, "attendance already marked");
            return MarkOutcome::AlreadyMarked;
        }

        student.present = true;
        student.marked_time = Some(at);

        let persisted = match self.persist_present(name, at) {
            Ok(written) => {
                tracing::info!(name, time = %at.format(crate::sheet::TIME_FORMAT), written, "marked present");
                written
            }
            Err(e) => {
                tracing::error!(name, error = %e, "error updating attendance file");
                false
            }
        };
        MarkOutcome::Marked { persisted }
    }

    /// Returns whether a row for today was found and rewritten.
    fn persist_present(&self, name: &str, at: NaiveTime) -> Result<bool, SheetError> {
        let mut rows = self.sheet.load()?;
        let mut matched = 0;
        for row in rows
            .iter_mut()
            .filter(|r| r.date == self.date && r.name == name)
        {
            row.status = Status::Present;
            row.time = Some(at);
            matched += 1;
        }
        if matched == 0 {
            tracing::warn!(name, date = %self.date, "no attendance row for today; sheet not updated");
            return Ok(false);
        }
        self.sheet.save(&rows)?;
        Ok(true)
    }

    pub fn summary(&self) -> Summary {
        let entries: Vec<SummaryEntry> = self
            .students
            .iter()
            .enumerate()
            .map(|(i, s)| SummaryEntry {
                index: i + 1,
                name: s.name.clone(),
                present: s.present,
                time: s.marked_time,
            })
            .collect();
        let present = entries.iter().filter(|e| e.present).count();
        Summary {
            date: self.date,
            absent: entries.len() - present,
            present,
            entries,
        }
    }

    /// Absent students as `(name, email)`, recomputed on every call.
    pub fn absentees(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.students
            .iter()
            .filter(|s| !s.present)
            .map(|s| (s.name.as_str(), s.email.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySheet;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn student<'a, S: SheetStore>(ledger: &'a Ledger<S>, name: &str) -> Option<&'a Student> {
        ledger.students.iter().find(|s| s.name == name)
    }

    fn roster() -> Vec<Student> {
        vec![
            Student::new("Alice", "alice@example.com"),
            Student::new("Bob", "bob@example.com"),
        ]
    }

    #[test]
    fn test_initialize_creates_sheet() {
        let sheet = MemorySheet::new();
        let mut ledger = Ledger::new(roster(), &sheet, today());
        assert_eq!(ledger.initialize_for_today().unwrap(), InitOutcome::Created { rows: 2 });

        let rows = sheet.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], AttendanceRow::absent(1, "Alice", today()));
        assert_eq!(rows[1], AttendanceRow::absent(2, "Bob", today()));
    }

    #[test]
    fn test_initialize_twice_is_noop() {
        let sheet = MemorySheet::new();
        let mut ledger = Ledger::new(roster(), &sheet, today());
        ledger.initialize_for_today().unwrap();
        assert_eq!(ledger.initialize_for_today().unwrap(), InitOutcome::Unchanged);
        assert_eq!(sheet.rows().len(), 2);
        assert_eq!(sheet.write_count(), 1);
    }

    #[test]
    fn test_reinitialize_existing_today_keeps_rows() {
        let existing = vec![
            AttendanceRow::absent(5, "Alice", today()),
            AttendanceRow::absent(6, "Bob", today()),
        ];
        let sheet = MemorySheet::with_rows(existing.clone());
        let mut ledger = Ledger::new(roster(), &sheet, today());
        assert_eq!(ledger.initialize_for_today().unwrap(), InitOutcome::Unchanged);

        let rows = sheet.rows();
        assert_eq!(rows.iter().filter(|r| r.date == today()).count(), 2);
        assert_eq!(rows, existing);
    }

    #[test]
    fn test_initialize_appends_new_day_continuing_sno() {
        let yesterday = today().pred_opt().unwrap();
        let sheet = MemorySheet::with_rows(vec![
            AttendanceRow::absent(1, "Alice", yesterday),
            AttendanceRow::absent(2, "Bob", yesterday),
        ]);
        let mut ledger = Ledger::new(roster(), &sheet, today());
        assert_eq!(
            ledger.initialize_for_today().unwrap(),
            InitOutcome::Appended { rows: 2, last_sno: 2 }
        );

        let rows = sheet.rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2], AttendanceRow::absent(3, "Alice", today()));
        assert_eq!(rows[3], AttendanceRow::absent(4, "Bob", today()));
    }

    #[test]
    fn test_mark_present_updates_row() {
        let sheet = MemorySheet::new();
        let mut ledger = Ledger::new(roster(), &sheet, today());
        ledger.initialize_for_today().unwrap();

        let outcome = ledger.mark_present("Alice", at(9, 0, 1));
        assert_eq!(outcome, MarkOutcome::Marked { persisted: true });

        let rows = sheet.rows();
        assert_eq!(rows[0].status, Status::Present);
        assert_eq!(rows[0].time, Some(at(9, 0, 1)));
        assert_eq!(rows[1].status, Status::Absent);
    }

    #[test]
    fn test_mark_present_is_monotonic_and_idempotent() {
        let sheet = MemorySheet::new();
        let mut ledger = Ledger::new(roster(), &sheet, today());
        ledger.initialize_for_today().unwrap();

        ledger.mark_present("Alice", at(9, 0, 0));
        assert_eq!(ledger.mark_present("Alice", at(9, 5, 0)), MarkOutcome::AlreadyMarked);
        assert!(student(&ledger, "Alice").unwrap().alert_shown);
        assert_eq!(ledger.mark_present("Alice", at(9, 10, 0)), MarkOutcome::Suppressed);

        let alice = student(&ledger, "Alice").unwrap();
        assert!(alice.present);
        assert_eq!(alice.marked_time, Some(at(9, 0, 0)));
        // Only the creation and the first mark touched the sheet.
        assert_eq!(sheet.write_count(), 2);
        assert_eq!(sheet.rows()[0].time, Some(at(9, 0, 0)));
    }

    #[test]
    fn test_mark_unknown_name_does_not_mutate() {
        let sheet = MemorySheet::new();
        let mut ledger = Ledger::new(roster(), &sheet, today());
        ledger.initialize_for_today().unwrap();

        assert_eq!(ledger.mark_present("Mallory", at(9, 0, 0)), MarkOutcome::UnknownStudent);
        assert!(ledger.students.iter().all(|s| !s.present && !s.alert_shown));
        assert_eq!(sheet.write_count(), 1);
    }

    #[test]
    fn test_persistence_failure_keeps_memory_state() {
        let sheet = MemorySheet::new();
        let mut ledger = Ledger::new(roster(), &sheet, today());
        ledger.initialize_for_today().unwrap();
        sheet.set_fail_writes(true);

        assert_eq!(
            ledger.mark_present("Bob", at(10, 0, 0)),
            MarkOutcome::Marked { persisted: false }
        );
        assert!(student(&ledger, "Bob").unwrap().present);
        assert_eq!(sheet.rows()[1].status, Status::Absent);
    }

    #[test]
    fn test_missing_row_is_not_reported_persisted() {
        let sheet = MemorySheet::with_rows(vec![AttendanceRow::absent(1, "Alice", today())]);
        let mut ledger = Ledger::new(roster(), &sheet, today());
        ledger.initialize_for_today().unwrap();

        assert_eq!(
            ledger.mark_present("Bob", at(9, 0, 0)),
            MarkOutcome::Marked { persisted: false }
        );
        assert!(student(&ledger, "Bob").unwrap().present);
        assert_eq!(sheet.rows().len(), 1);
        assert_eq!(sheet.write_count(), 0);
    }

    #[test]
    fn test_restart_restores_present_students() {
        let sheet = MemorySheet::with_rows(vec![
            AttendanceRow {
                sno: 1,
                name: "Alice".into(),
                date: today(),
                status: Status::Present,
                time: Some(at(8, 59, 0)),
            },
            AttendanceRow::absent(2, "Bob", today()),
        ]);
        let mut ledger = Ledger::new(roster(), &sheet, today());
        ledger.initialize_for_today().unwrap();

        assert!(student(&ledger, "Alice").unwrap().present);
        assert_eq!(ledger.mark_present("Alice", at(9, 30, 0)), MarkOutcome::AlreadyMarked);
        assert_eq!(sheet.rows()[0].time, Some(at(8, 59, 0)));
    }

    #[test]
    fn test_load_today_is_read_only() {
        let sheet = MemorySheet::new();
        let mut ledger = Ledger::new(roster(), &sheet, today());
        assert_eq!(ledger.load_today().unwrap(), 0);
        assert!(!sheet.exists());
    }

    #[test]
    fn test_summary_and_absentees() {
        let sheet = MemorySheet::new();
        let mut ledger = Ledger::new(roster(), &sheet, today());
        ledger.initialize_for_today().unwrap();
        ledger.mark_present("Alice", at(9, 0, 0));

        let summary = ledger.summary();
        assert_eq!(summary.present, 1);
        assert_eq!(summary.absent, 1);
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.entries[0].index, 1);
        assert_eq!(summary.entries[0].time_label(), "09:00:00");
        assert_eq!(summary.entries[1].time_label(), "-");
        assert_eq!(summary.entries[1].status(), Status::Absent);

        let absent: Vec<_> = ledger.absentees().collect();
        assert_eq!(absent, [("Bob", "bob@example.com")]);
        // Restartable: a second call yields the same sequence.
        assert_eq!(ledger.absentees().count(), 1);
    }
}
