//! Console attendance table.

use crate::ledger::Summary;
use crate::sheet::DATE_FORMAT;
use std::fmt::Write;

const RULE_WIDTH: usize = 60;

/// Render the summary table shown by the `d` key, at session end and by `rollcall status`.
pub fn render_summary(summary: &Summary) -> String {
    let rule = "-".repeat(RULE_WIDTH);
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(out, "\n=== Current Attendance Status ===");
    let _ = writeln!(out, "Date: {}", summary.date.format(DATE_FORMAT));
    let _ = writeln!(out, "\nStudent List:");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{:<5} {:<15} {:<10} {:<10}", "S.No", "Name", "Status", "Time");
    let _ = writeln!(out, "{rule}");
    for entry in &summary.entries {
        let _ = writeln!(
            out,
            "{:<5} {:<15} {:<10} {:<10}",
            entry.index,
            entry.name,
            entry.status(),
            entry.time_label()
        );
    }
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Total Students: {}", summary.total());
    let _ = writeln!(out, "Present: {}", summary.present);
    let _ = write!(out, "Absent: {}", summary.absent);
    out
}

pub fn print_summary(summary: &Summary) {
    println!("{}", render_summary(summary));
}
