// Ledger Report Export
//
// Renders a table as a SpreadsheetML 2003 workbook that spreadsheet
// applications open directly. Rows are filled by their `Status` cell.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::{ColumnType, Table};
use crate::ledger::{RecordStatus, STATUS};

pub const WORKSHEET_NAME: &str = "Ledger";

/// Row fill colors, as `#RRGGBB` (a bare `RRGGBB` is accepted too).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportStyle {
    pub new_fill: String,
    pub replaced_fill: String,
}

impl Default for ReportStyle {
    fn default() -> Self {
        Self {
            new_fill: "#90EE90".into(),
            replaced_fill: "#D3D3D3".into(),
        }
    }
}

/// Render `table` and write it to `path`.
pub fn write_report(table: &Table, path: &Path, style: &ReportStyle) -> io::Result<()> {
    fs::write(path, render_report(table, style))?;
    log::info!("exported {} rows to {}", table.len(), path.display());
    Ok(())
}

pub fn render_report(table: &Table, style: &ReportStyle) -> String {
    let status_col = table.column_index(STATUS);
    let mut out = String::new();

    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<?mso-application progid=\"Excel.Sheet\"?>\n");
    out.push_str(
        "<Workbook xmlns=\"urn:schemas-microsoft-com:office:spreadsheet\" \
         xmlns:ss=\"urn:schemas-microsoft-com:office:spreadsheet\">\n",
    );
    out.push_str(" <Styles>\n");
    out.push_str("  <Style ss:ID=\"header\"><Font ss:Bold=\"1\"/></Style>\n");
    push_fill(&mut out, "new", &style.new_fill);
    push_fill(&mut out, "replaced", &style.replaced_fill);
    out.push_str(" </Styles>\n");
    out.push_str(&format!(" <Worksheet ss:Name=\"{WORKSHEET_NAME}\">\n"));
    out.push_str("  <Table>\n");

    out.push_str("   <Row ss:StyleID=\"header\">");
    for name in table.columns() {
        push_cell(&mut out, "String", name);
    }
    out.push_str("</Row>\n");

    for row in table.rows() {
        let row_style = status_col.and_then(|c| style_id(&RecordStatus::from(row[c].as_str())));
        match row_style {
            Some(id) => out.push_str(&format!("   <Row ss:StyleID=\"{id}\">")),
            None => out.push_str("   <Row>"),
        }
        for (value, ty) in row.iter().zip(table.types()) {
            push_cell(&mut out, cell_type(*ty, value), value);
        }
        out.push_str("</Row>\n");
    }

    out.push_str("  </Table>\n");
    out.push_str(" </Worksheet>\n");
    out.push_str("</Workbook>\n");
    out
}

fn style_id(status: &RecordStatus) -> Option<&'static str> {
    match status {
        RecordStatus::New => Some("new"),
        RecordStatus::Replaced => Some("replaced"),
        RecordStatus::Other(_) => None,
    }
}

fn push_fill(out: &mut String, id: &str, color: &str) {
    let color = color.trim();
    let hash = if color.starts_with('#') { "" } else { "#" };
    out.push_str(&format!(
        "  <Style ss:ID=\"{id}\"><Interior ss:Color=\"{hash}{}\" ss:Pattern=\"Solid\"/></Style>\n",
        escape(color)
    ));
}

fn cell_type(ty: ColumnType, value: &str) -> &'static str {
    let numeric = match ty {
        ColumnType::Integer => value.trim().parse::<i64>().is_ok(),
        ColumnType::Float => value.trim().parse::<f64>().map_or(false, f64::is_finite),
        _ => false,
    };
    if numeric {
        "Number"
    } else {
        "String"
    }
}

fn push_cell(out: &mut String, kind: &str, value: &str) {
    out.push_str(&format!(
        "<Cell><Data ss:Type=\"{kind}\">{}</Data></Cell>",
        escape(value)
    ));
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\n' => escaped.push_str("&#10;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::empty_ledger;

    fn row(status: &str, id: &str, path: &str) -> Vec<String> {
        [status, id, path, "run.csv", "2025-01-15 12:20:24", "2025-01-15 12:30:00"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn ledger_table() -> Table {
        let mut table = empty_ledger().unwrap();
        table
            .push_row(row("Replaced", "00000000-0000-0000-0000-000000000000", "/data/a&b.csv"))
            .unwrap();
        table
            .push_row(row("New", "00000000-0000-0000-0000-000000000001", "/data/c.csv"))
            .unwrap();
        table
            .push_row(row("Archived", "00000000-0000-0000-0000-000000000002", "/data/d.csv"))
            .unwrap();
        table
    }

    #[test]
    fn rows_are_styled_by_status() {
        let xml = render_report(&ledger_table(), &ReportStyle::default());

        assert!(xml.contains("ss:ID=\"new\"><Interior ss:Color=\"#90EE90\""));
        assert!(xml.contains("ss:ID=\"replaced\"><Interior ss:Color=\"#D3D3D3\""));
        assert_eq!(xml.matches("<Row ss:StyleID=\"replaced\">").count(), 1);
        assert_eq!(xml.matches("<Row ss:StyleID=\"new\">").count(), 1);
        // Unknown status stays unstyled.
        assert_eq!(xml.matches("<Row>").count(), 1);
    }

    #[test]
    fn header_and_text_are_escaped() {
        let xml = render_report(&ledger_table(), &ReportStyle::default());
        assert!(xml.contains("<Data ss:Type=\"String\">Original File Path</Data>"));
        assert!(xml.contains("/data/a&amp;b.csv"));
        assert!(!xml.contains("a&b"));
    }

    #[test]
    fn bare_hex_colors_get_a_hash() {
        let style = ReportStyle {
            new_fill: "00FF00".into(),
            replaced_fill: "#808080".into(),
        };
        let xml = render_report(&ledger_table(), &style);
        assert!(xml.contains("ss:Color=\"#00FF00\""));
        assert!(xml.contains("ss:Color=\"#808080\""));
    }

    #[test]
    fn numeric_columns_export_as_numbers() {
        let mut table = Table::new(
            vec!["n".into(), "label".into()],
            vec![ColumnType::Integer, ColumnType::Text],
        )
        .unwrap();
        table.push_row(vec!["42".into(), "x".into()]).unwrap();

        let xml = render_report(&table, &ReportStyle::default());
        assert!(xml.contains("<Data ss:Type=\"Number\">42</Data>"));
        assert_eq!(xml.matches("<Row>").count(), 1);
    }

    #[test]
    fn report_is_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tag_id.xml");
        write_report(&ledger_table(), &out, &ReportStyle::default()).unwrap();
        assert!(fs::read_to_string(&out).unwrap().starts_with("<?xml"));
    }
}
