//! CSV export of the energy invoice list.

use chrono::NaiveDate;

use crate::confidence::overall_confidence;
use crate::models::InvoiceWithDocument;

pub const CSV_HEADERS: [&str; 7] = [
    "Invoice Date",
    "Billing Period Start",
    "Billing Period End",
    "Reading Type",
    "kWh Used",
    "Confidence",
    "Status",
];

/// Render a snapshot of invoices as CSV, one row per invoice in the given order.
/// Unset values are empty cells.
pub fn invoices_csv(invoices: &[InvoiceWithDocument]) -> String {
    let mut out = String::new();
    push_row(&mut out, CSV_HEADERS.iter().map(|h| h.to_string()));
    for entry in invoices {
        let inv = &entry.invoice;
        push_row(
            &mut out,
            [
                date_cell(inv.invoice_date),
                date_cell(inv.billing_period_start),
                date_cell(inv.billing_period_end),
                inv.reading_type.to_string(),
                inv.kwh_used.map(|k| k.to_string()).unwrap_or_default(),
                overall_confidence(&inv.field_confidences())
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
                entry.document.status.to_string(),
            ]
            .into_iter(),
        );
    }
    out
}

/// `energy-invoices-YYYY-MM-DD.csv`
pub fn export_filename(today: NaiveDate) -> String {
    format!("energy-invoices-{}.csv", today.format("%Y-%m-%d"))
}

fn date_cell(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>) {
    let line = cells.map(|c| escape(&c)).collect::<Vec<_>>().join(",");
    out.push_str(&line);
    out.push('\n');
}

fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::db::repository::document::tests::make_document;
    use crate::db::repository::energy_invoice::tests::make_invoice;
    use crate::db::{list_invoices_with_documents, update_status_if};
    use crate::models::enums::{DocumentStatus, DocumentType};

    #[test]
    fn header_only_for_empty_list() {
        assert_eq!(
            invoices_csv(&[]),
            "Invoice Date,Billing Period Start,Billing Period End,Reading Type,kWh Used,Confidence,Status\n"
        );
    }

    #[test]
    fn rows_carry_overall_confidence_and_document_status() {
        let conn = open_memory_database().unwrap();
        let doc = make_document(&conn, DocumentType::Energy);
        make_invoice(&conn, doc.id, [70, 80, 91]);
        update_status_if(
            &conn,
            &doc.id,
            &[DocumentStatus::Uploaded],
            DocumentStatus::Processing,
            None,
        )
        .unwrap();

        let invoices = list_invoices_with_documents(&conn).unwrap();
        let csv = invoices_csv(&invoices);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            "2026-03-01,2026-02-01,2026-02-28,Estimated,412.5,80,processing"
        );
    }

    #[test]
    fn cells_with_separators_are_quoted() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn filename_is_dated() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        assert_eq!(export_filename(day), "energy-invoices-2026-10-16.csv");
    }
}
