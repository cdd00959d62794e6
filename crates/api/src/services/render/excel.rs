//! Spreadsheet renderer: a summary sheet plus an optional itemized sheet.

use domain::models::ReportDocument;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use super::{
    header_lines, item_table, omitted_note, summary_cards, summary_tables, Cell, Table,
    NO_DATA_MESSAGE,
};

struct Styles {
    bold: Format,
    money: Format,
    percent: Format,
}

impl Styles {
    fn new() -> Self {
        Self {
            bold: Format::new().set_bold(),
            money: Format::new().set_num_format("#,##0.00"),
            percent: Format::new().set_num_format("0.00"),
        }
    }
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    styles: &Styles,
) -> Result<(), XlsxError> {
    match (cell, cell.number()) {
        (Cell::Money(_), Some(n)) => {
            sheet.write_number_with_format(row, col, n, &styles.money)?;
        }
        (Cell::Percent(_), Some(n)) => {
            sheet.write_number_with_format(row, col, n, &styles.percent)?;
        }
        (_, Some(n)) => {
            sheet.write_number(row, col, n)?;
        }
        (_, None) => {
            sheet.write_string(row, col, cell.display())?;
        }
    }
    Ok(())
}

/// Write `table` starting at `row`; returns the first row after it.
fn write_table(
    sheet: &mut Worksheet,
    mut row: u32,
    table: &Table,
    styles: &Styles,
) -> Result<u32, XlsxError> {
    sheet.write_string_with_format(row, 0, &table.title, &styles.bold)?;
    row += 1;
    for (col, header) in table.headers.iter().enumerate() {
        sheet.write_string_with_format(row, col as u16, header, &styles.bold)?;
    }
    row += 1;
    for cells in &table.rows {
        for (col, cell) in cells.iter().enumerate() {
            write_cell(sheet, row, col as u16, cell, styles)?;
        }
        row += 1;
    }
    Ok(row)
}

pub fn render(document: &ReportDocument, organization: &str) -> Result<Vec<u8>, XlsxError> {
    let styles = Styles::new();
    let mut workbook = Workbook::new();

    let summary = workbook.add_worksheet();
    summary.set_name("Summary")?;
    summary.set_column_width(0, 32)?;
    summary.set_column_width(1, 18)?;
    summary.set_column_width(2, 16)?;
    summary.set_column_width(3, 12)?;

    let mut row = 0u32;
    for (label, value) in header_lines(document, organization) {
        summary.write_string_with_format(row, 0, label, &styles.bold)?;
        summary.write_string(row, 1, value)?;
        row += 1;
    }
    row += 1;

    if document.is_empty() {
        summary.write_string(row, 0, NO_DATA_MESSAGE)?;
        return workbook.save_to_buffer();
    }

    for (label, value) in summary_cards(document) {
        summary.write_string_with_format(row, 0, label, &styles.bold)?;
        write_cell(summary, row, 1, &value, &styles)?;
        row += 1;
    }

    for table in summary_tables(document) {
        row = write_table(summary, row + 1, &table, &styles)?;
    }

    if let Some(table) = item_table(document) {
        let items = workbook.add_worksheet();
        items.set_name("Items")?;
        items.set_freeze_panes(2, 0)?;
        let next = write_table(items, 0, &table, &styles)?;
        if let Some(note) = omitted_note(document) {
            items.write_string(next, 0, note)?;
        }
    }

    workbook.save_to_buffer()
}
