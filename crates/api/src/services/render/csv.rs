//! CSV renderer: UTF-8, comma-delimited, a header row per table and a
//! blank line between blocks.

use domain::models::ReportDocument;

use super::{
    header_lines, item_table, omitted_note, summary_cards, summary_tables, Cell, Table,
    NO_DATA_MESSAGE,
};

/// Quote a field when it contains a delimiter, quote or line break.
pub fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_record<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    let line = fields
        .iter()
        .map(|f| escape(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push_str("\r\n");
}

fn push_table(out: &mut String, table: &Table) {
    out.push_str("\r\n");
    push_record(out, &[table.title.as_str()]);
    push_record(out, &table.headers[..]);
    for row in &table.rows {
        let fields: Vec<String> = row.iter().map(Cell::display).collect();
        push_record(out, &fields[..]);
    }
}

pub fn render(document: &ReportDocument, organization: &str) -> Vec<u8> {
    let mut out = String::new();

    for (label, value) in header_lines(document, organization) {
        push_record(&mut out, &[label, value]);
    }

    if document.is_empty() {
        out.push_str("\r\n");
        push_record(&mut out, &[NO_DATA_MESSAGE]);
        return out.into_bytes();
    }

    out.push_str("\r\n");
    push_record(&mut out, &["Summary"]);
    for (label, value) in summary_cards(document) {
        push_record(&mut out, &[label.to_string(), value.display()]);
    }

    for table in summary_tables(document) {
        push_table(&mut out, &table);
    }

    if let Some(table) = item_table(document) {
        push_table(&mut out, &table);
        if let Some(note) = omitted_note(document) {
            push_record(&mut out, &[note]);
        }
    }

    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;

    fn lines(bytes: Vec<u8>) -> Vec<String> {
        String::from_utf8(bytes)
            .unwrap()
            .split("\r\n")
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("HQ, Floor 2"), "\"HQ, Floor 2\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_summary_rows_match_projection() {
        let doc = document(items(), false, 100);
        let out = lines(render(&doc, "Acme"));

        let header_at = out
            .iter()
            .position(|l| l == "Status,Count,Total Value,Percentage")
            .unwrap();
        assert_eq!(out[header_at - 1], "By Status");
        assert_eq!(out[header_at + 1], "Deployed,2,2500.00,66.67");
        assert_eq!(out[header_at + 2], "Ready,1,300.00,33.33");
        assert!(out.contains(&"Total Items,3".to_string()));
        assert!(out.contains(&"Organization,Acme".to_string()));
        assert!(!out.contains(&"Items".to_string()));
    }

    #[test]
    fn test_itemized_rows_are_escaped_and_capped() {
        let doc = document(items(), true, 2);
        let out = lines(render(&doc, "Acme"));

        assert!(out.iter().any(|l| l.starts_with("Reference,Name,Status")));
        let first = concat!(
            "A-1,Laptop A-1,Deployed,Laptop,",
            "\"HQ, Floor 2\",,Engineering,,1200.00,,2024-03-01"
        );
        assert!(out.iter().any(|l| l == first));
        assert!(out.contains(&"1 more row omitted".to_string()));
        assert!(!out.iter().any(|l| l.starts_with("A-3,")));
    }

    #[test]
    fn test_empty_result_renders_no_data() {
        let doc = document(Vec::new(), true, 100);
        let out = lines(render(&doc, "Acme"));
        assert!(out.contains(&NO_DATA_MESSAGE.to_string()));
        assert!(!out.iter().any(|l| l.starts_with("Status,Count")));
    }
}
