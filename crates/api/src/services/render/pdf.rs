//! PDF renderer.
//!
//! Layout is computed up front: the document is flattened into blocks,
//! blocks are paginated with table headers repeated on continuation pages,
//! and only then drawn. All rows are held in memory for this, which is why
//! itemized output is capped upstream.

use domain::models::ReportDocument;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point, Rgb,
};

use super::{
    header_lines, item_table, omitted_note, summary_cards, summary_tables, Cell, RenderError,
    Table, NO_DATA_MESSAGE,
};

// A4 landscape so the itemized table fits.
const PAGE_WIDTH: f32 = 297.0;
const PAGE_HEIGHT: f32 = 210.0;
const MARGIN: f32 = 15.0;
const FOOTER: f32 = 10.0;
const TABLE_FONT_SIZE: f32 = 8.0;

/// Vertical space available for blocks on one page, in millimetres.
pub(crate) const USABLE_HEIGHT: f32 = PAGE_HEIGHT - 2.0 * MARGIN - FOOTER;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Block {
    Title(String),
    Text(String),
    Cards(Vec<(String, String)>),
    Heading(String),
    TableHeader(Vec<String>),
    Row(Vec<String>),
    Note(String),
    Gap,
}

impl Block {
    fn height(&self) -> f32 {
        match self {
            Block::Title(_) => 12.0,
            Block::Text(_) => 5.5,
            Block::Cards(_) => 22.0,
            Block::Heading(_) => 9.0,
            Block::TableHeader(_) => 7.0,
            Block::Row(_) => 6.0,
            Block::Note(_) => 6.0,
            Block::Gap => 4.0,
        }
    }

    /// Space that must stay free after this block so it is not orphaned.
    fn keep_with_next(&self) -> f32 {
        match self {
            Block::Heading(_) => {
                Block::TableHeader(Vec::new()).height() + Block::Row(Vec::new()).height()
            }
            Block::TableHeader(_) => Block::Row(Vec::new()).height(),
            _ => 0.0,
        }
    }
}

fn push_table(blocks: &mut Vec<Block>, table: &Table) {
    blocks.push(Block::Gap);
    blocks.push(Block::Heading(table.title.clone()));
    blocks.push(Block::TableHeader(table.headers.clone()));
    blocks.extend(
        table
            .rows
            .iter()
            .map(|row| Block::Row(row.iter().map(Cell::display).collect())),
    );
}

/// Flatten a document into drawable blocks.
pub(crate) fn blocks(document: &ReportDocument, organization: &str) -> Vec<Block> {
    let mut blocks = vec![Block::Title(document.title.clone())];
    blocks.extend(
        header_lines(document, organization)
            .into_iter()
            .skip(1)
            .map(|(label, value)| Block::Text(format!("{}: {}", label, value))),
    );
    blocks.push(Block::Gap);

    if document.is_empty() {
        blocks.push(Block::Note(NO_DATA_MESSAGE.to_string()));
        return blocks;
    }

    blocks.push(Block::Cards(
        summary_cards(document)
            .into_iter()
            .map(|(label, value)| (label.to_string(), value.display()))
            .collect(),
    ));

    for table in summary_tables(document) {
        push_table(&mut blocks, &table);
    }

    if let Some(table) = item_table(document) {
        push_table(&mut blocks, &table);
        if let Some(note) = omitted_note(document) {
            blocks.push(Block::Note(note));
        }
    }

    blocks
}

/// Split blocks into pages of at most `usable` millimetres.
///
/// A table row that spills onto a new page is preceded by its table header
/// again. Gaps are dropped at the top of a page.
pub(crate) fn paginate(blocks: Vec<Block>, usable: f32) -> Vec<Vec<Block>> {
    let mut pages = Vec::new();
    let mut page: Vec<Block> = Vec::new();
    let mut used = 0.0;
    let mut current_header: Option<Block> = None;

    for block in blocks {
        match &block {
            Block::TableHeader(_) => current_header = Some(block.clone()),
            Block::Row(_) | Block::Note(_) => {}
            _ => current_header = None,
        }

        let needed = block.height() + block.keep_with_next();
        if used + needed > usable && !page.is_empty() {
            pages.push(std::mem::take(&mut page));
            used = 0.0;

            if block == Block::Gap {
                continue;
            }
            if let (Block::Row(_), Some(header)) = (&block, &current_header) {
                used += header.height();
                page.push(header.clone());
            }
        }

        used += block.height();
        page.push(block);
    }

    if !page.is_empty() || pages.is_empty() {
        pages.push(page);
    }
    pages
}

fn column_widths(columns: usize) -> Vec<f32> {
    let width = PAGE_WIDTH - 2.0 * MARGIN;
    if columns == 4 {
        return vec![width * 0.46, width * 0.16, width * 0.22, width * 0.16];
    }
    vec![width / columns.max(1) as f32; columns]
}

/// Truncate to what fits in `width_mm` at `font_size` points.
fn fit(text: &str, width_mm: f32, font_size: f32) -> String {
    // Helvetica averages about half an em per glyph; 1pt = 0.3528mm.
    let max_chars = (width_mm / (font_size * 0.3528 * 0.5)).floor() as usize;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn rule(layer: &PdfLayerReference, y: f32) {
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(MARGIN), Mm(y)), false),
            (Point::new(Mm(PAGE_WIDTH - MARGIN), Mm(y)), false),
        ],
        is_closed: false,
    });
}

/// One line of text at the left margin.
fn draw_line(layer: &PdfLayerReference, text: &str, size: f32, y: f32, font: &IndirectFontRef) {
    layer.use_text(text, size, Mm(MARGIN), Mm(y), font);
}

fn draw_row(layer: &PdfLayerReference, cells: &[String], y: f32, font: &IndirectFontRef) {
    let widths = column_widths(cells.len());
    let mut x = MARGIN;
    for (cell, width) in cells.iter().zip(widths) {
        layer.use_text(
            fit(cell, width - 1.5, TABLE_FONT_SIZE),
            TABLE_FONT_SIZE,
            Mm(x),
            Mm(y),
            font,
        );
        x += width;
    }
}

fn draw_cards(layer: &PdfLayerReference, cards: &[(String, String)], top: f32, fonts: &Fonts) {
    let count = cards.len().max(1) as f32;
    let gap = 4.0;
    let width = (PAGE_WIDTH - 2.0 * MARGIN - gap * (count - 1.0)) / count;
    let bottom = top - 18.0;

    for (i, (label, value)) in cards.iter().enumerate() {
        let left = MARGIN + i as f32 * (width + gap);
        layer.add_line(Line {
            points: vec![
                (Point::new(Mm(left), Mm(bottom)), false),
                (Point::new(Mm(left + width), Mm(bottom)), false),
                (Point::new(Mm(left + width), Mm(top)), false),
                (Point::new(Mm(left), Mm(top)), false),
            ],
            is_closed: true,
        });
        layer.use_text(label.as_str(), 8.0, Mm(left + 3.0), Mm(top - 6.0), &fonts.regular);
        layer.use_text(value.as_str(), 14.0, Mm(left + 3.0), Mm(top - 14.0), &fonts.bold);
    }
}

fn draw_page(layer: &PdfLayerReference, blocks: &[Block], fonts: &Fonts, footer: &str) {
    layer.set_outline_color(Color::Rgb(Rgb::new(0.75, 0.75, 0.75, None)));
    layer.set_outline_thickness(0.5);

    let mut top = PAGE_HEIGHT - MARGIN;
    for block in blocks {
        let bottom = top - block.height();
        let baseline = bottom + 1.5;
        match block {
            Block::Title(text) => draw_line(layer, text, 18.0, baseline, &fonts.bold),
            Block::Text(text) => draw_line(layer, text, 9.0, baseline, &fonts.regular),
            Block::Cards(cards) => draw_cards(layer, cards, top - 2.0, fonts),
            Block::Heading(text) => draw_line(layer, text, 12.0, baseline, &fonts.bold),
            Block::TableHeader(cells) => {
                draw_row(layer, cells, baseline, &fonts.bold);
                rule(layer, bottom);
            }
            Block::Row(cells) => draw_row(layer, cells, baseline, &fonts.regular),
            Block::Note(text) => draw_line(layer, text, 9.0, baseline, &fonts.regular),
            Block::Gap => {}
        }
        top = bottom;
    }

    layer.use_text(footer, 8.0, Mm(MARGIN), Mm(MARGIN / 2.0), &fonts.regular);
}

pub fn render(document: &ReportDocument, organization: &str) -> Result<Vec<u8>, RenderError> {
    let pages = paginate(blocks(document, organization), USABLE_HEIGHT);
    let page_count = pages.len();

    let (doc, first_page, first_layer) = PdfDocument::new(
        document.title.as_str(),
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let pdf_error = |e: printpdf::Error| RenderError::Pdf(e.to_string());
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_error)?,
    };

    for (index, blocks) in pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            doc.get_page(page).get_layer(layer)
        };
        let footer = format!("{}  |  Page {} of {}", organization, index + 1, page_count);
        draw_page(&layer, blocks, &fonts, &footer);
    }

    doc.save_to_bytes().map_err(pdf_error)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::summary_tables;
    use super::*;

    fn page_height(page: &[Block]) -> f32 {
        page.iter().map(Block::height).sum()
    }

    #[test]
    fn test_blocks_carry_shared_table_values() {
        let doc = document(items(), false, 100);
        let blocks = blocks(&doc, "Acme");
        let expected: Vec<String> = summary_tables(&doc)[0].rows[0]
            .iter()
            .map(Cell::display)
            .collect();
        assert!(blocks.contains(&Block::Row(expected)));
        assert!(blocks.contains(&Block::Text("Organization: Acme".to_string())));
    }

    #[test]
    fn test_pagination_repeats_table_header() {
        let many: Vec<_> = (0..120)
            .map(|i| item(&format!("A-{}", i), "Deployed", "Laptop", 100))
            .collect();
        let doc = document(many, true, 500);
        let pages = paginate(blocks(&doc, "Acme"), USABLE_HEIGHT);

        assert!(pages.len() > 3);
        for page in &pages {
            assert!(page_height(page) <= USABLE_HEIGHT + f32::EPSILON);
        }
        for page in pages.iter().skip(1) {
            if matches!(page.first(), Some(Block::Row(_))) {
                panic!("continuation page starts with a row and no header");
            }
        }
        let rows: usize = pages
            .iter()
            .flatten()
            .filter(|b| matches!(b, Block::Row(_)))
            .count();
        // one summary row plus every itemized row, nothing lost or duplicated
        assert_eq!(rows, 1 + 120);
    }

    #[test]
    fn test_heading_not_orphaned() {
        let filler = vec![Block::Row(vec!["x".into()]); 24];
        let mut input = filler;
        input.push(Block::Heading("By Status".into()));
        input.push(Block::TableHeader(vec!["Status".into()]));
        input.push(Block::Row(vec!["Deployed".into()]));

        let pages = paginate(input, 150.0);
        let last = pages.last().unwrap();
        assert_eq!(last.first(), Some(&Block::Heading("By Status".into())));
    }

    #[test]
    fn test_fit_truncates_long_text() {
        assert_eq!(fit("short", 30.0, 8.0), "short");
        let long = "A very long asset name that will not fit";
        let fitted = fit(long, 20.0, 8.0);
        assert!(fitted.ends_with("..."));
        assert!(fitted.chars().count() < long.chars().count());
    }

    #[test]
    fn test_empty_document_renders_single_page() {
        let doc = document(Vec::new(), true, 100);
        let pages = paginate(blocks(&doc, "Acme"), USABLE_HEIGHT);
        assert_eq!(pages.len(), 1);
        assert!(pages[0].contains(&Block::Note(NO_DATA_MESSAGE.to_string())));
    }

    #[test]
    fn test_render_produces_pdf_bytes() {
        let doc = document(items(), true, 100);
        let bytes = render(&doc, "Acme").unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
