//! Record extractor for listing pages
//!
//! Walks the table rows of a listing page in document order and turns each
//! qualifying row into a [`PropertyRecord`]. Extraction never fails: rows
//! that do not qualify are skipped, and unrecognised markup yields an empty
//! sequence.

use crate::url::resolve_detail_link;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// Cells a row needs before it is considered
const MIN_CELLS: usize = 9;

/// Column holding the detail-view link
const LINK_COLUMN: usize = 8;

/// One extracted listing row
///
/// Serialized field names and order form the external JSON shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRecord {
    /// Serial number; always ASCII digits
    pub sl_no: String,
    /// Property id
    pub pid: String,
    pub ward: String,
    /// Locality
    pub mohalla: String,
    pub block_no: String,
    pub house_no: String,
    pub owner_name: String,
    /// Masked mobile number as shown on the page
    pub mobile_no: String,
    /// Absolute detail-view URL, or empty when the row has no link
    pub view_details_link: String,
}

/// Extracts property records from a raw listing page
///
/// # Row Rules
///
/// - Only `<tr>` rows with at least 9 `<td>` cells are considered
/// - The first cell, trimmed, must be one or more ASCII digits
/// - Cells 1-8 are copied as trimmed text in column order
/// - The 9th cell's first `<a href>` is resolved against `site_origin`
///
/// # Example
///
/// ```
/// use property_harvest::crawler::extract_records;
///
/// let html = r#"<table><tr>
///     <td>1</td><td>1/14/13117</td><td>WARD</td><td>MOHALLA</td><td>14</td>
///     <td>1</td><td>Mr. X</td><td>000****000</td><td><a href="/view/1">View</a></td>
/// </tr></table>"#;
/// let records = extract_records(html, "https://registry.example.org");
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].view_details_link, "https://registry.example.org/view/1");
/// ```
pub fn extract_records(html: &str, site_origin: &str) -> Vec<PropertyRecord> {
    let document = Html::parse_document(html);

    let (Ok(row_selector), Ok(cell_selector)) = (Selector::parse("tr"), Selector::parse("td"))
    else {
        return Vec::new();
    };

    document
        .select(&row_selector)
        .filter_map(|row| {
            let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
            extract_row(&cells, site_origin)
        })
        .collect()
}

/// Builds a record from one row's cells, or `None` if the row does not qualify
fn extract_row(cells: &[ElementRef], site_origin: &str) -> Option<PropertyRecord> {
    if cells.len() < MIN_CELLS {
        return None;
    }

    let sl_no = cell_text(&cells[0]);
    if !is_serial_number(&sl_no) {
        return None;
    }

    let view_details_link = detail_href(&cells[LINK_COLUMN])
        .map(|href| resolve_detail_link(site_origin, href))
        .unwrap_or_default();

    Some(PropertyRecord {
        sl_no,
        pid: cell_text(&cells[1]),
        ward: cell_text(&cells[2]),
        mohalla: cell_text(&cells[3]),
        block_no: cell_text(&cells[4]),
        house_no: cell_text(&cells[5]),
        owner_name: cell_text(&cells[6]),
        mobile_no: cell_text(&cells[7]),
        view_details_link,
    })
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// `^\d+$` over ASCII digits
fn is_serial_number(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn detail_href<'a>(cell: &ElementRef<'a>) -> Option<&'a str> {
    let link_selector = Selector::parse("a[href]").ok()?;
    cell.select(&link_selector)
        .next()
        .and_then(|link| link.value().attr("href"))
}
