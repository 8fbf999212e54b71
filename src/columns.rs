use scraper::ElementRef;

use crate::node::Node;
use crate::torrent::TorrentField;

/// The fields a tabular listing can place in columns. Everything else must
/// come from an explicit field rule.
pub(crate) const TABULAR_FIELDS: [TorrentField; 8] = [
    TorrentField::Time,
    TorrentField::Size,
    TorrentField::Seeders,
    TorrentField::Leechers,
    TorrentField::Completed,
    TorrentField::Comments,
    TorrentField::Author,
    TorrentField::Category,
];

/// Class marking an icon-only category column.
const CATEGORY_MARKER: &str = "torrents-icon";

/// Column positions of the tabular fields, inferred once per document from
/// the header cells and discarded afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnIndex {
    time: Option<usize>,
    size: Option<usize>,
    seeders: Option<usize>,
    leechers: Option<usize>,
    completed: Option<usize>,
    comments: Option<usize>,
    author: Option<usize>,
    category: Option<usize>,
}

impl ColumnIndex {
    /// Infers column positions from the header cells of a listing table.
    ///
    /// Sortable headers link to their sort key, which is what the hints look
    /// for. Unclaimed columns fall back to the layout most trackers share:
    /// author in the last column, category in the first. A hint claiming the
    /// last column withdraws the author fallback; the category fallback
    /// moves only when a cell carries the icon-column marker class.
    pub fn from_header(cells: &[Node<'_>]) -> Self {
        let mut index = ColumnIndex::default();
        if cells.is_empty() {
            return index;
        }
        index.author = Some(cells.len() - 1);
        index.category = Some(0);

        for (i, cell) in cells.iter().enumerate() {
            let claimed = if has_hint(cell, "a[href*='comment']") {
                index.comments = Some(i);
                true
            } else if has_hint(cell, "a[href*='age']") {
                index.time = Some(i);
                true
            } else if has_hint(cell, "a[href*='size']") {
                index.size = Some(i);
                true
            } else if has_hint(cell, "a[href*='seed']") {
                index.seeders = Some(i);
                true
            } else if has_hint(cell, "a[href*='leech']") {
                index.leechers = Some(i);
                true
            } else if has_hint(cell, "a[href*='complete']") {
                index.completed = Some(i);
                true
            } else if is_category_marker(cell) {
                index.category = Some(i);
                true
            } else {
                false
            };

            if claimed && index.author == Some(i) {
                index.author = None;
            }
        }
        index
    }

    /// Column position of a tabular field, if any.
    pub fn get(&self, field: TorrentField) -> Option<usize> {
        match field {
            TorrentField::Time => self.time,
            TorrentField::Size => self.size,
            TorrentField::Seeders => self.seeders,
            TorrentField::Leechers => self.leechers,
            TorrentField::Completed => self.completed,
            TorrentField::Comments => self.comments,
            TorrentField::Author => self.author,
            TorrentField::Category => self.category,
            _ => None,
        }
    }
}

fn has_hint(cell: &Node<'_>, locator: &str) -> bool {
    cell.select(locator)
        .map(|hits| !hits.is_empty())
        .unwrap_or(false)
}

fn is_category_marker(cell: &Node<'_>) -> bool {
    cell.as_element()
        .map(|el| el.value().classes().any(|class| class == CATEGORY_MARKER))
        .unwrap_or(false)
}

/// Direct `td` children of a table row, in order; `th` cells too when asked,
/// for header rows. Cells of nested tables are not included.
pub(crate) fn direct_cells(row: Node<'_>, with_headers: bool) -> Vec<Node<'_>> {
    let el = match row.as_element() {
        Some(el) => el,
        None => return Vec::new(),
    };
    el.children()
        .filter_map(ElementRef::wrap)
        .filter(|child| {
            let name = child.value().name();
            name == "td" || (with_headers && name == "th")
        })
        .map(Node::Html)
        .collect()
}

/// Reads a column-mapped field off its cell.
///
/// Upload times usually sit in a tooltip (`span[title]`) while the cell text
/// shows a humanized age, so the tooltip wins when present.
pub(crate) fn cell_value(field: TorrentField, cell: Node<'_>) -> String {
    if field == TorrentField::Time {
        let tooltip = cell
            .select("span[title]")
            .ok()
            .and_then(|hits| hits.first().and_then(|node| node.attr("title")));
        if let Some(tooltip) = tooltip {
            return tooltip;
        }
    }
    cell.text()
}
