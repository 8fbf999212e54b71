use fnv::FnvHashMap;
use log::warn;
use scraper::Html;
use serde_json::Value;

use crate::category;
use crate::columns::{self, ColumnIndex, TABULAR_FIELDS};
use crate::error::SchleppnetzError;
use crate::filter::{FilterContext, FilterRegistry};
use crate::node::{Node, Page, SELF_SELECTOR};
use crate::resolve::resolve_field;
use crate::schema::{CategoryRules, FieldSpec, ListSchema, NOT_APPLICABLE};
use crate::torrent::{Torrent, TorrentField};
use crate::tracker::SiteContext;
use crate::user::{UserField, UserInfo};

/// Result of one extraction call.
///
/// Failures along the way never abort the call; they surface here as a
/// diagnostic next to whatever was still extracted. An empty record list
/// without a diagnostic means the page legitimately listed nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<T> {
    /// Records in document order.
    pub records: Vec<T>,
    /// Human-readable account of what could not be read.
    pub diagnostic: Option<String>,
}

impl<T> Extraction<T> {
    pub(crate) fn only_diagnostic(diagnostic: impl Into<String>) -> Self {
        Extraction {
            records: Vec::new(),
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn into_records(self) -> Vec<T> {
        self.records
    }
}

impl<T> Default for Extraction<T> {
    fn default() -> Self {
        Extraction {
            records: Vec::new(),
            diagnostic: None,
        }
    }
}

impl<T> IntoIterator for Extraction<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Assembles the torrent records of a search-results listing.
pub(crate) fn torrents(
    page: &Page,
    schema: &ListSchema,
    registry: &FilterRegistry,
    ctx: &FilterContext<'_>,
) -> Extraction<Torrent> {
    let root = page.root();
    let site = &ctx.site.name;

    let mut rows = match row_nodes(root, &schema.rows.selector) {
        Ok(rows) => rows,
        Err(err) => {
            warn!("[{}] row selector rejected: {}", site, err);
            return Extraction::only_diagnostic(format!("[{}] {}", site, err));
        }
    };
    if rows.is_empty() {
        let err = SchleppnetzError::RowsNotFound {
            site: site.clone(),
            selector: schema.rows.selector.clone(),
        };
        return Extraction::only_diagnostic(err.to_string());
    }

    // Column inference runs only when the schema leaves tabular fields
    // unmapped, and only tree documents have columns to begin with.
    let mut columns = ColumnIndex::default();
    if needs_inference(schema) && matches!(page, Page::Html(_)) {
        match &schema.header {
            Some(locator) => {
                if let Ok(headers) = root.select(locator) {
                    if let Some(header) = headers.first() {
                        columns =
                            ColumnIndex::from_header(&columns::direct_cells(*header, true));
                    }
                }
            }
            // Without a header locator the first candidate row is the
            // header; it never becomes a record.
            None => {
                columns = ColumnIndex::from_header(&columns::direct_cells(rows[0], true));
                rows.remove(0);
            }
        }
    }

    if let Some(slice) = &schema.rows.filter {
        rows = slice.apply(rows);
    }

    let mut merge = schema.rows.merge.max(1);
    if merge > 1 && matches!(page, Page::Json(_)) {
        warn!("[{}] row merge of {} ignored for json documents", site, merge);
        merge = 1;
    }

    let mut extraction = Extraction::default();
    for chunk in rows.chunks(merge) {
        match assemble_row(chunk, schema, &columns, registry, ctx) {
            Ok(torrent) => extraction.records.push(torrent),
            Err(err) => {
                let diagnostic = format!("[{}] failed to read torrent fields: {}", site, err);
                warn!("{}", diagnostic);
                extraction.diagnostic = Some(diagnostic);
            }
        }
    }
    extraction
}

/// Locates the candidate rows. The current-node token makes the root the
/// row set itself: a json array fans out into its elements, anything else
/// is the single row.
fn row_nodes<'a>(root: Node<'a>, selector: &str) -> Result<Vec<Node<'a>>, SchleppnetzError> {
    if selector == SELF_SELECTOR {
        let rows = match root {
            Node::Json(Value::Array(items)) => items.iter().map(Node::Json).collect(),
            node => vec![node],
        };
        return Ok(rows);
    }
    root.select(selector)
}

/// Assembles one record from a merge group of rows.
fn assemble_row(
    chunk: &[Node<'_>],
    schema: &ListSchema,
    columns: &ColumnIndex,
    registry: &FilterRegistry,
    ctx: &FilterContext<'_>,
) -> Result<Torrent, SchleppnetzError> {
    let merged = if chunk.len() > 1 {
        Some(merged_fragment(chunk))
    } else {
        None
    };
    let scope = match &merged {
        Some(html) => Node::Html(html.root_element()),
        None => chunk[0],
    };
    // Column reads stay on the group's first physical row.
    let cells = columns::direct_cells(chunk[0], false);
    fill_torrent(scope, &cells, schema, columns, registry, ctx)
}

fn fill_torrent(
    scope: Node<'_>,
    cells: &[Node<'_>],
    schema: &ListSchema,
    columns: &ColumnIndex,
    registry: &FilterRegistry,
    ctx: &FilterContext<'_>,
) -> Result<Torrent, SchleppnetzError> {
    let mut torrent = Torrent::default();
    let rules = schema.category.clone().unwrap_or_default();

    for (field, spec) in &schema.fields {
        let value = resolve_field(scope, spec, registry, ctx)
            .map_err(|err| err.on_field(field.as_str()))?;
        apply_torrent_value(&mut torrent, *field, &value, &rules, scope, ctx);
    }

    for field in TABULAR_FIELDS {
        if schema.fields.contains_key(&field) {
            continue;
        }
        let cell = match columns.get(field).and_then(|i| cells.get(i)) {
            Some(cell) => *cell,
            None => continue,
        };
        if field == TorrentField::Category {
            let raw = category::from_cell(cell);
            torrent.category = category::normalize(&raw, &rules, scope, ctx.site);
        } else {
            let raw = columns::cell_value(field, cell);
            torrent.set(field, &Value::String(raw));
        }
    }

    torrent.tags = category::collect_tags(scope, &schema.tags);
    absolutize_links(&mut torrent, ctx.site);
    Ok(torrent)
}

fn apply_torrent_value(
    torrent: &mut Torrent,
    field: TorrentField,
    value: &Value,
    rules: &CategoryRules,
    scope: Node<'_>,
    ctx: &FilterContext<'_>,
) {
    match field {
        TorrentField::Category => {
            if let Some(raw) = value.as_str() {
                if raw != NOT_APPLICABLE {
                    torrent.category = category::normalize(raw, rules, scope, ctx.site);
                }
            }
        }
        _ => torrent.set(field, value),
    }
}

/// Stitches a merge group into one standalone fragment so locators can
/// address the group as a whole.
fn merged_fragment(chunk: &[Node<'_>]) -> Html {
    let mut markup = String::new();
    for node in chunk {
        if let Some(el) = node.as_element() {
            markup.push_str(&el.html());
        }
    }
    let table_rows = chunk
        .first()
        .and_then(|node| node.as_element())
        .map(|el| el.value().name() == "tr")
        .unwrap_or(false);
    // Bare <tr> gets dropped by fragment parsing.
    if table_rows {
        markup = format!("<table>{}</table>", markup);
    }
    Html::parse_fragment(&markup)
}

fn needs_inference(schema: &ListSchema) -> bool {
    TABULAR_FIELDS
        .iter()
        .any(|field| !schema.fields.contains_key(field))
}

fn absolutize_links(torrent: &mut Torrent, site: &SiteContext) {
    if !torrent.url.is_empty() {
        torrent.url = site.absolutize(&torrent.url);
    }
    if !torrent.link.is_empty() {
        torrent.link = site.absolutize(&torrent.link);
    }
}

/// Assembles the single record of a detail page.
pub(crate) fn detail(
    page: &Page,
    fields: &FnvHashMap<TorrentField, FieldSpec>,
    registry: &FilterRegistry,
    ctx: &FilterContext<'_>,
) -> Extraction<Torrent> {
    let root = page.root();
    let rules = CategoryRules::default();
    let mut torrent = Torrent::default();
    let mut extraction = Extraction::default();

    for (field, spec) in fields {
        match resolve_field(root, spec, registry, ctx) {
            Ok(value) => apply_torrent_value(&mut torrent, *field, &value, &rules, root, ctx),
            Err(err) => {
                let err = err.on_field(field.as_str());
                let diagnostic =
                    format!("[{}] failed to read detail field: {}", ctx.site.name, err);
                warn!("{}", diagnostic);
                extraction.diagnostic = Some(diagnostic);
            }
        }
    }
    absolutize_links(&mut torrent, ctx.site);
    extraction.records.push(torrent);
    extraction
}

/// Assembles the account record of a user page.
///
/// Field failures keep the rest of the record; the record itself is always
/// produced, stamped with the extraction instant.
pub(crate) fn user(
    page: &Page,
    fields: &FnvHashMap<UserField, FieldSpec>,
    registry: &FilterRegistry,
    ctx: &FilterContext<'_>,
) -> Extraction<UserInfo> {
    let root = page.root();
    let mut info = UserInfo::default();
    let mut extraction = Extraction::default();

    for (field, spec) in fields {
        match resolve_field(root, spec, registry, ctx) {
            Ok(value) => info.set(*field, &value),
            Err(err) => {
                let err = err.on_field(field.as_str());
                let diagnostic =
                    format!("[{}] failed to read account field: {}", ctx.site.name, err);
                warn!("{}", diagnostic);
                extraction.diagnostic = Some(diagnostic);
            }
        }
    }
    info.update_at = ctx.now.timestamp_millis();
    if !info.avatar.is_empty() {
        info.avatar = ctx.site.absolutize(&info.avatar);
    }
    extraction.records.push(info);
    extraction
}
