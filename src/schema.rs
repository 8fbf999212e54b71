use std::fmt;
use std::sync::Arc;

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchleppnetzError;
use crate::filter::{FilterContext, FilterStep};
use crate::node::Node;
use crate::torrent::TorrentField;
use crate::user::UserField;

/// Literal marking a field the source site simply does not provide.
///
/// It resolves as-is, skips the filter pipeline and suppresses any fallback
/// heuristics for the field.
pub const NOT_APPLICABLE: &str = "N/A";

/// One extraction rule: where a semantic field lives in a document and how
/// its raw value is refined.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldSpec {
    /// Candidate locators, tried in order. The token `:self` targets the
    /// current scope itself.
    pub selectors: Vec<String>,
    /// Literal fallback when no candidate matches, e.g. [`NOT_APPLICABLE`].
    pub text: Option<String>,
    /// Attribute to read off the matched node instead of its text.
    pub attr: Option<String>,
    /// Data item to read off the matched node: an HTML `data-*` entry or a
    /// JSON object key.
    pub data: Option<String>,
    /// Custom read steps. When present they replace the default
    /// attr/data/text read entirely.
    #[serde(skip)]
    pub element_process: Vec<ElementHandler>,
    /// Transform pipeline for the raw value.
    pub filters: Vec<FilterStep>,
    /// Pipelines keyed by the index of the candidate locator that matched.
    /// Non-empty maps override `filters`; unmapped indices pass the raw
    /// value through untouched.
    pub switch_filters: FnvHashMap<usize, Vec<FilterStep>>,
}

impl FieldSpec {
    /// A rule with a single candidate locator.
    pub fn selector(locator: impl Into<String>) -> Self {
        FieldSpec {
            selectors: vec![locator.into()],
            ..Default::default()
        }
    }

    /// A rule with several candidate locators, tried in order.
    pub fn candidates<I, S>(locators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSpec {
            selectors: locators.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// A rule that always yields `text`, without touching the document.
    pub fn literal(text: impl Into<String>) -> Self {
        FieldSpec {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Marks the field as not provided by the site.
    pub fn not_applicable() -> Self {
        Self::literal(NOT_APPLICABLE)
    }

    /// Read this attribute off the matched node.
    pub fn attr(mut self, name: impl Into<String>) -> Self {
        self.attr = Some(name.into());
        self
    }

    /// Read this data item off the matched node.
    pub fn data(mut self, name: impl Into<String>) -> Self {
        self.data = Some(name.into());
        self
    }

    /// Fall back to this literal when no candidate matches.
    pub fn fallback(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Appends a step to the default pipeline.
    pub fn filter(mut self, step: FilterStep) -> Self {
        self.filters.push(step);
        self
    }

    /// Installs a pipeline for one candidate index.
    pub fn switch(mut self, index: usize, steps: Vec<FilterStep>) -> Self {
        self.switch_filters.insert(index, steps);
        self
    }

    /// Appends a custom read step.
    pub fn process<F>(mut self, handler: F) -> Self
    where
        F: Fn(Node<'_>, Value, &FilterContext<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.element_process.push(ElementHandler::new(handler));
        self
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.selectors.is_empty() && self.text.is_none()
    }
}

/// A custom per-node read step installed at runtime.
///
/// The first handler of a chain receives `Value::Null`; each handler's output
/// feeds the next. Failures are contained as field-resolution errors.
#[derive(Clone)]
pub struct ElementHandler(
    Arc<dyn Fn(Node<'_>, Value, &FilterContext<'_>) -> anyhow::Result<Value> + Send + Sync>,
);

impl ElementHandler {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(Node<'_>, Value, &FilterContext<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        ElementHandler(Arc::new(handler))
    }

    pub(crate) fn call(
        &self,
        node: Node<'_>,
        value: Value,
        ctx: &FilterContext<'_>,
    ) -> anyhow::Result<Value> {
        (self.0)(node, value, ctx)
    }
}

impl fmt::Debug for ElementHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ElementHandler")
    }
}

/// How result rows are located and grouped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RowRules {
    /// Locator matching one result row.
    pub selector: String,
    /// How many consecutive rows form a single record. Sites that spread a
    /// torrent over a main row plus description rows set this above 1.
    pub merge: usize,
    /// Declarative slice applied to the matched rows.
    pub filter: Option<RowSlice>,
}

impl RowRules {
    pub fn new(selector: impl Into<String>) -> Self {
        RowRules {
            selector: selector.into(),
            ..Default::default()
        }
    }
}

impl Default for RowRules {
    fn default() -> Self {
        RowRules {
            selector: String::new(),
            merge: 1,
            filter: None,
        }
    }
}

/// Drops rows by position: leading noise, trailing pagination, interleaved
/// filler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RowSlice {
    pub skip_first: usize,
    pub skip_last: usize,
    /// Keep every `step`-th row; 0 and 1 both keep all.
    pub step: usize,
}

impl RowSlice {
    pub(crate) fn apply<T>(&self, rows: Vec<T>) -> Vec<T> {
        let end = rows.len().saturating_sub(self.skip_last);
        rows.into_iter()
            .take(end)
            .skip(self.skip_first)
            .step_by(self.step.max(1))
            .collect()
    }
}

/// A promotion/status tag recognized by node presence alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRule {
    /// Locator whose presence within a row carries the tag.
    pub selector: String,
    /// The tag name, e.g. `"Free"`.
    pub name: String,
    /// Explicit display color; well-known names fall back to the base
    /// palette when this is absent.
    #[serde(default)]
    pub color: Option<String>,
}

impl TagRule {
    pub fn new(selector: impl Into<String>, name: impl Into<String>) -> Self {
        TagRule {
            selector: selector.into(),
            name: name.into(),
            color: None,
        }
    }

    pub fn colored(
        selector: impl Into<String>,
        name: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        TagRule {
            selector: selector.into(),
            name: name.into(),
            color: Some(color.into()),
        }
    }
}

/// How raw category labels are canonicalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryRules {
    /// Decorative suffixes stripped from raw names.
    pub strip_suffixes: Vec<String>,
    /// Locator for the category link inside a row.
    pub link: Option<String>,
}

impl Default for CategoryRules {
    fn default() -> Self {
        CategoryRules {
            strip_suffixes: vec![" Torrent".to_string()],
            link: None,
        }
    }
}

/// Schema for a search-results listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListSchema {
    pub rows: RowRules,
    /// Locator for the header row of a tabular listing. Without it the first
    /// matched row doubles as the header whenever column inference runs.
    pub header: Option<String>,
    /// Per-field extraction rules. Tabular fields left out here are filled
    /// in by column inference.
    pub fields: FnvHashMap<TorrentField, FieldSpec>,
    pub tags: Vec<TagRule>,
    pub category: Option<CategoryRules>,
}

impl ListSchema {
    pub fn new(row_selector: impl Into<String>) -> Self {
        ListSchema {
            rows: RowRules::new(row_selector),
            ..Default::default()
        }
    }

    pub fn header(mut self, locator: impl Into<String>) -> Self {
        self.header = Some(locator.into());
        self
    }

    pub fn merge(mut self, rows: usize) -> Self {
        self.rows.merge = rows;
        self
    }

    pub fn row_filter(mut self, slice: RowSlice) -> Self {
        self.rows.filter = Some(slice);
        self
    }

    pub fn field(mut self, field: TorrentField, spec: FieldSpec) -> Self {
        self.fields.insert(field, spec);
        self
    }

    pub fn tag(mut self, rule: TagRule) -> Self {
        self.tags.push(rule);
        self
    }

    pub fn category(mut self, rules: CategoryRules) -> Self {
        self.category = Some(rules);
        self
    }
}

/// Everything the engine knows about one site: how its listings, detail
/// pages and account pages are shaped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteSchema {
    /// Search-results schema.
    pub search: ListSchema,
    /// Detail-page field map, resolved against the document root. Typically
    /// just the download `link`.
    pub detail: FnvHashMap<TorrentField, FieldSpec>,
    /// Account-page field map, resolved against the document root.
    pub user_info: FnvHashMap<UserField, FieldSpec>,
    /// Locator that matches only on login walls. A hit short-circuits every
    /// extraction for the page.
    pub login: Option<String>,
}

impl SiteSchema {
    pub fn new(search: ListSchema) -> Self {
        SiteSchema {
            search,
            ..Default::default()
        }
    }

    pub fn detail_field(mut self, field: TorrentField, spec: FieldSpec) -> Self {
        self.detail.insert(field, spec);
        self
    }

    pub fn user_field(mut self, field: UserField, spec: FieldSpec) -> Self {
        self.user_info.insert(field, spec);
        self
    }

    pub fn login(mut self, locator: impl Into<String>) -> Self {
        self.login = Some(locator.into());
        self
    }

    /// Every registered rule must name at least one locator or a literal.
    pub(crate) fn validate(&self) -> Result<(), SchleppnetzError> {
        let search = self.search.fields.iter().map(|(f, s)| (f.to_string(), s));
        let detail = self.detail.iter().map(|(f, s)| (f.to_string(), s));
        let user = self.user_info.iter().map(|(f, s)| (f.to_string(), s));
        for (field, spec) in search.chain(detail).chain(user) {
            if spec.is_empty() {
                return Err(SchleppnetzError::EmptyFieldSpec { field });
            }
        }
        Ok(())
    }
}
