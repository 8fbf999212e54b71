use lazy_static::lazy_static;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::node::Node;
use crate::schema::{CategoryRules, TagRule};
use crate::tracker::SiteContext;

/// A canonical content category, e.g. Movies or Music.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    /// Canonical display name, decorative suffixes stripped.
    pub name: String,
    /// Address of the category's own listing; empty when the schema does not
    /// locate one.
    #[serde(default)]
    pub link: String,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Category {
            name: name.into(),
            link: String::new(),
        }
    }
}

/// A promotion or status tag attached to a listing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    /// Display color; empty when neither the rule nor the base palette knows
    /// one.
    #[serde(default)]
    pub color: String,
}

lazy_static! {
    /// Display colors for the promotion tags most trackers share.
    static ref BASE_TAG_PALETTE: Vec<(&'static str, &'static str)> = {
        vec![
            ("Free", "blue"),
            ("2xFree", "green"),
            ("2xUp", "lime"),
            ("2x50%", "light-blue"),
            ("25%", "purple"),
            ("30%", "indigo"),
            ("35%", "indigo"),
            ("50%", "orange"),
            ("70%", "blue-grey"),
            ("75%", "lime"),
            ("VIP", "orange"),
            ("Excl.", "deep-orange"),
            ("HR", "red"),
        ]
    };
}

/// Display color for a well-known promotion tag name.
pub fn base_tag_color(name: &str) -> Option<&'static str> {
    BASE_TAG_PALETTE
        .iter()
        .find(|(tag, _)| *tag == name)
        .map(|(_, color)| *color)
}

/// Collects the tags whose locator matches anywhere inside the row.
///
/// Matching is existence-only; the matched node's content is irrelevant.
pub(crate) fn collect_tags(row: Node<'_>, rules: &[TagRule]) -> Vec<Tag> {
    let mut tags = Vec::new();
    for rule in rules {
        match row.select(&rule.selector) {
            Ok(hits) if !hits.is_empty() => {
                let color = rule
                    .color
                    .clone()
                    .or_else(|| base_tag_color(&rule.name).map(str::to_string))
                    .unwrap_or_default();
                tags.push(Tag {
                    name: rule.name.clone(),
                    color,
                });
            }
            Ok(_) => {}
            Err(err) => debug!("tag rule {:?} skipped: {}", rule.selector, err),
        }
    }
    tags
}

/// Canonicalizes a raw category label against the site's rules.
///
/// Labels that are empty after suffix stripping yield no category at all.
pub(crate) fn normalize(
    raw: &str,
    rules: &CategoryRules,
    row: Node<'_>,
    site: &SiteContext,
) -> Option<Category> {
    let mut name = raw.trim().to_string();
    for suffix in &rules.strip_suffixes {
        if let Some(stripped) = name.strip_suffix(suffix.as_str()) {
            name = stripped.trim_end().to_string();
        }
    }
    if name.is_empty() {
        return None;
    }
    let link = rules
        .link
        .as_deref()
        .and_then(|locator| {
            let hits = row.select(locator).ok()?;
            let href = hits.first().and_then(|node| node.attr("href"))?;
            Some(site.absolutize(&href))
        })
        .unwrap_or_default();
    Some(Category { name, link })
}

/// Raw category label of a tabular cell. Icon titles beat cell text, since
/// icon-only category columns carry the name in the `title` attribute.
pub(crate) fn from_cell(cell: Node<'_>) -> String {
    if let Ok(icons) = cell.select("i[title]") {
        if let Some(title) = icons.first().and_then(|icon| icon.attr("title")) {
            return title;
        }
    }
    cell.text()
}
