use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::error::SchleppnetzError;

/// Locator token that targets the scope element itself instead of a
/// descendant.
pub const SELF_SELECTOR: &str = ":self";

/// A parsed site document.
///
/// Sites answer either with markup or with a JSON payload; both are queried
/// through the same [`Node`] interface afterwards.
#[derive(Debug)]
pub enum Page {
    /// A full HTML document or fragment.
    Html(Html),
    /// A JSON response body.
    Json(Value),
}

impl Page {
    /// Parses an HTML document.
    ///
    /// Markup never fails to parse; bad input simply yields a sparse tree.
    pub fn html(body: &str) -> Self {
        Page::Html(Html::parse_document(body))
    }

    /// Parses a standalone markup fragment, e.g. a server-rendered row list.
    pub fn html_fragment(body: &str) -> Self {
        Page::Html(Html::parse_fragment(body))
    }

    /// Parses a JSON response body.
    pub fn json(body: &str) -> Result<Self, SchleppnetzError> {
        let value = serde_json::from_str(body)
            .map_err(|source| SchleppnetzError::Json { source })?;
        Ok(Page::Json(value))
    }

    /// The root scope every schema locator starts from.
    pub fn root(&self) -> Node<'_> {
        match self {
            Page::Html(html) => Node::Html(html.root_element()),
            Page::Json(value) => Node::Json(value),
        }
    }
}

/// A scope inside a [`Page`]: an element of the markup tree or a value inside
/// the JSON document.
///
/// All schema locators resolve against a `Node`, so rules written for an HTML
/// rendition of a site keep their shape when the site switches to JSON.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Html(ElementRef<'a>),
    Json(&'a Value),
}

impl<'a> Node<'a> {
    /// Resolves a locator against this scope and returns all matches in
    /// document order.
    ///
    /// For markup scopes the locator is a CSS selector. For JSON scopes it is
    /// a dotted key path (`"data.torrents"`, array indices as numeric
    /// segments); a leading `$.` is tolerated. A path that points at an array
    /// yields one node per element, anything else yields a single node.
    /// Paths that lead nowhere match nothing.
    pub fn select(&self, locator: &str) -> Result<Vec<Node<'a>>, SchleppnetzError> {
        match self {
            Node::Html(el) => {
                let selector =
                    Selector::parse(locator).map_err(|err| SchleppnetzError::Selector {
                        selector: locator.to_string(),
                        detail: err.to_string(),
                    })?;
                Ok(el.select(&selector).map(Node::Html).collect())
            }
            Node::Json(value) => Ok(json_path(value, locator)),
        }
    }

    /// The text content of this scope.
    ///
    /// Markup scopes concatenate all descendant text. JSON strings come back
    /// verbatim, other scalars via their display form, `null` as the empty
    /// string and containers as compact JSON. The result is trimmed.
    pub fn text(&self) -> String {
        match self {
            Node::Html(el) => el.text().collect::<String>().trim().to_string(),
            Node::Json(value) => json_text(value).trim().to_string(),
        }
    }

    /// Reads an attribute off a markup scope. JSON scopes have no attributes.
    pub fn attr(&self, name: &str) -> Option<String> {
        match self {
            Node::Html(el) => el.value().attr(name).map(str::to_string),
            Node::Json(_) => None,
        }
    }

    /// Reads a data item: `data-*` attributes on markup (the name is given in
    /// camelCase, as scripts would address it), plain keys on JSON objects.
    pub fn data(&self, name: &str) -> Option<String> {
        match self {
            Node::Html(el) => el.value().attr(&data_attribute(name)).map(str::to_string),
            Node::Json(value) => value.get(name).map(json_text),
        }
    }

    /// The underlying markup element, if this is a markup scope.
    pub fn as_element(&self) -> Option<ElementRef<'a>> {
        match self {
            Node::Html(el) => Some(*el),
            Node::Json(_) => None,
        }
    }
}

/// Walks a dotted key path, fanning out over a trailing array.
fn json_path<'a>(value: &'a Value, locator: &str) -> Vec<Node<'a>> {
    let path = locator
        .trim()
        .trim_start_matches("$.")
        .trim_start_matches('$');

    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Vec::new(),
        }
    }

    match current {
        Value::Array(items) => items.iter().map(Node::Json).collect(),
        other => vec![Node::Json(other)],
    }
}

pub(crate) fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// `seedingSize` -> `data-seeding-size`
fn data_attribute(name: &str) -> String {
    let mut attr = String::with_capacity(name.len() + 6);
    attr.push_str("data-");
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            attr.push('-');
            attr.push(c.to_ascii_lowercase());
        } else {
            attr.push(c);
        }
    }
    attr
}
