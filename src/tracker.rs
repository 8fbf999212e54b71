use std::fmt;
use std::sync::Arc;

use fnv::FnvHashMap;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::assemble::{self, Extraction};
use crate::error::SchleppnetzError;
use crate::filter::{FilterContext, FilterRegistry};
use crate::node::Page;
use crate::schema::SiteSchema;
use crate::torrent::Torrent;
use crate::user::UserInfo;

/// Immutable per-site context shared by every extraction call.
#[derive(Debug, Clone)]
pub struct SiteContext {
    /// Display name, used to prefix diagnostics.
    pub name: String,
    /// Base address relative links resolve against.
    pub base: Url,
    /// Request parameters the caller wants echoed to plug-in code.
    pub request: FnvHashMap<String, String>,
}

impl SiteContext {
    /// The base address gets a trailing slash so relative joins land inside
    /// the site path, not next to it.
    pub fn new(name: impl Into<String>, base: &str) -> Result<Self, SchleppnetzError> {
        let mut url = Url::parse(base).map_err(|_| SchleppnetzError::BaseUrl {
            url: base.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(SchleppnetzError::BaseUrl {
                url: base.to_string(),
            });
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(SiteContext {
            name: name.into(),
            base: url,
            request: FnvHashMap::default(),
        })
    }

    /// Resolves a possibly-relative address against the site base.
    ///
    /// Absolute addresses, magnet links included, pass through untouched;
    /// anything that cannot be joined comes back as given.
    pub fn absolutize(&self, href: &str) -> String {
        let href = href.trim();
        if href.is_empty() {
            return String::new();
        }
        match self.base.join(href) {
            Ok(url) => url.to_string(),
            Err(_) => href.to_string(),
        }
    }
}

/// What kind of site page a document is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageKind {
    /// A search-results listing.
    Search,
    /// A torrent detail page.
    Detail,
    /// The account profile page.
    UserInfo,
}

/// Outcome of a dispatched extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Catch {
    Torrents(Extraction<Torrent>),
    User(Extraction<UserInfo>),
}

type SearchOverride = Arc<dyn Fn(&Page, &SiteContext) -> anyhow::Result<Vec<Torrent>> + Send + Sync>;

/// Declarative extractor for one site.
///
/// Bundles the site's schema, context and filter vocabulary. Extraction
/// calls are read-only, so one `Tracker` can serve concurrent callers.
pub struct Tracker {
    context: SiteContext,
    schema: SiteSchema,
    filters: FilterRegistry,
    search_override: Option<SearchOverride>,
}

impl Tracker {
    /// Convenience for [`TrackerBuilder::new`].
    pub fn builder(
        name: impl Into<String>,
        base: &str,
    ) -> Result<TrackerBuilder, SchleppnetzError> {
        TrackerBuilder::new(name, base)
    }

    pub fn context(&self) -> &SiteContext {
        &self.context
    }

    pub fn schema(&self) -> &SiteSchema {
        &self.schema
    }

    /// True when the page is this site's login wall.
    pub fn requires_login(&self, page: &Page) -> bool {
        let locator = match &self.schema.login {
            Some(locator) => locator,
            None => return false,
        };
        page.root()
            .select(locator)
            .map(|hits| !hits.is_empty())
            .unwrap_or(false)
    }

    /// Extracts the torrent listing of a search-results page.
    pub fn search_results(&self, page: &Page) -> Extraction<Torrent> {
        if let Some(diagnostic) = self.login_gate(page) {
            return Extraction::only_diagnostic(diagnostic);
        }
        if let Some(parse) = &self.search_override {
            return match parse(page, &self.context) {
                Ok(records) => Extraction {
                    records,
                    diagnostic: None,
                },
                Err(err) => {
                    let diagnostic =
                        format!("[{}] override parser failed: {}", self.context.name, err);
                    warn!("{}", diagnostic);
                    Extraction::only_diagnostic(diagnostic)
                }
            };
        }
        let ctx = FilterContext::new(&self.context);
        assemble::torrents(page, &self.schema.search, &self.filters, &ctx)
    }

    /// Extracts the single record of a torrent detail page.
    pub fn detail(&self, page: &Page) -> Extraction<Torrent> {
        if let Some(diagnostic) = self.login_gate(page) {
            return Extraction::only_diagnostic(diagnostic);
        }
        let ctx = FilterContext::new(&self.context);
        assemble::detail(page, &self.schema.detail, &self.filters, &ctx)
    }

    /// Extracts the account statistics of a user page.
    pub fn user_info(&self, page: &Page) -> Extraction<UserInfo> {
        if let Some(diagnostic) = self.login_gate(page) {
            return Extraction::only_diagnostic(diagnostic);
        }
        let ctx = FilterContext::new(&self.context);
        assemble::user(page, &self.schema.user_info, &self.filters, &ctx)
    }

    /// Routes a page to the extraction matching its kind.
    pub fn dispatch(&self, kind: PageKind, page: &Page) -> Catch {
        match kind {
            PageKind::Search => Catch::Torrents(self.search_results(page)),
            PageKind::Detail => Catch::Torrents(self.detail(page)),
            PageKind::UserInfo => Catch::User(self.user_info(page)),
        }
    }

    fn login_gate(&self, page: &Page) -> Option<String> {
        if self.requires_login(page) {
            let err = SchleppnetzError::LoginRequired {
                site: self.context.name.clone(),
            };
            warn!("{}", err);
            Some(err.to_string())
        } else {
            None
        }
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("context", &self.context)
            .field("schema", &self.schema)
            .field("filters", &self.filters)
            .field("search_override", &self.search_override.is_some())
            .finish()
    }
}

/// Configures and validates a [`Tracker`].
pub struct TrackerBuilder {
    context: SiteContext,
    schema: SiteSchema,
    filters: FilterRegistry,
    search_override: Option<SearchOverride>,
}

impl TrackerBuilder {
    pub fn new(name: impl Into<String>, base: &str) -> Result<Self, SchleppnetzError> {
        Ok(TrackerBuilder {
            context: SiteContext::new(name, base)?,
            schema: SiteSchema::default(),
            filters: FilterRegistry::default(),
            search_override: None,
        })
    }

    pub fn schema(mut self, schema: SiteSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Registers a site-specific named filter on top of the built-in
    /// vocabulary.
    pub fn filter<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(Value, &[Value], &FilterContext<'_>) -> anyhow::Result<Value>
            + Send
            + Sync
            + 'static,
    {
        self.filters.insert(name, filter);
        self
    }

    /// Replaces the whole filter vocabulary.
    pub fn filters(mut self, registry: FilterRegistry) -> Self {
        self.filters = registry;
        self
    }

    /// Echoes a request parameter to plug-in code.
    pub fn request_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.context.request.insert(key.into(), value.into());
        self
    }

    /// Installs an opaque parser replacing the schema-driven search path,
    /// for sites no schema can describe.
    pub fn search_override<F>(mut self, parse: F) -> Self
    where
        F: Fn(&Page, &SiteContext) -> anyhow::Result<Vec<Torrent>> + Send + Sync + 'static,
    {
        self.search_override = Some(Arc::new(parse));
        self
    }

    pub fn build(self) -> Result<Tracker, SchleppnetzError> {
        self.schema.validate()?;
        Ok(Tracker {
            context: self.context,
            schema: self.schema,
            filters: self.filters,
            search_override: self.search_override,
        })
    }
}

impl fmt::Debug for TrackerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerBuilder")
            .field("context", &self.context)
            .field("schema", &self.schema)
            .field("filters", &self.filters)
            .field("search_override", &self.search_override.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, ListSchema};
    use crate::torrent::TorrentField;
    use anyhow::anyhow;

    #[test]
    fn base_address_gets_trailing_slash() {
        let site = SiteContext::new("demo", "https://example.com/forum").unwrap();
        assert_eq!(site.base.as_str(), "https://example.com/forum/");
        assert_eq!(
            site.absolutize("details.php?id=1"),
            "https://example.com/forum/details.php?id=1"
        );
    }

    #[test]
    fn invalid_base_is_rejected() {
        assert!(matches!(
            SiteContext::new("demo", "not a url"),
            Err(SchleppnetzError::BaseUrl { .. })
        ));
        assert!(matches!(
            SiteContext::new("demo", "mailto:ops@example.com"),
            Err(SchleppnetzError::BaseUrl { .. })
        ));
    }

    #[test]
    fn absolute_addresses_pass_through() {
        let site = SiteContext::new("demo", "https://example.com").unwrap();
        assert_eq!(
            site.absolutize("https://cdn.example.org/x.torrent"),
            "https://cdn.example.org/x.torrent"
        );
        let magnet = "magnet:?xt=urn:btih:deadbeef";
        assert_eq!(site.absolutize(magnet), magnet);
        assert_eq!(site.absolutize(""), "");
    }

    #[test]
    fn build_validates_the_schema() {
        let schema = SiteSchema::new(
            ListSchema::new("tr").field(TorrentField::Title, FieldSpec::default()),
        );
        let err = Tracker::builder("demo", "https://example.com")
            .unwrap()
            .schema(schema)
            .build()
            .unwrap_err();
        assert!(matches!(err, SchleppnetzError::EmptyFieldSpec { .. }));
    }

    #[test]
    fn login_wall_short_circuits() {
        let schema = SiteSchema::new(ListSchema::new("table.torrents tr"))
            .login("form[action*='login']");
        let tracker = Tracker::builder("demo", "https://example.com")
            .unwrap()
            .schema(schema)
            .build()
            .unwrap();
        let wall = Page::html(r#"<form action="/auth/login"><input name="u"></form>"#);
        assert!(tracker.requires_login(&wall));
        let out = tracker.search_results(&wall);
        assert!(out.is_empty());
        assert_eq!(
            out.diagnostic.as_deref(),
            Some("[demo] login required before this page can be read")
        );
    }

    #[test]
    fn override_replaces_the_schema_path() {
        let tracker = Tracker::builder("demo", "https://example.com")
            .unwrap()
            .search_override(|_, site| {
                Ok(vec![Torrent {
                    title: format!("from {}", site.name),
                    ..Default::default()
                }])
            })
            .build()
            .unwrap();
        let page = Page::html("<div>anything</div>");
        let out = tracker.search_results(&page);
        assert_eq!(out.len(), 1);
        assert_eq!(out.records[0].title, "from demo");
    }

    #[test]
    fn failing_override_degrades_to_diagnostic() {
        let tracker = Tracker::builder("demo", "https://example.com")
            .unwrap()
            .search_override(|_, _| Err(anyhow!("markup changed")))
            .build()
            .unwrap();
        let out = tracker.search_results(&Page::html("<div></div>"));
        assert!(out.is_empty());
        assert!(out
            .diagnostic
            .as_deref()
            .unwrap()
            .contains("override parser failed"));
    }

    #[test]
    fn dispatch_routes_by_page_kind() {
        let tracker = Tracker::builder("demo", "https://example.com")
            .unwrap()
            .build()
            .unwrap();
        let page = Page::html("<div></div>");
        assert!(matches!(
            tracker.dispatch(PageKind::Search, &page),
            Catch::Torrents(_)
        ));
        assert!(matches!(
            tracker.dispatch(PageKind::Detail, &page),
            Catch::Torrents(_)
        ));
        assert!(matches!(
            tracker.dispatch(PageKind::UserInfo, &page),
            Catch::User(_)
        ));
    }
}
