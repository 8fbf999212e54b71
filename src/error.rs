use thiserror::Error;

/// All different error types this crate uses.
///
/// Everything here is recoverable: top-level extraction calls catch these and
/// degrade to a diagnostic string plus a (possibly partial) record list.
#[derive(Error, Debug)]
pub enum SchleppnetzError {
    /// A selector string was rejected by the document query layer.
    #[error("invalid selector {selector:?}: {detail}")]
    Selector {
        /// The offending locator string.
        selector: String,
        /// What the query layer complained about.
        detail: String,
    },
    /// A raw payload could not be parsed as a JSON document.
    #[error("failed to parse json document: {source}")]
    Json {
        /// The parse error.
        #[source]
        source: serde_json::Error,
    },
    /// The site base address could not be parsed or cannot serve as a base.
    #[error("invalid base address {url:?}")]
    BaseUrl {
        /// The address as configured.
        url: String,
    },
    /// A field rule declares neither candidate selectors nor a literal value.
    #[error("field {field:?} declares neither selectors nor a literal value")]
    EmptyFieldSpec {
        /// The semantic field the rule was registered under.
        field: String,
    },
    /// A filter pipeline names a transform the registry does not know.
    #[error("unknown filter {name:?}")]
    UnknownFilter {
        /// The name as it appears in the schema.
        name: String,
    },
    /// A filter step failed while transforming an extracted value.
    #[error("filter {name:?} failed: {source}")]
    Filter {
        /// Name of the failing step, `"<custom>"` for inline closures.
        name: String,
        /// Whatever the step reported.
        #[source]
        source: anyhow::Error,
    },
    /// A custom element handler failed.
    #[error("element handler #{index} failed: {source}")]
    Handler {
        /// Position of the handler in the `element_process` chain.
        index: usize,
        /// Whatever the handler reported.
        #[source]
        source: anyhow::Error,
    },
    /// Resolving a single semantic field failed; the owning row is dropped.
    #[error("field {field:?}: {source}")]
    Field {
        /// The semantic field being resolved.
        field: String,
        /// The underlying failure.
        #[source]
        source: Box<SchleppnetzError>,
    },
    /// The document is a login wall; nothing was extracted.
    #[error("[{site}] login required before this page can be read")]
    LoginRequired {
        /// Name of the site.
        site: String,
    },
    /// The row container matched nothing.
    #[error("[{site}] no rows matched {selector:?}, or the result set is empty")]
    RowsNotFound {
        /// Name of the site.
        site: String,
        /// The row container locator.
        selector: String,
    },
}

impl SchleppnetzError {
    /// Wraps an error with the semantic field it occurred on.
    pub(crate) fn on_field(self, field: impl Into<String>) -> Self {
        SchleppnetzError::Field {
            field: field.into(),
            source: Box::new(self),
        }
    }
}
