#![allow(unused)]

pub use assemble::Extraction;
pub use category::{base_tag_color, Category, Tag};
pub use columns::ColumnIndex;
pub use error::SchleppnetzError;
pub use filter::{CustomFilter, FilterContext, FilterRegistry, FilterStep};
pub use node::{Node, Page, SELF_SELECTOR};
pub use schema::{
    CategoryRules, ElementHandler, FieldSpec, ListSchema, RowRules, RowSlice, SiteSchema,
    TagRule, NOT_APPLICABLE,
};
pub use torrent::{Torrent, TorrentField, TorrentStatus};
pub use tracker::{Catch, PageKind, SiteContext, Tracker, TrackerBuilder};
pub use user::{UserField, UserInfo};

pub mod assemble;
pub mod category;
pub mod columns;
mod error;
pub mod filter;
pub mod node;
mod resolve;
pub mod schema;
pub mod torrent;
pub mod tracker;
pub mod user;

/// Reexported to implement custom handlers and filters.
pub use scraper;
pub use serde_json;
