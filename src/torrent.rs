use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::category::{Category, Tag};
use crate::filter::{first_number, fuzzy_timestamp_ms, size_in_bytes};
use crate::node::json_text;
use crate::schema::NOT_APPLICABLE;

/// One extracted listing entry.
///
/// Every field a site fails to provide stays at its default, so downstream
/// code never deals with per-site shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Torrent {
    /// Site-local identifier.
    pub id: String,
    pub title: String,
    /// Secondary title line, if the site renders one.
    pub sub_title: Option<String>,
    /// Detail page address.
    pub url: String,
    /// Download address: a torrent file or a magnet link.
    pub link: String,
    /// Upload instant, ms since the epoch.
    pub time: i64,
    /// Payload size in bytes.
    pub size: u64,
    /// Uploader name.
    pub author: String,
    pub category: Option<Category>,
    pub seeders: u32,
    pub leechers: u32,
    /// Finished snatches.
    pub completed: u32,
    pub comments: u32,
    pub tags: Vec<Tag>,
    /// Local download progress, 100 = done.
    pub progress: Option<f64>,
    pub status: TorrentStatus,
}

/// Download state of a listing entry on the client side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TorrentStatus {
    #[default]
    Unknown,
    Downloading,
    Seeding,
    Inactive,
    Completed,
}

impl TorrentStatus {
    /// Accepts the numeric codes sites expose in JSON payloads as well as
    /// spelled-out state names. Values read off a document node arrive
    /// stringified, so digit strings count as codes too.
    pub(crate) fn from_value(value: &Value) -> Self {
        if let Some(n) = value.as_u64() {
            return TorrentStatus::from_code(n);
        }
        let text = json_text(value);
        let name = text.trim();
        if let Ok(code) = name.parse::<u64>() {
            return TorrentStatus::from_code(code);
        }
        match name.to_ascii_lowercase().as_str() {
            "downloading" => TorrentStatus::Downloading,
            "seeding" => TorrentStatus::Seeding,
            "inactive" | "inactivity" => TorrentStatus::Inactive,
            "completed" | "complete" => TorrentStatus::Completed,
            _ => TorrentStatus::Unknown,
        }
    }

    fn from_code(code: u64) -> Self {
        match code {
            1 => TorrentStatus::Downloading,
            2 => TorrentStatus::Seeding,
            3 => TorrentStatus::Inactive,
            255 => TorrentStatus::Completed,
            _ => TorrentStatus::Unknown,
        }
    }
}

/// Names every semantic field of a [`Torrent`] a schema can map.
///
/// Serialized in camelCase, which is how schema files key their field maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TorrentField {
    Id,
    Title,
    SubTitle,
    Url,
    Link,
    Time,
    Size,
    Author,
    Category,
    Seeders,
    Leechers,
    Completed,
    Comments,
    Progress,
    Status,
}

impl TorrentField {
    /// The field's name as it appears in schema files.
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentField::Id => "id",
            TorrentField::Title => "title",
            TorrentField::SubTitle => "subTitle",
            TorrentField::Url => "url",
            TorrentField::Link => "link",
            TorrentField::Time => "time",
            TorrentField::Size => "size",
            TorrentField::Author => "author",
            TorrentField::Category => "category",
            TorrentField::Seeders => "seeders",
            TorrentField::Leechers => "leechers",
            TorrentField::Completed => "completed",
            TorrentField::Comments => "comments",
            TorrentField::Progress => "progress",
            TorrentField::Status => "status",
        }
    }
}

impl fmt::Display for TorrentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Torrent {
    /// Writes a resolved value into the record.
    ///
    /// Coercion is lenient: group separators are stripped from counts, sizes
    /// accept human-readable forms, timestamps accept epoch seconds or date
    /// strings. Unreadable values leave the field at its default, as do
    /// `null` and the `"N/A"` sentinel.
    pub(crate) fn set(&mut self, field: TorrentField, value: &Value) {
        if skip_value(value) {
            return;
        }
        match field {
            TorrentField::Id => self.id = as_text(value),
            TorrentField::Title => self.title = as_text(value),
            TorrentField::SubTitle => self.sub_title = non_empty(as_text(value)),
            TorrentField::Url => self.url = as_text(value),
            TorrentField::Link => self.link = as_text(value),
            TorrentField::Time => self.time = as_timestamp_ms(value),
            TorrentField::Size => self.size = as_size(value),
            TorrentField::Author => self.author = as_text(value),
            // Categories need row context and go through the normalizer
            // in the assembler instead.
            TorrentField::Category => {}
            TorrentField::Seeders => self.seeders = as_count(value),
            TorrentField::Leechers => self.leechers = as_count(value),
            TorrentField::Completed => self.completed = as_count(value),
            TorrentField::Comments => self.comments = as_count(value),
            TorrentField::Progress => self.progress = as_float(value),
            TorrentField::Status => self.status = TorrentStatus::from_value(value),
        }
    }
}

/// `null` and the not-provided sentinel never overwrite defaults.
pub(crate) fn skip_value(value: &Value) -> bool {
    value.is_null() || value.as_str() == Some(NOT_APPLICABLE)
}

pub(crate) fn as_text(value: &Value) -> String {
    json_text(value).trim().to_string()
}

pub(crate) fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub(crate) fn as_count(value: &Value) -> u32 {
    if let Some(n) = value.as_u64() {
        return n.min(u32::MAX as u64) as u32;
    }
    first_number(&json_text(value))
        .filter(|n| *n >= 0.0)
        .map(|n| n as u32)
        .unwrap_or(0)
}

pub(crate) fn as_size(value: &Value) -> u64 {
    if let Some(n) = value.as_u64() {
        return n;
    }
    if let Some(f) = value.as_f64() {
        return f.max(0.0) as u64;
    }
    let text = json_text(value);
    size_in_bytes(&text)
        .or_else(|| first_number(&text).filter(|n| *n >= 0.0).map(|n| n as u64))
        .unwrap_or(0)
}

pub(crate) fn as_timestamp_ms(value: &Value) -> i64 {
    if let Some(n) = value.as_i64() {
        return promote_seconds(n);
    }
    let text = json_text(value);
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return promote_seconds(n);
    }
    fuzzy_timestamp_ms(trimmed).unwrap_or(0)
}

/// Ten-digit epoch values are seconds; thirteen-digit values already ms.
/// `unsigned_abs` keeps `i64::MIN` from overflowing the magnitude check.
fn promote_seconds(n: i64) -> i64 {
    if n != 0 && n.unsigned_abs() < 10_000_000_000 {
        n * 1000
    } else {
        n
    }
}

pub(crate) fn as_float(value: &Value) -> Option<f64> {
    if let Some(f) = value.as_f64() {
        return Some(f);
    }
    first_number(&json_text(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_strip_separators() {
        let mut t = Torrent::default();
        t.set(TorrentField::Seeders, &Value::from("1,234"));
        t.set(TorrentField::Leechers, &Value::from(7));
        t.set(TorrentField::Completed, &Value::from("no digits"));
        assert_eq!(t.seeders, 1234);
        assert_eq!(t.leechers, 7);
        assert_eq!(t.completed, 0);
    }

    #[test]
    fn sizes_accept_bytes_and_human_forms() {
        let mut t = Torrent::default();
        t.set(TorrentField::Size, &Value::from("3 GiB"));
        assert_eq!(t.size, 3 * 1024u64.pow(3));
        t.set(TorrentField::Size, &Value::from(123_456u64));
        assert_eq!(t.size, 123_456);
    }

    #[test]
    fn times_promote_epoch_seconds() {
        let mut t = Torrent::default();
        t.set(TorrentField::Time, &Value::from(1_620_000_000));
        assert_eq!(t.time, 1_620_000_000_000);
        t.set(TorrentField::Time, &Value::from(1_620_000_000_123i64));
        assert_eq!(t.time, 1_620_000_000_123);
        t.set(TorrentField::Time, &Value::from("2021-05-06 13:52:01"));
        assert!(t.time > 1_620_000_000_000);
        t.set(TorrentField::Time, &Value::from(i64::MIN));
        assert_eq!(t.time, i64::MIN);
    }

    #[test]
    fn sentinel_and_null_leave_defaults() {
        let mut t = Torrent::default();
        t.set(TorrentField::Author, &Value::from(NOT_APPLICABLE));
        t.set(TorrentField::Title, &Value::Null);
        assert_eq!(t.author, "");
        assert_eq!(t.title, "");
    }

    #[test]
    fn empty_sub_title_stays_none() {
        let mut t = Torrent::default();
        t.set(TorrentField::SubTitle, &Value::from("  "));
        assert_eq!(t.sub_title, None);
        t.set(TorrentField::SubTitle, &Value::from("director's cut"));
        assert_eq!(t.sub_title.as_deref(), Some("director's cut"));
    }

    #[test]
    fn status_from_codes_and_names() {
        assert_eq!(
            TorrentStatus::from_value(&Value::from(2)),
            TorrentStatus::Seeding
        );
        assert_eq!(
            TorrentStatus::from_value(&Value::from(255)),
            TorrentStatus::Completed
        );
        // Node reads hand the code over as a string.
        assert_eq!(
            TorrentStatus::from_value(&Value::from("2")),
            TorrentStatus::Seeding
        );
        assert_eq!(
            TorrentStatus::from_value(&Value::from(" 255 ")),
            TorrentStatus::Completed
        );
        assert_eq!(
            TorrentStatus::from_value(&Value::from("Downloading")),
            TorrentStatus::Downloading
        );
        assert_eq!(
            TorrentStatus::from_value(&Value::from("???")),
            TorrentStatus::Unknown
        );
    }

    #[test]
    fn serializes_with_config_field_names() {
        let torrent = Torrent {
            sub_title: Some("x".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&torrent).unwrap();
        assert!(json.get("subTitle").is_some());
        assert_eq!(json["status"], Value::from("unknown"));
    }

    #[test]
    fn field_names_match_schema_keys() {
        assert_eq!(
            serde_json::to_value(TorrentField::SubTitle).unwrap(),
            Value::from("subTitle")
        );
        assert_eq!(TorrentField::SubTitle.to_string(), "subTitle");
    }
}
