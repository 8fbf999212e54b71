use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::first_number;
use crate::node::json_text;
use crate::torrent::{
    as_count, as_float, as_size, as_text, as_timestamp_ms, skip_value,
};

/// Account statistics extracted from a user page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserInfo {
    /// Site-local account identifier.
    pub id: String,
    pub name: String,
    /// Display name of the user class.
    pub level_name: String,
    /// Total upload in bytes.
    pub uploaded: u64,
    /// Total download in bytes.
    pub downloaded: u64,
    /// Share ratio; negative means the site does not state one.
    pub ratio: f64,
    /// Torrents currently seeding.
    pub seeding: u32,
    /// Torrents currently leeching.
    pub leeching: u32,
    /// Combined size of everything currently seeded, bytes.
    pub seeding_size: u64,
    /// Bonus points.
    pub bonus: f64,
    pub message_count: u32,
    pub invites: u32,
    /// Registration instant, ms since the epoch.
    pub join_time: i64,
    /// Avatar address.
    pub avatar: String,
    /// When this record was read off the page, ms since the epoch.
    pub update_at: i64,
}

impl Default for UserInfo {
    fn default() -> Self {
        UserInfo {
            id: String::new(),
            name: String::new(),
            level_name: String::new(),
            uploaded: 0,
            downloaded: 0,
            ratio: -1.0,
            seeding: 0,
            leeching: 0,
            seeding_size: 0,
            bonus: 0.0,
            message_count: 0,
            invites: 0,
            join_time: 0,
            avatar: String::new(),
            update_at: 0,
        }
    }
}

/// Names every semantic field of a [`UserInfo`] a schema can map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserField {
    Id,
    Name,
    LevelName,
    Uploaded,
    Downloaded,
    Ratio,
    Seeding,
    Leeching,
    SeedingSize,
    Bonus,
    MessageCount,
    Invites,
    JoinTime,
    Avatar,
}

impl UserField {
    /// The field's name as it appears in schema files.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserField::Id => "id",
            UserField::Name => "name",
            UserField::LevelName => "levelName",
            UserField::Uploaded => "uploaded",
            UserField::Downloaded => "downloaded",
            UserField::Ratio => "ratio",
            UserField::Seeding => "seeding",
            UserField::Leeching => "leeching",
            UserField::SeedingSize => "seedingSize",
            UserField::Bonus => "bonus",
            UserField::MessageCount => "messageCount",
            UserField::Invites => "invites",
            UserField::JoinTime => "joinTime",
            UserField::Avatar => "avatar",
        }
    }
}

impl fmt::Display for UserField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl UserInfo {
    /// Writes a resolved value into the record, with the same lenient
    /// coercion the torrent record uses.
    pub(crate) fn set(&mut self, field: UserField, value: &Value) {
        if skip_value(value) {
            return;
        }
        match field {
            UserField::Id => self.id = as_text(value),
            UserField::Name => self.name = as_text(value),
            UserField::LevelName => self.level_name = as_text(value),
            UserField::Uploaded => self.uploaded = as_size(value),
            UserField::Downloaded => self.downloaded = as_size(value),
            UserField::Ratio => self.ratio = as_ratio(value),
            UserField::Seeding => self.seeding = as_count(value),
            UserField::Leeching => self.leeching = as_count(value),
            UserField::SeedingSize => self.seeding_size = as_size(value),
            UserField::Bonus => self.bonus = as_float(value).unwrap_or(0.0),
            UserField::MessageCount => self.message_count = as_count(value),
            UserField::Invites => self.invites = as_count(value),
            UserField::JoinTime => self.join_time = as_timestamp_ms(value),
            UserField::Avatar => self.avatar = as_text(value),
        }
    }
}

/// Sites render unbounded ratios as an infinity glyph.
fn as_ratio(value: &Value) -> f64 {
    if let Some(f) = value.as_f64() {
        return f;
    }
    let text = json_text(value);
    let text = text.trim();
    if text.contains('∞') || text.eq_ignore_ascii_case("inf") {
        return f64::INFINITY;
    }
    first_number(text).unwrap_or(-1.0)
}
