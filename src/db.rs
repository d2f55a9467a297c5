mod schema;
mod seed;

pub use schema::{Database, WorkFilter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Publication status of a work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkStatus {
    /// New chapters are still being released.
    #[default]
    #[serde(rename = "em_andamento")]
    Ongoing,
    /// The series is finished.
    #[serde(rename = "completo")]
    Completed,
    /// Releases are paused.
    #[serde(rename = "hiato")]
    Hiatus,
}

impl WorkStatus {
    /// Value stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Ongoing => "em_andamento",
            WorkStatus::Completed => "completo",
            WorkStatus::Hiatus => "hiato",
        }
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "em_andamento" | "ongoing" | "in_progress" => Ok(WorkStatus::Ongoing),
            "completo" | "completed" | "complete" => Ok(WorkStatus::Completed),
            "hiato" | "hiatus" | "on_hiatus" => Ok(WorkStatus::Hiatus),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// A manga/comic series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Work {
    /// Work ID.
    pub id: i64,
    /// Display title.
    #[serde(rename = "titulo")]
    pub title: String,
    /// Unique URL slug, fixed at creation.
    pub slug: String,
    /// Synopsis.
    #[serde(rename = "sinopse")]
    pub synopsis: Option<String>,
    /// Publication status.
    pub status: WorkStatus,
    /// Public URL of the cover image.
    #[serde(rename = "capa_url")]
    pub cover_url: String,
    /// Public URL of the banner image.
    pub banner_url: Option<String>,
    /// Free-form type tag (Mangá, Manhwa, ...).
    #[serde(rename = "tipo")]
    pub work_type: Option<String>,
    /// Alternate title.
    #[serde(rename = "titulo_alternativo")]
    pub alternate_title: Option<String>,
    /// Chapters are gated behind VIP access.
    pub is_vip: bool,
    /// Creation timestamp.
    pub created_at: i64,
}

/// A work as returned by the listing, with its genre and tag names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkSummary {
    /// The work row.
    #[serde(flatten)]
    pub work: Work,
    /// Genre names.
    #[serde(rename = "generos")]
    pub genres: Vec<String>,
    /// Tag names.
    pub tags: Vec<String>,
}

/// Fields needed to insert a work.
#[derive(Debug, Clone)]
pub struct NewWork {
    /// Display title.
    pub title: String,
    /// Slug derived from the title.
    pub slug: String,
    /// Synopsis.
    pub synopsis: Option<String>,
    /// Publication status.
    pub status: WorkStatus,
    /// Cover URL.
    pub cover_url: String,
    /// Banner URL.
    pub banner_url: Option<String>,
    /// Type tag.
    pub work_type: Option<String>,
    /// Alternate title.
    pub alternate_title: Option<String>,
    /// VIP gate.
    pub is_vip: bool,
}

/// An installment of a work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter ID.
    pub id: i64,
    /// Owning work.
    #[serde(rename = "obra_id")]
    pub work_id: i64,
    /// Decimal chapter number.
    #[serde(rename = "numero_capitulo")]
    pub number: f64,
    /// Creation timestamp.
    pub created_at: i64,
}

/// A single page image of a chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Page ID.
    pub id: i64,
    /// Public URL of the image.
    #[serde(rename = "imagem_url")]
    pub image_url: String,
    /// 1-based position inside the chapter.
    #[serde(rename = "numero_pagina")]
    pub number: i64,
}

/// Named reference row (genre, tag).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedRow {
    /// Row ID.
    pub id: i64,
    /// Display name.
    #[serde(rename = "nome")]
    pub name: String,
}

/// Badge a user can display next to their name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Title {
    /// Title ID.
    pub id: i64,
    /// Display name.
    #[serde(rename = "nome")]
    pub name: String,
    /// How the title is earned.
    #[serde(rename = "descricao")]
    pub description: Option<String>,
}

/// Reader account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// User ID.
    pub id: i64,
    /// Unique username.
    pub username: String,
    /// VIP readers see gated chapters.
    pub is_vip: bool,
    /// Displayed badge.
    #[serde(rename = "titulo_id")]
    pub title_id: Option<i64>,
    /// Account creation timestamp.
    pub created_at: i64,
}

/// Comment left on a chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    /// Comment ID.
    pub id: i64,
    /// Author.
    #[serde(rename = "usuario_id")]
    pub user_id: i64,
    /// Author username.
    pub username: String,
    /// Chapter commented on.
    #[serde(rename = "capitulo_id")]
    pub chapter_id: i64,
    /// Comment text.
    #[serde(rename = "conteudo")]
    pub content: String,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Bug report submitted by a reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BugReport {
    /// Report ID.
    pub id: i64,
    /// Reporter, if signed in.
    #[serde(rename = "usuario_id")]
    pub user_id: Option<i64>,
    /// What went wrong.
    #[serde(rename = "descricao")]
    pub description: String,
    /// Page the reader was on.
    #[serde(rename = "pagina_url")]
    pub page_url: Option<String>,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Setting key for the VIP grace period in hours (0 keeps chapters locked).
pub const SETTING_VIP_LOCK_HOURS: &str = "vip_lock_hours";

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

/// Format a chapter number for paths and display: `1`, `10.5`.
pub fn format_chapter_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        format!("{}", number)
    }
}

/// Longest accepted chapter number once formatted; it becomes a directory name.
pub const MAX_CHAPTER_NUMBER_LEN: usize = 16;

/// Parse a chapter number from form input.
///
/// Rejects negative and non-finite values, and values whose formatted form
/// (`1e300`, `1e-300`) would exceed [`MAX_CHAPTER_NUMBER_LEN`].
pub fn parse_chapter_number(input: &str) -> Option<f64> {
    let value: f64 = input.trim().parse().ok()?;
    let valid = value.is_finite()
        && value >= 0.0
        && format_chapter_number(value).len() <= MAX_CHAPTER_NUMBER_LEN;
    valid.then_some(value)
}
