//! Application state shared across handlers.

use crate::config::Config;
use crate::db::{self, Chapter, Database, Work};
use crate::error::{AppError, Result};
use crate::upload::UploadPipeline;
use serde::Serialize;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    pipeline: UploadPipeline,
}

/// Chapter annotated with its access lock.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterStatus {
    /// The chapter row.
    #[serde(flatten)]
    pub chapter: Chapter,
    /// Whether the requester may not read it yet.
    #[serde(rename = "isLocked")]
    pub is_locked: bool,
}

/// Work detail with its chapters.
#[derive(Debug, Clone, Serialize)]
pub struct WorkDetail {
    /// The work row.
    #[serde(flatten)]
    pub work: Work,
    /// Chapters by ascending number.
    #[serde(rename = "capitulos")]
    pub chapters: Vec<ChapterStatus>,
}

/// Minimal chapter reference used by navigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterRef {
    /// Chapter ID.
    pub id: i64,
    /// Chapter number.
    #[serde(rename = "numero_capitulo")]
    pub number: f64,
}

impl From<&Chapter> for ChapterRef {
    fn from(chapter: &Chapter) -> Self {
        Self {
            id: chapter.id,
            number: chapter.number,
        }
    }
}

/// Previous/next chapter around a chapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterNavigation {
    /// Chapter before this one, if any.
    pub previous: Option<ChapterRef>,
    /// Chapter after this one, if any.
    pub next: Option<ChapterRef>,
    /// Slug of the owning work.
    #[serde(rename = "workSlug")]
    pub work_slug: String,
}

impl AppState {
    /// Create new application state with database.
    pub fn new(config: Config, db: Database) -> Self {
        let pipeline = UploadPipeline::new(db.clone(), config.storage.clone());
        Self {
            config: Arc::new(config),
            db,
            pipeline,
        }
    }

    /// Upload pipeline bound to this state's database and storage.
    pub fn pipeline(&self) -> UploadPipeline {
        self.pipeline.clone()
    }

    /// Whether the requesting user has VIP access. Unknown users do not.
    pub fn is_vip_requester(&self, user_id: Option<i64>) -> Result<bool> {
        match user_id {
            Some(id) => Ok(self.db.get_user(id)?.is_some_and(|u| u.is_vip)),
            None => Ok(false),
        }
    }

    /// Grace period after which VIP chapters unlock for everyone (0 = never).
    pub fn vip_lock_hours(&self) -> Result<u64> {
        let Some(raw) = self.db.get_setting(db::SETTING_VIP_LOCK_HOURS)? else {
            return Ok(0);
        };

        match raw.trim().parse::<u64>() {
            Ok(hours) => Ok(hours),
            Err(_) => {
                tracing::warn!(value = %raw, "Ignoring invalid vip_lock_hours setting");
                Ok(0)
            }
        }
    }

    /// Work with its chapters, each annotated with `isLocked` for the requester.
    pub fn work_detail(&self, slug: &str, user_id: Option<i64>) -> Result<WorkDetail> {
        let work = self
            .db
            .get_work_by_slug(slug)?
            .ok_or_else(|| AppError::NotFound(format!("Work '{}' not found", slug)))?;

        let requester_vip = self.is_vip_requester(user_id)?;
        let lock_hours = if work.is_vip { self.vip_lock_hours()? } else { 0 };
        let now = db::now_timestamp();

        let chapters = self
            .db
            .list_chapters(work.id)?
            .into_iter()
            .map(|chapter| ChapterStatus {
                is_locked: is_chapter_locked(
                    work.is_vip,
                    requester_vip,
                    lock_hours,
                    chapter.created_at,
                    now,
                ),
                chapter,
            })
            .collect();

        Ok(WorkDetail { work, chapters })
    }

    /// Previous and next chapter of the same work.
    pub fn chapter_navigation(&self, chapter_id: i64) -> Result<ChapterNavigation> {
        let chapter = self
            .db
            .get_chapter(chapter_id)?
            .ok_or_else(|| AppError::NotFound(format!("Chapter {} not found", chapter_id)))?;

        let work = self.db.get_work(chapter.work_id)?.ok_or_else(|| {
            AppError::Internal(format!("Chapter {} has no owning work", chapter_id))
        })?;

        let siblings = self.db.list_chapters(work.id)?;
        let (previous, next) = neighbours(&siblings, chapter.id);

        Ok(ChapterNavigation {
            previous,
            next,
            work_slug: work.slug,
        })
    }
}

/// Lock rule for a chapter of a VIP work.
///
/// A positive `lock_hours` unlocks the chapter for everyone once it is that
/// old.
pub fn is_chapter_locked(
    work_is_vip: bool,
    requester_vip: bool,
    lock_hours: u64,
    chapter_created_at: i64,
    now: i64,
) -> bool {
    if !work_is_vip || requester_vip {
        return false;
    }

    if lock_hours == 0 {
        return true;
    }

    let unlock_at = chapter_created_at.saturating_add((lock_hours as i64).saturating_mul(3600));
    now < unlock_at
}

/// Chapters right before and after `id` in an ordered chapter list.
pub fn neighbours(chapters: &[Chapter], id: i64) -> (Option<ChapterRef>, Option<ChapterRef>) {
    let Some(pos) = chapters.iter().position(|c| c.id == id) else {
        return (None, None);
    };

    let previous = pos
        .checked_sub(1)
        .and_then(|p| chapters.get(p))
        .map(ChapterRef::from);
    let next = chapters.get(pos + 1).map(ChapterRef::from);

    (previous, next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(id: i64, number: f64) -> Chapter {
        Chapter {
            id,
            work_id: 1,
            number,
            created_at: 0,
        }
    }

    #[test]
    fn test_neighbours() {
        let chapters = vec![chapter(10, 1.0), chapter(12, 1.5), chapter(11, 2.0)];

        let (prev, next) = neighbours(&chapters, 10);
        assert_eq!(prev, None);
        assert_eq!(next.map(|c| c.id), Some(12));

        let (prev, next) = neighbours(&chapters, 12);
        assert_eq!(prev.map(|c| c.id), Some(10));
        assert_eq!(next.map(|c| c.id), Some(11));

        let (prev, next) = neighbours(&chapters, 11);
        assert_eq!(prev.map(|c| c.id), Some(12));
        assert_eq!(next, None);
    }

    #[test]
    fn test_neighbours_single_chapter() {
        assert_eq!(neighbours(&[chapter(1, 1.0)], 1), (None, None));
    }

    #[test]
    fn test_chapter_lock_rule() {
        assert!(!is_chapter_locked(false, false, 0, 0, 0));
        assert!(is_chapter_locked(true, false, 0, 0, 1_000_000));
        assert!(!is_chapter_locked(true, true, 0, 0, 0));
    }

    #[test]
    fn test_chapter_lock_grace_period() {
        let created = 1_000;
        assert!(is_chapter_locked(true, false, 24, created, created + 3600));
        assert!(!is_chapter_locked(true, false, 24, created, created + 24 * 3600));
    }
}
