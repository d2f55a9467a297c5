//! Atomic "create work" and "create chapter" uploads.
//!
//! Pages are first extracted into a scratch directory. Rows are then
//! inserted and files moved into the uploads tree inside one transaction;
//! anything moved is removed again if the transaction does not commit.

use crate::config::StorageConfig;
use crate::db::{Database, NewWork, WorkStatus, format_chapter_number};
use crate::error::{AppError, Result};
use crate::slug::slugify;
use crate::upload::archive::{ChapterArchive, ExtractedPage};
use crate::upload::staging::{InstalledPaths, StagedFile, remove_quietly};
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Staged "create work" upload.
#[derive(Debug)]
pub struct WorkUpload {
    /// Display title.
    pub title: String,
    /// Synopsis.
    pub synopsis: Option<String>,
    /// Publication status.
    pub status: WorkStatus,
    /// Type tag.
    pub work_type: Option<String>,
    /// Alternate title.
    pub alternate_title: Option<String>,
    /// VIP gate.
    pub is_vip: bool,
    /// Genre names to link.
    pub genres: Vec<String>,
    /// Tag names to link.
    pub tags: Vec<String>,
    /// Number of the first chapter.
    pub chapter_number: f64,
    /// Cover image.
    pub cover: StagedFile,
    /// Banner image.
    pub banner: Option<StagedFile>,
    /// Chapter archive.
    pub archive: StagedFile,
}

/// Staged "create chapter" upload.
#[derive(Debug)]
pub struct ChapterUpload {
    /// Owning work.
    pub work_id: i64,
    /// Chapter number.
    pub chapter_number: f64,
    /// Chapter archive.
    pub archive: StagedFile,
}

/// Result of a successful work upload.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedWork {
    /// New work ID.
    #[serde(rename = "obraId")]
    pub id: i64,
    /// Slug derived from the title.
    pub slug: String,
    /// First chapter ID.
    #[serde(rename = "capituloId")]
    pub chapter_id: i64,
    /// Number of pages extracted.
    #[serde(rename = "paginas")]
    pub pages: usize,
}

/// Result of a successful chapter upload.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedChapter {
    /// New chapter ID.
    pub id: i64,
    /// Owning work.
    #[serde(rename = "obra_id")]
    pub work_id: i64,
    /// Chapter number.
    #[serde(rename = "numero_capitulo")]
    pub number: f64,
    /// Number of pages extracted.
    #[serde(rename = "paginas")]
    pub pages: usize,
}

/// Directory of a chapter relative to the uploads root: `{slug}/cap-{n}`.
pub fn chapter_relative_dir(slug: &str, number: f64) -> String {
    format!("{}/cap-{}", slug, format_chapter_number(number))
}

/// Runs uploads against one database and uploads tree.
#[derive(Clone)]
pub struct UploadPipeline {
    db: Database,
    storage: StorageConfig,
}

impl UploadPipeline {
    /// Create a pipeline.
    pub fn new(db: Database, storage: StorageConfig) -> Self {
        Self { db, storage }
    }

    /// Create a work together with its first chapter.
    pub fn create_work(&self, upload: WorkUpload) -> Result<CreatedWork> {
        let slug = slugify(&upload.title);
        if slug.is_empty() {
            return Err(AppError::Validation(
                "Title must contain at least one letter or digit".to_string(),
            ));
        }

        let (scratch, pages) = self.extract(&upload.archive)?;

        let cover_name = upload.cover.file_name("capa");
        let banner_name = upload.banner.as_ref().map(|b| b.file_name("banner"));
        let new_work = NewWork {
            title: upload.title.clone(),
            slug: slug.clone(),
            synopsis: upload.synopsis.clone(),
            status: upload.status,
            cover_url: self.storage.public_url(&format!("{}/{}", slug, cover_name)),
            banner_url: banner_name
                .as_ref()
                .map(|name| self.storage.public_url(&format!("{}/{}", slug, name))),
            work_type: upload.work_type.clone(),
            alternate_title: upload.alternate_title.clone(),
            is_vip: upload.is_vip,
        };

        let work_dir = self.storage.uploads_dir.join(&slug);
        let chapter_rel = chapter_relative_dir(&slug, upload.chapter_number);
        let mut installed = InstalledPaths::new();

        let created = self.db.transaction(|tx| {
            let work_id = Database::insert_work_tx(tx, &new_work)?;

            let unknown = Database::link_genres_tx(tx, work_id, &upload.genres)?;
            if !unknown.is_empty() {
                tracing::warn!(slug = %slug, genres = ?unknown, "Skipping unknown genres");
            }
            let unknown = Database::link_tags_tx(tx, work_id, &upload.tags)?;
            if !unknown.is_empty() {
                tracing::warn!(slug = %slug, tags = ?unknown, "Skipping unknown tags");
            }

            let chapter_id = Database::insert_chapter_tx(tx, work_id, upload.chapter_number)?;
            self.insert_pages(tx, chapter_id, &chapter_rel, &pages)?;

            installed.create_dir(&work_dir)?;
            installed.install_file(upload.cover.path(), &work_dir.join(&cover_name))?;
            if let (Some(banner), Some(name)) = (&upload.banner, &banner_name) {
                installed.install_file(banner.path(), &work_dir.join(name))?;
            }
            self.install_pages(&mut installed, scratch.path(), &chapter_rel, &pages)?;

            Ok(CreatedWork {
                id: work_id,
                slug: slug.clone(),
                chapter_id,
                pages: pages.len(),
            })
        })?;

        installed.commit();
        tracing::info!(
            work_id = created.id,
            slug = %created.slug,
            chapter_id = created.chapter_id,
            pages = created.pages,
            "Created work"
        );
        Ok(created)
    }

    /// Add a chapter to an existing work.
    pub fn create_chapter(&self, upload: ChapterUpload) -> Result<CreatedChapter> {
        let work = self
            .db
            .get_work(upload.work_id)?
            .ok_or_else(|| AppError::NotFound(format!("Work {} not found", upload.work_id)))?;

        let (scratch, pages) = self.extract(&upload.archive)?;

        let chapter_rel = chapter_relative_dir(&work.slug, upload.chapter_number);
        let mut installed = InstalledPaths::new();

        let created = self.db.transaction(|tx| {
            let chapter_id = Database::insert_chapter_tx(tx, work.id, upload.chapter_number)?;
            self.insert_pages(tx, chapter_id, &chapter_rel, &pages)?;
            self.install_pages(&mut installed, scratch.path(), &chapter_rel, &pages)?;

            Ok(CreatedChapter {
                id: chapter_id,
                work_id: work.id,
                number: upload.chapter_number,
                pages: pages.len(),
            })
        })?;

        installed.commit();
        tracing::info!(
            work_id = work.id,
            chapter_id = created.id,
            chapter = %format_chapter_number(created.number),
            pages = created.pages,
            "Created chapter"
        );
        Ok(created)
    }

    /// Delete a work row and its upload directory. Returns `false` if no
    /// work has that slug.
    ///
    /// Files are removed before the transaction commits, so an upload reusing
    /// the slug cannot install its files in between.
    pub fn delete_work(&self, slug: &str) -> Result<bool> {
        let deleted = self.db.transaction(|tx| {
            if !Database::delete_work_tx(tx, slug)? {
                return Ok(false);
            }
            remove_quietly(&self.storage.uploads_dir.join(slug));
            Ok(true)
        })?;

        if deleted {
            tracing::info!(slug = %slug, "Deleted work");
        }
        Ok(deleted)
    }

    /// Delete a chapter row and its upload directory. Returns `false` if the
    /// chapter does not exist.
    pub fn delete_chapter(&self, id: i64) -> Result<bool> {
        let deleted = self.db.transaction(|tx| {
            let Some((slug, number)) = Database::delete_chapter_tx(tx, id)? else {
                return Ok(false);
            };
            remove_quietly(
                &self.storage.uploads_dir.join(chapter_relative_dir(&slug, number)),
            );
            Ok(true)
        })?;

        if deleted {
            tracing::info!(chapter_id = id, "Deleted chapter");
        }
        Ok(deleted)
    }

    /// Extract the archive into a fresh scratch directory.
    fn extract(&self, archive: &StagedFile) -> Result<(TempDir, Vec<ExtractedPage>)> {
        std::fs::create_dir_all(&self.storage.staging_dir)?;
        let scratch = tempfile::Builder::new()
            .prefix("extract-")
            .tempdir_in(&self.storage.staging_dir)?;

        let pages = ChapterArchive::open(archive.path())?.extract_to(scratch.path())?;
        Ok((scratch, pages))
    }

    fn insert_pages(
        &self,
        conn: &Connection,
        chapter_id: i64,
        chapter_rel: &str,
        pages: &[ExtractedPage],
    ) -> Result<()> {
        for page in pages {
            let url = self
                .storage
                .public_url(&format!("{}/{}", chapter_rel, page.file_name));
            Database::insert_page_tx(conn, chapter_id, page.number as i64, &url)?;
        }
        Ok(())
    }

    fn install_pages(
        &self,
        installed: &mut InstalledPaths,
        scratch: &Path,
        chapter_rel: &str,
        pages: &[ExtractedPage],
    ) -> Result<()> {
        let chapter_dir: PathBuf = self.storage.uploads_dir.join(chapter_rel);
        installed.create_dir(&chapter_dir)?;

        for page in pages {
            installed.install_file(
                &scratch.join(&page.file_name),
                &chapter_dir.join(&page.file_name),
            )?;
        }
        Ok(())
    }
}
