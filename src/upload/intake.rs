//! Multipart intake: stream files to staging, then validate.

use crate::db::{MAX_CHAPTER_NUMBER_LEN, WorkStatus, parse_chapter_number};
use crate::error::{AppError, Result};
use crate::slug::slugify;
use crate::upload::StagedFile;
use crate::upload::pipeline::{ChapterUpload, WorkUpload};
use axum::extract::Multipart;
use axum::extract::multipart::Field;
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Multipart part names.
pub mod parts {
    /// Cover image.
    pub const COVER: &str = "capa";
    /// Banner image.
    pub const BANNER: &str = "banner";
    /// Zip archive with the chapter pages.
    pub const ARCHIVE: &str = "capitulo_zip";
    /// Work title.
    pub const TITLE: &str = "titulo";
    /// Synopsis.
    pub const SYNOPSIS: &str = "sinopse";
    /// Publication status.
    pub const STATUS: &str = "status";
    /// Type tag.
    pub const TYPE: &str = "tipo";
    /// Alternate title.
    pub const ALTERNATE_TITLE: &str = "titulo_alternativo";
    /// VIP flag.
    pub const VIP: &str = "is_vip";
    /// Comma-separated genre names.
    pub const GENRES: &str = "generos";
    /// Comma-separated tag names.
    pub const TAGS: &str = "tags";
    /// Chapter number.
    pub const CHAPTER_NUMBER: &str = "numero_capitulo";
    /// Owning work ID.
    pub const WORK_ID: &str = "obra_id";
}

/// File parts that are staged; other file parts are skipped.
const FILE_PARTS: &[&str] = &[parts::COVER, parts::BANNER, parts::ARCHIVE];

/// Leading bytes kept in memory for image format detection.
const SNIFF_LEN: usize = 64;

/// A file part streamed into the staging directory.
#[derive(Debug)]
struct FilePart {
    staged: StagedFile,
    len: u64,
    head: Vec<u8>,
}

impl FilePart {
    async fn receive(
        field: &mut Field<'_>,
        staging_dir: &Path,
        part: &str,
        file_name: &str,
    ) -> Result<Self> {
        let (staged, mut out) = StagedFile::create(staging_dir, part, Some(file_name)).await?;
        let mut len = 0u64;
        let mut head = Vec::with_capacity(SNIFF_LEN);

        while let Some(chunk) = field.chunk().await? {
            if head.len() < SNIFF_LEN {
                let take = (SNIFF_LEN - head.len()).min(chunk.len());
                head.extend_from_slice(&chunk[..take]);
            }
            len += chunk.len() as u64;
            out.write_all(&chunk).await?;
        }
        out.flush().await?;

        tracing::debug!(part, path = %staged.path().display(), bytes = len, "Staged upload");
        Ok(Self { staged, len, head })
    }
}

/// All parts of a multipart body: text fields in memory, files staged.
///
/// Staged files are removed when the form (or the upload built from it) is
/// dropped, so a request rejected by validation leaves nothing behind.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    files: HashMap<String, FilePart>,
}

impl UploadForm {
    /// Read every part of the body. Parts with a file name are files and are
    /// written to `staging_dir` as they arrive; the rest are text.
    pub async fn read(mut multipart: Multipart, staging_dir: &Path) -> Result<Self> {
        let mut form = Self::default();

        while let Some(mut field) = multipart.next_field().await? {
            let Some(name) = field.name().map(String::from) else {
                continue;
            };

            match field.file_name().map(String::from) {
                Some(file_name) => {
                    let Some(part) = FILE_PARTS.iter().copied().find(|p| *p == name) else {
                        tracing::debug!(part = %name, "Skipping unknown file part");
                        continue;
                    };
                    let file = FilePart::receive(&mut field, staging_dir, part, &file_name).await?;
                    form.files.insert(name, file);
                }
                None => {
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    #[cfg(test)]
    fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    #[cfg(test)]
    async fn with_file(mut self, staging_dir: &Path, name: &str, data: &[u8]) -> Self {
        let staged = StagedFile::write(staging_dir, name, Some("upload.bin"), data)
            .await
            .unwrap();
        let head = data[..data.len().min(SNIFF_LEN)].to_vec();
        self.files.insert(
            name.to_string(),
            FilePart {
                staged,
                len: data.len() as u64,
                head,
            },
        );
        self
    }

    /// Trimmed text field; empty values count as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn required_text(&self, name: &str) -> Result<&str> {
        self.text(name)
            .ok_or_else(|| AppError::Validation(format!("Field '{}' is required", name)))
    }

    /// Take a non-empty file part out of the form.
    fn take_file(&mut self, name: &str) -> Option<FilePart> {
        self.files.remove(name).filter(|f| f.len > 0)
    }

    fn has_file(&self, name: &str) -> bool {
        self.files.get(name).is_some_and(|f| f.len > 0)
    }

    fn take_required_file(&mut self, name: &str) -> Result<FilePart> {
        self.take_file(name)
            .ok_or_else(|| AppError::Validation(format!("File '{}' is required", name)))
    }

    fn chapter_number(&self) -> Result<f64> {
        let raw = self.required_text(parts::CHAPTER_NUMBER)?;
        parse_chapter_number(raw).ok_or_else(|| {
            AppError::Validation(format!(
                "'{}' must be a non-negative number of at most {} characters, got '{}'",
                parts::CHAPTER_NUMBER,
                MAX_CHAPTER_NUMBER_LEN,
                raw
            ))
        })
    }

    fn list(&self, name: &str) -> Vec<String> {
        self.text(name)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl WorkUpload {
    /// Validate a "create work" form. Nothing outside the staging directory
    /// is written.
    pub fn from_form(mut form: UploadForm) -> Result<Self> {
        let title = form.required_text(parts::TITLE)?.to_string();
        for part in [parts::COVER, parts::ARCHIVE] {
            if !form.has_file(part) {
                return Err(AppError::Validation(format!("File '{}' is required", part)));
            }
        }
        let chapter_number = form.chapter_number()?;

        if slugify(&title).is_empty() {
            return Err(AppError::Validation(
                "Title must contain at least one letter or digit".to_string(),
            ));
        }

        let status = match form.text(parts::STATUS) {
            Some(raw) => raw.parse::<WorkStatus>().map_err(AppError::Validation)?,
            None => WorkStatus::default(),
        };

        let cover = form.take_required_file(parts::COVER)?;
        ensure_image(parts::COVER, &cover)?;
        let banner = form.take_file(parts::BANNER);
        if let Some(banner) = &banner {
            ensure_image(parts::BANNER, banner)?;
        }
        let archive = form.take_required_file(parts::ARCHIVE)?;

        Ok(Self {
            title,
            synopsis: form.text(parts::SYNOPSIS).map(String::from),
            status,
            work_type: form.text(parts::TYPE).map(String::from),
            alternate_title: form.text(parts::ALTERNATE_TITLE).map(String::from),
            is_vip: form.text(parts::VIP).is_some_and(parse_flag),
            genres: form.list(parts::GENRES),
            tags: form.list(parts::TAGS),
            chapter_number,
            cover: cover.staged,
            banner: banner.map(|b| b.staged),
            archive: archive.staged,
        })
    }
}

impl ChapterUpload {
    /// Validate a "create chapter" form. Whether the work exists is left to
    /// the caller.
    pub fn from_form(mut form: UploadForm) -> Result<Self> {
        let raw_work_id = form.required_text(parts::WORK_ID)?.to_string();
        let archive = form.take_required_file(parts::ARCHIVE)?;
        let chapter_number = form.chapter_number()?;

        let work_id = raw_work_id.parse::<i64>().map_err(|_| {
            AppError::Validation(format!(
                "'{}' must be an integer, got '{}'",
                parts::WORK_ID,
                raw_work_id
            ))
        })?;

        Ok(Self {
            work_id,
            chapter_number,
            archive: archive.staged,
        })
    }
}

fn ensure_image(part: &str, file: &FilePart) -> Result<()> {
    image::guess_format(&file.head)
        .map(|_| ())
        .map_err(|_| AppError::Validation(format!("File '{}' is not a supported image", part)))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "1" | "on" | "yes" | "sim"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    async fn work_form(dir: &TempDir) -> UploadForm {
        UploadForm::default()
            .with_field(parts::TITLE, "Solo Leveling")
            .with_field(parts::CHAPTER_NUMBER, "1")
            .with_file(dir.path(), parts::COVER, PNG)
            .await
            .with_file(dir.path(), parts::ARCHIVE, b"PK")
            .await
    }

    fn staged_count(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_work_upload_valid() {
        let dir = tempfile::tempdir().unwrap();
        let form = work_form(&dir)
            .await
            .with_field(parts::VIP, "true")
            .with_field(parts::GENRES, "Ação, Fantasia ,")
            .with_field(parts::STATUS, "completo");
        let upload = WorkUpload::from_form(form).unwrap();

        assert!(upload.is_vip);
        assert_eq!(upload.genres, vec!["Ação", "Fantasia"]);
        assert_eq!(upload.status, WorkStatus::Completed);
        assert!(upload.banner.is_none());
        assert!(upload.cover.path().exists());
        assert_eq!(staged_count(&dir), 2);
    }

    #[tokio::test]
    async fn test_work_upload_missing_parts() {
        let dir = tempfile::tempdir().unwrap();

        let mut form = work_form(&dir).await;
        form.fields.remove(parts::TITLE);
        assert!(matches!(WorkUpload::from_form(form), Err(AppError::Validation(_))));

        let mut form = work_form(&dir).await;
        form.files.remove(parts::COVER);
        assert!(matches!(WorkUpload::from_form(form), Err(AppError::Validation(_))));

        let mut form = work_form(&dir).await;
        form.files.remove(parts::ARCHIVE);
        assert!(matches!(WorkUpload::from_form(form), Err(AppError::Validation(_))));

        let form = work_form(&dir).await.with_field(parts::TITLE, "   ");
        assert!(matches!(WorkUpload::from_form(form), Err(AppError::Validation(_))));

        let form = work_form(&dir)
            .await
            .with_file(dir.path(), parts::ARCHIVE, b"")
            .await;
        assert!(matches!(WorkUpload::from_form(form), Err(AppError::Validation(_))));

        assert_eq!(staged_count(&dir), 0);
    }

    #[tokio::test]
    async fn test_work_upload_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();

        let form = work_form(&dir).await.with_field(parts::CHAPTER_NUMBER, "one");
        assert!(matches!(WorkUpload::from_form(form), Err(AppError::Validation(_))));

        let form = work_form(&dir).await.with_field(parts::CHAPTER_NUMBER, "1e300");
        assert!(matches!(WorkUpload::from_form(form), Err(AppError::Validation(_))));

        let form = work_form(&dir).await.with_field(parts::STATUS, "cancelado");
        assert!(matches!(WorkUpload::from_form(form), Err(AppError::Validation(_))));

        let form = work_form(&dir).await.with_field(parts::TITLE, "???");
        assert!(matches!(WorkUpload::from_form(form), Err(AppError::Validation(_))));

        let form = work_form(&dir)
            .await
            .with_file(dir.path(), parts::COVER, b"not an image")
            .await;
        assert!(matches!(WorkUpload::from_form(form), Err(AppError::Validation(_))));

        let form = work_form(&dir)
            .await
            .with_file(dir.path(), parts::BANNER, b"not an image")
            .await;
        assert!(matches!(WorkUpload::from_form(form), Err(AppError::Validation(_))));

        assert_eq!(staged_count(&dir), 0);
    }

    #[tokio::test]
    async fn test_chapter_upload() {
        let dir = tempfile::tempdir().unwrap();
        let form = UploadForm::default()
            .with_field(parts::WORK_ID, "7")
            .with_field(parts::CHAPTER_NUMBER, "2.5")
            .with_file(dir.path(), parts::ARCHIVE, b"PK")
            .await;
        let upload = ChapterUpload::from_form(form).unwrap();
        assert_eq!(upload.work_id, 7);
        assert_eq!(upload.chapter_number, 2.5);
        drop(upload);

        let form = UploadForm::default()
            .with_field(parts::WORK_ID, "abc")
            .with_field(parts::CHAPTER_NUMBER, "1")
            .with_file(dir.path(), parts::ARCHIVE, b"PK")
            .await;
        assert!(matches!(ChapterUpload::from_form(form), Err(AppError::Validation(_))));
        assert_eq!(staged_count(&dir), 0);
    }
}
