//! Chapter archive (zip of page images) extraction.

use crate::error::{AppError, Result};
use std::cmp::Ordering;
use std::fs::File;
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;
use zip::ZipArchive;

/// Extensions accepted as chapter pages (compared case-insensitively).
pub const PAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// A page written out by [`ChapterArchive::extract_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    /// 1-based page number.
    pub number: usize,
    /// Entry name inside the archive.
    pub entry: String,
    /// Normalized file name, `{number}{ext}`.
    pub file_name: String,
}

/// An opened chapter archive with its page entries in reading order.
pub struct ChapterArchive {
    archive: ZipArchive<File>,
    entries: Vec<String>,
}

impl ChapterArchive {
    /// Open an archive and collect its page entries.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(file)?;
        let entries = page_entries(&archive);

        Ok(Self { archive, entries })
    }

    /// Write every page entry into `dest` as `{n}{ext}`.
    ///
    /// Stops at the first entry that cannot be decompressed or written; the
    /// error names that page. Files already written are left for the caller
    /// to discard.
    pub fn extract_to(&mut self, dest: &Path) -> Result<Vec<ExtractedPage>> {
        if self.entries.is_empty() {
            return Err(AppError::EmptyArchive);
        }

        std::fs::create_dir_all(dest)?;

        let mut pages = Vec::with_capacity(self.entries.len());
        for (idx, entry) in self.entries.iter().enumerate() {
            let number = idx + 1;
            let file_name = page_file_name(number, entry);

            write_entry(&mut self.archive, entry, &dest.join(&file_name)).map_err(|e| {
                AppError::Extraction {
                    page: number,
                    entry: entry.clone(),
                    reason: e.to_string(),
                }
            })?;

            pages.push(ExtractedPage {
                number,
                entry: entry.clone(),
                file_name,
            });
        }

        tracing::debug!(pages = pages.len(), dest = %dest.display(), "Extracted chapter archive");
        Ok(pages)
    }
}

fn write_entry(archive: &mut ZipArchive<File>, entry: &str, path: &Path) -> Result<()> {
    let mut zip_file = archive.by_name(entry)?;
    let mut out = File::create(path)?;
    std::io::copy(&mut zip_file, &mut out)?;
    Ok(())
}

/// Image entries of the archive, sorted naturally.
fn page_entries(archive: &ZipArchive<File>) -> Vec<String> {
    let mut entries: Vec<String> = archive
        .file_names()
        .filter(|name| is_page_entry(name))
        .map(String::from)
        .collect();

    entries.sort_by(|a, b| natural_cmp(a, b));
    entries
}

/// Whether an entry name is a page image.
pub fn is_page_entry(name: &str) -> bool {
    if name.ends_with('/') || name.contains("__MACOSX/") {
        return false;
    }

    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            PAGE_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Output file name for a page: the page number plus the entry's extension.
pub fn page_file_name(number: usize, entry: &str) -> String {
    match Path::new(entry).extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{}.{}", number, ext),
        None => number.to_string(),
    }
}

/// Natural, case-insensitive ordering: `page2` sorts before `page10`.
///
/// Digit runs compare by numeric value regardless of length or leading
/// zeros. Names that are equal under that rule fall back to byte order so
/// the result is a total order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_cmp_folded(a, b).then_with(|| a.cmp(b))
}

fn natural_cmp_folded(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek().copied(), b_chars.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ac), Some(bc)) if ac.is_ascii_digit() && bc.is_ascii_digit() => {
                let a_num = take_digits(&mut a_chars);
                let b_num = take_digits(&mut b_chars);

                match compare_digit_runs(&a_num, &b_num) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            (Some(ac), Some(bc)) => {
                a_chars.next();
                b_chars.next();

                match ac.to_lowercase().cmp(bc.to_lowercase()) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
