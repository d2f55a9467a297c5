//! HTTP request handlers.

use crate::db::{BugReport, Comment, NamedRow, Page, Title, User, WorkFilter, WorkSummary};
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::server::extract::{JsonBody, Path, Query, Upload};
use crate::server::state::{ChapterNavigation, WorkDetail};
use crate::upload::{ChapterUpload, CreatedChapter, CreatedWork, UploadForm, WorkUpload};
use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

/// Longest accepted comment, in characters.
const MAX_COMMENT_CHARS: usize = 2000;

/// Run blocking database/filesystem work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Background task failed: {}", e)))?
}

// ============================================================================
// WORKS
// ============================================================================

/// Work listing query.
#[derive(Debug, Deserialize)]
pub struct ListWorksQuery {
    page: Option<u32>,
    limit: Option<u32>,
    title: Option<String>,
    #[serde(rename = "type")]
    work_type: Option<String>,
}

/// List works, newest first.
pub async fn list_works(
    State(state): State<AppState>,
    Query(query): Query<ListWorksQuery>,
) -> Result<Json<Vec<WorkSummary>>> {
    let mut filter = WorkFilter::new(query.page, query.limit);
    filter.title = query.title.filter(|t| !t.trim().is_empty());
    filter.work_type = query.work_type.filter(|t| !t.trim().is_empty());

    Ok(Json(state.db.list_works(&filter)?))
}

/// Requester identity for lock evaluation.
#[derive(Debug, Deserialize)]
pub struct RequesterQuery {
    user_id: Option<i64>,
}

/// Work detail with chapters and their lock state.
pub async fn work_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<RequesterQuery>,
) -> Result<Json<WorkDetail>> {
    Ok(Json(state.work_detail(&slug, query.user_id)?))
}

/// Create a work and its first chapter from a multipart upload.
pub async fn create_work(
    State(state): State<AppState>,
    Upload(multipart): Upload,
) -> Result<(StatusCode, Json<CreatedWork>)> {
    let form = UploadForm::read(multipart, &state.config.storage.staging_dir).await?;
    let upload = WorkUpload::from_form(form)?;

    let pipeline = state.pipeline();
    let created = blocking(move || pipeline.create_work(upload)).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Delete a work with its chapters, pages and files.
pub async fn delete_work(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode> {
    let pipeline = state.pipeline();
    let target = slug.clone();
    if !blocking(move || pipeline.delete_work(&target)).await? {
        return Err(AppError::NotFound(format!("Work '{}' not found", slug)));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// CHAPTERS
// ============================================================================

/// Add a chapter to an existing work from a multipart upload.
pub async fn create_chapter(
    State(state): State<AppState>,
    Upload(multipart): Upload,
) -> Result<(StatusCode, Json<CreatedChapter>)> {
    let form = UploadForm::read(multipart, &state.config.storage.staging_dir).await?;
    let upload = ChapterUpload::from_form(form)?;

    if state.db.get_work(upload.work_id)?.is_none() {
        return Err(AppError::NotFound(format!("Work {} not found", upload.work_id)));
    }

    let pipeline = state.pipeline();
    let created = blocking(move || pipeline.create_chapter(upload)).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Delete a chapter with its pages and files.
pub async fn delete_chapter(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let pipeline = state.pipeline();
    if !blocking(move || pipeline.delete_chapter(id)).await? {
        return Err(AppError::NotFound(format!("Chapter {} not found", id)));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Pages of a chapter in reading order.
pub async fn chapter_pages(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Page>>> {
    if state.db.get_chapter(id)?.is_none() {
        return Err(AppError::NotFound(format!("Chapter {} not found", id)));
    }

    let pages = state.db.list_pages(id)?;
    if pages.is_empty() {
        return Err(AppError::NotFound(format!("No pages for chapter {}", id)));
    }

    Ok(Json(pages))
}

/// Previous and next chapter of the same work.
pub async fn chapter_navigation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ChapterNavigation>> {
    Ok(Json(state.chapter_navigation(id)?))
}

// ============================================================================
// COMMENTS
// ============================================================================

/// Comments of a chapter, oldest first.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Comment>>> {
    if state.db.get_chapter(id)?.is_none() {
        return Err(AppError::NotFound(format!("Chapter {} not found", id)));
    }

    Ok(Json(state.db.list_comments(id)?))
}

/// New comment body.
#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    user_id: i64,
    #[serde(alias = "conteudo")]
    content: String,
}

/// Post a comment on a chapter.
pub async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<CommentRequest>,
) -> Result<(StatusCode, Json<Comment>)> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("Comment cannot be empty".to_string()));
    }
    if content.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::Validation(format!(
            "Comment cannot exceed {} characters",
            MAX_COMMENT_CHARS
        )));
    }

    if state.db.get_chapter(id)?.is_none() {
        return Err(AppError::NotFound(format!("Chapter {} not found", id)));
    }
    if state.db.get_user(req.user_id)?.is_none() {
        return Err(AppError::NotFound(format!("User {} not found", req.user_id)));
    }

    let comment = state.db.add_comment(req.user_id, id, content)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

// ============================================================================
// REFERENCE DATA
// ============================================================================

/// All genres.
pub async fn list_genres(State(state): State<AppState>) -> Result<Json<Vec<NamedRow>>> {
    Ok(Json(state.db.list_genres()?))
}

/// All tags.
pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<NamedRow>>> {
    Ok(Json(state.db.list_tags()?))
}

/// All user titles.
pub async fn list_titles(State(state): State<AppState>) -> Result<Json<Vec<Title>>> {
    Ok(Json(state.db.list_titles()?))
}

// ============================================================================
// USERS & BUG REPORTS
// ============================================================================

/// New user body.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    username: String,
    #[serde(default)]
    is_vip: bool,
}

/// Create a user.
pub async fn create_user(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let user = state.db.create_user(req.username.trim(), req.is_vip)?;
    tracing::info!(user_id = user.id, username = %user.username, "Created user");
    Ok((StatusCode::CREATED, Json(user)))
}

/// Get a user.
pub async fn get_user(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<User>> {
    state
        .db
        .get_user(id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
}

/// New bug report body.
#[derive(Debug, Deserialize)]
pub struct BugReportRequest {
    user_id: Option<i64>,
    #[serde(alias = "descricao")]
    description: String,
    #[serde(alias = "pagina_url")]
    page_url: Option<String>,
}

/// File a bug report.
pub async fn create_bug_report(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<BugReportRequest>,
) -> Result<(StatusCode, Json<BugReport>)> {
    let description = req.description.trim();
    if description.is_empty() {
        return Err(AppError::Validation(
            "Bug report description cannot be empty".to_string(),
        ));
    }

    if let Some(user_id) = req.user_id
        && state.db.get_user(user_id)?.is_none()
    {
        return Err(AppError::NotFound(format!("User {} not found", user_id)));
    }

    let page_url = req.page_url.as_deref().map(str::trim).filter(|u| !u.is_empty());
    let report = state.db.create_bug_report(req.user_id, description, page_url)?;
    tracing::info!(report_id = report.id, "Received bug report");
    Ok((StatusCode::CREATED, Json(report)))
}
