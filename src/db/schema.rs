use crate::db::seed;
use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::Path;
use std::sync::Arc;

/// Separator used by GROUP_CONCAT for genre and tag names.
const LIST_SEPARATOR: char = '\u{1f}';

const WORK_COLUMNS: &str = "o.id, o.titulo, o.slug, o.sinopse, o.status, o.capa_url, o.banner_url,
     o.tipo, o.titulo_alternativo, o.is_vip, o.created_at";

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Filters and pagination for the work listing.
#[derive(Debug, Clone, Default)]
pub struct WorkFilter {
    /// 1-based page number.
    pub page: u32,
    /// Works per page.
    pub limit: u32,
    /// Case-insensitive substring of the title.
    pub title: Option<String>,
    /// Exact type tag.
    pub work_type: Option<String>,
}

impl WorkFilter {
    /// Default page size.
    pub const DEFAULT_LIMIT: u32 = 10;
    /// Largest accepted page size.
    pub const MAX_LIMIT: u32 = 100;

    /// Build a filter, clamping page and limit into their valid ranges.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
            title: None,
            work_type: None,
        }
    }

    /// Rows to skip.
    pub fn offset(&self) -> i64 {
        (i64::from(self.page.max(1)) - 1) * i64::from(self.limit)
    }
}

/// Whether the error is a UNIQUE constraint violation.
fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        Self::from_connection(conn)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.create_scalar_function(
            "fold_case",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let value: Option<String> = ctx.get(0)?;
                Ok(value.map(|v| v.to_lowercase()))
            },
        )
        .map_err(|e| AppError::Internal(format!("Failed to register functions: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        db.seed()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Works
            CREATE TABLE IF NOT EXISTS obras (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                titulo TEXT NOT NULL,
                slug TEXT UNIQUE NOT NULL,
                sinopse TEXT,
                status TEXT NOT NULL DEFAULT 'em_andamento'
                    CHECK (status IN ('em_andamento', 'completo', 'hiato')),
                capa_url TEXT NOT NULL,
                banner_url TEXT,
                tipo TEXT,
                titulo_alternativo TEXT,
                is_vip INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            -- Chapters
            CREATE TABLE IF NOT EXISTS capitulos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                obra_id INTEGER NOT NULL,
                numero_capitulo REAL NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE (obra_id, numero_capitulo),
                FOREIGN KEY (obra_id) REFERENCES obras(id) ON DELETE CASCADE
            );

            -- Pages
            CREATE TABLE IF NOT EXISTS paginas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                capitulo_id INTEGER NOT NULL,
                numero_pagina INTEGER NOT NULL,
                imagem_url TEXT NOT NULL,
                UNIQUE (capitulo_id, numero_pagina),
                FOREIGN KEY (capitulo_id) REFERENCES capitulos(id) ON DELETE CASCADE
            );

            -- Genres and tags
            CREATE TABLE IF NOT EXISTS generos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nome TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nome TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS obra_generos (
                obra_id INTEGER NOT NULL,
                genero_id INTEGER NOT NULL,
                PRIMARY KEY (obra_id, genero_id),
                FOREIGN KEY (obra_id) REFERENCES obras(id) ON DELETE CASCADE,
                FOREIGN KEY (genero_id) REFERENCES generos(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS obra_tags (
                obra_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (obra_id, tag_id),
                FOREIGN KEY (obra_id) REFERENCES obras(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );

            -- Badges
            CREATE TABLE IF NOT EXISTS titulos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nome TEXT UNIQUE NOT NULL,
                descricao TEXT
            );

            -- Readers
            CREATE TABLE IF NOT EXISTS usuarios (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                is_vip INTEGER NOT NULL DEFAULT 0,
                titulo_id INTEGER,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (titulo_id) REFERENCES titulos(id) ON DELETE SET NULL
            );

            CREATE TABLE IF NOT EXISTS comentarios (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                usuario_id INTEGER NOT NULL,
                capitulo_id INTEGER NOT NULL,
                conteudo TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (usuario_id) REFERENCES usuarios(id) ON DELETE CASCADE,
                FOREIGN KEY (capitulo_id) REFERENCES capitulos(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS bug_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                usuario_id INTEGER,
                descricao TEXT NOT NULL,
                pagina_url TEXT,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (usuario_id) REFERENCES usuarios(id) ON DELETE SET NULL
            );

            -- Key/value settings
            CREATE TABLE IF NOT EXISTS configuracoes (
                chave TEXT PRIMARY KEY,
                valor TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_obras_created ON obras(created_at);
            CREATE INDEX IF NOT EXISTS idx_capitulos_obra ON capitulos(obra_id);
            CREATE INDEX IF NOT EXISTS idx_paginas_capitulo ON paginas(capitulo_id);
            CREATE INDEX IF NOT EXISTS idx_comentarios_capitulo ON comentarios(capitulo_id);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Insert default genres, tags, badges and settings that are not present yet.
    fn seed(&self) -> Result<()> {
        self.transaction(|tx| {
            let mut genre = tx.prepare("INSERT OR IGNORE INTO generos (nome) VALUES (?1)")?;
            for name in seed::GENRES {
                genre.execute(params![name])?;
            }

            let mut tag = tx.prepare("INSERT OR IGNORE INTO tags (nome) VALUES (?1)")?;
            for name in seed::TAGS {
                tag.execute(params![name])?;
            }

            let mut title =
                tx.prepare("INSERT OR IGNORE INTO titulos (nome, descricao) VALUES (?1, ?2)")?;
            for (name, description) in seed::TITLES {
                title.execute(params![name, description])?;
            }

            let mut setting =
                tx.prepare("INSERT OR IGNORE INTO configuracoes (chave, valor) VALUES (?1, ?2)")?;
            for (key, value) in seed::SETTINGS {
                setting.execute(params![key, value])?;
            }

            Ok(())
        })
        .map_err(|e| AppError::Internal(format!("Failed to seed database: {}", e)))
    }

    /// Run `f` inside a transaction: committed when it returns `Ok`, rolled back otherwise.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        let value = f(&tx)?;

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to commit transaction: {}", e)))?;
        Ok(value)
    }

    // ========== WORK OPERATIONS ==========

    /// Insert a work inside an open transaction. Returns the new ID.
    pub fn insert_work_tx(conn: &Connection, work: &NewWork) -> Result<i64> {
        conn.execute(
            "INSERT INTO obras (titulo, slug, sinopse, status, capa_url, banner_url, tipo,
                                titulo_alternativo, is_vip, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                work.title,
                work.slug,
                work.synopsis,
                work.status.as_str(),
                work.cover_url,
                work.banner_url,
                work.work_type,
                work.alternate_title,
                work.is_vip,
                now_timestamp(),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("A work with slug '{}' already exists", work.slug))
            } else {
                AppError::Internal(format!("Failed to create work: {}", e))
            }
        })?;

        Ok(conn.last_insert_rowid())
    }

    /// Link a work to genres by name. Returns the names that matched no genre.
    pub fn link_genres_tx(conn: &Connection, work_id: i64, names: &[String]) -> Result<Vec<String>> {
        Self::link_named_tx(
            conn,
            work_id,
            names,
            "SELECT id FROM generos WHERE fold_case(nome) = fold_case(?1)",
            "INSERT OR IGNORE INTO obra_generos (obra_id, genero_id) VALUES (?1, ?2)",
        )
    }

    /// Link a work to tags by name. Returns the names that matched no tag.
    pub fn link_tags_tx(conn: &Connection, work_id: i64, names: &[String]) -> Result<Vec<String>> {
        Self::link_named_tx(
            conn,
            work_id,
            names,
            "SELECT id FROM tags WHERE fold_case(nome) = fold_case(?1)",
            "INSERT OR IGNORE INTO obra_tags (obra_id, tag_id) VALUES (?1, ?2)",
        )
    }

    fn link_named_tx(
        conn: &Connection,
        work_id: i64,
        names: &[String],
        lookup_sql: &str,
        link_sql: &str,
    ) -> Result<Vec<String>> {
        let mut unknown = Vec::new();

        for name in names {
            let id: Option<i64> = conn
                .query_row(lookup_sql, params![name], |row| row.get(0))
                .optional()?;

            match id {
                Some(id) => {
                    conn.execute(link_sql, params![work_id, id])?;
                }
                None => unknown.push(name.clone()),
            }
        }

        Ok(unknown)
    }

    /// List works, newest first, with genre and tag names.
    pub fn list_works(&self, filter: &WorkFilter) -> Result<Vec<WorkSummary>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {WORK_COLUMNS},
                (SELECT GROUP_CONCAT(g.nome, char(31)) FROM obra_generos og
                    JOIN generos g ON og.genero_id = g.id WHERE og.obra_id = o.id) AS generos,
                (SELECT GROUP_CONCAT(t.nome, char(31)) FROM obra_tags ot
                    JOIN tags t ON ot.tag_id = t.id WHERE ot.obra_id = o.id) AS tags
             FROM obras o
             WHERE (?1 IS NULL OR instr(fold_case(o.titulo), fold_case(?1)) > 0)
               AND (?2 IS NULL OR o.tipo = ?2)
             ORDER BY o.created_at DESC, o.id DESC
             LIMIT ?3 OFFSET ?4"
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let works = stmt
            .query_map(
                params![
                    filter.title,
                    filter.work_type,
                    i64::from(filter.limit),
                    filter.offset()
                ],
                |row| {
                    let genres: Option<String> = row.get(11)?;
                    let tags: Option<String> = row.get(12)?;
                    Ok(WorkSummary {
                        work: Self::row_to_work(row)?,
                        genres: split_names(genres),
                        tags: split_names(tags),
                    })
                },
            )
            .map_err(|e| AppError::Internal(format!("Failed to list works: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect works: {}", e)))?;

        Ok(works)
    }

    /// Get work by slug.
    pub fn get_work_by_slug(&self, slug: &str) -> Result<Option<Work>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {WORK_COLUMNS} FROM obras o WHERE o.slug = ?1"),
            params![slug],
            Self::row_to_work,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get work: {}", e)))
    }

    /// Get work by ID.
    pub fn get_work(&self, id: i64) -> Result<Option<Work>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {WORK_COLUMNS} FROM obras o WHERE o.id = ?1"),
            params![id],
            Self::row_to_work,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get work: {}", e)))
    }

    /// Delete a work inside an open transaction; chapters, pages and
    /// genre/tag links cascade.
    pub fn delete_work_tx(conn: &Connection, slug: &str) -> Result<bool> {
        let rows = conn
            .execute("DELETE FROM obras WHERE slug = ?1", params![slug])
            .map_err(|e| AppError::Internal(format!("Failed to delete work: {}", e)))?;
        Ok(rows > 0)
    }

    fn row_to_work(row: &rusqlite::Row<'_>) -> rusqlite::Result<Work> {
        let status: String = row.get(4)?;
        Ok(Work {
            id: row.get(0)?,
            title: row.get(1)?,
            slug: row.get(2)?,
            synopsis: row.get(3)?,
            status: status.parse().unwrap_or_default(),
            cover_url: row.get(5)?,
            banner_url: row.get(6)?,
            work_type: row.get(7)?,
            alternate_title: row.get(8)?,
            is_vip: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    // ========== CHAPTER OPERATIONS ==========

    /// Insert a chapter inside an open transaction. Returns the new ID.
    pub fn insert_chapter_tx(conn: &Connection, work_id: i64, number: f64) -> Result<i64> {
        conn.execute(
            "INSERT INTO capitulos (obra_id, numero_capitulo, created_at) VALUES (?1, ?2, ?3)",
            params![work_id, number, now_timestamp()],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!(
                    "Chapter {} already exists for this work",
                    format_chapter_number(number)
                ))
            } else {
                AppError::Internal(format!("Failed to create chapter: {}", e))
            }
        })?;

        Ok(conn.last_insert_rowid())
    }

    /// Get chapter by ID.
    pub fn get_chapter(&self, id: i64) -> Result<Option<Chapter>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, obra_id, numero_capitulo, created_at FROM capitulos WHERE id = ?1",
            params![id],
            Self::row_to_chapter,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get chapter: {}", e)))
    }

    /// Chapters of a work ordered by chapter number.
    pub fn list_chapters(&self, work_id: i64) -> Result<Vec<Chapter>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, obra_id, numero_capitulo, created_at
                 FROM capitulos WHERE obra_id = ?1 ORDER BY numero_capitulo ASC",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let chapters = stmt
            .query_map(params![work_id], Self::row_to_chapter)
            .map_err(|e| AppError::Internal(format!("Failed to list chapters: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect chapters: {}", e)))?;

        Ok(chapters)
    }

    /// Delete a chapter inside an open transaction; its pages and comments
    /// cascade. Returns the owning work's slug and the chapter number.
    pub fn delete_chapter_tx(conn: &Connection, id: i64) -> Result<Option<(String, f64)>> {
        let location: Option<(String, f64)> = conn
            .query_row(
                "SELECT o.slug, c.numero_capitulo
                 FROM capitulos c JOIN obras o ON o.id = c.obra_id
                 WHERE c.id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to get chapter: {}", e)))?;

        if location.is_some() {
            conn.execute("DELETE FROM capitulos WHERE id = ?1", params![id])
                .map_err(|e| AppError::Internal(format!("Failed to delete chapter: {}", e)))?;
        }
        Ok(location)
    }

    fn row_to_chapter(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chapter> {
        Ok(Chapter {
            id: row.get(0)?,
            work_id: row.get(1)?,
            number: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    // ========== PAGE OPERATIONS ==========

    /// Insert a page inside an open transaction. Returns the new ID.
    pub fn insert_page_tx(conn: &Connection, chapter_id: i64, number: i64, url: &str) -> Result<i64> {
        conn.execute(
            "INSERT INTO paginas (capitulo_id, numero_pagina, imagem_url) VALUES (?1, ?2, ?3)",
            params![chapter_id, number, url],
        )
        .map_err(|e| AppError::Internal(format!("Failed to insert page {}: {}", number, e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Pages of a chapter ordered by page number.
    pub fn list_pages(&self, chapter_id: i64) -> Result<Vec<Page>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, imagem_url, numero_pagina
                 FROM paginas WHERE capitulo_id = ?1 ORDER BY numero_pagina ASC",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let pages = stmt
            .query_map(params![chapter_id], |row| {
                Ok(Page {
                    id: row.get(0)?,
                    image_url: row.get(1)?,
                    number: row.get(2)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list pages: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect pages: {}", e)))?;

        Ok(pages)
    }

    // ========== REFERENCE DATA ==========

    /// All genres ordered by name.
    pub fn list_genres(&self) -> Result<Vec<NamedRow>> {
        self.list_named("SELECT id, nome FROM generos ORDER BY nome")
    }

    /// All tags ordered by name.
    pub fn list_tags(&self) -> Result<Vec<NamedRow>> {
        self.list_named("SELECT id, nome FROM tags ORDER BY nome")
    }

    fn list_named(&self, sql: &str) -> Result<Vec<NamedRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(NamedRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list rows: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect rows: {}", e)))?;

        Ok(rows)
    }

    /// All badges ordered by name.
    pub fn list_titles(&self) -> Result<Vec<Title>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, nome, descricao FROM titulos ORDER BY nome")
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let titles = stmt
            .query_map([], |row| {
                Ok(Title {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list titles: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect titles: {}", e)))?;

        Ok(titles)
    }

    /// Read a setting value.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT valor FROM configuracoes WHERE chave = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get setting: {}", e)))
    }

    /// Insert or replace a setting value.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO configuracoes (chave, valor) VALUES (?1, ?2)
             ON CONFLICT(chave) DO UPDATE SET valor = excluded.valor",
            params![key, value],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save setting: {}", e)))?;
        Ok(())
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user.
    pub fn create_user(&self, username: &str, is_vip: bool) -> Result<User> {
        if username.is_empty() || username.chars().count() > 64 {
            return Err(AppError::Validation(
                "Username must be 1-64 characters".to_string(),
            ));
        }

        if !username
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(AppError::Validation(
                "Username can only contain letters, numbers, _ and -".to_string(),
            ));
        }

        let conn = self.conn.lock();
        let created_at = now_timestamp();
        conn.execute(
            "INSERT INTO usuarios (username, is_vip, created_at) VALUES (?1, ?2, ?3)",
            params![username, is_vip, created_at],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Username '{}' already exists", username))
            } else {
                AppError::Internal(format!("Failed to create user: {}", e))
            }
        })?;

        Ok(User {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            is_vip,
            title_id: None,
            created_at,
        })
    }

    /// Get user by ID.
    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, username, is_vip, titulo_id, created_at FROM usuarios WHERE id = ?1",
            params![id],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, username, is_vip, titulo_id, created_at FROM usuarios ORDER BY username",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], Self::row_to_user)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    /// Delete user; their comments cascade.
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM usuarios WHERE username = ?1", params![username])
            .map_err(|e| AppError::Internal(format!("Failed to delete user: {}", e)))?;
        Ok(rows > 0)
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            is_vip: row.get(2)?,
            title_id: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    // ========== COMMENTS & BUG REPORTS ==========

    /// Add a comment to a chapter.
    pub fn add_comment(&self, user_id: i64, chapter_id: i64, content: &str) -> Result<Comment> {
        let conn = self.conn.lock();
        let created_at = now_timestamp();
        conn.execute(
            "INSERT INTO comentarios (usuario_id, capitulo_id, conteudo, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, chapter_id, content, created_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to add comment: {}", e)))?;
        let id = conn.last_insert_rowid();

        let username: String = conn
            .query_row(
                "SELECT username FROM usuarios WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Internal(format!("Failed to get comment author: {}", e)))?;

        Ok(Comment {
            id,
            user_id,
            username,
            chapter_id,
            content: content.to_string(),
            created_at,
        })
    }

    /// Comments of a chapter, oldest first.
    pub fn list_comments(&self, chapter_id: i64) -> Result<Vec<Comment>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.usuario_id, u.username, c.capitulo_id, c.conteudo, c.created_at
                 FROM comentarios c JOIN usuarios u ON c.usuario_id = u.id
                 WHERE c.capitulo_id = ?1 ORDER BY c.created_at ASC, c.id ASC",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let comments = stmt
            .query_map(params![chapter_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    username: row.get(2)?,
                    chapter_id: row.get(3)?,
                    content: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list comments: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect comments: {}", e)))?;

        Ok(comments)
    }

    /// Store a bug report.
    pub fn create_bug_report(
        &self,
        user_id: Option<i64>,
        description: &str,
        page_url: Option<&str>,
    ) -> Result<BugReport> {
        let conn = self.conn.lock();
        let created_at = now_timestamp();
        conn.execute(
            "INSERT INTO bug_reports (usuario_id, descricao, pagina_url, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, description, page_url, created_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save bug report: {}", e)))?;

        Ok(BugReport {
            id: conn.last_insert_rowid(),
            user_id,
            description: description.to_string(),
            page_url: page_url.map(String::from),
            created_at,
        })
    }
}

/// Split a GROUP_CONCAT result into sorted names.
fn split_names(joined: Option<String>) -> Vec<String> {
    let mut names: Vec<String> = joined
        .map(|j| j.split(LIST_SEPARATOR).map(String::from).collect())
        .unwrap_or_default();
    names.sort();
    names
}
