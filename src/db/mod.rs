use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use r2d2_sqlite::SqliteConnectionManager;
use std::time::Duration;

pub mod entities;
mod helpers;
mod mappers;
pub mod queries;

use crate::utils::time_utils::current_timestamp;
use entities::*;
use helpers::{dedup_labels, generate_field_equal_qmark};
use mappers::{map_article, map_attendance, map_label_count};
use queries::*;

// Type alias to make function signatures much clearer:
pub type Pool = r2d2::Pool<SqliteConnectionManager>;

/**
 * All the DB stuff in a non-async way. The handlers await on
 * other things, SQLite calls are fast enough to stay sync.
 *
 * Uniqueness is the interesting part in here: article slugs
 * and (phone, event) pairs both carry a UNIQUE index, and a
 * violation of either comes back as DbError::Conflict. For
 * article creation we don't even pre-check, we just insert
 * and let the index arbitrate concurrent requests.
 */

const ARTICLE_COLUMNS: &str =
  "id, slug, title, excerpt, cover, date, author, content, created_at, updated_at";
const ATTENDANCE_COLUMNS: &str =
  "id, name, phone, event, date, confirmed, sms_sent, sms_sent_at, \
  sms_message_id, sms_error, created_at";

#[derive(Debug, derive_more::Display)]
pub enum DbError {
  #[display(fmt = "unique constraint hit: {}", _0)]
  Conflict(String),
  #[display(fmt = "no matching record")]
  NotFound,
  #[display(fmt = "database error: {}", _0)]
  Sqlite(rusqlite::Error),
  #[display(fmt = "connection pool error: {}", _0)]
  Pool(r2d2::Error)
}

impl std::error::Error for DbError {}

impl From<rusqlite::Error> for DbError {
  fn from(err: rusqlite::Error) -> Self {
    match err {
      rusqlite::Error::QueryReturnedNoRows => DbError::NotFound,
      rusqlite::Error::SqliteFailure(e, msg)
        if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
          || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
      {
        DbError::Conflict(msg.unwrap_or_else(|| "unique constraint".to_string()))
      }
      other => DbError::Sqlite(other)
    }
  }
}

impl From<r2d2::Error> for DbError {
  fn from(err: r2d2::Error) -> Self {
    DbError::Pool(err)
  }
}

pub type DbResult<T> = Result<T, DbError>;

// Which of the two label tables we're talking to.
#[derive(Debug, Clone, Copy)]
pub enum LabelField {
  Categories,
  Tags
}

impl LabelField {
  fn table(&self) -> &'static str {
    match self {
      LabelField::Categories => "article_categories",
      LabelField::Tags => "article_tags"
    }
  }
}

// The whole schema, unique indexes included. Everything is
// IF NOT EXISTS so running it twice is a no-op.
const SCHEMA: &str =
  "CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slug TEXT NOT NULL,
    title TEXT NOT NULL,
    excerpt TEXT,
    cover TEXT,
    date INTEGER NOT NULL,
    author TEXT NOT NULL,
    content TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
  );
  CREATE UNIQUE INDEX IF NOT EXISTS idx_articles_slug
    ON articles (slug);
  CREATE INDEX IF NOT EXISTS idx_articles_listing
    ON articles (date DESC, created_at DESC);
  CREATE TABLE IF NOT EXISTS article_categories (
    article_id INTEGER NOT NULL REFERENCES articles (id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    label TEXT NOT NULL,
    PRIMARY KEY (article_id, position)
  );
  CREATE INDEX IF NOT EXISTS idx_article_categories_label
    ON article_categories (LOWER(label));
  CREATE TABLE IF NOT EXISTS article_tags (
    article_id INTEGER NOT NULL REFERENCES articles (id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    label TEXT NOT NULL,
    PRIMARY KEY (article_id, position)
  );
  CREATE INDEX IF NOT EXISTS idx_article_tags_label
    ON article_tags (LOWER(label));
  CREATE TABLE IF NOT EXISTS attendance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    phone TEXT NOT NULL,
    event TEXT NOT NULL,
    date INTEGER NOT NULL,
    confirmed INTEGER NOT NULL DEFAULT 1,
    sms_sent INTEGER NOT NULL DEFAULT 0,
    sms_sent_at INTEGER,
    sms_message_id TEXT,
    sms_error TEXT,
    created_at INTEGER NOT NULL
  );
  CREATE UNIQUE INDEX IF NOT EXISTS idx_attendance_phone_event
    ON attendance (phone, event);";

/**
 * When the database file first gets touched. Eager opens the
 * pool and bootstraps the schema before the server binds, so
 * a broken DB path kills the process right at startup. Lazy
 * leaves the file alone until the first request checks out a
 * connection, the bootstrap then rides along in the
 * connection init.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectStrategy {
  Eager,
  Lazy
}

impl ConnectStrategy {
  // Anything that isn't "lazy" means eager, failing fast is
  // the saner default.
  pub fn from_param(value: &str) -> Self {
    if value.eq_ignore_ascii_case("lazy") {
      ConnectStrategy::Lazy
    } else {
      ConnectStrategy::Eager
    }
  }
}

fn file_manager(db_path: &str, bootstrap_schema: bool) -> SqliteConnectionManager {
  SqliteConnectionManager::file(db_path).with_init(move |conn| {
    // SQLite won't honor the ON DELETE CASCADE without this,
    // and the busy timeout covers concurrent writers.
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    if bootstrap_schema {
      conn.execute_batch(SCHEMA)?;
    }
    Ok(())
  })
}

/**
 * The one way to get a Pool. Both strategies end up with the
 * same bounded pool and the same schema, they only differ in
 * WHEN the work happens, see ConnectStrategy.
 */
pub fn open_pool(
  db_path: &str,
  pool_size: u32,
  strategy: ConnectStrategy
) -> DbResult<Pool> {
  let builder = r2d2::Pool::builder()
    .max_size(pool_size)
    .connection_timeout(Duration::from_secs(5));
  match strategy {
    ConnectStrategy::Eager => {
      let pool = builder.build(file_manager(db_path, false))?;
      init_schema(&pool)?;
      Ok(pool)
    }
    // min_idle of zero keeps the pool from opening connections
    // in the background before anyone asked for one.
    ConnectStrategy::Lazy => Ok(
      builder
        .min_idle(Some(0))
        .build_unchecked(file_manager(db_path, true))
    )
  }
}

// Idempotent, the eager startup path and the tests run it
// explicitly.
pub fn init_schema(pool: &Pool) -> DbResult<()> {
  let conn = pool.get()?;
  conn.execute_batch(SCHEMA)?;
  Ok(())
}

/**
 * Generic select. Stole most of the signature from the
 * rusqlite doc, careful to use a later version of the crate,
 * Google takes you to old versions.
 */
fn select_many<T, P, F>(
  pool: &Pool,
  query: &str,
  params: P,
  mapper: F
) -> DbResult<Vec<T>>
where
  P: rusqlite::Params,
  F: FnMut(&Row<'_>) -> Result<T, rusqlite::Error>,
{
  let conn = pool.get()?;
  let mut stmt = conn.prepare(query)?;
  let items = stmt
    .query_map(params, mapper)?
    .collect::<Result<Vec<T>, rusqlite::Error>>()?;
  Ok(items)
}

fn count_rows(
  pool: &Pool,
  q_from: &Vec<String>,
  q_where: Option<&Vec<String>>,
  params: &[Value]
) -> DbResult<i64> {
  let query = select_query_builder(
    &vec!["count(*)".to_string()],
    q_from,
    q_where,
    &vec![],
    None,
    None
  );
  let conn = pool.get()?;
  let count: i64 = conn.query_row(
    &query,
    params_from_iter(params.iter()),
    |row| row.get(0)
  )?;
  Ok(count)
}

// Label plumbing works on a plain Connection so it can run
// inside transactions too.
fn labels_for_article(
  conn: &Connection,
  field: LabelField,
  article_id: i64
) -> Result<Vec<String>, rusqlite::Error> {
  let mut stmt = conn.prepare(&format!(
    "SELECT label FROM {} WHERE article_id = ? ORDER BY position ASC",
    field.table()
  ))?;
  let labels = stmt
    .query_map(params![article_id], |row| row.get(0))?
    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
  Ok(labels)
}

fn replace_labels(
  conn: &Connection,
  field: LabelField,
  article_id: i64,
  labels: &[String]
) -> Result<(), rusqlite::Error> {
  conn.execute(
    &format!("DELETE FROM {} WHERE article_id = ?", field.table()),
    params![article_id]
  )?;
  let mut stmt = conn.prepare(&format!(
    "INSERT INTO {} (article_id, position, label) VALUES (?, ?, ?)",
    field.table()
  ))?;
  for (position, label) in dedup_labels(labels).iter().enumerate() {
    stmt.execute(params![article_id, position as i64, label])?;
  }
  Ok(())
}

fn hydrate_article(
  conn: &Connection,
  mut article: Article
) -> Result<Article, rusqlite::Error> {
  article.categories = labels_for_article(conn, LabelField::Categories, article.id)?;
  article.tags = labels_for_article(conn, LabelField::Tags, article.id)?;
  Ok(article)
}

fn article_by_id_conn(
  conn: &Connection,
  id: i64
) -> Result<Article, rusqlite::Error> {
  let article = conn.query_row(
    &format!("SELECT {} FROM articles WHERE id = ?", ARTICLE_COLUMNS),
    params![id],
    map_article
  )?;
  hydrate_article(conn, article)
}

fn slug_exists(conn: &Connection, slug: &str) -> Result<bool, rusqlite::Error> {
  let count: i64 = conn.query_row(
    "SELECT count(*) FROM articles WHERE slug = ?",
    params![slug],
    |row| row.get(0)
  )?;
  Ok(count > 0)
}

// No pre-check on purpose: we insert and let the unique index
// on slug arbitrate concurrent creations.
pub fn insert_article(pool: &Pool, article: &NewArticle) -> DbResult<Article> {
  let mut conn = pool.get()?;
  let tx = conn.transaction()?;
  let now = current_timestamp();
  tx.execute(
    "INSERT INTO articles \
    (slug, title, excerpt, cover, date, author, content, created_at, updated_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    params![
      article.slug,
      article.title,
      article.excerpt,
      article.cover,
      article.date,
      article.author,
      article.content,
      now,
      now
    ]
  )?;
  let id = tx.last_insert_rowid();
  replace_labels(&tx, LabelField::Categories, id, &article.categories)?;
  replace_labels(&tx, LabelField::Tags, id, &article.tags)?;
  let created = article_by_id_conn(&tx, id)?;
  tx.commit()?;
  Ok(created)
}

pub fn article_by_id(pool: &Pool, id: i64) -> DbResult<Article> {
  let conn = pool.get()?;
  Ok(article_by_id_conn(&conn, id)?)
}

pub fn article_by_slug(pool: &Pool, slug: &str) -> DbResult<Article> {
  let conn = pool.get()?;
  let article = conn.query_row(
    &format!("SELECT {} FROM articles WHERE slug = ?", ARTICLE_COLUMNS),
    params![slug],
    map_article
  )?;
  Ok(hydrate_article(&conn, article)?)
}

// Routes accept a numeric id or a slug in the same path
// segment. Numeric tokens try the id first and fall back to
// the slug, someone could name an article "2024".
pub fn article_by_token(pool: &Pool, token: &str) -> DbResult<Article> {
  if let Ok(id) = token.parse::<i64>() {
    match article_by_id(pool, id) {
      Err(DbError::NotFound) => {}
      other => return other
    }
  }
  article_by_slug(pool, token)
}

// Newest content first, creation time then id as tie-breaks so
// pages can't reshuffle between requests.
fn article_order() -> Vec<OrderBy> {
  vec![
    OrderBy::new(Order::Desc, "date".to_string()),
    OrderBy::new(Order::Desc, "created_at".to_string()),
    OrderBy::new(Order::Desc, "id".to_string())
  ]
}

fn article_field_list() -> Vec<String> {
  ARTICLE_COLUMNS.split(", ").map(str::to_string).collect()
}

pub fn list_articles(
  pool: &Pool,
  filter: &ArticleFilter,
  pagination: &Pagination
) -> DbResult<(Vec<Article>, i64)> {
  let (clauses, q_params) = filter.to_sql();
  let q_where = if clauses.is_empty() { None } else { Some(&clauses) };
  let total = count_rows(pool, &vec!["articles".to_string()], q_where, &q_params)?;
  let query = select_query_builder(
    &article_field_list(),
    &vec!["articles".to_string()],
    q_where,
    &article_order(),
    Some(pagination.limit),
    Some(pagination.offset())
  );
  let conn = pool.get()?;
  let mut stmt = conn.prepare(&query)?;
  let articles = stmt
    .query_map(params_from_iter(q_params.iter()), map_article)?
    .collect::<Result<Vec<Article>, rusqlite::Error>>()?;
  let mut hydrated = Vec::with_capacity(articles.len());
  for article in articles {
    hydrated.push(hydrate_article(&conn, article)?);
  }
  Ok((hydrated, total))
}

pub fn update_article(pool: &Pool, update: &ArticleUpdate) -> DbResult<Article> {
  let mut conn = pool.get()?;
  let tx = conn.transaction()?;
  let current = tx.query_row(
    &format!("SELECT {} FROM articles WHERE id = ?", ARTICLE_COLUMNS),
    params![update.id],
    map_article
  )?;
  // Renames get a pre-check for a friendlier error, the unique
  // index still backstops a lost race.
  if let Some(slug) = &update.slug {
    if *slug != current.slug && slug_exists(&tx, slug)? {
      return Err(DbError::Conflict(format!("slug already in use: {}", slug)));
    }
  }
  let mut sets: Vec<String> = Vec::new();
  let mut values: Vec<Value> = Vec::new();
  if let Some(slug) = &update.slug {
    sets.push(generate_field_equal_qmark("slug"));
    values.push(Value::Text(slug.clone()));
  }
  if let Some(title) = &update.title {
    sets.push(generate_field_equal_qmark("title"));
    values.push(Value::Text(title.clone()));
  }
  if let Some(excerpt) = &update.excerpt {
    sets.push(generate_field_equal_qmark("excerpt"));
    values.push(Value::Text(excerpt.clone()));
  }
  if let Some(cover) = &update.cover {
    sets.push(generate_field_equal_qmark("cover"));
    values.push(match cover {
      Some(url) => Value::Text(url.clone()),
      None => Value::Null
    });
  }
  if let Some(date) = update.date {
    sets.push(generate_field_equal_qmark("date"));
    values.push(Value::Integer(date));
  }
  if let Some(author) = &update.author {
    sets.push(generate_field_equal_qmark("author"));
    values.push(Value::Text(author.clone()));
  }
  if let Some(content) = &update.content {
    sets.push(generate_field_equal_qmark("content"));
    values.push(Value::Text(content.clone()));
  }
  sets.push(generate_field_equal_qmark("updated_at"));
  values.push(Value::Integer(current_timestamp()));
  values.push(Value::Integer(update.id));
  tx.execute(
    &format!("UPDATE articles SET {} WHERE id = ?", sets.join(", ")),
    params_from_iter(values.iter())
  )?;
  if let Some(categories) = &update.categories {
    replace_labels(&tx, LabelField::Categories, update.id, categories)?;
  }
  if let Some(tags) = &update.tags {
    replace_labels(&tx, LabelField::Tags, update.id, tags)?;
  }
  let updated = article_by_id_conn(&tx, update.id)?;
  tx.commit()?;
  Ok(updated)
}

// Returns the deleted article so the caller can clean up the
// cover object. Label rows go away through ON DELETE CASCADE.
pub fn delete_article(pool: &Pool, token: &str) -> DbResult<Article> {
  let article = article_by_token(pool, token)?;
  let conn = pool.get()?;
  conn.execute("DELETE FROM articles WHERE id = ?", params![article.id])?;
  Ok(article)
}

// The categories and tags facets: unwind, lowercase, group,
// count, alphabetical.
pub fn label_counts(pool: &Pool, field: LabelField) -> DbResult<Vec<LabelCount>> {
  select_many(
    pool,
    &format!(
      "SELECT LOWER(label) AS name, count(*) AS count \
      FROM {} GROUP BY LOWER(label) ORDER BY name ASC",
      field.table()
    ),
    params![],
    map_label_count
  )
}

fn attendance_by_id_conn(
  conn: &Connection,
  id: i64
) -> Result<Attendance, rusqlite::Error> {
  conn.query_row(
    &format!("SELECT {} FROM attendance WHERE id = ?", ATTENDANCE_COLUMNS),
    params![id],
    map_attendance
  )
}

pub fn attendance_by_id(pool: &Pool, id: i64) -> DbResult<Attendance> {
  let conn = pool.get()?;
  Ok(attendance_by_id_conn(&conn, id)?)
}

pub fn attendance_exists(pool: &Pool, phone: &str, event: &str) -> DbResult<bool> {
  let conn = pool.get()?;
  let count: i64 = conn.query_row(
    "SELECT count(*) FROM attendance WHERE phone = ? AND event = ?",
    params![phone, event],
    |row| row.get(0)
  )?;
  Ok(count > 0)
}

// Friendly pre-check first, but the compound unique index on
// (phone, event) is what actually settles concurrent inserts.
pub fn insert_attendance(pool: &Pool, attendance: &NewAttendance) -> DbResult<Attendance> {
  if attendance_exists(pool, &attendance.phone, &attendance.event)? {
    return Err(DbError::Conflict(format!(
      "already registered: {} / {}",
      attendance.phone, attendance.event
    )));
  }
  let conn = pool.get()?;
  conn.execute(
    "INSERT INTO attendance \
    (name, phone, event, date, confirmed, sms_sent, created_at) \
    VALUES (?, ?, ?, ?, ?, 0, ?)",
    params![
      attendance.name,
      attendance.phone,
      attendance.event,
      attendance.date,
      attendance.confirmed,
      current_timestamp()
    ]
  )?;
  let id = conn.last_insert_rowid();
  Ok(attendance_by_id_conn(&conn, id)?)
}

fn attendance_field_list() -> Vec<String> {
  ATTENDANCE_COLUMNS.split(", ").map(str::to_string).collect()
}

pub fn list_attendance(
  pool: &Pool,
  filter: &AttendanceFilter,
  order: OrderBy,
  pagination: &Pagination
) -> DbResult<(Vec<Attendance>, i64)> {
  let (clauses, q_params) = filter.to_sql();
  let q_where = if clauses.is_empty() { None } else { Some(&clauses) };
  let total = count_rows(pool, &vec!["attendance".to_string()], q_where, &q_params)?;
  // Secondary id sort keeps pages stable when the sort field
  // has duplicate values.
  let query = select_query_builder(
    &attendance_field_list(),
    &vec!["attendance".to_string()],
    q_where,
    &vec![order, OrderBy::new(Order::Desc, "id".to_string())],
    Some(pagination.limit),
    Some(pagination.offset())
  );
  let conn = pool.get()?;
  let mut stmt = conn.prepare(&query)?;
  let items = stmt
    .query_map(params_from_iter(q_params.iter()), map_attendance)?
    .collect::<Result<Vec<Attendance>, rusqlite::Error>>()?;
  Ok((items, total))
}

// The only mutation attendance records get: the SMS delivery
// outcome.
pub fn update_attendance_sms(
  pool: &Pool,
  id: i64,
  sent: bool,
  message_id: Option<&str>,
  error: Option<&str>
) -> DbResult<Attendance> {
  let conn = pool.get()?;
  let sent_at: Option<i64> = if sent { Some(current_timestamp()) } else { None };
  let changed = conn.execute(
    "UPDATE attendance \
    SET sms_sent = ?, sms_sent_at = ?, sms_message_id = ?, sms_error = ? \
    WHERE id = ?",
    params![sent, sent_at, message_id, error, id]
  )?;
  if changed == 0 {
    return Err(DbError::NotFound);
  }
  Ok(attendance_by_id_conn(&conn, id)?)
}

pub fn delete_attendance(pool: &Pool, id: i64) -> DbResult<Attendance> {
  let attendance = attendance_by_id(pool, id)?;
  let conn = pool.get()?;
  conn.execute("DELETE FROM attendance WHERE id = ?", params![id])?;
  Ok(attendance)
}

#[cfg(test)]
pub fn test_pool() -> Pool {
  // Every connection to :memory: is its own database, a one
  // connection pool keeps all the tests on the same one.
  let manager = SqliteConnectionManager::memory().with_init(|conn| {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
  });
  let pool = r2d2::Pool::builder()
    .max_size(1)
    .build(manager)
    .unwrap();
  init_schema(&pool).unwrap();
  pool
}
