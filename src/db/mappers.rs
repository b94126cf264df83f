use super::entities::*;
use rusqlite::{Error, Row};

// Column order follows the ARTICLE_COLUMNS list in mod.rs.
// Labels live in their own tables and get attached afterwards.
pub fn map_article(row: &Row) -> Result<Article, Error> {
  Ok(Article {
    id: row.get(0)?,
    slug: row.get(1)?,
    title: row.get(2)?,
    excerpt: row.get(3)?,
    cover: row.get(4)?,
    date: row.get(5)?,
    author: row.get(6)?,
    content: row.get(7)?,
    created_at: row.get(8)?,
    updated_at: row.get(9)?,
    categories: Vec::new(),
    tags: Vec::new()
  })
}

pub fn map_attendance(row: &Row) -> Result<Attendance, Error> {
  Ok(Attendance {
    id: row.get(0)?,
    name: row.get(1)?,
    phone: row.get(2)?,
    event: row.get(3)?,
    date: row.get(4)?,
    confirmed: row.get(5)?,
    sms_sent: row.get(6)?,
    sms_sent_at: row.get(7)?,
    sms_message_id: row.get(8)?,
    sms_error: row.get(9)?,
    created_at: row.get(10)?
  })
}

pub fn map_label_count(row: &Row) -> Result<LabelCount, Error> {
  Ok(LabelCount {
    name: row.get(0)?,
    count: row.get(1)?
  })
}
