use serde::{Deserialize, Serialize};

// Simple datatypes mirroring the tables, which is something
// SQLite fits naturally into. Dates are unix timestamps all
// the way down here, the DTO layer turns them into strings.

#[derive(Debug, Serialize, Deserialize)]
pub struct Article {
  pub id: i64,
  pub slug: String,
  pub title: String,
  pub excerpt: Option<String>,
  pub cover: Option<String>,
  pub date: i64,
  pub author: String,
  pub content: Option<String>,
  pub created_at: i64,
  pub updated_at: i64,
  pub categories: Vec<String>,
  pub tags: Vec<String>
}

// Everything an insert needs, ids and timestamps are the
// database's business.
#[derive(Debug)]
pub struct NewArticle {
  pub slug: String,
  pub title: String,
  pub excerpt: Option<String>,
  pub cover: Option<String>,
  pub date: i64,
  pub author: String,
  pub content: Option<String>,
  pub categories: Vec<String>,
  pub tags: Vec<String>
}

// Object I use to fit my "update only what's in the request
// body" agenda.
#[derive(Debug)]
pub struct ArticleUpdate {
  pub id: i64,
  pub slug: Option<String>,
  pub title: Option<String>,
  pub excerpt: Option<String>,
  // Double Option: Some(None) clears the cover, a plain None
  // leaves it alone.
  pub cover: Option<Option<String>>,
  pub date: Option<i64>,
  pub author: Option<String>,
  pub content: Option<String>,
  pub categories: Option<Vec<String>>,
  pub tags: Option<Vec<String>>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendance {
  pub id: i64,
  pub name: String,
  pub phone: String,
  pub event: String,
  pub date: i64,
  pub confirmed: bool,
  pub sms_sent: bool,
  pub sms_sent_at: Option<i64>,
  pub sms_message_id: Option<String>,
  pub sms_error: Option<String>,
  pub created_at: i64
}

#[derive(Debug)]
pub struct NewAttendance {
  pub name: String,
  pub phone: String,
  pub event: String,
  pub date: i64,
  pub confirmed: bool
}

// One row of the categories or tags aggregation.
#[derive(Debug, Serialize, Deserialize)]
pub struct LabelCount {
  pub name: String,
  pub count: i64
}
