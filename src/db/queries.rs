// My QUERY BUILDING system. Listing endpoints all funnel
// through here: filters turn into WHERE clauses plus their
// positional params, pagination turns into LIMIT/OFFSET, and
// the sort fields are whitelisted so callers never get to
// inject SQL.

use rusqlite::types::Value;

pub enum Order {
  Asc,
  Desc
}

impl Order {
  fn as_sql(&self) -> &'static str {
    match self {
      Order::Asc => "ASC",
      Order::Desc => "DESC"
    }
  }
}

pub struct OrderBy {
  pub order: Order,
  pub field: String
}

impl OrderBy {
  pub fn new(order: Order, field: String) -> Self {
    OrderBy {
      order,
      field
    }
  }
}

// Decided to put "q_" in front of some args just because
// "where" is a reserved Rust keyword. WHERE clauses are
// always AND-stitched, the OR cases build their own
// parenthesized clause string.
pub fn select_query_builder(
  q_fields: &Vec<String>,
  q_from: &Vec<String>,
  q_where: Option<&Vec<String>>,
  q_order: &Vec<OrderBy>,
  limit: Option<i64>,
  offset: Option<i64>
) -> String {
  let mut query = format!(
    "SELECT {} FROM {} ",
    &q_fields.join(","),
    &q_from.join(",")
  );
  if let Some(wh) = q_where {
    query.push_str(
      &format!(
        "WHERE {} ",
        &wh.join(" AND ")
      )
    );
  }
  if !q_order.is_empty() {
    let order_parts: Vec<String> = q_order
      .iter()
      .map(|o| format!("{} {}", o.field, o.order.as_sql()))
      .collect();
    query.push_str(
      &format!(
        "ORDER BY {} ",
        order_parts.join(", ")
      )
    );
  }
  if let Some(lim) = limit {
    query.push_str(
      &format!(
        "LIMIT {} ",
        lim
      )
    );
    if let Some(off) = offset {
      query.push_str(
        &format!(
          "OFFSET {} ",
          off
        )
      );
    }
  }
  query
}

// LIKE wildcards coming from user input have to be neutralized,
// we always match with ESCAPE '\'.
pub fn escape_like(value: &str) -> String {
  value
    .replace('\\', "\\\\")
    .replace('%', "\\%")
    .replace('_', "\\_")
}

// Page/limit clamping. Every listing endpoint has its own
// default and ceiling:
const ARTICLES_DEFAULT_LIMIT: i64 = 6;
const ARTICLES_MAX_LIMIT: i64 = 50;
const RECENT_DEFAULT_LIMIT: i64 = 3;
const RECENT_MAX_LIMIT: i64 = 10;
const ATTENDANCE_DEFAULT_LIMIT: i64 = 10;
const ATTENDANCE_MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pagination {
  pub page: i64,
  pub limit: i64
}

impl Pagination {
  fn clamped(
    page: Option<i64>,
    limit: Option<i64>,
    default_limit: i64,
    max_limit: i64
  ) -> Self {
    Pagination {
      page: page.unwrap_or(1).max(1),
      limit: limit.unwrap_or(default_limit).max(1).min(max_limit)
    }
  }

  pub fn for_articles(page: Option<i64>, limit: Option<i64>) -> Self {
    Self::clamped(page, limit, ARTICLES_DEFAULT_LIMIT, ARTICLES_MAX_LIMIT)
  }

  // The recent endpoint is always page 1.
  pub fn for_recent(limit: Option<i64>) -> Self {
    Self::clamped(Some(1), limit, RECENT_DEFAULT_LIMIT, RECENT_MAX_LIMIT)
  }

  pub fn for_attendance(page: Option<i64>, limit: Option<i64>) -> Self {
    Self::clamped(page, limit, ATTENDANCE_DEFAULT_LIMIT, ATTENDANCE_MAX_LIMIT)
  }

  // Saturates so an absurd page number turns into an empty
  // page instead of an overflow.
  pub fn offset(&self) -> i64 {
    (self.page - 1).saturating_mul(self.limit)
  }

  // Ceiling division, never below 1 so clients always get a
  // sane page count even for empty results.
  pub fn total_pages(&self, total: i64) -> i64 {
    if total <= 0 {
      1
    } else {
      (total + self.limit - 1) / self.limit
    }
  }
}

// Filters for the news listing. A missing param simply omits
// its clause, present params AND together.
#[derive(Debug, Default)]
pub struct ArticleFilter {
  pub category: Option<String>,
  pub tag: Option<String>,
  pub q: Option<String>
}

impl ArticleFilter {
  pub fn to_sql(&self) -> (Vec<String>, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();
    if let Some(category) = &self.category {
      clauses.push(
        "EXISTS (SELECT 1 FROM article_categories \
        WHERE article_id = articles.id AND LOWER(label) = ?)".to_string()
      );
      params.push(Value::Text(category.to_lowercase()));
    }
    if let Some(tag) = &self.tag {
      clauses.push(
        "EXISTS (SELECT 1 FROM article_tags \
        WHERE article_id = articles.id AND LOWER(label) = ?)".to_string()
      );
      params.push(Value::Text(tag.to_lowercase()));
    }
    if let Some(q) = &self.q {
      clauses.push(
        "(LOWER(articles.title) LIKE ? ESCAPE '\\' \
        OR LOWER(IFNULL(articles.excerpt, '')) LIKE ? ESCAPE '\\' \
        OR LOWER(articles.author) LIKE ? ESCAPE '\\')".to_string()
      );
      let pattern = format!("%{}%", escape_like(&q.to_lowercase()));
      params.push(Value::Text(pattern.clone()));
      params.push(Value::Text(pattern.clone()));
      params.push(Value::Text(pattern));
    }
    (clauses, params)
  }
}

// The attendance listing has a three-state SMS facet on top
// of the free text search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SmsFilter {
  All,
  Sent,
  NotSent
}

impl Default for SmsFilter {
  fn default() -> Self {
    SmsFilter::All
  }
}

impl SmsFilter {
  // Anything we don't recognize means "all", same as the old
  // frontend expects.
  pub fn from_param(value: Option<&str>) -> Self {
    match value {
      Some("sms-sent") => SmsFilter::Sent,
      Some("sms-not-sent") => SmsFilter::NotSent,
      _ => SmsFilter::All
    }
  }
}

#[derive(Debug, Default)]
pub struct AttendanceFilter {
  pub search: Option<String>,
  pub sms: SmsFilter
}

impl AttendanceFilter {
  pub fn to_sql(&self) -> (Vec<String>, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();
    if let Some(search) = &self.search {
      clauses.push(
        "(LOWER(name) LIKE ? ESCAPE '\\' \
        OR phone LIKE ? ESCAPE '\\')".to_string()
      );
      let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
      params.push(Value::Text(pattern.clone()));
      params.push(Value::Text(pattern));
    }
    match self.sms {
      SmsFilter::Sent => clauses.push("sms_sent = 1".to_string()),
      SmsFilter::NotSent => clauses.push("sms_sent = 0".to_string()),
      SmsFilter::All => {}
    }
    (clauses, params)
  }
}

// Whitelisted sort for the attendance listing. Unknown fields
// fall back to the date, unknown directions to DESC.
pub fn attendance_sort(sort_by: Option<&str>, sort_order: Option<&str>) -> OrderBy {
  let field = match sort_by {
    Some("name") => "name",
    Some("phone") => "phone",
    Some("smsSent") => "sms_sent",
    _ => "date"
  };
  let order = match sort_order {
    Some(o) if o.eq_ignore_ascii_case("asc") => Order::Asc,
    _ => Order::Desc
  };
  OrderBy::new(order, field.to_string())
}
