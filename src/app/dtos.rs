use serde::{Deserialize, Serialize};

use crate::db::entities::{Article, Attendance};
use crate::db::queries::Pagination;
use crate::utils::{serde_utils, time_utils};

/**
 * What the API hands out for an article. Same thing as the
 * entity except the timestamps go out as RFC 3339 strings so
 * frontends don't have to do epoch math.
 */
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDto {
  pub id: i64,
  pub slug: String,
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub excerpt: Option<String>,
  pub cover: Option<String>,
  pub date: String,
  pub author: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  pub categories: Vec<String>,
  pub tags: Vec<String>,
  pub created_at: String,
  pub updated_at: String
}

impl From<Article> for ArticleDto {
  fn from(article: Article) -> Self {
    ArticleDto {
      id: article.id,
      slug: article.slug,
      title: article.title,
      excerpt: article.excerpt,
      cover: article.cover,
      date: time_utils::timestamp_to_rfc3339(article.date),
      author: article.author,
      content: article.content,
      categories: article.categories,
      tags: article.tags,
      created_at: time_utils::timestamp_to_rfc3339(article.created_at),
      updated_at: time_utils::timestamp_to_rfc3339(article.updated_at)
    }
  }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceDto {
  pub id: i64,
  pub name: String,
  pub phone: String,
  pub event: String,
  pub date: String,
  pub confirmed: bool,
  pub sms_sent: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sms_sent_at: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sms_message_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sms_error: Option<String>,
  pub created_at: String
}

impl From<Attendance> for AttendanceDto {
  fn from(attendance: Attendance) -> Self {
    AttendanceDto {
      id: attendance.id,
      name: attendance.name,
      phone: attendance.phone,
      event: attendance.event,
      date: time_utils::timestamp_to_rfc3339(attendance.date),
      confirmed: attendance.confirmed,
      sms_sent: attendance.sms_sent,
      sms_sent_at: attendance.sms_sent_at.map(time_utils::timestamp_to_rfc3339),
      sms_message_id: attendance.sms_message_id,
      sms_error: attendance.sms_error,
      created_at: time_utils::timestamp_to_rfc3339(attendance.created_at)
    }
  }
}

// One envelope for every paginated listing.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDto<T> {
  pub items: Vec<T>,
  pub total: i64,
  pub page: i64,
  pub total_pages: i64
}

impl<T> PageDto<T> {
  pub fn new(items: Vec<T>, total: i64, pagination: &Pagination) -> Self {
    PageDto {
      items,
      total,
      page: pagination.page,
      total_pages: pagination.total_pages(total)
    }
  }
}

/**
 * Payload for article creation. Everything except the title
 * is optional, the handler fills in the blanks (slug from
 * the title, date from the clock, author from the config).
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleForm {
  pub title: Option<String>,
  pub slug: Option<String>,
  pub excerpt: Option<String>,
  pub cover: Option<String>,
  // RFC 3339 or a bare "2021-03-07":
  pub date: Option<String>,
  pub author: Option<String>,
  pub content: Option<String>,
  pub categories: Option<Vec<String>>,
  pub tags: Option<Vec<String>>
}

/**
 * Partial update payload. Absent fields stay untouched. The
 * cover is special because "clear it" has to be expressible:
 * a JSON null means remove the cover, an absent key means
 * leave it alone. See serde_utils::some_option.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateArticleForm {
  pub title: Option<String>,
  pub slug: Option<String>,
  pub excerpt: Option<String>,
  #[serde(default, deserialize_with = "serde_utils::some_option")]
  pub cover: Option<Option<String>>,
  pub date: Option<String>,
  pub author: Option<String>,
  pub content: Option<String>,
  pub categories: Option<Vec<String>>,
  pub tags: Option<Vec<String>>
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceForm {
  pub name: String,
  pub phone: String,
  pub event: Option<String>,
  pub date: Option<String>,
  pub confirmed: Option<bool>
}

// Covers come in as base64 data URLs, WEBP only.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadForm {
  pub file: String,
  pub filename: Option<String>,
  pub kind: Option<String>
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResultDto {
  pub url: String
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonStatusType {
  Success,
  Error
}

// Generic status response for endpoints that have nothing
// better to say.
#[derive(Serialize)]
pub struct JsonStatus {
  pub status: JsonStatusType,
  pub message: String
}

impl JsonStatus {
  pub fn new(status: JsonStatusType, message: &str) -> Self {
    JsonStatus {
      status,
      message: message.to_string()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn article_fixture() -> Article {
    Article {
      id: 12,
      slug: "hola-mundo".to_string(),
      title: "Hola mundo".to_string(),
      excerpt: None,
      cover: Some("http://127.0.0.1:8080/media/covers/a.webp".to_string()),
      date: 1615150740,
      author: "Ana".to_string(),
      content: Some("Texto".to_string()),
      created_at: 1615150740,
      updated_at: 1615150740,
      categories: vec!["tech".to_string()],
      tags: vec![]
    }
  }

  #[test]
  fn article_timestamps_become_rfc3339() {
    let sut = ArticleDto::from(article_fixture());
    assert_eq!(sut.date, "2021-03-07T20:59:00+00:00");
    assert_eq!(sut.created_at, sut.updated_at);
  }

  #[test]
  fn empty_optionals_stay_out_of_the_json() {
    let mut attendance = Attendance {
      id: 3,
      name: "Luis".to_string(),
      phone: "34612345678".to_string(),
      event: "Encuentro anual".to_string(),
      date: 1615150740,
      confirmed: true,
      sms_sent: false,
      sms_sent_at: None,
      sms_message_id: None,
      sms_error: None,
      created_at: 1615150740
    };
    let json = serde_json::to_string(&AttendanceDto::from(attendance.clone())).unwrap();
    assert!(!json.contains("smsError"));
    assert!(!json.contains("smsSentAt"));
    attendance.sms_sent = true;
    attendance.sms_sent_at = Some(1615150800);
    attendance.sms_message_id = Some("msg-1".to_string());
    let json = serde_json::to_string(&AttendanceDto::from(attendance)).unwrap();
    assert!(json.contains("\"smsSentAt\":\"2021-03-07T21:00:00+00:00\""));
    assert!(json.contains("\"smsMessageId\":\"msg-1\""));
  }

  #[test]
  fn the_page_envelope_uses_camel_case() {
    let pagination = Pagination::for_articles(Some(2), Some(6));
    let sut = PageDto::new(
      vec![ArticleDto::from(article_fixture())],
      13,
      &pagination
    );
    let json = serde_json::to_string(&sut).unwrap();
    assert!(json.contains("\"totalPages\":3"));
    assert!(json.contains("\"page\":2"));
    assert!(json.contains("\"total\":13"));
  }

  #[test]
  fn a_null_cover_means_clear_but_absent_means_keep() {
    let cleared: UpdateArticleForm =
      serde_json::from_str(r#"{ "cover": null }"#).unwrap();
    assert_eq!(cleared.cover, Some(None));
    let untouched: UpdateArticleForm = serde_json::from_str("{}").unwrap();
    assert_eq!(untouched.cover, None);
    let replaced: UpdateArticleForm =
      serde_json::from_str(r#"{ "cover": "http://x/y.webp" }"#).unwrap();
    assert_eq!(replaced.cover, Some(Some("http://x/y.webp".to_string())));
  }

  #[test]
  fn json_status_is_status_and_message_only() {
    let sut = JsonStatus::new(JsonStatusType::Success, "all good");
    let expected = "{\"status\":\"success\",\"message\":\"all good\"}";
    assert_eq!(serde_json::to_string(&sut).unwrap(), expected);
  }
}
