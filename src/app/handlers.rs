use actix_web::{web, HttpResponse};
use log::{error, warn};
use serde::Deserialize;
use uuid::Uuid;

use super::dtos::{
  ArticleDto, ArticleForm, AttendanceDto, AttendanceForm, JsonStatus,
  JsonStatusType, PageDto, UpdateArticleForm, UploadForm, UploadResultDto
};
use super::error::{map_db_error, Error};
use super::helpers;
use super::AppState;
use crate::db::entities::{ArticleUpdate, Attendance, NewArticle, NewAttendance};
use crate::db::queries::{
  attendance_sort, ArticleFilter, AttendanceFilter, Pagination, SmsFilter
};
use crate::db::{self, LabelField};
use crate::sms::render_sms_message;
use crate::storage::{key_for_public_url, object_key};
use crate::utils::{phone_utils, serde_utils, text_utils, time_utils};

// Names end up in SMS messages, no point accepting novels.
const MAX_NAME_LENGTH: usize = 120;

// The query string objects. These have to be public.

#[derive(Deserialize)]
pub struct NewsQuery {
  pub category: Option<String>,
  pub tag: Option<String>,
  pub q: Option<String>,
  pub page: Option<i64>,
  pub limit: Option<i64>
}

#[derive(Deserialize)]
pub struct RecentQuery {
  pub limit: Option<i64>
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceQuery {
  pub search: Option<String>,
  pub filter: Option<String>,
  pub sort_by: Option<String>,
  pub sort_order: Option<String>,
  pub page: Option<i64>,
  pub limit: Option<i64>
}

pub async fn index() -> HttpResponse {
  HttpResponse::Ok().json(JsonStatus::new(
    JsonStatusType::Success,
    concat!("noticias-backend ", env!("CARGO_PKG_VERSION"))
  ))
}

// Default handler, so the catch-all answers JSON like every
// real endpoint does.
pub async fn not_found() -> HttpResponse {
  HttpResponse::NotFound().json(JsonStatus::new(
    JsonStatusType::Error,
    "No such endpoint"
  ))
}

pub async fn list_news(
  app_state: web::Data<AppState>,
  query: web::Query<NewsQuery>
) -> Result<HttpResponse, Error> {
  let query = query.into_inner();
  let filter = ArticleFilter {
    category: serde_utils::empty_string_to_none(query.category),
    tag: serde_utils::empty_string_to_none(query.tag),
    q: serde_utils::empty_string_to_none(query.q)
  };
  let pagination = Pagination::for_articles(query.page, query.limit);
  let (articles, total) = db::list_articles(&app_state.pool, &filter, &pagination)
    .map_err(map_db_error)?;
  let items: Vec<ArticleDto> = articles.into_iter().map(Into::into).collect();
  Ok(HttpResponse::Ok().json(PageDto::new(items, total, &pagination)))
}

// The path token can be a slug or a numeric id, the repo
// sorts it out.
pub async fn get_news(
  app_state: web::Data<AppState>,
  path: web::Path<(String,)>
) -> Result<HttpResponse, Error> {
  let token = path.into_inner().0;
  let article = db::article_by_token(&app_state.pool, &token)
    .map_err(map_db_error)?;
  Ok(HttpResponse::Ok().json(ArticleDto::from(article)))
}

// Sidebar widget feed: newest articles, no envelope, no
// filters, capped hard.
pub async fn recent_news(
  app_state: web::Data<AppState>,
  query: web::Query<RecentQuery>
) -> Result<HttpResponse, Error> {
  let pagination = Pagination::for_recent(query.limit);
  let (articles, _) =
    db::list_articles(&app_state.pool, &ArticleFilter::default(), &pagination)
      .map_err(map_db_error)?;
  let items: Vec<ArticleDto> = articles.into_iter().map(Into::into).collect();
  Ok(HttpResponse::Ok().json(items))
}

pub async fn categories(
  app_state: web::Data<AppState>
) -> Result<HttpResponse, Error> {
  let counts = db::label_counts(&app_state.pool, LabelField::Categories)
    .map_err(map_db_error)?;
  Ok(HttpResponse::Ok().json(counts))
}

pub async fn tags(app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
  let counts = db::label_counts(&app_state.pool, LabelField::Tags)
    .map_err(map_db_error)?;
  Ok(HttpResponse::Ok().json(counts))
}

pub async fn create_news(
  app_state: web::Data<AppState>,
  form: web::Json<ArticleForm>
) -> Result<HttpResponse, Error> {
  let form = form.into_inner();
  let title = form.title.unwrap_or_default().trim().to_string();
  if title.is_empty() {
    return Err(Error::BadRequest("The title cannot be empty".to_string()));
  }
  // An explicit slug wins over the title, both get the same
  // normalization. When neither survives it we make one up.
  let mut slug = text_utils::normalize_slug(form.slug.as_deref().unwrap_or(""));
  if slug.is_empty() {
    slug = text_utils::normalize_slug(&title);
  }
  if slug.is_empty() {
    slug = format!("{}-{}", text_utils::SLUG_FALLBACK, Uuid::new_v4().simple());
  }
  let date = match &form.date {
    Some(raw) => time_utils::parse_date_string(raw)
      .ok_or_else(|| Error::BadRequest("Unreadable date format".to_string()))?,
    None => time_utils::current_timestamp()
  };
  let author = serde_utils::empty_string_to_none(form.author)
    .unwrap_or_else(|| app_state.service_info.default_author.clone());
  let new_article = NewArticle {
    slug,
    title,
    excerpt: serde_utils::empty_string_to_none(form.excerpt),
    cover: serde_utils::empty_string_to_none(form.cover),
    date,
    author,
    content: form.content,
    categories: form.categories.unwrap_or_default(),
    tags: form.tags.unwrap_or_default()
  };
  let created = db::insert_article(&app_state.pool, &new_article)
    .map_err(map_db_error)?;
  Ok(HttpResponse::Created().json(ArticleDto::from(created)))
}

pub async fn update_news(
  app_state: web::Data<AppState>,
  path: web::Path<(String,)>,
  form: web::Json<UpdateArticleForm>
) -> Result<HttpResponse, Error> {
  let token = path.into_inner().0;
  let form = form.into_inner();
  // Resolve the token first, the update itself runs on the
  // numeric id even when the slug is about to change.
  let current = db::article_by_token(&app_state.pool, &token)
    .map_err(map_db_error)?;
  if let Some(title) = &form.title {
    if title.trim().is_empty() {
      return Err(Error::BadRequest("The title cannot be empty".to_string()));
    }
  }
  let slug = match &form.slug {
    Some(raw) => {
      let normalized = text_utils::normalize_slug(raw);
      if normalized.is_empty() {
        return Err(Error::BadRequest(
          "The slug normalizes down to nothing".to_string()
        ));
      }
      Some(normalized)
    }
    None => None
  };
  let date = match &form.date {
    Some(raw) => Some(
      time_utils::parse_date_string(raw)
        .ok_or_else(|| Error::BadRequest("Unreadable date format".to_string()))?
    ),
    None => None
  };
  let update = ArticleUpdate {
    id: current.id,
    slug,
    title: form.title,
    excerpt: form.excerpt,
    // An empty string in the body clears the cover just like
    // an explicit null:
    cover: form.cover.map(serde_utils::empty_string_to_none),
    date,
    author: form.author,
    content: form.content,
    categories: form.categories,
    tags: form.tags
  };
  let updated = db::update_article(&app_state.pool, &update)
    .map_err(map_db_error)?;
  Ok(HttpResponse::Ok().json(ArticleDto::from(updated)))
}

pub async fn delete_news(
  app_state: web::Data<AppState>,
  path: web::Path<(String,)>
) -> Result<HttpResponse, Error> {
  let token = path.into_inner().0;
  let deleted = db::delete_article(&app_state.pool, &token)
    .map_err(map_db_error)?;
  // Cover cleanup is best-effort and only for objects that
  // live under our own public base URL. Foreign covers stay
  // where they are.
  if let Some(cover) = &deleted.cover {
    if let Some(key) =
      key_for_public_url(cover, &app_state.service_info.public_base_url)
    {
      if let Err(e) = app_state.object_store.delete(&key).await {
        warn!("Could not delete the cover object {} - {}", key, e);
      }
    }
  }
  Ok(HttpResponse::Ok().json(ArticleDto::from(deleted)))
}

pub async fn upload_cover(
  app_state: web::Data<AppState>,
  form: web::Json<UploadForm>
) -> Result<HttpResponse, Error> {
  let form = form.into_inner();
  let bytes = helpers::decode_webp_data_url(&form.file)?;
  let filename = form.filename.as_deref().unwrap_or("cover.webp");
  // The kind becomes the first path segment of the key, so
  // only plain words are allowed:
  let kind = form.kind.as_deref().unwrap_or("covers");
  if kind.is_empty()
    || !kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
  {
    return Err(Error::BadRequest("Unusable kind".to_string()));
  }
  let key = object_key(kind, filename);
  let url = app_state
    .object_store
    .put(&key, &bytes, "image/webp", &app_state.service_info.cache_control)
    .await
    .map_err(|e| {
      error!("Object upload failed - {}", e);
      Error::InternalServerError("Object storage failure".to_string())
    })?;
  Ok(HttpResponse::Created().json(UploadResultDto { url }))
}

/**
 * Sends the confirmation SMS for a registration and records
 * how it went on the row. Gateway failures are data here, not
 * errors: the registration stands either way and the stored
 * outcome is what makes retries possible.
 */
async fn deliver_sms(
  app_state: &AppState,
  attendance: Attendance
) -> Result<Attendance, Error> {
  let message = render_sms_message(
    &app_state.service_info.sms_template,
    &attendance.name,
    &attendance.event
  );
  let outcome = app_state.sms.send(&attendance.phone, &message).await;
  if !outcome.success {
    warn!(
      "SMS to {} failed - {}",
      attendance.phone,
      outcome.error.as_deref().unwrap_or("no error detail")
    );
  }
  db::update_attendance_sms(
    &app_state.pool,
    attendance.id,
    outcome.success,
    outcome.message_id.as_deref(),
    outcome.error.as_deref()
  )
  .map_err(map_db_error)
}

async fn register(
  app_state: &AppState,
  form: AttendanceForm,
  with_sms: bool
) -> Result<HttpResponse, Error> {
  // These two endpoints are the only ones the whole internet
  // can write to, so they get the rate limiter.
  if app_state.check_rate_limit() {
    return Err(Error::TooManyRequests);
  }
  let mut name = form.name;
  text_utils::truncate_utf8(&mut name, MAX_NAME_LENGTH);
  let name = text_utils::escape_html(name.trim());
  if name.is_empty() {
    return Err(Error::BadRequest("The name cannot be empty".to_string()));
  }
  let phone = phone_utils::normalize_phone(
    &form.phone,
    &app_state.service_info.sms_country_code
  )
  .ok_or_else(|| Error::BadRequest("Unusable phone number".to_string()))?;
  let event = serde_utils::empty_string_to_none(form.event)
    .unwrap_or_else(|| app_state.service_info.event_name.clone());
  let date = match &form.date {
    Some(raw) => time_utils::parse_date_string(raw)
      .ok_or_else(|| Error::BadRequest("Unreadable date format".to_string()))?,
    None => time_utils::current_timestamp()
  };
  let new_attendance = NewAttendance {
    name,
    phone,
    event,
    date,
    confirmed: form.confirmed.unwrap_or(true)
  };
  let mut created = db::insert_attendance(&app_state.pool, &new_attendance)
    .map_err(map_db_error)?;
  if with_sms {
    created = deliver_sms(app_state, created).await?;
  }
  Ok(HttpResponse::Created().json(AttendanceDto::from(created)))
}

pub async fn register_attendance(
  app_state: web::Data<AppState>,
  form: web::Json<AttendanceForm>
) -> Result<HttpResponse, Error> {
  register(&app_state, form.into_inner(), false).await
}

// Registration plus the confirmation SMS in one round trip,
// for the frontend form.
pub async fn register_attendance_with_sms(
  app_state: web::Data<AppState>,
  form: web::Json<AttendanceForm>
) -> Result<HttpResponse, Error> {
  register(&app_state, form.into_inner(), true).await
}

// Serves both the admin listing and the public one, they only
// differ in which route points here.
pub async fn list_attendance(
  app_state: web::Data<AppState>,
  query: web::Query<AttendanceQuery>
) -> Result<HttpResponse, Error> {
  let query = query.into_inner();
  let filter = AttendanceFilter {
    search: serde_utils::empty_string_to_none(query.search),
    sms: SmsFilter::from_param(query.filter.as_deref())
  };
  let order = attendance_sort(query.sort_by.as_deref(), query.sort_order.as_deref());
  let pagination = Pagination::for_attendance(query.page, query.limit);
  let (records, total) =
    db::list_attendance(&app_state.pool, &filter, order, &pagination)
      .map_err(map_db_error)?;
  let items: Vec<AttendanceDto> = records.into_iter().map(Into::into).collect();
  Ok(HttpResponse::Ok().json(PageDto::new(items, total, &pagination)))
}

pub async fn delete_attendance(
  app_state: web::Data<AppState>,
  path: web::Path<(i64,)>
) -> Result<HttpResponse, Error> {
  let id = path.into_inner().0;
  let deleted = db::delete_attendance(&app_state.pool, id)
    .map_err(map_db_error)?;
  Ok(HttpResponse::Ok().json(AttendanceDto::from(deleted)))
}

pub async fn send_attendance_sms(
  app_state: web::Data<AppState>,
  path: web::Path<(i64,)>
) -> Result<HttpResponse, Error> {
  let id = path.into_inner().0;
  let attendance = db::attendance_by_id(&app_state.pool, id)
    .map_err(map_db_error)?;
  let updated = deliver_sms(&app_state, attendance).await?;
  Ok(HttpResponse::Ok().json(AttendanceDto::from(updated)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::app::{
    api_endpoints_config, guards::ApiKeyGuard, rate_limiter::BasicRateLimiter
  };
  use crate::config::ServiceInfo;
  use crate::sms::{SmsOutcome, SmsSender};
  use crate::storage::ObjectStorage;
  use actix_web::dev::ServiceResponse;
  use actix_web::http::StatusCode;
  use actix_web::{test, App};
  use async_trait::async_trait;
  use base64::engine::general_purpose::STANDARD;
  use base64::Engine;
  use serde_json::{json, Value};
  use std::sync::{Arc, Mutex, RwLock};

  const TEST_API_KEY: &str = "sesame";
  const PUBLIC_BASE: &str = "https://cdn.example.com/media";

  // Object store double that remembers what got deleted
  // instead of talking to anything.
  #[derive(Default)]
  struct RecordingStore {
    deleted: Mutex<Vec<String>>
  }

  #[async_trait]
  impl ObjectStorage for RecordingStore {
    fn public_url(&self, key: &str) -> String {
      format!("{}/{}", PUBLIC_BASE, key)
    }

    async fn put(
      &self,
      key: &str,
      _bytes: &[u8],
      _content_type: &str,
      _cache_control: &str
    ) -> color_eyre::Result<String> {
      Ok(self.public_url(key))
    }

    async fn delete(&self, key: &str) -> color_eyre::Result<()> {
      self.deleted.lock().unwrap().push(key.to_string());
      Ok(())
    }
  }

  // Gateway double with a scripted outcome.
  struct ScriptedSms {
    outcome: SmsOutcome,
    sent_to: Mutex<Vec<String>>
  }

  impl ScriptedSms {
    fn succeeding(message_id: &str) -> Self {
      ScriptedSms {
        outcome: SmsOutcome {
          success: true,
          message_id: Some(message_id.to_string()),
          error: None
        },
        sent_to: Mutex::new(Vec::new())
      }
    }

    fn failing(error: &str) -> Self {
      ScriptedSms {
        outcome: SmsOutcome::failure(error),
        sent_to: Mutex::new(Vec::new())
      }
    }
  }

  #[async_trait]
  impl SmsSender for ScriptedSms {
    async fn send(&self, phone: &str, _message: &str) -> SmsOutcome {
      self.sent_to.lock().unwrap().push(phone.to_string());
      self.outcome.clone()
    }
  }

  fn test_state(
    object_store: Arc<RecordingStore>,
    sms: Arc<ScriptedSms>
  ) -> web::Data<AppState> {
    web::Data::new(AppState {
      pool: db::test_pool(),
      object_store,
      sms,
      // Roomy enough to stay out of the way, the rate limit
      // test swaps in a tight one.
      rate_limiter: RwLock::new(BasicRateLimiter::new(1000, 60, 60)),
      service_info: ServiceInfo {
        default_author: "La Redacción".to_string(),
        event_name: "Encuentro anual".to_string(),
        sms_country_code: "34".to_string(),
        sms_template: "Hola {name}, nos vemos en {event}.".to_string(),
        cache_control: "public, max-age=60".to_string(),
        public_base_url: PUBLIC_BASE.to_string()
      }
    })
  }

  // Spins up the full route table for one request, same
  // guards and default service as the real server.
  async fn call(
    state: &web::Data<AppState>,
    req: test::TestRequest
  ) -> ServiceResponse {
    let app = test::init_service(
      App::new()
        .app_data(state.clone())
        .configure(|cfg| {
          api_endpoints_config(cfg, ApiKeyGuard::new("x-api-key", TEST_API_KEY))
        })
        .default_service(web::route().to(not_found))
    )
    .await;
    test::call_service(&app, req.to_request()).await
  }

  fn with_key(req: test::TestRequest) -> test::TestRequest {
    req.insert_header(("x-api-key", TEST_API_KEY))
  }

  fn news_with_cover(slug: &str, cover: &str) -> NewArticle {
    NewArticle {
      slug: slug.to_string(),
      title: "Con cover".to_string(),
      excerpt: None,
      cover: Some(cover.to_string()),
      date: 1615150740,
      author: "Ana".to_string(),
      content: None,
      categories: vec![],
      tags: vec![]
    }
  }

  #[actix_web::test]
  async fn unknown_routes_answer_json_not_found() {
    let state = test_state(Arc::default(), Arc::new(ScriptedSms::failing("x")));
    let resp = call(&state, test::TestRequest::get().uri("/api/nope")).await;
    assert_eq!(StatusCode::NOT_FOUND, resp.status());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!("error", body["status"]);
  }

  #[actix_web::test]
  async fn privileged_routes_vanish_without_the_key() {
    let state = test_state(Arc::default(), Arc::new(ScriptedSms::failing("x")));
    let form = json!({ "title": "Solo con llave" });
    // No key and a wrong key both look like the endpoint
    // doesn't exist:
    let resp = call(
      &state,
      test::TestRequest::post().uri("/api/news").set_json(&form)
    )
    .await;
    assert_eq!(StatusCode::NOT_FOUND, resp.status());
    let resp = call(
      &state,
      test::TestRequest::post()
        .uri("/api/news")
        .insert_header(("x-api-key", "abracadabra"))
        .set_json(&form)
    )
    .await;
    assert_eq!(StatusCode::NOT_FOUND, resp.status());
    let resp = call(&state, test::TestRequest::get().uri("/api/attendance")).await;
    assert_eq!(StatusCode::NOT_FOUND, resp.status());
    // The right key reaches the handler:
    let resp = call(
      &state,
      with_key(test::TestRequest::post().uri("/api/news").set_json(&form))
    )
    .await;
    assert_eq!(StatusCode::CREATED, resp.status());
  }

  #[actix_web::test]
  async fn creating_news_fills_in_the_blanks() {
    let state = test_state(Arc::default(), Arc::new(ScriptedSms::failing("x")));
    let resp = call(
      &state,
      with_key(
        test::TestRequest::post()
          .uri("/api/news")
          .set_json(json!({ "title": "Notícia Incrível!" }))
      )
    )
    .await;
    assert_eq!(StatusCode::CREATED, resp.status());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!("noticia-incrivel", body["slug"]);
    assert_eq!("La Redacción", body["author"]);
    // A second article normalizing to the same slug is
    // refused and the survivor keeps the slug:
    let resp = call(
      &state,
      with_key(
        test::TestRequest::post()
          .uri("/api/news")
          .set_json(json!({ "title": "noticia incrivel" }))
      )
    )
    .await;
    assert_eq!(StatusCode::CONFLICT, resp.status());
    let resp = call(
      &state,
      test::TestRequest::get().uri("/api/news/noticia-incrivel")
    )
    .await;
    assert_eq!(StatusCode::OK, resp.status());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!("Notícia Incrível!", body["title"]);
    // No title at all is a validation error:
    let resp = call(
      &state,
      with_key(test::TestRequest::post().uri("/api/news").set_json(json!({})))
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());
  }

  #[actix_web::test]
  async fn deleting_news_cleans_up_our_covers_only() {
    let store = Arc::new(RecordingStore::default());
    let state = test_state(store.clone(), Arc::new(ScriptedSms::failing("x")));
    let own_cover = format!("{}/covers/2021/03/abc-a.webp", PUBLIC_BASE);
    db::insert_article(&state.pool, &news_with_cover("con-cover", &own_cover))
      .unwrap();
    db::insert_article(
      &state.pool,
      &news_with_cover("cover-ajeno", "https://elsewhere.example.com/f.webp")
    )
    .unwrap();

    let resp = call(
      &state,
      with_key(test::TestRequest::delete().uri("/api/news/con-cover"))
    )
    .await;
    assert_eq!(StatusCode::OK, resp.status());
    let resp = call(
      &state,
      with_key(test::TestRequest::delete().uri("/api/news/cover-ajeno"))
    )
    .await;
    assert_eq!(StatusCode::OK, resp.status());
    // Only the cover under our public base went to the store:
    assert_eq!(
      vec!["covers/2021/03/abc-a.webp".to_string()],
      *store.deleted.lock().unwrap()
    );
  }

  #[actix_web::test]
  async fn registration_normalizes_the_phone_and_conflicts_on_repeat() {
    let state = test_state(Arc::default(), Arc::new(ScriptedSms::failing("x")));
    let resp = call(
      &state,
      test::TestRequest::post()
        .uri("/api/attendance")
        .set_json(json!({ "name": "Ana", "phone": "612 34 56 78" }))
    )
    .await;
    assert_eq!(StatusCode::CREATED, resp.status());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!("34612345678", body["phone"]);
    assert_eq!("Encuentro anual", body["event"]);
    // The same number written differently lands on the same
    // dedup key:
    let resp = call(
      &state,
      test::TestRequest::post()
        .uri("/api/attendance")
        .set_json(json!({ "name": "Ana otra vez", "phone": "+34 612 345 678" }))
    )
    .await;
    assert_eq!(StatusCode::CONFLICT, resp.status());
    // An unusable phone is rejected before any store write:
    let resp = call(
      &state,
      test::TestRequest::post()
        .uri("/api/attendance")
        .set_json(json!({ "name": "Luis", "phone": "llámame" }))
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());
  }

  #[actix_web::test]
  async fn sms_failures_never_fail_the_registration() {
    let sms = Arc::new(ScriptedSms::failing("gateway down"));
    let state = test_state(Arc::default(), sms.clone());
    let resp = call(
      &state,
      test::TestRequest::post()
        .uri("/api/attendance-with-sms")
        .set_json(json!({ "name": "Ana", "phone": "612345678" }))
    )
    .await;
    assert_eq!(StatusCode::CREATED, resp.status());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(false, body["smsSent"]);
    assert_eq!("gateway down", body["smsError"]);
    // The gateway got the normalized number exactly once:
    assert_eq!(
      vec!["34612345678".to_string()],
      *sms.sent_to.lock().unwrap()
    );
  }

  #[actix_web::test]
  async fn resending_sms_records_the_new_outcome() {
    let sms = Arc::new(ScriptedSms::succeeding("msg-9"));
    let state = test_state(Arc::default(), sms.clone());
    let resp = call(
      &state,
      test::TestRequest::post()
        .uri("/api/attendance")
        .set_json(json!({ "name": "Ana", "phone": "612345678" }))
    )
    .await;
    assert_eq!(StatusCode::CREATED, resp.status());
    let body: Value = test::read_body_json(resp).await;
    // Plain registration sends nothing:
    assert_eq!(false, body["smsSent"]);
    assert!(sms.sent_to.lock().unwrap().is_empty());
    let id = body["id"].as_i64().unwrap();

    let resp = call(
      &state,
      with_key(
        test::TestRequest::post().uri(&format!("/api/attendance/{}/send-sms", id))
      )
    )
    .await;
    assert_eq!(StatusCode::OK, resp.status());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(true, body["smsSent"]);
    assert_eq!("msg-9", body["smsMessageId"]);
    assert_eq!(1, sms.sent_to.lock().unwrap().len());
  }

  #[actix_web::test]
  async fn upload_accepts_only_webp_data_urls() {
    let state = test_state(Arc::default(), Arc::new(ScriptedSms::failing("x")));
    let mut webp = b"RIFF".to_vec();
    webp.extend_from_slice(&20u32.to_le_bytes());
    webp.extend_from_slice(b"WEBPVP8 ");
    webp.extend_from_slice(&[0; 12]);
    let resp = call(
      &state,
      with_key(test::TestRequest::post().uri("/api/upload").set_json(json!({
        "file": format!("data:image/webp;base64,{}", STANDARD.encode(&webp)),
        "filename": "mi foto.webp"
      })))
    )
    .await;
    assert_eq!(StatusCode::CREATED, resp.status());
    let body: Value = test::read_body_json(resp).await;
    let url = body["url"].as_str().unwrap();
    assert!(url.starts_with("https://cdn.example.com/media/covers/"));
    assert!(url.ends_with("-mi-foto.webp"));

    // Anything that isn't WEBP stops before the store:
    let resp = call(
      &state,
      with_key(test::TestRequest::post().uri("/api/upload").set_json(json!({
        "file": format!("data:image/png;base64,{}", STANDARD.encode(&webp))
      })))
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());
  }

  #[actix_web::test]
  async fn the_public_form_is_rate_limited() {
    let state = test_state(Arc::default(), Arc::new(ScriptedSms::failing("x")));
    // One request per window, the second one trips it:
    *state.rate_limiter.write().unwrap() = BasicRateLimiter::new(1, 60, 60);
    let resp = call(
      &state,
      test::TestRequest::post()
        .uri("/api/attendance")
        .set_json(json!({ "name": "Ana", "phone": "612345678" }))
    )
    .await;
    assert_eq!(StatusCode::CREATED, resp.status());
    let resp = call(
      &state,
      test::TestRequest::post()
        .uri("/api/attendance")
        .set_json(json!({ "name": "Berto", "phone": "687654321" }))
    )
    .await;
    assert_eq!(StatusCode::TOO_MANY_REQUESTS, resp.status());
  }

  #[actix_web::test]
  async fn empty_listing_still_pages_sanely() {
    let state = test_state(Arc::default(), Arc::new(ScriptedSms::failing("x")));
    let resp = call(
      &state,
      test::TestRequest::get().uri("/api/news?page=0&limit=1000")
    )
    .await;
    assert_eq!(StatusCode::OK, resp.status());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(0, body["total"]);
    assert_eq!(1, body["page"]);
    assert_eq!(1, body["totalPages"]);
    assert_eq!(0, body["items"].as_array().unwrap().len());
  }
}
