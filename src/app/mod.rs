use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use color_eyre::Result;
use eyre::WrapErr;
use log::{error, info};
use std::sync::{Arc, RwLock};

use crate::config::{Config, ServiceInfo};
use crate::db::{self, Pool};
use crate::sms::{HttpSmsGateway, NoopSms, SmsSender};
use crate::storage::{self, ObjectStorage};
use rate_limiter::BasicRateLimiter;

mod dtos;
mod error;
mod guards;
mod handlers;
mod helpers;
mod rate_limiter;

// Covers arrive base64-wrapped inside JSON bodies, so the
// default 2MB body cap is too small for them.
const MAX_JSON_PAYLOAD: usize = 6_291_456;

pub struct AppState {
  pub pool: Pool,
  pub object_store: Arc<dyn ObjectStorage>,
  pub sms: Arc<dyn SmsSender>,
  pub rate_limiter: RwLock<BasicRateLimiter>,
  pub service_info: ServiceInfo
}

impl AppState {
  /**
   * Peeks at the rate limiter under the read lock so the
   * common case (not blocked, or blocked and staying blocked)
   * doesn't serialize every request on the write lock.
   */
  fn rate_limiter_needs_update(&self) -> (bool, bool) {
    match self.rate_limiter.read() {
      Ok(rl) => (rl.needs_update(), rl.is_limited()),
      Err(e) => {
        error!(
          "Could not get a read handle on the rate limiter, \
          SHOULD NEVER HAPPEN - {}",
          e
        );
        (false, false)
      }
    }
  }

  // True means the current request has to be rejected.
  pub fn check_rate_limit(&self) -> bool {
    let (needs_update, is_limited) = self.rate_limiter_needs_update();
    if needs_update {
      match self.rate_limiter.write() {
        Ok(mut rl) => return rl.update(),
        Err(e) => {
          error!(
            "Could not get a write handle on the rate limiter, \
            SHOULD NEVER HAPPEN - {}",
            e
          );
        }
      }
    }
    is_limited
  }
}

fn api_endpoints_config(cfg: &mut web::ServiceConfig, guard: guards::ApiKeyGuard) {
  // Privileged routes carry the API key guard. A failed guard
  // means the route doesn't match at all, so those endpoints
  // 404 for the general public instead of advertising
  // themselves with a 401.
  cfg
    .route("/", web::get().to(handlers::index))
    .route("/api/news", web::get().to(handlers::list_news))
    .route(
      "/api/news",
      web::post().guard(guard.clone()).to(handlers::create_news)
    )
    .route("/api/news/{token}", web::get().to(handlers::get_news))
    .route(
      "/api/news/{token}",
      web::put().guard(guard.clone()).to(handlers::update_news)
    )
    .route(
      "/api/news/{token}",
      web::delete().guard(guard.clone()).to(handlers::delete_news)
    )
    .route("/api/recent", web::get().to(handlers::recent_news))
    .route("/api/categories", web::get().to(handlers::categories))
    .route("/api/tags", web::get().to(handlers::tags))
    .route(
      "/api/upload",
      web::post().guard(guard.clone()).to(handlers::upload_cover)
    )
    .route(
      "/api/attendance",
      web::get().guard(guard.clone()).to(handlers::list_attendance)
    )
    .route("/api/attendance", web::post().to(handlers::register_attendance))
    .route(
      "/api/attendance/public",
      web::get().to(handlers::list_attendance)
    )
    .route(
      "/api/attendance/{id}",
      web::delete().guard(guard.clone()).to(handlers::delete_attendance)
    )
    .route(
      "/api/attendance/{id}/send-sms",
      web::post().guard(guard).to(handlers::send_attendance_sms)
    )
    .route(
      "/api/attendance-with-sms",
      web::post().to(handlers::register_attendance_with_sms)
    );
}

pub async fn run() -> Result<()> {
  let config = Config::from_env()
    .expect("Configuration (environment or .env file) is broken, API_KEY is required");
  let pool = db::open_pool(
    &config.db_path,
    config.db_pool_size,
    db::ConnectStrategy::from_param(&config.db_connect)
  )
  .context("Opening the database pool")?;

  let object_store = storage::from_config(
    &config.object_store,
    &config.public_base_url,
    &config.object_store_bearer
  )?;
  // An empty gateway URL means we log instead of texting:
  let sms: Arc<dyn SmsSender> = if config.sms_gateway_url.is_empty() {
    info!("No SMS_GATEWAY_URL set, SMS sending is disabled");
    Arc::new(NoopSms)
  } else {
    Arc::new(HttpSmsGateway::new(
      &config.sms_gateway_url,
      &config.sms_gateway_key
    )?)
  };

  // Got to copy these out now because "config" gets destroyed
  // right after, moving into the shared state as ServiceInfo.
  let bind_address = config.bind_address.clone();
  let api_key = config.api_key.clone();
  let api_key_header = config.api_key_header.clone();
  let rate_limiter = RwLock::new(BasicRateLimiter::new(
    config.rl_max_requests,
    config.rl_max_requests_time,
    config.rl_block_duration
  ));

  let app_state = web::Data::new(AppState {
    pool,
    object_store,
    sms,
    rate_limiter,
    service_info: config.into()
  });

  info!("Starting server on {}", bind_address);

  HttpServer::new(move || {
    let api_guard = guards::ApiKeyGuard::new(&api_key_header, &api_key);
    App::new()
      .app_data(app_state.clone())
      .app_data(web::JsonConfig::default().limit(MAX_JSON_PAYLOAD).error_handler(
        |err, _| actix_web::error::ErrorBadRequest(format!("Broken JSON payload: {}", err))
      ))
      // No idea how this works but it does. Frontend gets a
      // 400 instead of the default HTML error page.
      .app_data(web::PathConfig::default().error_handler(|_, _| {
        actix_web::error::ErrorBadRequest("Invalid path arguments")
      }))
      .app_data(web::QueryConfig::default().error_handler(|_, _| {
        actix_web::error::ErrorBadRequest("Invalid query string arguments")
      }))
      .wrap(middleware::Logger::default())
      // The frontend lives on another origin, the API is
      // public anyway so CORS is wide open.
      .wrap(
        Cors::default()
          .allow_any_origin()
          .allow_any_method()
          .allow_any_header()
          .max_age(3600)
      )
      .configure(|cfg| api_endpoints_config(cfg, api_guard))
      .default_service(web::route().to(handlers::not_found))
  })
  .bind(bind_address)?
  .run()
  .await
  .context("Start Actix web server")
}
