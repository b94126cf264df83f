// Adding the context method to errors:
use eyre::WrapErr;
use color_eyre::Result;
use serde::Deserialize;
use std::convert::From;

#[derive(Debug, Deserialize)]
pub struct Config {
  pub db_path: String,
  pub db_pool_size: u32,
  // "eager" or "lazy", see db::ConnectStrategy:
  pub db_connect: String,
  pub bind_address: String,
  // The shared secret for privileged endpoints. No default on
  // purpose, starting without one is a config error.
  pub api_key: String,
  pub api_key_header: String,
  // "local:<directory>" or "s3:<endpoint URL>":
  pub object_store: String,
  pub object_store_bearer: String,
  pub public_base_url: String,
  pub cache_control: String,
  // SMS gateway settings, empty URL disables sending:
  pub sms_gateway_url: String,
  pub sms_gateway_key: String,
  pub sms_country_code: String,
  pub sms_template: String,
  // Editorial defaults:
  pub default_author: String,
  pub event_name: String,
  // Rate limiter settings:
  pub rl_max_requests: u32,
  pub rl_max_requests_time: u32,
  pub rl_block_duration: u32
}

// Looks redundant but I thought having another struct would be
// better than moving the whole config around the app_state,
// especially since there's sensible info in the config (the
// API key, the gateway credentials).
pub struct ServiceInfo {
  pub default_author: String,
  pub event_name: String,
  pub sms_country_code: String,
  pub sms_template: String,
  pub cache_control: String,
  pub public_base_url: String
}

// Using From so that transforming into ServiceInfo drops all
// of the secret stuff since a "move" is obligatory here.
impl From<Config> for ServiceInfo {
  fn from(config: Config) -> Self {
    Self {
      default_author: config.default_author,
      event_name: config.event_name,
      sms_country_code: config.sms_country_code,
      sms_template: config.sms_template,
      cache_control: config.cache_control,
      public_base_url: config.public_base_url
    }
  }
}

impl Config {

  pub fn from_env() -> Result<Config> {
    // RUST_LOG is already set in main.rs if it was absent.
    // You have to use lowercase here compared to what's in the
    // .env file.
    let c = config::Config::builder()
      .set_default("db_path", "./noticias.sqlite")?
      .set_default("db_pool_size", 10)?
      // Eager crashes on a broken database path at startup,
      // lazy waits for the first request to need the pool:
      .set_default("db_connect", "eager")?
      .set_default("bind_address", "127.0.0.1:8080")?
      .set_default("api_key_header", "x-api-key")?
      // Local directory storage by default, point this at an
      // S3-style endpoint with "s3:https://..." in production:
      .set_default("object_store", "local:./storage")?
      .set_default("object_store_bearer", "")?
      // Should never have a trailing slash or THINGS WILL BREAK.
      .set_default("public_base_url", "http://127.0.0.1:8080/media")?
      // Covers get content-addressed-ish keys, cache them hard:
      .set_default("cache_control", "public, max-age=31536000, immutable")?
      .set_default("sms_gateway_url", "")?
      .set_default("sms_gateway_key", "")?
      .set_default("sms_country_code", "34")?
      .set_default(
        "sms_template",
        "Hola {name}, tu plaza para {event} está confirmada."
      )?
      .set_default("default_author", "La Redacción")?
      .set_default("event_name", "Encuentro anual")?
      // Settings for the basic rate limiter on the public
      // registration endpoints:
      .set_default("rl_max_requests", 120)?
      .set_default("rl_max_requests_time", 60)?
      .set_default("rl_block_duration", 60)?
      .add_source(config::Environment::default())
      .build()?;
    // The error has to be given a context for color_eyre to
    // work here:
    c.try_deserialize()
      .context("Loading configuration from env")
  }

}
