use dotenv::dotenv;
use std::env;

pub mod app;
pub mod config;
pub mod db;
pub mod sms;
pub mod storage;
pub mod utils;

#[actix_web::main]
async fn main() -> color_eyre::Result<()> {
  // A .env file is handy in development, in production the
  // real environment wins.
  dotenv().ok();
  if env::var("RUST_LOG").is_err() {
    env::set_var("RUST_LOG", "info");
  }
  env_logger::init();
  color_eyre::install()?;
  app::run().await
}
