use actix_web::{error::ResponseError, HttpResponse};
use derive_more::Display;
use log::error;

use crate::db::DbError;

/**
 * The error types the handlers are allowed to surface. The
 * Display strings double as response bodies, so anything
 * sensitive (SQL, file paths...) stays out of them and only
 * shows up in the logs.
 */
#[derive(Debug, Display)]
pub enum Error {
  #[display(fmt = "Internal Server Error")]
  InternalServerError(String),
  #[display(fmt = "Database Error")]
  DatabaseError(String),
  #[display(fmt = "Not Found: {}", _0)]
  NotFound(String),
  #[display(fmt = "Bad Request: {}", _0)]
  BadRequest(String),
  #[display(fmt = "Conflict: {}", _0)]
  Conflict(String),
  #[display(fmt = "Too Many Requests")]
  TooManyRequests
}

impl ResponseError for Error {
  fn error_response(&self) -> HttpResponse {
    match self {
      Error::InternalServerError(_) => {
        HttpResponse::InternalServerError().body(self.to_string())
      }
      Error::DatabaseError(_) => {
        HttpResponse::InternalServerError().body(self.to_string())
      }
      Error::NotFound(_) => HttpResponse::NotFound().body(self.to_string()),
      Error::BadRequest(_) => HttpResponse::BadRequest().body(self.to_string()),
      Error::Conflict(_) => HttpResponse::Conflict().body(self.to_string()),
      Error::TooManyRequests => {
        HttpResponse::TooManyRequests().body(self.to_string())
      }
    }
  }
}

/**
 * Database errors keep their interesting distinctions
 * (conflict, not found) and everything else becomes a
 * generic failure that gets logged in full right here, which
 * saves me from sprinkling error! calls over every handler.
 */
pub fn map_db_error(e: DbError) -> Error {
  match e {
    DbError::Conflict(msg) => Error::Conflict(msg),
    DbError::NotFound => Error::NotFound("No matching record".to_string()),
    other => {
      error!("Database failure - {}", other);
      Error::DatabaseError(other.to_string())
    }
  }
}
