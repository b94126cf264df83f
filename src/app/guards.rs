use actix_web::guard::{Guard, GuardContext};
use log::warn;

/**
 * Guard for the privileged routes (create, update, delete,
 * upload...). A guard that says no just makes the router not
 * match, so clients poking at these without the key get the
 * regular 404 and the admin surface stays invisible. Exactly
 * what I want.
 */
#[derive(Clone)]
pub struct ApiKeyGuard {
  header_name: String,
  api_key: String
}

impl ApiKeyGuard {
  pub fn new(header_name: &str, api_key: &str) -> Self {
    ApiKeyGuard {
      header_name: header_name.to_lowercase(),
      api_key: api_key.to_string()
    }
  }
}

impl Guard for ApiKeyGuard {
  fn check(&self, ctx: &GuardContext<'_>) -> bool {
    // An empty configured key would wave everyone through:
    if self.api_key.is_empty() {
      return false;
    }
    match ctx.head().headers().get(self.header_name.as_str()) {
      Some(value) => match value.to_str() {
        Ok(candidate) if candidate == self.api_key => true,
        _ => {
          warn!("Wrong API key on {}", ctx.head().uri);
          false
        }
      },
      None => false
    }
  }
}
