use async_trait::async_trait;
use color_eyre::Result;
use eyre::WrapErr;
use log::warn;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Outcome of a send attempt. Sending is best-effort: failures
// get recorded on the attendance row and never fail the
// surrounding request, hence no Result anywhere in here.
#[derive(Debug, Clone)]
pub struct SmsOutcome {
  pub success: bool,
  pub message_id: Option<String>,
  pub error: Option<String>
}

impl SmsOutcome {
  pub fn failure(error: &str) -> Self {
    Self {
      success: false,
      message_id: None,
      error: Some(error.to_string())
    }
  }
}

#[async_trait]
pub trait SmsSender: Send + Sync {
  async fn send(&self, phone: &str, message: &str) -> SmsOutcome;
}

// The template uses {name} and {event} placeholders, anything
// else goes out as-is.
pub fn render_sms_message(template: &str, name: &str, event: &str) -> String {
  template.replace("{name}", name).replace("{event}", event)
}

// Stand-in when no gateway is configured. Registrations still
// work, they just never get their SMS and the rows say so.
pub struct NoopSms;

#[async_trait]
impl SmsSender for NoopSms {
  async fn send(&self, phone: &str, _message: &str) -> SmsOutcome {
    warn!("No SMS gateway configured, not sending to {}", phone);
    SmsOutcome::failure("sms gateway not configured")
  }
}

#[derive(Serialize)]
struct GatewayRequest<'a> {
  phone: &'a str,
  message: &'a str,
  key: &'a str
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayResponse {
  success: bool,
  message_id: Option<String>,
  error: Option<String>
}

pub struct HttpSmsGateway {
  url: String,
  key: String,
  client: reqwest::Client
}

impl HttpSmsGateway {
  pub fn new(url: &str, key: &str) -> Result<Self> {
    // The SMS call carries its own bounded timeout, the
    // provider being slow shouldn't stall registrations.
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(10))
      .build()
      .context("Building the SMS gateway HTTP client")?;
    Ok(Self {
      url: url.to_string(),
      key: key.to_string(),
      client
    })
  }
}

#[async_trait]
impl SmsSender for HttpSmsGateway {
  async fn send(&self, phone: &str, message: &str) -> SmsOutcome {
    let request = GatewayRequest {
      phone,
      message,
      key: &self.key
    };
    let response = match self.client.post(&self.url).json(&request).send().await {
      Ok(r) => r,
      Err(e) => {
        warn!("SMS gateway unreachable: {}", e);
        return SmsOutcome::failure(&format!("gateway unreachable: {}", e));
      }
    };
    if !response.status().is_success() {
      warn!("SMS gateway answered with status {}", response.status());
      return SmsOutcome::failure(&format!("gateway status {}", response.status()));
    }
    match response.json::<GatewayResponse>().await {
      Ok(parsed) => SmsOutcome {
        success: parsed.success,
        message_id: parsed.message_id,
        error: parsed.error
      },
      Err(e) => {
        warn!("SMS gateway answered gibberish: {}", e);
        SmsOutcome::failure(&format!("unparseable gateway response: {}", e))
      }
    }
  }
}
