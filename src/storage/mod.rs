use async_trait::async_trait;
use chrono::{Datelike, Utc};
use color_eyre::Result;
use eyre::{eyre, WrapErr};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::utils::text_utils::sanitize_filename;

// Covers are small WEBP files so we buffer them whole. This
// trait hides whether they land on the local disk or on some
// S3-flavored endpoint.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
  // Where a stored key ends up for the public.
  fn public_url(&self, key: &str) -> String;
  // Returns the public URL of the stored object.
  async fn put(
    &self,
    key: &str,
    bytes: &[u8],
    content_type: &str,
    cache_control: &str
  ) -> Result<String>;
  async fn delete(&self, key: &str) -> Result<()>;
}

// Keys look like "covers/2021/03/<random>-archivo.webp". The
// random part makes collisions a non-issue, the rest keeps the
// bucket browsable by hand.
pub fn object_key(kind: &str, filename: &str) -> String {
  let now = Utc::now();
  format!(
    "{}/{}/{:02}/{}-{}",
    kind,
    now.year(),
    now.month(),
    Uuid::new_v4().simple(),
    sanitize_filename(filename)
  )
}

// Turns a cover URL back into a storage key, but only when the
// URL is actually rooted at our public base. Anything else is
// somebody else's file and we won't touch it.
pub fn key_for_public_url(url: &str, public_base_url: &str) -> Option<String> {
  let base = public_base_url.trim_end_matches('/');
  let rest = url.strip_prefix(base)?;
  let key = rest.strip_prefix('/')?;
  // No hidden path tricks in keys we act on:
  if key.is_empty() || key.contains("..") {
    return None;
  }
  Some(key.to_string())
}

// Config picks the backend through a scheme prefix:
// "local:./storage" or "s3:https://bucket.example.com".
pub fn from_config(
  object_store: &str,
  public_base_url: &str,
  bearer: &str
) -> Result<Arc<dyn ObjectStorage>> {
  if let Some(dir) = object_store.strip_prefix("local:") {
    return Ok(Arc::new(FsObjectStore::new(dir, public_base_url)));
  }
  if let Some(endpoint) = object_store.strip_prefix("s3:") {
    let bearer = if bearer.is_empty() {
      None
    } else {
      Some(bearer.to_string())
    };
    return Ok(Arc::new(HttpObjectStore::new(endpoint, public_base_url, bearer)?));
  }
  Err(eyre!("Unknown object store setting: {}", object_store))
}

pub struct FsObjectStore {
  root: PathBuf,
  public_base_url: String
}

impl FsObjectStore {
  pub fn new(root: &str, public_base_url: &str) -> Self {
    Self {
      root: PathBuf::from(root),
      public_base_url: public_base_url.trim_end_matches('/').to_string()
    }
  }
}

#[async_trait]
impl ObjectStorage for FsObjectStore {
  fn public_url(&self, key: &str) -> String {
    format!("{}/{}", self.public_base_url, key)
  }

  // Files are a few hundred KB at most, plain std::fs is fine
  // even from the async context.
  async fn put(
    &self,
    key: &str,
    bytes: &[u8],
    _content_type: &str,
    _cache_control: &str
  ) -> Result<String> {
    let path = self.root.join(key);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).context("Creating the object directory")?;
    }
    fs::write(&path, bytes).context("Writing the object file")?;
    Ok(self.public_url(key))
  }

  async fn delete(&self, key: &str) -> Result<()> {
    match fs::remove_file(self.root.join(key)) {
      Ok(_) => Ok(()),
      // Deleting something already gone counts as done:
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e).context("Deleting the object file")
    }
  }
}

pub struct HttpObjectStore {
  base_url: String,
  public_base_url: String,
  bearer: Option<String>,
  client: reqwest::Client
}

impl HttpObjectStore {
  pub fn new(
    base_url: &str,
    public_base_url: &str,
    bearer: Option<String>
  ) -> Result<Self> {
    // A hung object store should never pin a request forever,
    // so short connect and bounded request timeouts:
    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(5))
      .timeout(Duration::from_secs(15))
      .build()
      .context("Building the object storage HTTP client")?;
    Ok(Self {
      base_url: base_url.trim_end_matches('/').to_string(),
      public_base_url: public_base_url.trim_end_matches('/').to_string(),
      bearer,
      client
    })
  }

  fn object_url(&self, key: &str) -> String {
    format!("{}/{}", self.base_url, key)
  }

  fn auth_headers(&self) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(token) = &self.bearer {
      let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .context("Invalid bearer token for object storage")?;
      headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
  }
}

#[async_trait]
impl ObjectStorage for HttpObjectStore {
  fn public_url(&self, key: &str) -> String {
    format!("{}/{}", self.public_base_url, key)
  }

  async fn put(
    &self,
    key: &str,
    bytes: &[u8],
    content_type: &str,
    cache_control: &str
  ) -> Result<String> {
    let response = self
      .client
      .put(self.object_url(key))
      .headers(self.auth_headers()?)
      .header(CONTENT_TYPE, content_type)
      .header(CACHE_CONTROL, cache_control)
      .body(bytes.to_vec())
      .send()
      .await
      .context("Uploading object")?;
    if !response.status().is_success() {
      return Err(eyre!(
        "Object upload failed with status {}",
        response.status()
      ));
    }
    Ok(self.public_url(key))
  }

  async fn delete(&self, key: &str) -> Result<()> {
    let response = self
      .client
      .delete(self.object_url(key))
      .headers(self.auth_headers()?)
      .send()
      .await
      .context("Deleting object")?;
    // 404 means it's gone already, which is what we wanted:
    if !response.status().is_success() && response.status().as_u16() != 404 {
      return Err(eyre!(
        "Object delete failed with status {}",
        response.status()
      ));
    }
    Ok(())
  }
}
