use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lazy_static::lazy_static;
use regex::Regex;

use super::error::Error;

lazy_static! {
  // Covers arrive as data URLs straight out of a canvas
  // export. Only WEBP gets through.
  static ref WEBP_DATA_URL: Regex =
    Regex::new("^data:image/webp;base64,([A-Za-z0-9+/=]+)$").unwrap();
}

/**
 * Unwraps a base64 WEBP data URL into raw bytes. The media
 * type in the URL is client-provided so the bytes get sniffed
 * too: a WEBP file starts with RIFF....WEBP and anything that
 * doesn't is rejected before we talk to any storage backend.
 */
pub fn decode_webp_data_url(data_url: &str) -> Result<Vec<u8>, Error> {
  let captures = WEBP_DATA_URL.captures(data_url.trim()).ok_or_else(|| {
    Error::BadRequest(
      "Expected a base64 data URL with image/webp content".to_string()
    )
  })?;
  let bytes = STANDARD
    .decode(&captures[1])
    .map_err(|_| Error::BadRequest("Broken base64 payload".to_string()))?;
  if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WEBP" {
    return Err(Error::BadRequest(
      "File content does not look like WEBP".to_string()
    ));
  }
  Ok(bytes)
}
