use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

// Fallback token for slugs that come out empty after
// normalization. The frontend expects a real word here,
// not something UUID-looking.
pub const SLUG_FALLBACK: &str = "noticia";

// Lowercase, then canonical decomposition, then drop the
// combining marks. "Notícia" keeps its accented chars as
// base letter + mark pairs after NFD, so filtering the
// marks out is what turns it into "noticia".
// Anything that isn't a-z or 0-9 afterwards becomes a
// single hyphen, runs included.
// Returns an empty string when nothing survives, see
// to_slug for the version with the fallback.
pub fn normalize_slug(text: &str) -> String {
  let lowered = text.to_lowercase();
  let mut slug = String::with_capacity(lowered.len());
  let mut prev_hyphen = false;
  for c in lowered.nfd().filter(|c| !is_combining_mark(*c)) {
    if c.is_ascii_alphanumeric() {
      slug.push(c);
      prev_hyphen = false;
    } else if !prev_hyphen {
      slug.push('-');
      prev_hyphen = true;
    }
  }
  while slug.ends_with('-') {
    slug.pop();
  }
  while slug.starts_with('-') {
    slug.remove(0);
  }
  slug
}

// Slug derivation with the fixed fallback for text that
// normalizes to nothing. Same input always gives the same
// output, and no uniqueness check happens at this level -
// the database index deals with that.
pub fn to_slug(text: &str) -> String {
  let slug = normalize_slug(text);
  if slug.is_empty() {
    String::from(SLUG_FALLBACK)
  } else {
    slug
  }
}

// Basic HTML escaping for user provided text that ends up
// rendered on the website. Covers the usual suspects only.
pub fn escape_html(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '&' => escaped.push_str("&amp;"),
      '<' => escaped.push_str("&lt;"),
      '>' => escaped.push_str("&gt;"),
      '"' => escaped.push_str("&quot;"),
      '\'' => escaped.push_str("&#x27;"),
      _ => escaped.push(c)
    }
  }
  escaped
}

// String::truncate can panic when the cut point lands in
// the middle of a multibyte char, so we count chars.
pub fn truncate_utf8(value: &mut String, max_chars: usize) {
  if value.chars().count() > max_chars {
    *value = value.chars().take(max_chars).collect();
  }
}

// Object storage keys shouldn't contain path separators or
// exotic characters. We keep the last path segment only and
// map everything outside [A-Za-z0-9._-] to a hyphen.
pub fn sanitize_filename(filename: &str) -> String {
  let last_segment = filename
    .rsplit(['/', '\\'])
    .next()
    .unwrap_or("");
  let mut clean = String::with_capacity(last_segment.len());
  for c in last_segment.chars() {
    if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
      clean.push(c);
    } else {
      clean.push('-');
    }
  }
  // Leading dots would make hidden files on disk backends:
  let trimmed = clean
    .trim_matches(|c| c == '.' || c == '-')
    .to_string();
  if trimmed.is_empty() {
    String::from("archivo")
  } else {
    trimmed
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use regex::Regex;

  #[test]
  fn slug_strips_diacritics() {
    assert_eq!("noticia-incrivel", to_slug("Notícia Incrível!"));
  }

  #[test]
  fn slug_collapses_runs_and_trims() {
    assert_eq!("hello-world", to_slug("  Hello --- World!!  "));
  }

  #[test]
  fn slug_is_idempotent() {
    let once = to_slug("¿Qué pasó ayer en la Región?");
    assert_eq!(once, to_slug(&once));
  }

  #[test]
  fn slug_falls_back_when_nothing_survives() {
    assert_eq!(SLUG_FALLBACK, to_slug(""));
    assert_eq!(SLUG_FALLBACK, to_slug("!!! ???"));
  }

  #[test]
  fn slug_always_matches_expected_shape() {
    let shape = Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap();
    let inputs = [
      "Notícia Incrível!",
      "çà et là",
      "UPPER_case and 123",
      "--- leading trailing ---",
      "日本語のタイトル x",
    ];
    for input in inputs {
      let slug = to_slug(input);
      assert!(
        shape.is_match(&slug) || slug == SLUG_FALLBACK,
        "unexpected slug {:?} for {:?}", slug, input
      );
    }
  }

  #[test]
  fn escapes_the_usual_html() {
    let sut = "<b>\"Hola\" & 'adiós'</b>";
    let expected = "&lt;b&gt;&quot;Hola&quot; &amp; &#x27;adiós&#x27;&lt;/b&gt;";
    assert_eq!(expected, escape_html(sut));
  }

  #[test]
  fn truncate_counts_chars_not_bytes() {
    let mut sut = String::from("ééééé");
    truncate_utf8(&mut sut, 2);
    assert_eq!("éé", sut);
  }

  #[test]
  fn filename_loses_path_and_weird_chars() {
    assert_eq!("passwd", sanitize_filename("../../etc/passwd"));
    assert_eq!("mi-foto.webp", sanitize_filename("mi foto.webp"));
    assert_eq!("archivo", sanitize_filename("¿?"));
  }
}
