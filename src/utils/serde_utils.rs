use serde::{Deserialize, Deserializer};

// Double Option trick from here:
// https://github.com/serde-rs/serde/issues/984
// Lets PATCH-style forms distinguish "field absent" (outer None,
// via the serde default) from "field set to null" (Some(None)).
// To be used with annotation:
// #[serde(default, deserialize_with = "serde_utils::some_option")]
pub fn some_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}

// Empty strings coming from forms are treated as "not provided".
// Doing this in the DTO conversion with a plain old function:
pub fn empty_string_to_none(value: Option<String>) -> Option<String> {
  match value {
    Some(s) => if s.trim().is_empty()
      { None } else { Some(s) },
    None => None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Deserialize;

  #[derive(Deserialize)]
  struct Form {
    #[serde(default, deserialize_with = "some_option")]
    cover: Option<Option<String>>,
  }

  #[test]
  fn absent_field_is_outer_none() {
    let sut: Form = serde_json::from_str("{}").unwrap();
    assert_eq!(None, sut.cover);
  }

  #[test]
  fn null_field_is_inner_none() {
    let sut: Form = serde_json::from_str(r#"{"cover": null}"#).unwrap();
    assert_eq!(Some(None), sut.cover);
  }

  #[test]
  fn value_comes_through() {
    let sut: Form = serde_json::from_str(r#"{"cover": "a.webp"}"#).unwrap();
    assert_eq!(Some(Some("a.webp".to_string())), sut.cover);
  }

  #[test]
  fn empty_strings_become_none() {
    assert_eq!(None, empty_string_to_none(Some("  ".to_string())));
    assert_eq!(
      Some("x".to_string()),
      empty_string_to_none(Some("x".to_string()))
    );
  }
}
