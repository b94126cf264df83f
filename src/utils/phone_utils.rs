// Phone numbers get normalized to a country code prefixed
// digit string before they're used as a dedup key or handed
// to the SMS gateway. The usual separator characters are
// tolerated, anything else makes the number invalid.

pub fn normalize_phone(raw: &str, country_code: &str) -> Option<String> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }
  let mut digits = String::with_capacity(trimmed.len());
  let mut international = false;
  for (i, c) in trimmed.chars().enumerate() {
    match c {
      '+' if i == 0 => international = true,
      '0'..='9' => digits.push(c),
      ' ' | '-' | '.' | '(' | ')' => {},
      _ => return None
    }
  }
  // "00" is the old school international prefix:
  if !international && digits.starts_with("00") {
    international = true;
    digits = digits[2..].to_string();
  }
  let normalized = if international {
    digits
  } else {
    // Local number: drop leading zeros and prepend the
    // configured country code.
    format!("{}{}", country_code, digits.trim_start_matches('0'))
  };
  // E.164 says 15 digits max. The lower bound is there to
  // reject things like a lone "0".
  if normalized.len() < 8 || normalized.len() > 15 {
    return None;
  }
  Some(normalized)
}
