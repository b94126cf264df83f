/**
 * Small shared pieces for the queries in mod.rs.
 */

pub fn generate_field_equal_qmark(name: &str) -> String {
  format!("{} = ?", name)
}

// Categories and tags are set-like: trim everything, drop
// empties, dedup case-insensitively but keep the original
// casing and order of the first occurrence.
pub fn dedup_labels(labels: &[String]) -> Vec<String> {
  let mut seen: Vec<String> = Vec::new();
  let mut result: Vec<String> = Vec::new();
  for label in labels {
    let trimmed = label.trim();
    if trimmed.is_empty() {
      continue;
    }
    let lowered = trimmed.to_lowercase();
    if seen.contains(&lowered) {
      continue;
    }
    seen.push(lowered);
    result.push(trimmed.to_string());
  }
  result
}
