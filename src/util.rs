//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max { s.to_string() } else { format!("{}… ({} bytes total)", truncate_chars(s, max), s.len()) }
}

/// Truncate on a char boundary so we never split a multi-byte sequence.
pub fn truncate_chars(s: &str, max_bytes: usize) -> &str {
  if s.len() <= max_bytes {
    return s;
  }
  let mut end = max_bytes;
  while end > 0 && !s.is_char_boundary(end) {
    end -= 1;
  }
  &s[..end]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_all_pairs() {
    let out = fill_template("Level {level} for {domain}", &[("level", "2"), ("domain", "finance")]);
    assert_eq!(out, "Level 2 for finance");
  }

  #[test]
  fn truncate_respects_char_boundaries() {
    let s = "ab✓cd";
    // "✓" is 3 bytes; cutting inside it must back off to the previous boundary.
    assert_eq!(truncate_chars(s, 3), "ab");
    assert_eq!(truncate_chars(s, 5), "ab✓");
  }
}
