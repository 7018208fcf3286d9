use std::collections::HashMap;

/// One segment of a registered route pattern: either a literal that must
/// match verbatim, or a `:name` placeholder that binds whatever segment is
/// in that position of the request path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
  Literal(String),
  Param(String),
}

pub fn parse_pattern(pattern: &str) -> Vec<Segment> {
  pattern.split('/')
         .filter(|s| !s.is_empty())
         .map(|s| match s.strip_prefix(':') {
           | Some(name) => Segment::Param(name.to_owned()),
           | None => Segment::Literal(s.to_owned()),
         })
         .collect()
}

pub fn is_literal(pattern: &[Segment]) -> bool {
  pattern.iter().all(|s| matches!(s, Segment::Literal(_)))
}

pub fn literal_key(pattern: &[Segment]) -> Option<Vec<String>> {
  pattern.iter()
         .map(|s| match s {
           | Segment::Literal(s) => Some(s.clone()),
           | Segment::Param(_) => None,
         })
         .collect()
}

/// Matches a concrete request path against a pattern, returning the bound
/// `:name` params on success. Segment counts must match exactly -- there is
/// no wildcard/rest segment in this scheme.
pub fn match_path(pattern: &[Segment], path: &[String]) -> Option<HashMap<String, String>> {
  if pattern.len() != path.len() {
    return None;
  }

  let mut params = HashMap::new();
  for (seg, actual) in pattern.iter().zip(path) {
    match seg {
      | Segment::Literal(expected) if expected == actual => {},
      | Segment::Literal(_) => return None,
      | Segment::Param(name) => {
        params.insert(name.clone(), actual.clone());
      },
    }
  }
  Some(params)
}

/// Length, in segments, of the longest prefix of `path` that `prefix`
/// matches exactly -- used to pick which mounted sub-router a request
/// belongs to when more than one mount could apply.
pub fn prefix_len(prefix: &[String], path: &[String]) -> Option<usize> {
  if prefix.len() > path.len() {
    return None;
  }
  if prefix.iter().zip(path).all(|(a, b)| a == b) {
    Some(prefix.len())
  } else {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn p(s: &[&str]) -> Vec<String> {
    s.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn matches_dynamic_segment() {
    let pattern = parse_pattern("/sensors/:id/value");
    let params = match_path(&pattern, &p(&["sensors", "42", "value"])).unwrap();
    assert_eq!(params.get("id"), Some(&"42".to_string()));
  }

  #[test]
  fn rejects_wrong_segment_count() {
    let pattern = parse_pattern("/a/:b");
    assert!(match_path(&pattern, &p(&["a"])).is_none());
    assert!(match_path(&pattern, &p(&["a", "b", "c"])).is_none());
  }

  #[test]
  fn longest_prefix_wins() {
    let path = p(&["sensors", "living-room", "temp"]);
    assert_eq!(prefix_len(&p(&["sensors"]), &path), Some(1));
    assert_eq!(prefix_len(&p(&["sensors", "living-room"]), &path), Some(2));
    assert_eq!(prefix_len(&p(&["other"]), &path), None);
  }
}
