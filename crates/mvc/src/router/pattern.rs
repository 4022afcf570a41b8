use crate::request::PathVariables;

/// Strips one leading slash.
pub(crate) fn normalize(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// A pattern is dynamic if any of its segments is a `{name}` placeholder.
pub fn is_dynamic_pattern(pattern: &str) -> bool {
    normalize(pattern).split('/').any(|segment| placeholder(segment).is_some())
}

fn placeholder(segment: &str) -> Option<&str> {
    segment.strip_prefix('{')?.strip_suffix('}').map(str::trim)
}

/// Matches a normalized path against a dynamic pattern segment by segment.
///
/// Segment counts must be equal. A placeholder binds the whole segment, a
/// literal must match exactly, and a placeholder with an empty name never matches.
pub(crate) fn match_pattern(pattern: &str, path: &str) -> Option<PathVariables> {
    let pattern_segments = normalize(pattern).split('/');
    let path_segments = path.split('/');
    if pattern_segments.clone().count() != path_segments.clone().count() {
        return None;
    }

    let mut vars = PathVariables::new();
    for (expected, actual) in pattern_segments.zip(path_segments) {
        match placeholder(expected) {
            Some("") => return None,
            Some(name) => vars.push(name, actual),
            None if expected == actual => {}
            None => return None,
        }
    }
    Some(vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_patterns() {
        assert!(is_dynamic_pattern("products/{id}"));
        assert!(is_dynamic_pattern("/{a}/b"));
        assert!(!is_dynamic_pattern("products/list"));
        assert!(!is_dynamic_pattern("create-user"));
    }

    #[test]
    fn extracts_variables_in_order() {
        let vars = match_pattern("/products/{id}/category/{catId}", "products/12/category/34").unwrap();
        let pairs: Vec<_> = vars.iter().collect();
        assert_eq!(pairs, vec![("id", "12"), ("catId", "34")]);
    }

    #[test]
    fn segment_counts_must_match() {
        assert!(match_pattern("products/{id}", "products/1/2").is_none());
        assert!(match_pattern("products/{id}", "products").is_none());
        assert!(match_pattern("products/{id}", "orders/1").is_none());
    }

    #[test]
    fn empty_placeholder_never_matches() {
        assert!(match_pattern("products/{ }", "products/1").is_none());
        assert!(match_pattern("products/{}", "products/1").is_none());
    }

    #[test]
    fn placeholder_names_are_trimmed() {
        let vars = match_pattern("users/{ id }", "users/5").unwrap();
        assert_eq!(vars.get("id"), Some("5"));
    }
}
