//! Hierarchical key codec.
//!
//! A variable path like `["counters", "mainpage"]` is flattened into one
//! row key by escaping each segment and joining with `_`. A literal `_`
//! escapes to `|_` and a literal `|` to `||`, so the join separator never
//! collides with escaped content and decoding recovers the exact path.

/// Joins escaped segments; never appears unescaped inside one.
pub const SEPARATOR: char = '_';
/// Escape marker.
pub const ESCAPE: char = '|';
/// Upper bound sentinel for subtree scans: the separator's successor.
/// Any key with `prefix + SEPARATOR` as a strict prefix compares below
/// `prefix + UPPER_SENTINEL` regardless of what follows the separator,
/// so the bound is exact for every name alphabet (including escaped `|`).
const UPPER_SENTINEL: char = '`';

/// Escape one path segment.
pub fn escape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for ch in segment.chars() {
        match ch {
            ESCAPE => {
                out.push(ESCAPE);
                out.push(ESCAPE);
            }
            SEPARATOR => {
                out.push(ESCAPE);
                out.push(SEPARATOR);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Invert [`escape`]. Total: a trailing lone escape marker (which `escape`
/// never produces) is kept literally.
pub fn unescape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(ch) = chars.next() {
        if ch == ESCAPE {
            match chars.next() {
                Some(escaped) => out.push(escaped),
                None => out.push(ESCAPE),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Row key for `name` under an already-encoded `prefix` (`""` for the root).
pub fn compose_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        escape(name)
    } else {
        format!("{prefix}{SEPARATOR}{}", escape(name))
    }
}

/// Split an encoded key on unescaped separators. Segments stay escaped.
pub fn split_segments(key: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, ch) in key.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == ESCAPE {
            escaped = true;
        } else if ch == SEPARATOR {
            segments.push(&key[start..i]);
            start = i + SEPARATOR.len_utf8();
        }
    }
    segments.push(&key[start..]);
    segments
}

/// The unescaped leaf name of an encoded key, or `None` when the key has
/// no separator (a root-level name).
pub fn extract_leaf(key: &str) -> Option<String> {
    let segments = split_segments(key);
    if segments.len() < 2 {
        return None;
    }
    segments.last().map(|leaf| unescape(leaf))
}

/// Half-open row-key interval `[lower, upper)` containing every key that
/// has `prefix` as an ancestor path, and nothing else.
pub fn range_bounds(prefix: &str) -> (String, String) {
    (
        format!("{prefix}{SEPARATOR}"),
        format!("{prefix}{UPPER_SENTINEL}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // Names exercising every escaping edge: reserved characters alone,
    // adjacent, repeated, mixed with ordinary text and non-ASCII.
    const CORPUS: &[&str] = &[
        "",
        "plain",
        "mainpage",
        "a_b",
        "a|b",
        "_",
        "|",
        "__",
        "||",
        "|_",
        "_|",
        "a__b",
        "a||b",
        "|_|_",
        "_|_|",
        "trailing_",
        "|leading",
        "héllo_wörld|mix",
        "日本語_キー",
    ];

    #[test]
    fn escape_reserved_characters() {
        assert_eq!(escape("a_b"), "a|_b");
        assert_eq!(escape("a|b"), "a||b");
        assert_eq!(escape("_|"), "|_||");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn unescape_inverts_escape_over_corpus() {
        for name in CORPUS {
            assert_eq!(unescape(&escape(name)), *name, "round trip of {name:?}");
        }
    }

    #[test]
    fn escaped_segments_contain_no_bare_separator() {
        for name in CORPUS {
            let escaped = escape(name);
            assert_eq!(split_segments(&escaped).len(), 1, "escaped {name:?}");
        }
    }

    #[test]
    fn compose_key_root_and_nested() {
        assert_eq!(compose_key("", "counterName"), "counterName");
        assert_eq!(compose_key("counters", "mainpage"), "counters_mainpage");
        assert_eq!(compose_key("counters", "a_b"), "counters_a|_b");
        assert_eq!(compose_key("counters_inner", "x"), "counters_inner_x");
    }

    #[test]
    fn compose_key_is_injective_per_prefix() {
        for prefix in ["", "counters", "a|_b"] {
            let mut seen = std::collections::HashSet::new();
            for name in CORPUS {
                assert!(
                    seen.insert(compose_key(prefix, name)),
                    "collision for {name:?} under {prefix:?}"
                );
            }
        }
    }

    #[test]
    fn nested_and_flat_names_never_collide() {
        // The path ["a", "b"] and the single root name "a_b" encode apart.
        assert_ne!(compose_key(&compose_key("", "a"), "b"), compose_key("", "a_b"));
    }

    #[test]
    fn split_segments_respects_escapes() {
        assert_eq!(split_segments("counters_mainpage"), ["counters", "mainpage"]);
        assert_eq!(split_segments("a|_b"), ["a|_b"]);
        assert_eq!(split_segments("a||_b"), ["a||", "b"]);
        assert_eq!(split_segments("root"), ["root"]);
        assert_eq!(split_segments("a_b_c"), ["a", "b", "c"]);
    }

    #[test]
    fn extract_leaf_recovers_name() {
        for prefix in ["counters", "counters_deep", "we|_ird"] {
            for name in CORPUS {
                let key = compose_key(prefix, name);
                assert_eq!(extract_leaf(&key).as_deref(), Some(*name), "{name:?}");
            }
        }
    }

    #[test]
    fn extract_leaf_is_none_for_root_level_keys() {
        assert_eq!(extract_leaf("counterName"), None);
        assert_eq!(extract_leaf("a|_b"), None);
        assert_eq!(extract_leaf(""), None);
    }

    #[test]
    fn range_bounds_contain_exactly_the_subtree() {
        let (lower, upper) = range_bounds("counters");
        for name in CORPUS {
            let key = compose_key("counters", name);
            assert!(key.as_str() >= lower.as_str(), "{key:?} below lower");
            assert!(key.as_str() < upper.as_str(), "{key:?} above upper");

            // Grandchildren stay inside the ancestor bounds too.
            let deep = compose_key(&compose_key("counters", name), "leaf");
            assert!(deep.as_str() >= lower.as_str() && deep.as_str() < upper.as_str());
        }

        // Sibling prefixes and escaped lookalikes fall outside.
        for outside in [
            compose_key("", "counters"),       // the dictionary row itself
            compose_key("", "counters_x"),     // root name escaping to counters|_x
            compose_key("countersX", "y"),     // sibling prefix
            compose_key("counter", "y"),       // shorter sibling
        ] {
            assert!(
                outside.as_str() < lower.as_str() || outside.as_str() >= upper.as_str(),
                "{outside:?} leaked into the subtree bounds"
            );
        }
    }
}
