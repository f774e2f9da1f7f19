//! Client name normalization.
//!
//! Event titles arrive as free text like `"PRO NR - Maria Silva"` or
//! `"Maria Silva (5x CS)"`. The canonical client name strips trailing
//! annotations and rewrites staff-keyword prefixes to a fixed
//! `<keyword> <name>` form.

use std::sync::OnceLock;

use regex::Regex;

// Trailing annotations: " - rest", " (…CS)", "[…]". First match only.
fn re_trailing_annotation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\s-\s.*|\s\(.*CS\)|\[.*\])").unwrap())
}

/// Remove the first trailing annotation from a title fragment.
fn strip_annotations(text: &str) -> String {
    re_trailing_annotation().replace(text, "").trim().to_string()
}

/// Canonical client base name from an event title.
///
/// Keyword handling first: when the title starts with a configured staff
/// keyword (case-insensitive, first match wins), the remainder — minus an
/// optional leading hyphen — is annotation-stripped and rebuilt as
/// `<keyword> <remainder>` (or the keyword alone when nothing remains).
/// Titles without a keyword prefix are annotation-stripped as a whole.
pub fn client_base_name(title: &str, pt_keywords: &[String]) -> String {
    let trimmed = title.trim();

    for kw in pt_keywords {
        let matches_prefix = trimmed
            .get(..kw.len())
            .map(|prefix| prefix.eq_ignore_ascii_case(kw))
            .unwrap_or(false);
        if !matches_prefix {
            continue;
        }
        let mut rest = trimmed[kw.len()..].trim();
        if let Some(after_hyphen) = rest.strip_prefix('-') {
            rest = after_hyphen.trim();
        }
        let rest = strip_annotations(rest);
        return if rest.is_empty() {
            kw.clone()
        } else {
            format!("{} {}", kw, rest)
        };
    }

    strip_annotations(trimmed)
}
