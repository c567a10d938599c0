//! Project id construction.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

/// Longest slug kept after the timestamp prefix.
pub const MAX_SLUG_LEN: usize = 50;

/// Timestamp prefix format: sortable and free of `:` so it is key-safe.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s-]").expect("static regex"));
static SLUG_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s-]+").expect("static regex"));

/// Build a project id `<UTC timestamp>_<slug>` from a topic, e.g.
/// `2025-06-01T14-03-09_how-to-make-coffee-at-home`.
///
/// Two calls within the same second for the same topic return the same id.
/// Runs are started at human cadence, so this collision is accepted rather
/// than papered over with random suffixes.
pub fn create_project_id(base_topic: &str) -> String {
    create_project_id_at(base_topic, Utc::now())
}

/// [`create_project_id`] with an explicit clock reading.
pub fn create_project_id_at(base_topic: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", now.format(TIMESTAMP_FORMAT), slugify(base_topic))
}

/// Lowercase, drop everything but ASCII letters, digits, whitespace and `-`,
/// turn whitespace into single hyphens and cap the length at
/// [`MAX_SLUG_LEN`], cutting at a hyphen when one is available.
pub fn slugify(topic: &str) -> String {
    let lowered = topic.to_lowercase();
    let stripped = NON_SLUG_CHARS.replace_all(&lowered, "");
    let joined = SLUG_SEPARATORS.replace_all(stripped.trim(), "-");
    let slug = joined.trim_matches('-');

    if slug.is_empty() {
        return "untitled".to_string();
    }
    if slug.len() <= MAX_SLUG_LEN {
        return slug.to_string();
    }

    // Slug is ASCII here, so byte slicing is safe.
    let cut = &slug[..MAX_SLUG_LEN];
    let cut = match cut.rfind('-') {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut,
    };
    cut.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextrelay_shared::ProjectId;
    use regex::Regex;

    #[test]
    fn project_id_shape() {
        let id = create_project_id("How to Make Coffee at Home!!");
        let shape =
            Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2}_how-to-make-coffee-at-home$").unwrap();
        assert!(shape.is_match(&id), "unexpected id {id}");
    }

    #[test]
    fn project_id_at_fixed_instant() {
        let now = DateTime::parse_from_rfc3339("2025-06-01T14:03:09.512Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            create_project_id_at("Travel to Peru", now),
            "2025-06-01T14-03-09_travel-to-peru"
        );
    }

    #[test]
    fn same_instant_same_topic_collides() {
        let now = Utc::now();
        assert_eq!(
            create_project_id_at("Budget Travel", now),
            create_project_id_at("Budget Travel", now)
        );
    }

    #[test]
    fn slugify_strips_and_collapses() {
        assert_eq!(slugify("  Hello,   World -- again  "), "hello-world-again");
        assert_eq!(slugify("Top 10 Tips: C++ & Rust"), "top-10-tips-c-rust");
        assert_eq!(slugify("!!!"), "untitled");
        assert_eq!(slugify(""), "untitled");
    }

    #[test]
    fn slugify_truncates_at_word_boundary() {
        let topic = "the quick brown fox jumps over the lazy dog and keeps running far away";
        let slug = slugify(topic);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert_eq!(slug, "the-quick-brown-fox-jumps-over-the-lazy-dog-and");
        assert!(!slug.ends_with('-'));

        let unbroken = "a".repeat(80);
        assert_eq!(slugify(&unbroken).len(), MAX_SLUG_LEN);
    }

    #[test]
    fn created_ids_are_already_normalized() {
        let id = create_project_id("Why -- Dashes --- Matter");
        assert_eq!(ProjectId::normalize(&id), id);
        assert!(ProjectId::parse(&id).is_ok());
    }
}
