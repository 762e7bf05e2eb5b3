//! Slug generation for workspace identifiers.
//!
//! Workspace ids appear in front-end URLs (`/{id}/mcp`), so they are kept to
//! lowercase ASCII letters, digits and single dashes.

use regex::Regex;
use std::sync::OnceLock;

/// Runs of anything that is not a lowercase letter or digit, compiled once.
static SEPARATOR: OnceLock<Regex> = OnceLock::new();

fn separator_pattern() -> &'static Regex {
    SEPARATOR.get_or_init(|| {
        Regex::new(r"[^a-z0-9]+").expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Turn an arbitrary display name into a URL-safe slug.
///
/// Returns `"workspace"` when nothing usable is left.
pub fn slugify(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let slug = separator_pattern().replace_all(&lower, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "workspace".to_string()
    } else {
        slug.to_string()
    }
}

/// Slugify `name` and append `-2`, `-3`, ... until `taken` reports it free.
pub fn unique_slug(name: &str, taken: impl Fn(&str) -> bool) -> String {
    let base = slugify(name);
    if !taken(&base) {
        return base;
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
