//! Slug derivation for pie names.

/// Maximum slug length.
pub const MAX_SLUG_LEN: usize = 32;

/// Derive a slug from a human name: lowercase, runs of non-alphanumerics
/// collapse to a single `-`, leading/trailing `-` trimmed, truncated to
/// [`MAX_SLUG_LEN`]. The result may be empty; callers reject that.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(c);
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    slug.trim_end_matches('-').to_string()
}
