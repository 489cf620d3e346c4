use jiff::Timestamp;

/// Current ISO 8601 timestamp without fractional seconds.
pub fn iso_now() -> String {
    Timestamp::now().strftime("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Turn a ticket title into a filename slug: lowercase alphanumeric runs
/// joined by single dashes, truncated to a sane length.
pub fn slugify(title: &str) -> String {
    const MAX_SLUG_LENGTH: usize = 60;

    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug.truncate(MAX_SLUG_LENGTH);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
