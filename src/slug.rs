//! Slug codec for detail-page URLs.
//!
//! A slug is `{normalized-title}-{id}`; the numeric id is always
//! recoverable, the title half is lossy and only there for humans.

/// Build a URL-safe slug from a display title and a numeric id.
///
/// Falls back to `item-{id}` when the title has nothing usable in it.
pub fn generate(title: &str, id: u64) -> String {
    let mut slug = String::with_capacity(title.len() + 12);
    let mut pending_hyphen = false;
    for c in title.to_lowercase().chars() {
        match c {
            'a'..='z' | '0'..='9' => {
                if pending_hyphen && !slug.is_empty() {
                    slug.push('-');
                }
                pending_hyphen = false;
                slug.push(c);
            }
            ' ' | '\t' | '\n' | '\r' | '-' => pending_hyphen = true,
            _ => {}
        }
    }

    if slug.is_empty() {
        return format!("item-{id}");
    }
    format!("{slug}-{id}")
}

/// Recover the id from a slug. Accepts a bare numeric id, a trailing
/// `-<digits>` group, or a leading `<digits>-` group. Anything else is
/// `None` and callers treat it as "entity not found".
pub fn parse(slug: &str) -> Option<u64> {
    if !slug.is_empty() && slug.chars().all(|c| c.is_ascii_digit()) {
        return slug.parse().ok();
    }

    if let Some(pos) = slug.rfind('-') {
        let tail = &slug[pos + 1..];
        if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(id) = tail.parse() {
                return Some(id);
            }
        }
    }

    if let Some(pos) = slug.find('-') {
        let head = &slug[..pos];
        if !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()) {
            return head.parse().ok();
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_normalized_slug() {
        assert_eq!(generate("The Matrix", 603), "the-matrix-603");
        assert_eq!(generate("Spider-Man: No Way Home", 634649), "spider-man-no-way-home-634649");
        assert_eq!(generate("  WALL·E  ", 10681), "walle-10681");
    }

    #[test]
    fn collapses_runs_and_trims_edges() {
        assert_eq!(generate("a  --  b", 1), "a-b-1");
        assert_eq!(generate("--hello--", 2), "hello-2");
    }

    #[test]
    fn empty_title_falls_back() {
        assert_eq!(generate("", 42), "item-42");
        assert_eq!(generate("???", 42), "item-42");
    }

    #[test]
    fn round_trips_the_id() {
        for (title, id) in [
            ("Dexter", 1405),
            ("1917", 530915),
            ("M*A*S*H", 918),
            ("Se7en", 807),
        ] {
            assert_eq!(parse(&generate(title, id)), Some(id));
        }
    }

    #[test]
    fn parses_bare_and_positional_ids() {
        assert_eq!(parse("1405"), Some(1405));
        assert_eq!(parse("dexter-1405"), Some(1405));
        assert_eq!(parse("1405-dexter"), Some(1405));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse("not-a-slug"), None);
        assert_eq!(parse(""), None);
        assert_eq!(parse("-"), None);
        assert_eq!(parse("abc-12x"), None);
    }
}
