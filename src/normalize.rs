//! Answer normalization (spec §4.5).
//!
//! Lowercase, strip/collapse whitespace, fold comma to period when a digit is present
//! (locale-agnostic decimal separator), fold `ё` to `е`. Equality is over normalized
//! strings; `normalize` is idempotent (`normalize(normalize(x)) == normalize(x)`).

pub fn normalize(input: &str) -> String {
    let lower = input.to_lowercase();
    let has_digit = lower.chars().any(|c| c.is_ascii_digit());

    let folded: String = lower
        .chars()
        .map(|c| match c {
            'ё' => 'е',
            ',' if has_digit => '.',
            other => other,
        })
        .collect();

    collapse_whitespace(&folded)
}

fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;
    for c in input.trim().chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

/// Compares a submitted answer against the canonical answer after normalization.
pub fn answers_match(submitted: &str, canonical: &str) -> bool {
    normalize(submitted) == normalize(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_trims() {
        assert_eq!(normalize("  Paris  "), "paris");
    }

    #[test]
    fn collapses_internal_whitespace() {
        assert_eq!(normalize("new   york   city"), "new york city");
        assert_eq!(normalize("new\t\tyork\ncity"), "new york city");
    }

    #[test]
    fn comma_becomes_period_only_with_digits() {
        assert_eq!(normalize("3,14"), "3.14");
        assert_eq!(normalize("hello, world"), "hello, world");
    }

    #[test]
    fn folds_yo_to_ye() {
        assert_eq!(normalize("ёлка"), "елка");
    }

    #[test]
    fn idempotent() {
        for s in ["  Paris  ", "3,14", "ёлка", "New   York"] {
            let once = normalize(s);
            let twice = normalize(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn matches_after_normalization() {
        assert!(answers_match("  PARIS ", "Paris"));
        assert!(answers_match("3,14", "3.14"));
        assert!(!answers_match("London", "Paris"));
    }
}
