//! Typed extraction from a `k=v;k=v` parameter string: a single linear scan,
//! no allocation beyond the caller's output, and a three-way return contract
//! (found / missing / too-long) expressed as an enum so the caller cannot
//! forget to check which case fired.

/// The three outcomes of a parameter lookup. `TooLong` deliberately carries
/// no partial value -- the caller must treat it as a hard error, never a
/// truncated read.
#[derive(Debug, Eq, PartialEq)]
pub enum Outcome<'a> {
    Found(&'a str),
    Missing,
    TooLong,
}

/// Scans `params` (a `key=value;key=value` string) for `key` and returns its
/// value, bounded by `max_len` bytes. O(n*m) where n is the length of
/// `params` and m is the length of `key` -- a linear scan is sufficient for
/// parameter strings under a few kilobytes.
pub fn extract<'a>(params: &'a str, key: &str, max_len: usize) -> Outcome<'a> {
    for pair in params.split(';') {
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, '=');
        let found_key = match parts.next() {
            Some(k) => k,
            None => continue,
        };
        let value = match parts.next() {
            Some(v) => v,
            None => continue,
        };

        if found_key == key {
            return if value.len() > max_len {
                Outcome::TooLong
            } else {
                Outcome::Found(value)
            };
        }
    }

    Outcome::Missing
}

/// Convenience wrapper for the common "required, no length limit beyond a
/// generous default" case used by most command handlers.
pub fn extract_default<'a>(params: &'a str, key: &str) -> Outcome<'a> {
    extract(params, key, 4096)
}

/// Iterates every `(key, value)` pair in `params` without allocating.
pub fn pairs(params: &str) -> impl Iterator<Item = (&str, &str)> {
    params.split(';').filter(|p| !p.is_empty()).filter_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let k = parts.next()?;
        let v = parts.next()?;
        Some((k, v))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_value_for_known_key() {
        assert_eq!(
            extract_default("ns=test;set=demo;indexname=idx_a", "set"),
            Outcome::Found("demo")
        );
    }

    #[test]
    fn missing_key_reports_missing() {
        assert_eq!(extract_default("ns=test", "set"), Outcome::Missing);
    }

    #[test]
    fn value_exactly_at_bound_is_accepted() {
        assert_eq!(extract("k=abcde", "k", 5), Outcome::Found("abcde"));
    }

    #[test]
    fn value_one_over_bound_is_too_long() {
        assert_eq!(extract("k=abcdef", "k", 5), Outcome::TooLong);
    }

    #[test]
    fn first_matching_pair_wins_on_duplicate_keys() {
        assert_eq!(extract_default("k=first;k=second", "k"), Outcome::Found("first"));
    }

    #[test]
    fn pairs_iterates_in_order() {
        let collected: Vec<_> = pairs("a=1;b=2;c=3").collect();
        assert_eq!(collected, vec![("a", "1"), ("b", "2"), ("c", "3")]);
    }
}
