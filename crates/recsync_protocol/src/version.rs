//! Record version tokens.
//!
//! A version reads `"<seq>-<uid>-<user>"`. `seq` is a non-negative integer
//! or the stale sentinel `I`, which orders above every finite sequence. The
//! rest of the token (the suffix) breaks ties lexicographically, which makes
//! the order total and lets the client drop duplicate or out-of-order
//! updates by comparing tokens alone.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::OnceLock;

/// Leading character of a stale version token.
pub const STALE_SENTINEL: char = 'I';

/// Separator between the parts of a token.
pub const SEPARATOR: char = '-';

/// The sequence part of a version token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sequence {
    /// A confirmed sequence number.
    Finite(u64),
    /// The stale sentinel; compares greater than any finite sequence.
    Stale,
}

/// A parsed version token borrowing its suffix from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedVersion<'a> {
    /// Sequence part.
    pub sequence: Sequence,
    /// Everything after the first separator.
    pub suffix: &'a str,
}

/// Parses a token into sequence and suffix.
///
/// Returns `None` when the sequence is neither the sentinel nor an integer.
pub fn parse(token: &str) -> Option<ParsedVersion<'_>> {
    let (head, suffix) = token.split_once(SEPARATOR).unwrap_or((token, ""));
    let sequence = if token.starts_with(STALE_SENTINEL) {
        Sequence::Stale
    } else if !head.is_empty() && head.bytes().all(|b| b.is_ascii_digit()) {
        Sequence::Finite(head.parse().ok()?)
    } else {
        return None;
    };
    Some(ParsedVersion { sequence, suffix })
}

/// Returns true if the token carries the stale sentinel.
pub fn is_stale(token: &str) -> bool {
    token.starts_with(STALE_SENTINEL)
}

/// Total order over optional tokens.
///
/// Missing sorts first, then unparsable tokens (by raw text), then valid
/// tokens by sequence and suffix.
pub fn compare(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (parse(a), parse(b)) {
            (None, None) => a.cmp(b),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(pa), Some(pb)) => pa
                .sequence
                .cmp(&pb.sequence)
                .then_with(|| pa.suffix.cmp(pb.suffix)),
        },
    }
}

/// Returns true if `a` is the same as or newer than `b`.
pub fn is_same_or_newer(a: Option<&str>, b: Option<&str>) -> bool {
    compare(a, b) != Ordering::Less
}

/// Builds the next local version after `prev`.
///
/// Returns `None` if `prev` is stale (a stale record is read-only) or if
/// its sequence is already `u64::MAX`.
pub fn next(prev: Option<&str>, user: &str) -> Option<String> {
    let seq = match prev.and_then(parse).map(|p| p.sequence) {
        Some(Sequence::Stale) => return None,
        Some(Sequence::Finite(n)) => n.checked_add(1)?,
        None if prev.is_some_and(is_stale) => return None,
        None => 1,
    };
    Some(format!("{seq}{SEPARATOR}{}{SEPARATOR}{user}", unique_id()))
}

/// A process-unique identifier.
///
/// A random per-process prefix keeps ids from different processes apart;
/// an atomic counter keeps ids within the process apart.
pub fn unique_id() -> String {
    static PREFIX: OnceLock<String> = OnceLock::new();
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let prefix = PREFIX.get_or_init(|| {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        uuid[..10].to_string()
    });
    let n = COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    format!("{prefix}{n:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_finite_and_stale() {
        let parsed = parse("12-abc-user").unwrap();
        assert_eq!(parsed.sequence, Sequence::Finite(12));
        assert_eq!(parsed.suffix, "abc-user");

        let stale = parse("I-abc-user").unwrap();
        assert_eq!(stale.sequence, Sequence::Stale);
        assert_eq!(stale.suffix, "abc-user");

        assert!(parse("x-abc").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn ordering() {
        assert_eq!(compare(Some("2-aaa-u"), Some("1-zzz-u")), Ordering::Greater);
        assert_eq!(compare(Some("I-aaa-u"), Some("I-aaa-u")), Ordering::Equal);
        assert_eq!(compare(Some("I-aaa-u"), Some("999999-zzz-u")), Ordering::Greater);
        assert_eq!(compare(Some("1-aaa-u"), Some("1-aab-u")), Ordering::Less);
        assert_eq!(compare(Some("10-a-u"), Some("9-a-u")), Ordering::Greater);
    }

    #[test]
    fn missing_sorts_first() {
        assert_eq!(compare(None, Some("0-a-u")), Ordering::Less);
        assert_eq!(compare(Some("0-a-u"), None), Ordering::Greater);
        assert_eq!(compare(None, None), Ordering::Equal);
        assert_eq!(compare(Some("junk"), Some("0-a-u")), Ordering::Less);
        assert_eq!(compare(None, Some("junk")), Ordering::Less);
    }

    #[test]
    fn same_or_newer() {
        assert!(is_same_or_newer(Some("1-a-u"), Some("1-a-u")));
        assert!(is_same_or_newer(Some("2-a-u"), Some("1-a-u")));
        assert!(!is_same_or_newer(Some("1-a-u"), Some("2-a-u")));
    }

    #[test]
    fn next_increments_sequence() {
        let v = next(Some("41-xyz-bob"), "alice").unwrap();
        let parsed = parse(&v).unwrap();
        assert_eq!(parsed.sequence, Sequence::Finite(42));
        assert!(v.ends_with("-alice"));
        assert_eq!(compare(Some(&v), Some("41-xyz-bob")), Ordering::Greater);

        let first = next(None, "").unwrap();
        assert!(first.starts_with("1-"));
        assert!(first.ends_with('-'));
    }

    #[test]
    fn stale_has_no_successor() {
        assert!(next(Some("I-abc-u"), "u").is_none());
    }

    #[test]
    fn exhausted_sequence_has_no_successor() {
        let last = format!("{}-abc-u", u64::MAX);
        assert!(next(Some(&last), "u").is_none());
        let before = format!("{}-abc-u", u64::MAX - 1);
        let v = next(Some(&before), "u").unwrap();
        assert_eq!(parse(&v).unwrap().sequence, Sequence::Finite(u64::MAX));
    }

    #[test]
    fn unique_ids_do_not_repeat() {
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| unique_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
