//! Path accessor strings.
//!
//! Paths use dots for properties and brackets for indices or quoted keys:
//! `users[0].name`, `meta["content-type"]`. Tokenized paths are cached per
//! distinct string.

use crate::error::{ProtocolError, ProtocolResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Cached tokenizations before the cache is reset.
const CACHE_CAPACITY: usize = 4096;

/// Tokenized path segments.
pub type Segments = Arc<[String]>;

/// Tokenizes `path`, consulting the process-wide cache.
///
/// # Errors
///
/// Fails on an unterminated bracket or quote.
pub fn tokenize(path: &str) -> ProtocolResult<Segments> {
    static CACHE: OnceLock<Mutex<HashMap<String, Segments>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));

    if let Some(segments) = cache.lock().get(path) {
        return Ok(Arc::clone(segments));
    }

    let segments: Segments = split(path)?.into();
    let mut cache = cache.lock();
    if cache.len() >= CACHE_CAPACITY {
        cache.clear();
    }
    cache.insert(path.to_string(), Arc::clone(&segments));
    Ok(segments)
}

/// Parses a segment as an array index.
pub fn as_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

fn split(path: &str) -> ProtocolResult<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => flush(&mut current, &mut segments),
            '[' => {
                flush(&mut current, &mut segments);
                let quote = match chars.peek() {
                    Some(&q @ ('"' | '\'')) => {
                        chars.next();
                        Some(q)
                    }
                    _ => None,
                };
                let mut segment = String::new();
                loop {
                    match (chars.next(), quote) {
                        (None, _) => {
                            return Err(ProtocolError::invalid_path(path, "unterminated bracket"))
                        }
                        (Some(q), Some(open)) if q == open => {
                            if chars.next() != Some(']') {
                                return Err(ProtocolError::invalid_path(
                                    path,
                                    "quoted key must be followed by ]",
                                ));
                            }
                            break;
                        }
                        (Some(']'), None) => break,
                        (Some(ch), _) => segment.push(ch),
                    }
                }
                segments.push(segment);
            }
            _ => current.push(c),
        }
    }
    flush(&mut current, &mut segments);
    Ok(segments)
}

fn flush(current: &mut String, segments: &mut Vec<String>) {
    if !current.is_empty() {
        segments.push(std::mem::take(current));
    }
}
