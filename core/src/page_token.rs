//! Offset-based pagination (AIP-158).
//!
//! Page tokens are opaque to clients but decode to `base64("offset:N")`
//! with a non-negative integer offset. The codec is deliberately strict:
//! anything that is not exactly that shape is an invalid-argument error.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::AutomationError;
use crate::error::Result;

const OFFSET_PREFIX: &str = "offset:";

pub fn encode_page_token(offset: usize) -> String {
    BASE64.encode(format!("{OFFSET_PREFIX}{offset}"))
}

/// Strict decode: the empty token is an error here. Handlers that treat the
/// empty token as "first page" go through [`resolve_offset`].
pub fn decode_page_token(token: &str) -> Result<usize> {
    let fail = || AutomationError::invalid_page_token(token);
    if token.is_empty() {
        return Err(fail());
    }
    let raw = BASE64.decode(token).map_err(|_| fail())?;
    let text = String::from_utf8(raw).map_err(|_| fail())?;
    let digits = text.strip_prefix(OFFSET_PREFIX).ok_or_else(fail)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(fail());
    }
    digits.parse::<usize>().map_err(|_| fail())
}

/// The starting offset for a list request: zero for the empty token,
/// otherwise the decoded offset.
pub fn resolve_offset(token: &str) -> Result<usize> {
    if token.is_empty() {
        Ok(0)
    } else {
        decode_page_token(token)
    }
}

/// The effective page size: `default` when the request leaves the field
/// unset or non-positive.
pub fn effective_page_size(requested: i32, default: usize) -> usize {
    if requested <= 0 {
        default
    } else {
        requested as usize
    }
}

/// Slices one page out of an already-sorted listing. Returns the page and
/// the next token, which is empty when the listing is exhausted.
pub fn paginate<T: Clone>(sorted: &[T], page_size: usize, token: &str) -> Result<(Vec<T>, String)> {
    let start = resolve_offset(token)?;
    if start >= sorted.len() {
        return Ok((Vec::new(), String::new()));
    }
    let end = start.saturating_add(page_size).min(sorted.len());
    let next_token = if end < sorted.len() {
        encode_page_token(end)
    } else {
        String::new()
    };
    Ok((sorted[start..end].to_vec(), next_token))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn token_round_trips_for_all_offsets() {
        for offset in [0, 1, 99, 100, 4096, usize::MAX / 2] {
            assert_eq!(decode_page_token(&encode_page_token(offset)).unwrap(), offset);
        }
    }

    #[test]
    fn empty_token_is_a_decode_error_but_offset_zero() {
        assert!(decode_page_token("").is_err());
        assert_eq!(resolve_offset("").unwrap(), 0);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for bad in [
            "not base64!".to_string(),
            BASE64.encode("offset:"),
            BASE64.encode("offset:-1"),
            BASE64.encode("offset:1.5"),
            BASE64.encode("offset:abc"),
            BASE64.encode("cursor:5"),
            BASE64.encode("offset:1 "),
        ] {
            assert!(decode_page_token(&bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn paging_yields_the_whole_list_in_order_without_duplicates() {
        let items: Vec<u32> = (0..250).collect();
        let mut token = String::new();
        let mut collected = Vec::new();
        loop {
            let (page, next) = paginate(&items, 100, &token).unwrap();
            collected.extend(page);
            if next.is_empty() {
                break;
            }
            token = next;
        }
        assert_eq!(collected, items);
    }

    #[test]
    fn final_page_has_empty_token_and_offset_past_end_is_empty() {
        let items: Vec<u32> = (0..5).collect();
        let (page, next) = paginate(&items, 10, "").unwrap();
        assert_eq!(page, items);
        assert_eq!(next, "");

        let (page, next) = paginate(&items, 10, &encode_page_token(99)).unwrap();
        assert!(page.is_empty());
        assert_eq!(next, "");
    }

    #[test]
    fn default_page_size_applies_when_unset() {
        assert_eq!(effective_page_size(0, 100), 100);
        assert_eq!(effective_page_size(-3, 50), 50);
        assert_eq!(effective_page_size(25, 100), 25);
    }
}
