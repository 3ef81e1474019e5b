use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// Clamps the wire page size into `[1, MAX_PAGE_SIZE]`, substituting the
/// default when the client sent nothing.
pub fn effective_page_size(page_size: i32) -> i64 {
    if page_size <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        (page_size as i64).min(MAX_PAGE_SIZE)
    }
}

/// Page tokens are opaque to clients: base64-url of the last returned row id.
/// The store turns the id back into a keyset predicate over
/// `(created_at, id)`.
pub fn encode_page_token(last_id: i64) -> String {
    URL_SAFE_NO_PAD.encode(last_id.to_string())
}

pub fn decode_page_token(token: &str) -> Result<Option<i64>, String> {
    if token.is_empty() {
        return Ok(None);
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| "Invalid page token".to_string())?;
    let value = String::from_utf8(bytes).map_err(|_| "Invalid page token".to_string())?;
    value
        .parse::<i64>()
        .map(Some)
        .map_err(|_| "Invalid page token".to_string())
}

/// The `next_page_token` for a page: empty when the page was not full, the
/// last row's id otherwise.
pub fn next_page_token<T>(items: &[T], page_size: i64, last_id: impl Fn(&T) -> i64) -> String {
    if (items.len() as i64) < page_size {
        String::new()
    } else {
        items.last().map(|item| encode_page_token(last_id(item))).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_tokens_round_trip() {
        for id in [0i64, 1, 42, i64::MAX] {
            let token = encode_page_token(id);
            assert_eq!(decode_page_token(&token).unwrap(), Some(id));
        }
    }

    #[test]
    fn empty_token_means_first_page() {
        assert_eq!(decode_page_token("").unwrap(), None);
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert!(decode_page_token("!!!").is_err());
        assert!(decode_page_token(&URL_SAFE_NO_PAD.encode("not-a-number")).is_err());
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(effective_page_size(0), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_page_size(-5), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_page_size(10), 10);
        assert_eq!(effective_page_size(100000), MAX_PAGE_SIZE);
    }
}
