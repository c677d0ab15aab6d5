//! Content length extraction utilities.
//!
//! The HTTP transfer backend uses these to learn how many bytes a chunk
//! response should carry, so that a connection closed early is reported as a
//! failed transfer instead of a short chunk.

use reqwest::{header::CONTENT_RANGE, Response};

/// Extract the length of the body carried by a response.
///
/// A `Content-Range` header (from a range request) takes precedence and
/// yields the total size of the resource; otherwise the `Content-Length`
/// header is used.
///
/// # Example
///
/// ```rust,no_run
/// use dtg::utils::get_content_length;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let response = reqwest::get("https://cdn.example.com/seg-1.ts").await?;
/// let length = get_content_length(&response);
/// # Ok(())
/// # }
/// ```
pub fn get_content_length(response: &Response) -> Option<u64> {
    match response.headers().get(CONTENT_RANGE) {
        Some(content_range) => content_range
            .to_str()
            .ok()
            .and_then(parse_content_range_total),
        None => response.content_length(),
    }
}

/// Parse Content-Range header to extract total size.
///
/// Content-Range header format: "bytes start-end/total"
///
/// # Example
///
/// ```rust
/// use dtg::utils::parse_content_range_total;
///
/// let total = parse_content_range_total("bytes 0-1023/2048");
/// assert_eq!(total, Some(2048));
/// ```
pub fn parse_content_range_total(content_range: &str) -> Option<u64> {
    content_range
        .split('/')
        .next_back()
        .and_then(|size| size.trim().parse::<u64>().ok())
}

/// Extract content length from the response, or fall back to a size known
/// in advance (for instance the chunk's descriptor size).
pub fn extract_content_length(response: &Response, fallback: Option<u64>) -> Option<u64> {
    get_content_length(response).or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-1023/2048"), Some(2048));
        assert_eq!(parse_content_range_total("bytes 200-1023/5000"), Some(5000));
        assert_eq!(parse_content_range_total("bytes 0-0/1"), Some(1));
        assert_eq!(parse_content_range_total("invalid"), None);
        assert_eq!(parse_content_range_total("bytes 0-1023"), None);
        assert_eq!(parse_content_range_total("bytes 0-1023/*"), None);
        assert_eq!(parse_content_range_total(""), None);
    }

    #[test]
    fn test_parse_content_range_total_edge_cases() {
        assert_eq!(parse_content_range_total("bytes 0-1023/ 2048 "), Some(2048));
        assert_eq!(parse_content_range_total("bytes 0-0/0"), Some(0));
        assert_eq!(
            parse_content_range_total("bytes 0-1023/999999999999"),
            Some(999999999999)
        );
    }
}
