pub mod cep;
pub mod gate;
pub mod geocode;
pub mod reasoning;
pub mod routing;

/// Truncate a response body for log output without splitting a UTF-8
/// character
pub(crate) fn log_excerpt(body: &str) -> &str {
    let mut end = body.len().min(500);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
