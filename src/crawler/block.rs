//! Anti-bot response classification

use crate::crawler::FetchResponse;

/// HTTP statuses that platforms use for rate limiting or bot walls
pub const BLOCK_STATUS_CODES: &[u16] = &[403, 429, 503];

/// Returns true if a response is an anti-bot block
///
/// A response is blocked when the adapter flagged it, when its status is a
/// known block status, or when the lowercased body contains one of the
/// platform's fingerprints.
pub fn is_blocked(response: &FetchResponse, fingerprints: &[String]) -> bool {
    if response.blocked_hint || BLOCK_STATUS_CODES.contains(&response.status_code) {
        return true;
    }
    let body = response.body.to_lowercase();
    fingerprints
        .iter()
        .filter(|f| !f.is_empty())
        .any(|f| body.contains(&f.to_lowercase()))
}
