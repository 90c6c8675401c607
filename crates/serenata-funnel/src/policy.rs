use std::time::Duration;

/// Timing knobs for generation and polling.
///
/// `second_request_delay` spaces the two generation requests apart for the
/// provider's rate limit. The real limit has not been confirmed, so treat
/// the default as a setting rather than a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationPolicy {
    /// Fixed gap between status checks. There is no backoff.
    pub poll_interval: Duration,
    /// Pause between the first song completing and requesting the second.
    pub second_request_delay: Duration,
    /// Wall-clock budget, measured from the first request.
    pub timeout: Duration,
    /// Cosmetic pause before moving on to the comparison page.
    pub handoff_delay: Duration,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            second_request_delay: Duration::from_secs(3),
            timeout: Duration::from_secs(10 * 60),
            handoff_delay: Duration::from_millis(1500),
        }
    }
}
