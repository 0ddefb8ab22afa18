//! Error types for provider transport, routing, and the user-visible surface.
//!
//! `ProviderError` is what a single [`crate::providers::ProviderClient`] returns;
//! `RouterError` is what [`crate::router::Router`] returns to the caller after
//! classifying a `ProviderError` (or exhausting every provider) into the closed
//! taxonomy callers are expected to match on.

use thiserror::Error;

/// Errors a single provider client can raise for one request.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Network/transport failure below the HTTP status layer.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response with a status/message the client couldn't otherwise classify.
    #[error("api error: {code} - {message}")]
    Api { code: u16, message: String },

    /// 401 — invalid or missing credentials.
    #[error("invalid api key")]
    InvalidApiKey,

    /// 402 — negative remaining credit (secondary provider only).
    #[error("payment required")]
    PaymentRequired,

    /// 429 after the client's own retries are exhausted.
    #[error("rate limited")]
    RateLimit,

    /// 404 "all providers ignored" on the secondary provider — recoverable with
    /// one retry after stripping provider-routing preferences.
    #[error("upstream ignored provider preferences")]
    ProviderPreferencesIgnored,

    /// 502/503/504.
    #[error("service unavailable")]
    ServiceUnavailable,

    /// Connection timeout, reset, or "response ended prematurely".
    #[error("network timeout")]
    Timeout,

    /// 400 — malformed payload per the upstream's own validation.
    #[error("bad request: {message}")]
    BadRequest { message: String },

    /// Response body did not parse as the expected JSON shape.
    #[error("invalid response: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Model name not recognized by this provider.
    #[error("model not found: {model}")]
    ModelNotFound { model: String },
}

impl ProviderError {
    /// Whether the client itself should retry this same provider before
    /// surfacing the error to the router (§4.1 retry discipline).
    pub fn client_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit | ProviderError::ServiceUnavailable | ProviderError::Timeout
        )
    }
}

impl RouterErrorKind {
    /// Classifies a [`ProviderError`] surfaced by a provider client into the
    /// closed taxonomy C4 reports (spec §7). Every variant here is a
    /// "skip this provider, try the next" outcome — `rate_limited_local` is
    /// only ever produced by C2's own admission check, never from here.
    pub fn from_provider_error(err: &ProviderError) -> Self {
        match err {
            ProviderError::InvalidApiKey => RouterErrorKind::AuthError,
            ProviderError::PaymentRequired => RouterErrorKind::PaymentRequired,
            ProviderError::BadRequest { .. } => RouterErrorKind::BadRequest,
            _ => RouterErrorKind::Transient,
        }
    }
}

/// The closed error taxonomy C4 surfaces to callers (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterErrorKind {
    RateLimitedLocal,
    QuotaExhausted,
    PaymentRequired,
    AuthError,
    BadRequest,
    Transient,
    AllProvidersFailed,
}

impl std::fmt::Display for RouterErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RouterErrorKind::RateLimitedLocal => "rate_limited_local",
            RouterErrorKind::QuotaExhausted => "quota_exhausted",
            RouterErrorKind::PaymentRequired => "payment_required",
            RouterErrorKind::AuthError => "auth_error",
            RouterErrorKind::BadRequest => "bad_request",
            RouterErrorKind::Transient => "transient",
            RouterErrorKind::AllProvidersFailed => "all_providers_failed",
        };
        f.write_str(s)
    }
}

/// Error returned by [`crate::router::Router::route_generate_text`].
#[derive(Error, Debug)]
#[error("{kind}: {message}")]
pub struct RouterError {
    pub kind: RouterErrorKind,
    pub message: String,
}

impl RouterError {
    pub fn new(kind: RouterErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: sanitize_for_user(&message.into()),
        }
    }
}

/// Strip file paths, URLs, emails, IPs, and long opaque identifiers from an
/// error string before it can reach a chat surface, then cap its length.
///
/// Grounded in spec §7's sanitization rule. Implemented as a single-pass
/// whitespace-token scanner rather than pulling in a regex crate: none of
/// this lineage's dependency set reaches for `regex`, and the per-token
/// classification below is exact for the cases that matter (URLs, emails,
/// multi-segment paths, IPv4 addresses, opaque long identifiers).
pub fn sanitize_for_user(raw: &str) -> String {
    let cleaned: String = raw
        .split_inclusive(char::is_whitespace)
        .map(sanitize_token)
        .collect();

    let mut truncated = cleaned;
    if truncated.len() > 200 {
        // Respect char boundaries; byte-slicing a multi-byte string could panic.
        let end = truncated
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|&i| i <= 200)
            .last()
            .unwrap_or(0);
        truncated.truncate(end);
    }
    truncated
}

fn sanitize_token(token: &str) -> String {
    let (word, trailing_ws) = split_trailing_whitespace(token);
    if word.is_empty() {
        return token.to_string();
    }

    let replacement = if word.starts_with("http://") || word.starts_with("https://") {
        "[url]"
    } else if is_email_like(word) {
        "[email]"
    } else if is_ipv4_like(word) {
        "[ip]"
    } else if word.matches('/').count() >= 2 {
        "[path]"
    } else if is_long_opaque_id(word) {
        "[id]"
    } else {
        word
    };

    format!("{replacement}{trailing_ws}")
}

fn split_trailing_whitespace(s: &str) -> (&str, &str) {
    let end = s.trim_end_matches(char::is_whitespace).len();
    (&s[..end], &s[end..])
}

fn is_email_like(word: &str) -> bool {
    let Some(at) = word.find('@') else {
        return false;
    };
    let (local, domain) = (&word[..at], &word[at + 1..]);
    !local.is_empty() && domain.contains('.') && !domain.contains('/')
}

fn is_ipv4_like(word: &str) -> bool {
    let trimmed = word.trim_matches(|c: char| !c.is_ascii_digit() && c != '.');
    let parts: Vec<&str> = trimmed.split('.').collect();
    parts.len() == 4 && parts.iter().all(|p| !p.is_empty() && p.parse::<u8>().is_ok())
}

fn is_long_opaque_id(word: &str) -> bool {
    let core = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != '-');
    core.len() >= 24
        && core
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_and_truncates() {
        let raw = "failed to reach https://api.example.com/v1/chat from /etc/secrets/token for user@example.com at 10.0.0.5";
        let cleaned = sanitize_for_user(raw);
        assert!(!cleaned.contains("https://"));
        assert!(!cleaned.contains("user@example.com"));
        assert!(!cleaned.contains("/etc/secrets"));
        assert!(!cleaned.contains("10.0.0.5"));
        assert!(cleaned.len() <= 200);
    }

    #[test]
    fn router_error_kind_display_matches_spec_tokens() {
        assert_eq!(RouterErrorKind::RateLimitedLocal.to_string(), "rate_limited_local");
        assert_eq!(RouterErrorKind::AllProvidersFailed.to_string(), "all_providers_failed");
    }

    #[test]
    fn client_retryable_classification() {
        assert!(ProviderError::RateLimit.client_retryable());
        assert!(ProviderError::ServiceUnavailable.client_retryable());
        assert!(!ProviderError::InvalidApiKey.client_retryable());
        assert!(!ProviderError::PaymentRequired.client_retryable());
    }
}
