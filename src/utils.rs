/// Prefix shared by every counter key so rate-limit state is namespaced
/// inside whatever medium backs the store.
pub const KEY_PREFIX: &str = "rate-limit";

/// Derive the counter key for a client identity.
///
/// The key is deterministic: one client maps to exactly one rolling-window
/// counter for the lifetime of that window.
pub fn rate_limit_key(client_id: &str) -> String {
    format!("{}:{}", KEY_PREFIX, client_id)
}

/// Format the reason string carried by a deny decision.
pub fn deny_reason(role: &str) -> String {
    format!("Rate limit exceeded for {} user", role)
}
