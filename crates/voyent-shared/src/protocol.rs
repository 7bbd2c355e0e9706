//! Protocol constants and namespacing helpers.

/// Fixed channel name broadcast payloads arrive on.
pub const BROADCAST_EVENT: &str = "broadcast-event";

/// The administrative realm. Broadcast groups are never scoped to it.
pub const ADMIN_REALM: &str = "admin";

/// Compute the namespaced broadcast group key `{account}_{realm}_{group}`.
///
/// Returns `None` when any component is blank or the realm is the admin
/// realm; group membership is realm-scoped and admin sessions do not join
/// broadcast groups.
pub fn full_group_name(group: &str, account: &str, realm: &str) -> Option<String> {
    let group = group.trim();
    let account = account.trim();
    let realm = realm.trim();
    if group.is_empty() || account.is_empty() || realm.is_empty() || realm == ADMIN_REALM {
        return None;
    }
    Some(format!("{account}_{realm}_{group}"))
}

/// Normalize a host string for use as a key (strips protocol prefix).
pub fn normalize_host(host: &str) -> String {
    host.trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_end_matches('/')
        .to_string()
}

/// Check if a host is a local/development address.
pub fn is_local_address(host: &str) -> bool {
    let host_part = host.split(':').next().unwrap_or(host);
    host_part == "localhost"
        || host_part == "127.0.0.1"
        || host_part == "0.0.0.0"
        || host_part.starts_with("192.168.")
        || host_part.starts_with("10.")
}

/// Convert an HTTP/HTTPS URL to WS/WSS. URLs without a scheme pass through.
pub fn http_to_ws(url: &str) -> String {
    if url.starts_with("https://") {
        url.replacen("https://", "wss://", 1)
    } else if url.starts_with("http://") {
        url.replacen("http://", "ws://", 1)
    } else {
        url.to_string()
    }
}
