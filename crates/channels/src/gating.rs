/// Decide whether an inbound event may be processed.
///
/// Exactly one conversation is authorized. An empty `authorized` identity
/// means the bridge is not configured yet and every event is rejected.
/// Rejection carries no reason: callers drop the event without replying.
///
/// The inbound identity must match exactly; only the configured side is
/// trimmed.
pub fn is_authorized(chat_id: &str, authorized: &str) -> bool {
    let authorized = authorized.trim();
    !authorized.is_empty() && chat_id == authorized
}
