use crate::models::{ChatState, DurableCache, Message, Role};

/// Decide whether a local message is visible in the durable list.
///
/// Prefers the durable id assigned by the `persisted` chunk; falls back to
/// same-role trimmed-content equality for backends that never report ids.
/// Matching is per whole message; the selector never blends entries across
/// sources.
pub(crate) fn durable_contains(durable: &[Message], local: &Message) -> bool {
    if let Some(durable_id) = local.durable_id.as_deref() {
        return durable
            .iter()
            .any(|m| m.id == durable_id || m.durable_id.as_deref() == Some(durable_id));
    }
    durable
        .iter()
        .any(|m| m.role == local.role && m.content.trim() == local.content.trim())
}

/// Pick the message list to render for one conversation.
///
/// Pure and side-effect free: identical inputs produce value-equal outputs,
/// so it is safe to call on every render. Priority order, first match wins:
///
/// 1. Any optimistic message streaming or unpersisted: local state is
///    strictly fresher than anything durable can show.
/// 2. The last assistant message is confirmed locally but absent from the
///    durable list: the write has not propagated yet (sync-lag protection).
/// 3. The caller marks durable authoritative: durable when non-empty,
///    optimistic as a placeholder while durable loads, empty otherwise.
/// 4. Durable has entries.
/// 5. Optimistic as fallback.
pub fn select_messages(
    optimistic: &[Message],
    durable: &[Message],
    prefer_durable: bool,
    durable_loading: bool,
) -> Vec<Message> {
    // Rule 1: in-flight or unconfirmed local writes.
    if optimistic.iter().any(|m| m.streaming || !m.persisted) {
        return optimistic.to_vec();
    }

    // Rule 2: confirmed locally, not yet visible durably.
    let last_assistant = optimistic
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant);
    if let Some(last) = last_assistant
        && last.persisted
        && !last.streaming
        && !last.content.trim().is_empty()
        && !durable_contains(durable, last)
    {
        return optimistic.to_vec();
    }

    // Rule 3: durable is the authoritative view for this caller.
    if prefer_durable {
        if !durable.is_empty() {
            return durable.to_vec();
        }
        if durable_loading {
            // Optimistic stands in while the fetch runs; an empty optimistic
            // list leaves the UI to its loading indicator.
            return if optimistic.is_empty() {
                Vec::new()
            } else {
                optimistic.to_vec()
            };
        }
    }

    // Rule 4: durable entries exist.
    if !durable.is_empty() {
        return durable.to_vec();
    }

    // Rule 5: optimistic fallback.
    optimistic.to_vec()
}

/// Snapshot-level convenience: scope both sources to one conversation and
/// select. `prefer_durable` mirrors the caller's view preference (e.g. a
/// history pane backed by the durable source).
pub fn effective_messages(
    state: &ChatState,
    durable: &DurableCache,
    conversation_id: &str,
    prefer_durable: bool,
) -> Vec<Message> {
    let optimistic = state
        .conversation(conversation_id)
        .map(|c| c.messages.as_slice())
        .unwrap_or_default();
    let view = durable.view(conversation_id);
    select_messages(optimistic, &view.messages, prefer_durable, view.loading)
}
