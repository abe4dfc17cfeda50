//! Deterministic id derivation: `Memory` ids (§3 invariant) and the
//! deduplication fingerprint (§4.1).

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Namespace UUID for deterministic `Memory` ids. Fixed at rest so that the
/// same (persona, personality, content) always derives the same id across
/// process restarts and replicas.
pub const MEMORY_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x2c, 0x3d, 0x9a, 0x1b, 0x44, 0x4e, 0x7f, 0x9b, 0x22, 0x5e, 0x6a, 0x0f, 0x3d, 0x88, 0x01,
]);

/// `Memory` id = UUIDv5(namespace, persona-id ∥ ":" ∥ personality-id ∥ ":" ∥ content-hash).
///
/// `personality_id` is optional: when a memory is not personality-scoped the
/// caller passes `None` and the literal string `"-"` fills that segment, so
/// the id space for scoped and unscoped memories never collides.
pub fn derive_memory_id(persona_id: Uuid, personality_id: Option<Uuid>, content: &str) -> Uuid {
    let content_hash = hex::encode(Sha256::digest(content.as_bytes()));
    let personality_segment = personality_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let name = format!("{persona_id}:{personality_segment}:{content_hash}");
    Uuid::new_v5(&MEMORY_NAMESPACE, name.as_bytes())
}

/// Request fingerprint for deduplication (§4.1): hash of (user id,
/// personality id, message text, referenced-message-ids set, attachment
/// content hashes). The referenced-message-ids are sorted before hashing so
/// fingerprint computation is order-independent, matching "set" semantics.
pub fn dedup_fingerprint(
    user_id: Uuid,
    personality_id: Uuid,
    message_text: &str,
    mut referenced_message_ids: Vec<String>,
    mut attachment_content_hashes: Vec<String>,
) -> String {
    referenced_message_ids.sort();
    attachment_content_hashes.sort();
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(personality_id.as_bytes());
    hasher.update(message_text.as_bytes());
    for id in &referenced_message_ids {
        hasher.update(id.as_bytes());
    }
    for h in &attachment_content_hashes {
        hasher.update(h.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_id_is_deterministic() {
        let persona = Uuid::new_v4();
        let personality = Uuid::new_v4();
        let a = derive_memory_id(persona, Some(personality), "hello there");
        let b = derive_memory_id(persona, Some(personality), "hello there");
        assert_eq!(a, b);
    }

    #[test]
    fn memory_id_differs_on_content() {
        let persona = Uuid::new_v4();
        let personality = Uuid::new_v4();
        let a = derive_memory_id(persona, Some(personality), "hello there");
        let b = derive_memory_id(persona, Some(personality), "goodbye there");
        assert_ne!(a, b);
    }

    #[test]
    fn memory_id_scoped_vs_unscoped_distinct() {
        let persona = Uuid::new_v4();
        let personality = Uuid::new_v4();
        let scoped = derive_memory_id(persona, Some(personality), "hello");
        let unscoped = derive_memory_id(persona, None, "hello");
        assert_ne!(scoped, unscoped);
    }

    #[test]
    fn fingerprint_is_order_independent_over_referenced_ids() {
        let user = Uuid::new_v4();
        let personality = Uuid::new_v4();
        let a = dedup_fingerprint(
            user,
            personality,
            "hi",
            vec!["m2".into(), "m1".into()],
            vec![],
        );
        let b = dedup_fingerprint(
            user,
            personality,
            "hi",
            vec!["m1".into(), "m2".into()],
            vec![],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_on_message_text() {
        let user = Uuid::new_v4();
        let personality = Uuid::new_v4();
        let a = dedup_fingerprint(user, personality, "hi", vec![], vec![]);
        let b = dedup_fingerprint(user, personality, "bye", vec![], vec![]);
        assert_ne!(a, b);
    }
}
