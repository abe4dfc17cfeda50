//! Persona resolution: maps a `(user_id, personality_id)` pair to the
//! persona that should author the reply.
//!
//! Generalizes the old raw-peer-id -> canonical-identity lookup into a
//! two-tier scheme: an explicit per-personality link (from
//! `UserPersonalityConfig.persona_override`, once resolved) takes priority
//! over the user's default persona. If the persona that resolution lands on
//! has `share_ltm_across_personalities` set, the user's default persona is
//! returned instead regardless of which personality asked — sharing the
//! persona forces sharing its long-term memory scope too.

use std::collections::HashMap;

use relay_domain::types::Persona;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct PersonaResolver {
    links: HashMap<(Uuid, Uuid), Uuid>,
    default_personas: HashMap<Uuid, Uuid>,
}

impl PersonaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_links(links: &[(Uuid, Uuid, Uuid)], default_personas: &[(Uuid, Uuid)]) -> Self {
        Self {
            links: links.iter().map(|(user, personality, persona)| ((*user, *personality), *persona)).collect(),
            default_personas: default_personas.iter().copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.default_personas.is_empty()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Resolves the persona id for `(user_id, personality_id)`, given a
    /// lookup of known personas (needed to check `share_ltm_across_personalities`
    /// on whatever persona the first pass lands on). Returns `None` only
    /// when the user has no explicit link and no default persona at all.
    pub fn resolve(&self, user_id: Uuid, personality_id: Uuid, personas: &HashMap<Uuid, Persona>) -> Option<Uuid> {
        let candidate = self
            .links
            .get(&(user_id, personality_id))
            .copied()
            .or_else(|| self.default_personas.get(&user_id).copied())?;

        match personas.get(&candidate) {
            Some(persona) if persona.share_ltm_across_personalities => {
                Some(self.default_personas.get(&user_id).copied().unwrap_or(candidate))
            }
            _ => Some(candidate),
        }
    }
}
