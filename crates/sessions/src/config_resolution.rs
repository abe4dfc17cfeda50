//! Config Resolution — pipeline stage 2 (spec §4.3).
//!
//! Cascades request-supplied configuration through two optional overlay
//! layers, each of which can override the persona and/or LLM parameters
//! without replacing the whole personality. A channel-activated request's
//! overlay can additionally swap the base personality out entirely via
//! `ChannelSettings::activated_personality`.

use relay_domain::types::{ChannelSettings, LlmConfigOverride, Personality, UserPersonalityConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Request,
    UserOverride,
    ChannelOverride,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub effective_personality: Personality,
    pub persona_override: Option<uuid::Uuid>,
    pub config_source: ConfigSource,
}

fn apply_llm_override(personality: &mut Personality, over: &LlmConfigOverride) {
    if let Some(model) = &over.model {
        personality.model = model.clone();
    }
    if let Some(temperature) = over.temperature {
        personality.temperature = temperature;
    }
    if let Some(max_tokens) = over.max_tokens {
        personality.max_tokens = max_tokens;
    }
}

/// Resolves stage 2: request personality, overlaid by a user override (if
/// non-empty), overlaid by a channel override (only when the request came
/// in on a channel-activated surface).
pub fn resolve_config(
    request_personality: &Personality,
    user_override: Option<&UserPersonalityConfig>,
    channel_settings: Option<&ChannelSettings>,
) -> ResolvedConfig {
    let mut effective_personality = request_personality.clone();
    let mut persona_override = None;
    let mut config_source = ConfigSource::Request;

    if let Some(user_cfg) = user_override {
        if !user_cfg.is_empty() {
            if let Some(llm) = &user_cfg.llm_config_override {
                apply_llm_override(&mut effective_personality, llm);
            }
            if let Some(persona_id) = user_cfg.persona_override {
                persona_override = Some(persona_id);
            }
            config_source = ConfigSource::UserOverride;
        }
    }

    if let Some(channel) = channel_settings {
        if let Some(llm) = &channel.llm_config_override {
            apply_llm_override(&mut effective_personality, llm);
        }
        if let Some(persona_id) = channel.persona_override {
            persona_override = Some(persona_id);
        }
        if channel.activated_personality.is_some()
            || channel.persona_override.is_some()
            || channel.llm_config_override.is_some()
        {
            config_source = ConfigSource::ChannelOverride;
        }
    }

    ResolvedConfig { effective_personality, persona_override, config_source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_domain::types::{SystemPromptTemplate, Visibility};
    use uuid::Uuid;

    fn base_personality() -> Personality {
        Personality {
            id: Uuid::new_v4(),
            slug: "default".into(),
            display_name: "Default".into(),
            system_prompt_template: SystemPromptTemplate::Literal { text: "hi".into() },
            model: "gpt-4o".into(),
            vision_model: None,
            temperature: 0.7,
            max_tokens: 1024,
            context_window: 8192,
            visibility: Visibility::Public,
            owner_id: Uuid::new_v4(),
            co_owner_ids: vec![],
            avatar_blob: None,
        }
    }

    #[test]
    fn request_only_keeps_the_base_personality_untouched() {
        let resolved = resolve_config(&base_personality(), None, None);
        assert_eq!(resolved.config_source, ConfigSource::Request);
        assert_eq!(resolved.effective_personality.model, "gpt-4o");
        assert!(resolved.persona_override.is_none());
    }

    #[test]
    fn empty_user_override_does_not_change_source() {
        let user_cfg = UserPersonalityConfig {
            user_id: Uuid::new_v4(),
            personality_id: Uuid::new_v4(),
            persona_override: None,
            llm_config_override: None,
        };
        let resolved = resolve_config(&base_personality(), Some(&user_cfg), None);
        assert_eq!(resolved.config_source, ConfigSource::Request);
    }

    #[test]
    fn user_override_applies_llm_and_persona_override() {
        let persona_id = Uuid::new_v4();
        let user_cfg = UserPersonalityConfig {
            user_id: Uuid::new_v4(),
            personality_id: Uuid::new_v4(),
            persona_override: Some(persona_id),
            llm_config_override: Some(LlmConfigOverride {
                model: Some("gpt-4o-mini".into()),
                temperature: Some(0.2),
                max_tokens: None,
                stop_sequences: None,
            }),
        };
        let resolved = resolve_config(&base_personality(), Some(&user_cfg), None);
        assert_eq!(resolved.config_source, ConfigSource::UserOverride);
        assert_eq!(resolved.effective_personality.model, "gpt-4o-mini");
        assert_eq!(resolved.effective_personality.temperature, 0.2);
        assert_eq!(resolved.persona_override, Some(persona_id));
    }

    #[test]
    fn channel_override_wins_over_user_override_and_sets_source() {
        let user_persona = Uuid::new_v4();
        let channel_persona = Uuid::new_v4();
        let user_cfg = UserPersonalityConfig {
            user_id: Uuid::new_v4(),
            personality_id: Uuid::new_v4(),
            persona_override: Some(user_persona),
            llm_config_override: None,
        };
        let channel_settings = ChannelSettings {
            activated_personality: None,
            persona_override: Some(channel_persona),
            llm_config_override: Some(LlmConfigOverride {
                model: None,
                temperature: Some(0.9),
                max_tokens: Some(2048),
                stop_sequences: None,
            }),
        };
        let resolved = resolve_config(&base_personality(), Some(&user_cfg), Some(&channel_settings));
        assert_eq!(resolved.config_source, ConfigSource::ChannelOverride);
        assert_eq!(resolved.persona_override, Some(channel_persona));
        assert_eq!(resolved.effective_personality.temperature, 0.9);
        assert_eq!(resolved.effective_personality.max_tokens, 2048);
    }

    #[test]
    fn channel_settings_with_no_overrides_leaves_source_at_whatever_user_layer_set() {
        let channel_settings = ChannelSettings::default();
        let resolved = resolve_config(&base_personality(), None, Some(&channel_settings));
        assert_eq!(resolved.config_source, ConfigSource::Request);
    }
}
