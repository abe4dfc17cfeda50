//! Placeholder substitution for Prompt Assembly (spec §4.3 stage 6).
//!
//! `{user}`, `{{user}}`, `{assistant}`, `{{char}}`, `{shape}`, `{personality}`
//! are replaced case-insensitively with the effective user-persona and
//! personality display names. Tokens are sorted longest-first before
//! substitution so `{{char}}` is matched before the bare `{char}` suffix it
//! contains would be.

const USER_TOKENS: &[&str] = &["{{user}}", "{user}"];
const ASSISTANT_TOKENS: &[&str] = &["{{char}}", "{assistant}", "{shape}", "{personality}"];

/// Name to substitute for user-referring placeholders, plus an optional
/// disambiguating handle used when the user's display name collides with
/// the personality's (spec E2: `"Lila (@lbds137)"`).
#[derive(Debug, Clone)]
pub struct PlaceholderNames {
    pub user_display_name: String,
    pub user_handle: Option<String>,
    pub assistant_display_name: String,
}

/// True when the user's display name collides case-insensitively with the
/// personality's display name.
pub fn names_collide(user_display_name: &str, assistant_display_name: &str) -> bool {
    user_display_name.eq_ignore_ascii_case(assistant_display_name)
}

fn expanded_user_name(names: &PlaceholderNames) -> String {
    if names_collide(&names.user_display_name, &names.assistant_display_name) {
        if let Some(handle) = &names.user_handle {
            return format!("{} (@{})", names.user_display_name, handle);
        }
    }
    names.user_display_name.clone()
}

/// Replaces every recognized placeholder token in `text`, case-insensitively,
/// longest-token-first.
pub fn replace_placeholders(text: &str, names: &PlaceholderNames) -> String {
    let user_name = expanded_user_name(names);

    let mut tokens: Vec<(&str, &str)> = Vec::new();
    for t in USER_TOKENS {
        tokens.push((t, user_name.as_str()));
    }
    for t in ASSISTANT_TOKENS {
        tokens.push((t, names.assistant_display_name.as_str()));
    }
    tokens.sort_by_key(|(token, _)| std::cmp::Reverse(token.len()));

    let mut result = text.to_string();
    for (token, replacement) in tokens {
        result = replace_case_insensitive(&result, token, replacement);
    }
    result
}

fn replace_case_insensitive(haystack: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }
    let lower_haystack = haystack.to_lowercase();
    let lower_needle = needle.to_lowercase();
    let mut result = String::with_capacity(haystack.len());
    let mut rest = haystack;
    let mut rest_lower = lower_haystack.as_str();
    while let Some(pos) = rest_lower.find(&lower_needle) {
        result.push_str(&rest[..pos]);
        result.push_str(replacement);
        rest = &rest[pos + needle.len()..];
        rest_lower = &rest_lower[pos + needle.len()..];
    }
    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> PlaceholderNames {
        PlaceholderNames {
            user_display_name: "Alice".into(),
            user_handle: Some("alice137".into()),
            assistant_display_name: "Lila".into(),
        }
    }

    #[test]
    fn replaces_every_recognized_token_case_insensitively() {
        let out = replace_placeholders("Hi {USER}, I am {{Char}} aka {Shape}/{Personality}", &names());
        assert_eq!(out, "Hi Alice, I am Lila aka Lila/Lila");
    }

    #[test]
    fn double_brace_user_does_not_leave_a_stray_brace() {
        let out = replace_placeholders("{{user}} said hi", &names());
        assert_eq!(out, "Alice said hi");
    }

    #[test]
    fn e2_collision_expands_to_name_and_handle() {
        let collided = PlaceholderNames {
            user_display_name: "Lila".into(),
            user_handle: Some("lbds137".into()),
            assistant_display_name: "Lila".into(),
        };
        let out = replace_placeholders("hello {user}", &collided);
        assert_eq!(out, "hello Lila (@lbds137)");
    }

    #[test]
    fn collision_without_a_handle_falls_back_to_the_bare_name() {
        let collided = PlaceholderNames {
            user_display_name: "Lila".into(),
            user_handle: None,
            assistant_display_name: "Lila".into(),
        };
        let out = replace_placeholders("hello {user}", &collided);
        assert_eq!(out, "hello Lila");
    }

    #[test]
    fn stable_under_double_application_when_names_contain_no_placeholder_tokens() {
        let text = "Hi {user}, this is {assistant}.";
        let once = replace_placeholders(text, &names());
        let twice = replace_placeholders(&once, &names());
        assert_eq!(once, twice);
    }
}
