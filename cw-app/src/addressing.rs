//! Group-chat targeting.
//!
//! In a group conversation the agent only reacts to messages that address it
//! explicitly; everything else is silently ignored. The targeting prefix is
//! stripped before any further routing, so a permission reply or command
//! works the same way targeted or not.

/// Return the message body with the targeting prefix removed, or `None` when
/// the message does not address the agent.
///
/// Accepted forms (all case-insensitive, multi-word agent names supported):
/// `@<agent name> ...`, `@ai ...`, `@agent ...`, `/ask ...`,
/// `/ask <agent name> ...`.
pub fn strip_targeting(text: &str, agent_name: &str) -> Option<String> {
    let trimmed = text.trim_start();

    if let Some(mention) = trimmed.strip_prefix('@') {
        for candidate in [agent_name, "ai", "agent"] {
            if let Some(rest) = strip_ci_prefix(mention, candidate) {
                return Some(rest.trim_start().to_string());
            }
        }
        // A mention of someone else.
        return None;
    }

    if let Some(rest) = strip_ci_prefix(trimmed, "/ask") {
        let rest = rest.trim_start();
        let body = match strip_ci_prefix(rest, agent_name) {
            Some(after_name) => after_name.trim_start(),
            None => rest,
        };
        return Some(body.to_string());
    }

    None
}

/// Strip `prefix` case-insensitively, requiring a word boundary (end of
/// input or whitespace) right after it.
fn strip_ci_prefix<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return None;
    }
    let mut chars = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = chars.next()?;
        if !actual.eq_ignore_ascii_case(&expected) {
            return None;
        }
    }
    let rest = chars.as_str();
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untargeted_text_is_not_accepted() {
        assert_eq!(strip_targeting("hello", "Chatwire"), None);
        assert_eq!(strip_targeting("@someone hello", "Chatwire"), None);
    }

    #[test]
    fn agent_name_mention_is_stripped_case_insensitively() {
        assert_eq!(
            strip_targeting("@chatwire hello", "Chatwire").as_deref(),
            Some("hello")
        );
        assert_eq!(
            strip_targeting("  @CHATWIRE   what's up", "Chatwire").as_deref(),
            Some("what's up")
        );
    }

    #[test]
    fn multi_word_agent_names_are_supported() {
        assert_eq!(
            strip_targeting("@dev bot run the tests", "Dev Bot").as_deref(),
            Some("run the tests")
        );
        // Partial name match is a mention of someone else.
        assert_eq!(strip_targeting("@dev run the tests", "Dev Bot"), None);
    }

    #[test]
    fn generic_aliases_are_accepted() {
        assert_eq!(
            strip_targeting("@ai hello", "Chatwire").as_deref(),
            Some("hello")
        );
        assert_eq!(
            strip_targeting("@agent /status", "Chatwire").as_deref(),
            Some("/status")
        );
    }

    #[test]
    fn ask_prefix_targets_with_and_without_the_agent_name() {
        assert_eq!(
            strip_targeting("/ask hello", "Chatwire").as_deref(),
            Some("hello")
        );
        assert_eq!(
            strip_targeting("/ask chatwire hello", "Chatwire").as_deref(),
            Some("hello")
        );
        // Equivalent after prefix stripping.
        assert_eq!(
            strip_targeting("/ask hello", "Chatwire"),
            strip_targeting("@ai hello", "Chatwire")
        );
    }

    #[test]
    fn prefixes_require_a_word_boundary() {
        assert_eq!(strip_targeting("/askfoo", "Chatwire"), None);
        assert_eq!(strip_targeting("@aide hello", "Chatwire"), None);
    }

    #[test]
    fn permission_replies_can_be_targeted() {
        assert_eq!(
            strip_targeting("@chatwire Y", "Chatwire").as_deref(),
            Some("Y")
        );
    }
}
