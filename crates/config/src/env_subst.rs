/// Expand `${VAR}` and `${VAR:-fallback}` placeholders in raw config text.
///
/// Unset variables without a fallback are left untouched so the parse error
/// (or the literal value) points at the placeholder.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated placeholder: keep the remainder verbatim.
            out.push_str(&rest[start..]);
            return out;
        };

        let body = &after[..end];
        let (name, fallback) = match body.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (body, None),
        };

        match (name.is_empty(), lookup(name), fallback) {
            (false, Some(value), _) => out.push_str(&value),
            (false, None, Some(fallback)) => out.push_str(fallback),
            _ => {
                out.push_str("${");
                out.push_str(body);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "CHATBRIDGE_TEST_CHANNEL" => Some("1234".into()),
            _ => None,
        }
    }

    #[test]
    fn expands_known_variable() {
        assert_eq!(
            substitute_env_with("channel_id = \"${CHATBRIDGE_TEST_CHANNEL}\"", lookup),
            "channel_id = \"1234\""
        );
    }

    #[test]
    fn uses_fallback_for_unset_variable() {
        assert_eq!(
            substitute_env_with("prefix = \"${CHATBRIDGE_UNSET:-?}\"", lookup),
            "prefix = \"?\""
        );
    }

    #[test]
    fn known_variable_wins_over_fallback() {
        assert_eq!(
            substitute_env_with("${CHATBRIDGE_TEST_CHANNEL:-0}", lookup),
            "1234"
        );
    }

    #[test]
    fn leaves_unknown_and_malformed_placeholders() {
        assert_eq!(substitute_env_with("${NOPE}", lookup), "${NOPE}");
        assert_eq!(substitute_env_with("${}", lookup), "${}");
        assert_eq!(substitute_env_with("a ${OPEN", lookup), "a ${OPEN");
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(substitute_env("no placeholders here"), "no placeholders here");
    }
}
