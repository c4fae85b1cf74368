/// A prefixed chat line split into a command name and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// Parse `line` if it starts with `prefix`.
///
/// Words are split on whitespace only; quotes are not interpreted. A bare
/// prefix (or prefix followed by whitespace) yields `None`.
pub fn parse(line: &str, prefix: &str) -> Option<ParsedCommand> {
    if prefix.is_empty() {
        return None;
    }
    let rest = line.trim().strip_prefix(prefix)?;
    let mut words = rest.split_whitespace().map(str::to_string);
    let name = words.next()?;
    Some(ParsedCommand {
        name,
        args: words.collect(),
    })
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("!pwd", "pwd", &[])]
    #[case("  !echo a  b\tc ", "echo", &["a", "b", "c"])]
    #[case("!deploy \"two words\"", "deploy", &["\"two", "words\""])]
    fn parses_prefixed_lines(#[case] line: &str, #[case] name: &str, #[case] args: &[&str]) {
        let parsed = parse(line, "!").unwrap_or_else(|| panic!("no parse for {line:?}"));
        assert_eq!(parsed.name, name);
        assert_eq!(parsed.args, args);
    }

    #[rstest]
    #[case("pwd")]
    #[case("!")]
    #[case("!   ")]
    #[case("")]
    #[case("hello !pwd")]
    fn ignores_non_commands(#[case] line: &str) {
        assert_eq!(parse(line, "!"), None);
    }

    #[test]
    fn multi_char_prefix() {
        let parsed = parse("bot: status now", "bot:");
        assert_eq!(
            parsed,
            Some(ParsedCommand {
                name: "status".into(),
                args: vec!["now".into()],
            })
        );
        assert_eq!(parse("!status", ""), None);
    }
}
