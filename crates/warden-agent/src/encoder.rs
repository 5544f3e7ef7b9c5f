//! Serializes a command name plus heterogeneous arguments into a single
//! console line the managed server's own tokenizer can parse back
//! losslessly.

use crate::error::CommandError;

/// One command argument. Structured values are JSON-encoded and then quoted
/// as a single token.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandArg {
    String(String),
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl From<&str> for CommandArg {
    fn from(v: &str) -> Self {
        CommandArg::String(v.to_string())
    }
}

impl From<String> for CommandArg {
    fn from(v: String) -> Self {
        CommandArg::String(v)
    }
}

impl From<i64> for CommandArg {
    fn from(v: i64) -> Self {
        CommandArg::Int(v)
    }
}

impl From<serde_json::Value> for CommandArg {
    fn from(v: serde_json::Value) -> Self {
        CommandArg::Json(v)
    }
}

/// The managed server technically accepts anything but spaces and `;` in a
/// command name, but we only ever emit word-character names.
fn is_valid_command_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Quotes a single token. JSON string encoding doubles as console quoting:
/// the receiving tokenizer unescapes `\"`, `\\` and `\n` the same way, and
/// the result can never contain a raw newline.
fn quote_token(raw: &str) -> String {
    serde_json::to_string(raw).unwrap_or_else(|_| "\"\"".to_string())
}

fn render_arg(arg: &CommandArg) -> String {
    match arg {
        CommandArg::String(s) => quote_token(s),
        CommandArg::Int(n) => quote_token(&n.to_string()),
        CommandArg::Float(n) => quote_token(&n.to_string()),
        CommandArg::Json(v) => {
            let json = serde_json::to_string(v).unwrap_or_else(|_| "null".to_string());
            quote_token(&json)
        }
    }
}

/// Produces the full command line, without a trailing newline.
pub fn encode_command(name: &str, args: &[CommandArg]) -> Result<String, CommandError> {
    if name.is_empty() {
        return Err(CommandError::EmptyCommandName);
    }
    if !is_valid_command_name(name) {
        return Err(CommandError::InvalidCommandName(name.to_string()));
    }

    if args.is_empty() {
        return Ok(name.to_string());
    }

    let mut line = String::with_capacity(name.len() + args.len() * 8);
    line.push_str(name);
    for arg in args {
        line.push(' ');
        line.push_str(&render_arg(arg));
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_command() {
        assert_eq!(encode_command("status", &[]).unwrap(), "status");
    }

    #[test]
    fn rejects_empty_name() {
        assert_eq!(encode_command("", &[]), Err(CommandError::EmptyCommandName));
    }

    #[test]
    fn rejects_name_with_whitespace() {
        assert!(matches!(
            encode_command("kick all", &[]),
            Err(CommandError::InvalidCommandName(_))
        ));
    }

    #[test]
    fn rejects_name_with_semicolon() {
        assert!(matches!(
            encode_command("say;quit", &[]),
            Err(CommandError::InvalidCommandName(_))
        ));
    }

    #[test]
    fn rejects_non_ascii_name() {
        assert!(matches!(
            encode_command("véto", &[]),
            Err(CommandError::InvalidCommandName(_))
        ));
    }

    #[test]
    fn quotes_empty_string() {
        let line = encode_command("say", &["".into()]).unwrap();
        assert_eq!(line, r#"say """#);
    }

    #[test]
    fn quotes_string_with_spaces() {
        let line = encode_command("say", &["hello world".into()]).unwrap();
        assert_eq!(line, r#"say "hello world""#);
    }

    #[test]
    fn escapes_embedded_quotes() {
        let line = encode_command("say", &[r#"he said "hi""#.into()]).unwrap();
        assert_eq!(line, r#"say "he said \"hi\"""#);
    }

    #[test]
    fn newlines_never_split_the_line() {
        let line = encode_command("say", &["line1\nline2".into()]).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(line, r#"say "line1\nline2""#);
    }

    #[test]
    fn numbers_become_quoted_tokens() {
        let line = encode_command("setdelay", &[CommandArg::Int(5000)]).unwrap();
        assert_eq!(line, r#"setdelay "5000""#);
    }

    #[test]
    fn nested_object_is_double_encoded_as_one_token() {
        let data = json!({"delay": 5000, "message": "bye bye"});
        let line = encode_command("wardenEvent", &["serverShuttingDown".into(), data.into()]).unwrap();
        // The object must survive as exactly one quoted token.
        assert!(line.starts_with(r#"wardenEvent "serverShuttingDown" ""#));
        assert!(!line.contains('\n'));
        let tokens = tokenize(&line);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0], "serverShuttingDown");
        let parsed: serde_json::Value = serde_json::from_str(&tokens[1]).unwrap();
        assert_eq!(parsed, json!({"delay": 5000, "message": "bye bye"}));
    }

    #[test]
    fn mixed_args_round_trip() {
        let line = encode_command(
            "announce",
            &["server restarting".into(), CommandArg::Int(30)],
        )
        .unwrap();
        let tokens = tokenize(&line);
        assert_eq!(tokens, vec!["server restarting".to_string(), "30".to_string()]);
    }

    /// Minimal stand-in for the receiving console tokenizer: splits on
    /// whitespace outside quotes, honors backslash escapes inside quotes.
    fn tokenize(line: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let joined = line.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut chars = joined.chars().peekable();
        // Skip the command name.
        while let Some(c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            chars.next();
        }
        while let Some(c) = chars.next() {
            if c.is_whitespace() {
                continue;
            }
            assert_eq!(c, '"', "every encoded arg must be quoted");
            let mut tok = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => match chars.next() {
                        Some('n') => tok.push('\n'),
                        Some(other) => tok.push(other),
                        None => panic!("dangling escape"),
                    },
                    other => tok.push(other),
                }
            }
            tokens.push(tok);
        }
        tokens
    }
}
