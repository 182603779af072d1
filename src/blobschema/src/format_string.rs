//! Per-column format string mini-language
//!
//! ```text
//! key = "quoted string", other = <&bracketed reference&>, count = 12
//! ```
//!
//! Quoted strings honour backslash escapes, bracketed references are opaque
//! single tokens, everything else is whitespace-delimited.

use serde::{Deserialize, Serialize};

/// Ordered key/value pairs parsed from a format string
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatStrings(pub Vec<(String, String)>);

impl FormatStrings {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatStringError {
    #[error("Unterminated quoted string starting at {0}")]
    UnterminatedQuote(usize),

    #[error("Unterminated reference starting at {0}")]
    UnterminatedReference(usize),

    #[error("Expected {expected} at token {position}, found {found:?}")]
    Unexpected {
        expected: &'static str,
        position: usize,
        found: String,
    },

    #[error("Bare value {0:?} is not an integer literal")]
    NotAnInteger(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Quoted(String),
    Reference(String),
    Bare(String),
    Equals,
    Comma,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Quoted(s) => format!("\"{}\"", s),
            Tok::Reference(s) => format!("<&{}&>", s),
            Tok::Bare(s) => s.clone(),
            Tok::Equals => "=".to_string(),
            Tok::Comma => ",".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Tok>, FormatStringError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '=' => {
                tokens.push(Tok::Equals);
                i += 1;
            }
            ',' => {
                tokens.push(Tok::Comma);
                i += 1;
            }
            '"' => {
                let start = i;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(FormatStringError::UnterminatedQuote(start)),
                        Some('\\') => {
                            let escaped = chars
                                .get(i + 1)
                                .ok_or(FormatStringError::UnterminatedQuote(start))?;
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                other => *other,
                            });
                            i += 2;
                        }
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some(other) => {
                            value.push(*other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Tok::Quoted(value));
            }
            '<' if chars.get(i + 1) == Some(&'&') => {
                let start = i;
                i += 2;
                let mut value = String::new();
                loop {
                    match (chars.get(i), chars.get(i + 1)) {
                        (Some('&'), Some('>')) => {
                            i += 2;
                            break;
                        }
                        (Some(other), _) => {
                            value.push(*other);
                            i += 1;
                        }
                        (None, _) => return Err(FormatStringError::UnterminatedReference(start)),
                    }
                }
                tokens.push(Tok::Reference(value));
            }
            _ => {
                let mut value = String::new();
                while let Some(&ch) = chars.get(i) {
                    if ch.is_whitespace() || ch == '=' || ch == ',' || ch == '"' {
                        break;
                    }
                    value.push(ch);
                    i += 1;
                }
                tokens.push(Tok::Bare(value));
            }
        }
    }

    Ok(tokens)
}

fn is_integer_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Parse a format string into ordered key/value pairs
pub fn parse(input: &str) -> Result<FormatStrings, FormatStringError> {
    let tokens = tokenize(input)?;
    let mut pairs = Vec::new();
    let mut pos = 0;

    let unexpected = |expected: &'static str, pos: usize, tokens: &[Tok]| {
        FormatStringError::Unexpected {
            expected,
            position: pos,
            found: tokens
                .get(pos)
                .map(Tok::describe)
                .unwrap_or_else(|| "end of input".to_string()),
        }
    };

    if tokens.is_empty() {
        return Ok(FormatStrings::default());
    }

    loop {
        let key = match tokens.get(pos) {
            Some(Tok::Bare(key)) => key.clone(),
            _ => return Err(unexpected("key", pos, &tokens)),
        };
        pos += 1;

        if tokens.get(pos) != Some(&Tok::Equals) {
            return Err(unexpected("'='", pos, &tokens));
        }
        pos += 1;

        let value = match tokens.get(pos) {
            Some(Tok::Quoted(s)) => s.clone(),
            Some(Tok::Reference(s)) => s.clone(),
            Some(Tok::Bare(s)) if is_integer_literal(s) => s.clone(),
            Some(Tok::Bare(s)) => return Err(FormatStringError::NotAnInteger(s.clone())),
            _ => return Err(unexpected("value", pos, &tokens)),
        };
        pos += 1;
        pairs.push((key, value));

        match tokens.get(pos) {
            None => break,
            Some(Tok::Comma) => pos += 1,
            Some(_) => return Err(unexpected("','", pos, &tokens)),
        }
    }

    Ok(FormatStrings(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_values() {
        let parsed =
            parse(r#"NAME = "Power Name", LINK = <&Powers.Ref&>, MAX = 12, MIN=-0x10"#).unwrap();
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed.get("NAME"), Some("Power Name"));
        assert_eq!(parsed.get("LINK"), Some("Powers.Ref"));
        assert_eq!(parsed.get("MAX"), Some("12"));
        assert_eq!(parsed.get("MIN"), Some("-0x10"));
    }

    #[test]
    fn test_quoted_is_opaque() {
        let parsed = parse(r#"TEXT = "a, b = \"c\"""#).unwrap();
        assert_eq!(parsed.get("TEXT"), Some(r#"a, b = "c""#));
    }

    #[test]
    fn test_reference_is_opaque() {
        let parsed = parse("R = <&x = 1, y&>").unwrap();
        assert_eq!(parsed.get("R"), Some("x = 1, y"));
    }

    #[test]
    fn test_order_preserved() {
        let parsed = parse("B = 1, A = 2, C = 3").unwrap();
        let keys: Vec<&str> = parsed.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_malformed() {
        assert_eq!(
            parse(r#"A = "open"#),
            Err(FormatStringError::UnterminatedQuote(4))
        );
        assert!(matches!(
            parse("A = <&open"),
            Err(FormatStringError::UnterminatedReference(4))
        ));
        assert!(matches!(
            parse("A 1"),
            Err(FormatStringError::Unexpected { expected: "'='", .. })
        ));
        assert!(matches!(
            parse("A = word"),
            Err(FormatStringError::NotAnInteger(_))
        ));
        assert!(matches!(
            parse("A = 1 B = 2"),
            Err(FormatStringError::Unexpected { expected: "','", .. })
        ));
        assert!(matches!(
            parse("A = 1,"),
            Err(FormatStringError::Unexpected { expected: "key", .. })
        ));
    }
}
