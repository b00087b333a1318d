use crate::element::Element;
use crate::errors::AutomationError;

/// Represents ways to match a node of the host page
///
/// Parsed from a small CSS-like grammar: `tag`, `.class`, `#id`, `[attr]`,
/// `[attr="value"]`, compound forms such as `input[type="number"]`, the
/// descendant combinator (whitespace), and `text:` for an exact trimmed
/// text-content match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Any element (`*`)
    Any,
    /// Select by tag name, case-insensitive
    Tag(String),
    /// Select by the `id` attribute
    Id(String),
    /// Select by one entry of the `class` attribute
    ClassName(String),
    /// Select by attribute presence, or by exact attribute value
    Attribute { name: String, value: Option<String> },
    /// Select by trimmed text content
    Text(String),
    /// All inner selectors must match the same element
    And(Vec<Selector>),
    /// Descendant combinator: each selector matches an ancestor of the next
    Chain(Vec<Selector>),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Any => write!(f, "*"),
            Selector::Tag(tag) => write!(f, "{tag}"),
            Selector::Id(id) => write!(f, "#{id}"),
            Selector::ClassName(class) => write!(f, ".{class}"),
            Selector::Attribute { name, value: None } => write!(f, "[{name}]"),
            Selector::Attribute {
                name,
                value: Some(value),
            } => write!(f, "[{name}=\"{value}\"]"),
            Selector::Text(text) => write!(f, "text:{text}"),
            Selector::And(parts) => {
                for part in parts {
                    write!(f, "{part}")?;
                }
                Ok(())
            }
            Selector::Chain(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", rendered.join(" "))
            }
            Selector::Invalid(reason) => write!(f, "<invalid: {reason}>"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Selector::Invalid("empty selector".to_string());
        }
        if let Some(text) = s.strip_prefix("text:") {
            return Selector::Text(text.trim().to_string());
        }

        let tokens = match split_descendants(s) {
            Ok(tokens) => tokens,
            Err(reason) => return Selector::Invalid(reason),
        };
        let mut parts = Vec::with_capacity(tokens.len());
        for token in tokens {
            match parse_compound(&token) {
                Selector::Invalid(reason) => return Selector::Invalid(reason),
                part => parts.push(part),
            }
        }
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Selector::Chain(parts)
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

impl From<&String> for Selector {
    fn from(s: &String) -> Self {
        Selector::from(s.as_str())
    }
}

/// Split on whitespace that is outside of `[...]` and quotes.
fn split_descendants(s: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in s.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '[') => {
                depth += 1;
                current.push(c);
            }
            (None, ']') => {
                if depth == 0 {
                    return Err(format!("unbalanced ']' in selector '{s}'"));
                }
                depth -= 1;
                current.push(c);
            }
            (None, c) if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }
    if quote.is_some() || depth != 0 {
        return Err(format!("unterminated attribute or quote in selector '{s}'"));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

fn parse_compound(token: &str) -> Selector {
    let chars: Vec<char> = token.chars().collect();
    let mut pos = 0;
    let mut parts = Vec::new();

    if chars.first() == Some(&'*') {
        pos = 1;
        parts.push(Selector::Any);
    } else {
        let tag = take_ident(&chars, &mut pos);
        if !tag.is_empty() {
            parts.push(Selector::Tag(tag.to_ascii_lowercase()));
        }
    }

    while pos < chars.len() {
        match chars[pos] {
            '.' => {
                pos += 1;
                let class = take_ident(&chars, &mut pos);
                if class.is_empty() {
                    return Selector::Invalid(format!("empty class name in '{token}'"));
                }
                parts.push(Selector::ClassName(class));
            }
            '#' => {
                pos += 1;
                let id = take_ident(&chars, &mut pos);
                if id.is_empty() {
                    return Selector::Invalid(format!("empty id in '{token}'"));
                }
                parts.push(Selector::Id(id));
            }
            '[' => {
                let Some(close) = chars[pos..].iter().position(|c| *c == ']') else {
                    return Selector::Invalid(format!("unterminated attribute in '{token}'"));
                };
                let body: String = chars[pos + 1..pos + close].iter().collect();
                pos += close + 1;
                match parse_attribute(&body) {
                    Some(attr) => parts.push(attr),
                    None => {
                        return Selector::Invalid(format!(
                            "malformed attribute '[{body}]' in '{token}'"
                        ))
                    }
                }
            }
            other => {
                return Selector::Invalid(format!(
                    "unexpected character '{other}' in selector '{token}'"
                ))
            }
        }
    }

    match parts.len() {
        0 => Selector::Invalid(format!("empty compound selector '{token}'")),
        1 => parts.remove(0),
        _ => Selector::And(parts),
    }
}

fn parse_attribute(body: &str) -> Option<Selector> {
    let (name, value) = match body.split_once('=') {
        Some((name, raw)) => {
            let raw = raw.trim();
            let unquoted = if raw.len() >= 2
                && ((raw.starts_with('"') && raw.ends_with('"'))
                    || (raw.starts_with('\'') && raw.ends_with('\'')))
            {
                &raw[1..raw.len() - 1]
            } else {
                raw
            };
            (name.trim(), Some(unquoted.to_string()))
        }
        None => (body.trim(), None),
    };
    if name.is_empty() || !name.chars().all(is_ident_char) {
        return None;
    }
    Some(Selector::Attribute {
        name: name.to_string(),
        value,
    })
}

impl Selector {
    /// Whether `element` matches this selector. Descendant chains are
    /// evaluated right-to-left against the element's ancestors.
    pub fn matches(&self, element: &Element) -> Result<bool, AutomationError> {
        match self {
            Selector::Any => Ok(true),
            Selector::Tag(tag) => Ok(element.tag().eq_ignore_ascii_case(tag)),
            Selector::Id(id) => Ok(element.attribute("id").as_deref() == Some(id.as_str())),
            Selector::ClassName(class) => Ok(element.has_class(class)),
            Selector::Attribute { name, value } => Ok(match (element.attribute(name), value) {
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => actual == *expected,
                (None, _) => false,
            }),
            Selector::Text(text) => Ok(element.text_content().trim() == text.trim()),
            Selector::And(parts) => {
                for part in parts {
                    if !part.matches(element)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Selector::Chain(parts) => {
                let Some((last, rest)) = parts.split_last() else {
                    return Ok(false);
                };
                if !last.matches(element)? {
                    return Ok(false);
                }
                let mut remaining = rest.iter().rev().peekable();
                let mut cursor = element.parent()?;
                while let Some(ancestor) = cursor {
                    let Some(next) = remaining.peek() else {
                        break;
                    };
                    if next.matches(&ancestor)? {
                        remaining.next();
                    }
                    cursor = ancestor.parent()?;
                }
                Ok(remaining.peek().is_none())
            }
            Selector::Invalid(reason) => Err(AutomationError::InvalidSelector(reason.clone())),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Selector::Invalid(_) => false,
            Selector::And(parts) | Selector::Chain(parts) => parts.iter().all(Selector::is_valid),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_attribute_selector() {
        let selector = Selector::from(r#"input[type="number"]"#);
        assert_eq!(
            selector,
            Selector::And(vec![
                Selector::Tag("input".to_string()),
                Selector::Attribute {
                    name: "type".to_string(),
                    value: Some("number".to_string()),
                },
            ])
        );
    }

    #[test]
    fn parses_descendant_chain_with_classes() {
        let selector = Selector::from("ms-autosize-textarea textarea.textarea");
        match selector {
            Selector::Chain(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[0], Selector::Tag("ms-autosize-textarea".to_string()));
                assert_eq!(
                    parts[1],
                    Selector::And(vec![
                        Selector::Tag("textarea".to_string()),
                        Selector::ClassName("textarea".to_string()),
                    ])
                );
            }
            other => panic!("expected chain, got {other:?}"),
        }
    }

    #[test]
    fn quoted_values_may_contain_spaces() {
        let selector = Selector::from(r#"button[aria-label="Run settings"]"#);
        assert!(selector.is_valid());
        assert_eq!(selector.to_string(), r#"button[aria-label="Run settings"]"#);
    }

    #[test]
    fn bare_attribute_and_text_prefix() {
        assert_eq!(
            Selector::from("[data-test-id]"),
            Selector::Attribute {
                name: "data-test-id".to_string(),
                value: None,
            }
        );
        assert_eq!(
            Selector::from("text: Temperature "),
            Selector::Text("Temperature".to_string())
        );
    }

    #[test]
    fn malformed_selectors_are_invalid() {
        assert!(matches!(Selector::from(""), Selector::Invalid(_)));
        assert!(matches!(Selector::from("input[type"), Selector::Invalid(_)));
        assert!(matches!(Selector::from("div]"), Selector::Invalid(_)));
        assert!(matches!(Selector::from("div > span"), Selector::Invalid(_)));
        assert!(matches!(Selector::from("a..b"), Selector::Invalid(_)));
    }
}
