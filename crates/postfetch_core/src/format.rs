use serde_json::Value;
use thiserror::Error;

use crate::Kwdict;

/// Text substituted for fields that are absent from the kwdict or null.
pub const MISSING_VALUE: &str = "None";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("unclosed field starting at byte {0}")]
    UnclosedField(usize),
    #[error("single '}}' encountered at byte {0}")]
    StrayClosingBrace(usize),
    #[error("empty field name at byte {0}")]
    EmptyField(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed `{key}` template. `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, FormatError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(FormatError::StrayClosingBrace(pos)),
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(FormatError::UnclosedField(pos));
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(FormatError::EmptyField(pos));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name.to_string()));
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Substitute every field from `kwdict`. Missing keys render as [`MISSING_VALUE`].
    pub fn render(&self, kwdict: &Kwdict) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => match kwdict.get(name) {
                    Some(value) => out.push_str(&render_value(value)),
                    None => out.push_str(MISSING_VALUE),
                },
            }
        }
        out
    }
}

/// Render a single metadata value the way templates display it.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => MISSING_VALUE.to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kwdict(value: Value) -> Kwdict {
        crate::kwdict_from_value(value).unwrap()
    }

    #[test]
    fn escaped_braces_are_literal() {
        let template = Template::parse("{{{name}}}").unwrap();
        assert_eq!(template.render(&kwdict(json!({"name": "x"}))), "{x}");
    }

    #[test]
    fn unbalanced_templates_are_rejected() {
        assert_eq!(Template::parse("{oops"), Err(FormatError::UnclosedField(0)));
        assert_eq!(Template::parse("a}b"), Err(FormatError::StrayClosingBrace(1)));
        assert_eq!(Template::parse("a{ }"), Err(FormatError::EmptyField(1)));
    }

    #[test]
    fn values_render_like_display_text() {
        let data = kwdict(json!({"n": 3, "f": 1.5, "b": true, "z": null, "l": [1, "a"]}));
        let template = Template::parse("{n}|{f}|{b}|{z}|{l}").unwrap();
        assert_eq!(template.render(&data), "3|1.5|True|None|[1,\"a\"]");
    }
}
