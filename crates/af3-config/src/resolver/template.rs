//! Placeholder expression parsing
//!
//! Grammar accepted inside string values:
//!
//! ```text
//! template    := (text | "\${" | placeholder)*
//! placeholder := "${" reference "}"
//!              | "${" name ":" argument ("," argument)* "}"
//! reference   := "."* key-path
//! argument    := template            (stops at a top-level "," or "}")
//! ```

use std::fmt;

use crate::path::KeyPath;

/// A parsed string value: literal text interleaved with placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Placeholder(Placeholder),
}

/// A placeholder expression embedded in a config string.
#[derive(Debug, Clone, PartialEq)]
pub enum Placeholder {
    /// `${a.b}` / `${..sibling}`
    Interpolation(Reference),
    /// `${resolve_variable:torch.nn.GELU}`
    FunctionRef { path: String },
    /// `${now:%Y-%m-%d_%H-%M-%S}`
    TimeFormat { pattern: String },
    /// `${oc.env:NAME}` / `${oc.env:NAME,default}`
    Env {
        name: Template,
        default: Option<Template>,
    },
    /// Any other `${name:args}` call, dispatched by name at resolution time.
    Call { name: String, args: Vec<Template> },
}

/// Target of an interpolation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// Leading dots: 0 is absolute, 1 is the containing node, 2 its parent...
    pub up: usize,
    pub path: KeyPath,
    text: String,
}

impl Reference {
    /// Absolute path of the target when referenced from the value at `at`.
    pub fn absolute(&self, at: &KeyPath) -> Option<KeyPath> {
        if self.up == 0 {
            return Some(self.path.clone());
        }
        let mut base = at.parent()?;
        for _ in 1..self.up {
            base = base.parent()?;
        }
        Some(base.join(&self.path))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Template {
    /// Parse a config string. Errors carry a human-readable message.
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut parser = Parser { src: input, pos: 0 };
        let segments = parser.segments(&[])?;
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_placeholders(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(_)))
    }

    /// The placeholder when the template is exactly one placeholder and
    /// nothing else; such strings take on the referenced value's type.
    pub fn as_single_placeholder(&self) -> Option<&Placeholder> {
        match self.segments.as_slice() {
            [Segment::Placeholder(placeholder)] => Some(placeholder),
            _ => None,
        }
    }

    /// Literal text with escapes removed, when there are no placeholders.
    pub fn as_literal(&self) -> Option<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder(_) => return None,
            }
        }
        Some(out)
    }

    fn trimmed(mut self) -> Self {
        if let Some(Segment::Text(text)) = self.segments.first_mut() {
            *text = text.trim_start().to_string();
        }
        if let Some(Segment::Text(text)) = self.segments.last_mut() {
            *text = text.trim_end().to_string();
        }
        self.segments
            .retain(|s| !matches!(s, Segment::Text(text) if text.is_empty()));
        self
    }
}

/// Whether `s` holds at least one well-formed placeholder.
pub fn contains_placeholder(s: &str) -> bool {
    s.contains("${") && Template::parse(s).is_ok_and(|t| t.has_placeholders())
}

struct Parser<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn segments(&mut self, stop: &[char]) -> Result<Vec<Segment>, String> {
        let mut segments = Vec::new();
        let mut text = String::new();

        while let Some(c) = self.peek() {
            if stop.contains(&c) {
                break;
            }
            if self.rest().starts_with("\\${") {
                text.push_str("${");
                self.pos += 3;
                continue;
            }
            if self.rest().starts_with("${") {
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                self.pos += 2;
                segments.push(Segment::Placeholder(self.placeholder()?));
                continue;
            }
            text.push(c);
            self.pos += c.len_utf8();
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        Ok(segments)
    }

    /// Parse the body of a placeholder; `pos` is just past `${`.
    fn placeholder(&mut self) -> Result<Placeholder, String> {
        let start = self.pos;
        let name = loop {
            match self.peek() {
                None => return Err("unterminated placeholder".to_string()),
                Some('}') => {
                    let head = self.src[start..self.pos].trim();
                    self.pos += 1;
                    return parse_reference(head).map(Placeholder::Interpolation);
                }
                Some(':') => {
                    let name = self.src[start..self.pos].trim().to_string();
                    self.pos += 1;
                    break name;
                }
                Some(_) if self.rest().starts_with("${") => {
                    return Err("placeholders cannot be nested inside a reference".to_string());
                }
                Some(c) => self.pos += c.len_utf8(),
            }
        };

        if name.is_empty() {
            return Err("missing resolver name before `:`".to_string());
        }

        let args_start = self.pos;
        let mut args = Vec::new();
        let raw = loop {
            let segments = self.segments(&[',', '}'])?;
            args.push(Template { segments }.trimmed());
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {
                    let raw = &self.src[args_start..self.pos];
                    self.pos += 1;
                    break raw;
                }
                _ => return Err(format!("unterminated call to `{name}`")),
            }
        };

        Ok(match name.as_str() {
            "now" => Placeholder::TimeFormat {
                pattern: raw.to_string(),
            },
            "resolve_variable" => {
                let path = raw.trim();
                if path.is_empty() {
                    return Err("resolve_variable needs a callable path".to_string());
                }
                Placeholder::FunctionRef {
                    path: path.to_string(),
                }
            }
            "oc.env" => {
                if args.len() > 2 {
                    return Err("oc.env takes a variable name and an optional default".to_string());
                }
                let mut args = args.into_iter();
                let name = args.next().unwrap_or(Template { segments: vec![] });
                Placeholder::Env {
                    name,
                    default: args.next(),
                }
            }
            _ => Placeholder::Call { name, args },
        })
    }
}

fn parse_reference(head: &str) -> Result<Reference, String> {
    let up = head.chars().take_while(|c| *c == '.').count();
    let rest = &head[up..];
    if rest.is_empty() {
        return Err("empty reference".to_string());
    }
    let path = rest.parse::<KeyPath>().map_err(|e| e.to_string())?;
    Ok(Reference {
        up,
        path,
        text: head.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn single(input: &str) -> Placeholder {
        Template::parse(input)
            .unwrap()
            .as_single_placeholder()
            .cloned()
            .unwrap_or_else(|| panic!("{input} is not a single placeholder"))
    }

    #[test]
    fn test_plain_text() {
        let template = Template::parse("pdb_train").unwrap();
        assert!(!template.has_placeholders());
        assert_eq!(template.as_literal().unwrap(), "pdb_train");
    }

    #[test]
    fn test_escaped_placeholder_is_literal() {
        let template = Template::parse(r"cost: \${dollars}").unwrap();
        assert!(!template.has_placeholders());
        assert_eq!(template.as_literal().unwrap(), "cost: ${dollars}");
    }

    #[test]
    fn test_absolute_reference() {
        match single("${paths.output_dir}") {
            Placeholder::Interpolation(reference) => {
                assert_eq!(reference.up, 0);
                assert_eq!(reference.path, KeyPath::from_keys(["paths", "output_dir"]));
                assert_eq!(reference.to_string(), "paths.output_dir");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_relative_reference_resolves_against_container() {
        let Placeholder::Interpolation(reference) = single("${..dim_single}") else {
            panic!("expected interpolation");
        };
        let at = KeyPath::from_keys(["model", "pairformer", "depth"]);
        assert_eq!(
            reference.absolute(&at).unwrap(),
            KeyPath::from_keys(["model", "dim_single"])
        );

        let Placeholder::Interpolation(sibling) = single("${.depth}") else {
            panic!("expected interpolation");
        };
        assert_eq!(
            sibling.absolute(&at).unwrap(),
            KeyPath::from_keys(["model", "pairformer", "depth"])
        );

        let Placeholder::Interpolation(too_far) = single("${....x}") else {
            panic!("expected interpolation");
        };
        assert_eq!(too_far.absolute(&at), None);
    }

    #[test]
    fn test_time_format_keeps_raw_pattern() {
        assert_eq!(
            single("${now:%Y-%m-%d_%H:%M:%S}"),
            Placeholder::TimeFormat {
                pattern: "%Y-%m-%d_%H:%M:%S".to_string()
            }
        );
    }

    #[test]
    fn test_function_ref() {
        assert_eq!(
            single("${resolve_variable: torch.nn.GELU }"),
            Placeholder::FunctionRef {
                path: "torch.nn.GELU".to_string()
            }
        );
    }

    #[test]
    fn test_nested_arguments() {
        let Placeholder::Call { name, args } =
            single("${int_divide:${data.batch_size}, ${trainer.devices}}")
        else {
            panic!("expected call");
        };
        assert_eq!(name, "int_divide");
        assert_eq!(args.len(), 2);
        assert!(args.iter().all(|a| a.as_single_placeholder().is_some()));
    }

    #[test]
    fn test_env_with_default() {
        let Placeholder::Env { name, default } = single("${oc.env:PROJECT_ROOT,.}") else {
            panic!("expected env");
        };
        assert_eq!(name.as_literal().unwrap(), "PROJECT_ROOT");
        assert_eq!(default.unwrap().as_literal().unwrap(), ".");
    }

    #[test]
    fn test_mixed_text() {
        let template = Template::parse("${paths.log_dir}/runs/${now:%Y}").unwrap();
        assert_eq!(template.segments().len(), 3);
        assert!(template.as_single_placeholder().is_none());
        assert!(matches!(&template.segments()[1], Segment::Text(t) if t == "/runs/"));
    }

    #[rstest]
    #[case("${unterminated")]
    #[case("${}")]
    #[case("${:x}")]
    #[case("${a.${b}}")]
    #[case("${add:1,2")]
    #[case("${a..b}")]
    fn test_malformed(#[case] input: &str) {
        assert!(Template::parse(input).is_err(), "{input} should fail");
    }

    #[test]
    fn test_contains_placeholder() {
        assert!(contains_placeholder("${a}"));
        assert!(contains_placeholder("x_${a}_y"));
        assert!(!contains_placeholder("plain"));
        assert!(!contains_placeholder(r"\${a}"));
        assert!(!contains_placeholder("${broken"));
    }
}
