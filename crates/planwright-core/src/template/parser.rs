//! Recursive-descent parser for `{{ stepId.field.path }}` templates.
//!
//! ```text
//! template   := (literal | expression)*
//! expression := "{{" ws? access ws? "}}"
//! access     := ident ("." ident)*
//! ident      := [A-Za-z0-9_-]+
//! ```
//!
//! Text outside `{{ ... }}` is literal, including stray `}}` and single braces.

use std::fmt;

use super::ResolutionError;

/// A parsed template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

/// One piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Expr(FieldAccess),
}

/// A reference to a step's output, optionally narrowed by a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAccess {
    pub step_id: String,
    pub path: Vec<String>,
}

impl fmt::Display for FieldAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.step_id)?;
        for segment in &self.path {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

impl Template {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True if the template contains no expressions.
    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }

    /// The sole expression, if the template is exactly one expression with
    /// nothing but whitespace around it.
    pub fn single_expression(&self) -> Option<&FieldAccess> {
        let mut found = None;
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) if text.trim().is_empty() => {}
                Segment::Literal(_) => return None,
                Segment::Expr(access) => {
                    if found.is_some() {
                        return None;
                    }
                    found = Some(access);
                }
            }
        }
        found
    }

    /// All expressions in order of appearance.
    pub fn references(&self) -> impl Iterator<Item = &FieldAccess> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Expr(access) => Some(access),
            Segment::Literal(_) => None,
        })
    }
}

/// Parse a string into a [`Template`].
pub fn parse(source: &str) -> Result<Template, ResolutionError> {
    if !source.contains("{{") {
        return Ok(Template {
            segments: vec![Segment::Literal(source.to_string())],
        });
    }
    Parser::new(source).parse_template()
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn error(&self, message: impl fmt::Display) -> ResolutionError {
        ResolutionError::Syntax(format!("{message} at byte {} in '{}'", self.pos, self.src))
    }

    fn parse_template(&mut self) -> Result<Template, ResolutionError> {
        let mut segments = Vec::new();
        while self.pos < self.src.len() {
            if self.rest().starts_with("{{") {
                segments.push(Segment::Expr(self.parse_expression()?));
            } else {
                segments.push(Segment::Literal(self.parse_literal()));
            }
        }
        Ok(Template { segments })
    }

    fn parse_literal(&mut self) -> String {
        let end = self
            .rest()
            .find("{{")
            .map(|i| self.pos + i)
            .unwrap_or(self.src.len());
        let literal = self.src[self.pos..end].to_string();
        self.pos = end;
        literal
    }

    fn parse_expression(&mut self) -> Result<FieldAccess, ResolutionError> {
        let open = self.pos;
        self.eat("{{");
        self.skip_whitespace();

        if self.eat("}}") {
            self.pos = open;
            return Err(self.error("empty expression"));
        }
        if self.pos >= self.src.len() {
            self.pos = open;
            return Err(self.error("unterminated '{{'"));
        }

        let step_id = self.parse_ident()?;
        let mut path = Vec::new();
        while self.eat(".") {
            path.push(self.parse_ident()?);
        }

        self.skip_whitespace();
        if self.eat("}}") {
            return Ok(FieldAccess { step_id, path });
        }
        if self.pos >= self.src.len() || !self.rest().contains("}}") {
            self.pos = open;
            return Err(self.error("unterminated '{{'"));
        }
        match self.peek() {
            Some(c) => Err(self.error(format_args!("unexpected character '{c}'"))),
            None => Err(self.error("unterminated '{{'")),
        }
    }

    fn parse_ident(&mut self) -> Result<String, ResolutionError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        if self.pos == start {
            return match self.peek() {
                Some('.') | Some('}') | None => Err(self.error("empty path segment")),
                Some(c) => Err(self.error(format_args!("unexpected character '{c}'"))),
            };
        }
        Ok(self.src[start..self.pos].to_string())
    }
}
