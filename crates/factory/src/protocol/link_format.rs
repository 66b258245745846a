//! CoRE link format
//!
//! The resource directory served at `/.well-known/core` is a comma separated
//! list of `</path>;attr="value";flag` entries.

use std::iter::Peekable;
use std::str::CharIndices;

/// One directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub attrs: Vec<(String, String)>,
}

impl Link {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    /// First value of an attribute; flag attributes yield `""`
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed link format at byte {position}: {reason}")]
pub struct LinkFormatError {
    pub position: usize,
    pub reason: &'static str,
}

/// Render links as a directory document
pub fn render(links: &[Link]) -> String {
    links
        .iter()
        .map(|link| {
            let mut out = format!("<{}>", link.href);
            for (name, value) in &link.attrs {
                if value.is_empty() {
                    out.push_str(&format!(";{name}"));
                } else {
                    out.push_str(&format!(";{name}=\"{}\"", quote(value)));
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Escape for a quoted attribute value; backslashes before quotes
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Parse a directory document
pub fn parse(input: &str) -> Result<Vec<Link>, LinkFormatError> {
    let mut parser = Parser {
        input,
        chars: input.char_indices().peekable(),
    };
    let mut links = Vec::new();

    parser.skip_whitespace();
    if parser.chars.peek().is_none() {
        return Ok(links);
    }

    loop {
        links.push(parser.link()?);
        parser.skip_whitespace();
        match parser.chars.next() {
            None => return Ok(links),
            Some((_, ',')) => parser.skip_whitespace(),
            Some((pos, _)) => {
                return Err(LinkFormatError {
                    position: pos,
                    reason: "expected ',' between links",
                });
            }
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl Parser<'_> {
    fn position(&mut self) -> usize {
        self.chars.peek().map(|(i, _)| *i).unwrap_or(self.input.len())
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn link(&mut self) -> Result<Link, LinkFormatError> {
        let start = self.position();
        if !matches!(self.chars.next(), Some((_, '<'))) {
            return Err(LinkFormatError {
                position: start,
                reason: "expected '<'",
            });
        }

        let mut href = String::new();
        loop {
            match self.chars.next() {
                Some((_, '>')) => break,
                Some((_, c)) => href.push(c),
                None => {
                    return Err(LinkFormatError {
                        position: self.input.len(),
                        reason: "unterminated target",
                    });
                }
            }
        }

        let mut link = Link::new(href);
        loop {
            self.skip_whitespace();
            if !matches!(self.chars.peek(), Some((_, ';'))) {
                return Ok(link);
            }
            self.chars.next();
            self.skip_whitespace();
            let (name, value) = self.attribute()?;
            link.attrs.push((name, value));
        }
    }

    fn attribute(&mut self) -> Result<(String, String), LinkFormatError> {
        let start = self.position();
        let mut name = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c == '=' || c == ';' || c == ',' || c.is_whitespace() {
                break;
            }
            name.push(c);
            self.chars.next();
        }
        if name.is_empty() {
            return Err(LinkFormatError {
                position: start,
                reason: "empty attribute name",
            });
        }

        self.skip_whitespace();
        if !matches!(self.chars.peek(), Some((_, '='))) {
            return Ok((name, String::new()));
        }
        self.chars.next();
        self.skip_whitespace();

        let mut value = String::new();
        if matches!(self.chars.peek(), Some((_, '"'))) {
            self.chars.next();
            loop {
                match self.chars.next() {
                    Some((_, '"')) => break,
                    Some((_, '\\')) => {
                        if let Some((_, escaped)) = self.chars.next() {
                            value.push(escaped);
                        }
                    }
                    Some((_, c)) => value.push(c),
                    None => {
                        return Err(LinkFormatError {
                            position: self.input.len(),
                            reason: "unterminated quoted value",
                        });
                    }
                }
            }
        } else {
            while let Some(&(_, c)) = self.chars.peek() {
                if c == ';' || c == ',' {
                    break;
                }
                value.push(c);
                self.chars.next();
            }
            value.truncate(value.trim_end().len());
        }

        Ok((name, value))
    }
}
