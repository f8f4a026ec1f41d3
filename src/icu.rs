//! ICU MessageFormat rendering.
//!
//! Supports literal text with apostrophe quoting, `{arg}`, `{arg, number}`,
//! `{arg, select, ...}`, `{arg, plural, ...}` (with `offset:` and `=N`
//! cases) and `{arg, selectordinal, ...}`. Plural categories are resolved with
//! CLDR rules for the requested language.

use crate::error::FormatError;
use intl_pluralrules::{PluralCategory, PluralRuleType, PluralRules};
use serde_json::Value;
use std::collections::HashMap;
use unic_langid::LanguageIdentifier;

/// Named parameters substituted into a message.
pub type Params = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    /// `#` inside a plural case
    Hash,
    Argument(String),
    Number(String),
    Select {
        name: String,
        cases: Vec<(String, Vec<Node>)>,
    },
    Plural {
        name: String,
        ordinal: bool,
        offset: f64,
        cases: Vec<(PluralKey, Vec<Node>)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum PluralKey {
    Exact(f64),
    Keyword(String),
}

const PLURAL_KEYWORDS: [&str; 6] = ["zero", "one", "two", "few", "many", "other"];

/// Deepest argument nesting a message may use.
const MAX_DEPTH: usize = 64;

/// Render `template` with `params`, using the plural rules of `language`.
pub fn format(template: &str, params: &Params, language: &str) -> Result<String, FormatError> {
    let nodes = Parser::new(template).parse()?;
    let mut formatter = Formatter {
        params,
        language,
        cardinal: None,
        ordinal: None,
    };
    let mut out = String::new();
    formatter.write(&nodes, None, &mut out)?;
    Ok(out)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0, depth: 0 }
    }

    fn parse(mut self) -> Result<Vec<Node>, FormatError> {
        let nodes = self.message(false)?;
        if self.pos < self.src.len() {
            return Err(FormatError::syntax(self.pos, "unexpected `}`"));
        }
        Ok(nodes)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.src[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), FormatError> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(FormatError::syntax(
                self.pos - c.len_utf8(),
                format!("expected `{}`, found `{}`", expected, c),
            )),
            None => Err(FormatError::syntax(
                self.pos,
                format!("expected `{}`, found end of message", expected),
            )),
        }
    }

    /// Read a token up to whitespace or one of the delimiters.
    fn token(&mut self, delimiters: &[char]) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if !c.is_whitespace() && !delimiters.contains(&c)) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    /// Parse text and arguments up to an unmatched `}` or the end of input.
    fn message(&mut self, in_plural: bool) -> Result<Vec<Node>, FormatError> {
        let mut nodes = Vec::new();
        let mut text = String::new();

        while let Some(c) = self.peek() {
            match c {
                '}' => break,
                '{' => {
                    flush(&mut text, &mut nodes);
                    nodes.push(self.argument(in_plural)?);
                }
                '#' if in_plural => {
                    self.bump();
                    flush(&mut text, &mut nodes);
                    nodes.push(Node::Hash);
                }
                '\'' => {
                    self.bump();
                    match self.peek() {
                        Some('\'') => {
                            self.bump();
                            text.push('\'');
                        }
                        Some('{') | Some('}') => self.quoted(&mut text),
                        Some('#') if in_plural => self.quoted(&mut text),
                        _ => text.push('\''),
                    }
                }
                _ => {
                    self.bump();
                    text.push(c);
                }
            }
        }

        flush(&mut text, &mut nodes);
        Ok(nodes)
    }

    /// Copy a quoted run verbatim; an unterminated quote runs to the end.
    fn quoted(&mut self, text: &mut String) {
        while let Some(c) = self.bump() {
            if c == '\'' {
                if self.peek() == Some('\'') {
                    self.bump();
                    text.push('\'');
                } else {
                    return;
                }
            } else {
                text.push(c);
            }
        }
    }

    fn argument(&mut self, in_plural: bool) -> Result<Node, FormatError> {
        if self.depth >= MAX_DEPTH {
            return Err(FormatError::syntax(self.pos, "message nested too deeply"));
        }
        self.depth += 1;
        let node = self.argument_body(in_plural);
        self.depth -= 1;
        node
    }

    fn argument_body(&mut self, in_plural: bool) -> Result<Node, FormatError> {
        let start = self.pos;
        self.expect('{')?;
        self.skip_whitespace();
        let name = self.token(&[',', '{', '}']).to_string();
        if name.is_empty() {
            return Err(FormatError::syntax(start, "empty argument name"));
        }
        self.skip_whitespace();

        if self.peek() == Some('}') {
            self.bump();
            return Ok(Node::Argument(name));
        }
        self.expect(',')?;
        self.skip_whitespace();
        let kind = self.token(&[',', '{', '}']).to_string();
        self.skip_whitespace();

        match kind.as_str() {
            "number" => {
                if self.peek() == Some(',') {
                    // Number styles are accepted but not applied
                    self.bump();
                    while matches!(self.peek(), Some(c) if c != '}') {
                        self.bump();
                    }
                }
                self.expect('}')?;
                Ok(Node::Number(name))
            }
            "select" => {
                self.expect(',')?;
                let cases = self.select_cases(in_plural)?;
                if !cases.iter().any(|(key, _)| key == "other") {
                    return Err(FormatError::MissingOther(name));
                }
                Ok(Node::Select { name, cases })
            }
            "plural" | "selectordinal" => {
                self.expect(',')?;
                let (offset, cases) = self.plural_cases()?;
                let has_other = cases
                    .iter()
                    .any(|(key, _)| *key == PluralKey::Keyword("other".to_string()));
                if !has_other {
                    return Err(FormatError::MissingOther(name));
                }
                Ok(Node::Plural {
                    name,
                    ordinal: kind == "selectordinal",
                    offset,
                    cases,
                })
            }
            "" => Err(FormatError::syntax(self.pos, "missing argument type")),
            _ => Err(FormatError::UnsupportedType { name, kind }),
        }
    }

    fn case_body(&mut self, in_plural: bool) -> Result<Vec<Node>, FormatError> {
        self.skip_whitespace();
        self.expect('{')?;
        let body = self.message(in_plural)?;
        self.expect('}')?;
        Ok(body)
    }

    fn select_cases(&mut self, in_plural: bool) -> Result<Vec<(String, Vec<Node>)>, FormatError> {
        let mut cases = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(cases);
            }
            let key_start = self.pos;
            let key = self.token(&['{', '}']).to_string();
            if key.is_empty() {
                return Err(FormatError::syntax(key_start, "expected a select case"));
            }
            let body = self.case_body(in_plural)?;
            cases.push((key, body));
        }
    }

    fn plural_cases(&mut self) -> Result<(f64, Vec<(PluralKey, Vec<Node>)>), FormatError> {
        let mut offset = 0.0;
        let mut cases = Vec::new();

        self.skip_whitespace();
        if self.src[self.pos..].starts_with("offset:") {
            self.pos += "offset:".len();
            self.skip_whitespace();
            let start = self.pos;
            offset = self
                .token(&['{', '}'])
                .parse()
                .map_err(|_| FormatError::syntax(start, "invalid plural offset"))?;
        }

        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.bump();
                return Ok((offset, cases));
            }
            let key_start = self.pos;
            let selector = self.token(&['{', '}']);
            let key = if let Some(exact) = selector.strip_prefix('=') {
                let value = exact
                    .parse()
                    .map_err(|_| FormatError::syntax(key_start, format!("invalid plural case `{}`", selector)))?;
                PluralKey::Exact(value)
            } else if PLURAL_KEYWORDS.contains(&selector) {
                PluralKey::Keyword(selector.to_string())
            } else if selector.is_empty() {
                return Err(FormatError::syntax(key_start, "expected a plural case"));
            } else {
                return Err(FormatError::syntax(
                    key_start,
                    format!("unknown plural keyword `{}`", selector),
                ));
            };
            let body = self.case_body(true)?;
            cases.push((key, body));
        }
    }
}

fn flush(text: &mut String, nodes: &mut Vec<Node>) {
    if !text.is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
    }
}

struct Formatter<'a> {
    params: &'a Params,
    language: &'a str,
    cardinal: Option<Option<PluralRules>>,
    ordinal: Option<Option<PluralRules>>,
}

impl Formatter<'_> {
    fn value(&self, name: &str) -> Result<&Value, FormatError> {
        self.params
            .get(name)
            .ok_or_else(|| FormatError::MissingArgument(name.to_string()))
    }

    fn write(&mut self, nodes: &[Node], hash: Option<&str>, out: &mut String) -> Result<(), FormatError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Hash => out.push_str(hash.unwrap_or("#")),
                Node::Argument(name) => out.push_str(&display_value(self.value(name)?)),
                Node::Number(name) => {
                    let number = numeric_value(name, self.value(name)?)?;
                    out.push_str(&format_number(number));
                }
                Node::Select { name, cases } => {
                    let selected = display_value(self.value(name)?);
                    let body = cases
                        .iter()
                        .find(|(key, _)| *key == selected)
                        .or_else(|| cases.iter().find(|(key, _)| key == "other"))
                        .map(|(_, body)| body)
                        .ok_or_else(|| FormatError::MissingOther(name.clone()))?;
                    self.write(body, hash, out)?;
                }
                Node::Plural {
                    name,
                    ordinal,
                    offset,
                    cases,
                } => {
                    let number = numeric_value(name, self.value(name)?)?;
                    let shown = format_number(number - offset);
                    let exact = cases.iter().find(|(key, _)| *key == PluralKey::Exact(number));
                    let body = match exact {
                        Some((_, body)) => body,
                        None => {
                            let category = self.category(&shown, *ordinal);
                            cases
                                .iter()
                                .find(|(key, _)| *key == PluralKey::Keyword(category.to_string()))
                                .or_else(|| {
                                    cases
                                        .iter()
                                        .find(|(key, _)| *key == PluralKey::Keyword("other".to_string()))
                                })
                                .map(|(_, body)| body)
                                .ok_or_else(|| FormatError::MissingOther(name.clone()))?
                        }
                    };
                    self.write(body, Some(&shown), out)?;
                }
            }
        }
        Ok(())
    }

    fn category(&mut self, number: &str, ordinal: bool) -> &'static str {
        let language = self.language;
        let slot = if ordinal { &mut self.ordinal } else { &mut self.cardinal };
        let rules = slot.get_or_insert_with(|| plural_rules(language, ordinal));

        match rules.as_ref().map(|rules| rules.select(number)) {
            Some(Ok(category)) => category_name(category),
            _ if number == "1" => "one",
            _ => "other",
        }
    }
}

/// Rules for `language`, falling back to its primary subtag and then English.
fn plural_rules(language: &str, ordinal: bool) -> Option<PluralRules> {
    let primary = language.split(['-', '_']).next().unwrap_or(language);
    [language, primary, "en"].into_iter().find_map(|candidate| {
        let langid: LanguageIdentifier = candidate.parse().ok()?;
        let rule_type = if ordinal {
            PluralRuleType::ORDINAL
        } else {
            PluralRuleType::CARDINAL
        };
        PluralRules::create(langid, rule_type).ok()
    })
}

fn category_name(category: PluralCategory) -> &'static str {
    match category {
        PluralCategory::ZERO => "zero",
        PluralCategory::ONE => "one",
        PluralCategory::TWO => "two",
        PluralCategory::FEW => "few",
        PluralCategory::MANY => "many",
        PluralCategory::OTHER => "other",
    }
}

fn numeric_value(name: &str, value: &Value) -> Result<f64, FormatError> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| FormatError::NotANumber(name.to_string()))
}

fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) if number.is_f64() => number.as_f64().map(format_number).unwrap_or_default(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
