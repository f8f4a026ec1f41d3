//! Turning a source string and an optional translation into final output.
//!
//! Rendering itself may fail; [`render`] logs and returns the error so the
//! orchestrator can hand the string to an [`ErrorPolicy`]. Missing
//! translations are covered by a [`MissingPolicy`].

use crate::error::RenderError;
use crate::icu::{self, Params};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::error;

/// Escape callable applied to the final rendered text.
pub type EscapeFn = fn(&str) -> String;

/// Escape HTML-significant characters.
pub fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render a string.
///
/// With a non-empty `translation` the translation is formatted. Otherwise the
/// source string is formatted and passed through `missing_policy`. `escape`
/// runs last, over the complete output.
pub fn render(
    source_string: &str,
    translation: Option<&str>,
    language_code: &str,
    escape: Option<EscapeFn>,
    missing_policy: Option<&MissingPolicy>,
    params: &Params,
) -> Result<String, RenderError> {
    let template = translation.filter(|t| !t.is_empty());

    let result = match (template, missing_policy) {
        (Some(template), _) => icu::format(template, params, language_code).map_err(RenderError::from),
        (None, Some(policy)) => icu::format(source_string, params, language_code)
            .map(|formatted| policy.apply(&formatted))
            .map_err(RenderError::from),
        (None, None) => Err(RenderError::NothingToRender(source_string.to_string())),
    };

    match result {
        Ok(rendered) => Ok(match escape {
            Some(escape) => escape(&rendered),
            None => rendered,
        }),
        Err(e) => {
            error!(
                "RenderingError: Could not render string `{}` in language `{}` with parameters `{:?}` (Error: {}, Source String: {})",
                template.unwrap_or_default(),
                language_code,
                params,
                e,
                source_string
            );
            Err(e)
        }
    }
}

/// Pseudo-localization table: ASCII letters to look-alike accented letters.
const PSEUDO_UPPER: [char; 26] = [
    '\u{00C5}', '\u{0181}', '\u{010A}', '\u{0110}', '\u{0204}', '\u{1E1E}', '\u{0120}',
    '\u{021E}', '\u{0130}', '\u{0134}', '\u{01E8}', '\u{0139}', '\u{1E40}', '\u{00D1}',
    '\u{00D2}', '\u{01A4}', '\u{A756}', '\u{0212}', '\u{0218}', '\u{0164}', '\u{00DC}',
    '\u{1E7C}', '\u{1E82}', '\u{1E8C}', '\u{1E8E}', '\u{017D}',
];
const PSEUDO_LOWER: [char; 26] = [
    '\u{00E0}', '\u{0180}', '\u{010B}', '\u{0111}', '\u{00EA}', '\u{0192}', '\u{011F}',
    '\u{021F}', '\u{0131}', '\u{01F0}', '\u{01E9}', '\u{013A}', '\u{0271}', '\u{00F1}',
    '\u{00F8}', '\u{01A5}', '\u{02A0}', '\u{0213}', '\u{0161}', '\u{0165}', '\u{00FC}',
    '\u{1E7D}', '\u{1E81}', '\u{1E8B}', '\u{00FF}', '\u{017A}',
];

fn pseudo_translate(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'A'..='Z' => PSEUDO_UPPER[(c as u8 - b'A') as usize],
            'a'..='z' => PSEUDO_LOWER[(c as u8 - b'a') as usize],
            _ => c,
        })
        .collect()
}

/// What to show when a string has no translation.
///
/// Policies chain left to right: the output of one is the input of the next.
#[derive(Debug, Clone, PartialEq)]
pub enum MissingPolicy {
    /// The source string unchanged
    SourceString,
    /// The source string with letters swapped for accented look-alikes
    PseudoTranslation,
    /// The source string between two markers (`[` and `]` by default)
    Wrapped { start: String, end: String },
    /// The source string padded by `ceil(len * percentage)` filler characters
    ExtraLength { percentage: f64, filler: String },
    Chained(Vec<MissingPolicy>),
}

impl Default for MissingPolicy {
    fn default() -> Self {
        MissingPolicy::SourceString
    }
}

impl MissingPolicy {
    pub fn wrapped() -> Self {
        MissingPolicy::Wrapped {
            start: "[".to_string(),
            end: "]".to_string(),
        }
    }

    pub fn extra_length() -> Self {
        MissingPolicy::ExtraLength {
            percentage: 0.3,
            filler: "~extra~".to_string(),
        }
    }

    pub fn apply(&self, source: &str) -> String {
        match self {
            MissingPolicy::SourceString => source.to_string(),
            MissingPolicy::PseudoTranslation => pseudo_translate(source),
            MissingPolicy::Wrapped { start, end } => format!("{}{}{}", start, source, end),
            MissingPolicy::ExtraLength { percentage, filler } => {
                let length = source.chars().count();
                let extra = (length as f64 * percentage).ceil().max(0.0) as usize;
                if extra == 0 || filler.is_empty() {
                    return source.to_string();
                }
                let padding: String = filler.chars().cycle().take(extra).collect();
                format!("{}{}", source, padding)
            }
            MissingPolicy::Chained(policies) => policies
                .iter()
                .fold(source.to_string(), |text, policy| policy.apply(&text)),
        }
    }
}

/// Error parsing a missing policy description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyParseError(String);

impl fmt::Display for PolicyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid missing policy: {}", self.0)
    }
}

impl std::error::Error for PolicyParseError {}

static POLICY_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([a-z_]+)\s*(?:\((.*)\))?\s*$").expect("policy item pattern is valid")
});

impl FromStr for MissingPolicy {
    type Err = PolicyParseError;

    /// Parse `pseudo+extra(0.5)+wrapped(>>, <<)` style descriptions.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut policies = s
            .split('+')
            .map(parse_policy_item)
            .collect::<Result<Vec<_>, _>>()?;

        if policies.len() == 1 {
            Ok(policies.remove(0))
        } else {
            Ok(MissingPolicy::Chained(policies))
        }
    }
}

fn parse_policy_item(item: &str) -> Result<MissingPolicy, PolicyParseError> {
    let captures = POLICY_ITEM
        .captures(item)
        .ok_or_else(|| PolicyParseError(item.to_string()))?;
    let name = &captures[1];
    let args: Vec<&str> = captures
        .get(2)
        .map(|m| m.as_str().split(',').map(str::trim).collect())
        .unwrap_or_default();

    match (name, args.as_slice()) {
        ("source", []) => Ok(MissingPolicy::SourceString),
        ("pseudo", []) => Ok(MissingPolicy::PseudoTranslation),
        ("wrapped", []) => Ok(MissingPolicy::wrapped()),
        ("wrapped", [start, end]) => Ok(MissingPolicy::Wrapped {
            start: start.to_string(),
            end: end.to_string(),
        }),
        ("extra", []) => Ok(MissingPolicy::extra_length()),
        ("extra", [percentage]) | ("extra", [percentage, _]) => {
            let percentage = percentage
                .parse()
                .map_err(|_| PolicyParseError(format!("bad percentage `{}`", percentage)))?;
            let filler = args.get(1).map_or("~extra~", |f| *f).to_string();
            Ok(MissingPolicy::ExtraLength { percentage, filler })
        }
        _ => Err(PolicyParseError(item.trim().to_string())),
    }
}

/// Everything an error policy may use to produce a fallback.
#[derive(Debug, Clone, Copy)]
pub struct ErrorContext<'a> {
    pub source_string: &'a str,
    pub translation: Option<&'a str>,
    pub language_code: &'a str,
    pub escape: Option<EscapeFn>,
    pub params: &'a Params,
}

/// Produces a fallback string when rendering fails. Must not fail itself.
pub trait ErrorPolicy: Send + Sync + fmt::Debug {
    fn get(&self, context: &ErrorContext<'_>) -> String;
}

/// Re-render the bare source string; if that fails too, return a fixed text.
#[derive(Debug, Clone)]
pub struct SourceStringErrorPolicy {
    default_text: String,
}

impl SourceStringErrorPolicy {
    pub fn new(default_text: impl Into<String>) -> Self {
        Self {
            default_text: default_text.into(),
        }
    }
}

impl Default for SourceStringErrorPolicy {
    fn default() -> Self {
        Self::new("ERROR")
    }
}

impl ErrorPolicy for SourceStringErrorPolicy {
    fn get(&self, context: &ErrorContext<'_>) -> String {
        match render(
            context.source_string,
            Some(context.source_string),
            context.language_code,
            context.escape,
            None,
            context.params,
        ) {
            Ok(rendered) => rendered,
            Err(_) => {
                error!(
                    "ErrorPolicyError: Could not render string `{}` with parameters `{:?}`",
                    context.source_string, context.params
                );
                self.default_text.clone()
            }
        }
    }
}
