//! Statement templates.
//!
//! Text outside `{{ }}` is copied as is. Actions print the iteration index or
//! call one of the random value functions:
//!
//! ```text
//! INSERT INTO t VALUES ({{.Iter}}, '{{call .RandString 3 10}}', {{call .RandInt63n 1000}});
//! ```
//!
//! Templates are compiled once per benchmark. Compilation resolves every
//! function name and checks every argument, so [`Template::render`] cannot
//! fail in the middle of a run.

use thiserror::Error;

use crate::random::{random_id, RandomSource};

/// Longest string `RandString` may produce.
pub const MAX_STRING_LEN: i64 = 1 << 20;

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("unclosed action starting at byte {offset}")]
    Unclosed { offset: usize },

    #[error("empty action at byte {offset}")]
    EmptyAction { offset: usize },

    #[error("unterminated comment at byte {offset}")]
    UnterminatedComment { offset: usize },

    #[error("unterminated string literal at byte {offset}")]
    UnterminatedString { offset: usize },

    #[error("invalid escape '\\{escape}' at byte {offset}")]
    InvalidEscape { offset: usize, escape: char },

    #[error("unexpected '{token}' at byte {offset}")]
    UnexpectedToken { offset: usize, token: String },

    #[error("unknown field .{name} at byte {offset}")]
    UnknownField { offset: usize, name: String },

    #[error("unknown function .{name} at byte {offset}")]
    UnknownFunction { offset: usize, name: String },

    #[error(".{name} is not a function (byte {offset})")]
    NotCallable { offset: usize, name: String },

    #[error("function .{name} must be invoked with call (byte {offset})")]
    MissingCall { offset: usize, name: String },

    #[error(".{name} takes {expected} argument(s), got {found} (byte {offset})")]
    Arity {
        offset: usize,
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("argument {position} of .{name} must be {expected}, got '{token}' (byte {offset})")]
    InvalidArgument {
        offset: usize,
        name: String,
        position: usize,
        expected: &'static str,
        token: String,
    },

    #[error("invalid range for .{name}: {reason} (byte {offset})")]
    InvalidRange {
        offset: usize,
        name: String,
        reason: String,
    },
}

#[derive(Clone, Copy, Debug)]
enum Kind {
    Int,
    Float,
    Str,
}

impl Kind {
    fn describe(self) -> &'static str {
        match self {
            Kind::Int => "an integer",
            Kind::Float => "a number",
            Kind::Str => "a string",
        }
    }
}

/// Functions available to templates, with their parameter types.
const BINDINGS: &[(&str, &[Kind])] = &[
    ("RandIntBetween", &[Kind::Int, Kind::Int]),
    ("RandFloatBetween", &[Kind::Float, Kind::Float]),
    ("RandString", &[Kind::Int, Kind::Int]),
    ("RandDate", &[]),
    ("RandId", &[Kind::Str, Kind::Str]),
    ("RandInt63", &[]),
    ("RandInt63n", &[Kind::Int]),
    ("RandFloat32", &[]),
    ("RandFloat64", &[]),
    ("RandExpFloat64", &[]),
    ("RandNormFloat64", &[]),
    ("Seed", &[Kind::Int]),
];

const ITER_FIELD: &str = "Iter";

#[derive(Clone, Debug)]
enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

/// A resolved function invocation with typed arguments.
#[derive(Clone, Debug, PartialEq)]
enum Call {
    IntBetween(i64, i64),
    FloatBetween(f64, f64),
    String(usize, usize),
    Date,
    /// `RandId` does not depend on the generator, so its output is fixed at compile time.
    Id(String),
    Int63,
    Int63n(i64),
    Float32,
    Float64,
    ExpFloat64,
    NormFloat64,
    Seed(i64),
}

impl Call {
    fn render(&self, out: &mut String, rng: &mut RandomSource) {
        match self {
            Call::IntBetween(min, max) => out.push_str(&rng.int_between(*min, *max).to_string()),
            Call::FloatBetween(min, max) => {
                out.push_str(&rng.float_between(*min, *max).to_string())
            }
            Call::String(min, max) => out.push_str(&rng.string(*min, *max)),
            Call::Date => out.push_str(&rng.date()),
            Call::Id(subquery) => out.push_str(subquery),
            Call::Int63 => out.push_str(&rng.int63().to_string()),
            Call::Int63n(n) => out.push_str(&rng.int63n(*n).to_string()),
            Call::Float32 => out.push_str(&rng.float32().to_string()),
            Call::Float64 => out.push_str(&rng.float64().to_string()),
            Call::ExpFloat64 => out.push_str(&rng.exp_float64().to_string()),
            Call::NormFloat64 => out.push_str(&rng.norm_float64().to_string()),
            Call::Seed(seed) => rng.reseed(*seed),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Segment {
    Text(String),
    Iter,
    Call(Call),
}

#[derive(Clone, Debug, PartialEq)]
enum Token<'a> {
    Word(&'a str),
    Str(String),
}

impl Token<'_> {
    fn as_text(&self) -> &str {
        match self {
            Token::Word(w) => w,
            Token::Str(s) => s,
        }
    }
}

/// A compiled statement template.
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
    text_len: usize,
}

impl Template {
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut rest = source;
        let mut offset = 0;
        let mut trim_next = false;

        while let Some(open) = rest.find("{{") {
            let literal = &rest[..open];
            text.push_str(if trim_next { literal.trim_start() } else { literal });

            let action_offset = offset + open;
            let inner = &rest[open + 2..];
            let trim_left = has_left_trim(inner);
            if trim_left {
                let kept = text.trim_end().len();
                text.truncate(kept);
            }

            let body_start = usize::from(trim_left);
            let close = find_close(&inner[body_start..], action_offset)?;
            let mut body = &inner[body_start..body_start + close];

            trim_next = has_right_trim(body);
            if trim_next {
                body = &body[..body.len() - 1];
            }

            if let Some(segment) = parse_action(body.trim(), action_offset)? {
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(segment);
            }

            let consumed = open + 2 + body_start + close + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }

        text.push_str(if trim_next { rest.trim_start() } else { rest });
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        let text_len = segments
            .iter()
            .map(|s| match s {
                Segment::Text(t) => t.len(),
                _ => 0,
            })
            .sum();

        Ok(Self { segments, text_len })
    }

    /// Materializes the statement for one iteration.
    pub fn render(&self, iteration: u64, rng: &mut RandomSource) -> String {
        let mut out = String::with_capacity(self.text_len + 16 * self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Iter => out.push_str(&iteration.to_string()),
                Segment::Call(call) => call.render(&mut out, rng),
            }
        }
        out
    }
}

fn has_left_trim(inner: &str) -> bool {
    let mut chars = inner.chars();
    chars.next() == Some('-') && chars.next().is_some_and(|c| c.is_ascii_whitespace())
}

fn has_right_trim(body: &str) -> bool {
    body.strip_suffix('-')
        .and_then(|b| b.chars().last())
        .is_some_and(|c| c.is_ascii_whitespace())
}

/// Byte index of the `}}` closing the action, skipping over quoted strings and comments.
fn find_close(s: &str, offset: usize) -> Result<usize, TemplateError> {
    let trimmed = s.trim_start();
    if trimmed.starts_with("/*") {
        let lead = s.len() - trimmed.len();
        let end = trimmed
            .find("*/")
            .ok_or(TemplateError::UnterminatedComment { offset })?;
        let after = lead + end + 2;
        return s[after..]
            .find("}}")
            .map(|i| after + i)
            .ok_or(TemplateError::Unclosed { offset });
    }

    let bytes = s.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(b'"') if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'`' => quote = Some(b),
            None if b == b'}' && bytes.get(i + 1) == Some(&b'}') => return Ok(i),
            None => {}
        }
        i += 1;
    }
    Err(TemplateError::Unclosed { offset })
}

fn tokenize(body: &str, offset: usize) -> Result<Vec<Token<'_>>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        match c {
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => return Err(TemplateError::UnterminatedString { offset }),
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, 'n')) => s.push('\n'),
                            Some((_, 't')) => s.push('\t'),
                            Some((_, '"')) => s.push('"'),
                            Some((_, '\\')) => s.push('\\'),
                            Some((_, escape)) => {
                                return Err(TemplateError::InvalidEscape { offset, escape })
                            }
                            None => return Err(TemplateError::UnterminatedString { offset }),
                        },
                        Some((_, ch)) => s.push(ch),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '`' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => return Err(TemplateError::UnterminatedString { offset }),
                        Some((_, '`')) => break,
                        Some((_, ch)) => s.push(ch),
                    }
                }
                tokens.push(Token::Str(s));
            }
            _ => {
                let mut end = body.len();
                while let Some(&(i, ch)) = chars.peek() {
                    if ch.is_whitespace() || ch == '"' || ch == '`' {
                        end = i;
                        break;
                    }
                    chars.next();
                }
                tokens.push(Token::Word(&body[start..end]));
            }
        }
    }

    Ok(tokens)
}

fn parse_action(body: &str, offset: usize) -> Result<Option<Segment>, TemplateError> {
    if body.starts_with("/*") {
        return if body.ends_with("*/") {
            Ok(None)
        } else {
            Err(TemplateError::UnterminatedComment { offset })
        };
    }

    let tokens = tokenize(body, offset)?;
    let (head, args) = tokens
        .split_first()
        .ok_or(TemplateError::EmptyAction { offset })?;

    match head {
        Token::Word("call") => {
            let (target, args) = args.split_first().ok_or(TemplateError::UnexpectedToken {
                offset,
                token: "call".to_string(),
            })?;
            let name = field_name(target, offset)?;
            bind(name, args, offset).map(|call| Some(Segment::Call(call)))
        }
        Token::Word(_) => {
            let name = field_name(head, offset)?;
            if name == ITER_FIELD {
                if let Some(extra) = args.first() {
                    return Err(TemplateError::UnexpectedToken {
                        offset,
                        token: extra.as_text().to_string(),
                    });
                }
                Ok(Some(Segment::Iter))
            } else if lookup(name).is_some() {
                Err(TemplateError::MissingCall {
                    offset,
                    name: name.to_string(),
                })
            } else {
                Err(TemplateError::UnknownField {
                    offset,
                    name: name.to_string(),
                })
            }
        }
        Token::Str(s) => Err(TemplateError::UnexpectedToken {
            offset,
            token: s.clone(),
        }),
    }
}

fn field_name<'a>(token: &'a Token<'_>, offset: usize) -> Result<&'a str, TemplateError> {
    match token {
        Token::Word(word) => match word.strip_prefix('.') {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(TemplateError::UnexpectedToken {
                offset,
                token: word.to_string(),
            }),
        },
        Token::Str(s) => Err(TemplateError::UnexpectedToken {
            offset,
            token: s.clone(),
        }),
    }
}

fn lookup(name: &str) -> Option<&'static [Kind]> {
    BINDINGS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, params)| *params)
}

fn convert(
    name: &str,
    position: usize,
    kind: Kind,
    token: &Token<'_>,
    offset: usize,
) -> Result<Value, TemplateError> {
    let converted = match (kind, token) {
        (Kind::Int, Token::Word(w)) => w.parse::<i64>().ok().map(Value::Int),
        (Kind::Float, Token::Word(w)) => w.parse::<f64>().ok().map(Value::Float),
        (Kind::Str, Token::Str(s)) => Some(Value::Str(s.clone())),
        _ => None,
    };

    converted.ok_or_else(|| TemplateError::InvalidArgument {
        offset,
        name: name.to_string(),
        position: position + 1,
        expected: kind.describe(),
        token: token.as_text().to_string(),
    })
}

fn bind(name: &str, args: &[Token<'_>], offset: usize) -> Result<Call, TemplateError> {
    if name == ITER_FIELD {
        return Err(TemplateError::NotCallable {
            offset,
            name: name.to_string(),
        });
    }

    let params = lookup(name).ok_or_else(|| TemplateError::UnknownFunction {
        offset,
        name: name.to_string(),
    })?;

    if params.len() != args.len() {
        return Err(TemplateError::Arity {
            offset,
            name: name.to_string(),
            expected: params.len(),
            found: args.len(),
        });
    }

    let values = params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(i, (kind, token))| convert(name, i, *kind, token, offset))
        .collect::<Result<Vec<_>, _>>()?;

    let invalid_range = |reason: String| TemplateError::InvalidRange {
        offset,
        name: name.to_string(),
        reason,
    };

    let call = match (name, values.as_slice()) {
        ("RandIntBetween", [Value::Int(min), Value::Int(max)]) => {
            if min >= max {
                return Err(invalid_range(format!("min {min} must be below max {max}")));
            }
            Call::IntBetween(*min, *max)
        }
        ("RandFloatBetween", [Value::Float(min), Value::Float(max)]) => {
            Call::FloatBetween(*min, *max)
        }
        ("RandString", [Value::Int(min), Value::Int(max)]) => {
            if *min < 0 || min > max {
                return Err(invalid_range(format!(
                    "lengths must satisfy 0 <= min <= max, got {min} and {max}"
                )));
            }
            if *max > MAX_STRING_LEN {
                return Err(invalid_range(format!(
                    "max length {max} exceeds {MAX_STRING_LEN}"
                )));
            }
            Call::String(*min as usize, *max as usize)
        }
        ("RandDate", []) => Call::Date,
        ("RandId", [Value::Str(entity), Value::Str(dialect)]) => {
            Call::Id(random_id(entity, dialect))
        }
        ("RandInt63", []) => Call::Int63,
        ("RandInt63n", [Value::Int(n)]) => {
            if *n <= 0 {
                return Err(invalid_range(format!("bound must be positive, got {n}")));
            }
            Call::Int63n(*n)
        }
        ("RandFloat32", []) => Call::Float32,
        ("RandFloat64", []) => Call::Float64,
        ("RandExpFloat64", []) => Call::ExpFloat64,
        ("RandNormFloat64", []) => Call::NormFloat64,
        ("Seed", [Value::Int(seed)]) => Call::Seed(*seed),
        _ => {
            return Err(TemplateError::UnknownFunction {
                offset,
                name: name.to_string(),
            })
        }
    };

    Ok(call)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(source: &str, iteration: u64) -> String {
        let template = Template::compile(source).unwrap();
        template.render(iteration, &mut RandomSource::from_seed(0))
    }

    #[test]
    fn iteration_index() {
        assert_eq!(render("INSERT {{.Iter}}", 7), "INSERT 7");
        assert_eq!(render("{{ .Iter }}-{{.Iter}}", 12), "12-12");
    }

    #[test]
    fn plain_text_is_copied() {
        let t = Template::compile("SELECT 1;").unwrap();
        assert_eq!(t.render(1, &mut RandomSource::from_seed(0)), "SELECT 1;");
    }

    #[test]
    fn every_binding_compiles() {
        let source = concat!(
            "{{call .RandIntBetween 1 10}} {{call .RandFloatBetween 0 1.5}} ",
            "{{call .RandString 3 10}} {{call .RandDate}} {{call .RandId \"Order\" \"mysql\"}} ",
            "{{call .RandInt63}} {{call .RandInt63n 100}} {{call .RandFloat32}} ",
            "{{call .RandFloat64}} {{call .RandExpFloat64}} {{call .RandNormFloat64}} ",
            "{{call .Seed 42}}"
        );
        let t = Template::compile(source).unwrap();
        let out = t.render(1, &mut RandomSource::from_seed(3));
        assert!(out.contains("(SELECT OrderId FROM Order ORDER BY RAND() LIMIT 1)"));
        assert_eq!(out.split(' ').count(), 20);
    }

    #[test]
    fn random_string_respects_bounds() {
        let t = Template::compile("'{{call .RandString 3 10}}'").unwrap();
        let mut rng = RandomSource::from_seed(11);
        for i in 0..200 {
            let out = t.render(i, &mut rng);
            let inner = out.trim_matches('\'');
            assert!((3..=10).contains(&inner.len()), "{out}");
        }
    }

    #[test]
    fn seed_makes_output_repeatable() {
        let t = Template::compile("{{call .Seed 5}}{{call .RandInt63}}").unwrap();
        let a = t.render(1, &mut RandomSource::from_seed(1));
        let b = t.render(2, &mut RandomSource::from_seed(2));
        assert_eq!(a, b);
    }

    #[test]
    fn comments_and_trim_markers() {
        assert_eq!(render("a {{/* note */}}b", 1), "a b");
        assert_eq!(render("a   {{- .Iter -}}   b", 4), "a4b");
        assert_eq!(render("x {{- /* gone */ -}} y", 1), "xy");
    }

    #[test]
    fn braces_inside_strings() {
        assert_eq!(render("{{call .RandId \"}}\" \"none\"}}!", 1), "1!");
    }

    #[test]
    fn raw_strings() {
        assert_eq!(
            render("{{call .RandId `Item` `sqlite`}}", 1),
            "(SELECT ItemId FROM Item ORDER BY RANDOM() LIMIT 1)"
        );
    }

    #[test]
    fn unknown_function() {
        let err = Template::compile("SELECT {{call .RandInt64}}").unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownFunction {
                offset: 7,
                name: "RandInt64".into()
            }
        );
    }

    #[test]
    fn unknown_field() {
        let err = Template::compile("{{.Iteration}}").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownField { .. }));
    }

    #[test]
    fn function_without_call() {
        let err = Template::compile("{{.RandInt63}}").unwrap_err();
        assert!(matches!(err, TemplateError::MissingCall { .. }));
    }

    #[test]
    fn call_on_field() {
        let err = Template::compile("{{call .Iter}}").unwrap_err();
        assert!(matches!(err, TemplateError::NotCallable { .. }));
    }

    #[test]
    fn wrong_arity() {
        let err = Template::compile("{{call .RandString 3}}").unwrap_err();
        assert_eq!(
            err,
            TemplateError::Arity {
                offset: 0,
                name: "RandString".into(),
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn wrong_argument_type() {
        let err = Template::compile("{{call .RandIntBetween 1 2.5}}").unwrap_err();
        assert!(matches!(
            err,
            TemplateError::InvalidArgument { position: 2, .. }
        ));

        let err = Template::compile("{{call .RandId Order mysql}}").unwrap_err();
        assert!(matches!(
            err,
            TemplateError::InvalidArgument { position: 1, .. }
        ));
    }

    #[test]
    fn longest_string_is_accepted() {
        let t = Template::compile("{{call .RandString 1048576 1048576}}").unwrap();
        assert_eq!(t.render(1, &mut RandomSource::from_seed(3)).len(), 1 << 20);
    }

    #[test]
    fn empty_ranges_rejected() {
        for source in [
            "{{call .RandIntBetween 5 5}}",
            "{{call .RandString 10 3}}",
            "{{call .RandString -1 3}}",
            "{{call .RandString 4611686018427387904 4611686018427387904}}",
            "{{call .RandString 0 1048577}}",
            "{{call .RandInt63n 0}}",
        ] {
            let err = Template::compile(source).unwrap_err();
            assert!(matches!(err, TemplateError::InvalidRange { .. }), "{source}");
        }
    }

    #[test]
    fn malformed_actions() {
        assert!(matches!(
            Template::compile("SELECT {{.Iter").unwrap_err(),
            TemplateError::Unclosed { offset: 7 }
        ));
        assert!(matches!(
            Template::compile("{{ }}").unwrap_err(),
            TemplateError::EmptyAction { .. }
        ));
        assert!(matches!(
            Template::compile("{{/* open }}").unwrap_err(),
            TemplateError::UnterminatedComment { .. }
        ));
        assert!(matches!(
            Template::compile("{{.Iter 3}}").unwrap_err(),
            TemplateError::UnexpectedToken { .. }
        ));
    }
}
