//! Tokenizer receives usda file as input and outputs tokens for
//! further analysis.
//!
//! It uses `logos` crate under the hood to provide efficient and
//! robust tokenization. The header line (`#usda 1.0`) is not tokenized,
//! see [split_header].

use std::{borrow::Cow, ops::Range};

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq, Eq, Hash, strum::Display, strum::EnumIs, strum::EnumTryAs)]
#[logos(skip r"[ \t\r\n\f]+")] // Skip whitespace
#[logos(skip r"#[^\n]*")] // Skip comments
pub enum Token<'source> {
    /// Double-quoted strings
    /// Example: "hello world" -> hello world
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| trim_chars(lex.slice(), 1))]
    /// Single-quoted strings
    /// Example: 'hello world' -> hello world
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| trim_chars(lex.slice(), 1))]
    /// Triple-quoted strings
    /// Example: """multi-line string""" -> multi-line string
    #[regex(r#""""([^"\\]|\\.|"[^"]|""[^"])*""""#, |lex| trim_chars(lex.slice(), 3))]
    String(&'source str),

    // Keywords must come before Number to ensure "inf" is matched as a keyword, not an identifier
    #[token("add")]
    Add,
    #[token("append")]
    Append,
    #[token("class")]
    Class,
    #[token("config")]
    Config,
    #[token("connect")]
    Connect,
    #[token("custom")]
    Custom,
    #[token("customData")]
    CustomData,
    #[token("default")]
    Default,
    #[token("def")]
    Def,
    #[token("delete")]
    Delete,
    #[token("dictionary")]
    Dictionary,
    #[token("displayUnit")]
    DisplayUnit,
    #[token("doc")]
    Doc,
    #[token("inf")]
    Inf,
    #[token("inherits")]
    Inherits,
    #[token("kind")]
    Kind,
    #[token("nameChildren")]
    NameChildren,
    #[token("nan")]
    Nan,
    #[token("None")]
    None,
    #[token("offset")]
    Offset,
    #[token("over")]
    Over,
    #[token("payload")]
    Payload,
    #[token("permission")]
    Permission,
    #[token("prefixSubstitutions")]
    PrefixSubstitutions,
    #[token("prepend")]
    Prepend,
    #[token("properties")]
    Properties,
    #[token("references")]
    References,
    #[token("relocates")]
    Relocates,
    #[token("rel")]
    Rel,
    #[token("reorder")]
    Reorder,
    #[token("rootPrims")]
    RootPrims,
    #[token("scale")]
    Scale,
    #[token("spline")]
    Spline,
    #[token("subLayers")]
    SubLayers,
    #[token("suffixSubstitutions")]
    SuffixSubstitutions,
    #[token("specializes")]
    Specializes,
    #[token("symmetryArguments")]
    SymmetryArguments,
    #[token("symmetryFunction")]
    SymmetryFunction,
    #[token("timeSamples")]
    TimeSamples,
    #[token("uniform")]
    Uniform,
    #[token("variantSet")]
    VariantSet,
    #[token("variantSets")]
    VariantSets,
    #[token("variants")]
    Variants,
    #[token("varying")]
    Varying,

    /// Numbers (int, float, scientific notation)
    /// Examples: "42", "3.14", "1.23e-4", "-42", "+3.14"
    /// Matches unsigned numbers OR signed numbers (sign must be followed by digit)
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?|[+-][0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", |lex| lex.slice())]
    Number(&'source str),

    /// Path references
    /// Example: "</World/Sphere/material:surface>" -> /World/Sphere/material:surface
    #[regex(r"<[^<>\n]*>", |lex| trim_chars(lex.slice(), 1))]
    PathRef(&'source str),

    /// Asset references
    /// Example: "@./textures/wood.jpg@" -> ./textures/wood.jpg
    #[regex(r"@[^@\n]*@", |lex| trim_chars(lex.slice(), 1))]
    /// Triple-@ delimited asset references
    /// Example: @@@C:\path@@@ -> C:\path
    #[regex(r#"@@@([^@]|@[^@]|@@[^@])*@@@"#, |lex| trim_chars(lex.slice(), 3))]
    AssetRef(&'source str),

    /// Punctuation characters
    /// Examples: "=", ",", ";", ":", ".", "(", ")", "{", "}", "[", "]", "+", "-"
    #[regex(r"[=,;:.()\{\}\[\]+\-]", |lex| lex.slice().chars().next())]
    Punctuation(char),

    /// Namespaced identifiers (contains colon)
    /// Examples: "inputs:diffuseColor", "outputs:surface"
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*(:[a-zA-Z_][a-zA-Z0-9_]*)+", |lex| lex.slice())]
    NamespacedIdentifier(&'source str),

    /// Regular identifiers and array types
    /// Examples: "Sphere", "Material", "bool[]", "float3[]"
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*(\[\])?", |lex| lex.slice())]
    Identifier(&'source str),
}

impl<'source> Token<'source> {
    /// Source text of a keyword token.
    pub fn keyword(&self) -> Option<&'static str> {
        let str = match self {
            Token::Add => "add",
            Token::Append => "append",
            Token::Class => "class",
            Token::Config => "config",
            Token::Connect => "connect",
            Token::Custom => "custom",
            Token::CustomData => "customData",
            Token::Default => "default",
            Token::Def => "def",
            Token::Delete => "delete",
            Token::Dictionary => "dictionary",
            Token::DisplayUnit => "displayUnit",
            Token::Doc => "doc",
            Token::Inf => "inf",
            Token::Inherits => "inherits",
            Token::Kind => "kind",
            Token::NameChildren => "nameChildren",
            Token::Nan => "nan",
            Token::None => "None",
            Token::Offset => "offset",
            Token::Over => "over",
            Token::Payload => "payload",
            Token::Permission => "permission",
            Token::PrefixSubstitutions => "prefixSubstitutions",
            Token::Prepend => "prepend",
            Token::Properties => "properties",
            Token::References => "references",
            Token::Relocates => "relocates",
            Token::Rel => "rel",
            Token::Reorder => "reorder",
            Token::RootPrims => "rootPrims",
            Token::Scale => "scale",
            Token::Spline => "spline",
            Token::SubLayers => "subLayers",
            Token::SuffixSubstitutions => "suffixSubstitutions",
            Token::Specializes => "specializes",
            Token::SymmetryArguments => "symmetryArguments",
            Token::SymmetryFunction => "symmetryFunction",
            Token::TimeSamples => "timeSamples",
            Token::Uniform => "uniform",
            Token::VariantSet => "variantSet",
            Token::VariantSets => "variantSets",
            Token::Variants => "variants",
            Token::Varying => "varying",
            _ => return None,
        };

        Some(str)
    }

    /// Identifier text, keywords included (keywords are valid names).
    pub fn as_identifier(&self) -> Option<&'source str> {
        match self {
            Token::Identifier(s) | Token::NamespacedIdentifier(s) => Some(*s),
            other => other.keyword(),
        }
    }

    /// Short source-like rendering used in diagnostics.
    pub fn snippet(&self) -> Cow<'source, str> {
        match self {
            Token::String(s) => Cow::Owned(format!("\"{s}\"")),
            Token::PathRef(s) => Cow::Owned(format!("<{s}>")),
            Token::AssetRef(s) => Cow::Owned(format!("@{s}@")),
            Token::Number(s) | Token::Identifier(s) | Token::NamespacedIdentifier(s) => Cow::Borrowed(*s),
            Token::Punctuation(c) => Cow::Owned(c.to_string()),
            other => Cow::Borrowed(other.keyword().unwrap_or_default()),
        }
    }
}

fn trim_chars(s: &str, n: usize) -> Option<&str> {
    if s.len() < 2 * n {
        // Handle cases where the string is too short to trim `n` characters from both ends.
        // This might indicate an unexpected input or regex issue.
        None
    } else {
        Some(&s[n..s.len() - n])
    }
}

/// Resolves backslash escapes in a string literal.
pub fn unescape(s: &str) -> Cow<'_, str> {
    if !s.contains('\\') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    Cow::Owned(out)
}

/// Splits off the first line if it looks like a header (starts with `#`).
///
/// Returns the header without the leading `#` and the byte offset where the
/// token stream starts.
pub fn split_header(source: &str) -> (Option<&str>, usize) {
    let source_trimmed = source.trim_start_matches('\u{feff}');
    let bom = source.len() - source_trimmed.len();

    if !source_trimmed.starts_with('#') {
        return (None, bom);
    }

    let end = source_trimmed.find('\n').unwrap_or(source_trimmed.len());
    let line = source_trimmed[1..end].trim_end_matches('\r');

    (Some(line), bom + end)
}

/// Token with its byte range in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<'a> {
    pub token: Token<'a>,
    pub span: Range<usize>,
}

/// Iterates over tokens of `source[offset..]` with spans relative to `source`.
pub struct Tokenizer<'a> {
    lexer: logos::Lexer<'a, Token<'a>>,
    offset: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        Self {
            lexer: Token::lexer(&source[offset..]),
            offset,
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    /// Unrecognized input yields its span as the error.
    type Item = Result<Spanned<'a>, Range<usize>>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.lexer.next()?;
        let span = self.lexer.span();
        let span = span.start + self.offset..span.end + self.offset;

        Some(match token {
            Ok(token) => Ok(Spanned { token, span }),
            Err(()) => Err(span),
        })
    }
}

/// Maps byte offsets to 1-based line and column numbers.
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self { starts }
    }

    /// Column counts characters, not bytes.
    pub fn position(&self, source: &str, offset: usize) -> (usize, usize) {
        let line = match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        };

        let start = self.starts.get(line).copied().unwrap_or(0);
        let end = offset.min(source.len());
        let column = source.get(start..end).map_or(0, |s| s.chars().count());

        (line + 1, column + 1)
    }
}
