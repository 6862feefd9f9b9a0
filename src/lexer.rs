//! Built-in regex tokenizer for C-family source text.
//!
//! The engine only needs an ordered list of meaningful tokens with kind
//! codes and source ranges. Production callers usually get these from a
//! real parser; this lexer covers comments, literals, identifiers,
//! keywords, operators and delimiters well enough to diff typical
//! JavaScript/TypeScript/Rust/C code without one.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::Mode;
use crate::token::{Delimiter, DelimiterFamily, KindCode, RawToken};

#[allow(clippy::expect_used)]
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?P<comment>//[^\n]*|/\*[\s\S]*?\*/)",
        r#"|(?P<string>"(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'|`(?:[^`\\]|\\[\s\S])*`)"#,
        r"|(?P<number>\d[\w.]*)",
        r"|(?P<ident>[\p{L}_$][\p{L}\p{N}_$]*)",
        r"|(?P<op>===|!==|\.\.\.|=>|==|!=|<=|>=|&&|\|\||\?\?|\?\.|\+\+|--|\+=|-=|\*=|/=|::|->)",
        r"|(?P<delim>[()\[\]{}])",
        r"|(?P<other>\S)",
    ))
    .expect("lexer pattern is valid")
});

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "case", "catch", "class", "const", "continue", "default",
    "do", "else", "enum", "export", "extends", "false", "fn", "for", "function", "if", "impl",
    "import", "in", "interface", "let", "loop", "match", "mod", "mut", "new", "null", "pub",
    "return", "static", "struct", "switch", "this", "throw", "trait", "true", "try", "type",
    "typeof", "undefined", "use", "var", "void", "where", "while", "yield",
];

/// Token categories produced by [`tokenize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexKind {
    Comment,
    String,
    Number,
    Identifier,
    Keyword,
    Operator,
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Punctuation,
}

impl LexKind {
    pub const fn code(self) -> KindCode {
        KindCode(match self {
            Self::Comment => 1,
            Self::String => 2,
            Self::Number => 3,
            Self::Identifier => 4,
            Self::Keyword => 5,
            Self::Operator => 6,
            Self::OpenParen => 7,
            Self::CloseParen => 8,
            Self::OpenBrace => 9,
            Self::CloseBrace => 10,
            Self::OpenBracket => 11,
            Self::CloseBracket => 12,
            Self::Punctuation => 13,
        })
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::String => "string",
            Self::Number => "number",
            Self::Identifier => "identifier",
            Self::Keyword => "keyword",
            Self::Operator => "operator",
            Self::OpenParen => "open-paren",
            Self::CloseParen => "close-paren",
            Self::OpenBrace => "open-brace",
            Self::CloseBrace => "close-brace",
            Self::OpenBracket => "open-bracket",
            Self::CloseBracket => "close-bracket",
            Self::Punctuation => "punctuation",
        }
    }

    pub const fn delimiter(self) -> Option<Delimiter> {
        match self {
            Self::OpenParen => Some(Delimiter::open(DelimiterFamily::Paren)),
            Self::CloseParen => Some(Delimiter::close(DelimiterFamily::Paren)),
            Self::OpenBrace => Some(Delimiter::open(DelimiterFamily::Brace)),
            Self::CloseBrace => Some(Delimiter::close(DelimiterFamily::Brace)),
            Self::OpenBracket => Some(Delimiter::open(DelimiterFamily::Bracket)),
            Self::CloseBracket => Some(Delimiter::close(DelimiterFamily::Bracket)),
            _ => None,
        }
    }

    /// Structural tokens never form a 1-token match on their own.
    pub const fn can_match_alone(self) -> bool {
        !matches!(self, Self::Operator | Self::Punctuation) && self.delimiter().is_none()
    }

    fn of_delimiter(text: &str) -> Self {
        match text {
            "(" => Self::OpenParen,
            ")" => Self::CloseParen,
            "{" => Self::OpenBrace,
            "}" => Self::CloseBrace,
            "[" => Self::OpenBracket,
            _ => Self::CloseBracket,
        }
    }
}

/// Split `source` into diff tokens in document order.
pub fn tokenize(source: &str, mode: Mode) -> Vec<RawToken> {
    let mut tokens = Vec::new();
    let mut cursor = 0;
    let mut line = 0;

    for caps in TOKEN_RE.captures_iter(source) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let text = whole.as_str();
        let kind = if caps.name("comment").is_some() {
            LexKind::Comment
        } else if caps.name("string").is_some() {
            LexKind::String
        } else if caps.name("number").is_some() {
            LexKind::Number
        } else if caps.name("ident").is_some() {
            if KEYWORDS.contains(&text) {
                LexKind::Keyword
            } else {
                LexKind::Identifier
            }
        } else if caps.name("op").is_some() {
            LexKind::Operator
        } else if caps.name("delim").is_some() {
            LexKind::of_delimiter(text)
        } else {
            LexKind::Punctuation
        };

        let line_start = line + count_newlines(&source[cursor..whole.start()]);
        let line_end = line_start + count_newlines(text);
        cursor = whole.end();
        line = line_end;

        tokens.push(RawToken {
            kind: kind.code(),
            text: text.to_owned(),
            start: whole.start(),
            end: whole.end(),
            line_start,
            line_end,
            delimiter: kind.delimiter(),
            can_match_alone: kind.can_match_alone(),
            label: (mode == Mode::Debug).then(|| kind.label().to_owned()),
        });
    }

    tokens
}

fn count_newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}
