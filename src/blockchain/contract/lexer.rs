//! Tokenization for contract rules.
//!
//! Uses the logos crate for lexical analysis.

use logos::Logos;

/// Token types for the rule language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    // ========== Keywords ==========
    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("approve")]
    Approve,

    #[token("reject")]
    Reject,

    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("transaction")]
    Transaction,

    // ========== Boolean operators ==========
    #[token("and")]
    #[token("&&")]
    And,

    #[token("or")]
    #[token("||")]
    Or,

    #[token("not")]
    #[token("!")]
    Not,

    // ========== Comparisons ==========
    #[token("==")]
    Eq,

    #[token("!=")]
    Ne,

    #[token("<")]
    Lt,

    #[token("<=")]
    Le,

    #[token(">")]
    Gt,

    #[token(">=")]
    Ge,

    // ========== Punctuation ==========
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(".")]
    Dot,

    #[token(";")]
    Semicolon,

    // ========== Literals ==========
    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""[^"\n]*""#, |lex| unquote(lex.slice()))]
    #[regex(r"'[^'\n]*'", |lex| unquote(lex.slice()))]
    Str(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

fn unquote(slice: &str) -> String {
    slice[1..slice.len() - 1].to_string()
}

/// Token paired with the byte offset it starts at
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Tokenizes `source`, failing on the first unrecognised character
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, usize> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let offset = lexer.span().start;
        match result {
            Ok(token) => tokens.push(Spanned { token, offset }),
            Err(()) => return Err(offset),
        }
    }

    Ok(tokens)
}
