//! The lexer.
//!
//! A regex-table lexer in the teacher's style: a list of `(Regex, TokenKind)`
//! matchers tried in order at the current position. Keywords are matched
//! before the generic identifier rule so that e.g. `if` doesn't lex as an
//! identifier.

use derive_more::Display;
use regex::Regex;

/// Tokens in the program
#[derive(Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("kind: '{kind}', part of input: '{text}'")]
pub struct Token<'src> {
    /// What token class this token belongs to.
    pub kind: TokenKind,
    /// What part of the input this token carries.
    pub text: &'src str,
}

/// Token classes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum TokenKind {
    #[display("id")]
    Id,
    #[display("num")]
    Num,

    #[display("var")]
    Var,
    #[display("proc")]
    Proc,
    #[display("fun")]
    Fun,
    #[display("if")]
    If,
    #[display("else")]
    Else,
    #[display("while")]
    While,
    #[display("print")]
    Print,
    #[display("return")]
    Return,
    #[display("true")]
    True,
    #[display("false")]
    False,
    #[display("null")]
    Null,
    #[display("alloc")]
    Alloc,
    #[display("int64")]
    Int64,
    #[display("bool")]
    Bool,

    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
    #[display("[")]
    LBracket,
    #[display("]")]
    RBracket,
    #[display(",")]
    Comma,
    #[display(":")]
    Colon,
    #[display(";")]
    Semi,

    #[display("=")]
    Assign,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display("%")]
    Percent,
    #[display("<<")]
    Shl,
    #[display(">>")]
    Shr,
    #[display("&")]
    Amp,
    #[display("&&")]
    AmpAmp,
    #[display("|")]
    Pipe,
    #[display("||")]
    PipePipe,
    #[display("^")]
    Caret,
    #[display("!")]
    Bang,
    #[display("~")]
    Tilde,
    #[display("<")]
    Lt,
    #[display("<=")]
    Le,
    #[display(">")]
    Gt,
    #[display(">=")]
    Ge,
    #[display("==")]
    EqEq,
    #[display("!=")]
    Ne,
}

pub struct LexError(pub usize, pub char);

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lexer error: unexpected character {:?} at {}", self.1, self.0)
    }
}

impl std::fmt::Debug for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lexer error: unexpected character {:?} at {}", self.1, self.0)
    }
}

pub struct Lexer<'input> {
    input: &'input str,
    pos: usize,
    whitespace: Regex,
    matchers: Vec<(Regex, TokenKind)>,
}

fn keyword_matchers() -> Vec<(Regex, TokenKind)> {
    use TokenKind::*;
    let kw = |word: &str| Regex::new(&format!(r"\A{word}\b")).unwrap();
    vec![
        (kw("var"), Var),
        (kw("proc"), Proc),
        (kw("fun"), Fun),
        (kw("if"), If),
        (kw("else"), Else),
        (kw("while"), While),
        (kw("print"), Print),
        (kw("return"), Return),
        (kw("true"), True),
        (kw("false"), False),
        (kw("null"), Null),
        (kw("alloc"), Alloc),
        (kw("int64"), Int64),
        (kw("bool"), Bool),
    ]
}

fn symbol_matchers() -> Vec<(Regex, TokenKind)> {
    use TokenKind::*;
    // Longest-match-first for multi-character operators.
    vec![
        (Regex::new(r"\A&&").unwrap(), AmpAmp),
        (Regex::new(r"\A\|\|").unwrap(), PipePipe),
        (Regex::new(r"\A<<").unwrap(), Shl),
        (Regex::new(r"\A>>").unwrap(), Shr),
        (Regex::new(r"\A<=").unwrap(), Le),
        (Regex::new(r"\A>=").unwrap(), Ge),
        (Regex::new(r"\A==").unwrap(), EqEq),
        (Regex::new(r"\A!=").unwrap(), Ne),
        (Regex::new(r"\A\(").unwrap(), LParen),
        (Regex::new(r"\A\)").unwrap(), RParen),
        (Regex::new(r"\A\{").unwrap(), LBrace),
        (Regex::new(r"\A\}").unwrap(), RBrace),
        (Regex::new(r"\A\[").unwrap(), LBracket),
        (Regex::new(r"\A\]").unwrap(), RBracket),
        (Regex::new(r"\A,").unwrap(), Comma),
        (Regex::new(r"\A:").unwrap(), Colon),
        (Regex::new(r"\A;").unwrap(), Semi),
        (Regex::new(r"\A=").unwrap(), Assign),
        (Regex::new(r"\A\+").unwrap(), Plus),
        (Regex::new(r"\A-").unwrap(), Minus),
        (Regex::new(r"\A\*").unwrap(), Star),
        (Regex::new(r"\A/").unwrap(), Slash),
        (Regex::new(r"\A%").unwrap(), Percent),
        (Regex::new(r"\A&").unwrap(), Amp),
        (Regex::new(r"\A\|").unwrap(), Pipe),
        (Regex::new(r"\A\^").unwrap(), Caret),
        (Regex::new(r"\A!").unwrap(), Bang),
        (Regex::new(r"\A~").unwrap(), Tilde),
        (Regex::new(r"\A<").unwrap(), Lt),
        (Regex::new(r"\A>").unwrap(), Gt),
    ]
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        let mut matchers = keyword_matchers();
        matchers.push((Regex::new(r"\A[A-Za-z_][A-Za-z0-9_]*").unwrap(), TokenKind::Id));
        matchers.push((Regex::new(r"\A[0-9]+").unwrap(), TokenKind::Num));
        matchers.extend(symbol_matchers());
        Lexer {
            input,
            pos: 0,
            whitespace: Regex::new(r"\A(?:[ \t\f\r\n\v]|(?://.*))*").unwrap(),
            matchers,
        }
    }

    /// Has the lexer reached the end of input?
    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len()
    }

    // Skip comments and whitespace
    fn skip_whitespace(&mut self) {
        if let Some(m) = self.whitespace.find(&self.input[self.pos..]) {
            self.pos += m.end()
        }
    }

    /// Get the next token if possible.
    ///
    /// The return type distinguishes between end-of-input and lexer error.
    pub fn next(&mut self) -> Result<Option<Token<'input>>, LexError> {
        self.skip_whitespace();
        if self.end_of_input() {
            return Ok(None);
        }
        let rest = &self.input[self.pos..];
        for (re, kind) in &self.matchers {
            if let Some(m) = re.find(rest) {
                let text = &rest[..m.end()];
                self.pos += m.end();
                return Ok(Some(Token { kind: *kind, text }));
            }
        }
        let bad = rest.chars().next().unwrap();
        Err(LexError(self.pos, bad))
    }

    /// Collect every token up front; used by the parser, which wants
    /// random-access lookahead rather than a pull-based stream.
    pub fn tokenize(mut self) -> Result<Vec<Token<'input>>, LexError> {
        let mut out = vec![];
        while let Some(tok) = self.next()? {
            out.push(tok);
        }
        Ok(out)
    }
}
