//! Lexer: UTF-8 source text to a finite token list terminated by `Eof`.
//!
//! Whitespace and comments (`// ...` and `# ...`) are discarded; newlines and
//! `;` both become [`TokenKind::NewLine`] statement separators. String
//! literals accept `"`, `'`, and the typographic quote pairs; a preceding `r`
//! disables backslash escapes. A numeric literal containing a `.` followed by
//! a digit lexes as a float, otherwise as an integer. Two-character operators
//! (`==`, `->`, `+=`, ...) are disambiguated with one character of lookahead;
//! unary minus is left to the parser.

use strum::Display;

use crate::errors::{CompileError, CompileErrorKind, CompileResult};

/// A single lexed token with its byte offset into the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

/// Token kinds produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Display)]
pub enum TokenKind {
    // literals and names
    #[strum(serialize = "integer literal")]
    Int(i64),
    #[strum(serialize = "float literal")]
    Float(f64),
    #[strum(serialize = "string literal")]
    Str(String),
    #[strum(serialize = "identifier")]
    Ident(String),

    // keywords
    #[strum(serialize = "'if'")]
    If,
    #[strum(serialize = "'else'")]
    Else,
    #[strum(serialize = "'func'")]
    Func,
    #[strum(serialize = "'return'")]
    Return,
    #[strum(serialize = "'while'")]
    While,
    #[strum(serialize = "'continue'")]
    Continue,
    #[strum(serialize = "'break'")]
    Break,
    #[strum(serialize = "'for'")]
    For,
    #[strum(serialize = "'in'")]
    In,
    #[strum(serialize = "'init'")]
    Init,
    #[strum(serialize = "'say'")]
    Say,
    #[strum(serialize = "'nudge'")]
    Nudge,
    #[strum(serialize = "'picsave'")]
    PicSave,
    #[strum(serialize = "'picsend'")]
    PicSend,
    #[strum(serialize = "'true'")]
    True,
    #[strum(serialize = "'false'")]
    False,
    #[strum(serialize = "'null'")]
    Null,

    // grouping and punctuation
    #[strum(serialize = "'('")]
    LParen,
    #[strum(serialize = "')'")]
    RParen,
    #[strum(serialize = "'['")]
    LBracket,
    #[strum(serialize = "']'")]
    RBracket,
    #[strum(serialize = "'{{'")]
    LBrace,
    #[strum(serialize = "'}}'")]
    RBrace,
    #[strum(serialize = "','")]
    Comma,
    #[strum(serialize = "':'")]
    Colon,
    #[strum(serialize = "'.'")]
    Dot,
    #[strum(serialize = "'->'")]
    Arrow,
    #[strum(serialize = "end of statement")]
    NewLine,

    // operators
    #[strum(serialize = "'+'")]
    Plus,
    #[strum(serialize = "'-'")]
    Minus,
    #[strum(serialize = "'*'")]
    Star,
    #[strum(serialize = "'/'")]
    Slash,
    #[strum(serialize = "'%'")]
    Percent,
    #[strum(serialize = "'='")]
    Assign,
    #[strum(serialize = "'+='")]
    PlusAssign,
    #[strum(serialize = "'-='")]
    MinusAssign,
    #[strum(serialize = "'*='")]
    StarAssign,
    #[strum(serialize = "'/='")]
    SlashAssign,
    #[strum(serialize = "'%='")]
    PercentAssign,
    #[strum(serialize = "'=='")]
    Eq,
    #[strum(serialize = "'!='")]
    Ne,
    #[strum(serialize = "'<'")]
    Lt,
    #[strum(serialize = "'<='")]
    Le,
    #[strum(serialize = "'>'")]
    Gt,
    #[strum(serialize = "'>='")]
    Ge,
    #[strum(serialize = "'&&'")]
    And,
    #[strum(serialize = "'||'")]
    Or,
    #[strum(serialize = "'!'")]
    Not,

    #[strum(serialize = "end of input")]
    Eof,
}

/// Maps an identifier spelling to its keyword token, if it is one.
fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "func" => TokenKind::Func,
        "return" => TokenKind::Return,
        "while" => TokenKind::While,
        "continue" => TokenKind::Continue,
        "break" => TokenKind::Break,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "init" => TokenKind::Init,
        "say" => TokenKind::Say,
        "nudge" => TokenKind::Nudge,
        "picsave" => TokenKind::PicSave,
        "picsend" => TokenKind::PicSend,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        _ => return None,
    })
}

/// Returns the closing delimiter matching an opening string quote.
fn closing_quote(open: char) -> Option<char> {
    match open {
        '"' => Some('"'),
        '\'' => Some('\''),
        '\u{201c}' => Some('\u{201d}'), // “ ”
        '\u{2018}' => Some('\u{2019}'), // ‘ ’
        _ => None,
    }
}

struct Lexer<'src> {
    src: &'src str,
    chars: std::iter::Peekable<std::str::CharIndices<'src>>,
    tokens: Vec<Token>,
}

impl<'src> Lexer<'src> {
    fn new(src: &'src str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
            tokens: Vec::new(),
        }
    }

    fn push(&mut self, kind: TokenKind, pos: usize) {
        self.tokens.push(Token { kind, pos });
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    /// Consumes the next char if it equals `expected`.
    fn eat(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.chars.next();
        }
    }

    fn lex_number(&mut self, start: usize) -> CompileResult<()> {
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                end = i + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        // A '.' makes this a float only when a digit follows; otherwise it
        // belongs to a postfix attribute access like `2.string()`.
        let mut is_float = false;
        if let Some(&(dot, '.')) = self.chars.peek() {
            let after_dot = self.src[dot + 1..].chars().next();
            if after_dot.is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.chars.next();
                while let Some(&(i, c)) = self.chars.peek() {
                    if c.is_ascii_digit() {
                        end = i + c.len_utf8();
                        self.chars.next();
                    } else {
                        break;
                    }
                }
            }
        }
        let text = &self.src[start..end.max(start + 1)];
        if is_float {
            let value: f64 = text.parse().map_err(|_| {
                CompileError::new(CompileErrorKind::Tokenizer { ch: '.' }, start)
            })?;
            self.push(TokenKind::Float(value), start);
        } else {
            // Out-of-range integer literals saturate rather than failing the
            // whole compile.
            let value: i64 = text.parse().unwrap_or(i64::MAX);
            self.push(TokenKind::Int(value), start);
        }
        Ok(())
    }

    fn lex_string(&mut self, start: usize, open: char, raw: bool) -> CompileResult<()> {
        let close = closing_quote(open).expect("lex_string called on a non-quote");
        let mut out = String::new();
        loop {
            let Some((i, c)) = self.chars.next() else {
                return Err(CompileError::new(CompileErrorKind::UnexpectedEof, start));
            };
            if c == close {
                break;
            }
            if c == '\\' && !raw {
                let Some((_, esc)) = self.chars.next() else {
                    return Err(CompileError::new(CompileErrorKind::UnexpectedEof, i));
                };
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    '\\' => out.push('\\'),
                    other => out.push(other),
                }
            } else {
                out.push(c);
            }
        }
        self.push(TokenKind::Str(out), start);
        Ok(())
    }

    fn lex_ident(&mut self, start: usize, first: char) {
        let mut word = String::new();
        word.push(first);
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        match keyword(&word) {
            Some(kind) => self.push(kind, start),
            None => self.push(TokenKind::Ident(word), start),
        }
    }

    fn run(mut self) -> CompileResult<Vec<Token>> {
        while let Some((pos, c)) = self.chars.next() {
            match c {
                ' ' | '\t' | '\r' => {}
                '\n' | ';' => self.push(TokenKind::NewLine, pos),
                '#' => self.skip_line_comment(),
                '(' => self.push(TokenKind::LParen, pos),
                ')' => self.push(TokenKind::RParen, pos),
                '[' => self.push(TokenKind::LBracket, pos),
                ']' => self.push(TokenKind::RBracket, pos),
                '{' => self.push(TokenKind::LBrace, pos),
                '}' => self.push(TokenKind::RBrace, pos),
                ',' => self.push(TokenKind::Comma, pos),
                ':' => self.push(TokenKind::Colon, pos),
                '.' => self.push(TokenKind::Dot, pos),
                '+' => {
                    let kind = if self.eat('=') { TokenKind::PlusAssign } else { TokenKind::Plus };
                    self.push(kind, pos);
                }
                '-' => {
                    let kind = if self.eat('>') {
                        TokenKind::Arrow
                    } else if self.eat('=') {
                        TokenKind::MinusAssign
                    } else {
                        TokenKind::Minus
                    };
                    self.push(kind, pos);
                }
                '*' => {
                    let kind = if self.eat('=') { TokenKind::StarAssign } else { TokenKind::Star };
                    self.push(kind, pos);
                }
                '/' => {
                    if self.eat('/') {
                        self.skip_line_comment();
                    } else if self.eat('=') {
                        self.push(TokenKind::SlashAssign, pos);
                    } else {
                        self.push(TokenKind::Slash, pos);
                    }
                }
                '%' => {
                    let kind = if self.eat('=') { TokenKind::PercentAssign } else { TokenKind::Percent };
                    self.push(kind, pos);
                }
                '=' => {
                    let kind = if self.eat('=') { TokenKind::Eq } else { TokenKind::Assign };
                    self.push(kind, pos);
                }
                '!' => {
                    let kind = if self.eat('=') { TokenKind::Ne } else { TokenKind::Not };
                    self.push(kind, pos);
                }
                '<' => {
                    let kind = if self.eat('=') { TokenKind::Le } else { TokenKind::Lt };
                    self.push(kind, pos);
                }
                '>' => {
                    let kind = if self.eat('=') { TokenKind::Ge } else { TokenKind::Gt };
                    self.push(kind, pos);
                }
                '&' => {
                    if self.eat('&') {
                        self.push(TokenKind::And, pos);
                    } else {
                        return Err(CompileError::new(CompileErrorKind::Tokenizer { ch: '&' }, pos));
                    }
                }
                '|' => {
                    if self.eat('|') {
                        self.push(TokenKind::Or, pos);
                    } else {
                        return Err(CompileError::new(CompileErrorKind::Tokenizer { ch: '|' }, pos));
                    }
                }
                '$' => {
                    // `$`, `$0`, `$1`, ... and the invalid `$name` forms are
                    // all lexed as identifiers; the resolver validates them.
                    self.lex_ident(pos, '$');
                }
                'r' => {
                    // A raw string prefix only when immediately followed by a
                    // quote character; otherwise an ordinary identifier.
                    if let Some(open) = self.peek_char().filter(|&c| closing_quote(c).is_some()) {
                        self.chars.next();
                        self.lex_string(pos, open, true)?;
                    } else {
                        self.lex_ident(pos, 'r');
                    }
                }
                c if closing_quote(c).is_some() => self.lex_string(pos, c, false)?,
                c if c.is_ascii_digit() => {
                    // lex_number re-reads from `pos`; it needs the first digit
                    // accounted for even when it is the only one.
                    self.lex_number_first(pos, c)?;
                }
                c if c.is_alphabetic() || c == '_' => self.lex_ident(pos, c),
                other => {
                    return Err(CompileError::new(CompileErrorKind::Tokenizer { ch: other }, pos));
                }
            }
        }
        let end = self.src.len();
        self.push(TokenKind::Eof, end);
        Ok(self.tokens)
    }

    fn lex_number_first(&mut self, start: usize, _first: char) -> CompileResult<()> {
        self.lex_number(start)
    }
}

/// Tokenizes `src`, returning the token list terminated by `Eof`.
pub fn tokenize(src: &str) -> CompileResult<Vec<Token>> {
    Lexer::new(src).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn operators_disambiguate() {
        assert_eq!(
            kinds("a -> b - c -= d"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Arrow,
                TokenKind::Ident("b".into()),
                TokenKind::Minus,
                TokenKind::Ident("c".into()),
                TokenKind::MinusAssign,
                TokenKind::Ident("d".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("= == ! != < <="),
            vec![
                TokenKind::Assign,
                TokenKind::Eq,
                TokenKind::Not,
                TokenKind::Ne,
                TokenKind::Lt,
                TokenKind::Le,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_split_on_dot() {
        assert_eq!(
            kinds("1.5 2.string 42"),
            vec![
                TokenKind::Float(1.5),
                TokenKind::Int(2),
                TokenKind::Dot,
                TokenKind::Ident("string".into()),
                TokenKind::Int(42),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn strings_and_raw_strings() {
        assert_eq!(
            kinds(r#""a\nb" 'c' r"d\ne""#),
            vec![
                TokenKind::Str("a\nb".into()),
                TokenKind::Str("c".into()),
                TokenKind::Str("d\\ne".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn typographic_quotes() {
        assert_eq!(
            kinds("\u{201c}水多少啦\u{201d}"),
            vec![TokenKind::Str("水多少啦".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn comments_and_separators() {
        assert_eq!(
            kinds("a // trailing\nb # rest\nc; d"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::NewLine,
                TokenKind::Ident("b".into()),
                TokenKind::NewLine,
                TokenKind::Ident("c".into()),
                TokenKind::NewLine,
                TokenKind::Ident("d".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn dollar_identifiers() {
        assert_eq!(
            kinds("$ $0 $12"),
            vec![
                TokenKind::Ident("$".into()),
                TokenKind::Ident("$0".into()),
                TokenKind::Ident("$12".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn bad_operator_prefix_fails() {
        let err = tokenize("a & b").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Tokenizer { ch: '&' });
        assert_eq!(err.pos, 2);
    }

    #[test]
    fn unterminated_string_is_eof() {
        assert!(tokenize("\"abc").unwrap_err().is_unexpected_eof());
    }
}
