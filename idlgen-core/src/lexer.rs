//! Lexer for the interface description language.

use crate::error::Error;

/// Kind of a token produced by the lexer.
///
/// The lexer recognizes structural keywords and punctuation only;
/// primitive type names (`int`, `string`, ...) stay plain identifiers
/// and are interpreted during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,

    Ident,
    IntLiteral,

    LParen,  // (
    RParen,  // )
    LBrace,  // {
    RBrace,  // }
    Comma,   // ,
    Semi,    // ;
    Star,    // *
    Amp,     // &
    Lt,      // <
    Gt,      // >
    Equal,   // =
    Minus,   // -
    Arrow,   // ->

    Namespace,
    Struct,
    Enum,
    Callback,
    Interface,
    Const,
    Vector,
    Void,
}

/// A single token with its kind and position.
///
/// `text_start` / `text_end` are byte offsets into the original source
/// string, so higher layers can retrieve the concrete text when needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based source position of the first byte of the token.
    pub line: u32,
    pub column: u32,
    pub text_start: u32,
    pub text_end: u32,
}

impl Token {
    pub fn text<'src>(&self, source: &'src str) -> &'src str {
        &source[self.text_start as usize..self.text_end as usize]
    }
}

/// Lex a source string into tokens, ending with an `Eof` token.
///
/// Fails on the first character that cannot start a token; comments
/// (`//` and `/* */`) and whitespace are skipped.
pub fn lex(source: &str) -> Result<Vec<Token>, Error> {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        index: 0,
        line: 1,
        column: 1,
    };
    lexer.run()
}

struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    index: usize,
    line: u32,
    column: u32,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> Result<Vec<Token>, Error> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            if is_whitespace(ch) {
                self.bump();
                continue;
            }
            if ch == b'/' {
                match self.peek_next() {
                    Some(b'/') => {
                        self.skip_line_comment();
                        continue;
                    }
                    Some(b'*') => {
                        self.skip_block_comment()?;
                        continue;
                    }
                    _ => {
                        return Err(Error::syntax(self.line, self.column, "unexpected character '/'"));
                    }
                }
            }

            let (line, column) = (self.line, self.column);
            let start = self.index as u32;
            let kind = match ch {
                b'(' => self.punct(TokenKind::LParen),
                b')' => self.punct(TokenKind::RParen),
                b'{' => self.punct(TokenKind::LBrace),
                b'}' => self.punct(TokenKind::RBrace),
                b',' => self.punct(TokenKind::Comma),
                b';' => self.punct(TokenKind::Semi),
                b'*' => self.punct(TokenKind::Star),
                b'&' => self.punct(TokenKind::Amp),
                b'<' => self.punct(TokenKind::Lt),
                b'>' => self.punct(TokenKind::Gt),
                b'=' => self.punct(TokenKind::Equal),
                b'-' => {
                    self.bump();
                    if self.peek() == Some(b'>') {
                        self.bump();
                        TokenKind::Arrow
                    } else {
                        TokenKind::Minus
                    }
                }
                b'0'..=b'9' => self.lex_number(),
                _ if is_ident_start(ch) => self.lex_ident_or_keyword(start),
                _ => {
                    return Err(Error::syntax(
                        line,
                        column,
                        format!("unexpected character '{}'", ch as char),
                    ));
                }
            };

            tokens.push(Token {
                kind,
                line,
                column,
                text_start: start,
                text_end: self.index as u32,
            });
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            line: self.line,
            column: self.column,
            text_start: self.index as u32,
            text_end: self.index as u32,
        });
        Ok(tokens)
    }

    fn punct(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn lex_number(&mut self) -> TokenKind {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
        TokenKind::IntLiteral
    }

    fn lex_ident_or_keyword(&mut self, start: u32) -> TokenKind {
        while let Some(ch) = self.peek() {
            if is_ident_continue(ch) {
                self.bump();
            } else {
                break;
            }
        }
        match &self.source[start as usize..self.index] {
            "namespace" => TokenKind::Namespace,
            "struct" => TokenKind::Struct,
            "enum" => TokenKind::Enum,
            "callback" => TokenKind::Callback,
            "interface" => TokenKind::Interface,
            "const" => TokenKind::Const,
            "vector" => TokenKind::Vector,
            "void" => TokenKind::Void,
            _ => TokenKind::Ident,
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == b'\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), Error> {
        let (line, column) = (self.line, self.column);
        self.bump(); // '/'
        self.bump(); // '*'
        while let Some(ch) = self.peek() {
            if ch == b'*' && self.peek_next() == Some(b'/') {
                self.bump();
                self.bump();
                return Ok(());
            }
            self.bump();
        }
        Err(Error::syntax(line, column, "unterminated block comment"))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.bytes.get(self.index + 1).copied()
    }

    fn bump(&mut self) {
        if let Some(ch) = self.peek() {
            self.index += 1;
            if ch == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lex")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_struct_declaration() {
        assert_eq!(
            kinds("struct Point { int x; }"),
            vec![
                TokenKind::Struct,
                TokenKind::Ident,
                TokenKind::LBrace,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Semi,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_arrow_and_minus() {
        assert_eq!(
            kinds("-> - 3"),
            vec![
                TokenKind::Arrow,
                TokenKind::Minus,
                TokenKind::IntLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments() {
        let tokens = lex("// line\n/* block\nspanning */ namespace").expect("lex");
        assert_eq!(tokens[0].kind, TokenKind::Namespace);
        assert_eq!(tokens[0].line, 3);
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = lex("enum Color {\n    Red = 1\n}").expect("lex");
        let red = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Ident && t.text("enum Color {\n    Red = 1\n}") == "Red")
            .expect("Red token");
        assert_eq!((red.line, red.column), (2, 5));
    }

    #[test]
    fn rejects_stray_character() {
        let err = lex("struct $").unwrap_err();
        assert!(matches!(err, Error::Syntax { line: 1, column: 8, .. }));
    }

    #[test]
    fn rejects_unterminated_block_comment() {
        let err = lex("/* open").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }
}
