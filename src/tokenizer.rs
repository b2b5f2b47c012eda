use std::{fmt, iter::Peekable};

use crate::token::{Token, TokenKind, KEYWORDS, SYMBOLS};

pub const SUGGESTED_TOKENS_CAPACITY: usize = 1_024;

/// An ordered, immutable sequence of classified tokens with a movable cursor.
///
/// The cursor only moves forward, except through [`Tokenizer::pointer_back`]
/// and [`Tokenizer::backtrack`], which undo lookahead by a known number of
/// steps. Tokens themselves are produced once, at construction, and never
/// mutated.
pub struct Tokenizer {
    tokens: Vec<Token>,
    cursor: usize,
}

impl Tokenizer {
    /// Scans the whole source up front. Fails on the first unrecognized
    /// character sequence.
    pub fn new(src: &str) -> Result<Tokenizer, Error> {
        let tokens = Scanner::new(src).scan()?;
        Ok(Tokenizer { tokens, cursor: 0 })
    }

    pub fn has_more_tokens(&self) -> bool {
        self.cursor < self.tokens.len()
    }

    /// Returns the next token and moves the cursor past it. `None` when the
    /// sequence is exhausted.
    pub fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(token)
    }

    /// Moves the cursor back exactly one position.
    pub fn pointer_back(&mut self) {
        self.backtrack(1);
    }

    /// Moves the cursor back `n` positions, undoing the last `n` advances.
    /// This is the only sanctioned way to give back more than one token of
    /// lookahead (the term disambiguation gives back two).
    pub fn backtrack(&mut self, n: usize) {
        debug_assert!(self.cursor >= n, "backtrack past the first token");
        self.cursor -= n;
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

/// Walks the raw characters, skipping whitespace and comments, and classifies
/// each maximal match in priority order: keyword, symbol, integer constant,
/// string constant, identifier.
struct Scanner<'src> {
    iter: Peekable<std::str::Chars<'src>>,
    tokens: Vec<Token>,
}

impl Scanner<'_> {
    fn new(src: &str) -> Scanner<'_> {
        Scanner {
            iter: src.chars().peekable(),
            tokens: Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY),
        }
    }

    fn scan(mut self) -> Result<Vec<Token>, Error> {
        while let Some(c) = self.iter.next() {
            match c {
                c if c.is_ascii_whitespace() => (),
                '/' => match self.iter.peek() {
                    Some('/') => self.line_comment(),
                    Some('*') => {
                        // An unterminated block comment swallows the rest of
                        // the input rather than erroring out.
                        if !self.block_comment() {
                            break;
                        }
                    }
                    _ => self.produce(TokenKind::Symbol('/'), '/'),
                },
                '"' => self.string()?,
                c if c.is_ascii_digit() => self.number(c),
                c if c.is_ascii_alphabetic() || c == '_' => self.word(c),
                c if SYMBOLS.contains(&c) => self.produce(TokenKind::Symbol(c), c),
                c => return Err(Error::UnknownChar(c)),
            }
        }
        Ok(self.tokens)
    }

    fn line_comment(&mut self) {
        for c in self.iter.by_ref() {
            if c == '\n' {
                break;
            }
        }
    }

    /// Consumes up to and including the closing `*/`. Returns false if the
    /// input ran out first.
    fn block_comment(&mut self) -> bool {
        self.iter.next(); // the '*' that opened the comment
        loop {
            match self.iter.next() {
                Some('*') => {
                    if self.iter.peek() == Some(&'/') {
                        self.iter.next();
                        return true;
                    }
                }
                Some(_) => (),
                None => return false,
            }
        }
    }

    /// A string constant runs to the closing quote and may not contain a
    /// line break. The token text keeps the quotes.
    fn string(&mut self) -> Result<(), Error> {
        let mut text = String::from('"');
        loop {
            match self.iter.next() {
                Some('"') => break,
                Some('\n') | None => return Err(Error::UnclosedString),
                Some(c) => text.push(c),
            }
        }
        text.push('"');
        self.tokens.push(Token::new(TokenKind::StrConst, text));
        Ok(())
    }

    fn number(&mut self, first: char) {
        let mut text = String::from(first);
        while let Some(&c) = self.iter.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            text.push(c);
            self.iter.next();
        }
        self.tokens.push(Token::new(TokenKind::IntConst, text));
    }

    /// A word is a keyword when its full spelling is in the keyword table,
    /// an identifier otherwise. Keywords always win over identically-spelled
    /// identifiers.
    fn word(&mut self, first: char) {
        let mut text = String::from(first);
        while let Some(&c) = self.iter.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            text.push(c);
            self.iter.next();
        }
        let kind = match KEYWORDS.get(text.as_str()) {
            Some(&keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Identifier,
        };
        self.tokens.push(Token::new(kind, text));
    }

    fn produce(&mut self, kind: TokenKind, c: char) {
        self.tokens.push(Token::new(kind, c.to_string()));
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    UnknownChar(char),
    UnclosedString,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownChar(c) => write!(f, "unrecognized character {c:?}"),
            Error::UnclosedString => write!(f, "unclosed string constant"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::token::Keyword;

    fn lex(src: &str) -> Vec<Token> {
        match Tokenizer::new(src) {
            Ok(tokens) => tokens.tokens().to_vec(),
            Err(error) => panic!("failed to tokenize: {error}"),
        }
    }

    #[track_caller]
    fn lex_err(src: &str) -> Error {
        match Tokenizer::new(src) {
            Ok(_) => panic!("expected a lexical error"),
            Err(error) => error,
        }
    }

    fn keyword(k: Keyword, text: &str) -> Token {
        Token::new(TokenKind::Keyword(k), text)
    }

    fn symbol(c: char) -> Token {
        Token::new(TokenKind::Symbol(c), c.to_string())
    }

    fn ident(text: &str) -> Token {
        Token::new(TokenKind::Identifier, text)
    }

    #[test]
    fn classifies_a_declaration() {
        assert_eq!(
            lex("let x = 10;"),
            vec![
                keyword(Keyword::Let, "let"),
                ident("x"),
                symbol('='),
                Token::new(TokenKind::IntConst, "10"),
                symbol(';'),
            ]
        );
    }

    #[test]
    fn keywords_beat_identifiers() {
        assert_eq!(
            lex("class classes classX"),
            vec![
                keyword(Keyword::Class, "class"),
                ident("classes"),
                ident("classX"),
            ]
        );
    }

    #[test]
    fn string_constants_keep_quotes() {
        let tokens = lex("\"a b\" \"\"");
        assert_eq!(
            tokens,
            vec![
                Token::new(TokenKind::StrConst, "\"a b\""),
                Token::new(TokenKind::StrConst, "\"\""),
            ]
        );
        assert_eq!(tokens[0].string_val(), Some("a b"));
        assert_eq!(tokens[1].string_val(), Some(""));
    }

    #[test]
    fn strips_line_comments() {
        assert_eq!(
            lex("let // the rest is gone\nx"),
            vec![keyword(Keyword::Let, "let"), ident("x")]
        );
        assert_eq!(lex("// only a comment"), vec![]);
    }

    #[test]
    fn strips_block_comments() {
        assert_eq!(
            lex("a /* one\n two */ b /** doc */ c"),
            vec![ident("a"), ident("b"), ident("c")]
        );
    }

    #[test]
    fn unterminated_block_comment_drops_the_remainder() {
        assert_eq!(
            lex("let x /* everything from here on is discarded ;"),
            vec![keyword(Keyword::Let, "let"), ident("x")]
        );
    }

    #[test]
    fn slash_is_still_an_operator() {
        assert_eq!(
            lex("a / b"),
            vec![ident("a"), symbol('/'), ident("b")]
        );
    }

    #[test]
    fn unknown_character_is_fatal() {
        assert_eq!(lex_err("let $x;"), Error::UnknownChar('$'));
    }

    #[test]
    fn unclosed_string_is_fatal() {
        assert_eq!(lex_err("\"abc"), Error::UnclosedString);
        assert_eq!(lex_err("\"line\nbreak\""), Error::UnclosedString);
    }

    #[test]
    fn cursor_and_pushback() {
        let mut tokens = Tokenizer::new("a b c").unwrap();
        assert!(tokens.has_more_tokens());
        assert_eq!(tokens.advance().unwrap().text(), "a");
        assert_eq!(tokens.advance().unwrap().text(), "b");
        tokens.pointer_back();
        assert_eq!(tokens.advance().unwrap().text(), "b");
        assert_eq!(tokens.advance().unwrap().text(), "c");
        tokens.backtrack(2);
        assert_eq!(tokens.advance().unwrap().text(), "b");
        assert_eq!(tokens.advance().unwrap().text(), "c");
        assert!(!tokens.has_more_tokens());
        assert_eq!(tokens.advance(), None);
    }

    #[test]
    fn retokenizing_joined_token_texts_is_equivalent() {
        let src = "class Main { function void main() { do Output.printString(\"ok, fine\"); return; } }";
        let first = lex(src);
        let joined = first
            .iter()
            .map(Token::text)
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(lex(&joined), first);
    }
}
