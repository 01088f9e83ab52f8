use std::{iter::Peekable, str::CharIndices};

use anyhow::{Result, bail};

use crate::token::{Token, TokenKind};

/// Hand-written lexer with two modes.
///
/// Code mode (`tokenize`) is strict: it skips whitespace and comments, keeps
/// newlines as statement separators and fails on anything it does not
/// recognize. Fragment mode (`tokenize_fragment`) is what the executor and
/// the expression evaluator use to re-scan substrings at run time: it never
/// fails, keeps whitespace, keeps unknown characters verbatim and recognizes
/// `{name}` placeholders.
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    fragment: bool,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    Lexer::new(input, false).run()
}

pub fn tokenize_fragment(input: &str) -> Vec<Token> {
    Lexer::new(input, true)
        .run()
        .expect("fragment lexing is infallible")
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str, fragment: bool) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            line: 1,
            fragment,
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(&(idx, ch)) = self.chars.peek() {
            match ch {
                '\n' => {
                    self.chars.next();
                    if self.fragment {
                        tokens.push(Token::new(TokenKind::Space, "\n", self.line));
                    } else {
                        tokens.push(Token::new(TokenKind::Newline, "\n", self.line));
                    }
                    self.line += 1;
                }
                c if c.is_whitespace() => {
                    self.chars.next();
                    if self.fragment {
                        tokens.push(Token::new(TokenKind::Space, c.to_string(), self.line));
                    }
                }
                '/' if !self.fragment && self.peek_second() == Some('/') => {
                    self.skip_line_comment();
                }
                '/' if !self.fragment && self.peek_second() == Some('*') => {
                    self.skip_block_comment()?;
                }
                '"' => {
                    if let Some(token) = self.read_string(idx) {
                        tokens.push(token);
                    } else if self.fragment {
                        // Unterminated quote in an echo fragment stays as-is.
                        self.chars.next();
                        tokens.push(Token::new(TokenKind::Unknown, "\"", self.line));
                    } else {
                        bail!("Unterminated string literal at line {}", self.line);
                    }
                }
                '{' if self.fragment => {
                    tokens.push(self.read_placeholder(idx));
                }
                c if c.is_alphabetic() || c == '_' || c == '$' => {
                    tokens.push(self.read_identifier(idx));
                }
                c if c.is_ascii_digit() => {
                    tokens.push(self.read_number(idx));
                }
                _ => {
                    if let Some(token) = self.read_operator(ch) {
                        tokens.push(token);
                    } else if self.fragment {
                        self.chars.next();
                        tokens.push(Token::new(TokenKind::Unknown, ch.to_string(), self.line));
                    } else {
                        bail!("Unexpected character '{ch}' at line {}", self.line);
                    }
                }
            }
        }
        Ok(tokens)
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().map(|(_, c)| c)
    }

    fn skip_line_comment(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.chars.next();
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        let opened_at = self.line;
        self.chars.next();
        self.chars.next();
        let mut last = '\0';
        for (_, c) in self.chars.by_ref() {
            if c == '\n' {
                self.line += 1;
            }
            if last == '*' && c == '/' {
                return Ok(());
            }
            last = c;
        }
        bail!("Unterminated block comment opened at line {opened_at}");
    }

    fn read_identifier(&mut self, start: usize) -> Token {
        self.chars.next();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                self.chars.next();
            } else {
                break;
            }
        }
        let text = &self.input[start..self.current_index()];
        let kind = if self.fragment {
            // Fragment scans substitute identifiers only; keywords would be
            // indistinguishable from variable names inside an echo string.
            TokenKind::Identifier
        } else {
            match text {
                "if" => TokenKind::If,
                "elif" => TokenKind::Elif,
                "else" => TokenKind::Else,
                "fi" => TokenKind::Fi,
                "while" => TokenKind::While,
                "endwhile" => TokenKind::EndWhile,
                "for" => TokenKind::For,
                "endfor" => TokenKind::EndFor,
                "break" => TokenKind::Break,
                "continue" => TokenKind::Continue,
                "echo" => TokenKind::Echo,
                "input" => TokenKind::Input,
                _ => TokenKind::Identifier,
            }
        };
        Token::new(kind, text, self.line)
    }

    fn read_number(&mut self, start: usize) -> Token {
        self.chars.next();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                self.chars.next();
            } else {
                break;
            }
        }
        // Optional fractional part, only when a digit follows the dot.
        if let Some(&(_, '.')) = self.chars.peek()
            && self.peek_second().is_some_and(|c| c.is_ascii_digit())
        {
            self.chars.next();
            while let Some(&(_, c)) = self.chars.peek() {
                if c.is_ascii_digit() {
                    self.chars.next();
                } else {
                    break;
                }
            }
        }
        Token::new(TokenKind::Number, &self.input[start..self.current_index()], self.line)
    }

    fn read_string(&mut self, start: usize) -> Option<Token> {
        let mut ahead = self.chars.clone();
        ahead.next(); // opening quote
        for (idx, c) in ahead {
            if c == '\n' {
                return None;
            }
            if c == '"' {
                let text = &self.input[start..=idx];
                while self
                    .chars
                    .peek()
                    .is_some_and(|&(consumed, _)| consumed <= idx)
                {
                    self.chars.next();
                }
                return Some(Token::new(TokenKind::String, text, self.line));
            }
        }
        None
    }

    fn read_placeholder(&mut self, start: usize) -> Token {
        let mut ahead = self.chars.clone();
        ahead.next(); // opening brace
        for (idx, c) in ahead {
            if c == '}' {
                let name = &self.input[start + 1..idx];
                while self
                    .chars
                    .peek()
                    .is_some_and(|&(consumed, _)| consumed <= idx)
                {
                    self.chars.next();
                }
                return Token::new(TokenKind::BracedIdentifier, name, self.line);
            }
        }
        // No closing brace on this fragment: keep the brace verbatim.
        self.chars.next();
        Token::new(TokenKind::Unknown, "{", self.line)
    }

    fn read_operator(&mut self, first: char) -> Option<Token> {
        let second = self.peek_second();
        let two = |kind, text: &str, lexer: &mut Self| {
            lexer.chars.next();
            lexer.chars.next();
            Some(Token::new(kind, text, lexer.line))
        };
        match (first, second) {
            ('=', Some('=')) => two(TokenKind::Equivalent, "==", self),
            ('!', Some('=')) => two(TokenKind::NotEquivalent, "!=", self),
            ('>', Some('=')) => two(TokenKind::GreaterEqual, ">=", self),
            ('<', Some('=')) => two(TokenKind::LessEqual, "<=", self),
            ('+', Some('=')) => two(TokenKind::PlusEqual, "+=", self),
            ('-', Some('=')) => two(TokenKind::MinusEqual, "-=", self),
            ('*', Some('=')) => two(TokenKind::StarEqual, "*=", self),
            ('/', Some('=')) => two(TokenKind::SlashEqual, "/=", self),
            _ => {
                let kind = match first {
                    '=' => TokenKind::Equal,
                    '>' => TokenKind::Greater,
                    '<' => TokenKind::Less,
                    '+' => TokenKind::Plus,
                    '-' => TokenKind::Minus,
                    '*' => TokenKind::Star,
                    '/' => TokenKind::Slash,
                    '%' => TokenKind::Percent,
                    '^' => TokenKind::Caret,
                    '&' => TokenKind::Ampersand,
                    '|' => TokenKind::Pipe,
                    '!' => TokenKind::Bang,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    ';' => TokenKind::Semicolon,
                    _ => return None,
                };
                self.chars.next();
                Some(Token::new(kind, first.to_string(), self.line))
            }
        }
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(idx, _)| idx)
            .unwrap_or(self.input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|token| token.kind).collect()
    }

    #[test]
    fn tokenizes_statements_with_line_numbers() {
        let input = indoc! {r#"
            x = 10
            if (x == 10)
                echo "ten"
            fi
        "#};
        let tokens = tokenize(input).expect("tokenize should succeed");
        let expected = vec![
            TokenKind::Identifier,
            TokenKind::Equal,
            TokenKind::Number,
            TokenKind::Newline,
            TokenKind::If,
            TokenKind::LParen,
            TokenKind::Identifier,
            TokenKind::Equivalent,
            TokenKind::Number,
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::Echo,
            TokenKind::String,
            TokenKind::Newline,
            TokenKind::Fi,
            TokenKind::Newline,
        ];
        assert_eq!(kinds(&tokens), expected);
        assert_eq!(tokens[4].line, 2);
        assert_eq!(tokens[14].line, 4);
    }

    #[test]
    fn keeps_string_quotes_in_matched_text() {
        let tokens = tokenize("echo \"hello\"\n").expect("tokenize should succeed");
        assert_eq!(tokens[1].text, "\"hello\"");
    }

    #[test]
    fn skips_line_and_block_comments() {
        let input = indoc! {r#"
            // leading comment
            x = 1 /* trailing */
            y = 2
        "#};
        let tokens = tokenize(input).expect("tokenize should succeed");
        let idents: Vec<&str> = tokens
            .iter()
            .filter(|token| token.kind == TokenKind::Identifier)
            .map(|token| token.text.as_str())
            .collect();
        assert_eq!(idents, vec!["x", "y"]);
        // tokens[0] is the newline ending the comment line; 'x' follows.
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[1].text, "x");
    }

    #[test]
    fn errors_on_unknown_character_in_code_mode() {
        let err = tokenize("x = 1 @ 2\n").expect_err("expected lexing failure");
        assert!(err.to_string().contains("Unexpected character '@'"));
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("echo \"oops\n").expect_err("expected lexing failure");
        assert!(err.to_string().contains("Unterminated string literal"));
    }

    #[test]
    fn fragment_mode_keeps_spaces_placeholders_and_unknowns() {
        let tokens = tokenize_fragment("total: {sum}!");
        let expected = vec![
            (TokenKind::Identifier, "total"),
            (TokenKind::Unknown, ":"),
            (TokenKind::Space, " "),
            (TokenKind::BracedIdentifier, "sum"),
            (TokenKind::Bang, "!"),
        ];
        let actual: Vec<(TokenKind, &str)> = tokens
            .iter()
            .map(|token| (token.kind, token.text.as_str()))
            .collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn fragment_mode_never_maps_keywords() {
        let tokens = tokenize_fragment("for example");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text, "for");
    }
}
