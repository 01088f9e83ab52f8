use crate::ast::{AssignOp, Statement};
use crate::error::SyntaxError;
use crate::lexer::tokenize_fragment;
use crate::token::{Token, TokenKind};

/// Groups a token sequence into one flat list of statement records, one per
/// logical line. Block openers and closers stay flat; the tree builder
/// reconstructs nesting afterwards.
pub struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
}

pub fn parse(tokens: &[Token]) -> Result<Vec<Statement>, SyntaxError> {
    Parser::new(tokens).parse_statements()
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn parse_statements(&mut self) -> Result<Vec<Statement>, SyntaxError> {
        let mut statements = Vec::new();
        while let Some(token) = self.current() {
            let line = token.line;
            match token.kind {
                TokenKind::Newline => {
                    self.advance();
                    continue;
                }
                TokenKind::Echo => {
                    self.advance();
                    let text = self.expect_string()?;
                    statements.push(Statement::Echo { text, line });
                }
                TokenKind::Input => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    statements.push(Statement::Input { name, line });
                }
                TokenKind::Identifier => {
                    statements.push(self.parse_assignment()?);
                }
                TokenKind::If => {
                    self.advance();
                    let condition = self.collect_condition("if")?;
                    statements.push(Statement::If { condition, line });
                }
                TokenKind::Elif => {
                    self.advance();
                    let condition = self.collect_condition("elif")?;
                    statements.push(Statement::ElseIf { condition, line });
                }
                TokenKind::While => {
                    self.advance();
                    let condition = self.collect_condition("while")?;
                    statements.push(Statement::While { condition, line });
                }
                TokenKind::For => {
                    self.advance();
                    statements.push(self.parse_for_header(line)?);
                }
                TokenKind::Else => {
                    self.advance();
                    statements.push(Statement::Else { line });
                }
                TokenKind::Fi => {
                    self.advance();
                    statements.push(Statement::EndIf { line });
                }
                TokenKind::EndWhile => {
                    self.advance();
                    statements.push(Statement::EndWhile { line });
                }
                TokenKind::EndFor => {
                    self.advance();
                    statements.push(Statement::EndFor { line });
                }
                TokenKind::Break => {
                    self.advance();
                    statements.push(Statement::Break { line });
                }
                TokenKind::Continue => {
                    self.advance();
                    statements.push(Statement::Continue { line });
                }
                _ => {
                    return Err(SyntaxError::new(
                        line,
                        format!("Unexpected token '{}'", token.text),
                    ));
                }
            }
            self.expect_end_of_statement()?;
        }
        Ok(statements)
    }

    /// `name op expr` where op is one of `=`, `+=`, `-=`, `*=`, `/=`.
    fn parse_assignment(&mut self) -> Result<Statement, SyntaxError> {
        let name_token = self.current().expect("caller checked an identifier");
        let line = name_token.line;
        let name = name_token.text.clone();
        self.advance();

        let op = match self.current() {
            Some(token) if token.kind.is_assignment_op() => {
                let op = assign_op(token.kind).expect("checked assignment op");
                self.advance();
                op
            }
            _ => {
                return Err(SyntaxError::new(
                    line,
                    format!("Expected assignment operator after '{name}'"),
                ));
            }
        };

        let expr = self.collect_until_newline();
        if expr.is_empty() {
            return Err(SyntaxError::new(
                line,
                format!("Missing expression after '{name} {}'", op.symbol()),
            ));
        }
        Ok(Statement::Assign {
            name,
            op,
            expr,
            line,
        })
    }

    /// `for (init; cond; increment)` or the quoted form `for "init;cond;increment"`.
    fn parse_for_header(&mut self, line: usize) -> Result<Statement, SyntaxError> {
        let header = self.collect_condition("for")?;
        let header = header
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(&header);

        let parts: Vec<&str> = header.split(';').collect();
        let [init, condition, increment] = parts.as_slice() else {
            return Err(SyntaxError::new(
                line,
                "'for' header must be 'init;condition;increment'",
            ));
        };
        Ok(Statement::For {
            init: init.trim().to_string(),
            condition: condition.trim().to_string(),
            increment: increment.trim().to_string(),
            line,
        })
    }

    /// Collects the raw condition text up to the end of the line. A single
    /// quoted string is unwrapped so `while "x < 10"` and `while x < 10`
    /// produce the same condition.
    fn collect_condition(&mut self, keyword: &str) -> Result<String, SyntaxError> {
        let line = self.previous_line();
        if let Some(token) = self.current()
            && token.kind == TokenKind::String
            && self
                .peek()
                .is_none_or(|next| next.kind == TokenKind::Newline)
        {
            let inner = strip_quotes(&token.text);
            self.advance();
            return Ok(inner);
        }
        let condition = self.collect_until_newline();
        if condition.is_empty() {
            return Err(SyntaxError::new(
                line,
                format!("Missing condition after '{keyword}'"),
            ));
        }
        Ok(condition)
    }

    /// Concatenates the matched text of every token up to the next newline.
    /// Token boundaries keep operators unambiguous when the string is
    /// re-tokenized later.
    fn collect_until_newline(&mut self) -> String {
        let mut text = String::new();
        while let Some(token) = self.current() {
            if token.kind == TokenKind::Newline {
                break;
            }
            text.push_str(&token.text);
            self.advance();
        }
        text
    }

    fn expect_string(&mut self) -> Result<String, SyntaxError> {
        match self.current() {
            Some(token) if token.kind == TokenKind::String => {
                let inner = strip_quotes(&token.text);
                self.advance();
                Ok(inner)
            }
            other => Err(SyntaxError::new(
                other.map(|t| t.line).unwrap_or(self.previous_line()),
                "Expected a string literal",
            )),
        }
    }

    fn expect_identifier(&mut self) -> Result<String, SyntaxError> {
        match self.current() {
            Some(token) if token.kind == TokenKind::Identifier => {
                let name = token.text.clone();
                self.advance();
                Ok(name)
            }
            other => Err(SyntaxError::new(
                other.map(|t| t.line).unwrap_or(self.previous_line()),
                "Expected a variable name",
            )),
        }
    }

    fn expect_end_of_statement(&mut self) -> Result<(), SyntaxError> {
        match self.current() {
            None => Ok(()),
            Some(token) if token.kind == TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            Some(token) => Err(SyntaxError::new(
                token.line,
                format!("Unexpected '{}' after statement", token.text),
            )),
        }
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position + 1)
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn previous_line(&self) -> usize {
        self.position
            .checked_sub(1)
            .and_then(|idx| self.tokens.get(idx))
            .map(|token| token.line)
            .unwrap_or(1)
    }
}

/// Splits an assignment fragment like `i=0` or `i+=1` into its parts. Used
/// by the tree builder to synthesize the init and increment statements of a
/// `for` loop.
pub fn parse_assignment_fragment(
    text: &str,
    line: usize,
) -> Result<(String, AssignOp, String), SyntaxError> {
    let tokens: Vec<Token> = tokenize_fragment(text)
        .into_iter()
        .filter(|token| token.kind != TokenKind::Space)
        .collect();

    let mut iter = tokens.iter();
    let name = match iter.next() {
        Some(token) if token.kind == TokenKind::Identifier => token.text.clone(),
        _ => {
            return Err(SyntaxError::new(
                line,
                format!("Expected a variable name in '{text}'"),
            ));
        }
    };
    let op = iter
        .next()
        .and_then(|token| assign_op(token.kind))
        .ok_or_else(|| {
            SyntaxError::new(line, format!("Expected an assignment operator in '{text}'"))
        })?;
    let expr: String = iter.map(|token| token.text.as_str()).collect();
    if expr.is_empty() {
        return Err(SyntaxError::new(
            line,
            format!("Missing expression in '{text}'"),
        ));
    }
    Ok((name, op, expr))
}

fn assign_op(kind: TokenKind) -> Option<AssignOp> {
    match kind {
        TokenKind::Equal => Some(AssignOp::Set),
        TokenKind::PlusEqual => Some(AssignOp::Add),
        TokenKind::MinusEqual => Some(AssignOp::Sub),
        TokenKind::StarEqual => Some(AssignOp::Mul),
        TokenKind::SlashEqual => Some(AssignOp::Div),
        _ => None,
    }
}

fn strip_quotes(text: &str) -> String {
    text.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(text)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use indoc::indoc;

    fn parse_source(source: &str) -> Vec<Statement> {
        let tokens = tokenize(source).expect("tokenize should succeed");
        parse(&tokens).expect("parse should succeed")
    }

    #[test]
    fn parses_flat_statement_sequence() {
        let source = indoc! {r#"
            x = 10
            if (x == 10)
                echo "ten"
            else
                echo "other"
            fi
        "#};
        let statements = parse_source(source);
        let expected = vec![
            Statement::Assign {
                name: "x".to_string(),
                op: AssignOp::Set,
                expr: "10".to_string(),
                line: 1,
            },
            Statement::If {
                condition: "(x==10)".to_string(),
                line: 2,
            },
            Statement::Echo {
                text: "ten".to_string(),
                line: 3,
            },
            Statement::Else { line: 4 },
            Statement::Echo {
                text: "other".to_string(),
                line: 5,
            },
            Statement::EndIf { line: 6 },
        ];
        assert_eq!(statements, expected);
    }

    #[test]
    fn parses_for_header_with_parentheses() {
        let statements = parse_source("for (i = 0; i < 3; i += 1)\nendfor\n");
        assert_eq!(
            statements[0],
            Statement::For {
                init: "i=0".to_string(),
                condition: "i<3".to_string(),
                increment: "i+=1".to_string(),
                line: 1,
            }
        );
    }

    #[test]
    fn parses_quoted_for_header() {
        let statements = parse_source("for \"i=0;i<10;i=i+1\"\nendfor\n");
        assert_eq!(
            statements[0],
            Statement::For {
                init: "i=0".to_string(),
                condition: "i<10".to_string(),
                increment: "i=i+1".to_string(),
                line: 1,
            }
        );
    }

    #[test]
    fn parses_compound_assignment() {
        let statements = parse_source("total += n * 2\n");
        assert_eq!(
            statements[0],
            Statement::Assign {
                name: "total".to_string(),
                op: AssignOp::Add,
                expr: "n*2".to_string(),
                line: 1,
            }
        );
    }

    #[test]
    fn quoted_while_condition_is_unwrapped() {
        let statements = parse_source("while \"x < 10\"\nendwhile\n");
        assert_eq!(
            statements[0],
            Statement::While {
                condition: "x < 10".to_string(),
                line: 1,
            }
        );
    }

    #[test]
    fn rejects_for_header_without_three_parts() {
        let tokens = tokenize("for (i = 0; i < 3)\n").expect("tokenize should succeed");
        let err = parse(&tokens).expect_err("expected parse failure");
        assert!(err.to_string().contains("init;condition;increment"));
    }

    #[test]
    fn rejects_missing_assignment_operator() {
        let tokens = tokenize("x 10\n").expect("tokenize should succeed");
        let err = parse(&tokens).expect_err("expected parse failure");
        assert!(err.to_string().contains("assignment operator"));
    }

    #[test]
    fn splits_assignment_fragments() {
        let (name, op, expr) =
            parse_assignment_fragment("i += 1", 4).expect("fragment should parse");
        assert_eq!(name, "i");
        assert_eq!(op, AssignOp::Add);
        assert_eq!(expr, "1");
    }
}
