use crate::error::RuntimeError;
use crate::lexer::tokenize_fragment;
use crate::token::{Token, TokenKind};

/// Result of evaluating an expression. Values cross the symbol-table
/// boundary as strings; `Raw` operands are coerced lazily at calculation
/// time.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    /// Numeric strings count as numbers here, so a condition like `while x`
    /// with `x` holding `"0"` is false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => match s.trim().parse::<f64>() {
                Ok(n) => n != 0.0,
                Err(_) => !s.is_empty(),
            },
        }
    }

    /// String form stored into symbol tables and echoed to output. Integral
    /// numbers print without a fractional part.
    pub fn to_output(&self) -> String {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                format!("{}", *n as i64)
            }
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.clone(),
        }
    }
}

/// Operand stack slot: either raw token text or an already-computed value.
#[derive(Debug, Clone)]
enum Operand {
    Raw(String),
    Computed(Value),
}

/// Coerced form used by `calculate`.
enum Cleaned {
    Num(f64),
    Str(String),
    Bool(bool),
}

impl Cleaned {
    fn as_number(&self) -> Option<f64> {
        match self {
            Cleaned::Num(n) => Some(*n),
            Cleaned::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Cleaned::Str(_) => None,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Cleaned::Num(n) => *n != 0.0,
            Cleaned::Bool(b) => *b,
            Cleaned::Str(s) => !s.is_empty(),
        }
    }
}

/// Evaluates a flat arithmetic/logical/string expression.
///
/// This is a two-stack left-to-right scan, not a precedence parser:
/// operators fold only at a closing parenthesis or at end of scan, where the
/// operator stack drains in reverse push order. Unparenthesized chains
/// therefore fold right-to-left; precedence is honored only through explicit
/// parentheses. That folding order is part of the language's observable
/// behavior and is covered by tests below.
pub fn evaluate(expression: &str) -> Result<Value, RuntimeError> {
    if expression.trim().is_empty() {
        return Ok(Value::Bool(false));
    }

    let tokens: Vec<Token> = tokenize_fragment(expression)
        .into_iter()
        .filter(|token| token.kind != TokenKind::Space)
        .collect();

    // A single token is returned unevaluated so callers can tell a bare
    // identifier or literal apart from a computed result.
    if tokens.len() == 1 {
        return Ok(Value::Str(expression.trim().to_string()));
    }

    evaluate_tokens(&tokens).map_err(|_| RuntimeError::ExpressionEvaluation {
        expression: expression.to_string(),
    })
}

fn evaluate_tokens(tokens: &[Token]) -> Result<Value, String> {
    let mut values: Vec<Operand> = Vec::new();
    let mut operators: Vec<String> = Vec::new();
    let mut result = None;

    for token in tokens {
        if token.kind.is_operator() {
            operators.push(token.text.clone());
            continue;
        }
        match token.kind {
            TokenKind::LParen => {}
            TokenKind::RParen => {
                let right = values.pop().ok_or("operand stack underflow")?;
                let left = values.pop().ok_or("operand stack underflow")?;
                let operator = operators.pop().ok_or("operator stack underflow")?;
                let value = calculate(left, right, &operator)?;
                result = Some(value.clone());
                values.push(Operand::Computed(value));
            }
            TokenKind::Number | TokenKind::String | TokenKind::Identifier => {
                values.push(Operand::Raw(token.text.clone()));
            }
            _ => {}
        }
    }

    while let Some(operator) = operators.pop() {
        let right = values.pop().ok_or("operand stack underflow")?;
        let left = values.pop().ok_or("operand stack underflow")?;
        let value = calculate(left, right, &operator)?;
        result = Some(value.clone());
        values.push(Operand::Computed(value));
    }

    result.ok_or_else(|| "nothing to evaluate".to_string())
}

fn clean(operand: Operand) -> Cleaned {
    match operand {
        Operand::Computed(Value::Number(n)) => Cleaned::Num(n),
        Operand::Computed(Value::Bool(b)) => Cleaned::Bool(b),
        Operand::Computed(Value::Str(s)) => Cleaned::Str(s),
        Operand::Raw(text) => match text.parse::<f64>() {
            Ok(n) => Cleaned::Num(n),
            Err(_) => Cleaned::Str(strip_quotes(&text)),
        },
    }
}

fn calculate(left: Operand, right: Operand, operator: &str) -> Result<Value, String> {
    let left = clean(left);
    let right = clean(right);

    match operator {
        "+" | "-" | "*" | "/" | "%" | "^" => {
            let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
                return Err(format!("arithmetic '{operator}' on non-numeric operand"));
            };
            let value = match operator {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                "/" => {
                    if b == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    a / b
                }
                "%" => {
                    if b == 0.0 {
                        return Err("modulo by zero".to_string());
                    }
                    a - b * (a / b).floor()
                }
                // Bitwise xor over the integer parts.
                _ => ((a as i64) ^ (b as i64)) as f64,
            };
            Ok(Value::Number(value))
        }
        "&" => Ok(Value::Bool(left.truthy() && right.truthy())),
        "|" => Ok(Value::Bool(left.truthy() || right.truthy())),
        "==" | "!=" | ">" | "<" | ">=" | "<=" => compare(left, right, operator),
        _ => Err(format!("unknown operator '{operator}'")),
    }
}

fn compare(left: Cleaned, right: Cleaned, operator: &str) -> Result<Value, String> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        let value = match operator {
            "==" => a == b,
            "!=" => a != b,
            ">" => a > b,
            "<" => a < b,
            ">=" => a >= b,
            _ => a <= b,
        };
        return Ok(Value::Bool(value));
    }
    match (&left, &right) {
        (Cleaned::Str(a), Cleaned::Str(b)) => {
            let value = match operator {
                "==" => a == b,
                "!=" => a != b,
                ">" => a > b,
                "<" => a < b,
                ">=" => a >= b,
                _ => a <= b,
            };
            Ok(Value::Bool(value))
        }
        // Mixed kinds only support (in)equality.
        _ => match operator {
            "==" => Ok(Value::Bool(false)),
            "!=" => Ok(Value::Bool(true)),
            _ => Err(format!("ordering '{operator}' on mixed operand kinds")),
        },
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

    #[test]
    fn parenthesized_arithmetic() {
        assert_eq!(evaluate("(10 + 2) / 6").unwrap(), Value::Number(2.0));
    }

    #[test]
    fn numeric_comparison_is_falsy() {
        assert_eq!(evaluate("10 > 20").unwrap(), Value::Bool(false));
    }

    #[test]
    fn logical_conjunction_of_groups() {
        assert_eq!(evaluate("(10 > 2) & (20 < 30)").unwrap(), Value::Bool(true));
        assert_eq!(
            evaluate("((7 + 2) > 4) & ((11 % 2) == 1)").unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn string_comparisons() {
        assert_eq!(
            evaluate("\"abcd\" == \"abcd\"").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            evaluate("\"abcde\" != \"abcd\"").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(evaluate("\"abcdx\" > \"abcd\"").unwrap(), Value::Bool(true));
    }

    #[test]
    fn unparenthesized_chains_fold_right_to_left() {
        // Not a bug: without parentheses the operator stack drains in
        // reverse push order, so 10 - 2 - 3 folds as 10 - (2 - 3).
        assert_eq!(evaluate("10 - 2 - 3").unwrap(), Value::Number(11.0));
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), Value::Number(14.0));
    }

    #[test]
    fn single_token_returns_raw_text() {
        assert_eq!(evaluate("42").unwrap(), Value::Str("42".to_string()));
        assert_eq!(evaluate("name").unwrap(), Value::Str("name".to_string()));
    }

    #[test]
    fn empty_expression_is_false() {
        assert_eq!(evaluate("").unwrap(), Value::Bool(false));
        assert_eq!(evaluate("   ").unwrap(), Value::Bool(false));
    }

    #[test]
    fn arithmetic_on_strings_fails() {
        let err = evaluate("\"a\" + \"b\"").expect_err("expected failure");
        assert_eq!(
            err,
            RuntimeError::ExpressionEvaluation {
                expression: "\"a\" + \"b\"".to_string()
            }
        );
    }

    #[test]
    fn division_by_zero_fails() {
        assert!(evaluate("10 / 0").is_err());
        assert!(evaluate("10 % 0").is_err());
    }

    #[test]
    fn modulo_arithmetic() {
        assert_eq!(evaluate("11 % 2").unwrap(), Value::Number(1.0));
        assert_eq!(evaluate("0 - 7 % 3").unwrap(), Value::Number(-1.0));
    }

    #[test]
    fn truthiness_of_numeric_strings() {
        assert!(!Value::Str("0".to_string()).is_truthy());
        assert!(Value::Str("3".to_string()).is_truthy());
        assert!(Value::Str("text".to_string()).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
    }

    #[test]
    fn integral_numbers_print_without_fraction() {
        assert_eq!(Value::Number(2.0).to_output(), "2");
        assert_eq!(Value::Number(2.5).to_output(), "2.5");
    }
}
