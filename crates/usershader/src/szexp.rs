//! RPN size and condition expressions
//!
//! User shader passes express their output size (`//!WIDTH`, `//!HEIGHT`) and their
//! execution condition (`//!WHEN`) in a miniature reverse-Polish language over numeric
//! constants and the dimensions of named textures (`NAME.w` / `NAME.h`). This module
//! provides the parser and the stack-machine evaluator for that language.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Maximum number of tokens in a single size expression.
///
/// This limit is part of the shader format: documents that exceed it are rejected at
/// parse time, which also bounds the evaluation stack.
pub const MAX_SZEXP_SIZE: usize = 32;

/// Monadic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SizeOp1 {
    /// Logical not: non-zero maps to 0.0, zero maps to 1.0
    Not,
}

/// Dyadic operators, applied as `left op right` (the right operand is popped first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SizeOp2 {
    Add,
    Sub,
    Mul,
    Div,
    /// Strict greater-than, yielding 1.0 or 0.0
    Gt,
    /// Strict less-than, yielding 1.0 or 0.0
    Lt,
}

/// A single expression token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SizeToken {
    /// Push a constant value onto the stack
    Const(f32),
    /// Push the width of the named texture
    VarW(String),
    /// Push the height of the named texture
    VarH(String),
    /// Pop one element and push the result of a monadic operation
    Op1(SizeOp1),
    /// Pop two elements and push the result of a dyadic operation
    Op2(SizeOp2),
}

/// A parsed RPN expression
///
/// Holds at most [`MAX_SZEXP_SIZE`] tokens. A well-formed expression leaves exactly one
/// value on the stack when evaluated; whether an expression is well-formed is only
/// discovered at evaluation time, since variables resolve against the dynamic texture
/// table of the executing hook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeExpr(Vec<SizeToken>);

impl SizeExpr {
    /// Creates an expression consisting of a single constant.
    pub fn constant(value: f32) -> Self {
        Self(vec![SizeToken::Const(value)])
    }

    /// Creates an expression that resolves to the width of the named texture.
    pub fn var_w(name: &str) -> Self {
        Self(vec![SizeToken::VarW(name.to_string())])
    }

    /// Creates an expression that resolves to the height of the named texture.
    pub fn var_h(name: &str) -> Self {
        Self(vec![SizeToken::VarH(name.to_string())])
    }

    /// Returns the parsed token sequence.
    pub fn tokens(&self) -> &[SizeToken] {
        &self.0
    }

    /// Parses one expression line into a token sequence
    ///
    /// Tokens are separated by ASCII spaces; empty tokens are skipped. Each token is,
    /// in order of precedence: a texture dimension variable (`name.w` / `name.width` /
    /// `name.h` / `name.height`), an operator (`+ - * / ! > <`, dispatched on the first
    /// byte), or a float literal (first byte an ASCII digit).
    ///
    /// # Arguments
    /// * `line` - The argument text of a `WIDTH`, `HEIGHT` or `WHEN` directive
    pub fn parse(line: &str) -> Result<Self, ExprParseError> {
        let mut tokens = Vec::new();

        for word in line.split(' ') {
            let word = word.trim();
            if word.is_empty() {
                continue;
            }

            if tokens.len() >= MAX_SZEXP_SIZE {
                return Err(ExprParseError::TooManyTokens);
            }

            if let Some(name) = word.strip_suffix(".w").or_else(|| word.strip_suffix(".width")) {
                tokens.push(SizeToken::VarW(name.to_string()));
                continue;
            }

            if let Some(name) = word.strip_suffix(".h").or_else(|| word.strip_suffix(".height")) {
                tokens.push(SizeToken::VarH(name.to_string()));
                continue;
            }

            let first = word.as_bytes()[0];
            let op = match first {
                b'+' => Some(SizeToken::Op2(SizeOp2::Add)),
                b'-' => Some(SizeToken::Op2(SizeOp2::Sub)),
                b'*' => Some(SizeToken::Op2(SizeOp2::Mul)),
                b'/' => Some(SizeToken::Op2(SizeOp2::Div)),
                b'!' => Some(SizeToken::Op1(SizeOp1::Not)),
                b'>' => Some(SizeToken::Op2(SizeOp2::Gt)),
                b'<' => Some(SizeToken::Op2(SizeOp2::Lt)),
                _ => None,
            };
            if let Some(op) = op {
                tokens.push(op);
                continue;
            }

            if first.is_ascii_digit() {
                let value = word.parse::<f32>().map_err(|_| ExprParseError::BadLiteral(word.to_string()))?;
                tokens.push(SizeToken::Const(value));
                continue;
            }

            return Err(ExprParseError::UnknownToken(word.to_string()));
        }

        Ok(Self(tokens))
    }

    /// Evaluates the expression against a texture dimension lookup
    ///
    /// The lookup resolves a texture name to its `(width, height)` in pixels; returning
    /// `None` fails the evaluation. Dyadic results must stay finite, so e.g. a division
    /// by zero fails rather than propagating an infinity into the output size.
    ///
    /// # Arguments
    /// * `lookup` - Resolves a texture name to its dimensions
    ///
    /// # Returns
    /// The single value left on the stack, or the failure kind.
    pub fn eval<F>(&self, mut lookup: F) -> Result<f32, EvalError>
    where
        F: FnMut(&str) -> Option<(f32, f32)>,
    {
        let mut stack: Vec<f32> = Vec::with_capacity(MAX_SZEXP_SIZE);

        for token in &self.0 {
            match token {
                SizeToken::Const(value) => stack.push(*value),

                SizeToken::VarW(name) | SizeToken::VarH(name) => {
                    let Some((w, h)) = lookup(name) else {
                        tracing::warn!("variable '{name}' not found in RPN expression");
                        return Err(EvalError::UnknownVariable(name.clone()));
                    };
                    stack.push(if matches!(token, SizeToken::VarW(_)) { w } else { h });
                }

                SizeToken::Op1(op) => {
                    let Some(x) = stack.pop() else {
                        tracing::warn!("stack underflow in RPN expression");
                        return Err(EvalError::Underflow);
                    };
                    let res = match op {
                        SizeOp1::Not => {
                            if x == 0.0 {
                                1.0
                            } else {
                                0.0
                            }
                        }
                    };
                    stack.push(res);
                }

                SizeToken::Op2(op) => {
                    // Pop the operands in reverse order
                    let (Some(rhs), Some(lhs)) = (stack.pop(), stack.pop()) else {
                        tracing::warn!("stack underflow in RPN expression");
                        return Err(EvalError::Underflow);
                    };
                    let res = match op {
                        SizeOp2::Add => lhs + rhs,
                        SizeOp2::Sub => lhs - rhs,
                        SizeOp2::Mul => lhs * rhs,
                        SizeOp2::Div => lhs / rhs,
                        SizeOp2::Gt => {
                            if lhs > rhs {
                                1.0
                            } else {
                                0.0
                            }
                        }
                        SizeOp2::Lt => {
                            if lhs < rhs {
                                1.0
                            } else {
                                0.0
                            }
                        }
                    };
                    if !res.is_finite() {
                        tracing::warn!("illegal operation in RPN expression");
                        return Err(EvalError::NonFinite);
                    }
                    stack.push(res);
                }
            }
        }

        if stack.len() != 1 {
            tracing::warn!("malformed stack after RPN expression ({} elements)", stack.len());
            return Err(EvalError::MalformedStack(stack.len()));
        }
        Ok(stack[0])
    }
}

impl fmt::Display for SizeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match token {
                SizeToken::Const(value) => write!(f, "{value}")?,
                SizeToken::VarW(name) => write!(f, "{name}.w")?,
                SizeToken::VarH(name) => write!(f, "{name}.h")?,
                SizeToken::Op1(SizeOp1::Not) => write!(f, "!")?,
                SizeToken::Op2(op) => {
                    let c = match op {
                        SizeOp2::Add => '+',
                        SizeOp2::Sub => '-',
                        SizeOp2::Mul => '*',
                        SizeOp2::Div => '/',
                        SizeOp2::Gt => '>',
                        SizeOp2::Lt => '<',
                    };
                    write!(f, "{c}")?;
                }
            }
        }
        Ok(())
    }
}

impl FromStr for SizeExpr {
    type Err = ExprParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Errors produced while parsing an expression line
#[derive(Debug, Clone, PartialEq)]
pub enum ExprParseError {
    /// The expression exceeds [`MAX_SZEXP_SIZE`] tokens
    TooManyTokens,
    /// A token started with a digit but is not a valid float literal
    BadLiteral(String),
    /// A token is neither a variable, an operator nor a literal
    UnknownToken(String),
}

impl fmt::Display for ExprParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyTokens => write!(f, "expression exceeds {MAX_SZEXP_SIZE} tokens"),
            Self::BadLiteral(word) => write!(f, "malformed numeric literal '{word}'"),
            Self::UnknownToken(word) => write!(f, "unknown token '{word}'"),
        }
    }
}

impl std::error::Error for ExprParseError {}

/// Errors produced while evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// A variable did not resolve against the texture lookup
    UnknownVariable(String),
    /// An operator found fewer operands on the stack than it needs
    Underflow,
    /// A dyadic operation produced a non-finite result (e.g. division by zero)
    NonFinite,
    /// The stack held a number of elements other than one at termination
    MalformedStack(usize),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownVariable(name) => write!(f, "variable '{name}' not found"),
            Self::Underflow => write!(f, "stack underflow"),
            Self::NonFinite => write!(f, "illegal operation (non-finite result)"),
            Self::MalformedStack(len) => write!(f, "malformed stack ({len} elements left)"),
        }
    }
}

impl std::error::Error for EvalError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_lookup(_: &str) -> Option<(f32, f32)> {
        None
    }

    #[test]
    fn test_parse_basic_expression() {
        let expr = SizeExpr::parse("HOOKED.w 2 *").unwrap();
        assert_eq!(
            expr.tokens(),
            &[SizeToken::VarW("HOOKED".to_string()), SizeToken::Const(2.0), SizeToken::Op2(SizeOp2::Mul)]
        );
    }

    #[test]
    fn test_parse_suffix_variants() {
        let expr = SizeExpr::parse("A.width B.height").unwrap();
        assert_eq!(expr.tokens(), &[SizeToken::VarW("A".to_string()), SizeToken::VarH("B".to_string())]);
    }

    #[test]
    fn test_parse_skips_extra_spaces() {
        let expr = SizeExpr::parse("  1   2    + ").unwrap();
        assert_eq!(expr.tokens().len(), 3);
    }

    #[test]
    fn test_parse_all_operators() {
        let expr = SizeExpr::parse("1 2 + 3 - 4 * 5 / 6 > 7 < !").unwrap();
        assert_eq!(expr.tokens().len(), 12);
        assert_eq!(expr.tokens()[11], SizeToken::Op1(SizeOp1::Not));
    }

    #[test]
    fn test_parse_rejects_bad_literal() {
        assert_eq!(SizeExpr::parse("2x"), Err(ExprParseError::BadLiteral("2x".to_string())));
    }

    #[test]
    fn test_parse_rejects_unknown_token() {
        assert_eq!(SizeExpr::parse("bogus"), Err(ExprParseError::UnknownToken("bogus".to_string())));
    }

    #[test]
    fn test_parse_rejects_too_many_tokens() {
        let line = vec!["1"; MAX_SZEXP_SIZE + 1].join(" ");
        assert_eq!(SizeExpr::parse(&line), Err(ExprParseError::TooManyTokens));
    }

    #[test]
    fn test_parse_accepts_exactly_max_tokens() {
        let line = vec!["1"; MAX_SZEXP_SIZE].join(" ");
        assert_eq!(SizeExpr::parse(&line).unwrap().tokens().len(), MAX_SZEXP_SIZE);
    }

    #[test]
    fn test_eval_with_lookup() {
        let expr = SizeExpr::parse("HOOKED.w 2 *").unwrap();
        let result = expr.eval(|name| if name == "HOOKED" { Some((640.0, 480.0)) } else { None }).unwrap();
        assert_eq!(result, 1280.0);
    }

    #[test]
    fn test_eval_height_component() {
        let expr = SizeExpr::parse("HOOKED.h").unwrap();
        let result = expr.eval(|_| Some((640.0, 480.0))).unwrap();
        assert_eq!(result, 480.0);
    }

    #[test]
    fn test_eval_unknown_variable() {
        let expr = SizeExpr::parse("MISSING.w").unwrap();
        assert_eq!(expr.eval(no_lookup), Err(EvalError::UnknownVariable("MISSING".to_string())));
    }

    #[test]
    fn test_eval_comparison_and_not() {
        assert_eq!(SizeExpr::parse("3 2 >").unwrap().eval(no_lookup).unwrap(), 1.0);
        assert_eq!(SizeExpr::parse("3 2 <").unwrap().eval(no_lookup).unwrap(), 0.0);
        assert_eq!(SizeExpr::parse("0 !").unwrap().eval(no_lookup).unwrap(), 1.0);
        assert_eq!(SizeExpr::parse("5 !").unwrap().eval(no_lookup).unwrap(), 0.0);
    }

    #[test]
    fn test_eval_operand_order() {
        // Sub and Div must apply left-to-right: "8 2 /" is 8 / 2
        assert_eq!(SizeExpr::parse("8 2 /").unwrap().eval(no_lookup).unwrap(), 4.0);
        assert_eq!(SizeExpr::parse("8 2 -").unwrap().eval(no_lookup).unwrap(), 6.0);
    }

    #[test]
    fn test_eval_division_by_zero_fails() {
        assert_eq!(SizeExpr::parse("1 0 /").unwrap().eval(no_lookup), Err(EvalError::NonFinite));
    }

    #[test]
    fn test_eval_underflow() {
        assert_eq!(SizeExpr::parse("+").unwrap().eval(no_lookup), Err(EvalError::Underflow));
        assert_eq!(SizeExpr::parse("1 +").unwrap().eval(no_lookup), Err(EvalError::Underflow));
        assert_eq!(SizeExpr::parse("!").unwrap().eval(no_lookup), Err(EvalError::Underflow));
    }

    #[test]
    fn test_eval_malformed_stack() {
        assert_eq!(SizeExpr::parse("1 2").unwrap().eval(no_lookup), Err(EvalError::MalformedStack(2)));
        assert_eq!(SizeExpr::parse("").unwrap().eval(no_lookup), Err(EvalError::MalformedStack(0)));
    }

    #[test]
    fn test_variable_free_roundtrip() {
        // Any variable-free expression the parser accepts either evaluates to a value or
        // fails with a stack-shape error; it must never panic.
        for line in ["1", "1 2 +", "1 2 3", "+ +", "2 0 /", "1 !", "10 4 - 2 *"] {
            let expr = SizeExpr::parse(line).unwrap();
            let _ = expr.eval(no_lookup);
        }
    }

    #[test]
    fn test_display_roundtrip() {
        for line in ["HOOKED.w 2 *", "1 2 +", "NATIVE_CROPPED.h OUTPUT.h /", "0 !"] {
            let expr: SizeExpr = line.parse().unwrap();
            assert_eq!(expr.to_string().parse::<SizeExpr>().unwrap(), expr);
        }
    }
}
