//! Resource formula module.
//!
//! A deliberately small integer expression language for data-driven
//! resource maxima such as `"level"`, `"1 + charisma_modifier"` or
//! `"max(1, wis_modifier)"`.
//!
//! Supported:
//! - integer literals
//! - `level`
//! - `<ability>_modifier` in full (`wisdom_modifier`) or short (`wis_modifier`) form
//! - `+ - * /` with the usual precedence, left associative, integer division
//! - `min(a, b, ...)` and `max(a, b, ...)` with two or more arguments
//!
//! Rejected with an error: consecutive operators (`10 + -3`), division by
//! zero, bare parentheses, unknown names and any leftover input.
//!
//! Evaluation is a pure function with no shared state.

use crate::abilities::{Ability, AbilityScores};
use strum::IntoEnumIterator;
use thiserror::Error;

/// Errors produced while parsing or evaluating a formula.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,

    #[error("consecutive operators at position {position}")]
    ConsecutiveOperators { position: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("unknown token '{0}'")]
    UnknownToken(String),

    #[error("{function}() requires at least 2 arguments, got {given}")]
    BadArity { function: &'static str, given: usize },

    #[error("unbalanced parentheses")]
    UnbalancedParens,

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("unexpected input '{0}'")]
    Trailing(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(i64),
    Name(String),
    Op(char),
    Open,
    Close,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Name(s) => s.clone(),
            Token::Op(c) => c.to_string(),
            Token::Open => "(".into(),
            Token::Close => ")".into(),
            Token::Comma => ",".into(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, FormulaError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let token = if c.is_ascii_digit() {
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            let value = literal
                .parse::<i64>()
                .map_err(|_| FormulaError::UnknownToken(literal.clone()))?;
            tokens.push((start, Token::Number(value)));
            continue;
        } else if c.is_ascii_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            tokens.push((start, Token::Name(name.to_ascii_lowercase())));
            continue;
        } else {
            match c {
                '+' | '-' | '*' | '/' => Token::Op(c),
                '(' => Token::Open,
                ')' => Token::Close,
                ',' => Token::Comma,
                other => return Err(FormulaError::UnknownToken(other.to_string())),
            }
        };
        tokens.push((start, token));
        i += 1;
    }
    Ok(tokens)
}

/// Values a formula may reference.
#[derive(Debug, Clone, Copy)]
pub struct FormulaVars<'a> {
    pub level: u8,
    pub scores: &'a AbilityScores,
}

impl FormulaVars<'_> {
    fn lookup(&self, name: &str) -> Option<i64> {
        if name == "level" {
            return Some(i64::from(self.level));
        }
        let stem = name.strip_suffix("_modifier")?;
        Ability::iter()
            .find(|a| a.as_ref() == stem || a.short() == stem)
            .map(|a| i64::from(self.scores.modifier(a)))
    }
}

struct Parser<'a, 'v> {
    tokens: &'a [(usize, Token)],
    pos: usize,
    vars: &'a FormulaVars<'v>,
}

impl Parser<'_, '_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<i64, FormulaError> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' {
                value.saturating_add(rhs)
            } else {
                value.saturating_sub(rhs)
            };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<i64, FormulaError> {
        let mut value = self.atom()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.atom()?;
            value = if op == '*' {
                value.saturating_mul(rhs)
            } else if rhs == 0 {
                return Err(FormulaError::DivisionByZero);
            } else {
                value.saturating_div(rhs)
            };
        }
        Ok(value)
    }

    fn atom(&mut self) -> Result<i64, FormulaError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            // leading sign of a whole expression or argument
            Some(Token::Op('-')) => Ok(self.atom()?.saturating_neg()),
            Some(Token::Name(name)) if name == "min" || name == "max" => {
                self.call(if name == "min" { "min" } else { "max" })
            }
            Some(Token::Name(name)) => self
                .vars
                .lookup(&name)
                .ok_or(FormulaError::UnknownToken(name)),
            Some(Token::Open) => Err(FormulaError::UnknownToken("(".into())),
            Some(other) => Err(FormulaError::Trailing(other.describe())),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn call(&mut self, function: &'static str) -> Result<i64, FormulaError> {
        if self.next() != Some(Token::Open) {
            return Err(FormulaError::UnbalancedParens);
        }
        let mut args = vec![self.expr()?];
        loop {
            match self.next() {
                Some(Token::Comma) => args.push(self.expr()?),
                Some(Token::Close) => break,
                None => return Err(FormulaError::UnbalancedParens),
                Some(other) => return Err(FormulaError::Trailing(other.describe())),
            }
        }
        if args.len() < 2 {
            return Err(FormulaError::BadArity {
                function,
                given: args.len(),
            });
        }
        let folded = if function == "min" {
            args.into_iter().min()
        } else {
            args.into_iter().max()
        };
        folded.ok_or(FormulaError::UnexpectedEnd)
    }
}

/// Evaluate a formula against a level and a set of ability scores.
///
/// Names are case-insensitive and whitespace is ignored.
///
/// # Examples
///
/// ```rust
/// use charsmith::AbilityScores;
/// use charsmith::formula::{evaluate, FormulaError};
///
/// let scores = AbilityScores::new(10, 10, 10, 10, 10, 18);
/// assert_eq!(evaluate("level", 7, &scores), Ok(7));
/// assert_eq!(evaluate("1 + charisma_modifier", 1, &scores), Ok(5));
/// assert_eq!(evaluate("5 / 0", 1, &scores), Err(FormulaError::DivisionByZero));
/// assert!(evaluate("10 + -3", 1, &scores).is_err());
/// ```
pub fn evaluate(formula: &str, level: u8, scores: &AbilityScores) -> Result<i32, FormulaError> {
    let tokens = tokenize(formula)?;
    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }

    for pair in tokens.windows(2) {
        if let [(position, Token::Op(_)), (_, Token::Op(_))] = pair {
            return Err(FormulaError::ConsecutiveOperators {
                position: *position,
            });
        }
    }

    let vars = FormulaVars { level, scores };
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        vars: &vars,
    };
    let value = parser.expr()?;
    if let Some(extra) = parser.peek() {
        return Err(match extra {
            Token::Close | Token::Open => FormulaError::UnbalancedParens,
            other => FormulaError::Trailing(other.describe()),
        });
    }

    Ok(value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores() -> AbilityScores {
        // STR +3, DEX +2, CON +1, INT -1, WIS +1, CHA +4
        AbilityScores::new(16, 14, 12, 8, 13, 18)
    }

    #[test]
    fn test_level_identity() {
        for level in 1..=20 {
            assert_eq!(evaluate("level", level, &scores()), Ok(i32::from(level)));
        }
    }

    #[test]
    fn test_ability_modifiers_full_and_short() {
        assert_eq!(evaluate("1 + charisma_modifier", 1, &scores()), Ok(5));
        assert_eq!(evaluate("1 + cha_modifier", 1, &scores()), Ok(5));
        assert_eq!(evaluate("int_modifier", 1, &scores()), Ok(-1));
        assert_eq!(evaluate("STR_Modifier * 2", 1, &scores()), Ok(6));
    }

    #[test]
    fn test_precedence_and_associativity() {
        assert_eq!(evaluate("2 + 3 * 4", 1, &scores()), Ok(14));
        assert_eq!(evaluate("10 - 4 - 3", 1, &scores()), Ok(3));
        assert_eq!(evaluate("20 / 2 / 5", 1, &scores()), Ok(2));
        assert_eq!(evaluate("level / 2", 5, &scores()), Ok(2));
    }

    #[test]
    fn test_min_max() {
        assert_eq!(evaluate("min(5, level)", 3, &scores()), Ok(3));
        assert_eq!(evaluate("max(1, int_modifier)", 1, &scores()), Ok(1));
        assert_eq!(evaluate("max(1, wis_modifier, 3)", 1, &scores()), Ok(3));
        assert_eq!(evaluate("1 + min(level, 2) * 2", 9, &scores()), Ok(5));
        assert!(matches!(
            evaluate("min(5)", 1, &scores()),
            Err(FormulaError::BadArity { given: 1, .. })
        ));
        assert_eq!(
            evaluate("max(1, 2", 1, &scores()),
            Err(FormulaError::UnbalancedParens)
        );
    }

    #[test]
    fn test_rejections() {
        assert_eq!(evaluate("5 / 0", 1, &scores()), Err(FormulaError::DivisionByZero));
        assert!(matches!(
            evaluate("10 + -3", 1, &scores()),
            Err(FormulaError::ConsecutiveOperators { .. })
        ));
        assert_eq!(evaluate("   ", 1, &scores()), Err(FormulaError::Empty));
        assert!(matches!(
            evaluate("level + proficiency", 1, &scores()),
            Err(FormulaError::UnknownToken(_))
        ));
        assert!(evaluate("(1 + 2)", 1, &scores()).is_err());
        assert!(evaluate("1 2", 1, &scores()).is_err());
        assert!(evaluate("3 +", 1, &scores()).is_err());
    }

    #[test]
    fn test_leading_minus() {
        assert_eq!(evaluate("-1 + level", 4, &scores()), Ok(3));
    }

    #[test]
    fn test_extreme_values_saturate() {
        assert_eq!(
            evaluate("-min(0 - 9223372036854775807 - 1, 0)", 1, &scores()),
            Ok(i32::MAX)
        );
        assert_eq!(
            evaluate("min(0 - 9223372036854775807 - 1, 0) / max(0 - 1, 0 - 2)", 1, &scores()),
            Ok(i32::MAX)
        );
        assert_eq!(
            evaluate("9223372036854775807 * 2 + 1", 1, &scores()),
            Ok(i32::MAX)
        );
    }
}
