//! Command parser over the pest grammar.

use std::num::ParseIntError;

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use super::{BinOp, Command, Expr, Reg, Topic};
use crate::Watch;

#[derive(Parser)]
#[grammar = "lang/parser.pest"]
struct CmdParser;

/// A type specifying categories of command parse errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Grammar mismatch.
    #[error(transparent)]
    Pest(Box<pest::error::Error<Rule>>),
    /// Numeric literal out of range.
    #[error(transparent)]
    ParseInt(#[from] ParseIntError),
}

impl From<pest::error::Error<Rule>> for Error {
    fn from(err: pest::error::Error<Rule>) -> Self {
        Self::Pest(Box::new(err))
    }
}

/// Parses one command line; empty input yields `None`.
///
/// # Errors
///
/// Errors on input the grammar rejects.
pub fn command(src: &str) -> Result<Option<Command>, Error> {
    let mut pairs = CmdParser::parse(Rule::Input, src)?;
    let top = pairs.next().expect("missing top rule");

    let cmd = match top.as_rule() {
        Rule::Break => {
            let mut inner = top.into_inner();
            let at = expr(&inner.next().expect("missing address"))?;
            let cond = inner.next().map(|pair| expr(&pair)).transpose()?;
            Command::Break { at, cond }
        }
        Rule::Delete => Command::Delete(single(top)?),
        Rule::Enable => Command::Enable(single(top)?),
        Rule::Disable => Command::Disable(single(top)?),
        Rule::Watch => {
            let mut inner = top.into_inner();
            let kind = match inner
                .next()
                .expect("missing kind")
                .as_str()
                .to_ascii_lowercase()
                .as_str()
            {
                "rwatch" => Watch::Read,
                "awatch" => Watch::Access,
                _ => Watch::Write,
            };
            Command::Watch(kind, expr(&inner.next().expect("missing address"))?)
        }
        Rule::Unwatch => Command::Unwatch(single(top)?),
        Rule::Step => {
            let count = top
                .into_inner()
                .next()
                .map(|pair| number(pair.as_str()))
                .transpose()?;
            Command::Step(count.map(|n| n as u64))
        }
        Rule::Next => Command::Next,
        Rule::Finish => Command::Finish,
        Rule::Continue => Command::Continue,
        Rule::Print => Command::Print(single(top)?),
        Rule::Examine => {
            let mut inner = top.into_inner().peekable();
            let count = match inner.peek().map(Pair::as_rule) {
                Some(Rule::Number) => {
                    let pair = inner.next().expect("peeked");
                    u32::try_from(number(pair.as_str())?).unwrap_or(1)
                }
                _ => 1,
            };
            Command::Examine {
                count,
                at: expr(&inner.next().expect("missing address"))?,
            }
        }
        Rule::Info => {
            let topic = top.into_inner().next().expect("missing topic");
            Command::Info(match topic.as_str().to_ascii_lowercase().as_str() {
                "breakpoints" => Topic::Breakpoints,
                "watchpoints" => Topic::Watchpoints,
                _ => Topic::Registers,
            })
        }
        Rule::EOI => return Ok(None),
        rule => panic!("invalid rule: {rule:?}"),
    };

    Ok(Some(cmd))
}

/// Parses a standalone expression (breakpoint conditions, watch panels).
///
/// # Errors
///
/// Errors on input the grammar rejects.
pub fn expression(src: &str) -> Result<Expr, Error> {
    let mut pairs = CmdParser::parse(Rule::ExprInput, src)?;
    expr(&pairs.next().expect("missing expression"))
}

/// Extracts the single expression argument of a command pair.
fn single(pair: Pair<Rule>) -> Result<Expr, Error> {
    expr(&pair.into_inner().next().expect("missing inner rule"))
}

fn expr(pair: &Pair<Rule>) -> Result<Expr, Error> {
    debug_assert_eq!(pair.as_rule(), Rule::Expr);
    fold(pair.clone(), term)
}

fn term(pair: Pair<Rule>) -> Result<Expr, Error> {
    fold(pair, factor)
}

/// Folds `operand (op operand)*` left-associatively.
fn fold(
    pair: Pair<Rule>,
    operand: impl Fn(Pair<Rule>) -> Result<Expr, Error>,
) -> Result<Expr, Error> {
    let mut inner = pair.into_inner();
    let mut lhs = operand(inner.next().expect("missing operand"))?;
    while let Some(op) = inner.next() {
        let rhs = operand(inner.next().expect("missing operand"))?;
        let op = match op.as_str() {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            _ => BinOp::Div,
        };
        lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn factor(pair: Pair<Rule>) -> Result<Expr, Error> {
    let inner = pair.into_inner().next().expect("missing factor");
    match inner.as_rule() {
        Rule::Deref => Ok(Expr::Deref(Box::new(factor(
            inner.into_inner().next().expect("missing operand"),
        )?))),
        Rule::Neg => Ok(Expr::Neg(Box::new(factor(
            inner.into_inner().next().expect("missing operand"),
        )?))),
        Rule::Paren => expr(&inner.into_inner().next().expect("missing expression")),
        Rule::Number => Ok(Expr::Num(number(inner.as_str())?)),
        Rule::Register => Ok(Expr::Reg(register(inner.as_str()))),
        Rule::Symbol => Ok(Expr::Sym(inner.as_str().to_string())),
        rule => panic!("invalid rule: {rule:?}"),
    }
}

fn register(name: &str) -> Reg {
    match name.to_ascii_lowercase().as_str() {
        "sp" => Reg::Idx(13),
        "lr" => Reg::Idx(14),
        "pc" => Reg::Idx(15),
        "cpsr" => Reg::Cpsr,
        lower => Reg::Idx(lower[1..].parse().unwrap_or(0)),
    }
}

fn number(text: &str) -> Result<i64, ParseIntError> {
    if let Some(hex) = text.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = text.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else if let Some(stripped) = text.strip_prefix('\'') {
        Ok(stripped.chars().next().map_or(0, |c| i64::from(c as u32)))
    } else {
        text.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_breakpoint_commands() {
        let cmd = command("break 0x8004 if r0 - 5").unwrap().unwrap();
        let Command::Break { at, cond } = cmd else {
            panic!("wrong command");
        };
        assert_eq!(at, Expr::Num(0x8004));
        assert_eq!(
            cond,
            Some(Expr::Bin(
                BinOp::Sub,
                Box::new(Expr::Reg(Reg::Idx(0))),
                Box::new(Expr::Num(5)),
            ))
        );
    }

    #[test]
    fn parses_watch_and_examine() {
        assert_eq!(
            command("rwatch 0x10000").unwrap().unwrap(),
            Command::Watch(Watch::Read, Expr::Num(0x1_0000)),
        );
        assert_eq!(
            command("x/4 sp").unwrap().unwrap(),
            Command::Examine {
                count: 4,
                at: Expr::Reg(Reg::Idx(13)),
            },
        );
        assert_eq!(
            command("x main").unwrap().unwrap(),
            Command::Examine {
                count: 1,
                at: Expr::Sym("main".to_string()),
            },
        );
    }

    #[test]
    fn respects_precedence_and_deref() {
        let expr = expression("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Bin(
                BinOp::Add,
                Box::new(Expr::Num(1)),
                Box::new(Expr::Bin(
                    BinOp::Mul,
                    Box::new(Expr::Num(2)),
                    Box::new(Expr::Num(3)),
                )),
            )
        );
        let expr = expression("*(sp + 4)").unwrap();
        assert!(matches!(expr, Expr::Deref(_)));
    }

    #[test]
    fn distinguishes_registers_from_symbols() {
        assert_eq!(expression("r11").unwrap(), Expr::Reg(Reg::Idx(11)));
        assert_eq!(
            expression("result").unwrap(),
            Expr::Sym("result".to_string())
        );
        assert_eq!(expression("cpsr").unwrap(), Expr::Reg(Reg::Cpsr));
    }

    #[test]
    fn empty_input_is_no_command() {
        assert!(command("").unwrap().is_none());
        assert!(command("   ").unwrap().is_none());
        assert!(command("frob 1").is_err());
    }

    #[test]
    fn numbers_cover_the_radixes() {
        assert_eq!(expression("0x10").unwrap(), Expr::Num(16));
        assert_eq!(expression("0b101").unwrap(), Expr::Num(5));
        assert_eq!(expression("'A'").unwrap(), Expr::Num(65));
    }
}
