//! Debug command language.
//!
//! The command line and the expression surface share one grammar
//! (`parser.pest`). Expressions evaluate over the live machine: registers,
//! word-sized memory reads (`*addr`), program symbols, and integer
//! literals.

use std::fmt::{self, Display};

use armlet_arch::Word;
use armlet_core::Machine;
use thiserror::Error;

use crate::Watch;

mod parse;

pub use self::parse::{command, expression, Error};

/// Register reference in an expression.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reg {
    /// R0..R15 (SP, LR, PC included).
    Idx(u8),
    /// The status register.
    Cpsr,
}

impl Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idx(13) => write!(f, "SP"),
            Self::Idx(14) => write!(f, "LR"),
            Self::Idx(15) => write!(f, "PC"),
            Self::Idx(idx) => write!(f, "R{idx}"),
            Self::Cpsr => write!(f, "CPSR"),
        }
    }
}

/// Binary operator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
}

impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "+"),
            Self::Sub => write!(f, "-"),
            Self::Mul => write!(f, "*"),
            Self::Div => write!(f, "/"),
        }
    }
}

/// A parsed integer expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Literal value.
    Num(i64),
    /// Register read.
    Reg(Reg),
    /// Symbol address.
    Sym(String),
    /// Word read from memory.
    Deref(Box<Expr>),
    /// Arithmetic negation.
    Neg(Box<Expr>),
    /// Binary operation.
    Bin(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Evaluates against the machine state.
    ///
    /// Register reads go through the register-access abstraction, so `PC`
    /// reads ahead of the pipeline like the hardware does.
    ///
    /// # Errors
    ///
    /// Errors on undefined symbols, memory faults, and division by zero.
    pub fn eval(&self, vm: &Machine) -> Result<i64, Eval> {
        match self {
            Self::Num(value) => Ok(*value),
            Self::Reg(Reg::Idx(idx)) => Ok(i64::from(vm.cpu.reg.get(usize::from(*idx)))),
            Self::Reg(Reg::Cpsr) => Ok(i64::from(vm.cpu.reg.cpsr.bits())),
            Self::Sym(name) => vm
                .source_map()
                .addr_of(name)
                .map(i64::from)
                .ok_or_else(|| Eval::Symbol(name.clone())),
            Self::Deref(inner) => {
                let addr = inner.eval(vm)? as Word;
                let bytes = vm
                    .cpu
                    .mem
                    .view(addr, 4)
                    .map_err(|err| Eval::Memory(err.to_string()))?;
                Ok(i64::from(Word::from_le_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3],
                ])))
            }
            Self::Neg(inner) => Ok(inner.eval(vm)?.wrapping_neg()),
            Self::Bin(op, lhs, rhs) => {
                let lhs = lhs.eval(vm)?;
                let rhs = rhs.eval(vm)?;
                match op {
                    BinOp::Add => Ok(lhs.wrapping_add(rhs)),
                    BinOp::Sub => Ok(lhs.wrapping_sub(rhs)),
                    BinOp::Mul => Ok(lhs.wrapping_mul(rhs)),
                    BinOp::Div => lhs.checked_div(rhs).ok_or(Eval::DivideByZero),
                }
            }
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(value) => write!(f, "{value}"),
            Self::Reg(reg) => write!(f, "{reg}"),
            Self::Sym(name) => write!(f, "{name}"),
            Self::Deref(inner) => write!(f, "*{inner}"),
            Self::Neg(inner) => write!(f, "-{inner}"),
            Self::Bin(op, lhs, rhs) => write!(f, "({lhs} {op} {rhs})"),
        }
    }
}

/// An expression evaluation failure.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Eval {
    /// Name not present in the symbol table.
    #[error("undefined symbol `{0}`")]
    Symbol(String),
    /// Memory read failed.
    #[error("memory fault: {0}")]
    Memory(String),
    /// Division by zero.
    #[error("division by zero")]
    DivideByZero,
}

/// `info` topics.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Topic {
    /// Register file and flags.
    Registers,
    /// Breakpoint table.
    Breakpoints,
    /// Watchpoint table.
    Watchpoints,
}

/// A parsed debugger command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Set a breakpoint, optionally conditional.
    Break {
        /// Address expression.
        at: Expr,
        /// Fire only when truthy.
        cond: Option<Expr>,
    },
    /// Remove the breakpoint at an address.
    Delete(Expr),
    /// Enable the breakpoint at an address.
    Enable(Expr),
    /// Disable the breakpoint at an address.
    Disable(Expr),
    /// Add a watchpoint.
    Watch(Watch, Expr),
    /// Remove a watchpoint by ID.
    Unwatch(Expr),
    /// Execute one or more single steps.
    Step(Option<u64>),
    /// Step over a call.
    Next,
    /// Run until the current function returns.
    Finish,
    /// Resume execution.
    Continue,
    /// Evaluate and print an expression.
    Print(Expr),
    /// Dump memory words.
    Examine {
        /// Number of words.
        count: u32,
        /// Start address expression.
        at: Expr,
    },
    /// Show a state table.
    Info(Topic),
}
