//! # ARM Assembler Front-End
//!
//! A two-pass, line-oriented assembler producing the resolved
//! [`Program`] object the virtual machine loads: encoded words with their
//! source provenance, data placements, and the symbol table.
//!
//! Pass one lays out the address space (labels, directives, literal-pool
//! slots); pass two encodes instructions and data with the complete symbol
//! table. Diagnostics are collected across the whole source rather than
//! stopping at the first fault, so a load response can report every broken
//! line at once.

#![warn(clippy::pedantic)]

mod enc;
mod lex;
mod parse;

use armlet_arch::Word;
use armlet_core::prog::{Chunk, Line, Program};
use indexmap::IndexMap;
use log::debug;
use thiserror::Error;

use crate::parse::{Arg, Dir, Expr};

/// Code origin used until the source's first `.org`.
pub const DEFAULT_ORIGIN: Word = 0x8000;

/// A source diagnostic with its position.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("line {line}, column {col}: {msg}")]
pub struct Note {
    /// 1-based source line.
    pub line: u32,
    /// 1-based column.
    pub col: u32,
    /// Human-readable message.
    pub msg: String,
}

impl Note {
    pub(crate) fn new(line: u32, col: u32, msg: String) -> Self {
        Self { line, col, msg }
    }
}

/// An instruction awaiting pass-two encoding.
struct Slot {
    addr: Word,
    stmt: parse::Stmt,
    number: u32,
    text: String,
    lit: Option<usize>,
}

/// A data directive awaiting pass-two evaluation.
struct Late {
    addr: Word,
    exprs: Vec<Expr>,
    width: u32,
    number: u32,
}

/// A literal-pool slot.
struct Lit {
    expr: Expr,
    addr: Word,
}

/// Assembles a source file.
///
/// # Errors
///
/// Returns every diagnostic found across both passes.
#[allow(clippy::too_many_lines)]
pub fn assemble(source: &str) -> Result<Program, Vec<Note>> {
    let mut notes: Vec<Note> = Vec::new();
    let mut syms: IndexMap<String, i64> = IndexMap::new();
    let mut slots: Vec<Slot> = Vec::new();
    let mut late: Vec<Late> = Vec::new();
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut lits: Vec<Lit> = Vec::new();
    let mut pending: Vec<usize> = Vec::new();
    let mut loc = DEFAULT_ORIGIN;
    let mut ended = false;

    // Pass one: tokenize, parse, and lay out the address space.
    for (idx, raw) in source.lines().enumerate() {
        if ended {
            break;
        }
        let number = idx as u32 + 1;
        let toks = match lex::lex(raw, number) {
            Ok(toks) => toks,
            Err(note) => {
                notes.push(note);
                continue;
            }
        };
        let parsed = match parse::line(&toks, number) {
            Ok(parsed) => parsed,
            Err(note) => {
                notes.push(note);
                continue;
            }
        };
        for label in parsed.labels {
            define(&mut syms, &label, i64::from(loc), number, &mut notes);
        }
        if let Some(dir) = parsed.dir {
            match dir {
                Dir::Org(expr) => match eval(&expr, &syms, number, &mut notes) {
                    Some(value) => loc = value as Word,
                    None => {}
                },
                Dir::Equ(name, expr) => {
                    if let Some(value) = eval(&expr, &syms, number, &mut notes) {
                        define(&mut syms, &name, value, number, &mut notes);
                    }
                }
                Dir::Word(exprs) => {
                    late.push(Late {
                        addr: loc,
                        width: 4,
                        number,
                        exprs,
                    });
                    loc += 4 * late.last().map_or(0, |l| l.exprs.len() as Word);
                }
                Dir::Half(exprs) => {
                    late.push(Late {
                        addr: loc,
                        width: 2,
                        number,
                        exprs,
                    });
                    loc += 2 * late.last().map_or(0, |l| l.exprs.len() as Word);
                }
                Dir::Byte(exprs) => {
                    late.push(Late {
                        addr: loc,
                        width: 1,
                        number,
                        exprs,
                    });
                    loc += late.last().map_or(0, |l| l.exprs.len() as Word);
                }
                Dir::Ascii { mut bytes, zero } => {
                    if zero {
                        bytes.push(0);
                    }
                    loc += bytes.len() as Word;
                    chunks.push(Chunk {
                        addr: loc - bytes.len() as Word,
                        bytes,
                    });
                }
                Dir::Align(expr) => {
                    let align = match expr {
                        Some(expr) => eval(&expr, &syms, number, &mut notes).unwrap_or(4),
                        None => 4,
                    };
                    if align <= 0 || align & (align - 1) != 0 {
                        notes.push(Note::new(number, 1, format!("bad alignment {align}")));
                    } else {
                        let align = align as Word;
                        loc = (loc + align - 1) & !(align - 1);
                    }
                }
                Dir::Space(size, fill) => {
                    let size = eval(&size, &syms, number, &mut notes).unwrap_or(0).max(0);
                    let fill = match fill {
                        Some(fill) => eval(&fill, &syms, number, &mut notes).unwrap_or(0),
                        None => 0,
                    };
                    chunks.push(Chunk {
                        addr: loc,
                        bytes: vec![fill as u8; size as usize],
                    });
                    loc += size as Word;
                }
                Dir::Ltorg => flush(&mut loc, &mut lits, &mut pending),
                Dir::End => ended = true,
            }
        }
        if let Some(stmt) = parsed.stmt {
            if loc % 4 != 0 {
                notes.push(Note::new(
                    number,
                    1,
                    format!("instruction at unaligned address {loc:#x}"),
                ));
                loc = (loc + 3) & !3;
            }
            let lit = stmt.args.iter().find_map(|arg| match arg {
                Arg::Literal(expr) => {
                    lits.push(Lit {
                        expr: expr.clone(),
                        addr: 0,
                    });
                    pending.push(lits.len() - 1);
                    Some(lits.len() - 1)
                }
                _ => None,
            });
            slots.push(Slot {
                addr: loc,
                stmt,
                number,
                text: raw.trim().to_string(),
                lit,
            });
            loc += 4;
        }
    }
    flush(&mut loc, &mut lits, &mut pending);

    // Pass two: encode with the complete symbol table.
    let mut code = Vec::new();
    for slot in &slots {
        let ctx = enc::Ctx {
            addr: slot.addr,
            line: slot.number,
            syms: &syms,
            lit: slot.lit.map(|idx| lits[idx].addr),
        };
        match enc::encode(&slot.stmt, &ctx) {
            Ok(word) => code.push(Line {
                addr: slot.addr,
                code: word,
                number: slot.number,
                text: slot.text.clone(),
            }),
            Err(note) => notes.push(note),
        }
    }
    for item in &late {
        let mut bytes = Vec::with_capacity(item.exprs.len() * item.width as usize);
        for expr in &item.exprs {
            match eval(expr, &syms, item.number, &mut notes) {
                Some(value) => bytes.extend_from_slice(&value.to_le_bytes()[..item.width as usize]),
                None => {}
            }
        }
        chunks.push(Chunk {
            addr: item.addr,
            bytes,
        });
    }
    for lit in &lits {
        match lit.expr.eval(&syms) {
            Ok(value) => chunks.push(Chunk {
                addr: lit.addr,
                bytes: (value as Word).to_le_bytes().to_vec(),
            }),
            Err(msg) => notes.push(Note::new(0, 1, msg)),
        }
    }

    if !notes.is_empty() {
        notes.sort_by_key(|note| (note.line, note.col));
        return Err(notes);
    }

    let symbols: IndexMap<String, Word> = syms
        .iter()
        .map(|(name, &value)| (name.clone(), value as Word))
        .collect();
    let first_code = code.iter().map(|line| line.addr).min();
    let origin = first_code
        .into_iter()
        .chain(chunks.iter().map(|chunk| chunk.addr))
        .min()
        .unwrap_or(DEFAULT_ORIGIN);
    let entry = symbols
        .get("_start")
        .or_else(|| symbols.get("main"))
        .copied()
        .or(first_code)
        .unwrap_or(origin);
    debug!(
        "assembled {} instructions, {} data chunks, {} symbols",
        code.len(),
        chunks.len(),
        symbols.len()
    );
    Ok(Program {
        origin,
        entry,
        code,
        data: chunks,
        symbols,
    })
}

/// Assigns addresses to the pending literal-pool slots.
fn flush(loc: &mut Word, lits: &mut [Lit], pending: &mut Vec<usize>) {
    if pending.is_empty() {
        return;
    }
    *loc = (*loc + 3) & !3;
    for idx in pending.drain(..) {
        lits[idx].addr = *loc;
        *loc += 4;
    }
}

fn define(syms: &mut IndexMap<String, i64>, name: &str, value: i64, number: u32, notes: &mut Vec<Note>) {
    if syms.insert(name.to_string(), value).is_some() {
        notes.push(Note::new(
            number,
            1,
            format!("symbol `{name}` is already defined"),
        ));
    }
}

fn eval(expr: &Expr, syms: &IndexMap<String, i64>, number: u32, notes: &mut Vec<Note>) -> Option<i64> {
    match expr.eval(syms) {
        Ok(value) => Some(value),
        Err(msg) => {
            notes.push(Note::new(number, 1, msg));
            None
        }
    }
}
