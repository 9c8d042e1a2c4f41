//! # Armlet
//!
//! An ARM (ARMv4-class) virtual machine with an interactive debugger and
//! an assembler front-end. This crate re-exports the workspace members
//! under one roof:
//!
//! - [`arch`]: memory regions and the banked register file.
//! - [`core`]: instruction decode/execute, syscalls, the machine facade,
//!   and the program object.
//! - [`asm`]: the two-pass assembler producing loadable programs.
//! - [`dbg`]: breakpoints, watchpoints, step modes, trace, statistics,
//!   and the debug command language.
//!
//! The HTTP session service lives in the `armlet-server` application
//! crate.

#![warn(clippy::pedantic)]

pub use armlet_arch as arch;
pub use armlet_asm as asm;
pub use armlet_core as core;
pub use armlet_dbg as dbg;

/// Commonly used items.
pub mod prelude {
    pub use crate::arch::mem::{Memory, Perms, Region, Width};
    pub use crate::arch::reg::{Cond, Cpsr, File, Mode};
    pub use crate::arch::{Block, Byte, Half, Word};
    pub use crate::asm::assemble;
    pub use crate::core::{Cpu, Insn, Machine, Program, SourceMap, Status};
    pub use crate::dbg::{Debugger, Stop, Watch};
}
