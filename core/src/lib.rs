//! # ARM Virtual Machine Core
//!
//! This library implements the execution engine of the virtual machine: the
//! [instruction decoder and executor](cpu::insn), the [software-interrupt
//! layer](swi), the [program object and source map](prog), and the
//! [machine facade](vm) tying them together over the architectural
//! primitives of [`armlet_arch`].

#![warn(clippy::pedantic)]

pub mod cpu;
pub mod prog;
pub mod swi;
pub mod vm;

pub use crate::cpu::insn::Insn;
pub use crate::cpu::{Cpu, Error, Step};
pub use crate::prog::{Program, SourceMap};
pub use crate::vm::{Machine, Status};
