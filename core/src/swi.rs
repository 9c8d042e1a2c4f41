//! Software-interrupt dispatch.
//!
//! The SWI comment field selects a syscall. Console writes land in the
//! session [`Console`] twice over: the full transcript for synchronous
//! polling, and a high-water mark from which the service drains fresh bytes
//! for event streaming. Console reads are non-destructive on failure: when
//! the stdin queue cannot satisfy a read, the PC is rewound to the SWI and
//! the step reports [`Blocked`](Step::Blocked), so retrying the step after
//! input arrives completes the call.
//!
//! File syscalls operate on a per-session virtual file table; nothing ever
//! touches the host filesystem.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use armlet_arch::mem::Width;
use armlet_arch::{Block, Byte, Word};
use indexmap::IndexMap;
use log::warn;
use rand::Rng;

use crate::cpu::{Cpu, Error, Result, Step};

/// Terminate the program.
pub const EXIT: Word = 0x00;
/// Write the character in R0.
pub const WRITE_CHAR: Word = 0x01;
/// Write the NUL-terminated string at R0.
pub const WRITE_STRING: Word = 0x02;
/// Write R0 as a signed decimal.
pub const WRITE_INT: Word = 0x03;
/// Read one character into R0.
pub const READ_CHAR: Word = 0x04;
/// Read a line into the buffer at R0, capacity R1; length into R0.
pub const READ_STRING: Word = 0x05;
/// Read a line and parse a signed decimal into R0.
pub const READ_INT: Word = 0x06;
/// Write a newline.
pub const WRITE_NEWLINE: Word = 0x07;
/// Open the file named at R0 with mode R1; fd or -1 into R0.
pub const FILE_OPEN: Word = 0x10;
/// Close the fd in R0.
pub const FILE_CLOSE: Word = 0x11;
/// Read R2 bytes from fd R0 into R1; count into R0.
pub const FILE_READ: Word = 0x12;
/// Write R2 bytes at R1 to fd R0; count into R0.
pub const FILE_WRITE: Word = 0x13;
/// Unix time in seconds into R0.
pub const TIME: Word = 0x20;
/// Milliseconds since reset into R0.
pub const CLOCK: Word = 0x21;
/// Pseudo-random word into R0.
pub const RAND: Word = 0x30;

/// Console buffers of a machine.
///
/// Output accumulates in a transcript; [`drain_fresh`](Console::drain_fresh)
/// yields the bytes written since the previous drain so the two delivery
/// paths (polling and streaming) carry identical data. Input is a byte
/// queue fed by the session.
#[derive(Clone, Debug, Default)]
pub struct Console {
    out: Vec<Byte>,
    mark: usize,
    inp: VecDeque<Byte>,
}

impl Console {
    /// The full output transcript.
    #[must_use]
    pub fn output(&self) -> &[Byte] {
        &self.out
    }

    /// Bytes written since the previous drain, if any.
    pub fn drain_fresh(&mut self) -> Option<String> {
        if self.mark < self.out.len() {
            let fresh = String::from_utf8_lossy(&self.out[self.mark..]).into_owned();
            self.mark = self.out.len();
            Some(fresh)
        } else {
            None
        }
    }

    /// Appends bytes to the stdin queue.
    pub fn feed(&mut self, data: &[Byte]) {
        self.inp.extend(data);
    }

    /// Number of queued stdin bytes.
    #[must_use]
    pub fn pending_input(&self) -> usize {
        self.inp.len()
    }

    fn push(&mut self, data: &[Byte]) {
        self.out.extend_from_slice(data);
    }

    fn read_byte(&mut self) -> Option<Byte> {
        self.inp.pop_front()
    }

    /// Takes one full line from the queue, without its terminator.
    fn read_line(&mut self) -> Option<Vec<Byte>> {
        let end = self.inp.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<Byte> = self.inp.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }
}

impl Block for Console {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Open-file mode of the virtual filesystem.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum FileMode {
    Read,
    Write,
    Append,
}

/// An open virtual file.
#[derive(Clone, Debug)]
struct FileHandle {
    name: String,
    pos: usize,
    mode: FileMode,
}

/// Per-machine virtual file table.
#[derive(Clone, Debug, Default)]
pub(crate) struct Vfs {
    files: IndexMap<String, Vec<Byte>>,
    open: Vec<Option<FileHandle>>,
}

impl Vfs {
    fn open(&mut self, name: &str, mode: Word) -> Option<Word> {
        let mode = match mode {
            0 => FileMode::Read,
            1 => FileMode::Write,
            2 => FileMode::Append,
            _ => return None,
        };
        let pos = match mode {
            FileMode::Read => {
                self.files.get(name)?;
                0
            }
            FileMode::Write => {
                self.files.insert(name.to_string(), Vec::new());
                0
            }
            FileMode::Append => self.files.entry(name.to_string()).or_default().len(),
        };
        let handle = FileHandle {
            name: name.to_string(),
            pos,
            mode,
        };
        // Reuse the lowest free descriptor.
        let fd = match self.open.iter().position(Option::is_none) {
            Some(idx) => {
                self.open[idx] = Some(handle);
                idx
            }
            None => {
                self.open.push(Some(handle));
                self.open.len() - 1
            }
        };
        Some(fd as Word)
    }

    fn close(&mut self, fd: Word) -> bool {
        match self.open.get_mut(fd as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    fn read(&mut self, fd: Word, len: usize) -> Option<Vec<Byte>> {
        let handle = self.open.get_mut(fd as usize)?.as_mut()?;
        if handle.mode != FileMode::Read {
            return None;
        }
        let data = self.files.get(&handle.name)?;
        let take = len.min(data.len().saturating_sub(handle.pos));
        let out = data[handle.pos..handle.pos + take].to_vec();
        handle.pos += take;
        Some(out)
    }

    fn write(&mut self, fd: Word, data: &[Byte]) -> Option<usize> {
        let handle = self.open.get_mut(fd as usize)?.as_mut()?;
        if handle.mode == FileMode::Read {
            return None;
        }
        self.files.get_mut(&handle.name)?.extend_from_slice(data);
        Some(data.len())
    }
}

impl Block for Vfs {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Dispatches a software interrupt.
///
/// `at` is the address of the SWI instruction, used to rewind the PC for
/// EXIT and for blocked reads.
#[allow(clippy::too_many_lines)]
pub(crate) fn call(cpu: &mut Cpu, at: Word, imm: Word) -> Result<Step> {
    match imm {
        EXIT => {
            cpu.reg.set_pc(at);
            Ok(Step::Halted)
        }
        WRITE_CHAR => {
            let byte = cpu.reg.get(0) as Byte;
            cpu.con.push(&[byte]);
            Ok(Step::Done)
        }
        WRITE_STRING => {
            let text = cstring(cpu, cpu.reg.get(0))?;
            cpu.con.push(&text);
            Ok(Step::Done)
        }
        WRITE_INT => {
            let text = format!("{}", cpu.reg.get(0) as i32);
            cpu.con.push(text.as_bytes());
            Ok(Step::Done)
        }
        WRITE_NEWLINE => {
            cpu.con.push(b"\n");
            Ok(Step::Done)
        }
        READ_CHAR => match cpu.con.read_byte() {
            Some(byte) => {
                cpu.reg.set(0, Word::from(byte));
                Ok(Step::Done)
            }
            None => block(cpu, at),
        },
        READ_STRING => match cpu.con.read_line() {
            Some(line) => {
                let buf = cpu.reg.get(0);
                let cap = cpu.reg.get(1) as usize;
                let take = line.len().min(cap.saturating_sub(1));
                for (idx, &byte) in line[..take].iter().enumerate() {
                    cpu.mem
                        .write(buf.wrapping_add(idx as Word), Width::Byte, Word::from(byte))?;
                }
                if cap > 0 {
                    cpu.mem.write(buf.wrapping_add(take as Word), Width::Byte, 0)?;
                }
                cpu.reg.set(0, take as Word);
                Ok(Step::Done)
            }
            None => block(cpu, at),
        },
        READ_INT => match cpu.con.read_line() {
            Some(line) => {
                let text = String::from_utf8_lossy(&line);
                let value = text.trim().parse::<i64>().unwrap_or_else(|_| {
                    warn!("read_int: unparsable input {text:?}");
                    0
                });
                cpu.reg.set(0, value as Word);
                Ok(Step::Done)
            }
            None => block(cpu, at),
        },
        FILE_OPEN => {
            let name = cstring(cpu, cpu.reg.get(0))?;
            let name = String::from_utf8_lossy(&name).into_owned();
            let mode = cpu.reg.get(1);
            let fd = cpu.vfs.open(&name, mode).unwrap_or(Word::MAX);
            cpu.reg.set(0, fd);
            Ok(Step::Done)
        }
        FILE_CLOSE => {
            let ok = cpu.vfs.close(cpu.reg.get(0));
            cpu.reg.set(0, if ok { 0 } else { Word::MAX });
            Ok(Step::Done)
        }
        FILE_READ => {
            let fd = cpu.reg.get(0);
            let buf = cpu.reg.get(1);
            let len = cpu.reg.get(2) as usize;
            match cpu.vfs.read(fd, len) {
                Some(data) => {
                    for (idx, &byte) in data.iter().enumerate() {
                        cpu.mem
                            .write(buf.wrapping_add(idx as Word), Width::Byte, Word::from(byte))?;
                    }
                    cpu.reg.set(0, data.len() as Word);
                }
                None => cpu.reg.set(0, Word::MAX),
            }
            Ok(Step::Done)
        }
        FILE_WRITE => {
            let fd = cpu.reg.get(0);
            let buf = cpu.reg.get(1);
            let len = cpu.reg.get(2) as usize;
            let data = cpu.mem.view(buf, len)?;
            match cpu.vfs.write(fd, &data) {
                Some(count) => cpu.reg.set(0, count as Word),
                None => cpu.reg.set(0, Word::MAX),
            }
            Ok(Step::Done)
        }
        TIME => {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs());
            cpu.reg.set(0, secs as Word);
            Ok(Step::Done)
        }
        CLOCK => {
            cpu.reg.set(0, cpu.epoch.elapsed().as_millis() as Word);
            Ok(Step::Done)
        }
        RAND => {
            let value = cpu.rng.gen::<Word>();
            cpu.reg.set(0, value);
            Ok(Step::Done)
        }
        _ => Err(Error::UnhandledSwi { addr: at, imm }),
    }
}

/// Parks a blocked read: the PC is rewound so a retry re-issues the SWI.
fn block(cpu: &mut Cpu, at: Word) -> Result<Step> {
    cpu.reg.set_pc(at);
    Ok(Step::Blocked)
}

/// Reads a NUL-terminated string out of memory.
fn cstring(cpu: &Cpu, addr: Word) -> Result<Vec<Byte>> {
    let mut out = Vec::new();
    let mut at = addr;
    loop {
        let byte = cpu.mem.view(at, 1)?[0];
        if byte == 0 {
            return Ok(out);
        }
        out.push(byte);
        at = at.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_tracks_fresh_output() {
        let mut con = Console::default();
        con.push(b"Hello");
        assert_eq!(con.drain_fresh().as_deref(), Some("Hello"));
        assert_eq!(con.drain_fresh(), None);
        con.push(b", World!");
        assert_eq!(con.drain_fresh().as_deref(), Some(", World!"));
        assert_eq!(con.output(), b"Hello, World!");
    }

    #[test]
    fn console_lines_require_a_terminator() {
        let mut con = Console::default();
        con.feed(b"12");
        assert_eq!(con.read_line(), None);
        con.feed(b"3\r\nrest");
        assert_eq!(con.read_line(), Some(b"123".to_vec()));
        assert_eq!(con.pending_input(), 4);
    }

    #[test]
    fn vfs_round_trips_a_file() {
        let mut vfs = Vfs::default();
        assert_eq!(vfs.open("out.txt", 0), None);
        let fd = vfs.open("out.txt", 1).unwrap();
        assert_eq!(vfs.write(fd, b"data"), Some(4));
        assert!(vfs.close(fd));
        let fd = vfs.open("out.txt", 0).unwrap();
        assert_eq!(vfs.read(fd, 16), Some(b"data".to_vec()));
        assert_eq!(vfs.read(fd, 16), Some(Vec::new()));
    }
}
