//! Program objects and source mapping.
//!
//! A [`Program`] is the resolved artifact handed to the machine by the
//! assembler front-end: encoded instructions carrying their source line,
//! data placements, and the symbol table. The [`SourceMap`] derived from it
//! lets the debugger and its clients translate between addresses, source
//! lines, and symbols. The map is immutable once built and replaced
//! wholesale on every load.

use std::collections::{BTreeMap, HashMap};

use armlet_arch::Word;
use indexmap::IndexMap;

/// One encoded instruction with its source provenance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Line {
    /// Word-aligned instruction address.
    pub addr: Word,
    /// Encoded 32-bit instruction.
    pub code: Word,
    /// 1-based source line number.
    pub number: u32,
    /// Source text of the line, trimmed.
    pub text: String,
}

/// A contiguous data placement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Chunk {
    /// Placement address.
    pub addr: Word,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

/// A resolved program ready for loading.
#[derive(Clone, Debug, Default)]
pub struct Program {
    /// Load origin of the code.
    pub origin: Word,
    /// Entry point address.
    pub entry: Word,
    /// Encoded instructions in address order.
    pub code: Vec<Line>,
    /// Data placements.
    pub data: Vec<Chunk>,
    /// Symbol table in declaration order.
    pub symbols: IndexMap<String, Word>,
}

impl Program {
    /// The half-open address span covered by code and data.
    ///
    /// Returns `None` for an empty program.
    #[must_use]
    pub fn span(&self) -> Option<(Word, Word)> {
        let mut lo = Word::MAX;
        let mut hi = Word::MIN;
        for line in &self.code {
            lo = lo.min(line.addr);
            hi = hi.max(line.addr + 4);
        }
        for chunk in &self.data {
            lo = lo.min(chunk.addr);
            hi = hi.max(chunk.addr + chunk.bytes.len() as Word);
        }
        (lo < hi).then_some((lo, hi))
    }
}

/// An address-to-source entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Located {
    /// Instruction address.
    pub addr: Word,
    /// 1-based source line number.
    pub number: u32,
    /// Source text of the line.
    pub text: String,
}

/// Bidirectional address/line/symbol lookup tables.
#[derive(Clone, Debug, Default)]
pub struct SourceMap {
    line_by_addr: BTreeMap<Word, (u32, String)>,
    addr_by_line: BTreeMap<u32, Word>,
    sym_by_addr: HashMap<Word, String>,
    addr_by_sym: IndexMap<String, Word>,
}

impl SourceMap {
    /// Builds the lookup tables for a program.
    #[must_use]
    pub fn build(prog: &Program) -> Self {
        let mut map = Self::default();
        for line in &prog.code {
            map.line_by_addr
                .insert(line.addr, (line.number, line.text.clone()));
            map.addr_by_line.insert(line.number, line.addr);
        }
        for (name, &addr) in &prog.symbols {
            map.addr_by_sym.insert(name.clone(), addr);
            // First symbol at an address wins the reverse mapping.
            map.sym_by_addr.entry(addr).or_insert_with(|| name.clone());
        }
        map
    }

    /// Tests whether an address holds an instruction.
    #[must_use]
    pub fn is_code(&self, addr: Word) -> bool {
        self.line_by_addr.contains_key(&addr)
    }

    /// Source line for an instruction address.
    #[must_use]
    pub fn line_at(&self, addr: Word) -> Option<(u32, &str)> {
        self.line_by_addr
            .get(&addr)
            .map(|(number, text)| (*number, text.as_str()))
    }

    /// Instruction address for a source line.
    #[must_use]
    pub fn addr_of_line(&self, number: u32) -> Option<Word> {
        self.addr_by_line.get(&number).copied()
    }

    /// Symbol defined at an address.
    #[must_use]
    pub fn symbol_at(&self, addr: Word) -> Option<&str> {
        self.sym_by_addr.get(&addr).map(String::as_str)
    }

    /// Address of a symbol.
    #[must_use]
    pub fn addr_of(&self, symbol: &str) -> Option<Word> {
        self.addr_by_sym.get(symbol).copied()
    }

    /// Symbols in declaration order.
    pub fn symbols(&self) -> impl Iterator<Item = (&str, Word)> {
        self.addr_by_sym.iter().map(|(name, &addr)| (name.as_str(), addr))
    }

    /// Address-ordered source entries, cloned for external consumers.
    #[must_use]
    pub fn entries(&self) -> Vec<Located> {
        self.line_by_addr
            .iter()
            .map(|(&addr, (number, text))| Located {
                addr,
                number: *number,
                text: text.clone(),
            })
            .collect()
    }

    /// Number of mapped instruction addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.line_by_addr.len()
    }

    /// Tests whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.line_by_addr.is_empty()
    }
}
