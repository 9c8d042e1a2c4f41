//! Read-only example catalogue.
//!
//! Sources are embedded at build time and looked up by catalogue name, so
//! there is no filesystem access to traverse.

/// One catalogue entry.
#[derive(Clone, Copy, Debug)]
pub struct Example {
    /// Lookup name.
    pub name: &'static str,
    /// Human-readable title.
    pub title: &'static str,
    /// Assembly source.
    pub source: &'static str,
}

/// The shipped examples.
pub const EXAMPLES: &[Example] = &[
    Example {
        name: "hello",
        title: "Hello, World!",
        source: include_str!("../../../demos/hello.s"),
    },
    Example {
        name: "sum",
        title: "Sum 1..10",
        source: include_str!("../../../demos/sum.s"),
    },
    Example {
        name: "count",
        title: "Counting loop (breakpoint demo)",
        source: include_str!("../../../demos/count.s"),
    },
    Example {
        name: "echo",
        title: "Console echo (stdin demo)",
        source: include_str!("../../../demos/echo.s"),
    },
    Example {
        name: "fib",
        title: "Fibonacci with a subroutine",
        source: include_str!("../../../demos/fib.s"),
    },
];

/// Looks up an example by name.
#[must_use]
pub fn find(name: &str) -> Option<&'static Example> {
    EXAMPLES.iter().find(|example| example.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_example_assembles() {
        for example in EXAMPLES {
            let prog = armlet::asm::assemble(example.source)
                .unwrap_or_else(|notes| panic!("{} failed: {notes:?}", example.name));
            assert!(!prog.code.is_empty(), "{} is empty", example.name);
            assert_eq!(prog.entry, 0x8000, "{} entry", example.name);
        }
    }

    #[test]
    fn lookup_is_by_name_only() {
        assert!(find("hello").is_some());
        assert!(find("../etc/passwd").is_none());
        assert!(find("missing").is_none());
    }
}
