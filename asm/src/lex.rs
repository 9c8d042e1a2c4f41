//! Line tokenizer.
//!
//! Assembly is line-oriented: each source line is tokenized independently
//! and carries 1-based column positions into the diagnostics. Comments run
//! from `;` or `@` to the end of the line.

use crate::Note;

/// A lexical token.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    /// Identifier: mnemonic, register, label, symbol, or directive word.
    Ident(String),
    /// Integer literal (decimal, `0x`, `0b`, or a character literal).
    Num(i64),
    /// String literal, unescaped.
    Str(Vec<u8>),
    /// Single punctuation character.
    Punct(char),
}

/// A token with its source column.
#[derive(Clone, Debug)]
pub(crate) struct Spanned {
    pub tok: Token,
    pub col: u32,
}

/// Tokenizes one line.
pub(crate) fn lex(line: &str, number: u32) -> Result<Vec<Spanned>, Note> {
    let mut out = Vec::new();
    let bytes: Vec<char> = line.chars().collect();
    let mut idx = 0;
    while idx < bytes.len() {
        let col = idx as u32 + 1;
        let ch = bytes[idx];
        match ch {
            ';' | '@' => break,
            c if c.is_whitespace() => idx += 1,
            c if c.is_ascii_alphabetic() || c == '_' || c == '.' => {
                let start = idx;
                while idx < bytes.len()
                    && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == '_' || bytes[idx] == '.')
                {
                    idx += 1;
                }
                let word: String = bytes[start..idx].iter().collect();
                out.push(Spanned {
                    tok: Token::Ident(word),
                    col,
                });
            }
            c if c.is_ascii_digit() => {
                let start = idx;
                while idx < bytes.len() && bytes[idx].is_ascii_alphanumeric() {
                    idx += 1;
                }
                let word: String = bytes[start..idx].iter().collect();
                let value = number_literal(&word)
                    .ok_or_else(|| Note::new(number, col, format!("bad number `{word}`")))?;
                out.push(Spanned {
                    tok: Token::Num(value),
                    col,
                });
            }
            '\'' => {
                let (value, len) = char_literal(&bytes[idx..])
                    .ok_or_else(|| Note::new(number, col, "bad character literal".to_string()))?;
                idx += len;
                out.push(Spanned {
                    tok: Token::Num(i64::from(value)),
                    col,
                });
            }
            '"' => {
                let (value, len) = string_literal(&bytes[idx..])
                    .ok_or_else(|| Note::new(number, col, "unterminated string".to_string()))?;
                idx += len;
                out.push(Spanned {
                    tok: Token::Str(value),
                    col,
                });
            }
            c if "#,[]{}!^=:()+-*/".contains(c) => {
                idx += 1;
                out.push(Spanned {
                    tok: Token::Punct(c),
                    col,
                });
            }
            c => {
                return Err(Note::new(number, col, format!("unexpected character `{c}`")));
            }
        }
    }
    Ok(out)
}

/// Parses a decimal / hex / binary literal.
fn number_literal(word: &str) -> Option<i64> {
    if let Some(hex) = word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = word.strip_prefix("0b").or_else(|| word.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()
    } else {
        word.parse().ok()
    }
}

/// Parses `'c'` or an escaped `'\n'`-style literal, returning the byte and
/// consumed length in chars.
fn char_literal(chars: &[char]) -> Option<(u8, usize)> {
    match chars {
        ['\'', '\\', esc, '\'', ..] => Some((escape(*esc)?, 4)),
        ['\'', c, '\'', ..] if *c != '\\' => Some((u8::try_from(*c as u32).ok()?, 3)),
        _ => None,
    }
}

/// Parses a double-quoted string with escapes.
fn string_literal(chars: &[char]) -> Option<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut idx = 1;
    while idx < chars.len() {
        match chars[idx] {
            '"' => return Some((out, idx + 1)),
            '\\' => {
                out.push(escape(*chars.get(idx + 1)?)?);
                idx += 2;
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                idx += 1;
            }
        }
    }
    None
}

fn escape(c: char) -> Option<u8> {
    match c {
        'n' => Some(b'\n'),
        'r' => Some(b'\r'),
        't' => Some(b'\t'),
        '0' => Some(0),
        '\\' => Some(b'\\'),
        '\'' => Some(b'\''),
        '"' => Some(b'"'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_a_typical_line() {
        let toks = lex("loop: ADD R0, R0, #1 ; bump", 1).unwrap();
        let kinds: Vec<_> = toks.iter().map(|s| s.tok.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Ident("loop".into()),
                Token::Punct(':'),
                Token::Ident("ADD".into()),
                Token::Ident("R0".into()),
                Token::Punct(','),
                Token::Ident("R0".into()),
                Token::Punct(','),
                Token::Punct('#'),
                Token::Num(1),
            ]
        );
    }

    #[test]
    fn reads_radix_and_char_literals() {
        let toks = lex(".word 0x10, 0b101, 'A', '\\n'", 1).unwrap();
        let nums: Vec<_> = toks
            .iter()
            .filter_map(|s| match s.tok {
                Token::Num(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(nums, vec![0x10, 5, 65, 10]);
    }

    #[test]
    fn reads_strings_with_escapes() {
        let toks = lex(r#".asciz "hi\n""#, 1).unwrap();
        assert_eq!(toks[1].tok, Token::Str(b"hi\n".to_vec()));
    }

    #[test]
    fn reports_bad_characters_with_columns() {
        let err = lex("MOV R0, $5", 3).unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.col, 9);
    }
}
