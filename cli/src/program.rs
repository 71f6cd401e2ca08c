//! The memory-image program text parser.
//!
//! Program text is line based. `#` starts a comment that may itself carry a
//! directive (`START addr`, `EXPECT addr value`); commas, semicolons and
//! colons read as whitespace. A line holds either raw hex bytes or a
//! mnemonic with an operand, and an `@HHH` token moves the write cursor.
//! Tokens that fail to parse are counted, not fatal.

use comtran_core::decode::{self, AddressingMode};

/// One byte destined for memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramWrite {
    /// The target address.
    pub address: u16,
    /// The byte value.
    pub value: u8,
}

/// A post-run expectation taken from an `EXPECT` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expectation {
    /// The address to examine after the run.
    pub address: u16,
    /// The byte the cell must hold.
    pub value: u8,
}

/// Everything a program text file describes.
#[derive(Debug, Clone, Default)]
pub struct ProgramSpec {
    /// The entry point loaded into `PAR`.
    pub entry: u16,
    /// Whether the text named an entry point.
    pub has_entry: bool,
    /// Whether the text used `@` address cursors.
    pub uses_addresses: bool,
    /// The memory writes, in file order.
    pub writes: Vec<ProgramWrite>,
    /// The post-run expectations, in file order.
    pub expects: Vec<Expectation>,
}

/// Token accounting for a parse run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseResult {
    /// Bytes successfully emitted.
    pub parsed: usize,
    /// Tokens that failed to parse.
    pub skipped: usize,
}

/// Parse a hex token with an optional `0x` prefix.
///
/// Byte-only tokens must fit in 8 bits; others in 16.
fn parse_hex_token(token: &str, byte_only: bool) -> Option<u16> {
    let cleaned = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    if cleaned.is_empty() {
        return None;
    }
    let value = u32::from_str_radix(cleaned, 16).ok()?;
    if byte_only && value > 0xFF {
        return None;
    }
    if value > 0xFFFF {
        return None;
    }
    Some(value as u16)
}

/// Parse a flat stream of hex bytes (tape images, expectation files).
#[must_use]
pub fn parse_hex_stream(text: &str) -> (Vec<u8>, ParseResult) {
    let mut bytes = Vec::new();
    let mut result = ParseResult::default();

    for line in text.lines() {
        let code = line.split('#').next().unwrap_or("");
        let cleaned: String = code
            .chars()
            .map(|c| if matches!(c, ',' | ';' | ':') { ' ' } else { c })
            .collect();
        for token in cleaned.split_whitespace() {
            match parse_hex_token(token, true) {
                Some(value) => bytes.push(value as u8),
                None => result.skipped += 1,
            }
        }
    }

    result.parsed = bytes.len();
    (bytes, result)
}

fn parse_directive(comment: &str, spec: &mut ProgramSpec) {
    let mut tokens = comment.split_whitespace();
    match tokens.next() {
        Some("START") => {
            if let Some(value) = tokens.next().and_then(|t| parse_hex_token(t, false)) {
                spec.entry = value & 0x3FF;
                spec.has_entry = true;
            }
        }
        Some("EXPECT") => {
            let address = tokens.next().and_then(|t| parse_hex_token(t, false));
            let value = tokens.next().and_then(|t| parse_hex_token(t, true));
            if let (Some(address), Some(value)) = (address, value) {
                spec.expects.push(Expectation {
                    address: address & 0x3FF,
                    value: value as u8,
                });
            }
        }
        _ => {}
    }
}

struct Emitter {
    spec: ProgramSpec,
    result: ParseResult,
    cursor: u16,
}

impl Emitter {
    fn emit(&mut self, value: u8) {
        self.spec.writes.push(ProgramWrite {
            address: self.cursor,
            value,
        });
        self.cursor = self.cursor.wrapping_add(1) & 0x3FF;
        self.result.parsed += 1;
    }

    fn move_cursor(&mut self, address: u16) {
        self.cursor = address & 0x3FF;
        self.spec.uses_addresses = true;
        if !self.spec.has_entry && self.spec.writes.is_empty() {
            self.spec.entry = self.cursor;
            self.spec.has_entry = true;
        }
    }
}

/// Parse full program text into a [`ProgramSpec`].
#[must_use]
pub fn parse_program(text: &str) -> (ProgramSpec, ParseResult) {
    let mut emitter = Emitter {
        spec: ProgramSpec::default(),
        result: ParseResult::default(),
        cursor: 0,
    };

    for line in text.lines() {
        let (code, comment) = match line.find('#') {
            Some(hash) => (&line[..hash], Some(line[hash + 1..].trim_start())),
            None => (line, None),
        };
        if let Some(comment) = comment {
            if !comment.is_empty() {
                parse_directive(comment, &mut emitter.spec);
            }
        }

        let cleaned: String = code
            .chars()
            .map(|c| if matches!(c, ',' | ';' | ':') { ' ' } else { c })
            .collect();
        let tokens: Vec<&str> = cleaned.split_whitespace().collect();

        let mut index = 0;
        while index < tokens.len() {
            let token = tokens[index];
            index += 1;

            if let Some(rest) = token.strip_prefix('@') {
                match parse_hex_token(rest, false) {
                    Some(address) => emitter.move_cursor(address),
                    None => emitter.result.skipped += 1,
                }
                continue;
            }

            if let Some(inst) = decode::from_mnemonic(token) {
                index = assemble(&mut emitter, inst, &tokens, index);
                continue;
            }

            match parse_hex_token(token, true) {
                Some(value) => emitter.emit(value as u8),
                None => emitter.result.skipped += 1,
            }
        }
    }

    (emitter.spec, emitter.result)
}

/// Assemble one mnemonic line starting at `index`; returns the next token
/// index.
fn assemble(
    emitter: &mut Emitter,
    inst: decode::Instruction,
    tokens: &[&str],
    mut index: usize,
) -> usize {
    let is_index_marker = |token: &str| token.eq_ignore_ascii_case("x");

    let mut indexed = false;
    if inst.mode == AddressingMode::Paged
        && tokens.get(index).copied().is_some_and(is_index_marker)
    {
        indexed = true;
        index += 1;
    }

    let Some(operand) = tokens
        .get(index)
        .and_then(|token| parse_hex_token(token, false))
    else {
        emitter.result.skipped += 1;
        return index;
    };
    index += 1;

    if inst.mode == AddressingMode::Paged
        && tokens.get(index).copied().is_some_and(is_index_marker)
    {
        indexed = true;
        index += 1;
    }

    match inst.mode {
        AddressingMode::Immediate => {
            if operand > 0xFF {
                emitter.result.skipped += 1;
                return index;
            }
            emitter.emit(inst.opcode);
            emitter.emit((operand & 0xFF) as u8);
        }
        AddressingMode::Paged => {
            if operand > 0x3FF {
                emitter.result.skipped += 1;
                return index;
            }
            let page = ((operand >> 8) & 0x03) as u8;
            let opcode = inst.opcode | page | if indexed { 0x04 } else { 0x00 };
            emitter.emit(opcode);
            emitter.emit((operand & 0xFF) as u8);
        }
        AddressingMode::Unknown => emitter.result.skipped += 1,
    }
    index
}
