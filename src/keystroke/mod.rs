// src/keystroke/mod.rs

//! Keystroke decoding for interactive terminal sessions.
//!
//! Raw bytes from the connection go into a [`KeystrokeStream`], which splits
//! them into plain characters, `ESC X` keys, ANSI CSI sequences and Telnet
//! `IAC` commands. Finished keystrokes are buffered in a compact record form
//! and fetched back one at a time as [`Keystroke`] values.

mod codec;
mod stream;
pub mod telnet;

use bitflags::bitflags;
use serde::Serialize;
use std::fmt;

pub use stream::KeystrokeStream;

/// Maximum number of raw bytes retained for a single keystroke.
///
/// Longer CSI sequences and Telnet sub-negotiations are marked truncated.
pub const KEYSTROKE_MAX_LEN: usize = 100;

/// The escape byte, which starts both `ESC X` keys and `ESC [` sequences.
pub const ESC: u8 = 0x1B;

/// Terminator value recorded for a CSI sequence that ended without one.
pub const CSI_NONE: u8 = 0x00;

/// The kind of a keystroke.
///
/// The discriminant is the 4-bit type tag used in the buffered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[repr(u8)]
pub enum KeystrokeType {
    /// Nothing available; see [`NullKind`].
    #[default]
    Null = 0,
    /// A character. `value` is the character value.
    Char = 1,
    /// `ESC X`. `value` is X.
    Esc = 2,
    /// `ESC [ ... X` or `CSI ... X`. `value` is the final byte X.
    Csi = 3,
    /// Telnet `IAC X ...`. `value` is X.
    Iac = 4,
}

impl KeystrokeType {
    /// Maps a record type tag back to a type. `None` for unknown tags.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(KeystrokeType::Null),
            1 => Some(KeystrokeType::Char),
            2 => Some(KeystrokeType::Esc),
            3 => Some(KeystrokeType::Csi),
            4 => Some(KeystrokeType::Iac),
            _ => None,
        }
    }

    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }
}

bitflags! {
    /// Abnormal outcomes carried on a keystroke.
    ///
    /// The bit values match the record header so they can be copied across.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct KeystrokeFlags: u8 {
        /// Ended by a malformed byte or by end of input.
        const BROKEN = 0x20;
        /// Longer than the retained length; interior bytes were dropped.
        const TRUNCATED = 0x10;
    }
}

/// The `value` of a [`KeystrokeType::Null`] keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum NullKind {
    /// Nothing ready yet, more input may arrive.
    NotEof = 0,
    /// Nothing ready and nothing more will arrive.
    Eof = 1,
}

/// A single decoded keystroke.
///
/// `buf[..len]` holds the payload:
///
/// * `Char`: the character value, big-endian (or the raw bytes if broken).
/// * `Esc`: the byte after ESC (empty if broken at end of input).
/// * `Csi`: the parameter bytes, followed by a NUL at `buf[len]`.
/// * `Iac`: the command byte and anything after it, excluding `IAC SE`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Keystroke {
    pub kind: KeystrokeType,
    pub value: u32,
    pub flags: KeystrokeFlags,
    pub len: usize,
    pub buf: [u8; KEYSTROKE_MAX_LEN + 1],
}

impl Default for Keystroke {
    fn default() -> Self {
        Keystroke::null(false)
    }
}

impl Keystroke {
    /// A `Null` keystroke, tagged end-of-stream if `eof`.
    pub fn null(eof: bool) -> Self {
        let kind = if eof { NullKind::Eof } else { NullKind::NotEof };
        Keystroke {
            kind: KeystrokeType::Null,
            value: kind as u32,
            flags: KeystrokeFlags::empty(),
            len: 0,
            buf: [0; KEYSTROKE_MAX_LEN + 1],
        }
    }

    /// Builds a keystroke from its parts. `bytes` beyond the buffer are dropped.
    pub fn from_parts(kind: KeystrokeType, value: u32, flags: KeystrokeFlags, bytes: &[u8]) -> Self {
        let mut stroke = Keystroke {
            kind,
            value,
            flags,
            len: 0,
            buf: [0; KEYSTROKE_MAX_LEN + 1],
        };
        let len = bytes.len().min(KEYSTROKE_MAX_LEN);
        stroke.buf[..len].copy_from_slice(&bytes[..len]);
        stroke.len = len;
        stroke
    }

    /// The meaningful payload bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn is_null(&self) -> bool {
        self.kind == KeystrokeType::Null
    }

    /// True for the `Null` keystroke that signals end of stream.
    pub fn is_eof(&self) -> bool {
        self.is_null() && self.value == NullKind::Eof as u32
    }

    pub fn is_broken(&self) -> bool {
        self.flags.contains(KeystrokeFlags::BROKEN)
    }

    pub fn is_truncated(&self) -> bool {
        self.flags.contains(KeystrokeFlags::TRUNCATED)
    }

    /// Borrowed view for structured output.
    pub fn record(&self) -> KeystrokeRecord<'_> {
        KeystrokeRecord {
            kind: self.kind,
            value: self.value,
            flags: self.flags,
            bytes: self.bytes(),
        }
    }
}

/// A keystroke without its fixed buffer, as written by `keystroke-reader --json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeystrokeRecord<'a> {
    pub kind: KeystrokeType,
    pub value: u32,
    pub flags: KeystrokeFlags,
    pub bytes: &'a [u8],
}

impl fmt::Debug for Keystroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keystroke")
            .field("kind", &self.kind)
            .field("value", &format_args!("{:#04X}", self.value))
            .field("flags", &self.flags)
            .field("bytes", &self.bytes())
            .finish()
    }
}

fn printable(value: u32) -> char {
    match char::from_u32(value) {
        Some(c) if !c.is_control() => c,
        _ => '.',
    }
}

impl fmt::Display for Keystroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            KeystrokeType::Null => {
                return f.write_str(if self.is_eof() { "Null (eof)" } else { "Null" });
            }
            KeystrokeType::Char => write!(f, "Char {:#04X} '{}'", self.value, printable(self.value))?,
            KeystrokeType::Esc => write!(f, "Esc '{}'", printable(self.value))?,
            KeystrokeType::Csi => write!(
                f,
                "Csi '{}' {:?}",
                printable(self.value),
                String::from_utf8_lossy(self.bytes())
            )?,
            KeystrokeType::Iac => {
                write!(f, "Iac {} [", telnet::command_name(self.value as u8))?;
                for (i, b) in self.bytes().iter().skip(1).enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{:02X}", b)?;
                }
                f.write_str("]")?;
            }
        }
        if self.is_broken() {
            f.write_str(" broken")?;
        }
        if self.is_truncated() {
            f.write_str(" truncated")?;
        }
        Ok(())
    }
}
