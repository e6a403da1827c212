// src/keystroke/codec.rs

//! Record format of keystrokes held in the stream's FIFO.
//!
//! A byte `0x00..=0x7F` on its own is a complete, well formed `Char`.
//! Anything else is a compound record `<header> <length> [<bytes>]`:
//!
//! ```text
//!   header  b7    = 1 (compound)
//!           b6    = 0 (reserved)
//!           b5    = broken
//!           b4    = truncated
//!           b3..0 = KeystrokeType tag
//!   length  number of bytes that follow, at most the stream's max length
//! ```
//!
//! For `Csi` the last stored byte is always the final byte of the sequence
//! (or `CSI_NONE`), even when earlier bytes had to be dropped.

use super::{Keystroke, KeystrokeFlags, KeystrokeType, KEYSTROKE_MAX_LEN};
use crate::fifo::ByteFifo;
use log::trace;

const RECORD_COMPOUND: u8 = 0x80;
const RECORD_BROKEN: u8 = 0x20;
const RECORD_TRUNCATED: u8 = 0x10;
const RECORD_TYPE_MASK: u8 = 0x0F;

/// Appends one compound record.
///
/// `len` is the full length of the construct and may exceed `max_len`, in
/// which case only `raw[..max_len]` is stored and the record is marked
/// truncated.
pub(super) fn put_record(
    fifo: &mut ByteFifo,
    kind: KeystrokeType,
    broken: bool,
    raw: &[u8],
    len: usize,
    max_len: usize,
) {
    debug_assert!(kind != KeystrokeType::Null, "Null keystroke never goes in the FIFO");
    let max_len = max_len.min(KEYSTROKE_MAX_LEN);

    let mut header = RECORD_COMPOUND | kind.tag();
    if broken {
        header |= RECORD_BROKEN;
    }
    let stored = if len > max_len {
        header |= RECORD_TRUNCATED;
        max_len
    } else {
        len
    };

    trace!(
        "record {:?} broken={} len={} stored={}",
        kind,
        broken,
        len,
        stored
    );
    fifo.put_byte(header);
    fifo.put_byte(stored as u8);
    if stored > 0 {
        fifo.put(&raw[..stored]);
    }
}

/// Appends a well formed character.
///
/// Values below 0x80 take a single byte; larger ones are written as a
/// `Char` record holding the value in network order.
pub(super) fn put_char(fifo: &mut ByteFifo, value: u32) {
    if value < 0x80 {
        fifo.put_byte(value as u8);
        return;
    }
    let be = value.to_be_bytes();
    let skip = be.iter().take_while(|&&b| b == 0).count();
    let bytes = &be[skip..];
    put_record(fifo, KeystrokeType::Char, false, bytes, bytes.len(), KEYSTROKE_MAX_LEN);
}

fn next_byte(fifo: &mut ByteFifo) -> u8 {
    match fifo.get_byte() {
        Some(b) => b,
        // The encoder only ever writes whole records.
        None => panic!("keystroke FIFO holds a partial record"),
    }
}

/// Pops and decodes one keystroke.
///
/// An empty FIFO gives a `Null` keystroke, tagged end-of-stream if `eof_met`.
///
/// # Panics
///
/// If the FIFO holds anything the encoder could not have written.
pub(super) fn decode(fifo: &mut ByteFifo, eof_met: bool) -> Keystroke {
    let Some(first) = fifo.get_byte() else {
        return Keystroke::null(eof_met);
    };

    // Simple character, stored as itself.
    if first & RECORD_COMPOUND == 0 {
        return Keystroke::from_parts(
            KeystrokeType::Char,
            u32::from(first),
            KeystrokeFlags::empty(),
            &[first],
        );
    }

    let kind = match KeystrokeType::from_tag(first & RECORD_TYPE_MASK) {
        Some(KeystrokeType::Null) => panic!("Null keystroke found in FIFO"),
        Some(kind) => kind,
        None => panic!("unknown keystroke type in FIFO: header {:#04X}", first),
    };
    let flags = KeystrokeFlags::from_bits_truncate(first & (RECORD_BROKEN | RECORD_TRUNCATED));

    let len = usize::from(next_byte(fifo));
    assert!(len <= KEYSTROKE_MAX_LEN, "keystroke record length {} too long", len);

    let mut stroke = Keystroke::from_parts(kind, 0, flags, &[]);
    for slot in stroke.buf[..len].iter_mut() {
        *slot = next_byte(fifo);
    }
    stroke.len = len;

    match kind {
        KeystrokeType::Null => unreachable!(),
        KeystrokeType::Char => {
            // Broken or truncated characters keep the raw bytes and value 0.
            if flags.is_empty() {
                assert!(
                    (1..=4).contains(&len),
                    "well formed Char record with {} bytes",
                    len
                );
                stroke.value = stroke.bytes().iter().fold(0, |v, &b| (v << 8) | u32::from(b));
            }
        }
        KeystrokeType::Esc => {
            // Length 0 only happens when EOF followed the ESC.
            if len == 1 {
                stroke.value = u32::from(stroke.buf[0]);
            } else {
                assert_eq!(len, 0, "Esc record with {} bytes", len);
            }
        }
        KeystrokeType::Csi => {
            // Last stored byte is the final byte; what precedes it are the
            // parameters, which get a NUL in its place.
            if len != 0 {
                stroke.len -= 1;
                stroke.value = u32::from(stroke.buf[stroke.len]);
            }
            stroke.buf[stroke.len] = 0;
        }
        KeystrokeType::Iac => {
            if len > 0 {
                stroke.value = u32::from(stroke.buf[0]);
            }
        }
    }
    stroke
}
