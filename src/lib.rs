// src/lib.rs

//! Keystroke decoding for Telnet-carried terminal sessions.
//!
//! Feed raw connection bytes into a [`KeystrokeStream`] and fetch back
//! classified [`Keystroke`]s: characters, `ESC X` keys, ANSI CSI sequences
//! and Telnet `IAC` commands, however the input was split up on the way in.

pub mod config;
pub mod fifo;
pub mod keystroke;

pub use config::KeystrokeConfig;
pub use keystroke::{
    Keystroke, KeystrokeFlags, KeystrokeRecord, KeystrokeStream, KeystrokeType, NullKind, CSI_NONE, ESC,
    KEYSTROKE_MAX_LEN,
};
