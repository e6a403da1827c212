// src/keystroke/stream.rs

//! The keystroke stream: a byte-at-a-time state machine feeding the FIFO.
//!
//! Telnet commands may turn up anywhere, including in the middle of an
//! `ESC` or CSI sequence. They are lifted out of whatever they interrupt and
//! appear in the keystroke stream ahead of it. Only one level of interruption
//! exists: a Telnet command cannot itself be interrupted.

use super::codec;
use super::telnet::{self, IAC, SB, SE};
use super::{Keystroke, KeystrokeFlags, KeystrokeType, CSI_NONE, ESC, KEYSTROKE_MAX_LEN};
use crate::config::KeystrokeConfig;
use crate::fifo::ByteFifo;
use log::{debug, trace, warn};

/// What is being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum StreamState {
    /// Between keystrokes (a pending IAC is tracked separately).
    #[default]
    Idle,
    /// Seen ESC, waiting for the next byte.
    AfterEsc,
    /// Inside `ESC [` or CSI, collecting parameter bytes.
    CollectingCsi,
    /// Seen `IAC X` with X in SB..=DONT, waiting for the option byte.
    IacOption,
    /// Inside `IAC SB`, waiting for `IAC SE`.
    IacSub,
}

/// A construct in progress.
///
/// `len` keeps counting past the end of `raw` so truncation can be reported.
#[derive(Debug, Clone, Copy)]
struct Construct {
    state: StreamState,
    len: usize,
    raw: [u8; KEYSTROKE_MAX_LEN],
}

impl Default for Construct {
    fn default() -> Self {
        Construct {
            state: StreamState::Idle,
            len: 0,
            raw: [0; KEYSTROKE_MAX_LEN],
        }
    }
}

impl Construct {
    fn begin(state: StreamState) -> Self {
        Construct {
            state,
            ..Construct::default()
        }
    }
}

/// Whether the byte just examined was used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Consumed,
    /// Run the same byte through the machine again.
    Reprocess,
}

/// Per-call steal bookkeeping.
#[derive(Debug, Default)]
struct StealSlot {
    /// The caller still wants a keystroke from this call.
    armed: bool,
    taken: Option<Keystroke>,
}

/// Decodes raw terminal input into keystrokes.
///
/// Not internally synchronised: one caller at a time.
#[derive(Debug)]
pub struct KeystrokeStream {
    fifo: ByteFifo,
    /// CSI byte; ESC here means there is no CSI shorthand.
    csi: u8,
    max_len: usize,
    eof_met: bool,
    /// Deliver the construct now in progress through the steal slot.
    steal_this: bool,
    /// The previous byte was an IAC not yet classified.
    iac: bool,
    input: Construct,
    /// What `input` held when a Telnet command interrupted it.
    pushed: Option<Construct>,
}

impl Default for KeystrokeStream {
    fn default() -> Self {
        Self::new(0)
    }
}

impl KeystrokeStream {
    /// Creates a stream. `csi` is the 8-bit CSI byte, 0 for none.
    pub fn new(csi: u8) -> Self {
        Self::with_config(&KeystrokeConfig {
            csi,
            ..KeystrokeConfig::default()
        })
    }

    /// Creates a stream from a configuration. An out of range `max_len` is
    /// clamped to `1..=KEYSTROKE_MAX_LEN`.
    pub fn with_config(config: &KeystrokeConfig) -> Self {
        let csi = if config.csi == 0 { ESC } else { config.csi };
        debug!(
            "new keystroke stream: csi={:#04X} max_len={}",
            csi, config.max_len
        );
        KeystrokeStream {
            fifo: ByteFifo::with_capacity(config.fifo_capacity),
            csi,
            max_len: config.max_len.clamp(1, KEYSTROKE_MAX_LEN),
            eof_met: false,
            steal_this: false,
            iac: false,
            input: Construct::default(),
            pushed: None,
        }
    }

    /// True if no finished keystroke is waiting. There may still be a
    /// partial one in progress.
    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    /// Number of encoded bytes waiting in the FIFO.
    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    /// True once EOF has been signalled and every keystroke fetched.
    pub fn is_eof(&self) -> bool {
        self.fifo.is_empty() && self.eof_met
    }

    /// Puts the stream at EOF immediately, discarding everything buffered or
    /// in progress.
    pub fn force_eof(&mut self) {
        debug!("forcing EOF, discarding {} buffered bytes", self.fifo.len());
        self.fifo.reset();
        self.eof_met = true;
        self.steal_this = false;
        self.iac = false;
        self.input = Construct::default();
        self.pushed = None;
    }

    /// Feeds raw input. An empty slice signals EOF.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.input_bytes(bytes, None);
    }

    /// Signals that no more input will arrive.
    pub fn feed_eof(&mut self) {
        self.input_bytes(&[], None);
    }

    /// Feeds raw input and tries to steal the next keystroke to complete.
    ///
    /// Returns true if a keystroke was stolen into `out`; otherwise `out` is
    /// set to a `Null` keystroke and the caller should try again with the
    /// next input. Stealing only starts from between keystrokes, never part
    /// way through one; broken and truncated keystrokes and Telnet commands
    /// are never stolen.
    pub fn feed_and_steal(&mut self, bytes: &[u8], out: &mut Keystroke) -> bool {
        self.input_bytes(bytes, Some(out))
    }

    /// Fetches the next buffered keystroke into `out`.
    ///
    /// Returns false, with `out` set to `Null`, if nothing is ready.
    pub fn fetch(&mut self, out: &mut Keystroke) -> bool {
        *out = codec::decode(&mut self.fifo, self.eof_met);
        !out.is_null()
    }

    /// Fetches every buffered keystroke.
    pub fn drain(&mut self) -> Vec<Keystroke> {
        let mut strokes = Vec::new();
        let mut stroke = Keystroke::default();
        while self.fetch(&mut stroke) {
            strokes.push(stroke);
        }
        strokes
    }

    fn input_bytes(&mut self, bytes: &[u8], out: Option<&mut Keystroke>) -> bool {
        if bytes.is_empty() {
            self.finish_at_eof();
        }

        // A construct started under a steal in an earlier call stays stolen
        // for as long as the caller keeps asking.
        let wants_steal = out.is_some();
        self.steal_this = wants_steal
            && !self.eof_met
            && (self.steal_this || self.input.state == StreamState::Idle);
        if wants_steal && !self.eof_met && !self.steal_this {
            debug!(
                "steal requested part way through {:?}, not stealing",
                self.input.state
            );
        }
        let mut slot = StealSlot {
            armed: self.steal_this,
            taken: None,
        };

        if self.eof_met && !bytes.is_empty() {
            warn!("discarding {} bytes received after EOF", bytes.len());
        } else {
            let mut pos = 0;
            while let Some(&byte) = bytes.get(pos) {
                if self.step(byte, &mut slot) == Step::Consumed {
                    pos += 1;
                }
            }
        }

        match out {
            Some(out) => match slot.taken {
                Some(stroke) => {
                    debug!("stole {}", stroke);
                    *out = stroke;
                    true
                }
                None => {
                    *out = Keystroke::null(self.eof_met);
                    false
                }
            },
            None => false,
        }
    }

    /// Converts whatever is in progress into broken keystrokes.
    fn finish_at_eof(&mut self) {
        self.eof_met = true;
        self.steal_this = false;

        // A lone IAC between keystrokes is a command cut short. One pending
        // inside an escape or a sub-negotiation just goes with it.
        if self.iac && self.input.state == StreamState::Idle {
            debug!("EOF after IAC");
            self.put_record(KeystrokeType::Iac, true, &[], 0);
        }
        self.iac = false;

        // Loops because a Telnet command may have interrupted an escape.
        while self.input.state != StreamState::Idle {
            debug!("EOF in {:?}", self.input.state);
            match self.input.state {
                StreamState::Idle => unreachable!(),
                StreamState::AfterEsc => {
                    self.put_record(KeystrokeType::Esc, true, &[], 0);
                    self.input = Construct::default();
                }
                StreamState::CollectingCsi => {
                    self.finish_csi(CSI_NONE, &mut StealSlot::default());
                }
                StreamState::IacOption | StreamState::IacSub => self.finish_telnet(true),
            }
        }
    }

    fn step(&mut self, byte: u8, slot: &mut StealSlot) -> Step {
        // IAC takes precedence over everything except the option byte,
        // which may legitimately be 0xFF.
        if byte == IAC && self.input.state != StreamState::IacOption {
            if !self.iac {
                self.iac = true;
                return Step::Consumed;
            }
            // IAC IAC is a literal 0xFF, handled below as data.
            self.iac = false;
        } else if self.iac {
            self.iac = false;
            return self.telnet_command(byte);
        }

        // No IAC in play, so the byte belongs to whatever is being collected.
        match self.input.state {
            StreamState::Idle => self.idle(byte, slot),
            StreamState::AfterEsc => self.after_esc(byte, slot),
            StreamState::CollectingCsi => self.collecting_csi(byte, slot),
            StreamState::IacOption => {
                // The option byte: WILL/WONT/DO/DONT end here, SB goes on to
                // collect the sub-negotiation body.
                assert_eq!(self.input.len, 1, "IAC option wait with {} bytes", self.input.len);
                self.add_raw(byte);
                if self.input.raw[0] == SB {
                    trace!("IacOption -> IacSub (option {:#04X})", byte);
                    self.input.state = StreamState::IacSub;
                } else {
                    self.finish_telnet(false);
                }
                Step::Consumed
            }
            StreamState::IacSub => {
                // Body byte; IAC IAC has already been folded to 0xFF above.
                self.add_raw(byte);
                Step::Consumed
            }
        }
    }

    /// Handles `IAC X` where X is not IAC.
    fn telnet_command(&mut self, command: u8) -> Step {
        trace!(
            "IAC {} ({:#04X}) in {:?}",
            telnet::command_name(command),
            command,
            self.input.state
        );
        match self.input.state {
            StreamState::Idle | StreamState::AfterEsc | StreamState::CollectingCsi => {
                if command < SB {
                    // Two byte command (NOP, GA, AYT, ...): complete at once,
                    // and whatever was in progress carries on untouched.
                    self.put_record(KeystrokeType::Iac, false, &[command], 1);
                } else {
                    // SB or WILL/WONT/DO/DONT: park the current construct
                    // until the command is complete.
                    assert!(
                        self.pushed.is_none(),
                        "Telnet command interrupted while already interrupting"
                    );
                    self.pushed = Some(self.input);
                    self.input = Construct::begin(StreamState::IacOption);
                    self.add_raw(command);
                }
                Step::Consumed
            }
            StreamState::IacSub => {
                assert_eq!(self.input.raw[0], SB, "sub-negotiation without SB");
                if command == SE {
                    // IAC SE closes the sub-negotiation and resumes what it
                    // interrupted.
                    self.finish_telnet(false);
                    Step::Consumed
                } else {
                    // IAC X inside a sub-negotiation ends it; the IAC X then
                    // starts a new command.
                    warn!(
                        "sub-negotiation aborted by IAC {:#04X} after {} bytes",
                        command, self.input.len
                    );
                    self.finish_telnet(true);
                    self.iac = true;
                    Step::Reprocess
                }
            }
            StreamState::IacOption => {
                unreachable!("IAC pending while waiting for a Telnet option byte")
            }
        }
    }

    fn idle(&mut self, byte: u8, slot: &mut StealSlot) -> Step {
        self.steal_this = slot.armed;

        if byte == ESC {
            trace!("Idle -> AfterEsc");
            self.input = Construct::begin(StreamState::AfterEsc);
        } else if byte == self.csi {
            trace!("Idle -> CollectingCsi (CSI {:#04X})", byte);
            self.input = Construct::begin(StreamState::CollectingCsi);
        } else if self.steal_this {
            self.steal(
                Keystroke::from_parts(KeystrokeType::Char, u32::from(byte), KeystrokeFlags::empty(), &[byte]),
                slot,
            );
        } else {
            codec::put_char(&mut self.fifo, u32::from(byte));
        }
        Step::Consumed
    }

    fn after_esc(&mut self, byte: u8, slot: &mut StealSlot) -> Step {
        if byte == b'[' || (byte == self.csi && self.csi != ESC) {
            trace!("AfterEsc -> CollectingCsi");
            self.input = Construct::begin(StreamState::CollectingCsi);
            return Step::Consumed;
        }

        self.input = Construct::default();
        if byte == ESC {
            // ESC ESC: the first is abandoned, the second starts afresh.
            self.put_record(KeystrokeType::Esc, true, &[], 0);
            return Step::Reprocess;
        }

        if self.steal_this {
            self.steal(
                Keystroke::from_parts(KeystrokeType::Esc, u32::from(byte), KeystrokeFlags::empty(), &[byte]),
                slot,
            );
        } else {
            self.put_record(KeystrokeType::Esc, false, &[byte], 1);
        }
        Step::Consumed
    }

    fn collecting_csi(&mut self, byte: u8, slot: &mut StealSlot) -> Step {
        match byte {
            // Parameters; a 0xFF here can only have come from IAC IAC.
            0x20..=0x3F | IAC => {
                self.add_raw(byte);
                Step::Consumed
            }
            0x40..=0x7F => {
                trace!("CollectingCsi -> Idle (final '{}')", byte as char);
                self.finish_csi(byte, slot);
                Step::Consumed
            }
            _ => {
                warn!(
                    "CSI sequence aborted by byte {:#04X} after {} bytes",
                    byte, self.input.len
                );
                self.finish_csi(CSI_NONE, slot);
                Step::Reprocess
            }
        }
    }

    /// Plants the final byte and emits the CSI keystroke.
    ///
    /// If the sequence overflowed, the final byte overwrites the last slot
    /// so the terminator survives truncation.
    fn finish_csi(&mut self, terminator: u8, slot: &mut StealSlot) {
        let mut clean = terminator != CSI_NONE;
        let mut at = self.input.len;
        self.input.len = self.input.len.saturating_add(1);
        if at >= self.max_len {
            at = self.max_len - 1;
            clean = false;
        }
        self.input.raw[at] = terminator;

        if self.steal_this && clean {
            let params = &self.input.raw[..self.input.len - 1];
            let mut stroke = Keystroke::from_parts(
                KeystrokeType::Csi,
                u32::from(terminator),
                KeystrokeFlags::empty(),
                params,
            );
            stroke.buf[stroke.len] = 0;
            self.steal(stroke, slot);
        } else {
            codec::put_record(
                &mut self.fifo,
                KeystrokeType::Csi,
                terminator == CSI_NONE,
                &self.input.raw,
                self.input.len,
                self.max_len,
            );
        }
        self.input = Construct::default();
    }

    /// Emits the Telnet command being collected and restores whatever it
    /// interrupted.
    fn finish_telnet(&mut self, broken: bool) {
        codec::put_record(
            &mut self.fifo,
            KeystrokeType::Iac,
            broken,
            &self.input.raw,
            self.input.len,
            self.max_len,
        );
        self.input = self.pushed.take().unwrap_or_default();
        trace!("resuming {:?}", self.input.state);
    }

    fn steal(&mut self, stroke: Keystroke, slot: &mut StealSlot) {
        slot.taken = Some(stroke);
        slot.armed = false;
        self.steal_this = false;
    }

    /// Stores a byte if there is room; counts it regardless.
    #[inline]
    fn add_raw(&mut self, byte: u8) {
        if self.input.len < self.max_len {
            self.input.raw[self.input.len] = byte;
        }
        self.input.len = self.input.len.saturating_add(1);
    }

    fn put_record(&mut self, kind: KeystrokeType, broken: bool, raw: &[u8], len: usize) {
        codec::put_record(&mut self.fifo, kind, broken, raw, len, self.max_len);
    }
}
