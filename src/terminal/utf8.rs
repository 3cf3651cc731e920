//! Byte-wise UTF-8 decoder
//!
//! Table-free automaton that validates multi-byte sequences as they stream
//! in from the pty. Each continuation state accepts only the RFC 3629 range
//! for its position, so overlong encodings and codepoints past U+10FFFF are
//! rejected at the byte where they first become invalid.
//!
//! The decoder is only consulted while the escape parser is in ground state;
//! ASCII and control bytes never enter it.

/// Decoder states. `Initial` means no sequence is in flight; the remaining
/// states name the byte they are waiting for and the lead byte class that
/// got us there (the second byte of a sequence is range-restricted by the
/// lead, later bytes are always `[0x80, 0xBF]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Utf8State {
    #[default]
    Initial,
    /// Second byte of a 2-byte sequence (lead C2..DF)
    TwoByte2,
    /// Second byte after lead E0 (A0..BF, rejects overlongs)
    ThreeByte2E0,
    /// Second byte after lead E1..EF
    ThreeByte2NonE0,
    /// Third byte of a 3-byte sequence
    ThreeByte3,
    /// Second byte after lead F0 (90..BF, rejects overlongs)
    FourByte2F0,
    /// Second byte after lead F1..F3
    FourByte2F1F3,
    /// Second byte after lead F4 (80..8F, rejects > U+10FFFF)
    FourByte2F4,
    /// Third byte of a 4-byte sequence
    FourByte3,
    /// Fourth byte of a 4-byte sequence
    FourByte4,
}

/// Streaming UTF-8 decoder. Feed lead bytes with [`Utf8Decoder::start`] and
/// continuation bytes with [`Utf8Decoder::advance`]; a completed scalar
/// value is returned from `advance`. Invalid continuations silently reset
/// the automaton and discard the partial codepoint.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    state: Utf8State,
    codepoint: u32,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// No sequence in flight?
    #[inline]
    pub fn is_initial(&self) -> bool {
        self.state == Utf8State::Initial
    }

    /// Try to begin a sequence with `byte`. Returns false if `byte` is not a
    /// valid lead byte (C0/C1, stray continuations, F5..FF).
    pub fn start(&mut self, byte: u8) -> bool {
        match byte {
            0xc2..=0xdf => {
                self.state = Utf8State::TwoByte2;
                self.codepoint = u32::from(byte & 0x1f) << 6;
            }
            0xe0 => {
                self.state = Utf8State::ThreeByte2E0;
                self.codepoint = u32::from(byte & 0x0f) << 12;
            }
            0xe1..=0xef => {
                self.state = Utf8State::ThreeByte2NonE0;
                self.codepoint = u32::from(byte & 0x0f) << 12;
            }
            0xf0 => {
                self.state = Utf8State::FourByte2F0;
                self.codepoint = u32::from(byte & 0x07) << 18;
            }
            0xf1..=0xf3 => {
                self.state = Utf8State::FourByte2F1F3;
                self.codepoint = u32::from(byte & 0x07) << 18;
            }
            0xf4 => {
                self.state = Utf8State::FourByte2F4;
                self.codepoint = u32::from(byte & 0x07) << 18;
            }
            _ => return false,
        }
        true
    }

    /// Feed a continuation byte. Returns the decoded scalar value when the
    /// sequence completes. An out-of-range byte resets to `Initial` and the
    /// in-flight codepoint is dropped.
    pub fn advance(&mut self, byte: u8) -> Option<u32> {
        match self.state {
            Utf8State::Initial => None,
            Utf8State::TwoByte2 => {
                let done = if (0x80..=0xbf).contains(&byte) {
                    self.codepoint |= u32::from(byte & 0x3f);
                    Some(self.codepoint)
                } else {
                    None
                };
                self.state = Utf8State::Initial;
                done
            }
            Utf8State::ThreeByte2E0 => {
                if (0xa0..=0xbf).contains(&byte) {
                    self.codepoint |= u32::from(byte & 0x3f) << 6;
                    self.state = Utf8State::ThreeByte3;
                } else {
                    self.state = Utf8State::Initial;
                }
                None
            }
            Utf8State::ThreeByte2NonE0 => {
                if (0x80..=0xbf).contains(&byte) {
                    self.codepoint |= u32::from(byte & 0x3f) << 6;
                    self.state = Utf8State::ThreeByte3;
                } else {
                    self.state = Utf8State::Initial;
                }
                None
            }
            Utf8State::ThreeByte3 => {
                let done = if (0x80..=0xbf).contains(&byte) {
                    self.codepoint |= u32::from(byte & 0x3f);
                    Some(self.codepoint)
                } else {
                    None
                };
                self.state = Utf8State::Initial;
                done
            }
            Utf8State::FourByte2F0 => {
                if (0x90..=0xbf).contains(&byte) {
                    self.codepoint |= u32::from(byte & 0x3f) << 12;
                    self.state = Utf8State::FourByte3;
                } else {
                    self.state = Utf8State::Initial;
                }
                None
            }
            Utf8State::FourByte2F1F3 => {
                if (0x80..=0xbf).contains(&byte) {
                    self.codepoint |= u32::from(byte & 0x3f) << 12;
                    self.state = Utf8State::FourByte3;
                } else {
                    self.state = Utf8State::Initial;
                }
                None
            }
            Utf8State::FourByte2F4 => {
                if (0x80..=0x8f).contains(&byte) {
                    self.codepoint |= u32::from(byte & 0x3f) << 12;
                    self.state = Utf8State::FourByte3;
                } else {
                    self.state = Utf8State::Initial;
                }
                None
            }
            Utf8State::FourByte3 => {
                if (0x80..=0xbf).contains(&byte) {
                    self.codepoint |= u32::from(byte & 0x3f) << 6;
                    self.state = Utf8State::FourByte4;
                } else {
                    self.state = Utf8State::Initial;
                }
                None
            }
            Utf8State::FourByte4 => {
                let done = if (0x80..=0xbf).contains(&byte) {
                    self.codepoint |= u32::from(byte & 0x3f);
                    Some(self.codepoint)
                } else {
                    None
                };
                self.state = Utf8State::Initial;
                done
            }
        }
    }
}
