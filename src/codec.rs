// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The text codec that carries a song into the host.
//!
//! Every event packs into one fixed-width numeral of [`WORD_WIDTH`] digits. The digits come from
//! an alphabet of characters that are safe inside the host's string literals, and the numeral
//! value is a mixed-radix composition of the event fields:
//!
//! ```text
//! value = delay
//!       + piano_index    * max_delay
//!       + loudness_index * max_delay * 88
//!       + sound_id       * max_delay * 88 * loudness_levels
//! ```
//!
//! Delays that do not fit are carried by filler words placed in front of the event. The word
//! stream is cut into blocks no longer than the host's literal limit. Each block starts with a
//! length header and is padded to full size with a character outside the alphabet.

use crate::palette::{PIANO_KEYS, PRIMARY_SOUND_ID, SOUND_PROFILES};

mod stream;

pub use stream::{Events, WordStream};

/// The default digit alphabet. It excludes alphanumerics, quotes and backslashes.
pub const DEFAULT_CHARSET: &str = " !#$%&'()*+,-./:;<=>?@[]^_{|}~";

/// Digits per packed event and per block header.
pub const WORD_WIDTH: usize = 4;

/// Default number of distinct delays a single word can carry.
pub const DEFAULT_MAX_DELAY: u32 = 300;

/// Default block size, the longest literal the host accepts.
pub const DEFAULT_BLOCK_SIZE: usize = 16000;

/// Pads blocks to full size. Never part of the alphabet.
pub const PAD_CHAR: char = '0';

/// Gain of each loudness level, loudest first.
pub const LOUDNESS_LEVELS: [f32; 6] = [1.0, 0.8, 0.6, 0.4, 0.2, 0.1];

/// Loudness index reserved for filler words: the quietest level.
pub const FILLER_LOUDNESS: u8 = (LOUDNESS_LEVELS.len() - 1) as u8;

/// Marks a byte that is not a digit of the alphabet.
const NOT_A_DIGIT: u8 = u8::MAX;

/// One sound trigger, timed relative to the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Event {
    pub sound_id: u8,
    pub piano_index: u8,
    pub loudness_index: u8,
    /// Ticks since the previous event, or since the start for the first one.
    pub delay: u64,
}

/// Errors raised while building a codec, encoding or decoding.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CodecError {
    #[error("charset must hold at least two unique printable ASCII characters and not '{PAD_CHAR}'")]
    InvalidCharset,
    #[error("max delay must be at least 2, got {0}")]
    MaxDelayTooSmall(u32),
    #[error("{base} digits cannot represent {required} values in a {WORD_WIDTH} digit word")]
    InsufficientBase { base: u32, required: u64 },
    #[error("block size {block_size} cannot hold a header and a payload word")]
    BlockTooSmall { block_size: usize },
    #[error("{field} {value} is out of range (limit {limit})")]
    RangeViolation {
        field: &'static str,
        value: u64,
        limit: u64,
    },
    #[error("loudness index {0} is reserved for filler words")]
    ReservedLoudness(u8),
    #[error("payload length {0} is not a whole number of words")]
    PartialWord(usize),
    #[error("character {0:?} is not a digit of the alphabet")]
    InvalidDigit(char),
    #[error("block {block} is shorter than its header")]
    TruncatedHeader { block: usize },
    #[error("block {block} header claims {claimed} characters but only {available} follow")]
    HeaderOverflow {
        block: usize,
        claimed: usize,
        available: usize,
    },
    #[error("block {block} holds a payload of {length} characters, not a whole number of words")]
    PartialBlock { block: usize, length: usize },
    #[error("block {block} has {found:?} in its padding")]
    BadPadding { block: usize, found: char },
    #[error("decoded {field} {value} is out of range")]
    DecodedOutOfRange { field: &'static str, value: u64 },
    #[error("filler word carries sound {sound_id}, piano index {piano_index}, delay {delay}")]
    MalformedFiller {
        sound_id: u8,
        piano_index: u8,
        delay: u64,
    },
    #[error("stream ends with {0} ticks of filler and no event")]
    TrailingFiller(u64),
}

/// Packs events into words and blocks, and reads them back.
#[derive(Clone, Debug)]
pub struct Codec {
    /// The alphabet. A digit's value is its position.
    charset: Vec<u8>,
    /// Reverse lookup from ASCII byte to digit value.
    digits: [u8; 128],
    max_delay: u32,
    loudness_levels: u32,
    sound_count: u32,
    block_size: usize,
}

impl Codec {
    /// Creates a codec, checking that every field combination fits in a word and that a block
    /// can hold at least one word.
    pub fn new(
        charset: &str,
        max_delay: u32,
        loudness_levels: u32,
        sound_count: u32,
        block_size: usize,
    ) -> Result<Codec, CodecError> {
        let bytes = charset.as_bytes();
        let printable = bytes
            .iter()
            .all(|byte| byte.is_ascii() && !byte.is_ascii_control());
        let mut unique = bytes.to_vec();
        unique.sort_unstable();
        unique.dedup();
        if bytes.len() < 2
            || !printable
            || unique.len() != bytes.len()
            || bytes.contains(&(PAD_CHAR as u8))
        {
            return Err(CodecError::InvalidCharset);
        }
        if max_delay < 2 {
            return Err(CodecError::MaxDelayTooSmall(max_delay));
        }
        if loudness_levels < 2 || sound_count < 1 {
            return Err(CodecError::InsufficientBase {
                base: bytes.len() as u32,
                required: 0,
            });
        }

        let codec = Codec::build(bytes, max_delay, loudness_levels, sound_count, block_size);
        let required = max_delay as u64
            * PIANO_KEYS as u64
            * loudness_levels as u64
            * sound_count as u64;
        if codec.word_capacity() < required {
            return Err(CodecError::InsufficientBase {
                base: codec.base(),
                required,
            });
        }
        if block_size < 2 * WORD_WIDTH || codec.payload_capacity() as u64 >= codec.word_capacity()
        {
            return Err(CodecError::BlockTooSmall { block_size });
        }
        Ok(codec)
    }

    fn build(
        charset: &[u8],
        max_delay: u32,
        loudness_levels: u32,
        sound_count: u32,
        block_size: usize,
    ) -> Codec {
        let mut digits = [NOT_A_DIGIT; 128];
        for (value, byte) in charset.iter().enumerate() {
            digits[*byte as usize] = value as u8;
        }
        Codec {
            charset: charset.to_vec(),
            digits,
            max_delay,
            loudness_levels,
            sound_count,
            block_size,
        }
    }

    /// Gets the number of digits in the alphabet.
    pub fn base(&self) -> u32 {
        self.charset.len() as u32
    }

    /// Gets the alphabet.
    pub fn charset(&self) -> &str {
        // Checked to be ASCII on construction.
        std::str::from_utf8(&self.charset).unwrap_or_default()
    }

    /// Gets the number of distinct delays one word carries.
    pub fn max_delay(&self) -> u32 {
        self.max_delay
    }

    /// Gets the number of loudness levels, including the filler level.
    pub fn loudness_levels(&self) -> u32 {
        self.loudness_levels
    }

    /// Gets the number of sounds the format can address.
    pub fn sound_count(&self) -> u32 {
        self.sound_count
    }

    /// Gets the full size of every block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The loudness index reserved for filler words.
    pub fn filler_loudness(&self) -> u8 {
        (self.loudness_levels - 1) as u8
    }

    /// The number of distinct values a word can hold.
    pub fn word_capacity(&self) -> u64 {
        (self.base() as u64).pow(WORD_WIDTH as u32)
    }

    /// The payload characters that fit in one block, a whole number of words.
    pub fn payload_capacity(&self) -> usize {
        (self.block_size.saturating_sub(WORD_WIDTH) / WORD_WIDTH) * WORD_WIDTH
    }

    /// The word that stands in for `max_delay - 1` ticks of silence.
    pub fn filler(&self) -> Event {
        Event {
            sound_id: PRIMARY_SOUND_ID,
            piano_index: 0,
            loudness_index: self.filler_loudness(),
            delay: self.max_delay as u64 - 1,
        }
    }

    /// Returns true if the event is a filler word.
    pub fn is_filler(&self, event: &Event) -> bool {
        event.loudness_index == self.filler_loudness()
    }

    /// Encodes events into the payload text, emitting filler words for long delays.
    pub fn encode(&self, events: &[Event]) -> Result<String, CodecError> {
        let mut payload = String::with_capacity(events.len() * WORD_WIDTH);
        for event in events {
            self.encode_event(event, &mut payload)?;
        }
        Ok(payload)
    }

    /// Encodes events straight into padded blocks.
    pub fn encode_blocks(&self, events: &[Event]) -> Result<Vec<String>, CodecError> {
        self.chunk(&self.encode(events)?)
    }

    fn encode_event(&self, event: &Event, out: &mut String) -> Result<(), CodecError> {
        check_range("sound id", event.sound_id as u64, self.sound_count as u64)?;
        check_range("piano index", event.piano_index as u64, PIANO_KEYS as u64)?;
        check_range(
            "loudness index",
            event.loudness_index as u64,
            self.loudness_levels as u64,
        )?;
        if self.is_filler(event) {
            return Err(CodecError::ReservedLoudness(event.loudness_index));
        }

        let filler = self.filler();
        let mut delay = event.delay;
        while delay >= self.max_delay as u64 {
            self.push_word(self.pack(&filler), out);
            delay -= filler.delay;
        }
        self.push_word(self.pack(&Event { delay, ..*event }), out);
        Ok(())
    }

    /// Packs a range-checked event into a word value.
    fn pack(&self, event: &Event) -> u64 {
        let max_delay = self.max_delay as u64;
        let keys = PIANO_KEYS as u64;
        let levels = self.loudness_levels as u64;
        event.delay
            + event.piano_index as u64 * max_delay
            + event.loudness_index as u64 * max_delay * keys
            + event.sound_id as u64 * max_delay * keys * levels
    }

    /// Unpacks a word value, validating every field.
    fn unpack(&self, value: u64) -> Result<Event, CodecError> {
        let max_delay = self.max_delay as u64;
        let keys = PIANO_KEYS as u64;
        let levels = self.loudness_levels as u64;

        let delay = value % max_delay;
        let rest = value / max_delay;
        let piano_index = rest % keys;
        let rest = rest / keys;
        let loudness_index = rest % levels;
        let sound_id = rest / levels;
        if sound_id >= self.sound_count as u64 {
            return Err(CodecError::DecodedOutOfRange {
                field: "sound id",
                value: sound_id,
            });
        }

        let event = Event {
            sound_id: sound_id as u8,
            piano_index: piano_index as u8,
            loudness_index: loudness_index as u8,
            delay,
        };
        if self.is_filler(&event) && event != self.filler() {
            return Err(CodecError::MalformedFiller {
                sound_id: event.sound_id,
                piano_index: event.piano_index,
                delay: event.delay,
            });
        }
        Ok(event)
    }

    /// Writes a value as a fixed-width numeral, most significant digit first.
    fn push_word(&self, value: u64, out: &mut String) {
        let base = self.base() as u64;
        let mut digits = [0u8; WORD_WIDTH];
        let mut value = value;
        for slot in digits.iter_mut().rev() {
            *slot = self.charset[(value % base) as usize];
            value /= base;
        }
        out.extend(digits.iter().map(|digit| *digit as char));
    }

    /// Reads a fixed-width numeral.
    fn read_word(&self, word: &[u8]) -> Result<u64, CodecError> {
        let base = self.base() as u64;
        word.iter().try_fold(0u64, |value, byte| {
            let digit = self
                .digits
                .get(*byte as usize)
                .copied()
                .filter(|digit| *digit != NOT_A_DIGIT)
                .ok_or(CodecError::InvalidDigit(*byte as char))?;
            Ok(value * base + digit as u64)
        })
    }

    /// Cuts a payload into blocks. Each block is a length header, up to
    /// [`Codec::payload_capacity`] payload characters and padding up to the block size.
    pub fn chunk(&self, payload: &str) -> Result<Vec<String>, CodecError> {
        if payload.len() % WORD_WIDTH != 0 {
            return Err(CodecError::PartialWord(payload.len()));
        }
        if let Some(bad) = payload.bytes().find(|byte| self.digit(*byte).is_none()) {
            return Err(CodecError::InvalidDigit(bad as char));
        }

        Ok(payload
            .as_bytes()
            .chunks(self.payload_capacity())
            .map(|chunk| {
                let mut block = String::with_capacity(self.block_size);
                self.push_word(chunk.len() as u64, &mut block);
                // The payload was checked to be alphabet characters, which are ASCII.
                block.extend(chunk.iter().map(|byte| *byte as char));
                let padding = self.block_size - block.len();
                block.extend(std::iter::repeat(PAD_CHAR).take(padding));
                block
            })
            .collect())
    }

    fn digit(&self, byte: u8) -> Option<u8> {
        self.digits
            .get(byte as usize)
            .copied()
            .filter(|digit| *digit != NOT_A_DIGIT)
    }

    /// Reads the payload length from a block header.
    fn block_payload_len(&self, index: usize, block: &str) -> Result<usize, CodecError> {
        let bytes = block.as_bytes();
        if bytes.len() < WORD_WIDTH {
            return Err(CodecError::TruncatedHeader { block: index });
        }
        let claimed = self.read_word(&bytes[..WORD_WIDTH])? as usize;
        let available = bytes.len() - WORD_WIDTH;
        if claimed > available {
            return Err(CodecError::HeaderOverflow {
                block: index,
                claimed,
                available,
            });
        }
        if claimed % WORD_WIDTH != 0 {
            return Err(CodecError::PartialBlock {
                block: index,
                length: claimed,
            });
        }
        Ok(claimed)
    }

    /// Fully checks blocks: headers, payload digits and padding. The lazy decoder skips the
    /// padding, so this is the place to catch a damaged copy before it is deployed.
    pub fn verify_blocks<S: AsRef<str>>(&self, blocks: &[S]) -> Result<(), CodecError> {
        for (index, block) in blocks.iter().enumerate() {
            let block = block.as_ref();
            let length = self.block_payload_len(index, block)?;
            let payload = &block.as_bytes()[WORD_WIDTH..WORD_WIDTH + length];
            for word in payload.chunks(WORD_WIDTH) {
                self.unpack(self.read_word(word)?)?;
            }
            if let Some(found) = block[WORD_WIDTH + length..]
                .chars()
                .find(|c| *c != PAD_CHAR)
            {
                return Err(CodecError::BadPadding {
                    block: index,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Lazily decodes blocks into the raw word stream, filler words included.
    pub fn words(&self, blocks: Vec<String>) -> WordStream {
        WordStream::new(self.clone(), blocks)
    }

    /// Lazily decodes blocks into events, folding filler words into the following event.
    pub fn decode(&self, blocks: Vec<String>) -> Events {
        Events::new(self.words(blocks))
    }
}

impl Default for Codec {
    /// The wire format the host player is built for.
    fn default() -> Self {
        Codec::build(
            DEFAULT_CHARSET.as_bytes(),
            DEFAULT_MAX_DELAY,
            LOUDNESS_LEVELS.len() as u32,
            SOUND_PROFILES.len() as u32,
            DEFAULT_BLOCK_SIZE,
        )
    }
}

fn check_range(field: &'static str, value: u64, limit: u64) -> Result<(), CodecError> {
    if value >= limit {
        return Err(CodecError::RangeViolation {
            field,
            value,
            limit,
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;

    fn event(sound_id: u8, piano_index: u8, loudness_index: u8, delay: u64) -> Event {
        Event {
            sound_id,
            piano_index,
            loudness_index,
            delay,
        }
    }

    #[test]
    fn test_default_is_valid() -> Result<(), Box<dyn Error>> {
        let default = Codec::default();
        let checked = Codec::new(
            DEFAULT_CHARSET,
            DEFAULT_MAX_DELAY,
            LOUDNESS_LEVELS.len() as u32,
            SOUND_PROFILES.len() as u32,
            DEFAULT_BLOCK_SIZE,
        )?;
        assert_eq!(30, default.base());
        assert_eq!(checked.charset(), default.charset());
        assert_eq!(15996, default.payload_capacity());
        Ok(())
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert_eq!(
            Err(CodecError::InvalidCharset),
            Codec::new("ab0", 300, 6, 5, 16000).map(|_| ())
        );
        assert_eq!(
            Err(CodecError::InvalidCharset),
            Codec::new("abca", 300, 6, 5, 16000).map(|_| ())
        );
        assert_eq!(
            Err(CodecError::MaxDelayTooSmall(1)),
            Codec::new(DEFAULT_CHARSET, 1, 6, 5, 16000).map(|_| ())
        );
        assert_eq!(
            Err(CodecError::InsufficientBase {
                base: 30,
                required: 1200 * 88 * 6 * 5
            }),
            Codec::new(DEFAULT_CHARSET, 1200, 6, 5, 16000).map(|_| ())
        );
        assert_eq!(
            Err(CodecError::BlockTooSmall { block_size: 7 }),
            Codec::new(DEFAULT_CHARSET, 300, 6, 5, 7).map(|_| ())
        );
    }

    #[test]
    fn test_word_layout() -> Result<(), Box<dyn Error>> {
        let codec = Codec::default();
        // 7 + 48*300 + 2*300*88 + 1*300*88*6 = 225607 = 8*30^3 + 10*30^2 + 20*30 + 7
        let payload = codec.encode(&[event(1, 48, 2, 7)])?;
        let expected: String = [8, 10, 20, 7]
            .iter()
            .map(|digit| DEFAULT_CHARSET.as_bytes()[*digit] as char)
            .collect();
        assert_eq!(expected, payload);

        let zero = codec.encode(&[event(0, 0, 0, 0)])?;
        assert_eq!("    ", zero);
        Ok(())
    }

    #[test]
    fn test_encode_range_violations() {
        let codec = Codec::default();
        assert_eq!(
            Err(CodecError::RangeViolation {
                field: "sound id",
                value: 5,
                limit: 5
            }),
            codec.encode(&[event(5, 0, 0, 0)])
        );
        assert_eq!(
            Err(CodecError::RangeViolation {
                field: "piano index",
                value: 88,
                limit: 88
            }),
            codec.encode(&[event(0, 88, 0, 0)])
        );
        assert_eq!(
            Err(CodecError::RangeViolation {
                field: "loudness index",
                value: 6,
                limit: 6
            }),
            codec.encode(&[event(0, 0, 6, 0)])
        );
        assert_eq!(
            Err(CodecError::ReservedLoudness(FILLER_LOUDNESS)),
            codec.encode(&[event(0, 0, FILLER_LOUDNESS, 0)])
        );
    }

    #[test]
    fn test_fillers_for_long_delays() -> Result<(), Box<dyn Error>> {
        let codec = Codec::default();
        assert_eq!(4, codec.encode(&[event(0, 0, 0, 299)])?.len());
        assert_eq!(8, codec.encode(&[event(0, 0, 0, 300)])?.len());
        // 1000 = 3 * 299 + 103
        assert_eq!(16, codec.encode(&[event(0, 0, 0, 1000)])?.len());
        Ok(())
    }

    #[test]
    fn test_chunk_single_block() -> Result<(), Box<dyn Error>> {
        let codec = Codec::default();
        let blocks = codec.encode_blocks(&[event(0, 48, 0, 0)])?;
        assert_eq!(1, blocks.len());
        assert_eq!(DEFAULT_BLOCK_SIZE, blocks[0].len());
        assert_eq!(4, codec.read_word(&blocks[0].as_bytes()[..WORD_WIDTH])?);
        assert!(blocks[0][8..].chars().all(|c| c == PAD_CHAR));
        codec.verify_blocks(&blocks)?;
        Ok(())
    }

    #[test]
    fn test_chunk_headers_and_padding() -> Result<(), Box<dyn Error>> {
        let codec = Codec::new(DEFAULT_CHARSET, 300, 6, 5, 20)?;
        assert_eq!(16, codec.payload_capacity());

        for count in [1usize, 3, 4, 5, 8, 9] {
            let events: Vec<Event> = (0..count).map(|i| event(0, i as u8, 0, 1)).collect();
            let payload = codec.encode(&events)?;
            let blocks = codec.chunk(&payload)?;
            assert_eq!(count.div_ceil(4), blocks.len());

            let mut total = 0;
            for block in &blocks {
                assert_eq!(20, block.len());
                let length = codec.block_payload_len(0, block)?;
                total += length;
                let padding = block.len() - WORD_WIDTH - length;
                assert!(padding < codec.block_size());
                assert_eq!(padding, block.chars().filter(|c| *c == PAD_CHAR).count());
            }
            assert_eq!(payload.len(), total);
            if count % 4 == 0 {
                // A final block filled exactly has no padding.
                assert!(!blocks[blocks.len() - 1].ends_with(PAD_CHAR));
            }
        }
        Ok(())
    }

    #[test]
    fn test_chunk_empty_payload() -> Result<(), Box<dyn Error>> {
        assert!(Codec::default().chunk("")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_chunk_rejects_partial_words() {
        assert_eq!(
            Err(CodecError::PartialWord(3)),
            Codec::default().chunk("   ")
        );
        assert_eq!(
            Err(CodecError::InvalidDigit('a')),
            Codec::default().chunk("   a")
        );
    }

    #[test]
    fn test_verify_blocks_catches_damage() -> Result<(), Box<dyn Error>> {
        let codec = Codec::new(DEFAULT_CHARSET, 300, 6, 5, 16)?;
        let blocks = codec.encode_blocks(&[event(0, 1, 0, 1)])?;

        let mut padded = blocks[0].clone();
        padded.replace_range(15..16, "!");
        assert_eq!(
            Err(CodecError::BadPadding {
                block: 0,
                found: '!'
            }),
            codec.verify_blocks(&[padded])
        );

        let overflow = format!("{}{}", "~~~~", &blocks[0][4..]);
        assert!(matches!(
            codec.verify_blocks(&[overflow]),
            Err(CodecError::HeaderOverflow { block: 0, .. })
        ));

        assert_eq!(
            Err(CodecError::TruncatedHeader { block: 1 }),
            codec.verify_blocks(&[blocks[0].clone(), "  ".to_string()])
        );
        Ok(())
    }

    #[test]
    fn test_unpack_validates_fields() {
        let codec = Codec::default();
        let beyond_sounds = 5 * 300 * 88 * 6;
        assert_eq!(
            Err(CodecError::DecodedOutOfRange {
                field: "sound id",
                value: 5
            }),
            codec.unpack(beyond_sounds)
        );
        let bad_filler = 10 + FILLER_LOUDNESS as u64 * 300 * 88;
        assert_eq!(
            Err(CodecError::MalformedFiller {
                sound_id: 0,
                piano_index: 0,
                delay: 10
            }),
            codec.unpack(bad_filler)
        );
    }
}
