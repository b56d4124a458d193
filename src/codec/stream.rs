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
use super::{Codec, CodecError, Event, WORD_WIDTH};

/// Lazily reads the words of a list of blocks. Filler words are yielded like any other word.
/// Padding after each block's payload is skipped without inspection. The stream ends after
/// the first error.
pub struct WordStream {
    codec: Codec,
    blocks: Vec<String>,
    block: usize,
    /// Byte offset of the next word in the current block.
    offset: usize,
    /// Byte offset where the current block's payload ends.
    end: usize,
    failed: bool,
}

impl WordStream {
    pub(super) fn new(codec: Codec, blocks: Vec<String>) -> WordStream {
        WordStream {
            codec,
            blocks,
            block: 0,
            offset: 0,
            end: 0,
            failed: false,
        }
    }

    /// Gets the codec the stream decodes with.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Moves to the next block that still has words, reading its header.
    fn open_block(&mut self) -> Result<bool, CodecError> {
        while self.offset >= self.end {
            if self.end > 0 || self.offset > 0 {
                self.block += 1;
            }
            let Some(block) = self.blocks.get(self.block) else {
                return Ok(false);
            };
            let length = self.codec.block_payload_len(self.block, block)?;
            self.offset = WORD_WIDTH;
            self.end = WORD_WIDTH + length;
        }
        Ok(true)
    }

    fn next_word(&mut self) -> Result<Option<Event>, CodecError> {
        if !self.open_block()? {
            return Ok(None);
        }
        let bytes = &self.blocks[self.block].as_bytes()[self.offset..self.offset + WORD_WIDTH];
        let event = self.codec.unpack(self.codec.read_word(bytes)?)?;
        self.offset += WORD_WIDTH;
        Ok(Some(event))
    }
}

impl Iterator for WordStream {
    type Item = Result<Event, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_word() {
            Ok(word) => word.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Lazily reads the events of a list of blocks. Filler words are folded into the delay of the
/// event that follows them.
pub struct Events {
    words: WordStream,
    failed: bool,
}

impl Events {
    pub(super) fn new(words: WordStream) -> Events {
        Events {
            words,
            failed: false,
        }
    }
}

impl Iterator for Events {
    type Item = Result<Event, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let mut carried = 0;
        loop {
            match self.words.next() {
                Some(Ok(word)) if self.words.codec().is_filler(&word) => carried += word.delay,
                Some(Ok(word)) => {
                    return Some(Ok(Event {
                        delay: word.delay + carried,
                        ..word
                    }))
                }
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                None if carried > 0 => {
                    self.failed = true;
                    return Some(Err(CodecError::TrailingFiller(carried)));
                }
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use crate::codec::{Codec, CodecError, Event, DEFAULT_CHARSET, PAD_CHAR};

    fn event(sound_id: u8, piano_index: u8, loudness_index: u8, delay: u64) -> Event {
        Event {
            sound_id,
            piano_index,
            loudness_index,
            delay,
        }
    }

    #[test]
    fn test_round_trip_across_blocks() -> Result<(), Box<dyn Error>> {
        let codec = Codec::new(DEFAULT_CHARSET, 300, 6, 5, 20)?;
        let events = vec![
            event(0, 48, 0, 0),
            event(1, 52, 1, 0),
            event(2, 55, 2, 5),
            event(3, 60, 3, 299),
            event(4, 87, 4, 300),
            event(0, 0, 0, 1000),
            event(2, 40, 1, 3),
        ];
        let blocks = codec.encode_blocks(&events)?;
        assert!(blocks.len() > 1);

        let decoded = codec.decode(blocks).collect::<Result<Vec<_>, _>>()?;
        assert_eq!(events, decoded);
        Ok(())
    }

    #[test]
    fn test_long_delay_with_wide_words() -> Result<(), Box<dyn Error>> {
        // One sound leaves room for 1200 delays in a word.
        let codec = Codec::new(DEFAULT_CHARSET, 1200, 6, 1, 16000)?;
        let events = vec![event(0, 48, 0, 2500)];
        let blocks = codec.encode_blocks(&events)?;

        let words = codec.words(blocks.clone()).collect::<Result<Vec<_>, _>>()?;
        assert_eq!(
            vec![codec.filler(), codec.filler(), event(0, 48, 0, 102)],
            words
        );
        assert_eq!(1199, codec.filler().delay);
        assert_eq!(2500, words.iter().map(|word| word.delay).sum::<u64>());

        let decoded = codec.decode(blocks).collect::<Result<Vec<_>, _>>()?;
        assert_eq!(events, decoded);
        Ok(())
    }

    #[test]
    fn test_word_stream_keeps_fillers() -> Result<(), Box<dyn Error>> {
        let codec = Codec::default();
        let blocks = codec.encode_blocks(&[event(0, 48, 0, 700)])?;
        let words = codec.words(blocks).collect::<Result<Vec<_>, _>>()?;

        // 700 = 299 + 299 + 102
        assert_eq!(3, words.len());
        assert!(codec.is_filler(&words[0]));
        assert!(codec.is_filler(&words[1]));
        assert_eq!(event(0, 48, 0, 102), words[2]);
        Ok(())
    }

    #[test]
    fn test_padding_is_ignored() -> Result<(), Box<dyn Error>> {
        let codec = Codec::new(DEFAULT_CHARSET, 300, 6, 5, 16)?;
        let mut blocks = codec.encode_blocks(&[event(1, 10, 2, 3)])?;
        blocks[0].replace_range(12..16, "zzzz");
        assert!(!blocks[0].ends_with(PAD_CHAR));

        let decoded = codec.decode(blocks).collect::<Result<Vec<_>, _>>()?;
        assert_eq!(vec![event(1, 10, 2, 3)], decoded);
        Ok(())
    }

    #[test]
    fn test_empty_blocks_are_skipped() -> Result<(), Box<dyn Error>> {
        let codec = Codec::new(DEFAULT_CHARSET, 300, 6, 5, 16)?;
        let mut blocks = codec.encode_blocks(&[event(0, 1, 0, 0)])?;
        blocks.insert(0, format!("    {}", "0".repeat(12)));

        let decoded = codec.decode(blocks).collect::<Result<Vec<_>, _>>()?;
        assert_eq!(vec![event(0, 1, 0, 0)], decoded);
        Ok(())
    }

    #[test]
    fn test_trailing_filler() -> Result<(), Box<dyn Error>> {
        let codec = Codec::default();
        // 700 = 299 + 299 + 102, so the first two words are fillers.
        let payload = codec.encode(&[event(0, 0, 0, 700)])?;
        assert_eq!(12, payload.len());

        let blocks = codec.chunk(&payload[..8])?;
        let decoded: Vec<_> = codec.decode(blocks).collect();
        assert_eq!(vec![Err(CodecError::TrailingFiller(598))], decoded);
        Ok(())
    }

    #[test]
    fn test_stops_after_error() -> Result<(), Box<dyn Error>> {
        let codec = Codec::new(DEFAULT_CHARSET, 300, 6, 5, 16)?;
        let mut blocks = codec.encode_blocks(&[event(0, 1, 0, 0), event(0, 2, 0, 0)])?;
        blocks[0].replace_range(4..5, "a");

        let decoded: Vec<_> = codec.decode(blocks).collect();
        assert_eq!(vec![Err(CodecError::InvalidDigit('a'))], decoded);
        Ok(())
    }
}
