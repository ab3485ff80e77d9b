use alloc::vec::Vec;

#[derive(Debug, Clone, PartialEq)]
pub enum InputError {
    InputTooLong { len: usize, capacity: usize },
}

/// The VM's input line, split into whitespace-delimited tokens on demand.
pub struct WordStrBuf {
    buf: Vec<u8>,
    capacity: usize,
    cur: usize,
    cur_word: Option<(usize, usize)>,
}

impl WordStrBuf {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            cur: 0,
            cur_word: None,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Replace the buffer contents with `input`, discarding anything that
    /// was not consumed yet.
    pub fn fill(&mut self, input: &str) -> Result<(), InputError> {
        let ilen = input.len();
        if ilen > self.capacity {
            return Err(InputError::InputTooLong {
                len: ilen,
                capacity: self.capacity,
            });
        }
        self.buf.clear();
        self.buf.extend_from_slice(input.as_bytes());
        self.cur = 0;
        self.cur_word = None;
        Ok(())
    }

    /// Move to the next token. Afterwards `cur_word` is `None` if the input
    /// is exhausted.
    pub fn advance(&mut self) {
        self.cur_word = None;

        // Find the start, skipping any ASCII whitespace
        let start = loop {
            match self.buf.get(self.cur) {
                None => return,
                Some(b) if b.is_ascii_whitespace() => self.cur += 1,
                Some(_) => break self.cur,
            }
        };
        // Find the end, either the first ASCII whitespace, or the end of the buffer
        // This is ONE PAST the last character
        let end = loop {
            match self.buf.get(self.cur) {
                Some(b) if !b.is_ascii_whitespace() => self.cur += 1,
                _ => break self.cur,
            }
        };
        self.cur_word = Some((start, end - start));
    }

    pub fn cur_word(&self) -> Option<&[u8]> {
        self.cur_word
            .map(|(start, len)| &self.buf[start..start + len])
    }

    /// Unconsumed bytes, including the current token.
    pub fn remaining(&self) -> &[u8] {
        match self.cur_word {
            Some((start, _)) => &self.buf[start..],
            None => &self.buf[self.cur..],
        }
    }
}
