use core::fmt::Debug;

use crate::{Error, ReplaceErr};

/// Size in bytes of one heap cell.
pub const WORD_SIZE: usize = core::mem::size_of::<i64>();

/// A byte offset into the VM heap.
pub type Addr = usize;

/// One machine cell, as held on the data stack or in a heap slot.
///
/// Addresses are stored as their (non-negative) byte offset.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Word(i64);

impl Debug for Word {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<usize> for Word {
    type Error = Error;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        let val = i64::try_from(value).replace_err(Error::UsizeToWordInvalid(value))?;
        Ok(Word::data(val))
    }
}

impl TryFrom<Word> for usize {
    type Error = Error;

    fn try_from(value: Word) -> Result<Self, Self::Error> {
        usize::try_from(value.0).replace_err(Error::WordToUsizeInvalid(value.0))
    }
}

impl Word {
    #[inline]
    pub const fn data(data: i64) -> Self {
        Self(data)
    }

    #[inline]
    pub const fn into_data(self) -> i64 {
        self.0
    }

    /// Interpret this cell as a heap address.
    #[inline]
    pub fn into_addr(self) -> Result<Addr, Error> {
        self.try_into()
    }

    #[inline]
    pub fn flag(b: bool) -> Self {
        if b {
            Self(-1)
        } else {
            Self(0)
        }
    }
}

/// What a codeword cell at the start of every body means.
///
/// Natives are indices into the VM's native table; `Enter` marks a
/// composite (colon) word whose call list follows the codeword.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Codeword {
    Enter,
    Native(u32),
}

impl Codeword {
    const TAG: i64 = 0xC0DE << 48;
    const TAG_MASK: i64 = 0xFFFF << 48;
    /// Just past the range of native ids.
    const ENTER: i64 = 1 << 32;

    pub const fn to_cell(self) -> i64 {
        match self {
            Codeword::Enter => Self::TAG | Self::ENTER,
            Codeword::Native(id) => Self::TAG | (id as i64),
        }
    }

    pub fn from_cell(cell: i64) -> Result<Self, Error> {
        if cell & Self::TAG_MASK != Self::TAG {
            return Err(Error::BadCodeword(cell));
        }
        match cell & !Self::TAG_MASK {
            Self::ENTER => Ok(Codeword::Enter),
            id => u32::try_from(id)
                .map(Codeword::Native)
                .replace_err(Error::BadCodeword(cell)),
        }
    }
}

#[cfg(test)]
pub mod test {
    use super::{Codeword, Word};
    use crate::Error;

    #[test]
    fn codewords() {
        for cw in [Codeword::Enter, Codeword::Native(0), Codeword::Native(41)] {
            assert_eq!(Codeword::from_cell(cw.to_cell()), Ok(cw));
        }
        assert_eq!(Codeword::from_cell(0), Err(Error::BadCodeword(0)));
    }

    #[test]
    fn every_native_id_is_distinct_from_enter() {
        for id in [u32::MAX, u32::MAX - 1, 1 << 31] {
            let cw = Codeword::Native(id);
            assert_ne!(cw.to_cell(), Codeword::Enter.to_cell());
            assert_eq!(Codeword::from_cell(cw.to_cell()), Ok(cw));
        }
        // payloads above both are not codewords
        let past = Codeword::Enter.to_cell() + 1;
        assert_eq!(Codeword::from_cell(past), Err(Error::BadCodeword(past)));
        assert_eq!(Codeword::from_cell(-16), Err(Error::BadCodeword(-16)));
    }

    #[test]
    fn addr_conversions() {
        assert_eq!(Word::data(24).into_addr(), Ok(24));
        assert_eq!(Word::data(-8).into_addr(), Err(Error::WordToUsizeInvalid(-8)));
        assert_eq!(Word::try_from(8usize), Ok(Word::data(8)));
        assert_eq!(Word::flag(true).into_data(), -1);
        assert_eq!(Word::flag(false).into_data(), 0);
    }
}
