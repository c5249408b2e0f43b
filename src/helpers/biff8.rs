//! Binary Interchange File Format 8 (BIFF8) record reader: the stream
//! layout of Excel 97-2003 workbooks. A record's body may spill into
//! `CONTINUE` records; reads walk across them transparently.

use crate::error::RustyChunkerError;
use crate::helpers::bytes::f64_at;
use crate::helpers::bytes::u16_at;
use crate::helpers::bytes::u32_at;
use crate::helpers::bytes::u64_at;
use encoding_rs::Encoding;
use encoding_rs::UTF_16LE;
use std::borrow::Cow;
use thiserror::Error;

const CONTINUE: u16 = 60;

#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Fewer than {0} bytes remaining in the record")]
    NoEnoughDataError(usize),
}

pub(crate) struct Biff8Reader {
    /// Code page of compressed (8-bit) strings; without a single-byte code
    /// page they are read as Latin-1
    pub(crate) encoding: Option<&'static Encoding>,
    buffer: Vec<u8>,
    /// Position of the next record header
    pointer: usize,
    /// Body ranges (start, end) of the current record and its continuations
    chunks: Vec<(usize, usize)>,
    index: usize,
    offset: usize,
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: None,
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Moves to the next record and returns its type, `None` at the end of the stream.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, RustyChunkerError> {
        if self.pointer + 4 > self.buffer.len() {
            return Ok(None);
        }
        self.index = 0;
        self.offset = 0;
        self.chunks.clear();

        let kind = u16_at(&self.buffer, self.pointer)?;
        self.push_chunk()?;
        while self.pointer + 4 <= self.buffer.len() && u16_at(&self.buffer, self.pointer)? == CONTINUE {
            self.push_chunk()?;
        }
        Ok(Some(kind))
    }

    /// Records the body of the record at `pointer` and steps past it.
    fn push_chunk(&mut self) -> Result<(), RustyChunkerError> {
        let size = u16_at(&self.buffer, self.pointer + 2)? as usize;
        let lower = self.pointer + 4;
        let upper = lower + size;
        if upper > self.buffer.len() {
            Err(Biff8Error::NoEnoughDataError(size))?;
        }
        self.chunks.push((lower, upper));
        self.pointer = upper;
        Ok(())
    }

    /// Positions the reader at a record header, e.g. the BOF of a sheet.
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
        self.chunks.clear();
    }

    /// Reads up to `length` bytes without crossing into the next continuation.
    fn read(&mut self, length: usize) -> &[u8] {
        while let Some((lower, upper)) = self.chunks.get(self.index).copied() {
            let source = lower + self.offset;
            if source >= upper {
                self.index += 1;
                self.offset = 0;
                continue;
            }
            let target = upper.min(source + length);
            self.offset += target - source;
            return &self.buffer[source..target];
        }
        &[]
    }

    /// Reads exactly `length` bytes, which must lie in one continuation.
    fn read_exact(&mut self, length: usize) -> Result<&[u8], RustyChunkerError> {
        let bytes = self.read(length);
        if bytes.len() == length {
            Ok(bytes)
        } else {
            Err(Biff8Error::NoEnoughDataError(length))?
        }
    }

    /// Skips `length` bytes, crossing continuations as needed.
    pub(crate) fn skip(&mut self, length: usize) -> Result<(), RustyChunkerError> {
        let mut remaining = length;
        while remaining > 0 {
            let size = self.read(remaining).len();
            if size == 0 {
                Err(Biff8Error::NoEnoughDataError(remaining))?;
            }
            remaining -= size;
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, RustyChunkerError> {
        Ok(self.read_exact(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, RustyChunkerError> {
        Ok(u16_at(self.read_exact(2)?, 0)?)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, RustyChunkerError> {
        Ok(u32_at(self.read_exact(4)?, 0)?)
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize, RustyChunkerError> {
        self.read_u32().map(|value| value as usize)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, RustyChunkerError> {
        Ok(u64_at(self.read_exact(8)?, 0)?)
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, RustyChunkerError> {
        Ok(f64_at(self.read_exact(8)?, 0)?)
    }

    /// The u16 that ends `offset` bytes before the end of the current record.
    pub(crate) fn get_u16_back(&self, offset: usize) -> Result<u16, RustyChunkerError> {
        let mut offset = offset;
        for (lower, upper) in self.chunks.iter().rev() {
            if lower + offset <= *upper {
                return Ok(u16_at(&self.buffer, upper - offset)?);
            }
            offset -= upper - lower;
        }
        Err(Biff8Error::NoEnoughDataError(2))?
    }

    /// Reads an RK number: a 30-bit integer or the high bits of a double,
    /// optionally scaled by 1/100.
    pub(crate) fn read_rk_number(&mut self) -> Result<String, RustyChunkerError> {
        let value = self.read_u32()?;
        let is_percentage = value & 0x01 != 0;
        let is_integer = value & 0x02 != 0;
        let number = if is_integer {
            ((value as i32) >> 2) as f64
        } else {
            f64::from_bits(((value & 0xFFFF_FFFC) as u64) << 32)
        };
        Ok(if is_percentage { (number / 100.0).to_string() } else { number.to_string() })
    }

    /// ShortXLUnicodeString: 8-bit character count.
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, RustyChunkerError> {
        let chars = self.read_u8()? as usize;
        self.read_string(chars, false)
    }

    /// XLUnicodeString: 16-bit character count.
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, RustyChunkerError> {
        let chars = self.read_u16()? as usize;
        self.read_string(chars, false)
    }

    /// XLUnicodeRichExtendedString, as stored in the shared string table.
    /// Formatting runs and phonetic data are skipped.
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, RustyChunkerError> {
        let chars = self.read_u16()? as usize;
        self.read_string(chars, true)
    }

    /// Reads `chars` characters that may be split across continuations.
    /// Each segment starts with its own flags byte; only the first one
    /// announces the trailing formatting runs and phonetic block.
    fn read_string(&mut self, chars: usize, is_extended: bool) -> Result<String, RustyChunkerError> {
        let mut string = String::new();
        let flags = self.read_u8()?;
        let rich_runs = if is_extended && flags & 0x08 != 0 { self.read_u16()? as usize } else { 0 };
        let phonetic_size = if is_extended && flags & 0x04 != 0 { self.read_usize()? } else { 0 };
        let mut actual = self.read_segment(chars, flags, &mut string);
        while actual < chars {
            let flags = self.read_u8()?;
            actual += self.read_segment(chars - actual, flags, &mut string);
        }
        self.skip(4 * rich_runs + phonetic_size)?;
        Ok(string)
    }

    /// Decodes up to `chars` characters from the current continuation,
    /// returning how many it held.
    fn read_segment(&mut self, chars: usize, flags: u8, content: &mut String) -> usize {
        let is_high_byte = flags & 0x01 != 0;
        let length = if is_high_byte { chars * 2 } else { chars };
        let encoding = self.encoding;
        let bytes = self.read(length);
        let text: Cow<str> = if is_high_byte {
            UTF_16LE.decode_without_bom_handling(bytes).0
        } else {
            match encoding {
                Some(encoding) if encoding.is_single_byte() => encoding.decode_without_bom_handling(bytes).0,
                _ => Cow::Owned(latin1(bytes)),
            }
        };
        content.push_str(&text);
        if is_high_byte { bytes.len() / 2 } else { bytes.len() }
    }
}

/// Compressed strings without a byte code page hold the low bytes of UTF-16 units.
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| *byte as char).collect()
}

/// Loops over the records of a BIFF8 reader, matching on the record type.
/// Unmatched records are skipped.
#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: u16, body: &[u8]) -> Vec<u8> {
        [&kind.to_le_bytes()[..], &(body.len() as u16).to_le_bytes(), body].concat()
    }

    #[test]
    fn records_and_continuations() -> Result<(), RustyChunkerError> {
        let data = [record(0x0203, &[1, 0, 2, 0]), record(CONTINUE, &[3, 0]), record(0x000A, &[])].concat();
        let mut reader = Biff8Reader::new(data);
        assert_eq!(reader.next()?, Some(0x0203));
        assert_eq!(reader.get_u16_back(2)?, 3);
        assert_eq!(reader.read_u16()?, 1);
        assert_eq!(reader.read_u16()?, 2);
        assert_eq!(reader.read_u16()?, 3);
        assert!(reader.read_u8().is_err());
        assert_eq!(reader.next()?, Some(0x000A));
        assert_eq!(reader.next()?, None);
        Ok(())
    }

    #[test]
    fn truncated_record_is_an_error() {
        let mut reader = Biff8Reader::new(record(0x0203, &[0; 8])[..8].to_vec());
        assert!(matches!(reader.next(), Err(RustyChunkerError::Biff8Error(Biff8Error::NoEnoughDataError(8)))));
    }

    #[test]
    fn rk_numbers() -> Result<(), RustyChunkerError> {
        let integer = (45306u32 << 2) | 0x02;
        let percent = (1234u32 << 2) | 0x03;
        let double = ((1.5f64.to_bits() >> 32) as u32) & 0xFFFF_FFFC;
        let body: Vec<u8> = [integer, percent, double].iter().flat_map(|value| value.to_le_bytes()).collect();
        let mut reader = Biff8Reader::new(record(0x027E, &body));
        reader.next()?;
        assert_eq!(reader.read_rk_number()?, "45306");
        assert_eq!(reader.read_rk_number()?, "12.34");
        assert_eq!(reader.read_rk_number()?, "1.5");
        Ok(())
    }

    #[test]
    fn strings_in_both_widths() -> Result<(), RustyChunkerError> {
        let mut body = vec![3, 0, 0];
        body.extend(b"caf");
        body.extend([2, 0, 1]);
        body.extend("é€".encode_utf16().flat_map(|unit| unit.to_le_bytes()));
        body.extend([2, 0, 0x08, 1, 0]);
        body.extend(b"ok");
        body.extend([0; 4]);
        body.extend([3, 0]);
        body.extend(b"Q&A");
        let mut reader = Biff8Reader::new(record(0x0204, &body));
        reader.next()?;
        assert_eq!(reader.read_xl_unicode_string()?, "caf");
        assert_eq!(reader.read_xl_unicode_string()?, "é€");
        assert_eq!(reader.read_xl_unicode_rich_extended_string()?, "ok");
        assert_eq!(reader.read_short_xl_unicode_string()?, "Q&A");
        assert!(reader.read_u8().is_err());
        Ok(())
    }

    #[test]
    fn compressed_strings_follow_the_code_page() -> Result<(), RustyChunkerError> {
        use encoding_rs::WINDOWS_1252;

        let mut reader = Biff8Reader::new(record(0x0204, &[2, 0, 0, 0xE9, 0x80]));
        reader.encoding = Some(WINDOWS_1252);
        reader.next()?;
        assert_eq!(reader.read_xl_unicode_string()?, "é€");

        let mut reader = Biff8Reader::new(record(0x0204, &[1, 0, 0, 0xE9]));
        reader.encoding = Some(UTF_16LE);
        reader.next()?;
        assert_eq!(reader.read_xl_unicode_string()?, "é");
        Ok(())
    }

    #[test]
    fn shared_string_split_by_continue() -> Result<(), RustyChunkerError> {
        // One formatting run, stored after the last segment
        let first = [4, 0, 0x08, 1, 0, b'b', b'o'];
        let second = [1, b'l', 0, b't', 0, 9, 9, 9, 9, 1, 0, 0, b'x'];
        let data = [record(0x00FC, &first), record(CONTINUE, &second)].concat();
        let mut reader = Biff8Reader::new(data);
        reader.next()?;
        assert_eq!(reader.read_xl_unicode_rich_extended_string()?, "bolt");
        assert_eq!(reader.read_xl_unicode_rich_extended_string()?, "x");
        Ok(())
    }
}
