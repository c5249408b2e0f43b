//! Little-endian reads over byte slices for the binary workbook format.
//! Every read is bounds checked; a short slice is a truncated file.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BytesError {
    #[error("Expect {0} bytes at offset {1}, the data is truncated")]
    TruncatedError(usize, usize),
}

/// Fixed-size window of `bytes` starting at `offset`.
fn window<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N], BytesError> {
    offset
        .checked_add(N)
        .and_then(|end| bytes.get(offset..end))
        .and_then(|slice| slice.try_into().ok())
        .ok_or(BytesError::TruncatedError(N, offset))
}

#[inline]
pub(crate) fn u16_at(bytes: &[u8], offset: usize) -> Result<u16, BytesError> {
    window(bytes, offset).map(u16::from_le_bytes)
}

#[inline]
pub(crate) fn u32_at(bytes: &[u8], offset: usize) -> Result<u32, BytesError> {
    window(bytes, offset).map(u32::from_le_bytes)
}

#[inline]
pub(crate) fn u64_at(bytes: &[u8], offset: usize) -> Result<u64, BytesError> {
    window(bytes, offset).map(u64::from_le_bytes)
}

#[inline]
pub(crate) fn f64_at(bytes: &[u8], offset: usize) -> Result<f64, BytesError> {
    window(bytes, offset).map(f64::from_le_bytes)
}

/// Reads a 32-bit index or count.
#[inline]
pub(crate) fn usize_at(bytes: &[u8], offset: usize) -> Result<usize, BytesError> {
    u32_at(bytes, offset).map(|value| value as usize)
}

/// Consecutive 32-bit values; a trailing partial value is ignored.
pub(crate) fn usize_iter(bytes: &[u8]) -> impl Iterator<Item = usize> + '_ {
    bytes.chunks_exact(4).map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize)
}
