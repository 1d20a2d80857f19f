#![forbid(unsafe_code)]
//! Byte-level helpers for fixed little-endian page layouts.

pub mod le {
    //! Little-endian field access that reports short buffers instead of panicking.

    use core::convert::TryInto;

    /// Reads a `u16` at `off`, or `None` when the buffer is too short.
    #[inline]
    pub fn get_u16(src: &[u8], off: usize) -> Option<u16> {
        let bytes: [u8; 2] = src.get(off..off.checked_add(2)?)?.try_into().ok()?;
        Some(u16::from_le_bytes(bytes))
    }

    /// Reads a `u64` at `off`, or `None` when the buffer is too short.
    #[inline]
    pub fn get_u64(src: &[u8], off: usize) -> Option<u64> {
        let bytes: [u8; 8] = src.get(off..off.checked_add(8)?)?.try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    }

    /// Writes `v` at `off`; `None` when the buffer is too short.
    #[inline]
    pub fn put_u16(dst: &mut [u8], off: usize, v: u16) -> Option<()> {
        dst.get_mut(off..off.checked_add(2)?)?
            .copy_from_slice(&v.to_le_bytes());
        Some(())
    }

    /// Writes `v` at `off`; `None` when the buffer is too short.
    #[inline]
    pub fn put_u64(dst: &mut [u8], off: usize, v: u64) -> Option<()> {
        dst.get_mut(off..off.checked_add(8)?)?
            .copy_from_slice(&v.to_le_bytes());
        Some(())
    }
}
