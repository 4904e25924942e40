// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use bitvec::prelude::*;
use bytes::{Buf, BufMut};

/// Encode a primitive measure value into fixed-width buffer
pub trait PrimitiveFixedWidthEncode: Copy + Clone + 'static + Send + Sync + PartialEq {
    /// Width of each element
    const WIDTH: usize;

    /// Encode current primitive data to the end of an `Vec<u8>`.
    fn encode(&self, buffer: &mut impl BufMut);

    /// Decode a data from a bytes array.
    fn decode(buffer: &mut impl Buf) -> Self;
}

impl PrimitiveFixedWidthEncode for i32 {
    const WIDTH: usize = std::mem::size_of::<i32>();

    fn encode(&self, buffer: &mut impl BufMut) {
        buffer.put_i32_le(*self);
    }

    fn decode(buffer: &mut impl Buf) -> Self {
        buffer.get_i32_le()
    }
}

impl PrimitiveFixedWidthEncode for i64 {
    const WIDTH: usize = std::mem::size_of::<i64>();

    fn encode(&self, buffer: &mut impl BufMut) {
        buffer.put_i64_le(*self);
    }

    fn decode(buffer: &mut impl Buf) -> Self {
        buffer.get_i64_le()
    }
}

impl PrimitiveFixedWidthEncode for f64 {
    const WIDTH: usize = std::mem::size_of::<f64>();

    fn encode(&self, buffer: &mut impl BufMut) {
        buffer.put_f64_le(*self);
    }

    fn decode(buffer: &mut impl Buf) -> Self {
        buffer.get_f64_le()
    }
}

/// Number of bytes used by a bitmap of `len` bits.
pub fn bitmap_len(len: usize) -> usize {
    (len + 7) / 8
}

/// Encode a bitmap, least significant bit first. Padding bits of the last byte are zero.
pub fn encode_bitmap(bitmap: &BitVec, buffer: &mut impl BufMut) {
    let mut bits = bitvec![u8, Lsb0; 0; bitmap.len()];
    bits.clone_from_bitslice(bitmap);
    buffer.put_slice(bits.as_raw_slice());
}

/// Decode a bitmap of `len` bits. The caller must ensure `bitmap_len(len)` bytes remain.
pub fn decode_bitmap(buffer: &mut impl Buf, len: usize) -> BitVec {
    let mut bytes = vec![0u8; bitmap_len(len)];
    buffer.copy_to_slice(&mut bytes);
    let mut bits = BitVec::<u8, Lsb0>::from_vec(bytes);
    bits.truncate(len);
    bits.iter().by_vals().collect()
}

#[cfg(test)]
mod tests {
    use bitvec::prelude::*;

    use super::*;

    #[test]
    fn test_bitmap() {
        let bitmap: BitVec = bitvec![1, 0, 0, 1, 1, 0, 1, 0, 1, 1];
        let mut buf = vec![];
        encode_bitmap(&bitmap, &mut buf);
        assert_eq!(buf, vec![0b0101_1001, 0b0000_0011]);
        assert_eq!(decode_bitmap(&mut &buf[..], bitmap.len()), bitmap);
    }

    #[test]
    fn test_bitmap_ignores_padding() {
        let buf = [0b1111_1101u8];
        let mut data = &buf[..];
        assert_eq!(decode_bitmap(&mut data, 3), bitvec![1, 0, 1]);
        assert!(data.is_empty());

        let mut buf = vec![];
        encode_bitmap(&BitVec::new(), &mut buf);
        assert!(buf.is_empty());
        encode_bitmap(&bitvec![1, 1, 1], &mut buf);
        assert_eq!(buf, vec![0b0000_0111]);
    }
}
