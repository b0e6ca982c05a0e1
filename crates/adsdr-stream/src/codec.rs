//! Sample codec: packed USB wire bytes <-> [`Sample`] values.
//!
//! The two directions use different framings:
//!
//! ```text
//! RX (device -> host), 8 bytes per sample:
//!   [I lo] [I hi] [Q lo] [Q hi] [unused pair: 4 bytes]
//!   I and Q are little-endian i16 holding the 12-bit ADC value in the
//!   upper bits (value << 4).
//!
//! TX (host -> device), 4 bytes per sample:
//!   [Q lo] [Q hi] [I lo] [I hi]
//!   Q and I are 12-bit two's complement in the low bits of a
//!   little-endian u16.
//! ```
//!
//! The RX stream interleaves two hardware channels and only the first is
//! surfaced, which is why the RX stride is twice the TX stride.

use bytes::{Buf, BufMut};

use adsdr_core::types::Sample;

/// Wire bytes consumed per decoded RX sample.
pub const RX_BYTES_PER_SAMPLE: usize = 8;

/// Wire bytes produced per encoded TX sample.
pub const TX_BYTES_PER_SAMPLE: usize = 4;

/// Number of samples `decode` produces for `byte_count` received bytes.
pub fn rx_samples_in(byte_count: usize) -> usize {
    byte_count / RX_BYTES_PER_SAMPLE
}

/// Number of samples that fit in a TX wire block of `byte_count` bytes.
pub fn tx_samples_in(byte_count: usize) -> usize {
    byte_count / TX_BYTES_PER_SAMPLE
}

/// Decode the first `byte_count` bytes of `wire` and append the samples
/// to `out`.
///
/// Produces `byte_count / 8` samples; a trailing partial group is
/// ignored. `byte_count` is clamped to `wire.len()`.
pub fn decode(wire: &[u8], byte_count: usize, out: &mut Vec<Sample>) {
    let n = rx_samples_in(byte_count.min(wire.len()));
    out.reserve(n);
    let mut buf = &wire[..n * RX_BYTES_PER_SAMPLE];
    for _ in 0..n {
        let i = buf.get_i16_le() >> 4;
        let q = buf.get_i16_le() >> 4;
        buf.advance(4);
        out.push(Sample { i, q });
    }
}

/// Encode `samples` into `wire`, returning the number of bytes written.
///
/// Encodes as many samples as fit: `min(samples.len(), wire.len() / 4)`.
pub fn encode(samples: &[Sample], wire: &mut [u8]) -> usize {
    let n = samples.len().min(tx_samples_in(wire.len()));
    let written = n * TX_BYTES_PER_SAMPLE;
    let mut buf = &mut wire[..written];
    for s in &samples[..n] {
        buf.put_u16_le(to_wire12(s.q));
        buf.put_u16_le(to_wire12(s.i));
    }
    written
}

/// Convert a value in `-2048..=2047` to its 12-bit two's-complement
/// field.
///
/// Non-negative values pass through; negative values become
/// `(!(-v) & 0xFFF) + 1`.
pub fn to_wire12(v: i16) -> u16 {
    if v >= 0 {
        v as u16
    } else {
        let magnitude = (-(v as i32)) as u32;
        ((!magnitude & 0xFFF) + 1) as u16
    }
}

/// Sign-extend a 12-bit two's-complement field back to a value.
pub fn from_wire12(raw: u16) -> i16 {
    ((raw << 4) as i16) >> 4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rx_group(i_word: u16, q_word: u16) -> [u8; 8] {
        let i = i_word.to_le_bytes();
        let q = q_word.to_le_bytes();
        [i[0], i[1], q[0], q[1], 0x55, 0x55, 0xAA, 0xAA]
    }

    #[test]
    fn decode_shifts_and_sign_extends() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&rx_group(0xFFF0, 0x0010));
        wire.extend_from_slice(&rx_group(0x7FF0, 0x8000));

        let mut out = Vec::new();
        decode(&wire, wire.len(), &mut out);
        assert_eq!(out, vec![Sample::new(-1, 1), Sample::new(2047, -2048)]);
    }

    #[test]
    fn decode_ignores_second_pair_and_partial_group() {
        let mut wire = rx_group(0x0100, 0x0200).to_vec();
        wire.extend_from_slice(&[0x10, 0x00, 0x20]);
        let mut out = Vec::new();
        decode(&wire, wire.len(), &mut out);
        assert_eq!(out, vec![Sample::new(0x10, 0x20)]);
    }

    #[test]
    fn decode_respects_byte_count() {
        let mut wire = rx_group(0x0010, 0x0010).to_vec();
        wire.extend_from_slice(&rx_group(0x0020, 0x0020));
        let mut out = Vec::new();
        decode(&wire, 8, &mut out);
        assert_eq!(out.len(), 1);

        out.clear();
        decode(&wire, 1000, &mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn decode_appends_to_existing() {
        let mut out = vec![Sample::ZERO];
        decode(&rx_group(0x0010, 0x0020), 8, &mut out);
        assert_eq!(out, vec![Sample::ZERO, Sample::new(1, 2)]);
    }

    #[test]
    fn twelve_bit_boundaries() {
        assert_eq!(to_wire12(-2048), 0x800);
        assert_eq!(to_wire12(2047), 0x7FF);
        assert_eq!(to_wire12(-1), 0xFFF);
        assert_eq!(to_wire12(0), 0x000);
        assert_eq!(from_wire12(0x800), -2048);
        assert_eq!(from_wire12(0x7FF), 2047);
        assert_eq!(from_wire12(0xFFF), -1);
    }

    #[test]
    fn encode_layout_q_then_i() {
        let mut wire = [0u8; 8];
        let n = encode(&[Sample::new(-2048, 2047), Sample::new(1, -1)], &mut wire);
        assert_eq!(n, 8);
        assert_eq!(wire, [0xFF, 0x07, 0x00, 0x08, 0xFF, 0x0F, 0x01, 0x00]);
    }

    #[test]
    fn encode_unpacks_to_original_values() {
        let samples: Vec<Sample> = (-2048..=2047)
            .step_by(97)
            .map(|v: i16| Sample::new(v, v.saturating_neg().min(2047)))
            .collect();
        let mut wire = vec![0u8; samples.len() * TX_BYTES_PER_SAMPLE];
        assert_eq!(encode(&samples, &mut wire), wire.len());

        for (chunk, s) in wire.chunks_exact(4).zip(&samples) {
            let q = u16::from_le_bytes([chunk[0], chunk[1]]);
            let i = u16::from_le_bytes([chunk[2], chunk[3]]);
            assert!(q <= 0xFFF && i <= 0xFFF);
            assert_eq!(from_wire12(i), s.i);
            assert_eq!(from_wire12(q), s.q);
        }
    }

    #[test]
    fn encode_stops_at_wire_capacity() {
        let samples = [Sample::new(5, 6); 4];
        let mut wire = [0u8; 10];
        assert_eq!(encode(&samples, &mut wire), 8);
        assert_eq!(&wire[8..], &[0, 0]);
    }

    #[test]
    fn stride_helpers() {
        assert_eq!(rx_samples_in(16384), 2048);
        assert_eq!(tx_samples_in(16384), 4096);
        assert_eq!(rx_samples_in(7), 0);
    }
}
