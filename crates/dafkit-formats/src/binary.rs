//! Binary format translation
//!
//! Every DAF and DAS file records the encoding of its numeric words in the
//! file record. Four encodings are known:
//!
//! | Label      | Integers       | Doubles                     |
//! |------------|----------------|-----------------------------|
//! | `BIG-IEEE` | big-endian     | IEEE 754, big-endian        |
//! | `LTL-IEEE` | little-endian  | IEEE 754, little-endian     |
//! | `VAX-GFLT` | little-endian  | VAX G-floating, PDP-11 words |
//! | `VAX-DFLT` | little-endian  | VAX D-floating, PDP-11 words |
//!
//! The IEEE formats translate with a plain byte-order load. The VAX formats
//! have a hidden-bit mantissa in `[0.5, 1)`, a biased exponent and a
//! fraction split across four 16-bit little-endian words with the most
//! significant word first.
//!
//! Slice helpers dispatch on the format once per call, so translating a full
//! record is a tight loop over fixed-size chunks.

use crate::{FormatError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// On-disk encoding of integer and double precision words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryFormat {
    /// Big-endian IEEE 754.
    BigIeee,
    /// Little-endian IEEE 754.
    LtlIeee,
    /// VAX G-floating doubles, little-endian integers.
    VaxGflt,
    /// VAX D-floating doubles, little-endian integers.
    VaxDflt,
}

const FRACTION_52: u64 = (1 << 52) - 1;
const FRACTION_55: u64 = (1 << 55) - 1;

impl BinaryFormat {
    /// Every known format.
    pub const ALL: [Self; 4] = [Self::BigIeee, Self::LtlIeee, Self::VaxGflt, Self::VaxDflt];

    /// Format of the host this code runs on.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::BigIeee
        } else {
            Self::LtlIeee
        }
    }

    /// Label as written in file records.
    pub const fn label(self) -> &'static str {
        match self {
            Self::BigIeee => "BIG-IEEE",
            Self::LtlIeee => "LTL-IEEE",
            Self::VaxGflt => "VAX-GFLT",
            Self::VaxDflt => "VAX-DFLT",
        }
    }

    /// Label as a blank padded 8-byte field.
    pub fn label_bytes(self) -> [u8; 8] {
        crate::padded_field(self.label())
    }

    /// Whether words in this format can be used without translation.
    pub fn is_native(self) -> bool {
        self == Self::native()
    }

    /// Byte order of integers in this format.
    pub const fn int_endian(self) -> binrw::Endian {
        match self {
            Self::BigIeee => binrw::Endian::Big,
            Self::LtlIeee | Self::VaxGflt | Self::VaxDflt => binrw::Endian::Little,
        }
    }

    /// Parse a format label field.
    ///
    /// Trailing blanks and NULs are ignored. An unknown label is an error,
    /// never a fallback to the native format.
    pub fn from_label(field: &[u8]) -> Result<Self> {
        crate::trimmed_field(field).parse()
    }

    /// Decode a 4-byte integer.
    #[inline]
    pub const fn decode_i32(self, bytes: [u8; 4]) -> i32 {
        match self {
            Self::BigIeee => i32::from_be_bytes(bytes),
            Self::LtlIeee | Self::VaxGflt | Self::VaxDflt => i32::from_le_bytes(bytes),
        }
    }

    /// Encode a 4-byte integer.
    #[inline]
    pub const fn encode_i32(self, value: i32) -> [u8; 4] {
        match self {
            Self::BigIeee => value.to_be_bytes(),
            Self::LtlIeee | Self::VaxGflt | Self::VaxDflt => value.to_le_bytes(),
        }
    }

    /// Decode an 8-byte double.
    ///
    /// A VAX reserved operand (sign set, zero exponent) decodes as NaN.
    #[inline]
    pub fn decode_f64(self, bytes: [u8; 8]) -> f64 {
        match self {
            Self::BigIeee => f64::from_be_bytes(bytes),
            Self::LtlIeee => f64::from_le_bytes(bytes),
            Self::VaxGflt => vax_g_to_ieee(vax_bits(bytes)),
            Self::VaxDflt => vax_d_to_ieee(vax_bits(bytes)),
        }
    }

    /// Encode an 8-byte double.
    ///
    /// IEEE targets accept every value. VAX targets reject infinities, NaNs
    /// and magnitudes outside their exponent range.
    #[inline]
    pub fn encode_f64(self, value: f64) -> Result<[u8; 8]> {
        match self {
            Self::BigIeee => Ok(value.to_be_bytes()),
            Self::LtlIeee => Ok(value.to_le_bytes()),
            Self::VaxGflt => ieee_to_vax_g(value)
                .map(vax_bytes)
                .ok_or(FormatError::Unrepresentable {
                    format: self,
                    value,
                }),
            Self::VaxDflt => ieee_to_vax_d(value)
                .map(vax_bytes)
                .ok_or(FormatError::Unrepresentable {
                    format: self,
                    value,
                }),
        }
    }

    /// Decode consecutive doubles from `src` into `dst`.
    ///
    /// Decodes `min(src.len() / 8, dst.len())` words.
    pub fn decode_f64_slice(self, src: &[u8], dst: &mut [f64]) {
        let words = src.chunks_exact(8).zip(dst.iter_mut());
        match self {
            Self::BigIeee => words.for_each(|(c, d)| *d = f64::from_be_bytes(word8(c))),
            Self::LtlIeee => words.for_each(|(c, d)| *d = f64::from_le_bytes(word8(c))),
            Self::VaxGflt => words.for_each(|(c, d)| *d = vax_g_to_ieee(vax_bits(word8(c)))),
            Self::VaxDflt => words.for_each(|(c, d)| *d = vax_d_to_ieee(vax_bits(word8(c)))),
        }
    }

    /// Decode consecutive integers from `src` into `dst`.
    pub fn decode_i32_slice(self, src: &[u8], dst: &mut [i32]) {
        let words = src.chunks_exact(4).zip(dst.iter_mut());
        match self {
            Self::BigIeee => words.for_each(|(c, d)| *d = i32::from_be_bytes(word4(c))),
            Self::LtlIeee | Self::VaxGflt | Self::VaxDflt => {
                words.for_each(|(c, d)| *d = i32::from_le_bytes(word4(c)));
            }
        }
    }

    /// Encode doubles into consecutive 8-byte words of `dst`.
    pub fn encode_f64_slice(self, src: &[f64], dst: &mut [u8]) -> Result<()> {
        for (value, chunk) in src.iter().zip(dst.chunks_exact_mut(8)) {
            chunk.copy_from_slice(&self.encode_f64(*value)?);
        }
        Ok(())
    }

    /// Encode integers into consecutive 4-byte words of `dst`.
    pub fn encode_i32_slice(self, src: &[i32], dst: &mut [u8]) {
        for (value, chunk) in src.iter().zip(dst.chunks_exact_mut(4)) {
            chunk.copy_from_slice(&self.encode_i32(*value));
        }
    }
}

impl fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BinaryFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.label() == s)
            .ok_or_else(|| FormatError::UnsupportedFormat(s.to_string()))
    }
}

fn word8(chunk: &[u8]) -> [u8; 8] {
    let mut word = [0u8; 8];
    word.copy_from_slice(chunk);
    word
}

fn word4(chunk: &[u8]) -> [u8; 4] {
    let mut word = [0u8; 4];
    word.copy_from_slice(chunk);
    word
}

/// Assemble the four PDP-11 words of a VAX double, most significant first.
fn vax_bits(bytes: [u8; 8]) -> u64 {
    bytes
        .chunks_exact(2)
        .fold(0u64, |acc, w| (acc << 16) | u64::from(u16::from_le_bytes([w[0], w[1]])))
}

fn vax_bytes(bits: u64) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    for (i, chunk) in bytes.chunks_exact_mut(2).enumerate() {
        let word = (bits >> (48 - 16 * i)) as u16;
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    bytes
}

/// D-floating: 1 sign, 8 exponent (bias 128), 55 fraction bits.
///
/// The three low fraction bits do not fit an IEEE double and are truncated.
fn vax_d_to_ieee(bits: u64) -> f64 {
    let sign = bits & (1 << 63);
    let exponent = (bits >> 55) & 0xFF;
    let fraction = bits & FRACTION_55;

    if exponent == 0 {
        return if sign == 0 { 0.0 } else { f64::NAN };
    }

    // 0.1f * 2^(e-128) == 1.f * 2^(e-129); IEEE bias 1023.
    f64::from_bits(sign | ((exponent + 894) << 52) | (fraction >> 3))
}

fn ieee_to_vax_d(value: f64) -> Option<u64> {
    if value == 0.0 {
        return Some(0);
    }
    if !value.is_finite() {
        return None;
    }

    let bits = value.to_bits();
    let sign = bits & (1 << 63);
    let exponent = (bits >> 52) & 0x7FF;
    let fraction = bits & FRACTION_52;

    // Subnormals and anything outside 2^-129 .. 2^127 fall outside D range.
    let vax_exponent = exponent.checked_sub(894).filter(|e| (1..=255).contains(e))?;
    Some(sign | (vax_exponent << 55) | (fraction << 3))
}

/// G-floating: 1 sign, 11 exponent (bias 1024), 52 fraction bits.
fn vax_g_to_ieee(bits: u64) -> f64 {
    let sign = bits & (1 << 63);
    let exponent = (bits >> 52) & 0x7FF;
    let fraction = bits & FRACTION_52;

    if exponent == 0 {
        return if sign == 0 { 0.0 } else { f64::NAN };
    }

    if exponent > 2 {
        return f64::from_bits(sign | ((exponent - 2) << 52) | fraction);
    }

    // Exponents 1 and 2 land in the IEEE subnormal range.
    let mantissa = (1 << 52) | fraction;
    f64::from_bits(sign | (mantissa >> (3 - exponent)))
}

fn ieee_to_vax_g(value: f64) -> Option<u64> {
    if value == 0.0 {
        return Some(0);
    }
    if !value.is_finite() {
        return None;
    }

    let bits = value.to_bits();
    let sign = bits & (1 << 63);
    let exponent = (bits >> 52) & 0x7FF;
    let fraction = bits & FRACTION_52;

    if exponent > 0 {
        let vax_exponent = exponent + 2;
        if vax_exponent > 0x7FF {
            return None;
        }
        return Some(sign | (vax_exponent << 52) | fraction);
    }

    // Subnormal: normalize so bit 52 is set; only two shifts of headroom.
    let shift = u64::from(fraction.leading_zeros()) - 11;
    if shift > 2 {
        return None;
    }
    let mantissa = fraction << shift;
    Some(sign | ((3 - shift) << 52) | (mantissa & FRACTION_52))
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for format in BinaryFormat::ALL {
            assert_eq!(
                BinaryFormat::from_label(&format.label_bytes()).ok(),
                Some(format)
            );
        }
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        assert!(matches!(
            BinaryFormat::from_label(b"PC-86   "),
            Err(FormatError::UnsupportedFormat(label)) if label == "PC-86"
        ));
        assert!(BinaryFormat::from_label(b"        ").is_err());
    }

    #[test]
    fn test_native_matches_target() {
        let native = BinaryFormat::native();
        assert!(native.is_native());
        assert_eq!(native.decode_f64(1.5f64.to_ne_bytes()), 1.5);
        assert_eq!(native.decode_i32(42i32.to_ne_bytes()), 42);
    }

    #[test]
    fn test_ieee_byte_orders() {
        assert_eq!(BinaryFormat::BigIeee.encode_i32(0x0102_0304), [1, 2, 3, 4]);
        assert_eq!(BinaryFormat::LtlIeee.encode_i32(0x0102_0304), [4, 3, 2, 1]);
        assert_eq!(
            BinaryFormat::BigIeee.decode_f64([0x3F, 0xF0, 0, 0, 0, 0, 0, 0]),
            1.0
        );
        assert_eq!(
            BinaryFormat::LtlIeee.decode_f64([0, 0, 0, 0, 0, 0, 0xF0, 0x3F]),
            1.0
        );
    }

    #[test]
    fn test_vax_g_known_values() {
        // 1.0 in G-floating is 0x4010 in the first word, rest zero.
        let one = [0x10, 0x40, 0, 0, 0, 0, 0, 0];
        assert_eq!(BinaryFormat::VaxGflt.decode_f64(one), 1.0);
        assert_eq!(BinaryFormat::VaxGflt.encode_f64(1.0).ok(), Some(one));

        // -2.0: sign set, exponent one higher.
        let minus_two = [0x20, 0xC0, 0, 0, 0, 0, 0, 0];
        assert_eq!(BinaryFormat::VaxGflt.decode_f64(minus_two), -2.0);
    }

    #[test]
    fn test_vax_d_known_values() {
        // 1.0 in D-floating is 0x4080 in the first word.
        let one = [0x80, 0x40, 0, 0, 0, 0, 0, 0];
        assert_eq!(BinaryFormat::VaxDflt.decode_f64(one), 1.0);
        assert_eq!(BinaryFormat::VaxDflt.encode_f64(1.0).ok(), Some(one));

        // 0.5 halves the exponent field by one.
        let half = [0x00, 0x40, 0, 0, 0, 0, 0, 0];
        assert_eq!(BinaryFormat::VaxDflt.decode_f64(half), 0.5);
    }

    #[test]
    fn test_vax_zero_and_reserved_operand() {
        for format in [BinaryFormat::VaxGflt, BinaryFormat::VaxDflt] {
            assert_eq!(format.decode_f64([0; 8]), 0.0);
            assert!(format.decode_f64([0, 0x80, 0, 0, 0, 0, 0, 0]).is_nan());
            assert_eq!(format.encode_f64(-0.0).ok(), Some([0; 8]));
        }
    }

    #[test]
    fn test_vax_rejects_unrepresentable() {
        for format in [BinaryFormat::VaxGflt, BinaryFormat::VaxDflt] {
            assert!(format.encode_f64(f64::INFINITY).is_err());
            assert!(format.encode_f64(f64::NAN).is_err());
        }
        // D range tops out near 1.7e38.
        assert!(BinaryFormat::VaxDflt.encode_f64(1.0e39).is_err());
        assert!(BinaryFormat::VaxDflt.encode_f64(1.0e-40).is_err());
        // G range covers IEEE normals except the top exponents.
        assert!(BinaryFormat::VaxGflt.encode_f64(f64::MAX).is_err());
        assert!(BinaryFormat::VaxGflt.encode_f64(1.0e300).is_ok());
    }

    #[test]
    fn test_vax_g_subnormal_edge() {
        // 2^-1023 is an IEEE subnormal but a G-floating normal.
        let value = f64::from_bits(1 << 51);
        let encoded = BinaryFormat::VaxGflt.encode_f64(value).expect("representable");
        assert_eq!(BinaryFormat::VaxGflt.decode_f64(encoded), value);

        // 2^-1030 is below the G-floating range.
        let tiny = f64::from_bits(1 << 44);
        assert!(BinaryFormat::VaxGflt.encode_f64(tiny).is_err());
    }

    #[test]
    fn test_slice_helpers() {
        let values = [1.0, -2.5, 1.0e10, 0.0];
        for format in BinaryFormat::ALL {
            let mut bytes = [0u8; 32];
            format
                .encode_f64_slice(&values, &mut bytes)
                .expect("encode");
            let mut decoded = [0.0; 4];
            format.decode_f64_slice(&bytes, &mut decoded);
            assert_eq!(decoded, values, "format {format}");
        }

        let ints = [1, -1, i32::MAX, i32::MIN];
        let mut bytes = [0u8; 16];
        BinaryFormat::BigIeee.encode_i32_slice(&ints, &mut bytes);
        let mut decoded = [0; 4];
        BinaryFormat::BigIeee.decode_i32_slice(&bytes, &mut decoded);
        assert_eq!(decoded, ints);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use proptest::test_runner::TestCaseError;

        proptest! {
            /// IEEE formats carry every bit pattern unchanged
            #[test]
            fn ieee_round_trip_is_bit_exact(bits in any::<u64>()) {
                let value = f64::from_bits(bits);
                for format in [BinaryFormat::BigIeee, BinaryFormat::LtlIeee] {
                    let bytes = format.encode_f64(value).map_err(|e| TestCaseError::fail(e.to_string()))?;
                    prop_assert_eq!(format.decode_f64(bytes).to_bits(), bits);
                }
            }

            /// G-floating round-trips every normal in its exponent range
            #[test]
            fn vax_g_round_trip(value in prop::num::f64::NORMAL.prop_filter("G range", |v| v.abs() < 1.0e307)) {
                let bytes = BinaryFormat::VaxGflt.encode_f64(value).map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(BinaryFormat::VaxGflt.decode_f64(bytes), value);
            }

            /// D-floating round-trips values within its narrower range
            #[test]
            fn vax_d_round_trip(mantissa in -1.0e6f64..1.0e6, scale in -30i32..30) {
                let value = mantissa * 10f64.powi(scale);
                prop_assume!(value.abs() > 1.0e-35);
                let bytes = BinaryFormat::VaxDflt.encode_f64(value).map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(BinaryFormat::VaxDflt.decode_f64(bytes), value);
            }

            /// Integer encoding is an exact inverse for every format
            #[test]
            fn int_round_trip(value in any::<i32>()) {
                for format in BinaryFormat::ALL {
                    prop_assert_eq!(format.decode_i32(format.encode_i32(value)), value);
                }
            }
        }
    }
}
