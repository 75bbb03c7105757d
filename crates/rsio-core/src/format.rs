use std::fmt;

use crate::{Error, Result};

/// Sample encoding of one channel value.
///
/// 24-bit formats occupy the low three bytes of a 32-bit word, so their byte width is 4.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SampleFormat {
    S8,
    U8,
    S16LE,
    S16BE,
    U16LE,
    U16BE,
    S24LE,
    S24BE,
    U24LE,
    U24BE,
    S32LE,
    S32BE,
    U32LE,
    U32BE,
    F32LE,
    F32BE,
    F64LE,
    F64BE,
}

macro_rules! endian_aliases {
    ($($ne:ident, $fe:ident => $le:ident, $be:ident;)*) => {
        impl SampleFormat {
            $(
                pub const $ne: SampleFormat = if cfg!(target_endian = "little") {
                    SampleFormat::$le
                } else {
                    SampleFormat::$be
                };

                pub const $fe: SampleFormat = if cfg!(target_endian = "little") {
                    SampleFormat::$be
                } else {
                    SampleFormat::$le
                };
            )*
        }
    };
}

endian_aliases! {
    S16NE, S16FE => S16LE, S16BE;
    U16NE, U16FE => U16LE, U16BE;
    S24NE, S24FE => S24LE, S24BE;
    U24NE, U24FE => U24LE, U24BE;
    S32NE, S32FE => S32LE, S32BE;
    U32NE, U32FE => U32LE, U32BE;
    F32NE, F32FE => F32LE, F32BE;
    F64NE, F64FE => F64LE, F64BE;
}

/// Formats tried by [`select_format()`], best first.
pub const PREFERRED_FORMATS: [SampleFormat; 4] = [
    SampleFormat::F32NE,
    SampleFormat::F64NE,
    SampleFormat::S32NE,
    SampleFormat::S16NE,
];

impl SampleFormat {
    pub const ALL: [SampleFormat; 18] = [
        SampleFormat::S8,
        SampleFormat::U8,
        SampleFormat::S16LE,
        SampleFormat::S16BE,
        SampleFormat::U16LE,
        SampleFormat::U16BE,
        SampleFormat::S24LE,
        SampleFormat::S24BE,
        SampleFormat::U24LE,
        SampleFormat::U24BE,
        SampleFormat::S32LE,
        SampleFormat::S32BE,
        SampleFormat::U32LE,
        SampleFormat::U32BE,
        SampleFormat::F32LE,
        SampleFormat::F32BE,
        SampleFormat::F64LE,
        SampleFormat::F64BE,
    ];

    pub const fn bytes_per_sample(self) -> usize {
        use SampleFormat::*;
        match self {
            S8 | U8 => 1,
            S16LE | S16BE | U16LE | U16BE => 2,
            S24LE | S24BE | U24LE | U24BE => 4,
            S32LE | S32BE | U32LE | U32BE => 4,
            F32LE | F32BE => 4,
            F64LE | F64BE => 8,
        }
    }

    /// Number of significant bits.
    pub const fn bits(self) -> u32 {
        use SampleFormat::*;
        match self {
            S8 | U8 => 8,
            S16LE | S16BE | U16LE | U16BE => 16,
            S24LE | S24BE | U24LE | U24BE => 24,
            S32LE | S32BE | U32LE | U32BE | F32LE | F32BE => 32,
            F64LE | F64BE => 64,
        }
    }

    pub const fn is_float(self) -> bool {
        use SampleFormat::*;
        matches!(self, F32LE | F32BE | F64LE | F64BE)
    }

    pub const fn is_signed(self) -> bool {
        use SampleFormat::*;
        !matches!(self, U8 | U16LE | U16BE | U24LE | U24BE | U32LE | U32BE)
    }

    /// Single-byte formats count as little endian.
    pub const fn is_little_endian(self) -> bool {
        use SampleFormat::*;
        matches!(
            self,
            S8 | U8 | S16LE | U16LE | S24LE | U24LE | S32LE | U32LE | F32LE | F64LE
        )
    }

    pub const fn name(self) -> &'static str {
        use SampleFormat::*;
        match self {
            S8 => "signed 8-bit",
            U8 => "unsigned 8-bit",
            S16LE => "signed 16-bit LE",
            S16BE => "signed 16-bit BE",
            U16LE => "unsigned 16-bit LE",
            U16BE => "unsigned 16-bit BE",
            S24LE => "signed 24-bit LE",
            S24BE => "signed 24-bit BE",
            U24LE => "unsigned 24-bit LE",
            U24BE => "unsigned 24-bit BE",
            S32LE => "signed 32-bit LE",
            S32BE => "signed 32-bit BE",
            U32LE => "unsigned 32-bit LE",
            U32BE => "unsigned 32-bit BE",
            F32LE => "float 32-bit LE",
            F32BE => "float 32-bit BE",
            F64LE => "float 64-bit LE",
            F64BE => "float 64-bit BE",
        }
    }

    /// Encodes `sample` (nominally in `[-1, 1]`) into the first [`Self::bytes_per_sample()`]
    /// bytes of `out`. Integer formats clamp and round; unsigned formats are offset so that `0.0`
    /// maps to the mid-point.
    pub fn encode_f32(self, sample: f32, out: &mut [u8]) {
        use SampleFormat::*;

        let out = &mut out[..self.bytes_per_sample()];

        match self {
            F32LE => out.copy_from_slice(&sample.to_le_bytes()),
            F32BE => out.copy_from_slice(&sample.to_be_bytes()),
            F64LE => out.copy_from_slice(&f64::from(sample).to_le_bytes()),
            F64BE => out.copy_from_slice(&f64::from(sample).to_be_bytes()),
            _ => {
                let value = quantize(sample, self.bits());
                let word = if self.is_signed() {
                    value
                } else {
                    value + (1 << (self.bits() - 1))
                };

                match self.bytes_per_sample() {
                    1 => out[0] = word as u8,
                    2 if self.is_little_endian() => out.copy_from_slice(&(word as u16).to_le_bytes()),
                    2 => out.copy_from_slice(&(word as u16).to_be_bytes()),
                    _ if self.is_little_endian() => out.copy_from_slice(&(word as u32).to_le_bytes()),
                    _ => out.copy_from_slice(&(word as u32).to_be_bytes()),
                }
            }
        }
    }

    /// Decodes one sample from the first [`Self::bytes_per_sample()`] bytes of `bytes`.
    pub fn decode_f32(self, bytes: &[u8]) -> f32 {
        use SampleFormat::*;

        let bytes = &bytes[..self.bytes_per_sample()];

        match self {
            F32LE => f32::from_le_bytes(array(bytes)),
            F32BE => f32::from_be_bytes(array(bytes)),
            F64LE => f64::from_le_bytes(array(bytes)) as f32,
            F64BE => f64::from_be_bytes(array(bytes)) as f32,
            _ => {
                let bits = self.bits();
                let word: u32 = match bytes.len() {
                    1 => u32::from(bytes[0]),
                    2 if self.is_little_endian() => u32::from(u16::from_le_bytes(array(bytes))),
                    2 => u32::from(u16::from_be_bytes(array(bytes))),
                    _ if self.is_little_endian() => u32::from_le_bytes(array(bytes)),
                    _ => u32::from_be_bytes(array(bytes)),
                };

                // Keep the significant bits only (24-bit formats ignore the top byte).
                let word = i64::from(word) & ((1i64 << bits) - 1);

                let value = if self.is_signed() {
                    // Sign-extend from `bits`.
                    let shift = 64 - bits;
                    (word << shift) >> shift
                } else {
                    word - (1 << (bits - 1))
                };

                let max = ((1i64 << (bits - 1)) - 1) as f64;
                ((value as f64) / max).clamp(-1.0, 1.0) as f32
            }
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn quantize(sample: f32, bits: u32) -> i64 {
    let max = ((1i64 << (bits - 1)) - 1) as f64;
    let sample = if sample.is_nan() { 0.0 } else { sample };
    (f64::from(sample).clamp(-1.0, 1.0) * max).round() as i64
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut array = [0; N];
    array.copy_from_slice(bytes);
    array
}

/// Picks the first of [`PREFERRED_FORMATS`] that `supported` contains.
///
/// The order of `supported` does not matter.
pub fn select_format(supported: &[SampleFormat]) -> Result<SampleFormat> {
    PREFERRED_FORMATS
        .into_iter()
        .find(|format| supported.contains(format))
        .ok_or(Error::NoCompatibleFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_width_matches_tag() {
        for format in SampleFormat::ALL {
            let expected = match format.bits() {
                8 => 1,
                16 => 2,
                24 | 32 => 4,
                _ => 8,
            };
            assert_eq!(format.bytes_per_sample(), expected, "{format}");
        }
    }

    #[test]
    fn native_aliases_follow_target() {
        if cfg!(target_endian = "little") {
            assert_eq!(SampleFormat::F32NE, SampleFormat::F32LE);
            assert_eq!(SampleFormat::S16FE, SampleFormat::S16BE);
        } else {
            assert_eq!(SampleFormat::F32NE, SampleFormat::F32BE);
            assert_eq!(SampleFormat::S16FE, SampleFormat::S16LE);
        }
    }

    #[test]
    fn selection_honors_preference() {
        assert_eq!(
            select_format(&[SampleFormat::S16NE]),
            Ok(SampleFormat::S16NE)
        );
        assert_eq!(
            select_format(&[SampleFormat::F64NE, SampleFormat::S16NE]),
            Ok(SampleFormat::F64NE)
        );
        assert_eq!(
            select_format(&[SampleFormat::S16NE, SampleFormat::F64NE]),
            Ok(SampleFormat::F64NE)
        );
        assert_eq!(
            select_format(&[
                SampleFormat::S32NE,
                SampleFormat::U8,
                SampleFormat::F32NE
            ]),
            Ok(SampleFormat::F32NE)
        );
    }

    #[test]
    fn selection_fails_without_candidates() {
        assert_eq!(
            select_format(&[SampleFormat::U8, SampleFormat::S16FE]),
            Err(Error::NoCompatibleFormat)
        );
        assert_eq!(select_format(&[]), Err(Error::NoCompatibleFormat));
    }

    #[test]
    fn silence_encodes_to_midpoint() {
        let mut buf = [0xAA; 8];

        SampleFormat::U8.encode_f32(0.0, &mut buf);
        assert_eq!(buf[0], 0x80);

        SampleFormat::U16BE.encode_f32(0.0, &mut buf);
        assert_eq!(&buf[..2], &[0x80, 0x00]);

        SampleFormat::S16LE.encode_f32(0.0, &mut buf);
        assert_eq!(&buf[..2], &[0, 0]);

        SampleFormat::F64LE.encode_f32(0.0, &mut buf);
        assert_eq!(buf, [0; 8]);
    }

    #[test]
    fn integer_encoding_clamps_and_scales() {
        let mut buf = [0; 4];

        SampleFormat::S16LE.encode_f32(1.0, &mut buf);
        assert_eq!(i16::from_le_bytes([buf[0], buf[1]]), i16::MAX);

        SampleFormat::S16BE.encode_f32(-2.0, &mut buf);
        assert_eq!(i16::from_be_bytes([buf[0], buf[1]]), -i16::MAX);

        SampleFormat::S24LE.encode_f32(-1.0, &mut buf);
        assert_eq!(i32::from_le_bytes(buf), -8_388_607);

        SampleFormat::U32BE.encode_f32(1.0, &mut buf);
        assert_eq!(u32::from_be_bytes(buf), u32::MAX);

        SampleFormat::S8.encode_f32(0.5, &mut buf);
        assert_eq!(buf[0] as i8, 64);
    }

    #[test]
    fn decoding_inverts_encoding() {
        let mut buf = [0; 8];

        for format in SampleFormat::ALL {
            for sample in [-1.0f32, -0.25, 0.0, 0.5, 1.0] {
                format.encode_f32(sample, &mut buf);
                let decoded = format.decode_f32(&buf);
                let step = 2.0 / (1u64 << format.bits().min(24)) as f32;
                assert!(
                    (decoded - sample).abs() <= step,
                    "{format}: {sample} -> {decoded}"
                );
            }
        }
    }

    #[test]
    fn s24_ignores_padding_byte() {
        let word = 0xFF00_0001u32.to_le_bytes();
        let decoded = SampleFormat::S24LE.decode_f32(&word);
        assert!((decoded - 1.0 / 8_388_607.0).abs() < 1e-9);
    }
}
