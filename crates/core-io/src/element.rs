//! Raw element types and their decoding.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::IoError;

/// Pixel storage types accepted in raw projection data. Everything is
/// decoded to f32 at ingestion; the attenuation conversion operates in
/// floating point regardless of the detector's native type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl ElementType {
    pub fn size_bytes(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// The MetaImage `ElementType` identifier.
    pub fn met_name(self) -> &'static str {
        match self {
            Self::Int8 => "MET_CHAR",
            Self::UInt8 => "MET_UCHAR",
            Self::Int16 => "MET_SHORT",
            Self::UInt16 => "MET_USHORT",
            Self::Int32 => "MET_INT",
            Self::UInt32 => "MET_UINT",
            Self::Float32 => "MET_FLOAT",
            Self::Float64 => "MET_DOUBLE",
        }
    }

    pub fn from_met_name(name: &str) -> Result<Self, IoError> {
        Ok(match name {
            "MET_CHAR" => Self::Int8,
            "MET_UCHAR" => Self::UInt8,
            "MET_SHORT" => Self::Int16,
            "MET_USHORT" => Self::UInt16,
            "MET_INT" => Self::Int32,
            "MET_UINT" => Self::UInt32,
            "MET_FLOAT" => Self::Float32,
            "MET_DOUBLE" => Self::Float64,
            other => return Err(IoError::UnsupportedElementType(other.to_string())),
        })
    }

    /// Decodes `out.len()` elements from `bytes` into f32.
    pub fn decode_to_f32(self, bytes: &[u8], big_endian: bool, out: &mut [f32]) {
        assert_eq!(bytes.len(), out.len() * self.size_bytes(), "byte count mismatch");
        if big_endian {
            self.decode_with::<BigEndian>(bytes, out);
        } else {
            self.decode_with::<LittleEndian>(bytes, out);
        }
    }

    fn decode_with<E: ByteOrder>(self, bytes: &[u8], out: &mut [f32]) {
        match self {
            Self::Int8 => {
                for (o, &b) in out.iter_mut().zip(bytes) {
                    *o = b as i8 as f32;
                }
            }
            Self::UInt8 => {
                for (o, &b) in out.iter_mut().zip(bytes) {
                    *o = b as f32;
                }
            }
            Self::Int16 => {
                for (o, c) in out.iter_mut().zip(bytes.chunks_exact(2)) {
                    *o = E::read_i16(c) as f32;
                }
            }
            Self::UInt16 => {
                for (o, c) in out.iter_mut().zip(bytes.chunks_exact(2)) {
                    *o = E::read_u16(c) as f32;
                }
            }
            Self::Int32 => {
                for (o, c) in out.iter_mut().zip(bytes.chunks_exact(4)) {
                    *o = E::read_i32(c) as f32;
                }
            }
            Self::UInt32 => {
                for (o, c) in out.iter_mut().zip(bytes.chunks_exact(4)) {
                    *o = E::read_u32(c) as f32;
                }
            }
            Self::Float32 => {
                for (o, c) in out.iter_mut().zip(bytes.chunks_exact(4)) {
                    *o = E::read_f32(c);
                }
            }
            Self::Float64 => {
                for (o, c) in out.iter_mut().zip(bytes.chunks_exact(8)) {
                    *o = E::read_f64(c) as f32;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn met_names_round_trip() {
        for t in [
            ElementType::Int8,
            ElementType::UInt8,
            ElementType::Int16,
            ElementType::UInt16,
            ElementType::Int32,
            ElementType::UInt32,
            ElementType::Float32,
            ElementType::Float64,
        ] {
            assert_eq!(ElementType::from_met_name(t.met_name()).unwrap(), t);
        }
        assert!(ElementType::from_met_name("MET_LONG").is_err());
    }

    #[test]
    fn decodes_u16_both_endiannesses() {
        let mut out = [0.0f32; 2];
        ElementType::UInt16.decode_to_f32(&[0x01, 0x02, 0xff, 0x00], false, &mut out);
        assert_eq!(out, [513.0, 255.0]);
        ElementType::UInt16.decode_to_f32(&[0x01, 0x02, 0x00, 0xff], true, &mut out);
        assert_eq!(out, [258.0, 255.0]);
    }

    #[test]
    fn decodes_signed_and_float_types() {
        let mut out = [0.0f32; 1];
        ElementType::Int8.decode_to_f32(&[0xff], false, &mut out);
        assert_eq!(out[0], -1.0);

        let bytes = 1234.5f32.to_le_bytes();
        ElementType::Float32.decode_to_f32(&bytes, false, &mut out);
        assert_eq!(out[0], 1234.5);

        let bytes = (-2.25f64).to_be_bytes();
        ElementType::Float64.decode_to_f32(&bytes, true, &mut out);
        assert_eq!(out[0], -2.25);
    }
}
