//! MetaImage (.mhd) header reading and writing.
//!
//! Only the keys this pipeline needs are interpreted; unknown keys are
//! tolerated on read (scanner vendors add their own), and `ElementDataFile`
//! is always the final key as the format requires. Unified `.mha` files
//! (header and data in one file) are not supported.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::element::ElementType;
use crate::error::IoError;

/// The parsed content of a `.mhd` header. Dimension-ordered fields
/// (`dim_size`, `element_spacing`, `offset`) are listed fastest-axis-first,
/// exactly as they appear in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaHeader {
    pub ndims: usize,
    pub dim_size: Vec<usize>,
    pub element_type: ElementType,
    pub element_spacing: Option<Vec<f64>>,
    pub offset: Option<Vec<f64>>,
    pub big_endian: bool,
    /// Path of the raw data file, resolved relative to the header.
    pub data_path: PathBuf,
}

impl MetaHeader {
    pub fn read(path: &Path) -> Result<Self, IoError> {
        let text = fs::read_to_string(path).map_err(|source| IoError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self, IoError> {
        let fail = |reason: &str| IoError::HeaderParse {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let mut ndims = None;
        let mut dim_size = None;
        let mut element_type = None;
        let mut element_spacing = None;
        let mut offset = None;
        let mut big_endian = false;
        let mut data_file = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| fail(&format!("line without '=': {line}")))?;
            let (key, value) = (key.trim(), value.trim());
            match key {
                "ObjectType" => {
                    if value != "Image" {
                        return Err(fail(&format!("ObjectType {value} is not Image")));
                    }
                }
                "NDims" => {
                    ndims = Some(
                        value
                            .parse::<usize>()
                            .map_err(|_| fail("unparseable NDims"))?,
                    );
                }
                "DimSize" => {
                    let parsed: Result<Vec<usize>, _> =
                        value.split_whitespace().map(str::parse).collect();
                    dim_size = Some(parsed.map_err(|_| fail("unparseable DimSize"))?);
                }
                "ElementType" => {
                    element_type = Some(ElementType::from_met_name(value)?);
                }
                "ElementSpacing" | "ElementSize" => {
                    let parsed: Result<Vec<f64>, _> =
                        value.split_whitespace().map(str::parse).collect();
                    element_spacing = Some(parsed.map_err(|_| fail("unparseable spacing"))?);
                }
                "Offset" | "Origin" | "Position" => {
                    let parsed: Result<Vec<f64>, _> =
                        value.split_whitespace().map(str::parse).collect();
                    offset = Some(parsed.map_err(|_| fail("unparseable Offset"))?);
                }
                "BinaryDataByteOrderMSB" | "ElementByteOrderMSB" => {
                    big_endian = value.eq_ignore_ascii_case("true");
                }
                "CompressedData" => {
                    if value.eq_ignore_ascii_case("true") {
                        return Err(fail("compressed MetaImage data is not supported"));
                    }
                }
                "ElementDataFile" => {
                    if value == "LOCAL" {
                        return Err(fail("unified .mha files (ElementDataFile = LOCAL) are not supported"));
                    }
                    data_file = Some(value.to_string());
                }
                // BinaryData, TransformMatrix, vendor extensions, ...
                _ => {}
            }
        }

        let ndims = ndims.ok_or_else(|| fail("missing NDims"))?;
        let dim_size = dim_size.ok_or_else(|| fail("missing DimSize"))?;
        if dim_size.len() != ndims {
            return Err(fail("DimSize length does not match NDims"));
        }
        let element_type = element_type.ok_or_else(|| fail("missing ElementType"))?;
        let data_file = data_file.ok_or_else(|| fail("missing ElementDataFile"))?;
        let data_path = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(data_file);

        Ok(Self {
            ndims,
            dim_size,
            element_type,
            element_spacing,
            offset,
            big_endian,
            data_path,
        })
    }

    /// Writes a header describing an f32 dataset; `dim_size`, `spacing` and
    /// `offset` are fastest-axis-first. The data file is referenced by its
    /// file name only, so the pair stays relocatable.
    pub fn write(
        path: &Path,
        dim_size: &[usize],
        spacing: &[f64],
        offset: &[f64],
        data_file_name: &str,
    ) -> Result<(), IoError> {
        let mut text = String::new();
        text.push_str("ObjectType = Image\n");
        text.push_str(&format!("NDims = {}\n", dim_size.len()));
        text.push_str(&format!("DimSize = {}\n", join(dim_size)));
        text.push_str("ElementType = MET_FLOAT\n");
        text.push_str(&format!("ElementSpacing = {}\n", join(spacing)));
        text.push_str(&format!("Offset = {}\n", join(offset)));
        text.push_str("BinaryData = True\n");
        text.push_str("BinaryDataByteOrderMSB = False\n");
        text.push_str(&format!("ElementDataFile = {data_file_name}\n"));

        let mut file = fs::File::create(path).map_err(|source| IoError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        file.write_all(text.as_bytes())
            .map_err(|source| IoError::Write {
                path: path.to_path_buf(),
                source,
            })
    }
}

fn join<T: std::fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_typical_projection_header() {
        let dir = tempfile::tempdir().unwrap();
        let mhd = dir.path().join("scan.mhd");
        fs::write(
            &mhd,
            "ObjectType = Image\nNDims = 3\nDimSize = 512 256 720\n\
             ElementType = MET_USHORT\nElementSpacing = 0.05 0.05 1\n\
             Offset = -12.775 -6.375 0\nBinaryData = True\n\
             BinaryDataByteOrderMSB = True\nElementDataFile = scan.raw\n",
        )
        .unwrap();

        let header = MetaHeader::read(&mhd).unwrap();
        assert_eq!(header.ndims, 3);
        assert_eq!(header.dim_size, vec![512, 256, 720]);
        assert_eq!(header.element_type, ElementType::UInt16);
        assert!(header.big_endian);
        assert_eq!(header.element_spacing, Some(vec![0.05, 0.05, 1.0]));
        assert_eq!(header.offset, Some(vec![-12.775, -6.375, 0.0]));
        assert_eq!(header.data_path, dir.path().join("scan.raw"));
    }

    #[test]
    fn rejects_local_data_and_compression() {
        let dir = tempfile::tempdir().unwrap();
        let mhd = dir.path().join("bad.mhd");
        fs::write(
            &mhd,
            "ObjectType = Image\nNDims = 2\nDimSize = 4 4\n\
             ElementType = MET_FLOAT\nElementDataFile = LOCAL\n",
        )
        .unwrap();
        assert!(matches!(
            MetaHeader::read(&mhd),
            Err(IoError::HeaderParse { .. })
        ));

        fs::write(
            &mhd,
            "ObjectType = Image\nNDims = 2\nDimSize = 4 4\nCompressedData = True\n\
             ElementType = MET_FLOAT\nElementDataFile = bad.raw\n",
        )
        .unwrap();
        assert!(matches!(
            MetaHeader::read(&mhd),
            Err(IoError::HeaderParse { .. })
        ));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mhd = dir.path().join("vol.mhd");
        MetaHeader::write(
            &mhd,
            &[64, 64, 32],
            &[0.1, 0.1, 0.2],
            &[-3.15, -3.15, -3.1],
            "vol.raw",
        )
        .unwrap();
        let header = MetaHeader::read(&mhd).unwrap();
        assert_eq!(header.dim_size, vec![64, 64, 32]);
        assert_eq!(header.element_type, ElementType::Float32);
        assert!(!header.big_endian);
        assert_eq!(header.element_spacing, Some(vec![0.1, 0.1, 0.2]));
    }
}
