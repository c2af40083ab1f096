//! Streaming projection readers.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use core_geom::{Dims2, Projection, Vec2f};
use tracing::{debug, info};

use crate::error::IoError;
use crate::meta::MetaHeader;

/// Streams projections out of a MetaImage dataset in acquisition order.
///
/// The dataset is a 3-D stack ordered (projection, v, u); the reader
/// decodes one (v, u) frame per call into the caller's f32 buffer,
/// honouring a projection stride by seeking over the skipped frames.
/// Projections must be requested in order, which is why the reader lives
/// on the I/O executor thread rather than in the workers.
#[derive(Debug)]
pub struct ProjectionReader {
    header: MetaHeader,
    mhd_path: PathBuf,
    dims: Dims2,
    n_projections: usize,
    stride: usize,
    frame_bytes: usize,
    next_frame: usize,
    delivered: usize,
    file: Option<BufReader<File>>,
    raw: Vec<u8>,
}

impl ProjectionReader {
    /// Parses the header and derives the dataset shape. Call `configure`
    /// (after configuration resolution) and then `initialize` before
    /// reading.
    pub fn open(mhd_path: &Path) -> Result<Self, IoError> {
        let header = MetaHeader::read(mhd_path)?;
        let (dims, n_projections) = match header.ndims {
            2 => (
                Dims2::new([header.dim_size[1], header.dim_size[0]]),
                1usize,
            ),
            3 => (
                Dims2::new([header.dim_size[1], header.dim_size[0]]),
                header.dim_size[2],
            ),
            n => {
                return Err(IoError::HeaderParse {
                    path: mhd_path.to_path_buf(),
                    reason: format!("expected a 2-D or 3-D dataset, found NDims = {n}"),
                })
            }
        };
        let frame_bytes = dims.product() * header.element_type.size_bytes();
        Ok(Self {
            header,
            mhd_path: mhd_path.to_path_buf(),
            dims,
            n_projections,
            stride: 1,
            frame_bytes,
            next_frame: 0,
            delivered: 0,
            file: None,
            raw: Vec::new(),
        })
    }

    /// Header access for configuration inference (data type, shape, pixel
    /// size, offsets).
    pub fn header(&self) -> &MetaHeader {
        &self.header
    }

    /// Frame shape as (v, u).
    pub fn dims(&self) -> Dims2 {
        self.dims
    }

    /// Total projections in the file (unstrided).
    pub fn n_projections(&self) -> usize {
        self.n_projections
    }

    /// Number of projections `read_projection` will deliver under the
    /// current stride.
    pub fn n_delivered_projections(&self) -> usize {
        self.n_projections.div_ceil(self.stride)
    }

    /// Applies the configured shape and stride, validating against the
    /// header. `NumberOfProjections` may select a prefix of the file, never
    /// more than it holds.
    pub fn configure(
        &mut self,
        dims: Dims2,
        n_projections: usize,
        stride: usize,
    ) -> Result<(), IoError> {
        if dims != self.dims {
            return Err(IoError::DimsMismatch {
                expected: dims.to_string(),
                found: self.dims.to_string(),
            });
        }
        if n_projections > self.n_projections {
            return Err(IoError::DimsMismatch {
                expected: format!("{n_projections} projections"),
                found: format!("{} in the file", self.n_projections),
            });
        }
        assert!(stride > 0, "projection stride must be positive");
        self.n_projections = n_projections;
        self.stride = stride;
        Ok(())
    }

    /// Opens the data file and validates its length.
    pub fn initialize(&mut self) -> Result<(), IoError> {
        let file = File::open(&self.header.data_path).map_err(|source| IoError::Open {
            path: self.header.data_path.clone(),
            source,
        })?;
        let needed = (self.frame_bytes * self.n_projections) as u64;
        let found = file
            .metadata()
            .map_err(|source| IoError::Read {
                path: self.header.data_path.clone(),
                source,
            })?
            .len();
        if found < needed {
            return Err(IoError::Truncated {
                path: self.header.data_path.clone(),
                needed,
                found,
            });
        }
        self.raw.resize(self.frame_bytes, 0);
        self.file = Some(BufReader::new(file));
        self.next_frame = 0;
        self.delivered = 0;
        info!(
            target: "io",
            path = %self.mhd_path.display(),
            projections = self.n_projections,
            stride = self.stride,
            "projection reader initialised"
        );
        Ok(())
    }

    /// Reads the next projection into `out` and advances by the stride.
    pub fn read_projection(&mut self, out: &mut Projection) -> Result<(), IoError> {
        assert_eq!(out.dims(), self.dims, "output buffer shape mismatch");
        let file = self.file.as_mut().expect("reader not initialised");
        // Reading past the last projection hits EOF and reports Read.
        file.read_exact(&mut self.raw).map_err(|source| IoError::Read {
            path: self.header.data_path.clone(),
            source,
        })?;
        self.header
            .element_type
            .decode_to_f32(&self.raw, self.header.big_endian, out.data_mut());

        self.delivered += 1;
        self.next_frame += 1;
        // Skip over the strided-out frames.
        let skip = self.stride - 1;
        if skip > 0 && self.next_frame < self.n_projections {
            let skip = skip.min(self.n_projections - self.next_frame);
            file.seek(SeekFrom::Current((skip * self.frame_bytes) as i64))
                .map_err(|source| IoError::Read {
                    path: self.header.data_path.clone(),
                    source,
                })?;
            self.next_frame += skip;
        }
        debug!(target: "io", delivered = self.delivered, "projection read");
        Ok(())
    }

    /// Resets to the first projection (the constant-attenuation corrector
    /// may need a second pass over the data).
    pub fn rewind(&mut self) -> Result<(), IoError> {
        let file = self.file.as_mut().expect("reader not initialised");
        file.seek(SeekFrom::Start(0)).map_err(|source| IoError::Read {
            path: self.header.data_path.clone(),
            source,
        })?;
        self.next_frame = 0;
        self.delivered = 0;
        Ok(())
    }

    pub fn close(&mut self) {
        self.file = None;
    }
}

/// Loads a calibration field. A 2-D dataset is returned as-is; a 3-D stack
/// is averaged frame by frame (repeated dark/bright exposures are routinely
/// stored stacked).
pub fn read_field_averaged(mhd_path: &Path) -> Result<Projection, IoError> {
    let mut reader = ProjectionReader::open(mhd_path)?;
    reader.initialize()?;
    let dims = reader.dims();
    let frames = reader.n_projections();
    if frames == 0 {
        return Err(IoError::HeaderParse {
            path: mhd_path.to_path_buf(),
            reason: "calibration dataset holds no frames".to_string(),
        });
    }

    let mut accumulator = vec![0.0f64; dims.product()];
    let mut frame = Projection::new(dims, Vec2f::ones(), Vec2f::zeros());
    for _ in 0..frames {
        reader.read_projection(&mut frame)?;
        for (acc, &v) in accumulator.iter_mut().zip(frame.data()) {
            *acc += v as f64;
        }
    }
    reader.close();

    let scale = 1.0 / frames as f64;
    let data: Vec<f32> = accumulator.iter().map(|&v| (v * scale) as f32).collect();
    info!(
        target: "io",
        path = %mhd_path.display(),
        frames,
        "calibration field loaded"
    );
    Ok(Projection::from_vec(dims, Vec2f::ones(), Vec2f::zeros(), data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_dataset(dir: &Path, name: &str, dims_xy: [usize; 2], frames: &[Vec<u16>]) -> PathBuf {
        let mhd = dir.join(format!("{name}.mhd"));
        let raw = dir.join(format!("{name}.raw"));
        std::fs::write(
            &mhd,
            format!(
                "ObjectType = Image\nNDims = 3\nDimSize = {} {} {}\n\
                 ElementType = MET_USHORT\nElementSpacing = 1 1 1\n\
                 BinaryDataByteOrderMSB = False\nElementDataFile = {name}.raw\n",
                dims_xy[0],
                dims_xy[1],
                frames.len()
            ),
        )
        .unwrap();
        let mut f = File::create(&raw).unwrap();
        for frame in frames {
            for &v in frame {
                f.write_all(&v.to_le_bytes()).unwrap();
            }
        }
        mhd
    }

    #[test]
    fn reads_frames_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<Vec<u16>> = (0..4).map(|i| vec![i; 6]).collect();
        let mhd = write_dataset(dir.path(), "seq", [3, 2], &frames);

        let mut reader = ProjectionReader::open(&mhd).unwrap();
        assert_eq!(reader.dims(), Dims2::new([2, 3]));
        assert_eq!(reader.n_projections(), 4);
        reader.initialize().unwrap();

        let mut out = Projection::new(Dims2::new([2, 3]), Vec2f::ones(), Vec2f::zeros());
        for i in 0..4 {
            reader.read_projection(&mut out).unwrap();
            assert!(out.data().iter().all(|&v| v == i as f32));
        }
    }

    #[test]
    fn stride_skips_frames_and_rewind_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<Vec<u16>> = (0..7).map(|i| vec![i; 4]).collect();
        let mhd = write_dataset(dir.path(), "strided", [2, 2], &frames);

        let mut reader = ProjectionReader::open(&mhd).unwrap();
        reader.configure(Dims2::new([2, 2]), 7, 3).unwrap();
        assert_eq!(reader.n_delivered_projections(), 3);
        reader.initialize().unwrap();

        let mut out = Projection::new(Dims2::new([2, 2]), Vec2f::ones(), Vec2f::zeros());
        let mut seen = Vec::new();
        for _ in 0..3 {
            reader.read_projection(&mut out).unwrap();
            seen.push(out.at(0, 0));
        }
        assert_eq!(seen, vec![0.0, 3.0, 6.0]);

        reader.rewind().unwrap();
        reader.read_projection(&mut out).unwrap();
        assert_eq!(out.at(0, 0), 0.0);
    }

    #[test]
    fn truncated_data_is_detected_at_initialise() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<Vec<u16>> = (0..2).map(|i| vec![i; 4]).collect();
        let mhd = write_dataset(dir.path(), "trunc", [2, 2], &frames);
        // Claim more frames than the raw file holds.
        std::fs::write(
            dir.path().join("trunc.mhd"),
            "ObjectType = Image\nNDims = 3\nDimSize = 2 2 5\n\
             ElementType = MET_USHORT\nElementDataFile = trunc.raw\n",
        )
        .unwrap();
        let mut reader = ProjectionReader::open(&mhd).unwrap();
        assert!(matches!(
            reader.initialize(),
            Err(IoError::Truncated { .. })
        ));
    }

    #[test]
    fn configured_dims_must_match_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<Vec<u16>> = vec![vec![0; 6]];
        let mhd = write_dataset(dir.path(), "shape", [3, 2], &frames);
        let mut reader = ProjectionReader::open(&mhd).unwrap();
        assert!(matches!(
            reader.configure(Dims2::new([3, 3]), 1, 1),
            Err(IoError::DimsMismatch { .. })
        ));
    }

    #[test]
    fn stack_averaging() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<Vec<u16>> = vec![vec![10, 20, 30, 40], vec![30, 40, 50, 60]];
        let mhd = write_dataset(dir.path(), "avg", [2, 2], &frames);
        let field = read_field_averaged(&mhd).unwrap();
        assert_eq!(field.data(), &[20.0, 30.0, 40.0, 50.0]);
    }
}
