//! Streaming slice writers.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use core_geom::{Dims2, Image3, Vec3f, View2};
use tracing::info;

use crate::error::IoError;

/// Accepts a stream of 2-D f32 slices and emits a 3-D MetaImage dataset.
///
/// Slices go straight to the raw file as little-endian f32; the header is
/// written at [`SliceWriter::close`], once the slice count is known. The
/// same writer serves projection stacks (slices are projections, the third
/// axis is projection number) and volumes (slices are z-planes).
#[derive(Debug)]
pub struct SliceWriter {
    mhd_path: PathBuf,
    raw_path: PathBuf,
    data_file_name: String,
    slice_dims: Dims2,
    /// (slowest, middle, fastest) spacing, i.e. (stack, v, u) or (z, y, x).
    element_size: Vec3f,
    origin: Vec3f,
    n_slices: usize,
    file: Option<BufWriter<File>>,
}

impl SliceWriter {
    /// `mhd_path` must end in `.mhd`; the raw file sits next to it with the
    /// same stem.
    pub fn create(mhd_path: &Path, slice_dims: Dims2) -> Self {
        let raw_path = mhd_path.with_extension("raw");
        let data_file_name = raw_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data.raw".to_string());
        Self {
            mhd_path: mhd_path.to_path_buf(),
            raw_path,
            data_file_name,
            slice_dims,
            element_size: Vec3f::zeros(),
            origin: Vec3f::zeros(),
            n_slices: 0,
            file: None,
        }
    }

    /// Full 3-D element size, ordered (slowest, v, u).
    pub fn set_element_size(&mut self, element_size: Vec3f) {
        self.element_size = element_size;
    }

    /// Full 3-D origin, ordered (slowest, v, u).
    pub fn set_origin(&mut self, origin: Vec3f) {
        self.origin = origin;
    }

    /// Geometry for stacks whose third axis has no spatial meaning
    /// (projection stacks): the stack axis gets spacing 0 and origin 0.
    pub fn set_slice_geometry(&mut self, pixel_size: [f32; 2], slice_origin: [f32; 2]) {
        self.element_size = Vec3f::new([0.0, pixel_size[0], pixel_size[1]]);
        self.origin = Vec3f::new([0.0, slice_origin[0], slice_origin[1]]);
    }

    pub fn n_slices(&self) -> usize {
        self.n_slices
    }

    pub fn initialize(&mut self) -> Result<(), IoError> {
        let file = File::create(&self.raw_path).map_err(|source| IoError::Open {
            path: self.raw_path.clone(),
            source,
        })?;
        self.file = Some(BufWriter::new(file));
        self.n_slices = 0;
        Ok(())
    }

    pub fn write_slice(&mut self, slice: View2<'_, f32>) -> Result<(), IoError> {
        assert_eq!(slice.dims(), self.slice_dims, "slice shape mismatch");
        let file = self.file.as_mut().expect("writer not initialised");
        for &v in slice.data() {
            file.write_f32::<LittleEndian>(v)
                .map_err(|source| IoError::Write {
                    path: self.raw_path.clone(),
                    source,
                })?;
        }
        self.n_slices += 1;
        Ok(())
    }

    pub fn write_stack(&mut self, stack: &Image3<f32>) -> Result<(), IoError> {
        for z in 0..stack.dims()[0] {
            self.write_slice(stack.slice(z))?;
        }
        Ok(())
    }

    /// Flushes the data file and writes the `.mhd` header. Must be called;
    /// dropping an unclosed writer loses the metadata.
    pub fn close(&mut self) -> Result<(), IoError> {
        if let Some(mut file) = self.file.take() {
            file.flush().map_err(|source| IoError::Write {
                path: self.raw_path.clone(),
                source,
            })?;
            // File order is fastest-axis-first.
            let dim_size = [self.slice_dims[1], self.slice_dims[0], self.n_slices];
            let spacing = [
                self.element_size[2] as f64,
                self.element_size[1] as f64,
                self.element_size[0] as f64,
            ];
            let offset = [
                self.origin[2] as f64,
                self.origin[1] as f64,
                self.origin[0] as f64,
            ];
            crate::meta::MetaHeader::write(
                &self.mhd_path,
                &dim_size,
                &spacing,
                &offset,
                &self.data_file_name,
            )?;
            info!(
                target: "io",
                path = %self.mhd_path.display(),
                slices = self.n_slices,
                "dataset finalised"
            );
        }
        Ok(())
    }
}
