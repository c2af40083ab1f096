//! Assembly of the processing objects shared by both engines.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use core_calib::{
    AttenuationConverter, BadPixelCorrector, BadPixelOptions, BeamPowerCorrector, BeamPowerLog,
    Calibration,
};
use core_config::{
    BadPixelCorrectionChoice, BeamPowerChoice, FilteringModuleChoice, InputKind,
    InterpolationChoice, ResolvedConfig, SmoothingSpec,
};
use core_filter::{FilteringModule, SmoothingFilter};
use core_geom::{Dims2, Projection, Subvolume, Vec2f};
use core_io::{read_field_averaged, IoError, ProjectionReader, SliceWriter};
use core_project::PixelInterpolation;
use tracing::info;

use crate::error::RunnerError;

/// Angle (radians) of the projection with acquisition index `i`.
pub fn projection_angle(acq_index: usize, angular_step: f64, reverse: bool) -> f32 {
    let angle = acq_index as f64 * angular_step;
    if reverse {
        -angle as f32
    } else {
        angle as f32
    }
}

/// The per-projection scalar corrections applied between reading and
/// filtering: attenuation conversion, bad-pixel repair, beam-power shift.
///
/// Shared read-only across worker threads; safe because every method
/// operates on the worker's own projection buffer.
#[derive(Debug)]
pub struct CorrectionStage {
    converter: AttenuationConverter,
    bad_pixels: Option<Arc<BadPixelCorrector>>,
    beam_power: BeamPowerCorrector,
}

impl CorrectionStage {
    /// Runs all corrections in place; returns the beam-power shift for the
    /// corrections log.
    pub fn process(&self, acq_index: usize, projection: &mut Projection) -> f64 {
        self.converter.convert(projection);
        if let Some(bad) = &self.bad_pixels {
            bad.correct_bad_pixels(projection);
        }
        self.beam_power.process_projection(acq_index, projection)
    }
}

/// Everything the engines need, built once from the resolved configuration.
pub struct PipelineParts {
    pub reader: ProjectionReader,
    pub corrections: Option<Arc<CorrectionStage>>,
    pub corrections_log: Option<BeamPowerLog<BufWriter<File>>>,
    pub attenuation_writer: Option<SliceWriter>,
    pub filtered_writer: Option<SliceWriter>,
    pub volume_writer: Option<SliceWriter>,
    /// `Some` whenever this run filters (raw or attenuation input and a
    /// consumer downstream).
    pub filter_spec: Option<FilterSpec>,
    pub backprojection: Option<BackProjectionSpec>,
    pub proj_dims: Dims2,
    pub proj_spacing: Vec2f,
    pub proj_origin: Vec2f,
    pub n_processed: usize,
    pub stride: usize,
    pub angular_step: f64,
    pub reverse_rotation: bool,
    pub threads: usize,
}

/// Parameters for constructing one per-worker `ProjectionFilterer`.
#[derive(Debug, Clone)]
pub struct FilterSpec {
    pub module: FilteringModule,
    pub dims: Dims2,
    pub pixel_spacing: f32,
    pub weight: f32,
    pub smoothing: Option<SmoothingFilter>,
}

impl FilterSpec {
    pub fn build(&self) -> Result<core_filter::ProjectionFilterer, core_filter::FilterError> {
        core_filter::ProjectionFilterer::new(
            self.module,
            self.dims,
            self.pixel_spacing,
            self.weight,
            self.smoothing,
        )
    }
}

/// Parameters for the per-worker back-projectors.
#[derive(Debug, Clone)]
pub struct BackProjectionSpec {
    pub subvolumes: Vec<Subvolume>,
    pub voxel_size: core_geom::Vec3f,
    pub interpolation: PixelInterpolation,
    pub scaling_factor: f32,
}

/// Builds all processing objects. `threads` is the worker count already
/// decided by the launcher (1 for the single-threaded engine) and drives
/// the volume partitioning.
pub fn build_pipeline(config: &ResolvedConfig, threads: usize) -> Result<PipelineParts, RunnerError> {
    let projections = &config.projections;
    let proj_dims = projections.dims;
    let proj_spacing = projections.pixel_size;
    let proj_origin = projections.origin();

    // Reader over whichever dataset is the entry point.
    let mut reader = ProjectionReader::open(&config.input.projections_file)?;
    reader.configure(proj_dims, projections.n_projections, projections.stride)?;
    reader.initialize()?;

    // Calibration and the correction stage exist only on the raw path.
    let corrections = if config.input.kind == InputKind::Raw {
        let calibration = load_calibration(config, proj_dims, proj_spacing, proj_origin)?;

        let bad_pixels = match config.reconstruction.bad_pixel_correction {
            BadPixelCorrectionChoice::Averaging => {
                let corrector = BadPixelCorrector::identify(
                    calibration.dark_field(),
                    calibration.bright_field(),
                    BadPixelOptions {
                        flat_field_bad_threshold: config.reconstruction.flat_field_bad_threshold
                            as f32,
                        dark_field_bad_threshold: config.reconstruction.dark_field_bad_threshold
                            as f32,
                    },
                )?;
                Some(Arc::new(corrector))
            }
            BadPixelCorrectionChoice::None => None,
        };

        let converter = AttenuationConverter::new(&calibration, bad_pixels.as_deref())?;

        let beam_power = match config.reconstruction.beam_power_correction {
            BeamPowerChoice::None => BeamPowerCorrector::None,
            BeamPowerChoice::Manual => BeamPowerCorrector::manual(
                config.reconstruction.beam_power_decay_constant_term,
                config.reconstruction.beam_power_decay_linear_term,
            )?,
            BeamPowerChoice::BeforeAndAfterBrightField => {
                BeamPowerCorrector::before_and_after_bright(
                    &calibration,
                    projections.n_projections,
                    bad_pixels.as_deref(),
                    config.reconstruction.beam_power_decay_constant_term,
                )?
            }
            BeamPowerChoice::ConstantTotalAttenuation => BeamPowerCorrector::constant_attenuation(
                config.reconstruction.beam_power_decay_constant_term,
            ),
            BeamPowerChoice::NullProjectionEdge => BeamPowerCorrector::null_projection_edge(
                config.reconstruction.projection_background_edge_width,
            ),
        };

        Some(Arc::new(CorrectionStage {
            converter,
            bad_pixels,
            beam_power,
        }))
    } else {
        None
    };

    let corrections_log = match &config.output.attenuation_corrections_file {
        Some(path) => {
            let file = File::create(path).map_err(RunnerError::CorrectionsLog)?;
            Some(BeamPowerLog::new(BufWriter::new(file)))
        }
        None => None,
    };

    let attenuation_writer = config
        .output
        .attenuation_projections_file
        .as_deref()
        .map(|path| projection_stack_writer(path, proj_dims, proj_spacing, proj_origin))
        .transpose()?;
    let filtered_writer = config
        .output
        .filtered_projections_file
        .as_deref()
        .map(|path| projection_stack_writer(path, proj_dims, proj_spacing, proj_origin))
        .transpose()?;

    // Filtering exists when something downstream consumes it.
    let needs_filter = config.input.kind != InputKind::Filtered
        && (filtered_writer.is_some() || config.volume.is_some());
    let filter_spec = if needs_filter {
        let module = match config.software.filtering_module {
            FilteringModuleChoice::RealSpaceConvolution => FilteringModule::RealSpaceConvolution,
            FilteringModuleChoice::RustFft => FilteringModule::RustFft,
            FilteringModuleChoice::RealFft => FilteringModule::RealFft,
        };
        let smoothing = config.reconstruction.smoothing.map(|s| match s {
            SmoothingSpec::Gaussian { radius } => SmoothingFilter::gaussian_with_radius(radius),
            SmoothingSpec::TaperedCosineWindow { f1, f2 } => {
                SmoothingFilter::TaperedCosineWindow { f1, f2 }
            }
        });
        // The filter weight is the angular measure each processed
        // projection represents.
        let weight = (projections.angular_step() * projections.stride as f64) as f32;
        Some(FilterSpec {
            module,
            dims: proj_dims,
            pixel_spacing: proj_spacing[1],
            weight,
            smoothing,
        })
    } else {
        None
    };

    let (backprojection, volume_writer) = match (&config.volume, &config.output.volume_file) {
        (Some(volume), Some(path)) => {
            let subvolumes = core_geom::partition_volume(
                volume.dims,
                volume.voxel_size,
                volume.origin,
                threads,
            );
            let slice_dims = Dims2::new([volume.dims[1], volume.dims[2]]);
            let mut writer = SliceWriter::create(path, slice_dims);
            writer.set_element_size(volume.voxel_size);
            writer.set_origin(volume.origin);
            writer.initialize()?;
            let interpolation = match config.reconstruction.pixel_interpolation {
                InterpolationChoice::NearestNeighbor => PixelInterpolation::NearestNeighbor,
                InterpolationChoice::Bilinear => PixelInterpolation::Bilinear,
                InterpolationChoice::BilinearWithFallback => {
                    PixelInterpolation::BilinearWithFallback
                }
            };
            (
                Some(BackProjectionSpec {
                    subvolumes,
                    voxel_size: volume.voxel_size,
                    interpolation,
                    scaling_factor: config.reconstruction.scaling_factor as f32,
                }),
                Some(writer),
            )
        }
        _ => (None, None),
    };

    info!(
        target: "runner",
        input = ?config.input.kind,
        projections = projections.n_processed(),
        threads,
        filtering = filter_spec.is_some(),
        back_projection = backprojection.is_some(),
        "pipeline assembled"
    );

    Ok(PipelineParts {
        reader,
        corrections,
        corrections_log,
        attenuation_writer,
        filtered_writer,
        volume_writer,
        filter_spec,
        backprojection,
        proj_dims,
        proj_spacing,
        proj_origin,
        n_processed: projections.n_processed(),
        stride: projections.stride,
        angular_step: projections.angular_step(),
        reverse_rotation: projections.reverse_rotation,
        threads,
    })
}

fn projection_stack_writer(
    path: &Path,
    dims: Dims2,
    spacing: Vec2f,
    origin: Vec2f,
) -> Result<SliceWriter, IoError> {
    let mut writer = SliceWriter::create(path, dims);
    writer.set_slice_geometry([spacing[0], spacing[1]], [origin[0], origin[1]]);
    writer.initialize()?;
    Ok(writer)
}

fn load_calibration(
    config: &ResolvedConfig,
    proj_dims: Dims2,
    proj_spacing: Vec2f,
    proj_origin: Vec2f,
) -> Result<Calibration, RunnerError> {
    let load = |path: &Path| -> Result<Projection, RunnerError> {
        let mut field = read_field_averaged(path)?;
        if field.dims() != proj_dims {
            return Err(IoError::DimsMismatch {
                expected: proj_dims.to_string(),
                found: field.dims().to_string(),
            }
            .into());
        }
        field.set_spacing(proj_spacing);
        field.set_origin(proj_origin);
        Ok(field)
    };

    let dark = load(
        config
            .input
            .dark_field_file
            .as_deref()
            .expect("raw input requires a dark field"),
    )?;
    let bright = load(
        config
            .input
            .bright_field_file
            .as_deref()
            .expect("raw input requires a bright field"),
    )?;
    let post = config
        .input
        .post_scan_bright_field_file
        .as_deref()
        .map(load)
        .transpose()?;

    Ok(Calibration::new(dark, bright, post)?)
}

/// Allocates a projection buffer with the pipeline geometry.
pub fn projection_buffer(parts: &PipelineParts) -> Box<Projection> {
    Box::new(Projection::new(
        parts.proj_dims,
        parts.proj_spacing,
        parts.proj_origin,
    ))
}
