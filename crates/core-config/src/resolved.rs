//! Defaulting, cross-validation and the fully-typed configuration.

use std::f64::consts::PI;
use std::fmt;
use std::path::{Path, PathBuf};

use core_geom::{Dims2, Dims3, Vec2f, Vec3f};
use core_io::MetaHeader;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::file::{
    BadPixelCorrectionChoice, BeamPowerChoice, ConfigFile, DataType, EngineChoice,
    FilteringModuleChoice, InterpolationChoice, SmoothingChoice, ThreadsChoice,
};
use crate::memory::resolve_memory_limit;

/// Which dataset the pipeline starts from; the earlier stages are skipped
/// accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Raw,
    Attenuation,
    Filtered,
}

#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub kind: InputKind,
    pub projections_file: PathBuf,
    pub dark_field_file: Option<PathBuf>,
    pub bright_field_file: Option<PathBuf>,
    pub post_scan_bright_field_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedOutput {
    pub attenuation_projections_file: Option<PathBuf>,
    pub filtered_projections_file: Option<PathBuf>,
    pub volume_file: Option<PathBuf>,
    pub attenuation_corrections_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedProjections {
    pub data_type: DataType,
    /// (v, u), slowest axis first, the in-memory convention.
    pub dims: Dims2,
    pub n_projections: usize,
    pub projection_at_180: bool,
    /// (v, u).
    pub pixel_size: Vec2f,
    pub center_pixel_u: f64,
    pub offset_v: f64,
    pub reverse_rotation: bool,
    pub stride: usize,
}

impl ResolvedProjections {
    /// Projection origin (v, u): the u origin places `center_pixel_u` on
    /// the rotation axis, the v origin is `OffsetV` directly.
    pub fn origin(&self) -> Vec2f {
        Vec2f::new([
            self.offset_v as f32,
            (-self.center_pixel_u * self.pixel_size[1] as f64) as f32,
        ])
    }

    /// Angular separation of *adjacent frames in the file*. The last frame
    /// sits at exactly 180° when `ProjectionAt180` is set, so the step is
    /// π/(N-1) rather than π/N.
    pub fn angular_step(&self) -> f64 {
        if self.projection_at_180 {
            PI / (self.n_projections - 1) as f64
        } else {
            PI / self.n_projections as f64
        }
    }

    /// Number of projections actually processed under the stride.
    pub fn n_processed(&self) -> usize {
        self.n_projections.div_ceil(self.stride)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedVolume {
    /// (z, y, x).
    pub dims: Dims3,
    pub voxel_size: Vec3f,
    pub origin: Vec3f,
}

/// The smoothing transfer function, with its parameters validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SmoothingSpec {
    Gaussian { radius: f64 },
    TaperedCosineWindow { f1: f64, f2: f64 },
}

#[derive(Debug, Clone)]
pub struct ResolvedReconstruction {
    pub bad_pixel_correction: BadPixelCorrectionChoice,
    pub flat_field_bad_threshold: f64,
    pub dark_field_bad_threshold: f64,
    pub beam_power_correction: BeamPowerChoice,
    pub beam_power_decay_constant_term: f64,
    pub beam_power_decay_linear_term: Option<f64>,
    pub projection_background_edge_width: usize,
    pub pixel_interpolation: InterpolationChoice,
    pub smoothing: Option<SmoothingSpec>,
    pub scaling_factor: f64,
}

#[derive(Debug, Clone)]
pub struct ResolvedSoftware {
    pub engine: EngineChoice,
    /// `None` means Automatic (one worker per CPU core).
    pub threads: Option<usize>,
    /// Present only when a volume is produced.
    pub maximum_volume_memory: Option<u64>,
    pub filtering_module: FilteringModuleChoice,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub input: ResolvedInput,
    pub output: ResolvedOutput,
    pub projections: ResolvedProjections,
    pub volume: Option<ResolvedVolume>,
    pub reconstruction: ResolvedReconstruction,
    pub software: ResolvedSoftware,
}

impl ResolvedConfig {
    /// Reads, parses and resolves a configuration file. Relative paths in
    /// the file are taken relative to the file's own directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!(target: "config", path = %path.display(), "reading configuration");
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file = ConfigFile::parse(&text)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::resolve(file, dir)
    }

    pub fn resolve(file: ConfigFile, config_dir: &Path) -> Result<Self, ConfigError> {
        let input = resolve_input(&file, config_dir)?;
        let output = resolve_output(&file, &input, config_dir)?;

        // Everything the input dataset's header can provide becomes a
        // default; explicit configuration always wins.
        let header = MetaHeader::read(&input.projections_file)?;
        let projections = resolve_projections(&file, &header)?;

        let software = resolve_software(&file, &output)?;
        let volume = resolve_volume(&file, &output, &projections, &software)?;
        let reconstruction = resolve_reconstruction(&file, &input)?;

        if input.kind == InputKind::Raw
            && matches!(
                software.filtering_module,
                FilteringModuleChoice::RealSpaceConvolution
            )
            && reconstruction.smoothing.is_some()
        {
            return Err(ConfigError::Conflict(
                "Software.FilteringModule=RealSpaceConvolution cannot apply a \
                 Reconstruction.SmoothingFilter"
                    .to_string(),
            ));
        }

        Ok(Self {
            input,
            output,
            projections,
            volume,
            reconstruction,
            software,
        })
    }
}

fn join(dir: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        dir.join(p)
    }
}

fn resolve_input(file: &ConfigFile, dir: &Path) -> Result<ResolvedInput, ConfigError> {
    let section = &file.input;
    let candidates = [
        (InputKind::Raw, &section.raw_projections_file),
        (InputKind::Attenuation, &section.attenuation_projections_file),
        (InputKind::Filtered, &section.filtered_projections_file),
    ];
    let mut chosen = None;
    let mut count = 0;
    for (kind, path) in candidates {
        if let Some(path) = path {
            count += 1;
            chosen = Some((kind, join(dir, path)));
        }
    }
    if count != 1 {
        return Err(ConfigError::Conflict(
            "Require exactly one of Input.RawProjectionsFile, \
             Input.AttenuationProjectionsFile and Input.FilteredProjectionsFile"
                .to_string(),
        ));
    }
    let (kind, projections_file) = chosen.expect("counted above");

    if kind == InputKind::Raw {
        if section.dark_field_file.is_none() {
            return Err(ConfigError::Missing("Input.DarkFieldFile"));
        }
        if section.bright_field_file.is_none() {
            return Err(ConfigError::Missing("Input.BrightFieldFile"));
        }
    }

    Ok(ResolvedInput {
        kind,
        projections_file,
        dark_field_file: section.dark_field_file.as_deref().map(|p| join(dir, p)),
        bright_field_file: section.bright_field_file.as_deref().map(|p| join(dir, p)),
        post_scan_bright_field_file: section
            .post_scan_bright_field_file
            .as_deref()
            .map(|p| join(dir, p)),
    })
}

fn resolve_output(
    file: &ConfigFile,
    input: &ResolvedInput,
    dir: &Path,
) -> Result<ResolvedOutput, ConfigError> {
    let section = &file.output;
    let any = section.attenuation_projections_file.is_some()
        || section.filtered_projections_file.is_some()
        || section.volume_file.is_some()
        || section.attenuation_corrections_file.is_some();
    if !any {
        return Err(ConfigError::Conflict(
            "At least one Output file must be specified".to_string(),
        ));
    }

    let conflict = |a: &str, b: &str| {
        Err(ConfigError::Conflict(format!(
            "Cannot specify both {a} and {b}"
        )))
    };
    match input.kind {
        InputKind::Attenuation if section.attenuation_projections_file.is_some() => {
            return conflict(
                "Input.AttenuationProjectionsFile",
                "Output.AttenuationProjectionsFile",
            );
        }
        InputKind::Filtered if section.filtered_projections_file.is_some() => {
            return conflict(
                "Input.FilteredProjectionsFile",
                "Output.FilteredProjectionsFile",
            );
        }
        InputKind::Filtered if section.attenuation_projections_file.is_some() => {
            return conflict(
                "Input.FilteredProjectionsFile",
                "Output.AttenuationProjectionsFile",
            );
        }
        _ => {}
    }
    if input.kind != InputKind::Raw && section.attenuation_corrections_file.is_some() {
        return Err(ConfigError::Conflict(
            "Output.AttenuationCorrectionsFile requires Input.RawProjectionsFile \
             (corrections are computed during attenuation conversion)"
                .to_string(),
        ));
    }
    if input.kind == InputKind::Filtered && section.volume_file.is_none() {
        return Err(ConfigError::Conflict(
            "Input.FilteredProjectionsFile can only produce Output.VolumeFile".to_string(),
        ));
    }

    Ok(ResolvedOutput {
        attenuation_projections_file: section
            .attenuation_projections_file
            .as_deref()
            .map(|p| join(dir, p)),
        filtered_projections_file: section
            .filtered_projections_file
            .as_deref()
            .map(|p| join(dir, p)),
        volume_file: section.volume_file.as_deref().map(|p| join(dir, p)),
        attenuation_corrections_file: section
            .attenuation_corrections_file
            .as_deref()
            .map(|p| join(dir, p)),
    })
}

fn resolve_projections(
    file: &ConfigFile,
    header: &MetaHeader,
) -> Result<ResolvedProjections, ConfigError> {
    let section = &file.projections;

    // Header values, fastest-axis-first.
    let header_dims_uv = [header.dim_size[0], header.dim_size[1]];
    let header_n = if header.ndims >= 3 {
        header.dim_size[2]
    } else {
        1
    };

    let dims_uv = match section.dimensions {
        Some(dims) => {
            if dims != header_dims_uv {
                return Err(ConfigError::Invalid {
                    key: "Projections.Dimensions",
                    reason: format!(
                        "configured ({}, {}) but the dataset holds ({}, {})",
                        dims[0], dims[1], header_dims_uv[0], header_dims_uv[1]
                    ),
                });
            }
            dims
        }
        None => header_dims_uv,
    };
    let dims = Dims2::new([dims_uv[1], dims_uv[0]]);

    let n_projections = match section.number_of_projections {
        Some(n) => {
            if n == 0 || n > header_n {
                return Err(ConfigError::Invalid {
                    key: "Projections.NumberOfProjections",
                    reason: format!("{n} requested but the dataset holds {header_n}"),
                });
            }
            n
        }
        None => header_n,
    };

    let data_type = match section.data_type {
        Some(dt) => {
            if dt.to_element_type() != header.element_type {
                return Err(ConfigError::Invalid {
                    key: "Projections.DataType",
                    reason: format!(
                        "configured {dt:?} but the dataset stores {}",
                        header.element_type.met_name()
                    ),
                });
            }
            dt
        }
        None => DataType::from_element_type(header.element_type),
    };

    let pixel_uv = match section.pixel_size {
        Some(size) => size,
        None => match &header.element_spacing {
            Some(spacing) if spacing.len() >= 2 => [spacing[0], spacing[1]],
            _ => [1.0, 1.0],
        },
    };
    if pixel_uv.iter().any(|&s| s <= 0.0) {
        return Err(ConfigError::Invalid {
            key: "Projections.PixelSize",
            reason: "pixel size must be positive".to_string(),
        });
    }
    let pixel_size = Vec2f::new([pixel_uv[1] as f32, pixel_uv[0] as f32]);

    let center_pixel_u = match section.center_pixel_u {
        Some(c) => c,
        None => match &header.offset {
            Some(offset) if offset.len() >= 2 => -offset[0] / pixel_uv[0],
            _ => (dims_uv[0] - 1) as f64 / 2.0,
        },
    };
    let offset_v = match section.offset_v {
        Some(v) => v,
        None => match &header.offset {
            Some(offset) if offset.len() >= 2 => offset[1],
            _ => -pixel_uv[1] * (dims_uv[1] - 1) as f64 / 2.0,
        },
    };

    let projection_at_180 = section.projection_at_180.unwrap_or(true);
    if projection_at_180 && n_projections < 2 {
        return Err(ConfigError::Invalid {
            key: "Projections.NumberOfProjections",
            reason: "ProjectionAt180 requires at least 2 projections".to_string(),
        });
    }

    let stride = section.projection_stride.unwrap_or(1);
    if stride == 0 {
        return Err(ConfigError::Invalid {
            key: "Projections.ProjectionStride",
            reason: "must be at least 1".to_string(),
        });
    }

    Ok(ResolvedProjections {
        data_type,
        dims,
        n_projections,
        projection_at_180,
        pixel_size,
        center_pixel_u,
        offset_v,
        reverse_rotation: section.reverse_rotation.unwrap_or(false),
        stride,
    })
}

fn resolve_volume(
    file: &ConfigFile,
    output: &ResolvedOutput,
    projections: &ResolvedProjections,
    software: &ResolvedSoftware,
) -> Result<Option<ResolvedVolume>, ConfigError> {
    if output.volume_file.is_none() {
        return Ok(None);
    }
    let section = &file.volume;
    let (pv, pu) = (
        projections.pixel_size[0] as f64,
        projections.pixel_size[1] as f64,
    );
    let (v, u) = (projections.dims[0], projections.dims[1]);

    // Voxels default to the pixel size, which only makes sense when the
    // pixels are square.
    let voxel_xyz = match section.voxel_size {
        Some(size) => {
            if size.iter().any(|&s| s <= 0.0) {
                return Err(ConfigError::Invalid {
                    key: "Volume.VoxelSize",
                    reason: "voxel size must be positive".to_string(),
                });
            }
            size
        }
        None if (pu - pv).abs() < f64::EPSILON => [pu, pu, pu],
        None => return Err(ConfigError::Missing("Volume.VoxelSize")),
    };
    // (z, y, x) internally.
    let voxel_size = Vec3f::new([voxel_xyz[2] as f32, voxel_xyz[1] as f32, voxel_xyz[0] as f32]);

    let dims = match section.dimensions {
        Some(d) => {
            if d.iter().any(|&n| n == 0) {
                return Err(ConfigError::Invalid {
                    key: "Volume.Dimensions",
                    reason: "dimensions must be positive".to_string(),
                });
            }
            Dims3::new([d[2], d[1], d[0]])
        }
        None => Dims3::new([
            ((v as f64 * pv / voxel_xyz[2] + 0.5) as usize).max(1),
            ((u as f64 * pu / voxel_xyz[1] + 0.5) as usize).max(1),
            ((u as f64 * pu / voxel_xyz[0] + 0.5) as usize).max(1),
        ]),
    };

    let origin = match section.origin {
        Some(o) => Vec3f::new([o[2] as f32, o[1] as f32, o[0] as f32]),
        None => Vec3f::new([
            (-0.5 * (dims[0] - 1) as f64 * voxel_xyz[2]) as f32,
            (-0.5 * (dims[1] - 1) as f64 * voxel_xyz[1]) as f32,
            (-0.5 * (dims[2] - 1) as f64 * voxel_xyz[0]) as f32,
        ]),
    };

    if let Some(limit) = software.maximum_volume_memory {
        let needed = (dims.product() * std::mem::size_of::<f32>()) as u64;
        if needed > limit {
            return Err(ConfigError::Invalid {
                key: "Software.MaximumVolumeMemory",
                reason: format!(
                    "the volume needs {needed} bytes but the limit is {limit}"
                ),
            });
        }
    }

    Ok(Some(ResolvedVolume {
        dims,
        voxel_size,
        origin,
    }))
}

fn resolve_reconstruction(
    file: &ConfigFile,
    input: &ResolvedInput,
) -> Result<ResolvedReconstruction, ConfigError> {
    let section = &file.reconstruction;

    // The correction stages exist only on the raw path; on later entry
    // points their keys are inert.
    let (bad_pixel_correction, beam_power_correction) = if input.kind == InputKind::Raw {
        (
            section
                .bad_pixel_correction
                .unwrap_or(BadPixelCorrectionChoice::Averaging),
            section.beam_power_correction.unwrap_or(BeamPowerChoice::None),
        )
    } else {
        if section.bad_pixel_correction.is_some() || section.beam_power_correction.is_some() {
            warn!(
                target: "config",
                "projection corrections only apply to raw input; ignoring"
            );
        }
        (BadPixelCorrectionChoice::None, BeamPowerChoice::None)
    };

    let beam_power_decay_linear_term = section.beam_power_decay_linear_term;
    match beam_power_correction {
        BeamPowerChoice::Manual => {
            if beam_power_decay_linear_term.is_none() {
                return Err(ConfigError::Conflict(
                    "Reconstruction.BeamPowerCorrection=Manual requires a value for \
                     Reconstruction.BeamPowerDecayLinearTerm"
                        .to_string(),
                ));
            }
        }
        BeamPowerChoice::BeforeAndAfterBrightField => {
            if input.post_scan_bright_field_file.is_none() {
                return Err(ConfigError::Conflict(
                    "Reconstruction.BeamPowerCorrection=BeforeAndAfterBrightField requires \
                     a value for Input.PostScanBrightFieldFile"
                        .to_string(),
                ));
            }
        }
        BeamPowerChoice::NullProjectionEdge => {
            if section.beam_power_decay_constant_term.is_some() {
                return Err(ConfigError::Conflict(
                    "Reconstruction.BeamPowerDecayConstantTerm cannot be specified with \
                     Reconstruction.BeamPowerCorrection=NullProjectionEdge"
                        .to_string(),
                ));
            }
        }
        BeamPowerChoice::ConstantTotalAttenuation | BeamPowerChoice::None => {}
    }

    // Smoothing applies whenever this run filters (raw or attenuation
    // input); the default is a modest Gaussian.
    let smoothing = if input.kind == InputKind::Filtered {
        None
    } else {
        match section.smoothing_filter.unwrap_or(SmoothingChoice::Gaussian) {
            SmoothingChoice::None => None,
            SmoothingChoice::Gaussian => {
                if section.smoothing_filter_frequencies.is_some() {
                    return Err(ConfigError::Conflict(
                        "Reconstruction.SmoothingFilterFrequencies cannot be used with \
                         Gaussian; use Reconstruction.SmoothingFilterRadius instead"
                            .to_string(),
                    ));
                }
                let radius = section.smoothing_filter_radius.unwrap_or(0.5);
                if radius <= 0.0 {
                    return Err(ConfigError::Invalid {
                        key: "Reconstruction.SmoothingFilterRadius",
                        reason: "must be positive".to_string(),
                    });
                }
                Some(SmoothingSpec::Gaussian { radius })
            }
            SmoothingChoice::TaperedCosineWindow => {
                if section.smoothing_filter_radius.is_some() {
                    return Err(ConfigError::Conflict(
                        "Reconstruction.SmoothingFilterRadius cannot be used with \
                         TaperedCosineWindow; use Reconstruction.SmoothingFilterFrequencies \
                         instead"
                            .to_string(),
                    ));
                }
                let [f1, f2] = section
                    .smoothing_filter_frequencies
                    .ok_or(ConfigError::Missing(
                        "Reconstruction.SmoothingFilterFrequencies",
                    ))?;
                if !(0.0..1.0).contains(&f1) || f2 <= f1 {
                    return Err(ConfigError::Invalid {
                        key: "Reconstruction.SmoothingFilterFrequencies",
                        reason: "requires 0 <= f1 < f2 (relative to Nyquist)".to_string(),
                    });
                }
                Some(SmoothingSpec::TaperedCosineWindow { f1, f2 })
            }
        }
    };

    let scaling_factor = section.scaling_factor.unwrap_or(1.0);

    Ok(ResolvedReconstruction {
        bad_pixel_correction,
        flat_field_bad_threshold: section.flat_field_bad_threshold.unwrap_or(10.0),
        dark_field_bad_threshold: section.dark_field_bad_threshold.unwrap_or(f64::INFINITY),
        beam_power_correction,
        beam_power_decay_constant_term: section.beam_power_decay_constant_term.unwrap_or(0.0),
        beam_power_decay_linear_term,
        projection_background_edge_width: section.projection_background_edge_width.unwrap_or(10),
        pixel_interpolation: section
            .pixel_interpolation
            .unwrap_or(InterpolationChoice::BilinearWithFallback),
        smoothing,
        scaling_factor,
    })
}

fn resolve_software(
    file: &ConfigFile,
    output: &ResolvedOutput,
) -> Result<ResolvedSoftware, ConfigError> {
    let section = &file.software;

    let engine = section.engine.unwrap_or(EngineChoice::MultiThreaded);

    let threads = match &section.threads {
        None => None,
        Some(ThreadsChoice::Word(word)) if word == "Automatic" => None,
        Some(ThreadsChoice::Word(word)) => {
            return Err(ConfigError::Invalid {
                key: "Software.Threads",
                reason: format!("'{word}' is neither Automatic nor a number"),
            });
        }
        Some(ThreadsChoice::Count(0)) => {
            return Err(ConfigError::Invalid {
                key: "Software.Threads",
                reason: "must be a number greater than 0".to_string(),
            });
        }
        Some(ThreadsChoice::Count(n)) => Some(*n),
    };

    let maximum_volume_memory = if output.volume_file.is_some() {
        let spec = section
            .maximum_volume_memory
            .as_deref()
            .unwrap_or("Automatic");
        Some(resolve_memory_limit(spec)?)
    } else {
        None
    };

    // Filtering only happens before back-projection; with filtered input
    // the module choice is inert.
    let filtering_module = section
        .filtering_module
        .unwrap_or(FilteringModuleChoice::RustFft);

    Ok(ResolvedSoftware {
        engine,
        threads,
        maximum_volume_memory,
        filtering_module,
    })
}

impl fmt::Display for ResolvedConfig {
    /// The complete resolved configuration, in the file's own syntax. This
    /// is what `--config` prints.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Input]")?;
        let kind_key = match self.input.kind {
            InputKind::Raw => "RawProjectionsFile",
            InputKind::Attenuation => "AttenuationProjectionsFile",
            InputKind::Filtered => "FilteredProjectionsFile",
        };
        writeln!(f, "{kind_key} = {:?}", self.input.projections_file)?;
        if let Some(p) = &self.input.dark_field_file {
            writeln!(f, "DarkFieldFile = {p:?}")?;
        }
        if let Some(p) = &self.input.bright_field_file {
            writeln!(f, "BrightFieldFile = {p:?}")?;
        }
        if let Some(p) = &self.input.post_scan_bright_field_file {
            writeln!(f, "PostScanBrightFieldFile = {p:?}")?;
        }

        writeln!(f, "\n[Output]")?;
        if let Some(p) = &self.output.attenuation_projections_file {
            writeln!(f, "AttenuationProjectionsFile = {p:?}")?;
        }
        if let Some(p) = &self.output.filtered_projections_file {
            writeln!(f, "FilteredProjectionsFile = {p:?}")?;
        }
        if let Some(p) = &self.output.volume_file {
            writeln!(f, "VolumeFile = {p:?}")?;
        }
        if let Some(p) = &self.output.attenuation_corrections_file {
            writeln!(f, "AttenuationCorrectionsFile = {p:?}")?;
        }

        let p = &self.projections;
        writeln!(f, "\n[Projections]")?;
        writeln!(f, "DataType = \"{:?}\"", p.data_type)?;
        writeln!(f, "Dimensions = [{}, {}]", p.dims[1], p.dims[0])?;
        writeln!(f, "NumberOfProjections = {}", p.n_projections)?;
        writeln!(f, "ProjectionAt180 = {}", p.projection_at_180)?;
        writeln!(f, "PixelSize = [{}, {}]", p.pixel_size[1], p.pixel_size[0])?;
        writeln!(f, "CenterPixelU = {}", p.center_pixel_u)?;
        writeln!(f, "OffsetV = {}", p.offset_v)?;
        writeln!(f, "ReverseRotation = {}", p.reverse_rotation)?;
        writeln!(f, "ProjectionStride = {}", p.stride)?;

        if let Some(v) = &self.volume {
            writeln!(f, "\n[Volume]")?;
            writeln!(
                f,
                "Dimensions = [{}, {}, {}]",
                v.dims[2], v.dims[1], v.dims[0]
            )?;
            writeln!(
                f,
                "VoxelSize = [{}, {}, {}]",
                v.voxel_size[2], v.voxel_size[1], v.voxel_size[0]
            )?;
            writeln!(
                f,
                "Origin = [{}, {}, {}]",
                v.origin[2], v.origin[1], v.origin[0]
            )?;
        }

        let r = &self.reconstruction;
        writeln!(f, "\n[Reconstruction]")?;
        writeln!(f, "BadPixelCorrection = \"{:?}\"", r.bad_pixel_correction)?;
        writeln!(f, "FlatFieldBadThreshold = {}", r.flat_field_bad_threshold)?;
        if r.dark_field_bad_threshold.is_finite() {
            writeln!(f, "DarkFieldBadThreshold = {}", r.dark_field_bad_threshold)?;
        }
        writeln!(f, "BeamPowerCorrection = \"{:?}\"", r.beam_power_correction)?;
        writeln!(
            f,
            "BeamPowerDecayConstantTerm = {}",
            r.beam_power_decay_constant_term
        )?;
        if let Some(linear) = r.beam_power_decay_linear_term {
            writeln!(f, "BeamPowerDecayLinearTerm = {linear}")?;
        }
        writeln!(
            f,
            "ProjectionBackgroundEdgeWidth = {}",
            r.projection_background_edge_width
        )?;
        writeln!(f, "PixelInterpolation = \"{:?}\"", r.pixel_interpolation)?;
        match r.smoothing {
            None => writeln!(f, "SmoothingFilter = \"None\"")?,
            Some(SmoothingSpec::Gaussian { radius }) => {
                writeln!(f, "SmoothingFilter = \"Gaussian\"")?;
                writeln!(f, "SmoothingFilterRadius = {radius}")?;
            }
            Some(SmoothingSpec::TaperedCosineWindow { f1, f2 }) => {
                writeln!(f, "SmoothingFilter = \"TaperedCosineWindow\"")?;
                writeln!(f, "SmoothingFilterFrequencies = [{f1}, {f2}]")?;
            }
        }
        writeln!(f, "ScalingFactor = {}", r.scaling_factor)?;

        let s = &self.software;
        writeln!(f, "\n[Software]")?;
        writeln!(f, "Engine = \"{:?}\"", s.engine)?;
        match s.threads {
            None => writeln!(f, "Threads = \"Automatic\"")?,
            Some(n) => writeln!(f, "Threads = {n}")?,
        }
        if let Some(bytes) = s.maximum_volume_memory {
            writeln!(f, "MaximumVolumeMemory = \"{}MB\"", bytes / (1024 * 1024))?;
        }
        let module = match s.filtering_module {
            FilteringModuleChoice::RealSpaceConvolution => "RealSpaceConvolution",
            FilteringModuleChoice::RustFft => "RustFFT",
            FilteringModuleChoice::RealFft => "RealFFT",
        };
        write!(f, "FilteringModule = \"{module}\"")
    }
}
