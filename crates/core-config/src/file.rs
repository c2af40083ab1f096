//! The on-disk configuration model.
//!
//! Field names mirror the file keys exactly (PascalCase); every field is
//! optional here so that resolution can distinguish "absent" from
//! "explicitly set" when merging with values inferred from the input
//! dataset's header. `deny_unknown_fields` makes serde report unknown keys
//! by name.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(rename = "Input", default)]
    pub input: InputSection,
    #[serde(rename = "Output", default)]
    pub output: OutputSection,
    #[serde(rename = "Projections", default)]
    pub projections: ProjectionsSection,
    #[serde(rename = "Volume", default)]
    pub volume: VolumeSection,
    #[serde(rename = "Reconstruction", default)]
    pub reconstruction: ReconstructionSection,
    #[serde(rename = "Software", default)]
    pub software: SoftwareSection,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self, crate::ConfigError> {
        toml::from_str(text).map_err(|e| crate::ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "PascalCase")]
pub struct InputSection {
    pub raw_projections_file: Option<PathBuf>,
    pub attenuation_projections_file: Option<PathBuf>,
    pub filtered_projections_file: Option<PathBuf>,
    pub dark_field_file: Option<PathBuf>,
    pub bright_field_file: Option<PathBuf>,
    pub post_scan_bright_field_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "PascalCase")]
pub struct OutputSection {
    pub attenuation_projections_file: Option<PathBuf>,
    pub filtered_projections_file: Option<PathBuf>,
    pub volume_file: Option<PathBuf>,
    pub attenuation_corrections_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "PascalCase")]
pub struct ProjectionsSection {
    pub data_type: Option<DataType>,
    /// (u, v), fastest axis first, as in the data files.
    pub dimensions: Option<[usize; 2]>,
    pub number_of_projections: Option<usize>,
    #[serde(rename = "ProjectionAt180")]
    pub projection_at_180: Option<bool>,
    /// (u, v).
    pub pixel_size: Option<[f64; 2]>,
    #[serde(rename = "CenterPixelU")]
    pub center_pixel_u: Option<f64>,
    #[serde(rename = "OffsetV")]
    pub offset_v: Option<f64>,
    pub reverse_rotation: Option<bool>,
    pub projection_stride: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "PascalCase")]
pub struct VolumeSection {
    /// (x, y, z), fastest axis first.
    pub dimensions: Option<[usize; 3]>,
    /// (x, y, z).
    pub voxel_size: Option<[f64; 3]>,
    /// (x, y, z).
    pub origin: Option<[f64; 3]>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "PascalCase")]
pub struct ReconstructionSection {
    pub bad_pixel_correction: Option<BadPixelCorrectionChoice>,
    pub flat_field_bad_threshold: Option<f64>,
    pub dark_field_bad_threshold: Option<f64>,
    pub beam_power_correction: Option<BeamPowerChoice>,
    pub beam_power_decay_constant_term: Option<f64>,
    pub beam_power_decay_linear_term: Option<f64>,
    pub projection_background_edge_width: Option<usize>,
    pub pixel_interpolation: Option<InterpolationChoice>,
    pub smoothing_filter: Option<SmoothingChoice>,
    pub smoothing_filter_radius: Option<f64>,
    pub smoothing_filter_frequencies: Option<[f64; 2]>,
    pub scaling_factor: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "PascalCase")]
pub struct SoftwareSection {
    pub engine: Option<EngineChoice>,
    pub threads: Option<ThreadsChoice>,
    pub maximum_volume_memory: Option<String>,
    pub filtering_module: Option<FilteringModuleChoice>,
}

/// Raw pixel storage types accepted for input projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DataType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl DataType {
    pub fn to_element_type(self) -> core_io::ElementType {
        use core_io::ElementType as E;
        match self {
            Self::Int8 => E::Int8,
            Self::UInt8 => E::UInt8,
            Self::Int16 => E::Int16,
            Self::UInt16 => E::UInt16,
            Self::Int32 => E::Int32,
            Self::UInt32 => E::UInt32,
            Self::Float32 => E::Float32,
            Self::Float64 => E::Float64,
        }
    }

    pub fn from_element_type(element: core_io::ElementType) -> Self {
        use core_io::ElementType as E;
        match element {
            E::Int8 => Self::Int8,
            E::UInt8 => Self::UInt8,
            E::Int16 => Self::Int16,
            E::UInt16 => Self::UInt16,
            E::Int32 => Self::Int32,
            E::UInt32 => Self::UInt32,
            E::Float32 => Self::Float32,
            E::Float64 => Self::Float64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum BadPixelCorrectionChoice {
    Averaging,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum BeamPowerChoice {
    None,
    Manual,
    BeforeAndAfterBrightField,
    ConstantTotalAttenuation,
    NullProjectionEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum InterpolationChoice {
    NearestNeighbor,
    Bilinear,
    BilinearWithFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum SmoothingChoice {
    None,
    Gaussian,
    TaperedCosineWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum EngineChoice {
    SingleThreaded,
    MultiThreaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FilteringModuleChoice {
    RealSpaceConvolution,
    #[serde(rename = "RustFFT")]
    RustFft,
    #[serde(rename = "RealFFT")]
    RealFft,
}

/// `Threads` takes either a positive integer or the word `Automatic`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ThreadsChoice {
    Count(usize),
    Word(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_configuration() {
        let cfg = ConfigFile::parse(
            r#"
            [Input]
            RawProjectionsFile = "scan.mhd"
            DarkFieldFile = "dark.mhd"
            BrightFieldFile = "bright.mhd"

            [Output]
            VolumeFile = "vol.mhd"

            [Projections]
            DataType = "UInt16"
            Dimensions = [512, 256]
            NumberOfProjections = 720
            ProjectionAt180 = true
            PixelSize = [0.05, 0.05]
            CenterPixelU = 255.5
            ReverseRotation = false
            ProjectionStride = 2

            [Reconstruction]
            BadPixelCorrection = "Averaging"
            BeamPowerCorrection = "NullProjectionEdge"
            ProjectionBackgroundEdgeWidth = 12
            PixelInterpolation = "Bilinear"
            SmoothingFilter = "TaperedCosineWindow"
            SmoothingFilterFrequencies = [0.5, 0.75]

            [Software]
            Engine = "MultiThreaded"
            Threads = 4
            MaximumVolumeMemory = "2GB"
            FilteringModule = "RustFFT"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.projections.data_type, Some(DataType::UInt16));
        assert_eq!(cfg.projections.dimensions, Some([512, 256]));
        assert_eq!(cfg.projections.projection_stride, Some(2));
        assert_eq!(
            cfg.reconstruction.beam_power_correction,
            Some(BeamPowerChoice::NullProjectionEdge)
        );
        assert_eq!(cfg.software.threads, Some(ThreadsChoice::Count(4)));
        assert_eq!(
            cfg.software.filtering_module,
            Some(FilteringModuleChoice::RustFft)
        );
    }

    #[test]
    fn unknown_keys_are_rejected_by_name() {
        let err = ConfigFile::parse("[Projections]\nPixelPitch = [1.0, 1.0]\n").unwrap_err();
        assert!(err.to_string().contains("PixelPitch"), "{err}");
    }

    #[test]
    fn unknown_sections_are_rejected_by_name() {
        let err = ConfigFile::parse("[Projektions]\n").unwrap_err();
        assert!(err.to_string().contains("Projektions"), "{err}");
    }

    #[test]
    fn threads_accepts_automatic_and_counts() {
        let cfg = ConfigFile::parse("[Software]\nThreads = \"Automatic\"\n").unwrap();
        assert_eq!(
            cfg.software.threads,
            Some(ThreadsChoice::Word("Automatic".into()))
        );
        let cfg = ConfigFile::parse("[Software]\nThreads = 8\n").unwrap();
        assert_eq!(cfg.software.threads, Some(ThreadsChoice::Count(8)));
    }
}
