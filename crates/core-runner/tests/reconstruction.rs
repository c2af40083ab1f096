//! End-to-end pipeline tests against real files in temporary directories.

use std::path::Path;

use core_config::{ConfigFile, ResolvedConfig};
use core_geom::{Projection, Vec2f};
use core_io::{MetaHeader, ProjectionReader};

/// Writes a little-endian f32 MetaImage stack. `sample(frame, v, u)`
/// supplies the data; `spacing`/`offset` are (u, v) as in the file format.
fn write_f32_stack(
    dir: &Path,
    name: &str,
    dims_uv: [usize; 2],
    frames: usize,
    spacing_uv: [f64; 2],
    offset_uv: [f64; 2],
    sample: impl Fn(usize, usize, usize) -> f32,
) {
    std::fs::write(
        dir.join(format!("{name}.mhd")),
        format!(
            "ObjectType = Image\nNDims = 3\nDimSize = {} {} {}\n\
             ElementType = MET_FLOAT\nElementSpacing = {} {} 1\n\
             Offset = {} {} 0\nBinaryDataByteOrderMSB = False\n\
             ElementDataFile = {name}.raw\n",
            dims_uv[0], dims_uv[1], frames, spacing_uv[0], spacing_uv[1], offset_uv[0], offset_uv[1]
        ),
    )
    .unwrap();
    let mut bytes = Vec::with_capacity(dims_uv[0] * dims_uv[1] * frames * 4);
    for frame in 0..frames {
        for v in 0..dims_uv[1] {
            for u in 0..dims_uv[0] {
                bytes.extend_from_slice(&sample(frame, v, u).to_le_bytes());
            }
        }
    }
    std::fs::write(dir.join(format!("{name}.raw")), bytes).unwrap();
}

/// Writes a u16 MetaImage stack (raw detector data).
fn write_u16_stack(
    dir: &Path,
    name: &str,
    dims_uv: [usize; 2],
    frames: usize,
    sample: impl Fn(usize, usize, usize) -> u16,
) {
    let ndims = if frames > 1 { 3 } else { 2 };
    let dim_line = if frames > 1 {
        format!("{} {} {}", dims_uv[0], dims_uv[1], frames)
    } else {
        format!("{} {}", dims_uv[0], dims_uv[1])
    };
    std::fs::write(
        dir.join(format!("{name}.mhd")),
        format!(
            "ObjectType = Image\nNDims = {ndims}\nDimSize = {dim_line}\n\
             ElementType = MET_USHORT\nElementSpacing = 1 1 1\n\
             ElementDataFile = {name}.raw\n"
        ),
    )
    .unwrap();
    let mut bytes = Vec::new();
    for frame in 0..frames {
        for v in 0..dims_uv[1] {
            for u in 0..dims_uv[0] {
                bytes.extend_from_slice(&sample(frame, v, u).to_le_bytes());
            }
        }
    }
    std::fs::write(dir.join(format!("{name}.raw")), bytes).unwrap();
}

fn run_config(dir: &Path, text: &str) -> Result<ResolvedConfig, core_runner::RunnerError> {
    let file = ConfigFile::parse(text).expect("config parses");
    let config = ResolvedConfig::resolve(file, dir).expect("config resolves");
    core_runner::launch(&config)?;
    Ok(config)
}

fn read_volume(path: &Path) -> (Vec<usize>, Vec<f32>) {
    let header = MetaHeader::read(path).unwrap();
    let mut reader = ProjectionReader::open(path).unwrap();
    reader.initialize().unwrap();
    let dims = reader.dims();
    let mut out = Vec::new();
    let mut slice = Projection::new(dims, Vec2f::ones(), Vec2f::zeros());
    for _ in 0..reader.n_projections() {
        reader.read_projection(&mut slice).unwrap();
        out.extend_from_slice(slice.data());
    }
    (header.dim_size.clone(), out)
}

#[test]
fn flat_field_raw_input_yields_zero_attenuation() {
    let dir = tempfile::tempdir().unwrap();
    write_u16_stack(dir.path(), "scan", [8, 4], 6, |_, _, _| 1000);
    write_u16_stack(dir.path(), "dark", [8, 4], 1, |_, _, _| 0);
    write_u16_stack(dir.path(), "bright", [8, 4], 1, |_, _, _| 1000);

    run_config(
        dir.path(),
        r#"
        [Input]
        RawProjectionsFile = "scan.mhd"
        DarkFieldFile = "dark.mhd"
        BrightFieldFile = "bright.mhd"
        [Output]
        AttenuationProjectionsFile = "att.mhd"
        [Software]
        Engine = "SingleThreaded"
        "#,
    )
    .unwrap();

    let (dims, data) = read_volume(&dir.path().join("att.mhd"));
    assert_eq!(dims, vec![8, 4, 6]);
    for value in data {
        assert!(value.abs() < 1e-5, "attenuation {value} should be ~0");
        assert!(value.is_finite());
    }
}

#[test]
fn beam_power_log_is_written_per_projection() {
    let dir = tempfile::tempdir().unwrap();
    // Edge columns stay bright (no object), centre is attenuated.
    write_u16_stack(dir.path(), "scan", [8, 4], 5, |_, _, u| {
        if (2..6).contains(&u) {
            500
        } else {
            990
        }
    });
    write_u16_stack(dir.path(), "dark", [8, 4], 1, |_, _, _| 0);
    write_u16_stack(dir.path(), "bright", [8, 4], 1, |_, _, _| 1000);

    run_config(
        dir.path(),
        r#"
        [Input]
        RawProjectionsFile = "scan.mhd"
        DarkFieldFile = "dark.mhd"
        BrightFieldFile = "bright.mhd"
        [Output]
        AttenuationProjectionsFile = "att.mhd"
        AttenuationCorrectionsFile = "corrections.tsv"
        [Reconstruction]
        BeamPowerCorrection = "NullProjectionEdge"
        ProjectionBackgroundEdgeWidth = 2
        [Software]
        Engine = "SingleThreaded"
        "#,
    )
    .unwrap();

    let log = std::fs::read_to_string(dir.path().join("corrections.tsv")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 5);
    for (i, line) in lines.iter().enumerate() {
        let (index, shift) = line.split_once('\t').expect("tab separated");
        assert_eq!(index.parse::<usize>().unwrap(), i);
        let shift: f64 = shift.parse().unwrap();
        // Edge attenuation is -ln(0.99) per pixel.
        assert!((shift - 0.01005).abs() < 1e-3, "shift {shift}");
    }

    // After nulling, edge pixels of the attenuation output are ~0.
    let (_, data) = read_volume(&dir.path().join("att.mhd"));
    assert!(data[0].abs() < 1e-3);
}

/// Analytic parallel projections of a uniform cylinder: the line integral
/// at detector coordinate u is 2·mu·sqrt(r² - u²), at every angle.
fn cylinder_sinogram(dir: &Path, n_angles: usize, dims_uv: [usize; 2], pixel: f64, r: f64, mu: f64) {
    let offset_u = -0.5 * (dims_uv[0] - 1) as f64 * pixel;
    let offset_v = -0.5 * (dims_uv[1] - 1) as f64 * pixel;
    write_f32_stack(
        dir,
        "sino",
        dims_uv,
        n_angles,
        [pixel, pixel],
        [offset_u, offset_v],
        |_, _, u| {
            let u_w = offset_u + u as f64 * pixel;
            if u_w.abs() < r {
                (2.0 * mu * (r * r - u_w * u_w).sqrt()) as f32
            } else {
                0.0
            }
        },
    );
}

#[test]
fn uniform_cylinder_reconstructs_to_its_attenuation() {
    let dir = tempfile::tempdir().unwrap();
    let (n_angles, nu, nv) = (120, 64, 4);
    let pixel = 0.1;
    let (r, mu) = (2.0, 1.0);
    cylinder_sinogram(dir.path(), n_angles, [nu, nv], pixel, r, mu);

    run_config(
        dir.path(),
        r#"
        [Input]
        AttenuationProjectionsFile = "sino.mhd"
        [Output]
        VolumeFile = "vol.mhd"
        [Projections]
        ProjectionAt180 = false
        [Reconstruction]
        PixelInterpolation = "Bilinear"
        SmoothingFilter = "None"
        [Software]
        Engine = "SingleThreaded"
        "#,
    )
    .unwrap();

    let (dims, data) = read_volume(&dir.path().join("vol.mhd"));
    assert_eq!(dims, vec![nu, nu, nv]);

    // Sample the central slice well inside the cylinder; FBP at this
    // angular sampling should sit close to mu with small ripple.
    let z = nv / 2;
    let origin = -0.5 * (nu - 1) as f64 * pixel;
    let mut err_sq = 0.0f64;
    let mut count = 0usize;
    let mut sum = 0.0f64;
    for y in 0..nu {
        for x in 0..nu {
            let y_w = origin + y as f64 * pixel;
            let x_w = origin + x as f64 * pixel;
            if (y_w * y_w + x_w * x_w).sqrt() < r - 4.0 * pixel {
                let value = data[(z * nu + y) * nu + x] as f64;
                assert!(value.is_finite());
                err_sq += (value - mu) * (value - mu);
                sum += value;
                count += 1;
            }
        }
    }
    assert!(count > 500, "interior sample count {count}");
    let rms = (err_sq / count as f64).sqrt();
    let mean = sum / count as f64;
    assert!(rms < 0.12 * mu, "interior RMS error {rms}");
    assert!((mean - mu).abs() < 0.05 * mu, "interior mean {mean}");

    // Well outside the cylinder the reconstruction returns to ~0.
    let corner = data[(z * nu) * nu] as f64;
    assert!(corner.abs() < 0.15 * mu, "corner value {corner}");
}

#[test]
fn multi_threaded_engine_matches_single_threaded() {
    let dir_single = tempfile::tempdir().unwrap();
    let dir_multi = tempfile::tempdir().unwrap();
    let (n_angles, nu, nv) = (40, 32, 6);
    let pixel = 0.2;
    for dir in [dir_single.path(), dir_multi.path()] {
        cylinder_sinogram(dir, n_angles, [nu, nv], pixel, 1.5, 0.8);
    }

    let base = r#"
        [Input]
        AttenuationProjectionsFile = "sino.mhd"
        [Output]
        VolumeFile = "vol.mhd"
        FilteredProjectionsFile = "filt.mhd"
        [Projections]
        ProjectionAt180 = false
    "#;

    run_config(
        dir_single.path(),
        &format!("{base}\n[Software]\nEngine = \"SingleThreaded\"\n"),
    )
    .unwrap();
    run_config(
        dir_multi.path(),
        &format!("{base}\n[Software]\nEngine = \"MultiThreaded\"\nThreads = 3\n"),
    )
    .unwrap();

    let (dims_s, vol_s) = read_volume(&dir_single.path().join("vol.mhd"));
    let (dims_m, vol_m) = read_volume(&dir_multi.path().join("vol.mhd"));
    assert_eq!(dims_s, dims_m);
    // Slab origins are accumulated differently from the whole-volume
    // origin, so the voxel coordinates can differ by an ulp; everything
    // else is the same sequence of float operations.
    for (a, b) in vol_s.iter().zip(&vol_m) {
        assert!((a - b).abs() <= 1e-4 * a.abs().max(1.0), "{a} vs {b}");
    }

    let (fd_s, filt_s) = read_volume(&dir_single.path().join("filt.mhd"));
    let (fd_m, filt_m) = read_volume(&dir_multi.path().join("filt.mhd"));
    assert_eq!(fd_s, fd_m);
    assert_eq!(fd_s, vec![nu, nv, n_angles]);
    for (a, b) in filt_s.iter().zip(&filt_m) {
        assert!((a - b).abs() <= 1e-5 * a.abs().max(1.0));
    }
}

#[test]
fn filtered_input_goes_straight_to_back_projection() {
    let dir = tempfile::tempdir().unwrap();
    // A tiny pre-filtered stack; values are arbitrary but finite.
    write_f32_stack(
        dir.path(),
        "filtered",
        [16, 3],
        10,
        [0.5, 0.5],
        [-3.75, -0.5],
        |frame, _, u| ((frame + u) % 5) as f32 * 0.1 - 0.2,
    );

    run_config(
        dir.path(),
        r#"
        [Input]
        FilteredProjectionsFile = "filtered.mhd"
        [Output]
        VolumeFile = "vol.mhd"
        [Software]
        Engine = "MultiThreaded"
        Threads = 2
        "#,
    )
    .unwrap();

    let (dims, data) = read_volume(&dir.path().join("vol.mhd"));
    assert_eq!(dims, vec![16, 16, 3]);
    assert!(data.iter().all(|v| v.is_finite()));
}

#[test]
fn stride_processes_every_other_projection() {
    let dir = tempfile::tempdir().unwrap();
    cylinder_sinogram(dir.path(), 40, [32, 2], 0.2, 1.5, 0.8);

    run_config(
        dir.path(),
        r#"
        [Input]
        AttenuationProjectionsFile = "sino.mhd"
        [Output]
        FilteredProjectionsFile = "filt.mhd"
        [Projections]
        ProjectionAt180 = false
        ProjectionStride = 2
        [Software]
        Engine = "SingleThreaded"
        "#,
    )
    .unwrap();

    let (dims, data) = read_volume(&dir.path().join("filt.mhd"));
    assert_eq!(dims, vec![32, 2, 20]);
    assert!(data.iter().all(|v| v.is_finite()));
}
