//! The single-threaded engine: one pass over the projections on the
//! calling thread, direct (synchronous) file I/O.

use core_project::BackProjector;
use tracing::{debug, info};

use crate::error::RunnerError;
use crate::pipeline::{projection_angle, projection_buffer, PipelineParts};

pub fn run(mut parts: PipelineParts) -> Result<(), RunnerError> {
    let mut filterer = parts.filter_spec.as_ref().map(|s| s.build()).transpose()?;

    // A single back-projector owns the whole volume (slab count 1 was
    // arranged by the launcher for this engine).
    let mut backprojector = parts.backprojection.as_ref().map(|spec| {
        let sub = &spec.subvolumes[0];
        BackProjector::new(
            sub.dims,
            spec.voxel_size,
            sub.origin,
            spec.interpolation,
            spec.scaling_factor,
        )
    });

    let mut current = projection_buffer(&parts);
    let mut filtered = projection_buffer(&parts);

    for c in 0..parts.n_processed {
        let acq_index = c * parts.stride;
        parts.reader.read_projection(&mut current)?;

        if let Some(corrections) = &parts.corrections {
            let shift = corrections.process(acq_index, &mut current);
            if let Some(log) = &mut parts.corrections_log {
                log.record(acq_index, shift)
                    .map_err(RunnerError::CorrectionsLog)?;
            }
        }
        if let Some(writer) = &mut parts.attenuation_writer {
            writer.write_slice(current.view())?;
        }

        let projection_for_volume = if let Some(filterer) = &mut filterer {
            filterer.filter_projection(&current, &mut filtered)?;
            if let Some(writer) = &mut parts.filtered_writer {
                writer.write_slice(filtered.view())?;
            }
            &filtered
        } else {
            // Filtered input: the stream is already ramp-filtered.
            &current
        };

        if let Some(backprojector) = &mut backprojector {
            let angle = projection_angle(acq_index, parts.angular_step, parts.reverse_rotation);
            backprojector.apply_projection(projection_for_volume, angle);
        }
        debug!(target: "runner", projection = acq_index, "projection processed");
    }

    parts.reader.close();
    if let Some(mut writer) = parts.attenuation_writer.take() {
        writer.close()?;
    }
    if let Some(mut writer) = parts.filtered_writer.take() {
        writer.close()?;
    }
    if let Some(log) = parts.corrections_log.take() {
        log.finish().map_err(RunnerError::CorrectionsLog)?;
    }
    if let (Some(backprojector), Some(mut writer)) =
        (backprojector.take(), parts.volume_writer.take())
    {
        writer.write_stack(backprojector.volume())?;
        writer.close()?;
    }

    info!(target: "runner", "single-threaded reconstruction complete");
    Ok(())
}
