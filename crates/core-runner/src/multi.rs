//! The multi-threaded engine.
//!
//! Thread layout: the control thread (here), one I/O executor thread, and
//! N worker threads. Each worker owns a projection filterer (with its FFT
//! plans and scratch) and a back-projector over one z-slab of the volume;
//! nothing thread-local is ever touched from outside.
//!
//! Projections move through two double-buffer pairs. The attenuation pair
//! cycles between the executor (reading ahead) and the workers; the
//! filtered pair cycles between the filtering worker and the
//! back-projection fan-out. In steady state, cycle c overlaps:
//!
//! * the executor reading projection c+1 and writing stacks,
//! * one worker filtering projection c,
//! * every worker back-projecting filtered projection c-1.
//!
//! A barrier (one acknowledgement per dispatched command) closes each
//! cycle; the happens-before edge from the workers' acks to the control
//! thread is what makes the buffer swaps safe. Buffers are reclaimed by
//! `Arc::try_unwrap`, which is guaranteed to succeed because workers drop
//! their clones before acknowledging and the executor's clones are waited
//! out through their tokens.
//!
//! Faults: workers answer every command, reporting failures instead of
//! results; the control thread keeps the first error per worker, stops the
//! queues (dropping the senders), joins everyone, and re-raises the
//! earliest error. No retries, no timeouts.

use std::sync::Arc;
use std::thread::JoinHandle;

use core_geom::{Projection, Subvolume, Vec3f};
use core_io::{DoubleBuffer, IoExecutor, SliceWriter, WriterId};
use core_project::{BackProjector, PixelInterpolation};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info};

use crate::error::RunnerError;
use crate::pipeline::{projection_angle, CorrectionStage, FilterSpec, PipelineParts};

enum WorkerCommand {
    Correct {
        projection: Box<Projection>,
        acq_index: usize,
    },
    Filter {
        input: Arc<Projection>,
        output: Box<Projection>,
    },
    BackProject {
        projection: Arc<Projection>,
        angle: f32,
    },
    WriteVolume {
        writer: Box<SliceWriter>,
    },
}

enum WorkerReply {
    Ready,
    Corrected {
        projection: Box<Projection>,
        shift: f64,
    },
    Filtered {
        projection: Box<Projection>,
    },
    BackProjected,
    VolumeWritten {
        writer: Box<SliceWriter>,
    },
    Failed {
        worker: usize,
        message: String,
    },
}

struct WorkerInit {
    id: usize,
    corrections: Option<Arc<CorrectionStage>>,
    filter_spec: Option<FilterSpec>,
    slab: Option<SlabInit>,
}

struct SlabInit {
    subvolume: Subvolume,
    voxel_size: Vec3f,
    interpolation: PixelInterpolation,
    scaling_factor: f32,
}

fn worker_main(init: WorkerInit, rx: Receiver<WorkerCommand>, tx: Sender<WorkerReply>) {
    let id = init.id;

    // Thread-local resources. Plan creation inside the filterer takes the
    // process-wide lock, so concurrent worker start-up is fine.
    let mut filterer = match init.filter_spec.map(|spec| spec.build()).transpose() {
        Ok(filterer) => filterer,
        Err(e) => {
            let _ = tx.send(WorkerReply::Failed {
                worker: id,
                message: e.to_string(),
            });
            // Drain until the control thread tears the queue down.
            for command in rx {
                drop(command);
            }
            return;
        }
    };
    let mut backprojector = init.slab.map(|slab| {
        BackProjector::new(
            slab.subvolume.dims,
            slab.voxel_size,
            slab.subvolume.origin,
            slab.interpolation,
            slab.scaling_factor,
        )
    });
    if tx.send(WorkerReply::Ready).is_err() {
        return;
    }
    debug!(target: "runner", worker = id, "worker ready");

    for command in rx {
        let reply = match command {
            WorkerCommand::Correct {
                mut projection,
                acq_index,
            } => {
                let corrections = init
                    .corrections
                    .as_ref()
                    .expect("correction command without a correction stage");
                let shift = corrections.process(acq_index, &mut projection);
                WorkerReply::Corrected { projection, shift }
            }
            WorkerCommand::Filter { input, output } => {
                let mut output = output;
                let result = filterer
                    .as_mut()
                    .expect("filter command without a filterer")
                    .filter_projection(&input, &mut output);
                // Drop the shared input before acknowledging so the control
                // thread can reclaim the buffer after the barrier.
                drop(input);
                match result {
                    Ok(()) => WorkerReply::Filtered { projection: output },
                    Err(e) => WorkerReply::Failed {
                        worker: id,
                        message: e.to_string(),
                    },
                }
            }
            WorkerCommand::BackProject { projection, angle } => {
                backprojector
                    .as_mut()
                    .expect("back-project command without a volume slab")
                    .apply_projection(&projection, angle);
                drop(projection);
                WorkerReply::BackProjected
            }
            WorkerCommand::WriteVolume { mut writer } => {
                let volume = backprojector
                    .as_ref()
                    .expect("volume write without a volume slab")
                    .volume();
                let mut failed = None;
                for z in 0..volume.dims()[0] {
                    if let Err(e) = writer.write_slice(volume.slice(z)) {
                        failed = Some(e);
                        break;
                    }
                }
                match failed {
                    None => WorkerReply::VolumeWritten { writer },
                    Some(e) => WorkerReply::Failed {
                        worker: id,
                        message: e.to_string(),
                    },
                }
            }
        };
        if tx.send(reply).is_err() {
            break;
        }
    }
}

struct Workers {
    senders: Vec<Sender<WorkerCommand>>,
    replies: Receiver<WorkerReply>,
    handles: Vec<JoinHandle<()>>,
    /// First captured error per worker; later ones from the same worker
    /// are discarded.
    errors: Vec<Option<RunnerError>>,
}

impl Workers {
    fn spawn(
        count: usize,
        corrections: &Option<Arc<CorrectionStage>>,
        filter_spec: &Option<FilterSpec>,
        backprojection: Option<&crate::pipeline::BackProjectionSpec>,
    ) -> Self {
        let (reply_tx, replies) = unbounded();
        let mut senders = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let (tx, rx) = unbounded();
            let init = WorkerInit {
                id,
                corrections: corrections.clone(),
                filter_spec: filter_spec.clone(),
                slab: backprojection.map(|spec| SlabInit {
                    subvolume: spec.subvolumes[id],
                    voxel_size: spec.voxel_size,
                    interpolation: spec.interpolation,
                    scaling_factor: spec.scaling_factor,
                }),
            };
            let reply_tx = reply_tx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("recon-worker-{id}"))
                .spawn(move || worker_main(init, rx, reply_tx))
                .expect("failed to spawn worker thread");
            senders.push(tx);
            handles.push(handle);
        }
        Self {
            senders,
            replies,
            handles,
            errors: (0..count).map(|_| None).collect(),
        }
    }

    fn send(&self, worker: usize, command: WorkerCommand) -> Result<(), RunnerError> {
        self.senders[worker]
            .send(command)
            .map_err(|_| RunnerError::WorkerPanic)
    }

    fn recv(&mut self) -> Result<WorkerReply, RunnerError> {
        self.replies.recv().map_err(|_| RunnerError::WorkerPanic)
    }

    fn record_failure(&mut self, worker: usize, message: String) {
        self.errors[worker].get_or_insert(RunnerError::Worker { worker, message });
    }

    fn first_error(&mut self) -> Option<RunnerError> {
        self.errors.iter_mut().find_map(Option::take)
    }

    /// Waits for every worker to finish constructing its thread-local
    /// resources.
    fn wait_ready(&mut self) -> Result<(), RunnerError> {
        for _ in 0..self.senders.len() {
            match self.recv()? {
                WorkerReply::Ready => {}
                WorkerReply::Failed { worker, message } => self.record_failure(worker, message),
                _ => unreachable!("unexpected reply during start-up"),
            }
        }
        match self.first_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// The per-cycle barrier: one reply per dispatched command. A cycle's
    /// single `Filtered` reply (if any) lands in `filtered_out`.
    fn barrier(
        &mut self,
        expected: usize,
        filtered_out: &mut Option<Box<Projection>>,
    ) -> Result<(), RunnerError> {
        for _ in 0..expected {
            match self.recv()? {
                WorkerReply::Filtered { projection } => *filtered_out = Some(projection),
                WorkerReply::BackProjected => {}
                WorkerReply::Failed { worker, message } => self.record_failure(worker, message),
                _ => unreachable!("unexpected reply at barrier"),
            }
        }
        match self.first_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop-the-world: close every queue and join.
    fn shutdown(self) {
        drop(self.senders);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// Dispatches the scalar-correction command for one projection and waits
/// for it, logging the applied beam-power shift.
fn correct_one<W: std::io::Write>(
    workers: &mut Workers,
    worker: usize,
    acq_index: usize,
    projection: Box<Projection>,
    corrections_log: &mut Option<core_calib::BeamPowerLog<W>>,
) -> Result<Box<Projection>, RunnerError> {
    workers.send(
        worker,
        WorkerCommand::Correct {
            projection,
            acq_index,
        },
    )?;
    match workers.recv()? {
        WorkerReply::Corrected { projection, shift } => {
            if let Some(log) = corrections_log {
                log.record(acq_index, shift)
                    .map_err(RunnerError::CorrectionsLog)?;
            }
            Ok(projection)
        }
        WorkerReply::Failed { worker, message } => {
            workers.record_failure(worker, message);
            Err(workers.first_error().expect("failure just recorded"))
        }
        _ => unreachable!("unexpected reply to correction"),
    }
}

pub fn run(parts: PipelineParts) -> Result<(), RunnerError> {
    let PipelineParts {
        reader,
        corrections,
        mut corrections_log,
        attenuation_writer,
        filtered_writer,
        mut volume_writer,
        filter_spec,
        backprojection,
        proj_dims,
        proj_spacing,
        proj_origin,
        n_processed,
        stride,
        angular_step,
        reverse_rotation,
        threads,
    } = parts;

    let att_write = attenuation_writer.is_some();
    let filt_write = filtered_writer.is_some();
    let executor = IoExecutor::spawn(Some(reader), attenuation_writer, filtered_writer);

    let mut workers = Workers::spawn(
        threads,
        &corrections,
        &filter_spec,
        backprojection.as_ref(),
    );

    let buffer =
        || Box::new(Projection::new(proj_dims, proj_spacing, proj_origin));

    let outcome = (|| -> Result<(), RunnerError> {
        workers.wait_ready()?;

        let w = threads;
        let m = n_processed;
        let do_correct = corrections.is_some();
        let do_filter = filter_spec.is_some();
        let do_backproject = backprojection.is_some();

        // Token scheme: three per cycle (read, attenuation write, filtered
        // write).
        let tok_read = |c: usize| (c as u64) * 3;
        let tok_att = |c: usize| (c as u64) * 3 + 1;
        let tok_filt = |c: usize| (c as u64) * 3 + 2;

        // Prime the attenuation double buffer: both halves go out reading.
        executor.request_read(buffer(), tok_read(0))?;
        if m > 1 {
            executor.request_read(buffer(), tok_read(1))?;
        }

        // The filtered pair: the loading half feeds the next filter
        // command, the active half is the buffer currently fanned out (its
        // slot sits empty while the projection lives behind the Arc in
        // `pending_filtered`). The halves swap once per cycle.
        let mut filt_buffers: DoubleBuffer<Option<Box<Projection>>> =
            DoubleBuffer::new(do_filter.then(|| buffer()), do_filter.then(|| buffer()));
        let mut pending_filtered: Option<(Arc<Projection>, f32)> = None;

        let mut current = Some(
            executor
                .wait_for_buffer_release(tok_read(0))?
                .expect("read returns its buffer"),
        );
        if do_correct {
            let projection = current.take().expect("primed above");
            current = Some(correct_one(
                &mut workers,
                0,
                0,
                projection,
                &mut corrections_log,
            )?);
        }

        for c in 0..m {
            let acq_index = c * stride;
            let angle = projection_angle(acq_index, angular_step, reverse_rotation);

            let att_arc: Arc<Projection> =
                Arc::from(current.take().expect("current projection missing"));
            if att_write {
                executor.request_write(WriterId::Attenuation, Arc::clone(&att_arc), tok_att(c))?;
            }

            let mut expected = 0;
            if do_filter {
                let output = filt_buffers
                    .loading_mut()
                    .take()
                    .expect("no free filtered buffer");
                workers.send(
                    c % w,
                    WorkerCommand::Filter {
                        input: Arc::clone(&att_arc),
                        output,
                    },
                )?;
                expected += 1;
            }

            // Fan out the previous cycle's filtered projection...
            let fan_out = pending_filtered.take();
            if let Some((prev, prev_angle)) = &fan_out {
                for wi in 0..w {
                    workers.send(
                        wi,
                        WorkerCommand::BackProject {
                            projection: Arc::clone(prev),
                            angle: *prev_angle,
                        },
                    )?;
                }
                expected += w;
            }
            // ...or, with pre-filtered input, this projection directly.
            let direct_fan = (!do_filter && do_backproject).then(|| Arc::clone(&att_arc));
            if let Some(arc) = &direct_fan {
                for wi in 0..w {
                    workers.send(
                        wi,
                        WorkerCommand::BackProject {
                            projection: Arc::clone(arc),
                            angle,
                        },
                    )?;
                }
                expected += w;
            }

            let mut filtered_out = None;
            workers.barrier(expected, &mut filtered_out)?;

            // Return the fanned-out filtered buffer to its (empty) slot;
            // its disk write was issued last cycle and must be released
            // first.
            if let Some((prev, _)) = fan_out {
                if filt_write {
                    executor.wait_for_buffer_release(tok_filt(c - 1))?;
                }
                let prev = Arc::try_unwrap(prev).expect("filtered buffer still shared");
                *filt_buffers.active_mut() = Some(Box::new(prev));
            }

            // Queue this cycle's filtered projection for the next cycle.
            if let Some(filtered) = filtered_out {
                let arc: Arc<Projection> = Arc::from(filtered);
                if filt_write {
                    executor.request_write(WriterId::Filtered, Arc::clone(&arc), tok_filt(c))?;
                }
                if do_backproject {
                    pending_filtered = Some((arc, angle));
                } else {
                    // No back-projection next cycle: wait the write out and
                    // put the buffer straight back.
                    if filt_write {
                        executor.wait_for_buffer_release(tok_filt(c))?;
                    }
                    *filt_buffers.loading_mut() = Some(Box::new(
                        Arc::try_unwrap(arc).expect("filtered buffer still shared"),
                    ));
                }
            }
            if do_filter {
                filt_buffers.swap();
            }

            // Reclaim the attenuation buffer and send it out to read ahead.
            if att_write {
                executor.wait_for_buffer_release(tok_att(c))?;
            }
            drop(direct_fan);
            let freed = Arc::try_unwrap(att_arc).expect("attenuation buffer still shared");
            if c + 2 < m {
                executor.request_read(Box::new(freed), tok_read(c + 2))?;
            }

            // Take delivery of the next projection and run its scalar
            // corrections while the queues are quiet.
            if c + 1 < m {
                let next = executor
                    .wait_for_buffer_release(tok_read(c + 1))?
                    .expect("read returns its buffer");
                current = Some(if do_correct {
                    correct_one(
                        &mut workers,
                        (c + 1) % w,
                        (c + 1) * stride,
                        next,
                        &mut corrections_log,
                    )?
                } else {
                    next
                });
            }
            debug!(target: "runner", projection = acq_index, "cycle complete");
        }

        // The last filtered projection has not been back-projected yet.
        if let Some((last, last_angle)) = pending_filtered.take() {
            for wi in 0..w {
                workers.send(
                    wi,
                    WorkerCommand::BackProject {
                        projection: Arc::clone(&last),
                        angle: last_angle,
                    },
                )?;
            }
            let mut none = None;
            workers.barrier(w, &mut none)?;
            if filt_write {
                executor.wait_for_buffer_release(tok_filt(m - 1))?;
            }
            drop(last);
        }

        // Volume write-out: the writer travels through the workers in slab
        // order, so slices land strictly in z order.
        if let Some(writer) = volume_writer.take() {
            let mut writer = Box::new(writer);
            for wi in 0..w {
                workers.send(wi, WorkerCommand::WriteVolume { writer })?;
                writer = loop {
                    match workers.recv()? {
                        WorkerReply::VolumeWritten { writer } => break writer,
                        WorkerReply::Failed { worker, message } => {
                            workers.record_failure(worker, message);
                            return Err(workers.first_error().expect("just recorded"));
                        }
                        _ => unreachable!("unexpected reply during volume write"),
                    }
                };
            }
            writer.close()?;
        }

        if let Some(log) = corrections_log.take() {
            log.finish().map_err(RunnerError::CorrectionsLog)?;
        }
        Ok(())
    })();

    // Orderly teardown in both directions: stop the queues, join the
    // workers, then shut the executor down (finish() on success so the
    // output metadata is written; abrupt drop on failure).
    workers.shutdown();
    match outcome {
        Ok(()) => {
            executor.finish()?;
            info!(target: "runner", "multi-threaded reconstruction complete");
            Ok(())
        }
        Err(e) => {
            drop(executor);
            Err(e)
        }
    }
}
