/// Frame scheduler: dependency counters and recording workers.
///
/// Every section starts the frame with a counter of
/// `external_dependencies + predecessors`. The caller releases external
/// dependencies, finished sections release their successors, and a section
/// whose counter reaches zero is queued for the next free worker.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;
use crossbeam_channel::{Receiver, Sender};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::graphics_device::DescriptorRange;
use crate::{engine_debug, engine_trace};
use super::compiled_graph::CompiledGraph;
use super::compiled_pass::FrameView;
use super::pass::SectionId;

const SOURCE: &str = "galaxy3d::FrameScheduler";

const NO_RANGES: [Option<DescriptorRange>; 3] = [None; 3];

/// Where a section is in the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SectionState {
    /// Frame done on the CPU side (or not started)
    Idle = 0,
    /// Counter not at zero yet, or queued for a worker
    WaitingOnDependencies = 1,
    /// A worker is recording its passes
    Recording = 2,
    /// Command list executed and fence signal queued
    Submitted = 3,
}

impl SectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SectionState::WaitingOnDependencies,
            2 => SectionState::Recording,
            3 => SectionState::Submitted,
            _ => SectionState::Idle,
        }
    }
}

enum Message {
    Run(usize),
    Stop,
}

/// Scheduler of one frame, returned by `CompiledGraph::begin_frame()`
///
/// `release()` may be called from any thread before `run()`.
pub struct FrameScheduler<'a> {
    graph: &'a CompiledGraph,
    slot: usize,
    frame_index: u64,
    /// Fence value of this frame's submissions
    serial: u64,
    /// Per section, value signaled by the previous frame (cross-frame waits)
    carry_values: Vec<u64>,
    remaining: Vec<AtomicU32>,
    external_remaining: Vec<AtomicU32>,
    states: Vec<AtomicU8>,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    completed: AtomicUsize,
    error: Mutex<Option<Error>>,
    started: AtomicBool,
}

impl<'a> FrameScheduler<'a> {
    pub(crate) fn new(
        graph: &'a CompiledGraph,
        slot: usize,
        frame_index: u64,
        serial: u64,
        carry_values: Vec<u64>,
    ) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let scheduler = Self {
            graph,
            slot,
            frame_index,
            serial,
            carry_values,
            remaining: graph
                .sections
                .iter()
                .map(|section| AtomicU32::new(section.plan.external_dependencies + section.plan.predecessors.len() as u32))
                .collect(),
            external_remaining: graph
                .sections
                .iter()
                .map(|section| AtomicU32::new(section.plan.external_dependencies))
                .collect(),
            states: graph
                .sections
                .iter()
                .map(|_| AtomicU8::new(SectionState::WaitingOnDependencies as u8))
                .collect(),
            sender,
            receiver,
            completed: AtomicUsize::new(0),
            error: Mutex::new(None),
            started: AtomicBool::new(false),
        };

        for (index, remaining) in scheduler.remaining.iter().enumerate() {
            if remaining.load(Ordering::Acquire) == 0 {
                scheduler.queue(index);
            }
        }
        scheduler
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Current state of `section`
    pub fn section_state(&self, section: SectionId) -> Option<SectionState> {
        self.states
            .get(section.index())
            .map(|state| SectionState::from_u8(state.load(Ordering::Acquire)))
    }

    /// Report one external dependency of `section` as complete
    ///
    /// # Errors
    ///
    /// `SchedulingError` for an unknown section or when the section has no
    /// external dependency left to release.
    pub fn release(&self, section: SectionId) -> Result<()> {
        let index = section.index();
        let Some(external) = self.external_remaining.get(index) else {
            return Err(self.fail(Error::SchedulingError(format!("unknown section #{}", index))));
        };

        if external.fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1)).is_err() {
            return Err(self.fail(Error::SchedulingError(format!(
                "section '{}' released more than its {} external dependencies",
                self.graph.sections[index].plan.name,
                self.graph.sections[index].plan.external_dependencies
            ))));
        }

        engine_trace!(SOURCE, "Section '{}' released", self.graph.sections[index].plan.name);
        self.decrement(index);
        Ok(())
    }

    /// Record and submit every section, in dependency order
    ///
    /// Returns once every command list of the frame is submitted (not
    /// completed on the GPU).
    ///
    /// # Errors
    ///
    /// - `SchedulingError` when called twice or while external dependencies
    ///   are unreleased
    /// - the first error of a pass action or of the device; sections not
    ///   recorded yet are skipped
    pub fn run(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(self.fail(Error::SchedulingError("run() called twice for one frame".to_string())));
        }

        // Every section is idle once run() returns, submitted or not
        let result = self.run_sections();
        for state in &self.states {
            state.store(SectionState::Idle as u8, Ordering::Release);
        }
        result?;

        engine_debug!(SOURCE, "Graph '{}' frame {}: {} sections submitted with value {}",
            self.graph.name(), self.frame_index, self.graph.sections.len(), self.serial);
        Ok(())
    }

    fn run_sections(&self) -> Result<()> {
        for (index, external) in self.external_remaining.iter().enumerate() {
            let count = external.load(Ordering::Acquire);
            if count > 0 {
                return Err(self.fail(Error::SchedulingError(format!(
                    "section '{}' has {} unreleased external dependencies",
                    self.graph.sections[index].plan.name, count
                ))));
            }
        }

        let section_count = self.graph.sections.len();
        let worker_count = (self.graph.config().thread_count as usize).min(section_count).max(1);
        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                scope.spawn(|| self.worker(worker_count));
            }
        });

        let error = match self.error.lock() {
            Ok(mut error) => error.take(),
            Err(_) => Some(Error::SchedulingError("worker panicked while reporting an error".to_string())),
        };
        match error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn worker(&self, worker_count: usize) {
        while let Ok(Message::Run(section)) = self.receiver.recv() {
            // Sections queued before a failure are skipped
            if self.failed() {
                continue;
            }
            match self.record_section(section) {
                Ok(()) => {
                    for successor in &self.graph.sections[section].plan.successors {
                        self.decrement(successor.index());
                    }
                    if self.completed.fetch_add(1, Ordering::AcqRel) + 1 == self.graph.sections.len() {
                        self.stop(worker_count);
                    }
                }
                Err(error) => {
                    let error = Engine::log_and_return_error(SOURCE, error);
                    if let Ok(mut first) = self.error.lock() {
                        first.get_or_insert(error);
                    }
                    self.stop(worker_count);
                }
            }
        }
    }

    /// Record, close and submit `index`'s command list for this frame
    fn record_section(&self, index: usize) -> Result<()> {
        let section = &self.graph.sections[index];
        let frame = &self.graph.frames[self.slot];
        self.states[index].store(SectionState::Recording as u8, Ordering::Release);
        engine_trace!(SOURCE, "Recording section '{}' ({} passes)", section.plan.name, section.plan.passes.len());

        let mut list = frame.command_lists[index]
            .lock()
            .map_err(|_| Error::SchedulingError(format!("command list of '{}' poisoned", section.plan.name)))?;
        list.reset()?;

        let view = FrameView {
            frame_index: self.frame_index,
            resources: &frame.resources,
            ranges: frame.descriptor_ranges.get(section.plan.thread).unwrap_or(&NO_RANGES),
            names: &self.graph.resource_names,
        };
        for pass in &section.plan.passes {
            self.graph.passes[pass.index()].execute(&mut **list, &view)?;
        }
        list.close()?;

        for wait in &section.waits {
            section.queue.wait(wait.fence.as_ref(), wait.value.resolve(self.frame_index))?;
        }
        for predecessor in &section.plan.cross_queue_waits {
            section.queue.wait(self.graph.sections[predecessor.index()].fence.as_ref(), self.serial)?;
        }
        for carried in &section.plan.carry_waits {
            let value = self.carry_values[carried.index()];
            if value > 0 {
                section.queue.wait(self.graph.sections[carried.index()].fence.as_ref(), value)?;
            }
        }

        section.queue.execute_command_lists(&[&**list])?;
        section.queue.signal(section.fence.as_ref(), self.serial)?;
        section.last_signaled.store(self.serial, Ordering::Release);
        frame.submitted[index].store(self.serial, Ordering::Release);
        self.states[index].store(SectionState::Submitted as u8, Ordering::Release);
        Ok(())
    }

    fn decrement(&self, index: usize) {
        if self.remaining[index].fetch_sub(1, Ordering::AcqRel) == 1 {
            self.queue(index);
        }
    }

    fn queue(&self, index: usize) {
        // The receiver lives as long as `self`
        let _ = self.sender.send(Message::Run(index));
    }

    fn stop(&self, worker_count: usize) {
        for _ in 0..worker_count {
            let _ = self.sender.send(Message::Stop);
        }
    }

    fn failed(&self) -> bool {
        self.error.lock().map(|error| error.is_some()).unwrap_or(true)
    }

    fn fail(&self, error: Error) -> Error {
        Engine::log_and_return_error(SOURCE, error)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
