//! Pipeline driver.
//!
//! Pulls frames from a [`FrameSource`], runs detection restricted to the target
//! class, evaluates pairwise distances, annotates, and forwards the frame to the
//! display sink and then the recording sink.
//!
//! The driver is an explicit state machine:
//!
//! ```text
//! Idle --start--> Running --step--> Running
//!                    |
//!                    +--> Stopped(EndOfStream | OperatorStop | Fault)
//! ```
//!
//! Stopped states are terminal until [`Driver::reset`] returns the driver to
//! `Idle` with a new source. Every transition into `Stopped` finishes the sinks.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use crate::annotate::Annotator;
use crate::detect::{centroids, Detection, DetectorBackend};
use crate::evaluate::{evaluate, ViolationSet};
use crate::frame::{resize_to_width, DEFAULT_WORKING_WIDTH};
use crate::ingest::FrameSource;
use crate::sink::FrameSink;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum StopReason {
    EndOfStream,
    OperatorStop,
    Fault(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndOfStream => write!(f, "end of stream"),
            StopReason::OperatorStop => write!(f, "operator stop"),
            StopReason::Fault(message) => write!(f, "fault: {}", message),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
    Stopped(StopReason),
}

/// Cooperative stop flag shared with the operator (e.g. a Ctrl-C handler).
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Per-run parameters, fixed at startup.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    /// Minimum allowed centroid distance in working-frame pixels.
    pub min_distance: f32,
    /// Class index the detector is restricted to.
    pub target_class: usize,
    /// Frames are resized to this width before detection.
    pub working_width: u32,
}

impl PipelineSettings {
    pub fn new(min_distance: f32, target_class: usize) -> Self {
        Self {
            min_distance,
            target_class,
            working_width: DEFAULT_WORKING_WIDTH,
        }
    }

    pub fn with_working_width(mut self, width: u32) -> Self {
        self.working_width = width;
        self
    }
}

/// Result of one processed frame.
#[derive(Clone, Debug, Serialize)]
pub struct FrameReport {
    /// Zero-based frame index within the current run.
    pub index: u64,
    pub people: Vec<Detection>,
    pub violations: ViolationSet,
    /// People involved in at least one violation.
    pub count: usize,
}

/// Summary of a finished run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub frames_processed: u64,
    pub frames_with_violations: u64,
    pub peak_count: usize,
    pub stop_reason: StopReason,
}

pub struct Driver {
    state: DriverState,
    settings: PipelineSettings,
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    annotator: Annotator,
    display: Option<Box<dyn FrameSink>>,
    recorder: Option<Box<dyn FrameSink>>,
    stop: StopSignal,
    frame_limit: Option<u64>,
    frames_processed: u64,
    frames_with_violations: u64,
    peak_count: usize,
}

impl Driver {
    pub fn new(
        settings: PipelineSettings,
        source: Box<dyn FrameSource>,
        detector: Box<dyn DetectorBackend>,
    ) -> Self {
        Self {
            state: DriverState::Idle,
            settings,
            source,
            detector,
            annotator: Annotator::default(),
            display: None,
            recorder: None,
            stop: StopSignal::new(),
            frame_limit: None,
            frames_processed: 0,
            frames_with_violations: 0,
            peak_count: 0,
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_display(mut self, display: Box<dyn FrameSink>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn with_recorder(mut self, recorder: Box<dyn FrameSink>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Stop as an operator stop after `frames` processed frames.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == DriverState::Running
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Idle -> Running. Connects the source and warms up the detector.
    pub fn start(&mut self) -> Result<()> {
        if self.state != DriverState::Idle {
            return Err(anyhow!("cannot start driver in state {:?}", self.state));
        }
        let ready = self
            .source
            .connect()
            .with_context(|| format!("failed to connect source {}", self.source.name()))
            .and_then(|_| {
                self.detector
                    .warm_up()
                    .with_context(|| format!("{} detector warm-up failed", self.detector.name()))
            });
        if let Err(err) = ready {
            return Err(self.fault(err));
        }
        log::info!(
            "pipeline running: source={} detector={} min_distance={} target_class={}",
            self.source.name(),
            self.detector.name(),
            self.settings.min_distance,
            self.settings.target_class
        );
        self.state = DriverState::Running;
        Ok(())
    }

    /// Process one frame.
    ///
    /// Returns `Ok(None)` when the source is exhausted; the driver is then
    /// `Stopped(EndOfStream)`. Any error stops the driver with `Fault`.
    pub fn step(&mut self) -> Result<Option<FrameReport>> {
        if self.state != DriverState::Running {
            return Err(anyhow!("cannot step driver in state {:?}", self.state));
        }
        let report = match self.process_frame() {
            Ok(Some(report)) => report,
            Ok(None) => {
                self.halt(StopReason::EndOfStream)?;
                return Ok(None);
            }
            Err(err) => return Err(self.fault(err)),
        };

        self.frames_processed += 1;
        if report.count > 0 {
            self.frames_with_violations += 1;
        }
        self.peak_count = self.peak_count.max(report.count);

        let limit_reached = self
            .frame_limit
            .is_some_and(|limit| self.frames_processed >= limit);
        if self.stop.is_triggered() || limit_reached {
            self.halt(StopReason::OperatorStop)?;
        }
        Ok(Some(report))
    }

    /// Start if idle and step until a terminal state.
    pub fn run(&mut self) -> Result<RunReport> {
        match self.state {
            DriverState::Idle => self.start()?,
            DriverState::Running => {}
            DriverState::Stopped(_) => {
                return Err(anyhow!("driver already stopped; reset it before running again"))
            }
        }
        while self.is_running() {
            self.step()?;
        }
        let report = self.report()?;
        log::info!(
            "run finished ({}): {} frames, {} with violations, peak {}",
            report.stop_reason,
            report.frames_processed,
            report.frames_with_violations,
            report.peak_count
        );
        Ok(report)
    }

    /// Summary of the current run. Only available once stopped.
    pub fn report(&self) -> Result<RunReport> {
        let DriverState::Stopped(reason) = &self.state else {
            return Err(anyhow!("run report requested in state {:?}", self.state));
        };
        Ok(RunReport {
            frames_processed: self.frames_processed,
            frames_with_violations: self.frames_with_violations,
            peak_count: self.peak_count,
            stop_reason: reason.clone(),
        })
    }

    /// Stopped -> Idle with a fresh source and cleared counters.
    pub fn reset(&mut self, source: Box<dyn FrameSource>) -> Result<()> {
        if !matches!(self.state, DriverState::Stopped(_)) {
            return Err(anyhow!("cannot reset driver in state {:?}", self.state));
        }
        self.source = source;
        self.stop.clear();
        self.frames_processed = 0;
        self.frames_with_violations = 0;
        self.peak_count = 0;
        self.state = DriverState::Idle;
        Ok(())
    }

    fn process_frame(&mut self) -> Result<Option<FrameReport>> {
        let Some(frame) = self
            .source
            .next_frame()
            .with_context(|| format!("source {} failed", self.source.name()))?
        else {
            return Ok(None);
        };
        let mut frame = resize_to_width(frame, self.settings.working_width)?;

        let people = self
            .detector
            .detect(&frame, self.settings.target_class)
            .with_context(|| format!("{} detector failed", self.detector.name()))?;
        let violations = evaluate(&centroids(&people), self.settings.min_distance);
        let count = self.annotator.annotate(&mut frame, &people, &violations);

        if let Some(display) = self.display.as_mut() {
            display
                .write(&frame)
                .with_context(|| format!("{} sink failed", display.name()))?;
        }
        if let Some(recorder) = self.recorder.as_mut() {
            recorder
                .write(&frame)
                .with_context(|| format!("{} sink failed", recorder.name()))?;
        }

        let index = self.frames_processed;
        log::debug!(
            "frame {}: {} people, {} in violation",
            index,
            people.len(),
            count
        );
        Ok(Some(FrameReport {
            index,
            people,
            violations,
            count,
        }))
    }

    /// Enter a non-fault stopped state. A sink that fails to finish turns the
    /// stop into a fault.
    fn halt(&mut self, reason: StopReason) -> Result<()> {
        if let Err(err) = self.finish_sinks() {
            return Err(self.fault(err));
        }
        log::info!("pipeline stopped: {}", reason);
        self.state = DriverState::Stopped(reason);
        Ok(())
    }

    /// Enter `Stopped(Fault)`, finishing sinks best-effort, and hand back the error.
    fn fault(&mut self, err: anyhow::Error) -> anyhow::Error {
        if let Err(finish_err) = self.finish_sinks() {
            log::warn!("failed to finish sinks after fault: {:#}", finish_err);
        }
        log::error!("pipeline fault: {:#}", err);
        self.state = DriverState::Stopped(StopReason::Fault(format!("{:#}", err)));
        err
    }

    fn finish_sinks(&mut self) -> Result<()> {
        let mut first_err = None;
        for sink in [self.display.as_mut(), self.recorder.as_mut()]
            .into_iter()
            .flatten()
        {
            if let Err(err) = sink.finish() {
                let err = err.context(format!("failed to finish {} sink", sink.name()));
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, StubBackend};
    use crate::ingest::MemorySource;
    use image::RgbImage;
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Sink that records calls into a shared journal.
    struct JournalSink {
        name: &'static str,
        journal: Journal,
        fail_writes: bool,
    }

    impl JournalSink {
        fn boxed(name: &'static str, journal: &Journal) -> Box<dyn FrameSink> {
            Box::new(Self {
                name,
                journal: journal.clone(),
                fail_writes: false,
            })
        }
    }

    impl FrameSink for JournalSink {
        fn name(&self) -> &str {
            self.name
        }

        fn write(&mut self, _frame: &RgbImage) -> Result<()> {
            if self.fail_writes {
                return Err(anyhow!("disk full"));
            }
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:write", self.name));
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:finish", self.name));
            Ok(())
        }
    }

    struct BrokenSource;

    impl FrameSource for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }

        fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            Err(anyhow!("device unplugged"))
        }

        fn frames_captured(&self) -> u64 {
            0
        }
    }

    /// Detects nobody on the first `healthy_frames` frames, then fails.
    struct FailingDetector {
        healthy_frames: usize,
    }

    impl DetectorBackend for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&mut self, _frame: &RgbImage, _target_class: usize) -> Result<Vec<Detection>> {
            if self.healthy_frames == 0 {
                return Err(anyhow!("model crashed"));
            }
            self.healthy_frames -= 1;
            Ok(Vec::new())
        }
    }

    fn person(x: f32) -> Detection {
        Detection::from_bbox(0.9, BoundingBox::from_xywh(x, 100.0, 40.0, 120.0))
    }

    fn frames(n: usize) -> Box<dyn FrameSource> {
        Box::new(MemorySource::new(vec![RgbImage::new(700, 400); n]))
    }

    fn close_pair_then_empty() -> Box<dyn DetectorBackend> {
        Box::new(StubBackend::scripted_class(
            0,
            vec![vec![person(100.0), person(120.0)], vec![]],
        ))
    }

    #[test]
    fn counts_follow_each_frame() -> Result<()> {
        let mut driver = Driver::new(
            PipelineSettings::new(50.0, 0),
            frames(2),
            close_pair_then_empty(),
        );
        driver.start()?;

        let mut counts = Vec::new();
        while let Some(report) = driver.step()? {
            counts.push(report.count);
        }

        assert_eq!(counts, vec![2, 0]);
        assert_eq!(
            driver.state(),
            &DriverState::Stopped(StopReason::EndOfStream)
        );
        let report = driver.report()?;
        assert_eq!(report.frames_processed, 2);
        assert_eq!(report.frames_with_violations, 1);
        assert_eq!(report.peak_count, 2);
        Ok(())
    }

    #[test]
    fn display_is_fed_before_recording_and_both_finish() -> Result<()> {
        let journal = Journal::default();
        let mut driver = Driver::new(
            PipelineSettings::new(50.0, 0),
            frames(1),
            close_pair_then_empty(),
        )
        .with_recorder(JournalSink::boxed("recorder", &journal))
        .with_display(JournalSink::boxed("display", &journal));

        let report = driver.run()?;

        assert_eq!(report.stop_reason, StopReason::EndOfStream);
        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                "display:write",
                "recorder:write",
                "display:finish",
                "recorder:finish"
            ]
        );
        Ok(())
    }

    #[test]
    fn lifecycle_rejects_out_of_order_calls() -> Result<()> {
        let mut driver = Driver::new(
            PipelineSettings::new(50.0, 0),
            frames(1),
            close_pair_then_empty(),
        );
        assert!(driver.step().is_err());
        assert!(driver.report().is_err());
        assert!(driver.reset(frames(1)).is_err());

        driver.start()?;
        assert!(driver.start().is_err());

        driver.run()?;
        assert!(driver.step().is_err());
        assert!(driver.run().is_err());
        Ok(())
    }

    #[test]
    fn source_error_is_a_fault_and_finishes_sinks() {
        let journal = Journal::default();
        let mut driver = Driver::new(
            PipelineSettings::new(50.0, 0),
            Box::new(BrokenSource),
            close_pair_then_empty(),
        )
        .with_recorder(JournalSink::boxed("recorder", &journal));

        let err = driver.run().unwrap_err();

        assert!(format!("{:#}", err).contains("device unplugged"));
        assert!(matches!(
            driver.state(),
            DriverState::Stopped(StopReason::Fault(message)) if message.contains("device unplugged")
        ));
        assert_eq!(*journal.lock().unwrap(), vec!["recorder:finish"]);
    }

    #[test]
    fn detector_error_is_a_fault_and_finishes_sinks() {
        let journal = Journal::default();
        let mut driver = Driver::new(
            PipelineSettings::new(50.0, 0),
            frames(3),
            Box::new(FailingDetector { healthy_frames: 1 }),
        )
        .with_display(JournalSink::boxed("display", &journal))
        .with_recorder(JournalSink::boxed("recorder", &journal));

        let err = driver.run().unwrap_err();

        assert!(format!("{:#}", err).contains("model crashed"));
        assert!(matches!(
            driver.state(),
            DriverState::Stopped(StopReason::Fault(message)) if message.contains("model crashed")
        ));
        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                "display:write",
                "recorder:write",
                "display:finish",
                "recorder:finish"
            ]
        );
    }

    #[test]
    fn sink_error_is_a_fault() {
        let journal = Journal::default();
        let failing = Box::new(JournalSink {
            name: "recorder",
            journal: journal.clone(),
            fail_writes: true,
        });
        let mut driver = Driver::new(
            PipelineSettings::new(50.0, 0),
            frames(3),
            close_pair_then_empty(),
        )
        .with_recorder(failing);

        assert!(driver.run().is_err());
        assert!(matches!(
            driver.state(),
            DriverState::Stopped(StopReason::Fault(_))
        ));
    }

    #[test]
    fn stop_signal_ends_run_after_current_frame() -> Result<()> {
        let stop = StopSignal::new();
        let mut driver = Driver::new(
            PipelineSettings::new(50.0, 0),
            frames(5),
            close_pair_then_empty(),
        )
        .with_stop_signal(stop.clone());

        driver.start()?;
        stop.trigger();
        let report = driver.step()?;

        assert_eq!(report.map(|r| r.count), Some(2));
        assert_eq!(
            driver.state(),
            &DriverState::Stopped(StopReason::OperatorStop)
        );
        Ok(())
    }

    #[test]
    fn frame_limit_stops_as_operator_stop() -> Result<()> {
        let mut driver = Driver::new(
            PipelineSettings::new(50.0, 0),
            frames(10),
            close_pair_then_empty(),
        )
        .with_frame_limit(3);

        let report = driver.run()?;
        assert_eq!(report.frames_processed, 3);
        assert_eq!(report.stop_reason, StopReason::OperatorStop);
        Ok(())
    }

    #[test]
    fn reset_allows_a_fresh_run() -> Result<()> {
        let stop = StopSignal::new();
        let mut driver = Driver::new(
            PipelineSettings::new(50.0, 0),
            frames(1),
            Box::new(StubBackend::walkers(0)),
        )
        .with_stop_signal(stop.clone());
        stop.trigger();
        driver.run()?;

        driver.reset(frames(4))?;
        assert_eq!(driver.state(), &DriverState::Idle);
        assert!(!stop.is_triggered());

        let report = driver.run()?;
        assert_eq!(report.frames_processed, 4);
        assert_eq!(report.stop_reason, StopReason::EndOfStream);
        Ok(())
    }

    #[test]
    fn frames_are_resized_to_working_width() -> Result<()> {
        let source = Box::new(MemorySource::new(vec![RgbImage::new(1400, 800)]));
        let mut driver = Driver::new(
            PipelineSettings::new(30.0, 0).with_working_width(700),
            source,
            Box::new(StubBackend::walkers(0)),
        );
        driver.start()?;
        let report = driver.step()?.ok_or_else(|| anyhow!("no frame"))?;
        for person in &report.people {
            assert!(person.bbox.x1 <= 700.0);
        }
        Ok(())
    }
}
