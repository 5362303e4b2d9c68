use std::{
    thread,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;

use crate::db::{MeasurementRecord, RecordStore, TableLayout};
use crate::device::{DeviceError, ParamKey, ParamValue, ReaderDevice, TagObservation};
use crate::error::SweepError;
use crate::{log_debug, log_info, log_warn};

use super::{
    classifier::{CellResult, ClassifiedRead, Classifier, Observed, TagsOfInterest},
    config::{CaptureConfig, SweepConfig},
    grid::{capture_session, Grid},
    setup::prepare_reader,
    state::{ControllerState, RunMode, RunOutcome, RunSummary},
};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Cancelled,
}

/// Drives a reader through a sweep or a capture and writes what it sees.
///
/// The controller owns the reader and the store for the length of a run.
/// Everything happens on the calling thread: the only waits are the reader's
/// read window and the settle delay between power steps. The cancellation
/// token is sampled before every read, so an in-flight read always finishes.
pub struct SweepController<D, S> {
    device: D,
    store: S,
    cancel: CancellationToken,
    state: ControllerState,
    /// Set once the reader has been touched; shutdown only waits for the
    /// reader to settle when it was.
    engaged: bool,
}

impl<D, S> SweepController<D, S>
where
    D: ReaderDevice,
    S: RecordStore,
{
    pub fn new(device: D, store: S, cancel: CancellationToken) -> Self {
        Self {
            device,
            store,
            cancel,
            state: ControllerState::Idle,
            engaged: false,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn into_parts(self) -> (D, S) {
        (self.device, self.store)
    }

    /// Walks the frequency/power grid `config.passes` times (forever when
    /// zero) or until cancelled. The reader is disconnected and the store
    /// closed on every exit path.
    pub fn run_sweep(&mut self, config: &SweepConfig) -> Result<RunSummary, SweepError> {
        let started = Instant::now();
        let mut summary = RunSummary::new(RunMode::Sweep);
        self.engaged = false;

        let result = self.sweep(config, &mut summary);
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        let closed = self.shutdown(config.settle);

        result?;
        closed?;
        log_info!("{summary}");
        Ok(summary)
    }

    /// Reads continuously at a fixed power until the configured duration has
    /// elapsed or the run is cancelled. Every observation becomes a row.
    pub fn run_capture(&mut self, config: &CaptureConfig) -> Result<RunSummary, SweepError> {
        let started = Instant::now();
        let mut summary = RunSummary::new(RunMode::Capture);
        self.engaged = false;

        let result = self.capture(config, &mut summary);
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        let closed = self.shutdown(config.settle);

        result?;
        closed?;
        log_info!("{summary}");
        Ok(summary)
    }

    fn transition(&mut self, next: ControllerState) {
        if self.state != next {
            log::trace!("controller {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn sweep(&mut self, config: &SweepConfig, summary: &mut RunSummary) -> Result<(), SweepError> {
        self.transition(ControllerState::Configuring);
        config.validate()?;

        let grid = Grid::new(config.frequency, config.power);
        if grid.is_empty() {
            log_info!("Sweep grid is empty; nothing to measure");
            return Ok(());
        }
        let tags = TagsOfInterest::new(&config.tags_of_interest);

        self.engaged = true;
        let profile = prepare_reader(&mut self.device, &config.reader)?;
        let classifier = Classifier::for_model(&profile.model, config.reader.print_metadata);
        self.store.init_schema(TableLayout::Sweep)?;

        log_info!(
            "Sweeping {} frequencies x {} power steps for {} tag(s)",
            grid.frequency_count(),
            grid.power_count(),
            tags.len()
        );

        while config.passes == 0 || summary.passes < config.passes {
            let flow = self.walk_grid(&grid, &tags, &classifier, config, summary)?;
            if flow == Flow::Cancelled {
                log_info!("Sweep cancelled by operator");
                summary.outcome = RunOutcome::Cancelled;
                break;
            }
            summary.passes += 1;
            log_debug!("Completed pass {}", summary.passes);
        }
        Ok(())
    }

    fn walk_grid(
        &mut self,
        grid: &Grid,
        tags: &TagsOfInterest,
        classifier: &Classifier,
        config: &SweepConfig,
        summary: &mut RunSummary,
    ) -> Result<Flow, SweepError> {
        let mut open: Option<CellResult> = None;

        for cell in grid.cells() {
            self.transition(ControllerState::Idle);
            let continuing = open
                .as_ref()
                .is_some_and(|result| result.frequency() == cell.frequency);

            if continuing && open.as_ref().is_some_and(CellResult::all_seen) {
                continue;
            }
            if !continuing {
                if let Some(done) = open.take() {
                    self.complete_cell(done, tags, summary)?;
                }
            }
            if self.cancel.is_cancelled() {
                if let Some(partial) = open.take() {
                    self.flush(partial, tags, false, summary)?;
                }
                return Ok(Flow::Cancelled);
            }

            self.transition(ControllerState::Configuring);
            if !continuing {
                self.tune(cell.frequency)?;
                open = Some(CellResult::new(cell.frequency, tags));
            }
            self.device
                .set_param(ParamKey::ReadPower, ParamValue::Power(cell.power))
                .map_err(SweepError::device_config("setting read power"))?;
            summary.cells_visited += 1;

            self.read(config.dwell, summary)?;
            while let Some(obs) = self.device.next_observation() {
                let Some(read) = classify(classifier, &obs, summary) else {
                    continue;
                };
                let Some(result) = open.as_mut() else {
                    continue;
                };
                if let Observed::Recorded(_) = result.observe(tags, &read, cell.power) {
                    log_debug!(
                        "{} first seen at {} kHz / {} cdBm",
                        read.epc,
                        cell.frequency,
                        cell.power
                    );
                }
            }
            thread::sleep(config.settle);

            if open.as_ref().is_some_and(CellResult::all_seen) {
                log_debug!(
                    "All tags seen at {} kHz; skipping remaining power steps",
                    cell.frequency
                );
            }
        }

        if let Some(done) = open.take() {
            self.complete_cell(done, tags, summary)?;
        }
        Ok(Flow::Continue)
    }

    fn capture(&mut self, config: &CaptureConfig, summary: &mut RunSummary) -> Result<(), SweepError> {
        self.transition(ControllerState::Configuring);
        config.validate()?;

        self.engaged = true;
        let profile = prepare_reader(&mut self.device, &config.reader)?;
        let classifier = Classifier::for_model(&profile.model, config.reader.print_metadata);
        self.store.init_schema(TableLayout::Capture)?;

        if profile.read_power != config.power() {
            log_warn!(
                "Reader applied {} cdBm instead of the requested {}",
                profile.read_power,
                config.power()
            );
        }
        let session = capture_session(profile.read_power, config.duration);
        log_info!(
            "Capturing for {:?} at {} cdBm",
            session.budget,
            session.power
        );
        summary.cells_visited = 1;
        let started = Instant::now();

        loop {
            self.transition(ControllerState::Idle);
            if self.cancel.is_cancelled() {
                log_info!("Capture cancelled by operator");
                summary.outcome = RunOutcome::Cancelled;
                break;
            }
            if started.elapsed() >= session.budget {
                self.transition(ControllerState::SessionComplete);
                break;
            }

            self.read(config.dwell, summary)?;
            while let Some(obs) = self.device.next_observation() {
                if let Some(read) = classify(&classifier, &obs, summary) {
                    self.persist(&read.into_capture_record(session.power), summary)?;
                }
            }
        }
        summary.passes = 1;
        Ok(())
    }

    fn tune(&mut self, frequency: u32) -> Result<(), SweepError> {
        self.device
            .set_param(ParamKey::HopTable, ParamValue::HopTable(vec![frequency]))
            .map_err(SweepError::device_config("setting hop table"))?;
        log_debug!("Hop table set to {frequency} kHz");

        match self.device.get_param(ParamKey::AntennaReturnLoss) {
            Ok(value) => {
                for entry in value.into_return_loss().unwrap_or_default() {
                    log_debug!("Antenna {} return loss {}", entry.port, entry.loss);
                }
            }
            Err(DeviceError::Unsupported(_)) => {}
            Err(err) => log_warn!("Failed to read antenna return loss: {err}"),
        }
        Ok(())
    }

    /// One timed read. A full tag buffer still leaves observations to drain.
    fn read(&mut self, dwell: Duration, summary: &mut RunSummary) -> Result<(), SweepError> {
        self.transition(ControllerState::Reading);
        summary.reads_issued += 1;
        match self.device.read(dwell) {
            Ok(()) => {}
            Err(DeviceError::BufferFull) => {
                summary.buffer_full_events += 1;
                log_warn!("Reader tag buffer full; draining buffered observations");
            }
            Err(err) => return Err(SweepError::DeviceRead(err)),
        }
        self.transition(ControllerState::Draining);
        Ok(())
    }

    fn complete_cell(
        &mut self,
        result: CellResult,
        tags: &TagsOfInterest,
        summary: &mut RunSummary,
    ) -> Result<(), SweepError> {
        self.transition(ControllerState::CellComplete);
        self.flush(result, tags, true, summary)
    }

    fn flush(
        &mut self,
        result: CellResult,
        tags: &TagsOfInterest,
        include_sentinels: bool,
        summary: &mut RunSummary,
    ) -> Result<(), SweepError> {
        for record in result.into_records(tags, include_sentinels) {
            self.persist(&record, summary)?;
        }
        Ok(())
    }

    fn persist(&mut self, record: &MeasurementRecord, summary: &mut RunSummary) -> Result<(), SweepError> {
        self.store.insert_record(record)?;
        summary.rows_written += 1;
        match &record.capture {
            None => log_info!(
                "{} : {} - {} - {} - {}",
                record.epc,
                record.rssi,
                record.phase,
                record.frequency,
                record.power
            ),
            Some(details) => log_info!(
                "{} | {} | {} | {} | {} | {} | {}",
                record.epc,
                record.power,
                record.rssi,
                record.phase,
                record.frequency,
                details.antenna,
                details.timestamp_secs
            ),
        }
        Ok(())
    }

    fn shutdown(&mut self, settle: Duration) -> Result<(), SweepError> {
        self.transition(ControllerState::Stopped);
        if self.engaged {
            thread::sleep(settle);
        }
        let closed = self.store.close();
        self.device.disconnect();
        closed.map_err(SweepError::from)
    }
}

fn classify(
    classifier: &Classifier,
    obs: &TagObservation,
    summary: &mut RunSummary,
) -> Option<ClassifiedRead> {
    if classifier.print_metadata() {
        log_info!("{}", classifier.describe(obs));
    }
    match classifier.normalize(obs) {
        Ok(read) => Some(read),
        Err(err) => {
            summary.malformed_skipped += 1;
            log_warn!("Skipping observation: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CaptureDetails;
    use crate::device::{
        EventLog, ReadPlan, Scenario, ScriptedRead, SimulatedReader, TagRule,
        EMBEDDED_OP_ERROR_LEN,
    };
    use crate::error::StoreError;
    use crate::sweep::classifier::{NOT_SEEN_PHASE, NOT_SEEN_POWER, NOT_SEEN_RSSI};
    use crate::sweep::config::{FrequencyRange, PowerRange, ReaderConfig};

    const A: &str = "E200493F3185AD7126ACF6B5";
    const B: &str = "E200493F38187C3126BE51F0";

    #[derive(Default)]
    struct MemoryStore {
        layout: Option<TableLayout>,
        rows: Vec<MeasurementRecord>,
        closed: bool,
    }

    impl RecordStore for MemoryStore {
        fn init_schema(&mut self, layout: TableLayout) -> Result<(), StoreError> {
            self.layout = Some(layout);
            self.rows.clear();
            Ok(())
        }

        fn insert_record(&mut self, record: &MeasurementRecord) -> Result<(), StoreError> {
            if self.closed {
                return Err(StoreError::Closed);
            }
            self.layout.ok_or(StoreError::SchemaNotInitialised)?;
            self.rows.push(record.clone());
            Ok(())
        }

        fn close(&mut self) -> Result<(), StoreError> {
            self.closed = true;
            Ok(())
        }
    }

    /// Cancels the run once `after` reads have been issued.
    struct CancelAfter {
        inner: SimulatedReader,
        after: usize,
        token: CancellationToken,
    }

    impl ReaderDevice for CancelAfter {
        fn connect(&mut self, uri: &str) -> Result<(), DeviceError> {
            self.inner.connect(uri)
        }

        fn get_param(&mut self, key: ParamKey) -> Result<ParamValue, DeviceError> {
            self.inner.get_param(key)
        }

        fn set_param(&mut self, key: ParamKey, value: ParamValue) -> Result<(), DeviceError> {
            self.inner.set_param(key, value)
        }

        fn install_read_plan(&mut self, plan: ReadPlan) -> Result<(), DeviceError> {
            self.inner.install_read_plan(plan)
        }

        fn supports_antenna_detection(&mut self) -> Result<bool, DeviceError> {
            self.inner.supports_antenna_detection()
        }

        fn read(&mut self, dwell: Duration) -> Result<(), DeviceError> {
            let result = self.inner.read(dwell);
            if self.inner.event_log().reads() >= self.after {
                self.token.cancel();
            }
            result
        }

        fn next_observation(&mut self) -> Option<TagObservation> {
            self.inner.next_observation()
        }

        fn disconnect(&mut self) {
            self.inner.disconnect()
        }
    }

    fn tag(epc: &str, rssi: i32) -> TagObservation {
        TagObservation::new(hex::decode(epc).unwrap()).with_rssi(rssi)
    }

    fn sweep_config(freq: (u32, u32), power: (i32, i32, i32)) -> SweepConfig {
        let mut reader = ReaderConfig::new("sim://test");
        reader.region_index = 0;
        let mut config = SweepConfig::new(reader);
        config.frequency = FrequencyRange {
            min_khz: freq.0,
            max_khz: freq.1,
            step_mhz: 5.0,
        };
        config.power = PowerRange {
            min: power.0,
            max: power.1,
            step: power.2,
        };
        config.tags_of_interest = vec![A.into(), B.into()];
        config.dwell = Duration::from_millis(1);
        config.settle = Duration::ZERO;
        config
    }

    fn capture_config() -> CaptureConfig {
        let mut reader = ReaderConfig::new("sim://test");
        reader.region_index = 0;
        let mut config = CaptureConfig::new(reader);
        config.duration = Duration::from_millis(50);
        config.dwell = Duration::from_millis(10);
        config.settle = Duration::from_millis(200);
        config
    }

    fn run_sweep(
        reader: SimulatedReader,
        config: &SweepConfig,
        cancel: CancellationToken,
    ) -> (Result<RunSummary, SweepError>, MemoryStore, EventLog) {
        let log = reader.event_log();
        let mut controller = SweepController::new(reader, MemoryStore::default(), cancel);
        let result = controller.run_sweep(config);
        assert_eq!(controller.state(), ControllerState::Stopped);
        let (_, store) = controller.into_parts();
        (result, store, log)
    }

    fn sentinel(epc: &str, frequency: u32) -> MeasurementRecord {
        MeasurementRecord::sweep(epc, NOT_SEEN_RSSI, NOT_SEEN_PHASE, frequency, NOT_SEEN_POWER)
    }

    #[test]
    fn single_sighting_yields_one_row_per_tag_per_frequency() {
        let reader = SimulatedReader::scripted(vec![ScriptedRead::ok(vec![
            tag(A, -40).with_frequency(840_000),
        ])]);
        let config = sweep_config((840_000, 845_000), (3150, 3150, 100));

        let (result, store, log) = run_sweep(reader, &config, CancellationToken::new());
        let summary = result.unwrap();

        assert_eq!(
            store.rows,
            vec![
                MeasurementRecord::sweep(A, -40, 0, 840_000, 3150),
                sentinel(B, 840_000),
                sentinel(A, 845_000),
                sentinel(B, 845_000),
            ]
        );
        assert_eq!(store.layout, Some(TableLayout::Sweep));
        assert!(store.closed);
        assert!(log.disconnected());
        assert_eq!(log.hop_tables(), vec![vec![840_000], vec![845_000]]);
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.passes, 1);
        assert_eq!(summary.cells_visited, 2);
        assert_eq!(summary.rows_written, 4);
    }

    #[test]
    fn stops_raising_power_once_every_tag_is_seen() {
        let reader = SimulatedReader::scripted(vec![
            ScriptedRead::ok(vec![tag(A, -60)]),
            ScriptedRead::ok(vec![tag(B, -62), tag(A, -30)]),
            ScriptedRead::ok(vec![]),
            ScriptedRead::ok(vec![]),
            ScriptedRead::ok(vec![]),
        ]);
        let config = sweep_config((840_000, 845_000), (1000, 3000, 1000));

        let (result, store, log) = run_sweep(reader, &config, CancellationToken::new());
        result.unwrap();

        assert_eq!(log.power_sets(), vec![1000, 2000, 1000, 2000, 3000]);
        assert_eq!(
            store.rows,
            vec![
                MeasurementRecord::sweep(A, -60, 0, 840_000, 1000),
                MeasurementRecord::sweep(B, -62, 0, 840_000, 2000),
                sentinel(A, 845_000),
                sentinel(B, 845_000),
            ]
        );
    }

    #[test]
    fn first_observation_in_a_cell_wins() {
        let reader = SimulatedReader::scripted(vec![ScriptedRead::ok(vec![
            tag(A, -40).with_phase(10),
            tag(A, -20).with_phase(99),
        ])]);
        let config = sweep_config((840_000, 840_000), (3150, 3150, 100));

        let (result, store, _) = run_sweep(reader, &config, CancellationToken::new());
        result.unwrap();
        assert_eq!(store.rows.len(), 2);
        assert_eq!(store.rows[0], MeasurementRecord::sweep(A, -40, 10, 840_000, 3150));
    }

    #[test]
    fn full_buffer_is_drained_not_fatal() {
        let reader = SimulatedReader::scripted(vec![ScriptedRead::buffer_full(vec![
            tag(A, -40),
            tag(B, -41),
        ])]);
        let config = sweep_config((840_000, 840_000), (3150, 3150, 100));

        let (result, store, _) = run_sweep(reader, &config, CancellationToken::new());
        let summary = result.unwrap();
        assert_eq!(summary.buffer_full_events, 1);
        assert_eq!(
            store.rows,
            vec![
                MeasurementRecord::sweep(A, -40, 0, 840_000, 3150),
                MeasurementRecord::sweep(B, -41, 0, 840_000, 3150),
            ]
        );
    }

    #[test]
    fn failed_read_aborts_and_still_disconnects() {
        let reader = SimulatedReader::scripted(vec![
            ScriptedRead::ok(vec![tag(A, -40)]),
            ScriptedRead::failed("antenna fault"),
        ]);
        let config = sweep_config((840_000, 845_000), (3150, 3150, 100));

        let (result, store, log) = run_sweep(reader, &config, CancellationToken::new());
        assert!(matches!(
            result,
            Err(SweepError::DeviceRead(DeviceError::Transport(_)))
        ));
        assert_eq!(store.rows.len(), 2);
        assert!(store.closed);
        assert!(log.disconnected());
    }

    #[test]
    fn malformed_observations_are_skipped() {
        let reader = SimulatedReader::scripted(vec![ScriptedRead::ok(vec![
            tag(A, -10).with_data(EMBEDDED_OP_ERROR_LEN, vec![0x04, 0x23]),
            tag(A, -40),
        ])]);
        let config = sweep_config((840_000, 840_000), (3150, 3150, 100));

        let (result, store, _) = run_sweep(reader, &config, CancellationToken::new());
        let summary = result.unwrap();
        assert_eq!(summary.malformed_skipped, 1);
        assert_eq!(store.rows[0].rssi, -40);
    }

    #[test]
    fn cancel_before_start_stops_at_first_boundary() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        cancel.cancel();
        let reader = SimulatedReader::scripted(vec![]);
        let config = sweep_config((840_000, 845_000), (3150, 3150, 100));

        let (result, store, log) = run_sweep(reader, &config, cancel);
        let summary = result.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert_eq!(summary.passes, 0);
        assert_eq!(log.reads(), 0);
        assert!(store.rows.is_empty());
        assert!(log.disconnected());
    }

    #[test]
    fn cancel_mid_frequency_keeps_flushed_rows() {
        let cancel = CancellationToken::new();
        let inner = SimulatedReader::scripted(vec![
            ScriptedRead::ok(vec![]),
            ScriptedRead::ok(vec![]),
            ScriptedRead::ok(vec![tag(B, -55)]),
        ]);
        let log = inner.event_log();
        let device = CancelAfter {
            inner,
            after: 3,
            token: cancel.clone(),
        };
        let config = sweep_config((840_000, 845_000), (1000, 2000, 1000));

        let mut controller = SweepController::new(device, MemoryStore::default(), cancel);
        let summary = controller.run_sweep(&config).unwrap();
        let (_, store) = controller.into_parts();

        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert_eq!(log.reads(), 3);
        assert_eq!(
            store.rows,
            vec![
                sentinel(A, 840_000),
                sentinel(B, 840_000),
                MeasurementRecord::sweep(B, -55, 0, 845_000, 1000),
            ]
        );
    }

    #[test]
    fn empty_grid_is_a_no_op() {
        let reader = SimulatedReader::scripted(vec![]);
        let config = sweep_config((845_000, 840_000), (3150, 3150, 100));

        let (result, store, log) = run_sweep(reader, &config, CancellationToken::new());
        let summary = result.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.cells_visited, 0);
        assert!(log.snapshot().is_empty());
        assert!(store.rows.is_empty());
    }

    #[test]
    fn repeated_passes_rewalk_the_grid() {
        let reader = SimulatedReader::scripted(vec![]);
        let mut config = sweep_config((840_000, 845_000), (3150, 3150, 100));
        config.passes = 2;

        let (result, store, log) = run_sweep(reader, &config, CancellationToken::new());
        let summary = result.unwrap();
        assert_eq!(summary.passes, 2);
        assert_eq!(log.reads(), 4);
        assert_eq!(store.rows.len(), 8);
    }

    #[test]
    fn unusable_region_list_is_a_config_error() {
        let reader = SimulatedReader::new(Scenario {
            regions: vec![],
            ..Scenario::default()
        })
        .unwrap();
        let config = sweep_config((840_000, 845_000), (3150, 3150, 100));

        let (result, store, log) = run_sweep(reader, &config, CancellationToken::new());
        assert!(matches!(result, Err(SweepError::DeviceConfig { .. })));
        assert_eq!(store.layout, None);
        assert!(log.disconnected());
    }

    #[test]
    fn invalid_config_never_touches_the_reader() {
        let reader = SimulatedReader::scripted(vec![]);
        let mut config = sweep_config((840_000, 845_000), (3150, 3150, 100));
        config.tags_of_interest.clear();

        let (result, _, log) = run_sweep(reader, &config, CancellationToken::new());
        assert!(matches!(result, Err(SweepError::InvalidConfig(_))));
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn tag_listed_twice_is_rejected_before_reading() {
        let reader = SimulatedReader::scripted(vec![ScriptedRead::ok(vec![tag(A, -40)])]);
        let mut config = sweep_config((840_000, 840_000), (1000, 3000, 1000));
        config.tags_of_interest = vec![A.into(), A.to_ascii_lowercase()];

        let (result, store, log) = run_sweep(reader, &config, CancellationToken::new());
        assert!(matches!(result, Err(SweepError::InvalidConfig(_))));
        assert_eq!(log.reads(), 0);
        assert!(store.rows.is_empty());
    }

    #[test]
    fn rule_based_reader_drives_a_sweep() {
        let mut near = TagRule::new(A, -48);
        near.min_power = Some(2000);
        let mut far = TagRule::new(B, -70);
        far.frequencies = vec![845_000];
        let reader = SimulatedReader::new(Scenario {
            tags: vec![near, far],
            ..Scenario::default()
        })
        .unwrap();
        let config = sweep_config((840_000, 845_000), (1000, 2000, 1000));

        let (result, store, _) = run_sweep(reader, &config, CancellationToken::new());
        result.unwrap();
        assert_eq!(
            store.rows,
            vec![
                MeasurementRecord::sweep(A, -48, 0, 840_000, 2000),
                sentinel(B, 840_000),
                MeasurementRecord::sweep(A, -48, 0, 845_000, 2000),
                MeasurementRecord::sweep(B, -70, 0, 845_000, 1000),
            ]
        );
    }

    #[test]
    fn capture_records_every_observation_until_the_budget_elapses() {
        let reader = SimulatedReader::scripted(vec![
            ScriptedRead::ok(vec![
                tag(A, -40)
                    .with_antenna(1)
                    .with_frequency(915_250)
                    .with_timestamp_millis(1_700_000_000_000)
                    .with_read_count(2),
                tag(A, -41),
            ]),
            ScriptedRead::ok(vec![tag("0102", -70)]),
        ]);
        let log = reader.event_log();
        let config = capture_config();
        let budget = config.duration;
        let bound = config.duration + config.dwell + config.settle;

        let mut controller = SweepController::new(reader, MemoryStore::default(), CancellationToken::new());
        let summary = controller.run_capture(&config).unwrap();
        let (_, store) = controller.into_parts();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert!(Duration::from_millis(summary.elapsed_ms) >= budget);
        assert!(Duration::from_millis(summary.elapsed_ms) < bound);
        assert!(log.reads() >= 2);
        assert_eq!(log.power_sets(), vec![3000]);

        assert_eq!(store.layout, Some(TableLayout::Capture));
        assert_eq!(store.rows.len(), 3);
        assert_eq!(
            store.rows[0],
            MeasurementRecord::sweep(A, -40, 0, 915_250, 3000).with_capture(CaptureDetails {
                antenna: 1,
                timestamp_secs: 1_700_000_000,
                read_count: 2,
                protocol: 0,
            })
        );
        assert_eq!(store.rows[1].rssi, -41);
        assert_eq!(store.rows[2].epc, "0102");
    }

    #[test]
    fn cancelled_capture_issues_no_reads() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let reader = SimulatedReader::scripted(vec![]);
        let log = reader.event_log();

        let mut controller = SweepController::new(reader, MemoryStore::default(), cancel);
        let summary = controller.run_capture(&capture_config()).unwrap();
        assert!(summary.cancelled());
        assert_eq!(log.reads(), 0);
        assert!(log.disconnected());
    }

    #[test]
    fn capture_rows_carry_the_power_the_reader_applied() {
        let reader = SimulatedReader::new(Scenario {
            max_read_power: Some(2500),
            tags: vec![TagRule::new(A, -55)],
            ..Scenario::default()
        })
        .unwrap();
        let log = reader.event_log();
        let config = capture_config();
        assert_eq!(config.power(), 3000);

        let mut controller = SweepController::new(reader, MemoryStore::default(), CancellationToken::new());
        let summary = controller.run_capture(&config).unwrap();
        let (_, store) = controller.into_parts();

        assert_eq!(log.power_sets(), vec![3000]);
        assert!(summary.rows_written >= 1);
        assert!(store.rows.iter().all(|row| row.power == 2500));
    }
}
