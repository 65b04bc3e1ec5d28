//! C6 — Frame Pipeline: the hard subsystem (spec section 4.6). A single
//! cooperatively-scheduled worker that owns the sensor transport and the
//! CCI control channel, running the frame cycle and the CCI
//! sub-state-machine described there.
//!
//! Rendering, JPEG encoding, and SD-card filesystem access are excluded
//! from this core (spec section 1) and presented here only as the narrow
//! [`DisplaySink`]/[`FileSaveSink`] interfaces a platform wires up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::metadata::{FileMetadata, MetadataSource};
use crate::notifier::{MailboxHandle, PipelineBits};
use crate::output_state::{OutputState, RegionRect};
use crate::t1c_port::{CalKind, CciStatus, FeatureQuery, FeatureResult, RawFrame, T1cPort, tpd_param};
use crate::tau::CorrectionTable;
use crate::types::{EnvSnapshot, FrameBody, FrameSlot, MinMaxSnapshot, ParamGroup, ParamWrite, RegionSnapshot, SpotSnapshot};

pub const FRAME_PERIOD: Duration = Duration::from_millis(40); // 25 Hz, spec section 4.6.1

/// Feature-query/param-write steps of the CCI bus (spec section 4.6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CciState {
    Idle,
    SpotRequest,
    SpotWait,
    MinMaxRequest,
    MinMaxWait,
    RegionRequest,
    RegionWait,
    ParamIssue,
    ParamWait,
}

/// Targets mutated by command handlers (C7) and consumed by C6 the next
/// time it enters the matching `*Request` state (spec section 4.6.6,
/// "set-location before the next feature query").
pub struct FeatureTargets {
    pub spot: Mutex<(u16, u16)>,
    pub region: Mutex<RegionRect>,
}

impl FeatureTargets {
    pub fn new() -> Self {
        Self {
            spot: Mutex::new((0, 0)),
            region: Mutex::new(RegionRect::default()),
        }
    }
}

impl Default for FeatureTargets {
    fn default() -> Self {
        Self::new()
    }
}

/// Narrow interface a display/renderer collaborator presents (spec
/// section 1 excludes the renderer itself).
pub trait DisplaySink: Send {
    fn on_frame(&mut self, body: &FrameBody);
}

/// Narrow interface a file-save collaborator presents (JPEG encoding and
/// filesystem access are excluded, spec section 1).
pub trait FileSaveSink: Send {
    fn on_file_frame(&mut self, body: &FrameBody, meta: &FileMetadata);
}

/// Logs instead of rendering; used for `--mock` runs and tests.
pub struct LoggingDisplaySink;
impl DisplaySink for LoggingDisplaySink {
    fn on_frame(&mut self, body: &FrameBody) {
        info!(y16_min = body.y16_min, y16_max = body.y16_max, "frame committed for display");
    }
}

pub struct LoggingFileSaveSink;
impl FileSaveSink for LoggingFileSaveSink {
    fn on_file_frame(&mut self, _body: &FrameBody, meta: &FileMetadata) {
        info!(lines = meta.annotation_lines.len(), "frame committed for file-save");
    }
}

pub struct FramePipeline {
    port: Box<dyn T1cPort>,
    output: Arc<Mutex<OutputState>>,
    env_slot: Arc<crate::env_sampler::EnvSlot>,
    targets: Arc<FeatureTargets>,

    display_slots: [Arc<FrameSlot>; 2],
    file_slot: Arc<FrameSlot>,
    ping: usize,

    param_rx: crossbeam_channel::Receiver<ParamWrite>,
    param_tx: crossbeam_channel::Sender<ParamWrite>,

    self_mailbox: MailboxHandle,
    display_mailboxes: [MailboxHandle; 2],
    file_mailbox: MailboxHandle,

    display_sink: Box<dyn DisplaySink>,
    file_sink: Box<dyn FileSaveSink>,
    metadata_source: MetadataSource,

    low_table: CorrectionTable,
    high_table: CorrectionTable,

    stream_enabled: Arc<std::sync::atomic::AtomicBool>,
    web_outbound: Option<crossbeam_channel::Sender<Vec<u8>>>,

    cci: CciState,
    cal_latch: bool,
    in_flight_param: Option<ParamWrite>,
    last_written: HashMap<(ParamGroup, u16), u16>,
    last_ta_c: Option<f32>,
    last_distance_m: Option<f32>,
    last_high_gain: Option<bool>,

    spot_snapshot: SpotSnapshot,
    min_max_snapshot: MinMaxSnapshot,
    region_snapshot: RegionSnapshot,

    file_wants_image: bool,
}

#[allow(clippy::too_many_arguments)]
impl FramePipeline {
    pub fn new(
        port: Box<dyn T1cPort>,
        output: Arc<Mutex<OutputState>>,
        env_slot: Arc<crate::env_sampler::EnvSlot>,
        targets: Arc<FeatureTargets>,
        display_slots: [Arc<FrameSlot>; 2],
        file_slot: Arc<FrameSlot>,
        param_rx: crossbeam_channel::Receiver<ParamWrite>,
        param_tx: crossbeam_channel::Sender<ParamWrite>,
        self_mailbox: MailboxHandle,
        display_mailboxes: [MailboxHandle; 2],
        file_mailbox: MailboxHandle,
        display_sink: Box<dyn DisplaySink>,
        file_sink: Box<dyn FileSaveSink>,
        metadata_source: MetadataSource,
        low_table: CorrectionTable,
        high_table: CorrectionTable,
        stream_enabled: Arc<std::sync::atomic::AtomicBool>,
        web_outbound: Option<crossbeam_channel::Sender<Vec<u8>>>,
    ) -> Self {
        Self {
            port,
            output,
            env_slot,
            targets,
            display_slots,
            file_slot,
            ping: 0,
            param_rx,
            param_tx,
            self_mailbox,
            display_mailboxes,
            file_mailbox,
            display_sink,
            file_sink,
            metadata_source,
            low_table,
            high_table,
            stream_enabled,
            web_outbound,
            cci: CciState::Idle,
            cal_latch: false,
            in_flight_param: None,
            last_written: HashMap::new(),
            last_ta_c: None,
            last_distance_m: None,
            last_high_gain: None,
            spot_snapshot: SpotSnapshot::default(),
            min_max_snapshot: MinMaxSnapshot::default(),
            region_snapshot: RegionSnapshot::default(),
            file_wants_image: false,
        }
    }

    fn table_for(&self, high_gain: bool) -> &CorrectionTable {
        if high_gain { &self.high_table } else { &self.low_table }
    }

    /// Enqueue a group/id write only if it differs from the last value
    /// this worker itself wrote (spec section 4.6.4, "avoiding bus churn").
    fn enqueue_if_changed(&mut self, group: ParamGroup, id: u16, value: u16) {
        if self.last_written.get(&(group, id)) == Some(&value) {
            return;
        }
        let _ = self.param_tx.send(ParamWrite { group, id, value });
    }

    /// spec section 4.6.4: recompute ta/tu/distance/tau whenever any of
    /// their inputs could have changed, and keep the emissivity and gain
    /// TPD parameters in sync with `OutputState`.
    fn recompute_tau_management(&mut self) {
        let env = self.env_slot.read();
        let (use_auto_ambient, refl_equals_ambient, atmospheric_temp_c, distance_cm, reflected_temp_c, high_gain, emissivity_pct) = {
            let out = self.output.lock();
            (
                out.use_auto_ambient,
                out.refl_equals_ambient,
                out.atmospheric_temp_c,
                out.distance_cm,
                out.reflected_temp_c,
                out.high_gain,
                out.emissivity_pct,
            )
        };

        let ta = if use_auto_ambient && env.ambient_valid {
            env.ambient_temp_c
        } else {
            atmospheric_temp_c as f32
        };
        let tu = if !refl_equals_ambient { reflected_temp_c as f32 } else { ta };
        let distance_m = if use_auto_ambient && env.distance_valid {
            env.distance_m
        } else {
            distance_cm as f32 / 100.0
        };

        let ta_changed = self.last_ta_c != Some(ta);
        let distance_changed = self.last_distance_m != Some(distance_m);
        let gain_changed = self.last_high_gain != Some(high_gain);

        self.enqueue_if_changed(ParamGroup::Tpd, tpd_param::ATMOSPHERIC_TEMP, encode_temp_x10(ta));
        self.enqueue_if_changed(ParamGroup::Tpd, tpd_param::REFLECTED_TEMP, encode_temp_x10(tu));
        self.enqueue_if_changed(ParamGroup::Tpd, tpd_param::DISTANCE, (distance_m * 100.0).round() as u16);
        self.enqueue_if_changed(ParamGroup::Tpd, tpd_param::EMISSIVITY, emissivity_pct as u16);

        if gain_changed {
            self.last_high_gain = Some(high_gain);
            self.enqueue_if_changed(ParamGroup::Tpd, tpd_param::GAIN, high_gain as u16);
        }

        if ta_changed || distance_changed || gain_changed {
            self.last_ta_c = Some(ta);
            self.last_distance_m = Some(distance_m);
            // Both gain tables are already resident; a gain change just
            // switches which one `table_for` reads, no reload step needed.
            let tau = self.table_for(high_gain).estimate(ta, distance_m, 0);
            self.enqueue_if_changed(ParamGroup::Tpd, tpd_param::TAU, tau as u16);
        }
    }

    fn apply_notifications(&mut self, bits: u32) {
        // Config-updated recomputes before anything that reads config
        // (spec section 4.6.6).
        if bits & PipelineBits::CONFIG_UPDATED.bits() != 0 {
            self.recompute_tau_management();
        }
        if bits & (PipelineBits::ENV_UPDATED | PipelineBits::NEW_AMBIENT | PipelineBits::NEW_DISTANCE).bits() != 0 {
            self.recompute_tau_management();
        }
        if bits & PipelineBits::MANUAL_FFC.bits() != 0 {
            if let Err(e) = self.port.force_ffc() {
                warn!(error = %e, "manual FFC failed");
            }
        }
        if bits & PipelineBits::RESTORE_DEFAULTS.bits() != 0 {
            self.run_restore_defaults();
        }
        if bits & PipelineBits::CAL_1PT.bits() != 0 {
            self.run_one_point_cal();
        }
        if bits & PipelineBits::CAL_2PT_LOW.bits() != 0 {
            self.run_two_point_cal_low();
        }
        if bits & PipelineBits::CAL_2PT_HIGH.bits() != 0 {
            self.run_two_point_cal_high();
        }
        if bits & PipelineBits::FILE_WANTS_IMAGE.bits() != 0 {
            // Latched for the next frame cycle (spec section 4.6.6).
            self.file_wants_image = true;
        }
        // SET_SPOT_LOCATION / SET_REGION_LOCATION require no action here:
        // the target is already in `self.targets`, read fresh the next
        // time the state machine enters the matching Request state.
    }

    fn run_restore_defaults(&mut self) {
        if let Err(e) = self.port.restore_defaults() {
            error!(error = %e, "restore-defaults failed");
        }
        self.last_written.clear();
    }

    fn run_one_point_cal(&mut self) {
        let bb_temp_k = {
            let out = self.output.lock();
            out.atmospheric_temp_c as f32 + 273.15
        };
        self.port.restore_defaults().ok();
        {
            let mut out = self.output.lock();
            out.auto_ffc = false;
        }
        if let Err(e) = self.port.force_ffc() {
            warn!(error = %e, "forced FFC before one-point cal failed");
        }
        let result = self.port.calibrate(CalKind::OnePt, bb_temp_k);
        {
            let mut out = self.output.lock();
            out.auto_ffc = true;
        }
        if let Err(e) = result {
            error!(error = %e, "one-point calibration failed, restoring TPD defaults");
            self.port.restore_defaults().ok();
        }
    }

    fn run_two_point_cal_low(&mut self) {
        let bb_temp_k = {
            let out = self.output.lock();
            out.atmospheric_temp_c as f32 + 273.15
        };
        {
            let mut out = self.output.lock();
            out.auto_ffc = false;
        }
        self.port.force_ffc().ok();
        if let Err(e) = self.port.calibrate(CalKind::TwoPtLow, bb_temp_k) {
            error!(error = %e, "two-point cal (low) failed, restoring TPD defaults");
            self.port.restore_defaults().ok();
            let mut out = self.output.lock();
            out.auto_ffc = true;
            return;
        }
        // Latch: blocks subsequent TPD parameter writes until the high
        // half completes (spec section 4.6.5).
        self.cal_latch = true;
    }

    fn run_two_point_cal_high(&mut self) {
        let bb_temp_k = {
            let out = self.output.lock();
            out.atmospheric_temp_c as f32 + 273.15
        };
        let result = self.port.calibrate(CalKind::TwoPtHigh, bb_temp_k);
        self.cal_latch = false;
        {
            let mut out = self.output.lock();
            out.auto_ffc = true;
        }
        if let Err(e) = result {
            error!(error = %e, "two-point cal (high) failed, restoring TPD defaults");
            self.port.restore_defaults().ok();
        }
    }

    /// One full frame cycle (spec section 4.6.2).
    fn cycle(&mut self) -> Result<()> {
        let mut raw = RawFrame::new();
        self.port.read_frame(&mut raw)?;

        // y16 min/max tracking is independent of the feature-query
        // min/max (spec section 4.6.7): computed fresh every frame from
        // the raw plane, never fed by CCI results.
        let (y16_min, y16_max) = raw
            .pixels
            .iter()
            .fold((u16::MAX, u16::MIN), |(lo, hi), &p| (lo.min(p), hi.max(p)));

        let env = env_snapshot(&self.env_slot.read());
        let body = FrameBody {
            pixels: Arc::new(raw.pixels),
            y16_min,
            y16_max,
            high_gain: raw.high_gain,
            frozen: raw.frozen,
            env,
            spot: self.spot_snapshot,
            min_max: self.min_max_snapshot,
            region: self.region_snapshot,
        };

        let slot = &self.display_slots[self.ping];
        slot.commit(body.clone());
        self.display_mailboxes[self.ping].post(crate::notifier::ConsumerBits::NEW_FRAME.bits());
        self.ping = 1 - self.ping;

        // Stream-start scenario (spec section 8): once streaming is
        // enabled, every frame cycle emits a {set, image, binary} packet
        // to the web consumer.
        if self.stream_enabled.load(std::sync::atomic::Ordering::Relaxed) {
            if let Some(tx) = &self.web_outbound {
                crate::transport::try_send(tx, crate::transport::encode_image_packet(&body));
            }
        }

        if self.file_wants_image {
            self.file_wants_image = false;
            let meta = self.metadata_source.snapshot_from_body(&body);
            self.file_slot.commit(body.clone());
            self.file_sink.on_file_frame(&body, &meta);
            self.file_mailbox.post(crate::notifier::ConsumerBits::NEW_FRAME.bits());
        }
        self.display_sink.on_frame(&body);

        self.step_cci();
        Ok(())
    }

    /// Whether spot/region feature queries are currently enabled, read
    /// fresh each time Idle decides the next Request state.
    fn features_enabled(&self) -> (bool, bool) {
        let out = self.output.lock();
        (out.spot_on, out.region_on)
    }

    fn next_after_idle(&self) -> CciState {
        let (spot_on, region_on) = self.features_enabled();
        if spot_on {
            CciState::SpotRequest
        } else if region_on {
            CciState::RegionRequest
        } else {
            CciState::ParamIssue
        }
    }

    fn next_after_spot(&self) -> CciState {
        let (_, region_on) = self.features_enabled();
        if region_on { CciState::RegionRequest } else { CciState::ParamIssue }
    }

    /// Advance the CCI sub-state machine exactly one step (spec section
    /// 4.6.3).
    fn step_cci(&mut self) {
        match self.cci {
            CciState::Idle => {
                self.cci = self.next_after_idle();
            }
            CciState::SpotRequest => {
                let (x, y) = *self.targets.spot.lock();
                if let Err(e) = self.port.issue_query(FeatureQuery::Spot { x, y }) {
                    warn!(error = %e, "spot feature query issue failed");
                }
                self.cci = CciState::SpotWait;
            }
            CciState::SpotWait => {
                self.cci = self.poll_feature_wait(|p, f| {
                    if let FeatureResult::Spot(s) = f {
                        p.spot_snapshot = SpotSnapshot { x: s.x, y: s.y, temp_c_x10: s.temp_c_x10, valid: true };
                    }
                }, |p| p.spot_snapshot.valid = false, self.next_after_spot());
            }
            CciState::MinMaxRequest => {
                if let Err(e) = self.port.issue_query(FeatureQuery::MinMax) {
                    warn!(error = %e, "min/max feature query issue failed");
                }
                self.cci = CciState::MinMaxWait;
            }
            CciState::MinMaxWait => {
                self.cci = self.poll_feature_wait(|p, f| {
                    if let FeatureResult::MinMax(m) = f {
                        p.min_max_snapshot = MinMaxSnapshot {
                            min_temp_c_x10: m.min_temp_c_x10,
                            min_x: m.min_x,
                            min_y: m.min_y,
                            max_temp_c_x10: m.max_temp_c_x10,
                            max_x: m.max_x,
                            max_y: m.max_y,
                            valid: true,
                        };
                    }
                }, |p| p.min_max_snapshot.valid = false, CciState::ParamIssue);
            }
            CciState::RegionRequest => {
                let rect = *self.targets.region.lock();
                if let Err(e) = self.port.issue_query(FeatureQuery::Region {
                    x: rect.x,
                    y: rect.y,
                    w: rect.w,
                    h: rect.h,
                }) {
                    warn!(error = %e, "region feature query issue failed");
                }
                self.cci = CciState::RegionWait;
            }
            CciState::RegionWait => {
                let rect = *self.targets.region.lock();
                self.cci = self.poll_feature_wait(|p, f| {
                    if let FeatureResult::Region(r) = f {
                        p.region_snapshot = RegionSnapshot {
                            rect,
                            min_temp_c_x10: r.min_temp_c_x10,
                            max_temp_c_x10: r.max_temp_c_x10,
                            avg_temp_c_x10: r.avg_temp_c_x10,
                            valid: true,
                        };
                    }
                }, |p| p.region_snapshot.valid = false, CciState::ParamIssue);
            }
            CciState::ParamIssue => {
                if self.cal_latch {
                    self.cci = CciState::Idle;
                    return;
                }
                match self.param_rx.try_recv() {
                    Ok(write) => {
                        if let Err(e) = self.port.set_param(write.group, write.id, write.value) {
                            warn!(error = %e, "CCI param write failed");
                        }
                        self.in_flight_param = Some(write);
                        self.cci = CciState::ParamWait;
                    }
                    Err(_) => {
                        self.cci = CciState::Idle;
                    }
                }
            }
            CciState::ParamWait => {
                match self.port.poll_ready() {
                    Ok(CciStatus::Busy) => {}
                    Ok(_) => {
                        if let Some(write) = self.in_flight_param.take() {
                            self.last_written.insert((write.group, write.id), write.value);
                        }
                        self.cci = CciState::Idle;
                    }
                    Err(e) => {
                        warn!(error = %e, "CCI poll failed during param wait");
                        self.in_flight_param = None;
                        self.cci = CciState::Idle;
                    }
                }
            }
        }
    }

    /// Shared busy/idle-pass/idle-error handling for the three `*Wait`
    /// states (spec section 4.6.3).
    fn poll_feature_wait(
        &mut self,
        on_pass: impl FnOnce(&mut Self, FeatureResult),
        on_error: impl FnOnce(&mut Self),
        next: CciState,
    ) -> CciState {
        match self.port.poll_ready() {
            Ok(CciStatus::Busy) => self.cci,
            Ok(CciStatus::IdlePass) => match self.port.fetch() {
                Ok(result) => {
                    on_pass(self, result);
                    next
                }
                Err(e) => {
                    warn!(error = %e, "feature result fetch failed");
                    on_error(self);
                    next
                }
            },
            Ok(CciStatus::IdleError) => {
                warn!("feature query reported idle-error");
                on_error(self);
                next
            }
            Err(e) => {
                warn!(error = %e, "CCI poll failed during feature wait");
                on_error(self);
                next
            }
        }
    }
}

fn encode_temp_x10(temp_c: f32) -> u16 {
    (temp_c * 10.0).round() as i16 as u16
}

fn env_snapshot(sample: &crate::env_sampler::EnvSample) -> EnvSnapshot {
    EnvSnapshot {
        ambient_temp_c: sample.ambient_temp_c,
        ambient_valid: sample.ambient_valid,
        humidity_pct: sample.humidity_pct,
        humidity_valid: sample.humidity_valid,
        distance_m: sample.distance_m,
        distance_valid: sample.distance_valid,
    }
}

/// Runs `pipeline`'s frame cycle on a fixed 1/FPS cadence, correcting for
/// drift against an absolute schedule (spec section 4.6.1), until the
/// self mailbox receives [`PipelineBits::SHUTDOWN`].
pub fn run(mut pipeline: FramePipeline) {
    let mut next_tick = Instant::now();
    loop {
        let bits = pipeline.self_mailbox.try_wait();
        if bits & PipelineBits::SHUTDOWN.bits() != 0 {
            info!("frame pipeline shutting down");
            return;
        }
        pipeline.apply_notifications(bits);

        if let Err(e) = pipeline.cycle() {
            error!(error = %e, "frame cycle failed");
        }

        next_tick += FRAME_PERIOD;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::ConfigStore;
    use crate::metadata::MetadataSource;
    use crate::notifier::Notifier;
    use crate::t1c_port::MockT1cPort;
    use crate::tau::Gain;

    fn uniform_table(gain: Gain) -> CorrectionTable {
        CorrectionTable::from_raw_for_test(gain, vec![32767u16; t1c_comms::correction::TABLE_LEN])
    }

    fn test_pipeline() -> (FramePipeline, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path(), [1, 2, 3, 4, 5, 6]);
        store.init().unwrap();
        let output = Arc::new(Mutex::new(OutputState::init(&store)));

        let notifier: Notifier<&'static str> = Notifier::new();
        let (tx, rx) = crossbeam_channel::unbounded();

        let pipeline = FramePipeline::new(
            Box::new(MockT1cPort::new()),
            output.clone(),
            Arc::new(crate::env_sampler::EnvSlot::new()),
            Arc::new(FeatureTargets::new()),
            [Arc::new(FrameSlot::new()), Arc::new(FrameSlot::new())],
            Arc::new(FrameSlot::new()),
            rx,
            tx,
            notifier.mailbox("pipeline"),
            [notifier.mailbox("display0"), notifier.mailbox("display1")],
            notifier.mailbox("file"),
            Box::new(LoggingDisplaySink),
            Box::new(LoggingFileSaveSink),
            MetadataSource::new(output, "mock-1.0".into(), "MOCK0000".into()),
            uniform_table(Gain::Low),
            uniform_table(Gain::High),
            Arc::new(std::sync::atomic::AtomicBool::new(false)),
            None,
        );
        (pipeline, dir)
    }

    #[test]
    fn single_cycle_commits_a_display_frame() {
        let (mut pipeline, _d) = test_pipeline();
        pipeline.cycle().unwrap();
        let body = pipeline.display_slots[1].read(); // ping advanced past slot 0
        assert!(body.y16_max >= body.y16_min);
    }

    #[test]
    fn idle_moves_to_param_issue_when_no_features_enabled() {
        let (mut pipeline, _d) = test_pipeline();
        assert_eq!(pipeline.cci, CciState::Idle);
        pipeline.step_cci();
        assert_eq!(pipeline.cci, CciState::ParamIssue);
    }

    #[test]
    fn spot_enabled_routes_through_spot_states_first() {
        let (mut pipeline, _d) = test_pipeline();
        pipeline.output.lock().spot_on = true;
        pipeline.step_cci();
        assert_eq!(pipeline.cci, CciState::SpotRequest);
        pipeline.step_cci();
        assert_eq!(pipeline.cci, CciState::SpotWait);
    }

    #[test]
    fn param_write_idempotence_only_one_bus_transaction() {
        // Parameter write idempotence (spec section 8): enqueuing the same
        // write twice yields exactly one transaction (the second is
        // suppressed by `enqueue_if_changed`'s cache).
        let (mut pipeline, _d) = test_pipeline();
        pipeline.enqueue_if_changed(ParamGroup::Tpd, tpd_param::GAIN, 1);
        pipeline.enqueue_if_changed(ParamGroup::Tpd, tpd_param::GAIN, 1);
        assert_eq!(pipeline.param_rx.len(), 1);
    }

    #[test]
    fn two_point_cal_latch_blocks_tpd_writes_until_high_half() {
        let (mut pipeline, _d) = test_pipeline();
        pipeline.param_tx.send(ParamWrite { group: ParamGroup::Tpd, id: tpd_param::TAU, value: 5 }).unwrap();
        pipeline.run_two_point_cal_low();
        assert!(pipeline.cal_latch);
        pipeline.cci = CciState::ParamIssue;
        pipeline.step_cci();
        assert_eq!(pipeline.cci, CciState::Idle, "latch must send ParamIssue straight back to Idle");
        pipeline.run_two_point_cal_high();
        assert!(!pipeline.cal_latch);
    }

    #[test]
    fn y16_min_max_are_independent_of_feature_min_max() {
        let (mut pipeline, _d) = test_pipeline();
        pipeline.min_max_snapshot = MinMaxSnapshot {
            min_temp_c_x10: 999,
            max_temp_c_x10: 999,
            valid: true,
            ..Default::default()
        };
        pipeline.cycle().unwrap();
        let body = pipeline.display_slots[1].read();
        // The feature min/max snapshot is carried through unchanged,
        // while y16_min/y16_max come fresh from the raw plane.
        assert_eq!(body.min_max.min_temp_c_x10, 999);
        assert_ne!(body.y16_min, 999);
    }
}
