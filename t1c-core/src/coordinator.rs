//! C11 — Coordinator: boots components in the fixed order spec section
//! 4.11 gives, wires notifications, and owns the fault path. Failure at
//! any stage sets a fault code on the host-UX collaborator and halts the
//! coordinator loop; workers already started are left running (spec
//! section 4.11) — this core never tears other workers down on a partial
//! boot failure, since a torn-down sensor link mid-stream is worse than
//! a degraded one.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info};

use t1c_comms::catalog::CommandId;
use t1c_comms::config_record::ConfigKind;
use t1c_comms::packet::PayloadType;
use t1c_comms::payloads::{AmbientCorrectionPayload, ControlActivityPayload, ShutterPayload};

use crate::command_bus::CommandBus;
use crate::config_store::{ConfigStore, ConfigValue};
use crate::env_sampler::{self, EnvSlot};
use crate::error::{Result, T1cError};
use crate::frame_pipeline::{self, FeatureTargets, FramePipeline, LoggingDisplaySink, LoggingFileSaveSink};
use crate::metadata::MetadataSource;
use crate::notifier::{Notifier, PipelineBits};
use crate::output_state::OutputState;
use crate::t1c_port::{MockT1cPort, SerialT1cPort, T1cPort};
use crate::tau::{CorrectionTable, Gain};
use crate::transport::{self, RemoteTransport};

/// Which worker a named mailbox belongs to; keys the shared [`Notifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Worker {
    Pipeline,
    EnvSampler,
    Display0,
    Display1,
    FileSave,
}

/// Narrow interface the battery/LED UX state machine presents for fault
/// reporting (spec section 1 excludes its own implementation).
pub trait HostUx: Send {
    fn on_fault(&mut self, message: &str);
}

pub struct LoggingHostUx;
impl HostUx for LoggingHostUx {
    fn on_fault(&mut self, message: &str) {
        error!(%message, "fault code raised on host-UX collaborator");
    }
}

/// Narrow interface WiFi/mDNS bring-up presents (spec section 1 excludes
/// the bring-up itself).
pub trait WifiBringup: Send {
    fn bring_up(&mut self, net: &t1c_comms::config_record::NetworkRecord) -> Result<()>;
}

pub struct NoopWifiBringup;
impl WifiBringup for NoopWifiBringup {
    fn bring_up(&mut self, _net: &t1c_comms::config_record::NetworkRecord) -> Result<()> {
        Ok(())
    }
}

pub struct CoreConfig {
    pub config_dir: PathBuf,
    pub mac: [u8; 6],
    pub mock: bool,
    pub serial_device: String,
    pub serial_baud: u32,
    pub ws_addr: Option<SocketAddr>,
    pub firmware_version: String,
}

pub struct Coordinator {
    config: CoreConfig,
    host_ux: Box<dyn HostUx>,
    wifi: Box<dyn WifiBringup>,
}

impl Coordinator {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            host_ux: Box::new(LoggingHostUx),
            wifi: Box::new(NoopWifiBringup),
        }
    }

    pub fn with_host_ux(mut self, host_ux: Box<dyn HostUx>) -> Self {
        self.host_ux = host_ux;
        self
    }

    pub fn with_wifi(mut self, wifi: Box<dyn WifiBringup>) -> Self {
        self.wifi = wifi;
        self
    }

    /// Run the boot sequence and block until the process receives a
    /// shutdown signal. On a boot failure, reports the fault and returns
    /// the error; any workers already spawned keep running in the
    /// background (spec section 4.11).
    pub fn run(mut self) -> Result<()> {
        let store = ConfigStore::new(self.config.config_dir.clone(), self.config.mac);
        if let Err(e) = store.init() {
            self.host_ux.on_fault(&format!("config store init failed: {e}"));
            return Err(e);
        }
        info!("config store initialised");

        let output = Arc::new(Mutex::new(OutputState::init(&store)));
        let store = Arc::new(store);

        if let ConfigValue::Network(net) = store.get(ConfigKind::Network) {
            if net.wifi.sta_mode {
                if let Err(e) = self.wifi.bring_up(&net) {
                    self.host_ux.on_fault(&format!("wifi bring-up failed: {e}"));
                    // Non-fatal: spec section 4.11 says WiFi is optional.
                }
            }
        }

        let mut port: Box<dyn T1cPort> = if self.config.mock {
            Box::new(MockT1cPort::new())
        } else {
            match SerialT1cPort::open(&self.config.serial_device, self.config.serial_baud) {
                Ok(p) => Box::new(p),
                Err(e) => {
                    self.host_ux.on_fault(&format!("serial port open failed: {e}"));
                    return Err(e);
                }
            }
        };
        if let Err(e) = port.boot() {
            self.host_ux.on_fault(&format!("sensor boot failed: {e}"));
            return Err(e);
        }
        info!("sensor transport booted");

        let low_table = CorrectionTable::read_table(Gain::Low, &self.config.config_dir).map_err(|e| {
            self.host_ux.on_fault(&format!("low-gain correction table unavailable: {e}"));
            e
        })?;
        let high_table = CorrectionTable::read_table(Gain::High, &self.config.config_dir).map_err(|e| {
            self.host_ux.on_fault(&format!("high-gain correction table unavailable: {e}"));
            e
        })?;

        let notifier: Notifier<Worker> = Notifier::new();
        let pipeline_mb = notifier.mailbox(Worker::Pipeline);
        let env_mb = notifier.mailbox(Worker::EnvSampler);
        let display_mbs = [notifier.mailbox(Worker::Display0), notifier.mailbox(Worker::Display1)];
        let file_mb = notifier.mailbox(Worker::FileSave);

        let env_slot = Arc::new(EnvSlot::new());
        let targets = Arc::new(FeatureTargets::new());
        let display_slots = [Arc::new(crate::types::FrameSlot::new()), Arc::new(crate::types::FrameSlot::new())];
        let file_slot = Arc::new(crate::types::FrameSlot::new());
        let (param_tx, param_rx) = crossbeam_channel::unbounded();

        let stream_enabled = Arc::new(AtomicBool::new(false));
        let (web_tx, web_rx) = transport::outbound_queue();

        let bus: Arc<CommandBus> = if let Some(addr) = self.config.ws_addr {
            Arc::new(CommandBus::init_remote(web_tx.clone()))
        } else {
            Arc::new(CommandBus::init_local())
        };
        register_handlers(&bus, output.clone(), store.clone(), targets.clone(), pipeline_mb.clone(), stream_enabled.clone());

        let metadata_source = MetadataSource::new(output.clone(), self.config.firmware_version.clone(), port.serial());

        // C5 first.
        let sensor_thread = {
            let env_slot = env_slot.clone();
            let pipeline_mb = pipeline_mb.clone();
            std::thread::Builder::new()
                .name("t1c-env-sampler".into())
                .spawn(move || env_sampler::run(None, None, env_slot, env_mb, pipeline_mb))
                .expect("failed to spawn environment sampler thread")
        };

        // Then C6.
        let pipeline = FramePipeline::new(
            port,
            output.clone(),
            env_slot,
            targets,
            display_slots,
            file_slot,
            param_rx,
            param_tx,
            pipeline_mb.clone(),
            display_mbs,
            file_mb,
            Box::new(LoggingDisplaySink),
            Box::new(LoggingFileSaveSink),
            metadata_source,
            low_table,
            high_table,
            stream_enabled,
            Some(web_tx),
        );
        let pipeline_thread = std::thread::Builder::new()
            .name("t1c-frame-pipeline".into())
            .spawn(move || frame_pipeline::run(pipeline))
            .expect("failed to spawn frame pipeline thread");

        // Then the platform consumer (web, since display rendering is
        // excluded from this core).
        let remote = self.config.ws_addr.map(|addr| RemoteTransport::spawn(addr, bus, web_rx));

        // File-save is represented by the narrow sink C6 already calls
        // directly; no separate worker to spawn here (see DESIGN.md).

        info!("coordinator boot sequence complete");
        let _ = sensor_thread.join();
        let _ = pipeline_thread.join();
        if let Some(remote) = remote {
            remote.shutdown();
        }
        Ok(())
    }
}

/// Wires every command this core handles onto `bus`. Kept `pub` (rather
/// than an unexported implementation detail) so integration tests can
/// register the real handlers instead of re-implementing a subset.
pub fn register_handlers(
    bus: &CommandBus,
    output: Arc<Mutex<OutputState>>,
    store: Arc<ConfigStore>,
    targets: Arc<FeatureTargets>,
    pipeline_mb: crate::notifier::MailboxHandle,
    stream_enabled: Arc<AtomicBool>,
) {
    {
        let stream_enabled_set = stream_enabled.clone();
        let stream_enabled_get = stream_enabled.clone();
        bus.register(
            CommandId::StreamEn,
            Some(Box::new(move |_id| {
                let v = stream_enabled_get.load(std::sync::atomic::Ordering::Relaxed) as i32;
                Ok((PayloadType::I32, v.to_be_bytes().to_vec()))
            })),
            Some(Box::new(move |_id, payload| {
                let v = decode_i32(payload)?;
                stream_enabled_set.store(v != 0, std::sync::atomic::Ordering::Relaxed);
                Ok(())
            })),
            None,
        );
    }

    {
        let output = output.clone();
        let store = store.clone();
        let pipeline_mb = pipeline_mb.clone();
        bus.register(
            CommandId::Emissivity,
            Some(Box::new({
                let output = output.clone();
                move |_id| {
                    let v = output.lock().emissivity_pct as i32;
                    Ok((PayloadType::I32, v.to_be_bytes().to_vec()))
                }
            })),
            Some(Box::new(move |_id, payload| {
                let v = decode_i32(payload)?;
                let mut out = output.lock();
                out.emissivity_pct = v as u32;
                out.save(&store, Some(&pipeline_mb))?;
                Ok(())
            })),
            None,
        );
    }

    {
        let output = output.clone();
        let store = store.clone();
        let pipeline_mb = pipeline_mb.clone();
        bus.register(
            CommandId::Gain,
            Some(Box::new({
                let output = output.clone();
                move |_id| {
                    let v = output.lock().high_gain as i32;
                    Ok((PayloadType::I32, v.to_be_bytes().to_vec()))
                }
            })),
            Some(Box::new(move |_id, payload| {
                let v = decode_i32(payload)?;
                let mut out = output.lock();
                out.high_gain = v != 0;
                out.save(&store, Some(&pipeline_mb))?;
                Ok(())
            })),
            None,
        );
    }

    {
        let output = output.clone();
        let store = store.clone();
        let pipeline_mb = pipeline_mb.clone();
        bus.register(
            CommandId::ShutterInfo,
            Some(Box::new({
                let output = output.clone();
                move |_id| {
                    let out = output.lock();
                    let p = ShutterPayload {
                        auto_ffc: out.auto_ffc,
                        temp_threshold_x10: out.ffc_delta_t_x10 as u32,
                        min_interval_s: out.ffc_min_interval_s,
                        max_interval_s: out.ffc_max_interval_s,
                    };
                    Ok((PayloadType::Binary, p.to_bytes().to_vec()))
                }
            })),
            Some(Box::new(move |_id, payload| {
                let p = ShutterPayload::from_bytes(payload)
                    .ok_or_else(|| T1cError::Other(anyhow::anyhow!("malformed shutter-info payload")))?;
                let mut out = output.lock();
                out.auto_ffc = p.auto_ffc;
                out.ffc_delta_t_x10 = p.temp_threshold_x10 as i32;
                out.ffc_min_interval_s = p.min_interval_s;
                out.ffc_max_interval_s = p.max_interval_s;
                out.save(&store, Some(&pipeline_mb))?;
                Ok(())
            })),
            None,
        );
    }

    {
        let output = output.clone();
        let store = store.clone();
        let pipeline_mb = pipeline_mb.clone();
        bus.register(
            CommandId::AmbientCorrect,
            Some(Box::new({
                let output = output.clone();
                move |_id| {
                    let out = output.lock();
                    let p = AmbientCorrectionPayload {
                        use_auto: out.use_auto_ambient,
                        refl_equals_ambient: out.refl_equals_ambient,
                        atmospheric_temp_c: out.atmospheric_temp_c,
                        distance_cm: out.distance_cm,
                        humidity_pct: out.humidity_pct,
                        reflected_temp_c: out.reflected_temp_c,
                    };
                    Ok((PayloadType::Binary, p.to_bytes().to_vec()))
                }
            })),
            Some(Box::new(move |_id, payload| {
                let p = AmbientCorrectionPayload::from_bytes(payload)
                    .ok_or_else(|| T1cError::Other(anyhow::anyhow!("malformed ambient-correct payload")))?;
                let mut out = output.lock();
                out.use_auto_ambient = p.use_auto;
                out.refl_equals_ambient = p.refl_equals_ambient;
                out.atmospheric_temp_c = p.atmospheric_temp_c;
                out.distance_cm = p.distance_cm;
                out.humidity_pct = p.humidity_pct;
                out.reflected_temp_c = p.reflected_temp_c;
                out.save(&store, Some(&pipeline_mb))?;
                Ok(())
            })),
            None,
        );
    }

    {
        let targets = targets.clone();
        let pipeline_mb = pipeline_mb.clone();
        bus.register(
            CommandId::SpotLoc,
            Some(Box::new({
                let targets = targets.clone();
                move |_id| {
                    let (x, y) = *targets.spot.lock();
                    let mut bytes = Vec::with_capacity(8);
                    bytes.extend_from_slice(&(x as u32).to_be_bytes());
                    bytes.extend_from_slice(&(y as u32).to_be_bytes());
                    Ok((PayloadType::Binary, bytes))
                }
            })),
            Some(Box::new(move |_id, payload| {
                if payload.len() != 8 {
                    return Err(T1cError::Other(anyhow::anyhow!("malformed spot-loc payload")));
                }
                let x = u32::from_be_bytes(payload[0..4].try_into().unwrap()) as u16;
                let y = u32::from_be_bytes(payload[4..8].try_into().unwrap()) as u16;
                *targets.spot.lock() = (x, y);
                pipeline_mb.post(PipelineBits::SET_SPOT_LOCATION.bits());
                Ok(())
            })),
            None,
        );
    }

    {
        let output = output.clone();
        let store = store.clone();
        bus.register(
            CommandId::SpotEn,
            Some(Box::new({
                let output = output.clone();
                move |_id| {
                    let v = output.lock().spot_on as i32;
                    Ok((PayloadType::I32, v.to_be_bytes().to_vec()))
                }
            })),
            Some(Box::new(move |_id, payload| {
                let v = decode_i32(payload)?;
                let mut out = output.lock();
                out.spot_on = v != 0;
                out.save(&store, None)?;
                Ok(())
            })),
            None,
        );
    }

    {
        let output = output.clone();
        let store = store.clone();
        bus.register(
            CommandId::RegionEn,
            Some(Box::new({
                let output = output.clone();
                move |_id| {
                    let v = output.lock().region_on as i32;
                    Ok((PayloadType::I32, v.to_be_bytes().to_vec()))
                }
            })),
            Some(Box::new(move |_id, payload| {
                let v = decode_i32(payload)?;
                let mut out = output.lock();
                out.region_on = v != 0;
                out.save(&store, None)?;
                Ok(())
            })),
            None,
        );
    }

    {
        let targets = targets.clone();
        let pipeline_mb = pipeline_mb.clone();
        bus.register(
            CommandId::RegionLoc,
            Some(Box::new({
                let targets = targets.clone();
                move |_id| {
                    let r = *targets.region.lock();
                    let mut bytes = Vec::with_capacity(16);
                    bytes.extend_from_slice(&(r.x as u32).to_be_bytes());
                    bytes.extend_from_slice(&(r.y as u32).to_be_bytes());
                    bytes.extend_from_slice(&(r.w as u32).to_be_bytes());
                    bytes.extend_from_slice(&(r.h as u32).to_be_bytes());
                    Ok((PayloadType::Binary, bytes))
                }
            })),
            Some(Box::new(move |_id, payload| {
                if payload.len() != 16 {
                    return Err(T1cError::Other(anyhow::anyhow!("malformed region-loc payload")));
                }
                let x = u32::from_be_bytes(payload[0..4].try_into().unwrap()) as u16;
                let y = u32::from_be_bytes(payload[4..8].try_into().unwrap()) as u16;
                let w = u32::from_be_bytes(payload[8..12].try_into().unwrap()) as u16;
                let h = u32::from_be_bytes(payload[12..16].try_into().unwrap()) as u16;
                *targets.region.lock() = crate::output_state::RegionRect { x, y, w, h };
                pipeline_mb.post(PipelineBits::SET_REGION_LOCATION.bits());
                Ok(())
            })),
            None,
        );
    }

    {
        let pipeline_mb = pipeline_mb.clone();
        bus.register(
            CommandId::Ffc,
            None,
            Some(Box::new(move |_id, _payload| {
                pipeline_mb.post(PipelineBits::MANUAL_FFC.bits());
                Ok(())
            })),
            None,
        );
    }

    {
        let pipeline_mb = pipeline_mb.clone();
        bus.register(
            CommandId::TakePicture,
            None,
            Some(Box::new(move |_id, _payload| {
                pipeline_mb.post(PipelineBits::FILE_WANTS_IMAGE.bits());
                Ok(())
            })),
            None,
        );
    }

    {
        let pipeline_mb = pipeline_mb.clone();
        bus.register(
            CommandId::CtrlActivity,
            None,
            Some(Box::new(move |_id, payload| {
                let p = ControlActivityPayload::from_bytes(payload)
                    .ok_or_else(|| T1cError::Other(anyhow::anyhow!("malformed ctrl-activity payload")))?;
                match t1c_comms::catalog::ControlActivity::from_i32(p.activity) {
                    Some(t1c_comms::catalog::ControlActivity::RestoreDefaults) => {
                        pipeline_mb.post(PipelineBits::RESTORE_DEFAULTS.bits());
                    }
                    Some(t1c_comms::catalog::ControlActivity::Cal1Pt) => {
                        pipeline_mb.post(PipelineBits::CAL_1PT.bits());
                    }
                    Some(t1c_comms::catalog::ControlActivity::Cal2PtLow) => {
                        pipeline_mb.post(PipelineBits::CAL_2PT_LOW.bits());
                    }
                    Some(t1c_comms::catalog::ControlActivity::Cal2PtHigh) => {
                        pipeline_mb.post(PipelineBits::CAL_2PT_HIGH.bits());
                    }
                    Some(t1c_comms::catalog::ControlActivity::SdFormat) | None => {
                        // SD formatting is owned by the excluded filesystem
                        // collaborator; nothing for this core to do.
                    }
                }
                Ok(())
            })),
            None,
        );
    }

}

fn decode_i32(payload: &[u8]) -> Result<i32> {
    let bytes: [u8; 4] = payload
        .try_into()
        .map_err(|_| T1cError::Other(anyhow::anyhow!("expected a 4-byte i32 payload, got {} bytes", payload.len())))?;
    Ok(i32::from_be_bytes(bytes))
}
