//! The live-looping unit.
//!
//! A [`LoopUnit`] declares its control, data and relay signals on a
//! [`Device`], installs the loop map between the relays and then, on every
//! transport tick, feeds the loop once per quantized step and mirrors the
//! replayed material to its output.

use tracing::{debug, warn};

use crate::{
    config::{DIVISION_RANGE, LENGTH_RANGE},
    Device, Direction, LoopConfig, LoopOperands, LooperError, MapId, Result, Route, SignalId,
    SignalSpec, SignalType, SignalValue,
};

/// Handles of every signal a unit owns, in creation order.
#[derive(Debug, Clone, Copy)]
struct LoopSignals {
    record: SignalId,
    length: SignalId,
    division: SignalId,
    modulation: SignalId,
    mute: SignalId,
    input: SignalId,
    output: SignalId,
    local_send: SignalId,
    local_recv: SignalId,
}

impl LoopSignals {
    fn all(&self) -> [SignalId; 9] {
        [
            self.record,
            self.length,
            self.division,
            self.modulation,
            self.mute,
            self.input,
            self.output,
            self.local_send,
            self.local_recv,
        ]
    }
}

/// Outcome of a single [`LoopUnit::update`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Quantized step index for the supplied beat position.
    pub step: i64,
    /// Whether a new step was entered and the input fed into the loop.
    pub advanced: bool,
    /// Steps skipped since the previous call.
    pub missed: u64,
    pub muted: bool,
}

/// A live-looping unit bound to one [`Device`].
///
/// Owns its nine signals and frees them on drop. The loop map and any maps
/// created by deferred connections belong to the graph.
#[derive(Debug)]
pub struct LoopUnit {
    name: String,
    device: Device,
    signals: LoopSignals,
    loop_map: MapId,
    last_update: i64,
}

impl LoopUnit {
    /// Creates a unit with the default [`LoopConfig`] for the given element
    /// type and vector length.
    pub fn new(
        name: &str,
        device: &Device,
        element_type: SignalType,
        vector_len: usize,
    ) -> Result<Self> {
        Self::with_config(name, device, &LoopConfig::new(element_type, vector_len))
    }

    /// Declares the unit's signals, installs the loop map and waits for the
    /// engine to report it ready before writing the `length` and `division`
    /// defaults. Any signal created before a failure is released again.
    pub fn with_config(name: &str, device: &Device, config: &LoopConfig) -> Result<Self> {
        config.validate()?;

        let mut created = Vec::with_capacity(9);
        match declare_signals(name, device, config, &mut created) {
            Ok(signals) => {
                let unit = Self::install(name, device, config, signals);
                if unit.is_err() {
                    release(device, &created);
                }
                unit
            }
            Err(err) => {
                release(device, &created);
                Err(err)
            }
        }
    }

    fn install(
        name: &str,
        device: &Device,
        config: &LoopConfig,
        signals: LoopSignals,
    ) -> Result<Self> {
        let operands = LoopOperands {
            length: signals.length,
            division: signals.division,
            recv: signals.local_recv,
            record: signals.record,
            send: signals.local_send,
            modulation: signals.modulation,
        };
        let loop_map = device.create_loop_map(operands, config)?;
        device.push_map(loop_map)?;

        let mut polls = 0;
        while !device.is_map_ready(loop_map)? {
            if polls == config.readiness.max_polls {
                return Err(LooperError::MapNotReady {
                    map: loop_map,
                    polls,
                });
            }
            device.poll()?;
            polls += 1;
        }
        debug!(unit = name, polls, "loop map ready");

        device.set_value(signals.length, SignalValue::float(config.defaults.length))?;
        device.set_value(signals.division, SignalValue::float(config.defaults.division))?;

        Ok(Self {
            name: name.to_owned(),
            device: device.clone(),
            signals,
            loop_map,
            last_update: 0,
        })
    }

    /// Advances the unit to `beats`.
    ///
    /// The input is copied into the loop exactly once per quantized step;
    /// the replay is copied to the output on every call unless muted.
    pub fn update(&mut self, beats: f64) -> Result<TickReport> {
        let division = self.device.value(self.signals.division)?.scalar();
        let now = (beats * division).floor() as i64;

        let mut report = TickReport {
            step: now,
            advanced: false,
            missed: 0,
            muted: false,
        };

        if now != self.last_update {
            let delta = now.saturating_sub(self.last_update);
            if delta > 1 {
                report.missed = (delta - 1) as u64;
                warn!(unit = %self.name, missed = report.missed, "missed ticks");
            }

            let input = self.device.value(self.signals.input)?;
            self.device.set_value(self.signals.local_send, input)?;

            self.last_update = now;
            report.advanced = true;
        }

        report.muted = self.device.value(self.signals.mute)?.scalar() != 0.0;
        if !report.muted {
            let replay = self.device.value(self.signals.local_recv)?;
            self.device.set_value(self.signals.output, replay)?;
        }

        Ok(report)
    }

    /// Feeds `record` from the remote signal named `src` once it appears.
    pub fn map_record(&self, src: &str) -> Result<()> {
        self.map_from(src, self.signals.record)
    }

    /// Feeds `length` from the remote signal named `src` once it appears.
    pub fn map_length(&self, src: &str) -> Result<()> {
        self.map_from(src, self.signals.length)
    }

    /// Feeds `modulation` from the remote signal named `src` once it appears.
    pub fn map_modulation(&self, src: &str) -> Result<()> {
        self.map_from(src, self.signals.modulation)
    }

    /// Feeds `input` from the remote signal named `src` once it appears.
    pub fn map_input(&self, src: &str) -> Result<()> {
        self.map_from(src, self.signals.input)
    }

    /// Sends `output` to the remote signal named `dst` once it appears.
    pub fn map_output(&self, dst: &str) -> Result<()> {
        self.device.bind(dst, self.signals.output, Route::ToRemote)
    }

    fn map_from(&self, src: &str, local: SignalId) -> Result<()> {
        self.device.bind(src, local, Route::FromRemote)
    }

    /// Vector input recorded into the loop.
    pub fn input_signal(&self) -> SignalId {
        self.signals.input
    }

    /// Vector output carrying the replay.
    pub fn output_signal(&self) -> SignalId {
        self.signals.output
    }

    /// Weight of the noise added on every loop evaluation, in `[0, 1]`.
    pub fn modulation_signal(&self) -> SignalId {
        self.signals.modulation
    }

    /// Steps per beat, in `[1, 96]`.
    pub fn division_signal(&self) -> SignalId {
        self.signals.division
    }

    /// Loop length in beats, in `[0, 100]`.
    pub fn length_signal(&self) -> SignalId {
        self.signals.length
    }

    /// Record gate: 1 overwrites the loop with the input, 0 replays it.
    pub fn record_signal(&self) -> SignalId {
        self.signals.record
    }

    /// Integer mute flag. While non-zero the output keeps its last value.
    pub fn mute_signal(&self) -> SignalId {
        self.signals.mute
    }

    /// Relay written with the input once per step; triggers the loop map.
    pub fn local_send_signal(&self) -> SignalId {
        self.signals.local_send
    }

    /// Relay holding the loop map's latest result.
    pub fn local_recv_signal(&self) -> SignalId {
        self.signals.local_recv
    }

    /// Prefix shared by every signal name of the unit.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device the unit's signals were declared on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Handle of the installed loop map.
    pub fn loop_map(&self) -> MapId {
        self.loop_map
    }

    /// Step index of the most recent input write.
    pub fn last_update(&self) -> i64 {
        self.last_update
    }
}

impl Drop for LoopUnit {
    fn drop(&mut self) {
        release(&self.device, &self.signals.all());
    }
}

fn declare_signals(
    name: &str,
    device: &Device,
    config: &LoopConfig,
    created: &mut Vec<SignalId>,
) -> Result<LoopSignals> {
    let element_type = config.element_type;
    let vector_len = config.vector_len;
    let mut declare = |spec: SignalSpec| -> Result<SignalId> {
        let id = device.create_signal(spec)?;
        created.push(id);
        Ok(id)
    };

    let record = declare(
        SignalSpec::new(
            format!("{name}/control/record"),
            Direction::Out,
            SignalType::Float,
            1,
        )
        .with_range(0.0, 1.0),
    )?;
    let length = declare(
        SignalSpec::new(
            format!("{name}/control/length"),
            Direction::Out,
            SignalType::Float,
            1,
        )
        .with_unit("beats")
        .with_range(LENGTH_RANGE.0, LENGTH_RANGE.1),
    )?;
    let division = declare(
        SignalSpec::new(
            format!("{name}/control/division"),
            Direction::Out,
            SignalType::Float,
            1,
        )
        .with_unit("ppqn")
        .with_range(DIVISION_RANGE.0, DIVISION_RANGE.1),
    )?;
    let modulation = declare(
        SignalSpec::new(
            format!("{name}/control/modulation"),
            Direction::Out,
            SignalType::Float,
            1,
        )
        .with_range(0.0, 1.0),
    )?;
    let mute = declare(
        SignalSpec::new(
            format!("{name}/control/mute"),
            Direction::Out,
            SignalType::Int,
            1,
        )
        .with_range(0.0, 1.0),
    )?;

    let data = |suffix: &str, direction| {
        SignalSpec::new(format!("{name}/{suffix}"), direction, element_type, vector_len)
            .with_range(0.0, 1.0)
    };
    let input = declare(data("input", Direction::In))?;
    let output = declare(data("output", Direction::Out))?;
    let local_send = declare(data("local/send", Direction::Out))?;
    let local_recv = declare(data("local/recv", Direction::In))?;

    Ok(LoopSignals {
        record,
        length,
        division,
        modulation,
        mute,
        input,
        output,
        local_send,
        local_recv,
    })
}

fn release(device: &Device, signals: &[SignalId]) {
    for id in signals {
        if let Err(err) = device.free_signal(*id) {
            warn!(signal = ?id, %err, "could not release signal");
        }
    }
}
