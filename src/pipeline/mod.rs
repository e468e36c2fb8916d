//! Tile Pipeline Orchestrator
//!
//! Builds the two staging buffers, binds the source and destination tensor
//! buffers, hands each unit its arguments and runs the three units
//! concurrently until every tile has passed through.
//!
//! ## Lifecycle
//!
//! ```text
//! Created ──configure──▶ Configured ──launch──▶ Launched ──join──▶ Joined ──conclude──▶ Passed | Failed
//!    │                        │                     │
//!    └── init error ──────────┴─────────────────────┴──▶ Failed
//! ```
//!
//! ## Example
//!
//! ```
//! use hologram_tile_pipeline::{Device, PipelineConfig, RunParameters, TensorBufferConfig, TilePipeline};
//! use hologram_tile_pipeline::config::DeviceConfig;
//!
//! # fn main() -> hologram_tile_pipeline::Result<()> {
//! let device = Device::open(&DeviceConfig::default())?;
//! let config = PipelineConfig::default();
//! let tile_bytes = config.tile.size_bytes();
//!
//! let src = device.create_buffer(TensorBufferConfig::for_tiles(4, tile_bytes))?;
//! let dst = device.create_buffer(TensorBufferConfig::for_tiles(4, tile_bytes))?;
//!
//! let pipeline = TilePipeline::new(config)?;
//! let params = RunParameters::new(4, src.address(), dst.address(), 1.0);
//! let summary = pipeline.run(&device, params)?;
//! assert_eq!(summary.tiles(), 4);
//! # Ok(())
//! # }
//! ```

mod launch;
mod params;

pub use params::{ComputeArgs, InputArgs, OutputArgs, RunParameters};

use crate::config::PipelineConfig;
use crate::device::Device;
use crate::memory::{TileAccessor, TileStorage};
use crate::staging::{BufferIndex, CancelToken, StagingBuffer, StagingStats};
use crate::units::{ComputeUnit, InputUnit, OutputUnit, PipelineUnit, UnitKind, UnitReport};
use crate::verify::VerificationReport;
use crate::{PipelineError, Result};
use launch::{execute_unit, LaunchGate, RunControl};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where a run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Created,
    Configured,
    Launched,
    Joined,
    Passed,
    Failed,
}

/// Orchestrates single-core three-stage runs
///
/// A pipeline holds only its shape; each call to [`configure`](Self::configure)
/// produces an independent [`ConfiguredRun`].
#[derive(Debug, Clone)]
pub struct TilePipeline {
    config: PipelineConfig,
}

impl TilePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            tile = %config.tile,
            depth = config.staging_depth,
            stall_timeout_ms = ?config.stall_timeout_ms,
            "pipeline created"
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Bind a run to tensor buffers that live on `device`
    #[tracing::instrument(skip(self, device), fields(device = device.id()))]
    pub fn configure(&self, device: &Device, params: RunParameters) -> Result<ConfiguredRun> {
        params.validate()?;
        let source = device.buffer(params.src_address)?;
        let destination = device.buffer(params.dst_address)?;
        if source.same_buffer(&destination) {
            return Err(PipelineError::AliasedBuffers(params.src_address));
        }
        self.configure_with_storage(params, Arc::new(source), Arc::new(destination))
    }

    /// Bind a run to arbitrary tile storage
    ///
    /// Storage addresses must match the ones named in `params`.
    pub fn configure_with_storage(
        &self,
        params: RunParameters,
        source: Arc<dyn TileStorage>,
        destination: Arc<dyn TileStorage>,
    ) -> Result<ConfiguredRun> {
        tracing::debug!(state = %RunState::Created, tiles = params.tile_count, "configuring run");
        params.validate()?;

        for (role, expected, storage) in [
            ("source", params.src_address, &source),
            ("destination", params.dst_address, &destination),
        ] {
            if storage.address() != expected {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} storage lives at {:#x}, run names {:#x}",
                    role,
                    storage.address(),
                    expected
                )));
            }
        }
        if regions_overlap(source.as_ref(), destination.as_ref()) {
            return Err(PipelineError::AliasedBuffers(params.dst_address));
        }

        let tile_bytes = self.config.tile.size_bytes();
        let source = TileAccessor::new(source, tile_bytes)?;
        let destination = TileAccessor::new(destination, tile_bytes)?;
        for (role, accessor) in [("source", &source), ("destination", &destination)] {
            if params.tile_count > accessor.tile_count() {
                return Err(PipelineError::InvalidConfig(format!(
                    "run of {} tiles exceeds {} buffer {:#x} with {} tiles",
                    params.tile_count,
                    role,
                    accessor.address(),
                    accessor.tile_count()
                )));
            }
        }

        let cancel = CancelToken::new();
        let elements = self.config.tile.element_count();
        let depth = self.config.staging_depth;
        let stall = self.config.stall_timeout();
        let input_buffer = StagingBuffer::new(BufferIndex::INPUT, depth, elements)?
            .with_stall_timeout(stall)
            .with_cancel_token(cancel.clone());
        let output_buffer = StagingBuffer::new(BufferIndex::OUTPUT, depth, elements)?
            .with_stall_timeout(stall)
            .with_cancel_token(cancel.clone());

        tracing::info!(
            state = %RunState::Configured,
            tiles = params.tile_count,
            src = params.src_address,
            dst = params.dst_address,
            scalar = params.scalar,
            "run configured"
        );
        Ok(ConfiguredRun {
            params,
            input_buffer,
            output_buffer,
            source,
            destination,
            cancel,
            history: vec![RunState::Created, RunState::Configured],
        })
    }

    /// Configure and launch in one step
    pub fn run(&self, device: &Device, params: RunParameters) -> Result<RunSummary> {
        self.configure(device, params)?.launch()
    }
}

fn regions_overlap(a: &dyn TileStorage, b: &dyn TileStorage) -> bool {
    let span = |s: &dyn TileStorage| (s.page_size() * s.page_count()) as u64;
    let (a_start, a_len) = (a.address(), span(a));
    let (b_start, b_len) = (b.address(), span(b));
    if a_start == b_start {
        return true;
    }
    a_len > 0 && b_len > 0 && a_start < b_start + b_len && b_start < a_start + a_len
}

/// A run with buffers bound and arguments assigned, ready to launch
pub struct ConfiguredRun {
    params: RunParameters,
    input_buffer: StagingBuffer,
    output_buffer: StagingBuffer,
    source: TileAccessor,
    destination: TileAccessor,
    cancel: CancelToken,
    history: Vec<RunState>,
}

impl ConfiguredRun {
    pub fn state(&self) -> RunState {
        self.history.last().copied().unwrap_or(RunState::Created)
    }

    /// States passed through so far, oldest first
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    /// Token that aborts the run once launched
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Start all three units and block until they finish
    ///
    /// Either every unit starts or none does. A failure in any unit cancels
    /// the others and is returned once all of them have unwound.
    #[tracing::instrument(name = "launch", skip(self), fields(tiles = self.params.tile_count))]
    pub fn launch(self) -> Result<RunSummary> {
        let ConfiguredRun {
            params,
            input_buffer,
            output_buffer,
            source,
            destination,
            cancel: _,
            mut history,
        } = self;

        let mut reader = InputUnit::new(params.input_args(), source, &input_buffer)?;
        let mut compute = ComputeUnit::new(params.compute_args(), &input_buffer, &output_buffer)?;
        let mut writer = OutputUnit::new(params.output_args(), destination, &output_buffer)?;

        let gate = LaunchGate::new();
        let control = RunControl::new(&input_buffer, &output_buffer);
        let started = Instant::now();

        let joined = std::thread::scope(|scope| {
            let (gate, control) = (&gate, &control);
            let units: [&mut dyn PipelineUnit; 3] = [&mut reader, &mut compute, &mut writer];
            let mut handles = Vec::with_capacity(units.len());

            for unit in units {
                let kind = unit.kind();
                let spawned = std::thread::Builder::new()
                    .name(format!("holotile-{}", kind.as_str()))
                    .spawn_scoped(scope, move || execute_unit(unit, gate, control));
                match spawned {
                    Ok(handle) => handles.push((kind, handle)),
                    Err(err) => {
                        gate.abort();
                        for (_, handle) in handles {
                            let _ = handle.join();
                        }
                        return Err(PipelineError::Launch {
                            unit: kind.as_str().to_string(),
                            reason: err.to_string(),
                        });
                    }
                }
            }

            tracing::info!(state = %RunState::Launched, units = handles.len(), "run launched");
            gate.open();
            history.push(RunState::Launched);
            Ok(handles
                .into_iter()
                .map(|(kind, handle)| (kind, handle.join()))
                .collect::<Vec<_>>())
        });
        let joined = joined.map_err(|err| {
            tracing::error!(state = %RunState::Failed, error = %err, "launch failed");
            err
        })?;

        let elapsed = started.elapsed();
        let mut units = Vec::with_capacity(joined.len());
        let mut unit_error = None;
        for (kind, outcome) in joined {
            match outcome {
                Ok(Ok(report)) => units.push(report),
                Ok(Err(err)) => {
                    unit_error.get_or_insert(err);
                }
                Err(_) => {
                    unit_error.get_or_insert(PipelineError::UnitPanicked(kind.as_str().to_string()));
                }
            }
        }

        if let Some((unit, err)) = control.take_error() {
            tracing::error!(state = %RunState::Failed, unit = unit.as_str(), error = %err, "run failed");
            return Err(err);
        }
        if let Some(err) = unit_error {
            tracing::warn!(state = %RunState::Failed, error = %err, "run aborted");
            return Err(err);
        }

        history.push(RunState::Joined);
        let summary = RunSummary {
            params,
            elapsed,
            units,
            input_stats: input_buffer.stats(),
            output_stats: output_buffer.stats(),
            state: RunState::Joined,
            history,
        };
        tracing::info!(
            state = %summary.state,
            tiles = summary.tiles(),
            elapsed_us = elapsed.as_micros() as u64,
            "run joined"
        );
        Ok(summary)
    }
}

/// Outcome of a run whose units all completed
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub params: RunParameters,
    /// Wall time from launch to join
    pub elapsed: Duration,
    /// One report per unit in pipeline order
    pub units: Vec<UnitReport>,
    /// Usage of `c_0`
    pub input_stats: StagingStats,
    /// Usage of `c_16`
    pub output_stats: StagingStats,
    pub state: RunState,
    /// Every state the run has entered, ending with `state`
    pub history: Vec<RunState>,
}

impl RunSummary {
    pub fn tiles(&self) -> usize {
        self.params.tile_count
    }

    pub fn unit(&self, kind: UnitKind) -> Option<&UnitReport> {
        self.units.iter().find(|r| r.unit == kind)
    }

    pub fn tiles_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.tiles() as f64 / secs
        } else {
            0.0
        }
    }

    /// Record the verification outcome as the run's final state
    pub fn conclude(&mut self, report: &VerificationReport) -> RunState {
        self.state = if report.passed() {
            RunState::Passed
        } else {
            RunState::Failed
        };
        self.history.push(self.state);
        tracing::info!(
            state = %self.state,
            checked = report.checked,
            mismatches = report.mismatches.len(),
            "run concluded"
        );
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::memory::TensorBufferConfig;
    use crate::tile::{Element, TileLayout};

    fn small_pipeline(depth: usize) -> TilePipeline {
        let config = PipelineConfig::default()
            .with_tile(TileLayout::new(4, 4))
            .with_staging_depth(depth);
        TilePipeline::new(config).unwrap()
    }

    #[test]
    fn test_run_adds_scalar() {
        let device = Device::open(&DeviceConfig::default()).unwrap();
        let pipeline = small_pipeline(2);
        let tile_bytes = pipeline.config().tile.size_bytes();
        let src = device.create_buffer(TensorBufferConfig::for_tiles(3, tile_bytes)).unwrap();
        let dst = device.create_buffer(TensorBufferConfig::for_tiles(3, tile_bytes)).unwrap();
        let data: Vec<Element> = (0..48).map(|i| Element::from_f32(i as f32 * 0.25)).collect();
        src.write_from_host(&data).unwrap();

        let run = pipeline
            .configure(&device, RunParameters::new(3, src.address(), dst.address(), 1.0))
            .unwrap();
        assert_eq!(run.state(), RunState::Configured);
        let summary = run.launch().unwrap();

        assert_eq!(summary.state, RunState::Joined);
        assert_eq!(summary.units.len(), 3);
        assert_eq!(summary.input_stats.pushed, 3);
        assert_eq!(summary.output_stats.popped, 3);
        let out = dst.read_to_host();
        for (x, y) in data.iter().zip(&out) {
            assert_eq!(y.to_f32(), x.to_f32() + 1.0);
        }
    }

    #[test]
    fn test_state_history_through_conclusion() {
        let device = Device::open(&DeviceConfig::default()).unwrap();
        let pipeline = small_pipeline(2);
        let tile_bytes = pipeline.config().tile.size_bytes();
        let src = device.create_buffer(TensorBufferConfig::for_tiles(2, tile_bytes)).unwrap();
        let dst = device.create_buffer(TensorBufferConfig::for_tiles(2, tile_bytes)).unwrap();

        let run = pipeline
            .configure(&device, RunParameters::new(2, src.address(), dst.address(), 0.5))
            .unwrap();
        assert_eq!(run.history(), &[RunState::Created, RunState::Configured]);

        let mut summary = run.launch().unwrap();
        assert_eq!(
            summary.history,
            vec![RunState::Created, RunState::Configured, RunState::Launched, RunState::Joined]
        );

        let passing = VerificationReport {
            checked: 32,
            mismatches: Vec::new(),
        };
        assert_eq!(summary.conclude(&passing), RunState::Passed);
        assert_eq!(summary.history.last(), Some(&RunState::Passed));
        assert_eq!(summary.history.len(), 5);
    }

    #[test]
    fn test_configure_rejects_unknown_and_aliased() {
        let device = Device::open(&DeviceConfig::default()).unwrap();
        let pipeline = small_pipeline(2);
        let tile_bytes = pipeline.config().tile.size_bytes();
        let src = device.create_buffer(TensorBufferConfig::for_tiles(1, tile_bytes)).unwrap();

        let err = pipeline
            .configure(&device, RunParameters::new(1, src.address(), 0xdead_0000, 1.0))
            .err()
            .unwrap();
        assert_eq!(err, PipelineError::UnknownAddress(0xdead_0000));
        assert!(err.is_initialization());

        let err = pipeline
            .configure(&device, RunParameters::new(1, src.address(), src.address(), 1.0))
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::AliasedBuffers(_)));
    }

    #[test]
    fn test_configure_rejects_oversized_run() {
        let device = Device::open(&DeviceConfig::default()).unwrap();
        let pipeline = small_pipeline(2);
        let tile_bytes = pipeline.config().tile.size_bytes();
        let src = device.create_buffer(TensorBufferConfig::for_tiles(2, tile_bytes)).unwrap();
        let dst = device.create_buffer(TensorBufferConfig::for_tiles(2, tile_bytes)).unwrap();

        let err = pipeline
            .configure(&device, RunParameters::new(3, src.address(), dst.address(), 1.0))
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_configure_rejects_page_size_mismatch() {
        let device = Device::open(&DeviceConfig::default()).unwrap();
        let pipeline = small_pipeline(2);
        let src = device.create_buffer(TensorBufferConfig::for_tiles(2, 64)).unwrap();
        let dst = device.create_buffer(TensorBufferConfig::for_tiles(2, 64)).unwrap();

        let err = pipeline
            .configure(&device, RunParameters::new(2, src.address(), dst.address(), 1.0))
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::TileSizeMismatch { .. }));
    }

    #[test]
    fn test_overlap_detection() {
        let device = Device::open(&DeviceConfig::default()).unwrap();
        let a = device.create_buffer(TensorBufferConfig::for_tiles(2, 32)).unwrap();
        let b = device.create_buffer(TensorBufferConfig::for_tiles(2, 32)).unwrap();
        assert!(regions_overlap(&a, &a));
        assert!(!regions_overlap(&a, &b));
    }
}
