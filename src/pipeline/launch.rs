//! Launch coordination: start gate, failure capture, panic containment

use crate::staging::StagingBuffer;
use crate::units::{PipelineUnit, UnitKind, UnitReport};
use crate::{PipelineError, Result};
use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Closed,
    Open,
    Aborted,
}

/// Holds spawned units until every unit has been placed
///
/// Units that find the gate aborted return without touching any buffer, so
/// a failed launch leaves no partial run behind.
pub(crate) struct LaunchGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl LaunchGate {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Closed),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn open(&self) {
        self.set(GateState::Open);
    }

    pub(crate) fn abort(&self) {
        self.set(GateState::Aborted);
    }

    /// Block until the gate is opened or aborted; true when opened
    pub(crate) fn wait(&self) -> bool {
        let mut state = self.state.lock();
        while *state == GateState::Closed {
            self.changed.wait(&mut state);
        }
        *state == GateState::Open
    }

    fn set(&self, next: GateState) {
        let mut state = self.state.lock();
        if *state == GateState::Closed {
            *state = next;
        }
        self.changed.notify_all();
    }
}

/// Shared failure slot for the units of one run
///
/// The first non-cancellation error wins. Any failure cancels both staging
/// buffers so peers blocked in reserve/wait unwind instead of hanging.
pub(crate) struct RunControl<'a> {
    buffers: [&'a StagingBuffer; 2],
    first_error: Mutex<Option<(UnitKind, PipelineError)>>,
}

impl<'a> RunControl<'a> {
    pub(crate) fn new(input: &'a StagingBuffer, output: &'a StagingBuffer) -> Self {
        Self {
            buffers: [input, output],
            first_error: Mutex::new(None),
        }
    }

    pub(crate) fn fail(&self, unit: UnitKind, err: PipelineError) {
        if !err.is_cancellation() {
            let mut slot = self.first_error.lock();
            if slot.is_none() {
                tracing::error!(unit = unit.as_str(), error = %err, "unit failed, cancelling run");
                *slot = Some((unit, err));
            }
        }
        for buffer in self.buffers {
            buffer.cancel();
        }
    }

    pub(crate) fn take_error(&self) -> Option<(UnitKind, PipelineError)> {
        self.first_error.lock().take()
    }
}

/// Records a panic unwinding through a unit as a run failure
struct CancelOnPanic<'c, 'a> {
    control: &'c RunControl<'a>,
    unit: UnitKind,
}

impl Drop for CancelOnPanic<'_, '_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.control
                .fail(self.unit, PipelineError::UnitPanicked(self.unit.as_str().to_string()));
        }
    }
}

/// Body of each unit thread
pub(crate) fn execute_unit(unit: &mut dyn PipelineUnit, gate: &LaunchGate, control: &RunControl<'_>) -> Result<UnitReport> {
    let kind = unit.kind();
    if !gate.wait() {
        return Err(PipelineError::Launch {
            unit: kind.as_str().to_string(),
            reason: "launch aborted before start".to_string(),
        });
    }

    let _guard = CancelOnPanic { control, unit: kind };
    let result = unit.run();
    if let Err(err) = &result {
        control.fail(kind, err.clone());
    }
    result
}
