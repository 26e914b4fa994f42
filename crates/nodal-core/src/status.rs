//! Per-solve circuit status handed to every stamp call.

/// Which analysis is driving the current solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisMode {
    /// DC operating point (also used per DC-sweep grid point).
    #[default]
    OperatingPoint,
    /// Time-domain transient step.
    Transient,
    /// Small-signal AC frequency point.
    Ac,
}

/// Implicit integration rule for reactive companion models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationMethod {
    /// Backward Euler, order 1.
    #[default]
    BackwardEuler,
    /// Trapezoidal, order 2.
    Trapezoidal,
}

/// Whether a state update is a real advance or a predictor copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegPhase {
    #[default]
    Normal,
    Predict,
}

/// Snapshot of the solver state passed to `Device::stamp`.
///
/// Invariants: exactly one mode is active per solve; `time_step > 0`
/// whenever the mode is transient; `frequency > 0` whenever it is AC.
#[derive(Debug, Clone)]
pub struct CircuitStatus {
    /// Simulation time (s); 0 outside transient.
    pub time: f64,
    /// Current transient step size (s).
    pub time_step: f64,
    /// Gmin floor for conductance stabilization.
    pub gmin: f64,
    pub mode: AnalysisMode,
    pub method: IntegrationMethod,
    pub integ_phase: IntegPhase,
    /// Operating temperature (K).
    pub temp: f64,
    /// Current integration order.
    pub order: usize,
    pub max_order: usize,
    /// AC analysis frequency (Hz).
    pub frequency: f64,
}

impl Default for CircuitStatus {
    fn default() -> Self {
        Self {
            time: 0.0,
            time_step: 0.0,
            gmin: 1e-12,
            mode: AnalysisMode::OperatingPoint,
            method: IntegrationMethod::BackwardEuler,
            integ_phase: IntegPhase::Normal,
            temp: 300.15, // 27C
            order: 1,
            max_order: 2,
            frequency: 0.0,
        }
    }
}

impl CircuitStatus {
    /// Status for an operating-point solve at the given gmin.
    pub fn op(gmin: f64) -> Self {
        Self {
            gmin,
            ..Default::default()
        }
    }

    /// Status for a transient solve at `time` with step `dt`.
    pub fn transient(time: f64, dt: f64, method: IntegrationMethod, gmin: f64) -> Self {
        let order = match method {
            IntegrationMethod::BackwardEuler => 1,
            IntegrationMethod::Trapezoidal => 2,
        };
        Self {
            time,
            time_step: dt,
            gmin,
            mode: AnalysisMode::Transient,
            method,
            order,
            ..Default::default()
        }
    }

    /// Status for an AC solve at `frequency` Hz.
    pub fn ac(frequency: f64) -> Self {
        Self {
            frequency,
            mode: AnalysisMode::Ac,
            ..Default::default()
        }
    }

    /// Angular frequency 2*pi*f for AC stamps.
    pub fn omega(&self) -> f64 {
        2.0 * std::f64::consts::PI * self.frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = CircuitStatus::default();
        assert_eq!(s.mode, AnalysisMode::OperatingPoint);
        assert_eq!(s.method, IntegrationMethod::BackwardEuler);
        assert!((s.temp - 300.15).abs() < 1e-12);
    }

    #[test]
    fn test_constructors() {
        let t = CircuitStatus::transient(1e-3, 1e-6, IntegrationMethod::Trapezoidal, 1e-12);
        assert_eq!(t.mode, AnalysisMode::Transient);
        assert!(t.time_step > 0.0);

        let a = CircuitStatus::ac(1e3);
        assert_eq!(a.mode, AnalysisMode::Ac);
        assert!((a.omega() - 2.0 * std::f64::consts::PI * 1e3).abs() < 1e-9);
    }
}
