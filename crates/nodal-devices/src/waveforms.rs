//! Time-varying source waveforms.
//!
//! Shared by voltage and current sources. The same shapes drive transient
//! evaluation (`value_at`) and DC bias extraction (`dc_value`).

use std::f64::consts::PI;

use nodal_core::SourceSpec;

/// A time-varying waveform.
#[derive(Debug, Clone)]
pub enum Waveform {
    /// Constant value.
    Dc(f64),

    /// SIN(offset amplitude freq [phase_deg]):
    /// `offset + amplitude * sin(2*pi*freq*t + phase_rad)`.
    Sin {
        offset: f64,
        amplitude: f64,
        freq: f64,
        phase: f64,
    },

    /// PULSE(v1 v2 td tr tf pw per). `v1` before the delay; periodic when
    /// `per > 0`. Segment boundaries evaluate to the exact named levels.
    Pulse {
        v1: f64,
        v2: f64,
        delay: f64,
        rise: f64,
        fall: f64,
        width: f64,
        period: f64,
    },

    /// PWL(t1 v1 t2 v2 ...): linear interpolation, clamped to the
    /// endpoint values outside the given range.
    Pwl { points: Vec<(f64, f64)> },
}

impl Waveform {
    pub fn from_spec(spec: &SourceSpec) -> Self {
        match spec {
            SourceSpec::Dc { value } => Waveform::Dc(*value),
            SourceSpec::Sin {
                offset,
                amplitude,
                freq,
                phase,
            } => Waveform::Sin {
                offset: *offset,
                amplitude: *amplitude,
                freq: *freq,
                phase: *phase,
            },
            SourceSpec::Pulse {
                v1,
                v2,
                delay,
                rise,
                fall,
                width,
                period,
            } => Waveform::Pulse {
                v1: *v1,
                v2: *v2,
                delay: *delay,
                rise: *rise,
                fall: *fall,
                width: *width,
                period: *period,
            },
            SourceSpec::Pwl { points } => Waveform::Pwl {
                points: points.clone(),
            },
        }
    }

    /// Evaluate the waveform at time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        match self {
            Waveform::Dc(v) => *v,
            Waveform::Sin {
                offset,
                amplitude,
                freq,
                phase,
            } => {
                let phase_rad = phase * PI / 180.0;
                offset + amplitude * (2.0 * PI * freq * t + phase_rad).sin()
            }
            Waveform::Pulse {
                v1,
                v2,
                delay,
                rise,
                fall,
                width,
                period,
            } => eval_pulse(*v1, *v2, *delay, *rise, *fall, *width, *period, t),
            Waveform::Pwl { points } => eval_pwl(points, t),
        }
    }

    /// DC bias value: the level before time-dependent behavior starts.
    pub fn dc_value(&self) -> f64 {
        match self {
            Waveform::Dc(v) => *v,
            Waveform::Sin { offset, .. } => *offset,
            Waveform::Pulse { v1, .. } => *v1,
            Waveform::Pwl { points } => points.first().map(|&(_, v)| v).unwrap_or(0.0),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn eval_pulse(v1: f64, v2: f64, td: f64, tr: f64, tf: f64, pw: f64, per: f64, t: f64) -> f64 {
    if t < td {
        return v1;
    }

    let t_rel = if per > 0.0 { (t - td) % per } else { t - td };

    if t_rel < tr {
        if tr <= 0.0 {
            return v2;
        }
        v1 + (v2 - v1) * t_rel / tr
    } else if t_rel < tr + pw {
        v2
    } else if t_rel < tr + pw + tf {
        if tf <= 0.0 {
            return v1;
        }
        v2 - (v2 - v1) * (t_rel - tr - pw) / tf
    } else {
        v1
    }
}

fn eval_pwl(points: &[(f64, f64)], t: f64) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    if t <= points[0].0 {
        return points[0].1;
    }
    if t >= points[points.len() - 1].0 {
        return points[points.len() - 1].1;
    }

    for i in 0..points.len() - 1 {
        let (t0, v0) = points[i];
        let (t1, v1) = points[i + 1];
        if t >= t0 && t <= t1 {
            let frac = (t - t0) / (t1 - t0);
            return v0 + frac * (v1 - v0);
        }
    }

    points[points.len() - 1].1
}
