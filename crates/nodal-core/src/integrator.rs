//! Integration coefficients for reactive companion models.
//!
//! Backward-differentiation (Gear) formulas up to order 6 plus the
//! trapezoidal rule. Reactive devices consult these through the status
//! method field so BE/TR toggling stamps consistently within a step.

use crate::status::IntegrationMethod;

struct Bdf {
    coefficients: &'static [f64],
    beta: f64,
}

const BDF_TABLE: [Bdf; 6] = [
    Bdf { coefficients: &[1.0], beta: 1.0 },
    Bdf { coefficients: &[4.0 / 3.0, -1.0 / 3.0], beta: 2.0 / 3.0 },
    Bdf { coefficients: &[18.0 / 11.0, -9.0 / 11.0, 2.0 / 11.0], beta: 6.0 / 11.0 },
    Bdf {
        coefficients: &[48.0 / 25.0, -36.0 / 25.0, 16.0 / 25.0, -3.0 / 25.0],
        beta: 12.0 / 25.0,
    },
    Bdf {
        coefficients: &[
            300.0 / 137.0,
            -300.0 / 137.0,
            200.0 / 137.0,
            -75.0 / 137.0,
            12.0 / 137.0,
        ],
        beta: 60.0 / 137.0,
    },
    Bdf {
        coefficients: &[
            360.0 / 147.0,
            -450.0 / 147.0,
            400.0 / 147.0,
            -225.0 / 147.0,
            72.0 / 147.0,
            -10.0 / 147.0,
        ],
        beta: 60.0 / 147.0,
    },
];

/// BDF coefficients for the given order and step size.
///
/// `coeffs[0]` is the leading coefficient multiplying the new state;
/// `coeffs[1..]` weight the history terms. Orders outside 1..=6 clamp to 1.
pub fn bdf_coeffs(order: usize, dt: f64) -> Vec<f64> {
    let order = if (1..=6).contains(&order) { order } else { 1 };
    let bdf = &BDF_TABLE[order - 1];
    let scale = 1.0 / (bdf.beta * dt);
    let mut coeffs = Vec::with_capacity(order + 1);
    coeffs.push(scale);
    for c in bdf.coefficients {
        coeffs.push(-c * scale);
    }
    coeffs
}

/// Leading trapezoidal coefficient: `2/dt` at order 2, `1/dt` at order 1.
pub fn trapezoidal_coeff(order: usize, dt: f64) -> f64 {
    if order == 2 {
        2.0 / dt
    } else {
        1.0 / dt
    }
}

/// Leading coefficient for the active method at the given order.
pub fn leading_coeff(method: IntegrationMethod, order: usize, dt: f64) -> f64 {
    match method {
        IntegrationMethod::BackwardEuler => bdf_coeffs(1, dt)[0],
        IntegrationMethod::Trapezoidal => trapezoidal_coeff(order.max(2), dt),
    }
}
