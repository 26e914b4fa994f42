//! Result series keyed by variable name.

use indexmap::IndexMap;

/// Map from variable name (`V(out)`, `I(V1)`, `TIME`, `FREQ`, `SWEEP1`)
/// to a dense array over the analysis's independent axis.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    series: IndexMap<String, Vec<f64>>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one value to a named series.
    pub fn push(&mut self, name: &str, value: f64) {
        self.series.entry(name.to_string()).or_default().push(value);
    }

    /// Replace a series with a single-element array (OP results).
    pub fn set_scalar(&mut self, name: &str, value: f64) {
        self.series.insert(name.to_string(), vec![value]);
    }

    /// Store an OP-style solution map as 1-element arrays.
    pub fn store_op(&mut self, solution: &IndexMap<String, f64>) {
        for (name, &value) in solution {
            self.set_scalar(name, value);
        }
    }

    /// Append a transient point. Repeated times (to solver precision)
    /// are dropped so restarted steps do not duplicate rows.
    pub fn store_time_result(&mut self, time: f64, solution: &IndexMap<String, f64>) {
        if let Some(times) = self.series.get("TIME") {
            if let Some(&last) = times.last() {
                if (time - last).abs() <= 1e-12 * time.abs().max(1.0) {
                    return;
                }
            }
        }
        self.push("TIME", time);
        for (name, &value) in solution {
            self.push(name, value);
        }
    }

    /// Append a sweep point with its axis values.
    pub fn store_sweep_result(&mut self, axes: &[(&str, f64)], solution: &IndexMap<String, f64>) {
        for &(axis, value) in axes {
            self.push(axis, value);
        }
        for (name, &value) in solution {
            self.push(name, value);
        }
    }

    /// Append an AC point: magnitude and phase (degrees) per signal.
    pub fn store_ac_result(&mut self, freq: f64, solution: &IndexMap<String, (f64, f64)>) {
        self.push("FREQ", freq);
        for (name, &(re, im)) in solution {
            let magnitude = (re * re + im * im).sqrt();
            let phase = im.atan2(re).to_degrees();
            self.push(&format!("{name}_MAG"), magnitude);
            self.push(&format!("{name}_PHASE"), phase);
        }
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    /// Variable names sorted for display.
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.series.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.series.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_op_single_element() {
        let mut rs = ResultSet::new();
        let mut sol = IndexMap::new();
        sol.insert("V(1)".to_string(), 5.0);
        rs.store_op(&sol);
        assert_eq!(rs.get("V(1)"), Some(&[5.0][..]));
    }

    #[test]
    fn test_duplicate_time_dropped() {
        let mut rs = ResultSet::new();
        let mut sol = IndexMap::new();
        sol.insert("V(1)".to_string(), 1.0);
        rs.store_time_result(1e-6, &sol);
        rs.store_time_result(1e-6, &sol);
        rs.store_time_result(2e-6, &sol);
        assert_eq!(rs.get("TIME").unwrap().len(), 2);
        assert_eq!(rs.get("V(1)").unwrap().len(), 2);
    }

    #[test]
    fn test_ac_result_mag_phase() {
        let mut rs = ResultSet::new();
        let mut sol = IndexMap::new();
        sol.insert("V(out)".to_string(), (0.0, 1.0));
        rs.store_ac_result(1e3, &sol);
        assert!((rs.get("V(out)_MAG").unwrap()[0] - 1.0).abs() < 1e-12);
        assert!((rs.get("V(out)_PHASE").unwrap()[0] - 90.0).abs() < 1e-9);
        assert_eq!(rs.get("FREQ"), Some(&[1e3][..]));
    }

    #[test]
    fn test_sorted_names() {
        let mut rs = ResultSet::new();
        rs.push("V(b)", 1.0);
        rs.push("TIME", 0.0);
        rs.push("I(V1)", 2.0);
        assert_eq!(rs.sorted_names(), vec!["I(V1)", "TIME", "V(b)"]);
    }
}
