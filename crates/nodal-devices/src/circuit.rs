//! Circuit topology: node/branch assignment, device construction, and
//! stamp orchestration.
//!
//! The circuit owns the MNA matrix, the device list, and the magnetic
//! core arena. Node indices are assigned in first-seen element order;
//! branch rows (voltage sources and linear inductors) follow after all
//! node rows. Resources are released on drop.

use indexmap::IndexMap;

use nodal_core::{
    is_ground_name, CircuitMatrix, CircuitStatus, Element, ElementKind, ModelCard, ModelKind,
};

use crate::bjt::{Bjt, BjtParams};
use crate::device::{node_voltage, Device, NonLinear, TimeDependent};
use crate::diode::{Diode, DiodeParams};
use crate::error::Result;
use crate::magnetic::{CoreParams, JilesAthertonCore, MagneticInductor};
use crate::mosfet::{Mosfet, MosfetParams};
use crate::mutual::{CoupledWinding, Mutual};
use crate::passive::{Capacitor, Inductor, Resistor};
use crate::sources::{CurrentSource, VoltageSource};
use crate::waveforms::Waveform;

use nodal_core::Error as CoreError;

/// A fully built circuit ready for analysis.
#[derive(Debug)]
pub struct Circuit {
    name: String,
    node_map: IndexMap<String, usize>,
    branch_map: IndexMap<String, usize>,
    devices: Vec<Device>,
    cores: Vec<JilesAthertonCore>,
    core_names: IndexMap<String, usize>,
    matrix: CircuitMatrix,
    /// Status of the most recent (or pending) solve.
    pub status: CircuitStatus,
}

impl Circuit {
    /// Build a circuit from parsed elements and a model registry.
    ///
    /// `complex` selects a complex-valued matrix for netlists that will
    /// run an AC analysis.
    pub fn build(
        name: impl Into<String>,
        elements: &[Element],
        models: &IndexMap<String, ModelCard>,
        complex: bool,
    ) -> Result<Self> {
        let mut circuit = Self {
            name: name.into(),
            node_map: IndexMap::new(),
            branch_map: IndexMap::new(),
            devices: Vec::new(),
            cores: Vec::new(),
            core_names: IndexMap::new(),
            matrix: CircuitMatrix::new(0, complex),
            status: CircuitStatus::default(),
        };

        circuit.check_duplicates(elements)?;
        circuit.assign_node_branch_maps(elements);

        let size = circuit.node_map.len() + circuit.branch_map.len();
        circuit.matrix = CircuitMatrix::new(size, complex);

        circuit.setup_devices(elements, models)?;

        // Materialize the sparsity pattern before Newton iteration.
        let status = CircuitStatus::default();
        circuit.stamp(&status)?;
        circuit.matrix.clear();

        Ok(circuit)
    }

    fn check_duplicates(&self, elements: &[Element]) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for elem in elements {
            if !seen.insert(elem.name.to_uppercase()) {
                return Err(CoreError::DuplicateElement(elem.name.clone()).into());
            }
        }
        Ok(())
    }

    /// Node indices in first-seen order, then branch rows for voltage
    /// sources and linear inductors in element order.
    fn assign_node_branch_maps(&mut self, elements: &[Element]) {
        for elem in elements {
            for node in &elem.nodes {
                if is_ground_name(node) {
                    continue;
                }
                let next = self.node_map.len() + 1;
                self.node_map.entry(node.clone()).or_insert(next);
            }
        }

        let mut branch = self.node_map.len() + 1;
        for elem in elements {
            let branch_augmented = elem.kind == ElementKind::Vsource
                || (elem.kind == ElementKind::Inductor && elem.model.is_none());
            if branch_augmented {
                self.branch_map.insert(elem.name.clone(), branch);
                branch += 1;
            }
        }
    }

    fn node_index(&self, name: &str) -> usize {
        if is_ground_name(name) {
            0
        } else {
            *self.node_map.get(name).expect("node assigned in first pass")
        }
    }

    fn terminal_indices<const N: usize>(&self, elem: &Element) -> Result<[usize; N]> {
        if elem.nodes.len() != N {
            return Err(CoreError::TerminalCount {
                name: elem.name.clone(),
                expected: N,
                got: elem.nodes.len(),
            }
            .into());
        }
        let mut out = [0usize; N];
        for (i, n) in elem.nodes.iter().enumerate() {
            out[i] = self.node_index(n);
        }
        Ok(out)
    }

    fn model_for<'m>(
        &self,
        elem: &Element,
        models: &'m IndexMap<String, ModelCard>,
        accepted: &[ModelKind],
    ) -> Result<&'m ModelCard> {
        let model_name = elem
            .model
            .as_deref()
            .ok_or_else(|| CoreError::UnknownModel(format!("{} (no model given)", elem.name)))?;
        let card = models
            .get(&model_name.to_uppercase())
            .ok_or_else(|| CoreError::UnknownModel(model_name.to_string()))?;
        if !accepted.contains(&card.kind) {
            return Err(CoreError::UnknownModel(format!(
                "{}: model {} has the wrong type",
                elem.name, model_name
            ))
            .into());
        }
        Ok(card)
    }

    fn setup_devices(
        &mut self,
        elements: &[Element],
        models: &IndexMap<String, ModelCard>,
    ) -> Result<()> {
        // Mutual couplings are linked after every inductor exists.
        for elem in elements.iter().filter(|e| e.kind != ElementKind::Mutual) {
            let device = self.create_device(elem, models)?;
            self.devices.push(device);
        }
        for elem in elements.iter().filter(|e| e.kind == ElementKind::Mutual) {
            let device = self.create_mutual(elem)?;
            self.devices.push(device);
        }

        // Couplings over magnetic windings own the winding companions.
        let mut coupled_names: Vec<String> = Vec::new();
        for dev in &self.devices {
            if let Device::Mutual(k) = dev {
                coupled_names.extend(k.inductor_names.iter().map(|n| n.to_uppercase()));
            }
        }
        for dev in &mut self.devices {
            if let Device::Magnetic(w) = dev {
                if coupled_names.contains(&w.name.to_uppercase()) {
                    w.coupled = true;
                }
            }
        }
        Ok(())
    }

    fn create_device(
        &mut self,
        elem: &Element,
        models: &IndexMap<String, ModelCard>,
    ) -> Result<Device> {
        match elem.kind {
            ElementKind::Resistor => {
                let nodes = self.terminal_indices::<2>(elem)?;
                let mut r = Resistor::new(&elem.name, nodes, elem.value);
                if let Some(&tc1) = elem.params.get("tc1") {
                    r.tc1 = tc1;
                }
                if let Some(&tc2) = elem.params.get("tc2") {
                    r.tc2 = tc2;
                }
                Ok(Device::Resistor(r))
            }
            ElementKind::Capacitor => {
                let nodes = self.terminal_indices::<2>(elem)?;
                Ok(Device::Capacitor(Capacitor::new(
                    &elem.name, nodes, elem.value,
                )))
            }
            ElementKind::Inductor => {
                let nodes = self.terminal_indices::<2>(elem)?;
                if elem.model.is_some() {
                    let card = self.model_for(elem, models, &[ModelKind::Core])?;
                    let core_index = self.core_for(card);
                    let turns = elem.params.get("turns").copied().unwrap_or(1.0);
                    Ok(Device::Magnetic(MagneticInductor::new(
                        &elem.name, nodes, turns, core_index,
                    )))
                } else {
                    let branch = self.branch_map[&elem.name];
                    Ok(Device::Inductor(Inductor::new(
                        &elem.name, nodes, elem.value, branch,
                    )))
                }
            }
            ElementKind::Diode => {
                let nodes = self.terminal_indices::<2>(elem)?;
                let card = self.model_for(elem, models, &[ModelKind::Diode])?;
                Ok(Device::Diode(Diode::new(
                    &elem.name,
                    nodes,
                    DiodeParams::from_model(card),
                )))
            }
            ElementKind::Bjt => {
                let nodes = self.terminal_indices::<3>(elem)?;
                let card = self.model_for(elem, models, &[ModelKind::Npn, ModelKind::Pnp])?;
                Ok(Device::Bjt(Bjt::new(
                    &elem.name,
                    nodes,
                    card.kind,
                    BjtParams::from_model(card),
                )))
            }
            ElementKind::Mosfet => {
                let nodes = self.terminal_indices::<4>(elem)?;
                let card = self.model_for(elem, models, &[ModelKind::Nmos, ModelKind::Pmos])?;
                let mut params = MosfetParams::from_model(card);
                if let Some(&l) = elem.params.get("l") {
                    params.l = l;
                }
                if let Some(&w) = elem.params.get("w") {
                    params.w = w;
                }
                Ok(Device::Mosfet(Mosfet::new(
                    &elem.name, nodes, card.kind, params,
                )))
            }
            ElementKind::Vsource => {
                let nodes = self.terminal_indices::<2>(elem)?;
                let branch = self.branch_map[&elem.name];
                let waveform = match &elem.source {
                    Some(spec) => Waveform::from_spec(spec),
                    None => Waveform::Dc(elem.value),
                };
                let mut v = VoltageSource::new(&elem.name, nodes, waveform, branch);
                if let Some((mag, phase)) = elem.ac {
                    v.ac_mag = mag;
                    v.ac_phase = phase;
                }
                Ok(Device::Vsource(v))
            }
            ElementKind::Isource => {
                let nodes = self.terminal_indices::<2>(elem)?;
                let waveform = match &elem.source {
                    Some(spec) => Waveform::from_spec(spec),
                    None => Waveform::Dc(elem.value),
                };
                let mut i = CurrentSource::new(&elem.name, nodes, waveform);
                if let Some((mag, phase)) = elem.ac {
                    i.ac_mag = mag;
                    i.ac_phase = phase;
                }
                Ok(Device::Isource(i))
            }
            ElementKind::Mutual => unreachable!("K elements are linked separately"),
        }
    }

    fn core_for(&mut self, card: &ModelCard) -> usize {
        let key = card.name.to_uppercase();
        if let Some(&idx) = self.core_names.get(&key) {
            return idx;
        }
        let idx = self.cores.len();
        self.cores
            .push(JilesAthertonCore::new(CoreParams::from_model(card)));
        self.core_names.insert(key, idx);
        idx
    }

    fn create_mutual(&self, elem: &Element) -> Result<Device> {
        let k = elem.value;
        if !(-1.0..=1.0).contains(&k) {
            return Err(CoreError::InvalidCoupling {
                name: elem.name.clone(),
                reason: format!("coefficient {k} outside [-1, 1]"),
            }
            .into());
        }
        if elem.couples.len() < 2 {
            return Err(CoreError::InvalidCoupling {
                name: elem.name.clone(),
                reason: "requires at least two inductors".into(),
            }
            .into());
        }

        let mut magnetic_count = 0;
        for ind_name in &elem.couples {
            let dev = self
                .devices
                .iter()
                .find(|d| d.name().eq_ignore_ascii_case(ind_name))
                .ok_or_else(|| CoreError::InvalidCoupling {
                    name: elem.name.clone(),
                    reason: format!("inductor {ind_name} not found"),
                })?;
            match dev {
                Device::Inductor(_) => {}
                Device::Magnetic(_) => magnetic_count += 1,
                _ => {
                    return Err(CoreError::InvalidCoupling {
                        name: elem.name.clone(),
                        reason: format!("{ind_name} is not an inductor"),
                    }
                    .into());
                }
            }
        }
        if magnetic_count != 0 && magnetic_count != elem.couples.len() {
            return Err(CoreError::InvalidCoupling {
                name: elem.name.clone(),
                reason: "cannot mix linear inductors and core windings".into(),
            }
            .into());
        }

        Ok(Device::Mutual(Mutual::new(
            &elem.name,
            elem.couples.clone(),
            k,
        )))
    }

    /// Advance every magnetic core to the summed winding magnetomotive
    /// force. No-op for unchanged fields, so Newton re-stamps are safe.
    fn advance_cores(&mut self, status: &CircuitStatus) {
        if self.cores.is_empty() {
            return;
        }
        let mut mmf = vec![0.0; self.cores.len()];
        for dev in &self.devices {
            if let Device::Magnetic(w) = dev {
                mmf[w.core_index] += w.mmf();
            }
        }
        for (idx, core) in self.cores.iter_mut().enumerate() {
            let h = mmf[idx] / core.params.len;
            core.calculate(h, status.temp);
        }
    }

    /// Snapshot of every inductive device for mutual-coupling stamps.
    fn winding_snapshot(&self) -> IndexMap<String, CoupledWinding> {
        let mut map = IndexMap::new();
        for dev in &self.devices {
            match dev {
                Device::Inductor(l) => {
                    map.insert(
                        l.name.to_uppercase(),
                        CoupledWinding {
                            name: l.name.clone(),
                            branch: Some(l.branch),
                            nodes: l.nodes,
                            inductance: l.inductance,
                            current_prev: l.current_prev,
                            voltage_prev: l.voltage_prev,
                        },
                    );
                }
                Device::Magnetic(w) => {
                    map.insert(
                        w.name.to_uppercase(),
                        CoupledWinding {
                            name: w.name.clone(),
                            branch: None,
                            nodes: w.nodes,
                            inductance: w.effective_inductance(&self.cores[w.core_index]),
                            current_prev: w.current_prev,
                            voltage_prev: w.voltage_prev,
                        },
                    );
                }
                _ => {}
            }
        }
        map
    }

    /// Stamp every device into the circuit's own matrix.
    pub fn stamp(&mut self, status: &CircuitStatus) -> Result<()> {
        self.advance_cores(status);
        let windings = self.winding_snapshot();

        let Self {
            devices,
            cores,
            matrix,
            ..
        } = self;
        stamp_devices(devices, cores, &windings, matrix, status, false)
    }

    /// Stamp only the linear devices into a caller-provided matrix.
    /// Used by the operating-point initial estimate.
    pub fn stamp_linear_into(
        &mut self,
        mat: &mut CircuitMatrix,
        status: &CircuitStatus,
    ) -> Result<()> {
        self.advance_cores(status);
        let windings = self.winding_snapshot();

        let Self { devices, cores, .. } = self;
        stamp_devices(devices, cores, &windings, mat, status, true)
    }

    /// Push the previous solution into every nonlinear device.
    pub fn update_nonlinear_voltages(&mut self, solution: &[f64]) -> Result<()> {
        for dev in &mut self.devices {
            if let Some(nl) = dev.as_nonlinear() {
                nl.update_voltages(solution)?;
            }
        }
        Ok(())
    }

    /// Capture the just-solved state in every time-dependent device.
    pub fn load_state(&mut self, status: &CircuitStatus) {
        let solution = self.matrix.solution().to_vec();
        for dev in &mut self.devices {
            if let Some(td) = dev.as_time_dependent() {
                td.load_state(&solution, status);
            }
        }
    }

    /// Promote current state to previous after an accepted step.
    pub fn update_state(&mut self, status: &CircuitStatus) {
        let solution = self.matrix.solution().to_vec();

        // Coupled magnetic groups need their previous state; compute the
        // inverse-inductance recurrence before devices promote it away.
        let coupled_currents = self.coupled_current_updates(&solution, status);

        for dev in &mut self.devices {
            if let Some(td) = dev.as_time_dependent() {
                td.update_state(&solution, status);
            }
        }

        for (name, current) in coupled_currents {
            for dev in &mut self.devices {
                if let Device::Magnetic(w) = dev {
                    if w.name.eq_ignore_ascii_case(&name) {
                        w.current = current;
                        w.current_prev = current;
                    }
                }
            }
        }
    }

    /// New currents for K-coupled magnetic windings:
    /// `i_n = i_prev + (dt/2) * G * (v_n + v_prev)` per group.
    fn coupled_current_updates(
        &self,
        solution: &[f64],
        status: &CircuitStatus,
    ) -> Vec<(String, f64)> {
        let dt = status.time_step;
        if dt <= 0.0 {
            return Vec::new();
        }

        let windings = self.winding_snapshot();
        let mut out = Vec::new();
        for dev in &self.devices {
            let Device::Mutual(k) = dev else { continue };
            let group: Vec<CoupledWinding> = k
                .inductor_names
                .iter()
                .map(|n| windings[&n.to_uppercase()].clone())
                .collect();
            if !Mutual::is_magnetic(&group) {
                continue;
            }
            let gamma = k.inverse_inductance(&group);
            for (r, wr) in group.iter().enumerate() {
                let mut i_new = wr.current_prev;
                for (c, wc) in group.iter().enumerate() {
                    let v_new =
                        node_voltage(solution, wc.nodes[0]) - node_voltage(solution, wc.nodes[1]);
                    i_new += 0.5 * dt * gamma[(r, c)] * (v_new + wc.voltage_prev);
                }
                out.push((wr.name.clone(), i_new));
            }
        }
        out
    }

    /// Maximum per-device LTE estimate for the current step.
    pub fn max_lte(&self, status: &CircuitStatus) -> f64 {
        self.devices
            .iter()
            .filter_map(|d| d.lte(status))
            .fold(0.0, f64::max)
    }

    /// Published solution: `V(node)` for every node, `I(name)` for every
    /// branch-augmented device, and Ohm's-law currents for resistors.
    pub fn get_solution(&self) -> IndexMap<String, f64> {
        let x = self.matrix.solution();
        let mut out = IndexMap::new();

        for (name, &idx) in &self.node_map {
            out.insert(format!("V({name})"), x[idx]);
        }
        for (name, &idx) in &self.branch_map {
            out.insert(format!("I({name})"), -x[idx]);
        }
        for dev in &self.devices {
            if let Device::Resistor(r) = dev {
                let v1 = node_voltage(x, r.nodes[0]);
                let v2 = node_voltage(x, r.nodes[1]);
                out.insert(
                    format!("I({})", r.name),
                    (v1 - v2) * r.conductance(self.status.temp),
                );
            }
        }
        out
    }

    /// Complex solution pairs for AC publication, keyed like
    /// [`Circuit::get_solution`].
    pub fn get_complex_solution(&self) -> IndexMap<String, (f64, f64)> {
        let mut out = IndexMap::new();
        for (name, &idx) in &self.node_map {
            out.insert(format!("V({name})"), self.matrix.get_complex_solution(idx));
        }
        for (name, &idx) in &self.branch_map {
            let (re, im) = self.matrix.get_complex_solution(idx);
            out.insert(format!("I({name})"), (-re, -im));
        }
        out
    }

    /// Replace the DC level of a named V or I source; used by DC sweeps.
    pub fn set_source_value(&mut self, name: &str, value: f64) -> Result<()> {
        for dev in &mut self.devices {
            if dev.name().eq_ignore_ascii_case(name) {
                match dev {
                    Device::Vsource(v) => {
                        v.set_dc_value(value);
                        return Ok(());
                    }
                    Device::Isource(i) => {
                        i.set_dc_value(value);
                        return Ok(());
                    }
                    _ => break,
                }
            }
        }
        Err(CoreError::NodeNotFound(format!("source {name}")).into())
    }

    /// DC level of a named V or I source.
    pub fn source_value(&self, name: &str) -> Option<f64> {
        self.devices.iter().find_map(|dev| {
            if !dev.name().eq_ignore_ascii_case(name) {
                return None;
            }
            match dev {
                Device::Vsource(v) => Some(v.dc_value()),
                Device::Isource(i) => Some(i.dc_value()),
                _ => None,
            }
        })
    }

    /// Scale every voltage source; the source-stepping homotopy ramps
    /// this from a small factor back to 1.0.
    pub fn scale_voltage_sources(&mut self, factor: f64) {
        for dev in &mut self.devices {
            if let Device::Vsource(v) = dev {
                v.scale = factor;
            }
        }
    }

    pub fn has_nonlinear_devices(&self) -> bool {
        self.devices.iter().any(|d| d.is_nonlinear())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matrix(&self) -> &CircuitMatrix {
        &self.matrix
    }

    pub fn matrix_mut(&mut self) -> &mut CircuitMatrix {
        &mut self.matrix
    }

    pub fn node_map(&self) -> &IndexMap<String, usize> {
        &self.node_map
    }

    pub fn branch_map(&self) -> &IndexMap<String, usize> {
        &self.branch_map
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn num_nodes(&self) -> usize {
        self.node_map.len()
    }

    pub fn size(&self) -> usize {
        self.node_map.len() + self.branch_map.len()
    }

    pub fn cores(&self) -> &[JilesAthertonCore] {
        &self.cores
    }
}

fn stamp_devices(
    devices: &mut [Device],
    cores: &[JilesAthertonCore],
    windings: &IndexMap<String, CoupledWinding>,
    mat: &mut CircuitMatrix,
    status: &CircuitStatus,
    linear_only: bool,
) -> Result<()> {
    for dev in devices.iter_mut() {
        if linear_only && dev.is_nonlinear() {
            continue;
        }
        match dev {
            Device::Mutual(k) => {
                let snapshot: Vec<CoupledWinding> = k
                    .inductor_names
                    .iter()
                    .map(|n| windings[&n.to_uppercase()].clone())
                    .collect();
                k.stamp(mat, &snapshot, status)?;
            }
            Device::Magnetic(w) => {
                w.stamp(mat, &cores[w.core_index], status)?;
            }
            other => other.stamp(mat, status)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn divider_elements() -> Vec<Element> {
        vec![
            Element::new(
                ElementKind::Vsource,
                "V1",
                vec!["1".into(), "0".into()],
                10.0,
            ),
            Element::new(
                ElementKind::Resistor,
                "R1",
                vec!["1".into(), "2".into()],
                1000.0,
            ),
            Element::new(
                ElementKind::Resistor,
                "R2",
                vec!["2".into(), "0".into()],
                1000.0,
            ),
        ]
    }

    #[test]
    fn test_node_assignment_first_seen() {
        let circuit =
            Circuit::build("divider", &divider_elements(), &IndexMap::new(), false).unwrap();
        assert_eq!(circuit.node_map()["1"], 1);
        assert_eq!(circuit.node_map()["2"], 2);
        assert_eq!(circuit.branch_map()["V1"], 3);
        assert_eq!(circuit.size(), 3);
    }

    #[test]
    fn test_divider_solve() {
        let mut circuit =
            Circuit::build("divider", &divider_elements(), &IndexMap::new(), false).unwrap();
        let status = CircuitStatus::default();
        circuit.matrix_mut().clear();
        circuit.stamp(&status).unwrap();
        circuit.matrix_mut().factor_and_solve().unwrap();

        let solution = circuit.get_solution();
        assert!((solution["V(1)"] - 10.0).abs() < 1e-9);
        assert!((solution["V(2)"] - 5.0).abs() < 1e-9);
        assert!((solution["I(V1)"] + 0.005).abs() < 1e-9);
        // Resistor current published via Ohm's law.
        assert!((solution["I(R1)"] - 0.005).abs() < 1e-9);
    }

    #[test]
    fn test_ground_aliases() {
        let elements = vec![
            Element::new(
                ElementKind::Vsource,
                "V1",
                vec!["in".into(), "gnd".into()],
                1.0,
            ),
            Element::new(
                ElementKind::Resistor,
                "R1",
                vec!["in".into(), "GND".into()],
                1.0,
            ),
        ];
        let circuit = Circuit::build("alias", &elements, &IndexMap::new(), false).unwrap();
        assert_eq!(circuit.num_nodes(), 1);
    }

    #[test]
    fn test_duplicate_element_rejected() {
        let mut elements = divider_elements();
        elements.push(Element::new(
            ElementKind::Resistor,
            "R1",
            vec!["1".into(), "0".into()],
            1.0,
        ));
        let err = Circuit::build("dup", &elements, &IndexMap::new(), false);
        assert!(err.is_err());
    }

    #[test]
    fn test_wrong_terminal_count() {
        let elements = vec![Element::new(
            ElementKind::Resistor,
            "R1",
            vec!["1".into()],
            1.0,
        )];
        assert!(Circuit::build("bad", &elements, &IndexMap::new(), false).is_err());
    }

    #[test]
    fn test_unknown_model_rejected() {
        let elements = vec![
            Element::new(
                ElementKind::Vsource,
                "V1",
                vec!["1".into(), "0".into()],
                1.0,
            ),
            {
                let mut d = Element::new(
                    ElementKind::Diode,
                    "D1",
                    vec!["1".into(), "0".into()],
                    0.0,
                );
                d.model = Some("NOPE".into());
                d
            },
        ];
        assert!(Circuit::build("bad", &elements, &IndexMap::new(), false).is_err());
    }

    #[test]
    fn test_mutual_validation() {
        // K naming a resistor is rejected.
        let mut k = Element::new(ElementKind::Mutual, "K1", vec![], 0.9);
        k.couples = vec!["L1".into(), "R1".into()];
        let elements = vec![
            Element::new(
                ElementKind::Inductor,
                "L1",
                vec!["1".into(), "0".into()],
                1e-3,
            ),
            Element::new(
                ElementKind::Resistor,
                "R1",
                vec!["1".into(), "0".into()],
                1.0,
            ),
            k,
        ];
        assert!(Circuit::build("bad", &elements, &IndexMap::new(), false).is_err());
    }

    #[test]
    fn test_mutual_coefficient_range() {
        let mut k = Element::new(ElementKind::Mutual, "K1", vec![], 1.5);
        k.couples = vec!["L1".into(), "L2".into()];
        let elements = vec![
            Element::new(
                ElementKind::Inductor,
                "L1",
                vec!["1".into(), "0".into()],
                1e-3,
            ),
            Element::new(
                ElementKind::Inductor,
                "L2",
                vec!["2".into(), "0".into()],
                1e-3,
            ),
            k,
        ];
        assert!(Circuit::build("bad", &elements, &IndexMap::new(), false).is_err());
    }

    #[test]
    fn test_inductor_branch_rows() {
        let elements = vec![
            Element::new(
                ElementKind::Vsource,
                "V1",
                vec!["1".into(), "0".into()],
                1.0,
            ),
            Element::new(
                ElementKind::Inductor,
                "L1",
                vec!["1".into(), "2".into()],
                1e-3,
            ),
            Element::new(
                ElementKind::Resistor,
                "R1",
                vec!["2".into(), "0".into()],
                1.0,
            ),
        ];
        let circuit = Circuit::build("rl", &elements, &IndexMap::new(), false).unwrap();
        // 2 nodes + 2 branch rows (V1, L1).
        assert_eq!(circuit.size(), 4);
        assert_eq!(circuit.branch_map()["V1"], 3);
        assert_eq!(circuit.branch_map()["L1"], 4);
    }

    #[test]
    fn test_magnetic_core_arena_shared() {
        let mut models = IndexMap::new();
        models.insert(
            "TX".to_string(),
            ModelCard::new(ModelKind::Core, "TX"),
        );

        let mut lp = Element::new(
            ElementKind::Inductor,
            "LP",
            vec!["1".into(), "0".into()],
            0.0,
        );
        lp.model = Some("TX".into());
        lp.params.insert("turns".into(), 300.0);
        let mut ls = Element::new(
            ElementKind::Inductor,
            "LS",
            vec!["2".into(), "0".into()],
            0.0,
        );
        ls.model = Some("TX".into());
        ls.params.insert("turns".into(), 150.0);

        let circuit = Circuit::build("tx", &[lp, ls], &models, false).unwrap();
        // One shared core, no branch rows for windings.
        assert_eq!(circuit.cores().len(), 1);
        assert_eq!(circuit.branch_map().len(), 0);
    }

    #[test]
    fn test_source_value_roundtrip() {
        let mut circuit =
            Circuit::build("divider", &divider_elements(), &IndexMap::new(), false).unwrap();
        assert_eq!(circuit.source_value("V1"), Some(10.0));
        circuit.set_source_value("V1", 3.0).unwrap();
        assert_eq!(circuit.source_value("V1"), Some(3.0));
        assert!(circuit.set_source_value("R1", 1.0).is_err());
    }
}
