//! Parsed netlist elements and model cards.
//!
//! The parser delivers a flat, ordered list of [`Element`] values; the
//! topology stage owns the devices it constructs from them. Node names are
//! kept as strings here - index assignment happens in the topology.

use indexmap::IndexMap;

/// Device family selected by the first character of the element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Resistor,
    Capacitor,
    Inductor,
    Mutual,
    Diode,
    Bjt,
    Mosfet,
    Vsource,
    Isource,
}

impl ElementKind {
    /// Map a leading name character to its element kind.
    pub fn from_leading_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'R' => Some(Self::Resistor),
            'C' => Some(Self::Capacitor),
            'L' => Some(Self::Inductor),
            'K' => Some(Self::Mutual),
            'D' => Some(Self::Diode),
            'Q' => Some(Self::Bjt),
            'M' => Some(Self::Mosfet),
            'V' => Some(Self::Vsource),
            'I' => Some(Self::Isource),
            _ => None,
        }
    }

    /// Required terminal count, where fixed.
    pub fn terminal_count(&self) -> Option<usize> {
        match self {
            Self::Resistor | Self::Capacitor | Self::Inductor => Some(2),
            Self::Diode | Self::Vsource | Self::Isource => Some(2),
            Self::Bjt => Some(3),
            Self::Mosfet => Some(4),
            Self::Mutual => None,
        }
    }
}

/// Time-varying source description as parsed (evaluated by the device layer).
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    Dc {
        value: f64,
    },
    /// SIN(offset amplitude freq [phase_deg])
    Sin {
        offset: f64,
        amplitude: f64,
        freq: f64,
        phase: f64,
    },
    /// PULSE(v1 v2 delay rise fall width period)
    Pulse {
        v1: f64,
        v2: f64,
        delay: f64,
        rise: f64,
        fall: f64,
        width: f64,
        period: f64,
    },
    /// PWL(t1 v1 t2 v2 ...), strictly increasing times.
    Pwl {
        points: Vec<(f64, f64)>,
    },
}

impl SourceSpec {
    /// The value used for DC bias (OP, sweeps): the level before any
    /// time-dependent behavior starts.
    pub fn dc_value(&self) -> f64 {
        match self {
            SourceSpec::Dc { value } => *value,
            SourceSpec::Sin { offset, .. } => *offset,
            SourceSpec::Pulse { v1, .. } => *v1,
            SourceSpec::Pwl { points } => points.first().map(|&(_, v)| v).unwrap_or(0.0),
        }
    }
}

/// One netlist element as delivered by the parser.
#[derive(Debug, Clone)]
pub struct Element {
    pub kind: ElementKind,
    pub name: String,
    /// Terminal node names in element order ("0"/"gnd" alias ground).
    pub nodes: Vec<String>,
    /// Primary scalar: R/L/C value, K coupling coefficient, source DC level.
    pub value: f64,
    /// Model card reference (D/Q/M) or magnetic core name (L core=...).
    pub model: Option<String>,
    /// Instance parameters (turns=, l=, w=, ...), lower-cased keys.
    pub params: IndexMap<String, f64>,
    /// Waveform + AC stimulus for V/I sources.
    pub source: Option<SourceSpec>,
    /// AC magnitude and phase (degrees) for V/I sources.
    pub ac: Option<(f64, f64)>,
    /// Coupled inductor names for K elements.
    pub couples: Vec<String>,
}

impl Element {
    /// A bare element with just kind, name, nodes and value.
    pub fn new(kind: ElementKind, name: impl Into<String>, nodes: Vec<String>, value: f64) -> Self {
        Self {
            kind,
            name: name.into(),
            nodes,
            value,
            model: None,
            params: IndexMap::new(),
            source: None,
            ac: None,
            couples: Vec::new(),
        }
    }
}

/// `.model` card type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Diode,
    Core,
    Npn,
    Pnp,
    Nmos,
    Pmos,
}

impl ModelKind {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "D" => Some(Self::Diode),
            "CORE" => Some(Self::Core),
            "NPN" => Some(Self::Npn),
            "PNP" => Some(Self::Pnp),
            "NMOS" => Some(Self::Nmos),
            "PMOS" => Some(Self::Pmos),
            _ => None,
        }
    }
}

/// A `.model` parameter set. Devices pull named scalars and fall back to
/// their documented defaults for missing keys.
#[derive(Debug, Clone)]
pub struct ModelCard {
    pub kind: ModelKind,
    pub name: String,
    pub params: IndexMap<String, f64>,
}

impl ModelCard {
    pub fn new(kind: ModelKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            params: IndexMap::new(),
        }
    }

    /// Named parameter or the given default.
    pub fn param(&self, key: &str, default: f64) -> f64 {
        self.params.get(key).copied().unwrap_or(default)
    }
}

/// Ground aliases accepted anywhere a node name appears.
pub fn is_ground_name(name: &str) -> bool {
    name == "0" || name.eq_ignore_ascii_case("gnd")
}
