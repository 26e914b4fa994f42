//! Netlist statement parsing: elements, models, and analysis commands.

use indexmap::IndexMap;

use nodal_core::units::parse_value;
use nodal_core::{Element, ElementKind, ModelCard, ModelKind, SourceSpec};

use crate::error::{Error, Result};
use crate::lexer::{logical_lines, tokenize};

/// AC sweep spacing as written in the netlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcSweepKind {
    Dec,
    Oct,
    Lin,
}

/// One DC sweep clause of a `.dc` command.
#[derive(Debug, Clone, PartialEq)]
pub struct DcSweepCommand {
    pub source: String,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

/// A dot-command analysis request, in netlist order.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisCommand {
    Op,
    Tran {
        tstep: f64,
        tstop: f64,
        tstart: f64,
        tmax: f64,
        uic: bool,
    },
    Ac {
        sweep: AcSweepKind,
        num_points: usize,
        fstart: f64,
        fstop: f64,
    },
    Dc {
        sweeps: Vec<DcSweepCommand>,
    },
}

/// A parsed netlist: title, elements in order, model cards, analyses.
#[derive(Debug, Clone, Default)]
pub struct Deck {
    pub title: String,
    pub elements: Vec<Element>,
    pub models: IndexMap<String, ModelCard>,
    pub analyses: Vec<AnalysisCommand>,
}

impl Deck {
    /// Whether any analysis needs the complex matrix.
    pub fn wants_ac(&self) -> bool {
        self.analyses
            .iter()
            .any(|a| matches!(a, AnalysisCommand::Ac { .. }))
    }
}

/// Parse a complete netlist.
pub fn parse(input: &str) -> Result<Deck> {
    let (title, lines) = logical_lines(input);
    let mut deck = Deck {
        title,
        ..Default::default()
    };

    for line in &lines {
        let tokens = tokenize(&line.text);
        if tokens.is_empty() {
            continue;
        }
        let head = tokens[0].to_uppercase();

        if head.starts_with('.') {
            parse_dot_command(&mut deck, line.number, &head, &tokens)?;
        } else {
            let element = parse_element(line.number, &tokens)?;
            deck.elements.push(element);
        }
    }

    Ok(deck)
}

fn value_of(line: usize, token: &str) -> Result<f64> {
    parse_value(token).ok_or_else(|| Error::InvalidValue {
        line,
        token: token.to_string(),
    })
}

/// Split a `key=value` token; keys are lower-cased.
fn key_value(line: usize, token: &str) -> Result<(String, f64)> {
    let (key, value) = token.split_once('=').ok_or_else(|| {
        Error::syntax(line, format!("expected key=value, got '{token}'"))
    })?;
    Ok((key.trim().to_lowercase(), value_of(line, value.trim())?))
}

fn parse_element(line: usize, tokens: &[String]) -> Result<Element> {
    let name = tokens[0].clone();
    let kind = name
        .chars()
        .next()
        .and_then(ElementKind::from_leading_char)
        .ok_or_else(|| Error::UnknownElement {
            line,
            name: name.clone(),
        })?;

    match kind {
        ElementKind::Resistor | ElementKind::Capacitor => {
            require(line, tokens, 4)?;
            let mut elem = Element::new(
                kind,
                &name,
                vec![tokens[1].clone(), tokens[2].clone()],
                value_of(line, &tokens[3])?,
            );
            for token in &tokens[4..] {
                let (key, value) = key_value(line, token)?;
                elem.params.insert(key, value);
            }
            Ok(elem)
        }
        ElementKind::Inductor => parse_inductor(line, &name, tokens),
        ElementKind::Mutual => parse_mutual(line, &name, tokens),
        ElementKind::Diode => {
            require(line, tokens, 4)?;
            let mut elem = Element::new(
                kind,
                &name,
                vec![tokens[1].clone(), tokens[2].clone()],
                0.0,
            );
            elem.model = Some(tokens[3].clone());
            Ok(elem)
        }
        ElementKind::Bjt => {
            require(line, tokens, 5)?;
            let mut elem = Element::new(
                kind,
                &name,
                vec![tokens[1].clone(), tokens[2].clone(), tokens[3].clone()],
                0.0,
            );
            elem.model = Some(tokens[4].clone());
            Ok(elem)
        }
        ElementKind::Mosfet => {
            require(line, tokens, 6)?;
            let mut elem = Element::new(
                kind,
                &name,
                vec![
                    tokens[1].clone(),
                    tokens[2].clone(),
                    tokens[3].clone(),
                    tokens[4].clone(),
                ],
                0.0,
            );
            elem.model = Some(tokens[5].clone());
            for token in &tokens[6..] {
                let (key, value) = key_value(line, token)?;
                elem.params.insert(key, value);
            }
            Ok(elem)
        }
        ElementKind::Vsource | ElementKind::Isource => parse_source(line, kind, &name, tokens),
    }
}

fn require(line: usize, tokens: &[String], want: usize) -> Result<()> {
    if tokens.len() < want {
        return Err(Error::syntax(
            line,
            format!("{}: expected at least {} fields", tokens[0], want),
        ));
    }
    Ok(())
}

/// `Lname n1 n2 value` or `Lname n1 n2 core=NAME turns=N`.
fn parse_inductor(line: usize, name: &str, tokens: &[String]) -> Result<Element> {
    require(line, tokens, 4)?;
    let nodes = vec![tokens[1].clone(), tokens[2].clone()];

    if tokens[3].contains('=') {
        let mut elem = Element::new(ElementKind::Inductor, name, nodes, 0.0);
        for token in &tokens[3..] {
            let (key, raw_value) = token.split_once('=').ok_or_else(|| {
                Error::syntax(line, format!("expected key=value, got '{token}'"))
            })?;
            let key = key.trim().to_lowercase();
            if key == "core" {
                elem.model = Some(raw_value.trim().to_string());
            } else {
                elem.params.insert(key, value_of(line, raw_value.trim())?);
            }
        }
        if elem.model.is_none() {
            return Err(Error::syntax(line, format!("{name}: missing core=")));
        }
        Ok(elem)
    } else {
        Ok(Element::new(
            ElementKind::Inductor,
            name,
            nodes,
            value_of(line, &tokens[3])?,
        ))
    }
}

/// `Kname L1 L2 [L3 ...] k`.
fn parse_mutual(line: usize, name: &str, tokens: &[String]) -> Result<Element> {
    require(line, tokens, 4)?;
    let k = value_of(line, tokens.last().unwrap())?;
    let mut elem = Element::new(ElementKind::Mutual, name, Vec::new(), k);
    elem.couples = tokens[1..tokens.len() - 1].to_vec();
    Ok(elem)
}

/// V/I source: `name n1 n2 (DC v | value) [waveform] [AC mag [phase]]`.
fn parse_source(line: usize, kind: ElementKind, name: &str, tokens: &[String]) -> Result<Element> {
    require(line, tokens, 4)?;
    let nodes = vec![tokens[1].clone(), tokens[2].clone()];
    let mut elem = Element::new(kind, name, nodes, 0.0);

    let mut i = 3;
    while i < tokens.len() {
        let token = tokens[i].to_uppercase();
        match token.as_str() {
            "DC" => {
                i += 1;
                require(line, tokens, i + 1)?;
                let value = value_of(line, &tokens[i])?;
                elem.value = value;
                elem.source = Some(SourceSpec::Dc { value });
                i += 1;
            }
            "AC" => {
                i += 1;
                require(line, tokens, i + 1)?;
                let mag = value_of(line, &tokens[i])?;
                i += 1;
                let phase = if i < tokens.len() {
                    match parse_value(&tokens[i]) {
                        Some(p) => {
                            i += 1;
                            p
                        }
                        None => 0.0,
                    }
                } else {
                    0.0
                };
                elem.ac = Some((mag, phase));
            }
            "SIN(" => {
                let args = group_args(line, tokens, &mut i)?;
                if args.len() < 3 {
                    return Err(Error::syntax(line, "SIN needs offset, amplitude, freq"));
                }
                elem.source = Some(SourceSpec::Sin {
                    offset: args[0],
                    amplitude: args[1],
                    freq: args[2],
                    phase: args.get(3).copied().unwrap_or(0.0),
                });
                elem.value = args[0];
            }
            "PULSE(" => {
                let args = group_args(line, tokens, &mut i)?;
                if args.len() < 7 {
                    return Err(Error::syntax(line, "PULSE needs 7 arguments"));
                }
                elem.source = Some(SourceSpec::Pulse {
                    v1: args[0],
                    v2: args[1],
                    delay: args[2],
                    rise: args[3],
                    fall: args[4],
                    width: args[5],
                    period: args[6],
                });
                elem.value = args[0];
            }
            "PWL(" => {
                let args = group_args(line, tokens, &mut i)?;
                if args.len() < 2 || args.len() % 2 != 0 {
                    return Err(Error::syntax(line, "PWL needs time/value pairs"));
                }
                let points: Vec<(f64, f64)> =
                    args.chunks(2).map(|pair| (pair[0], pair[1])).collect();
                for pair in points.windows(2) {
                    if pair[1].0 <= pair[0].0 {
                        return Err(Error::syntax(line, "PWL times must be increasing"));
                    }
                }
                elem.value = points[0].1;
                elem.source = Some(SourceSpec::Pwl { points });
            }
            _ => {
                // A bare numeric token is a DC value.
                let value = value_of(line, &tokens[i])?;
                elem.value = value;
                elem.source = Some(SourceSpec::Dc { value });
                i += 1;
            }
        }
    }

    if elem.source.is_none() {
        elem.source = Some(SourceSpec::Dc { value: 0.0 });
    }
    Ok(elem)
}

/// Consume the arguments of a `NAME( ... )` group starting at the marker
/// token; leaves `i` past the closing parenthesis.
fn group_args(line: usize, tokens: &[String], i: &mut usize) -> Result<Vec<f64>> {
    *i += 1;
    let mut args = Vec::new();
    while *i < tokens.len() && tokens[*i] != ")" {
        args.push(value_of(line, &tokens[*i])?);
        *i += 1;
    }
    if *i >= tokens.len() {
        return Err(Error::syntax(line, "unterminated parenthesized group"));
    }
    *i += 1; // closing ')'
    Ok(args)
}

fn parse_dot_command(
    deck: &mut Deck,
    line: usize,
    head: &str,
    tokens: &[String],
) -> Result<()> {
    match head {
        ".OP" => {
            deck.analyses.push(AnalysisCommand::Op);
            Ok(())
        }
        ".TRAN" => {
            require(line, tokens, 3)?;
            let tstep = value_of(line, &tokens[1])?;
            let tstop = value_of(line, &tokens[2])?;
            let mut tstart = 0.0;
            let mut tmax = 0.0;
            let mut uic = false;
            let mut idx = 3;
            if idx < tokens.len() && !tokens[idx].eq_ignore_ascii_case("uic") {
                tstart = value_of(line, &tokens[idx])?;
                idx += 1;
            }
            if idx < tokens.len() && !tokens[idx].eq_ignore_ascii_case("uic") {
                tmax = value_of(line, &tokens[idx])?;
                idx += 1;
            }
            if idx < tokens.len() && tokens[idx].eq_ignore_ascii_case("uic") {
                uic = true;
            }
            deck.analyses.push(AnalysisCommand::Tran {
                tstep,
                tstop,
                tstart,
                tmax,
                uic,
            });
            Ok(())
        }
        ".AC" => {
            require(line, tokens, 5)?;
            let sweep = match tokens[1].to_uppercase().as_str() {
                "DEC" => AcSweepKind::Dec,
                "OCT" => AcSweepKind::Oct,
                "LIN" => AcSweepKind::Lin,
                other => {
                    return Err(Error::syntax(line, format!("unknown AC sweep '{other}'")));
                }
            };
            deck.analyses.push(AnalysisCommand::Ac {
                sweep,
                num_points: value_of(line, &tokens[2])? as usize,
                fstart: value_of(line, &tokens[3])?,
                fstop: value_of(line, &tokens[4])?,
            });
            Ok(())
        }
        ".DC" => {
            require(line, tokens, 5)?;
            let mut sweeps = Vec::new();
            let mut idx = 1;
            while idx + 4 <= tokens.len() {
                sweeps.push(DcSweepCommand {
                    source: tokens[idx].clone(),
                    start: value_of(line, &tokens[idx + 1])?,
                    stop: value_of(line, &tokens[idx + 2])?,
                    step: value_of(line, &tokens[idx + 3])?,
                });
                idx += 4;
            }
            if sweeps.is_empty() {
                return Err(Error::syntax(line, ".dc needs source start stop incr"));
            }
            deck.analyses.push(AnalysisCommand::Dc { sweeps });
            Ok(())
        }
        ".MODEL" => parse_model(deck, line, tokens),
        ".END" => Ok(()),
        other => Err(Error::syntax(line, format!("unknown command '{other}'"))),
    }
}

/// `.model name TYPE(param=value ...)`.
fn parse_model(deck: &mut Deck, line: usize, tokens: &[String]) -> Result<()> {
    require(line, tokens, 3)?;
    let name = tokens[1].to_uppercase();

    // The type token may carry the opening parenthesis or stand alone.
    let type_token = &tokens[2];
    let kind_name = type_token.trim_end_matches('(');
    let kind = ModelKind::from_name(kind_name).ok_or_else(|| Error::UnknownModelType {
        line,
        kind: kind_name.to_string(),
    })?;

    let mut card = ModelCard::new(kind, &name);
    for token in &tokens[3..] {
        if token == ")" || token == "(" {
            continue;
        }
        let (key, value) = key_value(line, token)?;
        card.params.insert(key, value);
    }

    deck.models.insert(name, card);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_divider() {
        let deck = parse(
            "divider\n\
             V1 1 0 DC 10\n\
             R1 1 2 1k\n\
             R2 2 0 1k\n\
             .op\n\
             .end\n",
        )
        .unwrap();

        assert_eq!(deck.title, "divider");
        assert_eq!(deck.elements.len(), 3);
        assert_eq!(deck.analyses, vec![AnalysisCommand::Op]);

        let v1 = &deck.elements[0];
        assert_eq!(v1.kind, ElementKind::Vsource);
        assert_eq!(v1.value, 10.0);
        assert_eq!(v1.nodes, vec!["1", "0"]);

        let r1 = &deck.elements[1];
        assert_eq!(r1.value, 1000.0);
    }

    #[test]
    fn test_parse_sin_source() {
        let deck = parse("t\nVIN 1 0 SIN(0 5 1k)\n").unwrap();
        match deck.elements[0].source.as_ref().unwrap() {
            SourceSpec::Sin {
                offset,
                amplitude,
                freq,
                phase,
            } => {
                assert_eq!(*offset, 0.0);
                assert_eq!(*amplitude, 5.0);
                assert_eq!(*freq, 1000.0);
                assert_eq!(*phase, 0.0);
            }
            other => panic!("expected SIN, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_pulse_and_pwl() {
        let deck = parse(
            "t\n\
             V1 1 0 PULSE(0 1 0 1n 1n 1 2)\n\
             I1 2 0 PWL(0 0 1m 5 2m 0)\n",
        )
        .unwrap();

        match deck.elements[0].source.as_ref().unwrap() {
            SourceSpec::Pulse { v1, v2, period, .. } => {
                assert_eq!(*v1, 0.0);
                assert_eq!(*v2, 1.0);
                assert_eq!(*period, 2.0);
            }
            other => panic!("expected PULSE, got {other:?}"),
        }
        match deck.elements[1].source.as_ref().unwrap() {
            SourceSpec::Pwl { points } => assert_eq!(points.len(), 3),
            other => panic!("expected PWL, got {other:?}"),
        }
    }

    #[test]
    fn test_pwl_requires_increasing_times() {
        assert!(parse("t\nV1 1 0 PWL(0 0 1m 5 0.5m 1)\n").is_err());
    }

    #[test]
    fn test_parse_ac_spec() {
        let deck = parse("t\nV1 1 0 DC 0 AC 1 90\n.ac DEC 10 10 100k\n").unwrap();
        assert_eq!(deck.elements[0].ac, Some((1.0, 90.0)));
        assert!(deck.wants_ac());
        match &deck.analyses[0] {
            AnalysisCommand::Ac {
                sweep,
                num_points,
                fstart,
                fstop,
            } => {
                assert_eq!(*sweep, AcSweepKind::Dec);
                assert_eq!(*num_points, 10);
                assert_eq!(*fstart, 10.0);
                assert_eq!(*fstop, 1e5);
            }
            other => panic!("expected AC, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_model_card() {
        let deck = parse("t\nD1 1 0 D1N4148\n.model D1N4148 D(is=2.52e-9 n=1.752)\n").unwrap();
        let card = &deck.models["D1N4148"];
        assert_eq!(card.kind, ModelKind::Diode);
        assert_eq!(card.param("is", 0.0), 2.52e-9);
        assert_eq!(card.param("n", 0.0), 1.752);
        assert_eq!(deck.elements[0].model.as_deref(), Some("D1N4148"));
    }

    #[test]
    fn test_parse_magnetic_inductor() {
        let deck = parse("t\nLP 1 0 core=TX1 turns=300\n.model TX1 CORE(ms=1.6meg a=1100)\n")
            .unwrap();
        let lp = &deck.elements[0];
        assert_eq!(lp.model.as_deref(), Some("TX1"));
        assert_eq!(lp.params["turns"], 300.0);
        assert_eq!(deck.models["TX1"].kind, ModelKind::Core);
        assert_eq!(deck.models["TX1"].param("ms", 0.0), 1.6e6);
    }

    #[test]
    fn test_parse_mutual() {
        let deck = parse("t\nL1 1 0 1m\nL2 2 0 1m\nK1 L1 L2 0.95\n").unwrap();
        let k = &deck.elements[2];
        assert_eq!(k.kind, ElementKind::Mutual);
        assert_eq!(k.couples, vec!["L1", "L2"]);
        assert_eq!(k.value, 0.95);
    }

    #[test]
    fn test_parse_tran_variants() {
        let deck = parse("t\nR1 1 0 1\n.tran 10u 5m\n.tran 10u 5m 1m 50u uic\n").unwrap();
        assert_eq!(
            deck.analyses[0],
            AnalysisCommand::Tran {
                tstep: 10e-6,
                tstop: 5e-3,
                tstart: 0.0,
                tmax: 0.0,
                uic: false,
            }
        );
        match &deck.analyses[1] {
            AnalysisCommand::Tran {
                tstart, tmax, uic, ..
            } => {
                assert_eq!(*tstart, 1e-3);
                assert_eq!(*tmax, 50e-6);
                assert!(uic);
            }
            other => panic!("expected TRAN, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_dc_nested() {
        let deck = parse("t\nV1 1 0 1\nV2 2 0 1\n.dc V1 0 5 0.5 V2 0 1 0.1\n").unwrap();
        match &deck.analyses[0] {
            AnalysisCommand::Dc { sweeps } => {
                assert_eq!(sweeps.len(), 2);
                assert_eq!(sweeps[0].source, "V1");
                assert_eq!(sweeps[1].step, 0.1);
            }
            other => panic!("expected DC, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_element_rejected() {
        assert!(parse("t\nX1 1 0 foo\n").is_err());
    }

    #[test]
    fn test_mosfet_instance_params() {
        let deck =
            parse("t\nM1 1 2 0 0 NFET L=1u W=20u\n.model NFET NMOS(vto=0.7 kp=2e-5)\n").unwrap();
        let m = &deck.elements[0];
        assert_eq!(m.nodes.len(), 4);
        assert_eq!(m.params["l"], 1e-6);
        assert_eq!(m.params["w"], 20e-6);
    }
}
