//! Parser and writer for circuit files in Bristol Fashion
//! (<https://nigelsmart.github.io/MPC-Circuits/>).
//!
//! The format is line based: a `<num_gates> <num_wires>` header, one line per
//! I/O partition (`<num_parties> <wires_0> <wires_1> ...`), then one gate per
//! line as `<num_in> <num_out> <in_wires...> <out_wire> <TYPE>`. Lines may
//! carry `#` comments; blank lines are skipped.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use crate::circuit::{Circuit, CircuitError, Gate, GateKind};

/// Errors raised while parsing a circuit file.
#[derive(Debug)]
pub enum ParseError {
    /// The file could not be read.
    Io(io::Error),
    /// A line could not be tokenized into the expected fields.
    Syntax {
        /// 1-based line number in the input.
        line: usize,
        /// What went wrong.
        reason: String,
    },
    /// A gate line names a type this implementation does not support.
    UnknownGateType {
        /// 1-based line number in the input.
        line: usize,
        /// The offending type token.
        name: String,
    },
    /// The number of gate lines does not match the header.
    GateCountMismatch {
        /// Gate count announced by the header.
        expected: usize,
        /// Gate lines actually parsed.
        actual: usize,
    },
    /// The parsed circuit violates a structural invariant.
    Circuit(CircuitError),
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        ParseError::Io(e)
    }
}

impl From<CircuitError> for ParseError {
    fn from(e: CircuitError) -> Self {
        ParseError::Circuit(e)
    }
}

fn syntax(line: usize, reason: impl Into<String>) -> ParseError {
    ParseError::Syntax {
        line,
        reason: reason.into(),
    }
}

/// The content lines of the input: comments stripped, blanks skipped,
/// original line numbers retained for error reporting.
fn content_lines(reader: impl BufRead) -> Result<Vec<(usize, String)>, ParseError> {
    let mut lines = vec![];
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = match line.split_once('#') {
            Some((before, _)) => before,
            None => &line,
        };
        let line = line.trim();
        if !line.is_empty() {
            lines.push((i + 1, line.to_string()));
        }
    }
    Ok(lines)
}

fn parse_counts(line: usize, text: &str) -> Result<Vec<usize>, ParseError> {
    text.split_whitespace()
        .map(|tok| {
            tok.parse::<usize>()
                .map_err(|_| syntax(line, format!("expected a non-negative integer, got {tok:?}")))
        })
        .collect()
}

/// A partition line: the party count followed by one wire count per party.
fn parse_partition(line: usize, text: &str) -> Result<Vec<usize>, ParseError> {
    let counts = parse_counts(line, text)?;
    let Some((&parties, partition)) = counts.split_first() else {
        return Err(syntax(line, "empty partition line"));
    };
    if partition.len() != parties {
        return Err(syntax(
            line,
            format!("expected {parties} partition entries, got {}", partition.len()),
        ));
    }
    Ok(partition.to_vec())
}

fn parse_gate(line: usize, text: &str) -> Result<Gate, ParseError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let [ni, no, rest @ ..] = tokens.as_slice() else {
        return Err(syntax(line, "truncated gate line"));
    };
    let ni: usize = ni
        .parse()
        .map_err(|_| syntax(line, format!("bad input arity {ni:?}")))?;
    let no: usize = no
        .parse()
        .map_err(|_| syntax(line, format!("bad output arity {no:?}")))?;
    if no != 1 {
        return Err(syntax(line, format!("gates must have 1 output wire, got {no}")));
    }
    if ni != 1 && ni != 2 {
        return Err(syntax(line, format!("gates must have 1 or 2 input wires, got {ni}")));
    }
    if rest.len() != ni + 2 {
        return Err(syntax(
            line,
            format!("expected {} wires and a type, got {} tokens", ni + 1, rest.len()),
        ));
    }
    let wires: Vec<usize> = rest[..ni + 1]
        .iter()
        .map(|tok| {
            tok.parse::<usize>()
                .map_err(|_| syntax(line, format!("bad wire index {tok:?}")))
        })
        .collect::<Result<_, _>>()?;
    let kind = GateKind::from_name(rest[ni + 1]).ok_or_else(|| ParseError::UnknownGateType {
        line,
        name: rest[ni + 1].to_string(),
    })?;
    let gate = match wires.as_slice() {
        [a, out] => Gate::unary(kind, *a, *out),
        [a, b, out] => Gate::binary(kind, *a, *b, *out),
        _ => unreachable!("arity checked above"),
    };
    if kind.is_unary() != gate.b.is_none() {
        return Err(syntax(
            line,
            format!("{kind} gates take {} input wire(s)", if kind.is_unary() { 1 } else { 2 }),
        ));
    }
    Ok(gate)
}

/// Parses a circuit from a buffered reader and validates it.
pub fn parse(reader: impl BufRead) -> Result<Circuit, ParseError> {
    let lines = content_lines(reader)?;
    let mut lines = lines.into_iter();

    let (line, header) = lines.next().ok_or_else(|| syntax(0, "empty circuit file"))?;
    let header = parse_counts(line, &header)?;
    let [num_gates, num_wires] = header.as_slice() else {
        return Err(syntax(line, "header must be `<num_gates> <num_wires>`"));
    };
    let (num_gates, num_wires) = (*num_gates, *num_wires);

    let (line, text) = lines
        .next()
        .ok_or_else(|| syntax(line, "missing input partition line"))?;
    let input_partition = parse_partition(line, &text)?;
    let (line, text) = lines
        .next()
        .ok_or_else(|| syntax(line, "missing output partition line"))?;
    let output_partition = parse_partition(line, &text)?;

    let mut gates = Vec::with_capacity(num_gates);
    for (line, text) in lines {
        gates.push(parse_gate(line, &text)?);
    }
    if gates.len() != num_gates {
        return Err(ParseError::GateCountMismatch {
            expected: num_gates,
            actual: gates.len(),
        });
    }

    let circuit = Circuit {
        num_wires,
        input_partition,
        output_partition,
        gates,
    };
    circuit.validate()?;
    Ok(circuit)
}

/// Parses a circuit from a string.
pub fn parse_str(text: &str) -> Result<Circuit, ParseError> {
    parse(text.as_bytes())
}

/// Loads and parses a circuit file.
pub fn load(path: impl AsRef<Path>) -> Result<Circuit, ParseError> {
    parse(BufReader::new(File::open(path)?))
}

/// Writes a circuit in Bristol Fashion; the output parses back to an equal
/// circuit.
pub fn write(circuit: &Circuit, mut w: impl Write) -> io::Result<()> {
    writeln!(w, "{} {}", circuit.gates.len(), circuit.num_wires)?;
    for partition in [&circuit.input_partition, &circuit.output_partition] {
        write!(w, "{}", partition.len())?;
        for count in partition {
            write!(w, " {count}")?;
        }
        writeln!(w)?;
    }
    for gate in &circuit.gates {
        match gate.b {
            Some(b) => writeln!(w, "2 1 {} {} {} {}", gate.a, b, gate.out, gate.kind)?,
            None => writeln!(w, "1 1 {} {} {}", gate.a, gate.out, gate.kind)?,
        }
    }
    Ok(())
}

/// Writes a circuit to a Bristol Fashion string.
pub fn write_string(circuit: &Circuit) -> String {
    let mut out = vec![];
    write(circuit, &mut out).expect("writing to a Vec cannot fail");
    String::from_utf8(out).expect("the writer emits ASCII")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitError;

    const AND: &str = "\
# a single AND gate
1 3
2 1 1
1 1
2 1 0 1 2 AND
";

    #[test]
    fn parse_and_gate() {
        let circuit = parse_str(AND).unwrap();
        assert_eq!(circuit, Circuit::and_gate());
    }

    #[test]
    fn parse_accepts_inv_alias() {
        let circuit = parse_str("1 2\n1 1\n1 1\n1 1 0 1 INV\n").unwrap();
        assert_eq!(circuit, Circuit::not_gate());
    }

    #[test]
    fn roundtrip() {
        let circuits = [
            Circuit::and_gate(),
            Circuit::xor_gate(),
            Circuit::not_gate(),
            parse_str(
                "5 9\n2 2 2\n1 1\n\
                 2 1 0 2 4 XOR\n2 1 1 3 5 XOR\n1 1 4 6 INV\n1 1 5 7 INV\n2 1 6 7 8 AND\n",
            )
            .unwrap(),
        ];
        for circuit in circuits {
            assert_eq!(parse_str(&write_string(&circuit)).unwrap(), circuit);
        }
    }

    #[test]
    fn rejects_unknown_type() {
        let err = parse_str("1 3\n2 1 1\n1 1\n2 1 0 1 2 MAJ\n").unwrap_err();
        assert!(matches!(err, ParseError::UnknownGateType { name, .. } if name == "MAJ"));
    }

    #[test]
    fn rejects_undefined_wire_use() {
        let err = parse_str("1 4\n2 1 1\n1 1\n2 1 0 3 3 AND\n").unwrap_err();
        assert!(matches!(
            err,
            ParseError::Circuit(CircuitError::UndefinedWire(3))
        ));
    }

    #[test]
    fn rejects_out_of_range_wire() {
        let err = parse_str("1 3\n2 1 1\n1 1\n2 1 0 1 7 AND\n").unwrap_err();
        assert!(matches!(
            err,
            ParseError::Circuit(CircuitError::WireOutOfRange(7))
        ));
    }

    #[test]
    fn rejects_arity_mismatch() {
        let err = parse_str("1 4\n3 1 1 1\n1 1\n2 1 0 1 3 NOT\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn rejects_gate_count_mismatch() {
        let err = parse_str("2 3\n2 1 1\n1 1\n2 1 0 1 2 AND\n").unwrap_err();
        assert!(matches!(
            err,
            ParseError::GateCountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn rejects_partition_mismatch() {
        let err = parse_str("1 3\n2 1\n1 1\n2 1 0 1 2 AND\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn rejects_bad_header() {
        assert!(matches!(parse_str(""), Err(ParseError::Syntax { .. })));
        assert!(matches!(parse_str("1 2 3\n"), Err(ParseError::Syntax { .. })));
        assert!(matches!(parse_str("-1 3\n"), Err(ParseError::Syntax { .. })));
    }
}
