//! The boolean circuit model: gates, wires and the structural invariants that
//! make a circuit garbleable.
//!
//! Wires are dense indices `0..num_wires`. The first `num_inputs` wires are
//! the circuit inputs (assigned to the parties in partition order), the last
//! `num_outputs` wires are the outputs, and every other wire is written by
//! exactly one gate, in topological order.

use std::fmt;
use std::ops::Range;

/// The boolean function computed by a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateKind {
    /// Logical conjunction.
    And,
    /// Logical disjunction.
    Or,
    /// Exclusive or.
    Xor,
    /// Negated conjunction.
    Nand,
    /// Negated disjunction.
    Nor,
    /// Negation (the only unary kind).
    Not,
}

impl GateKind {
    /// Whether gates of this kind take a single input wire.
    pub fn is_unary(self) -> bool {
        self == GateKind::Not
    }

    /// Evaluates the gate function. Unary kinds ignore `b`.
    pub fn eval(self, a: bool, b: bool) -> bool {
        match self {
            GateKind::And => a && b,
            GateKind::Or => a || b,
            GateKind::Xor => a ^ b,
            GateKind::Nand => !(a && b),
            GateKind::Nor => !(a || b),
            GateKind::Not => !a,
        }
    }

    /// The canonical name used in circuit files.
    pub fn name(self) -> &'static str {
        match self {
            GateKind::And => "AND",
            GateKind::Or => "OR",
            GateKind::Xor => "XOR",
            GateKind::Nand => "NAND",
            GateKind::Nor => "NOR",
            GateKind::Not => "NOT",
        }
    }

    /// Parses a (case-insensitive) gate name; `INV` is an alias for `NOT`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "AND" => Some(GateKind::And),
            "OR" => Some(GateKind::Or),
            "XOR" => Some(GateKind::Xor),
            "NAND" => Some(GateKind::Nand),
            "NOR" => Some(GateKind::Nor),
            "NOT" | "INV" => Some(GateKind::Not),
            _ => None,
        }
    }

    /// The single-byte code used by the wire serialization.
    pub fn code(self) -> u8 {
        match self {
            GateKind::And => 0,
            GateKind::Or => 1,
            GateKind::Xor => 2,
            GateKind::Nand => 3,
            GateKind::Nor => 4,
            GateKind::Not => 5,
        }
    }

    /// The inverse of [`GateKind::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(GateKind::And),
            1 => Some(GateKind::Or),
            2 => Some(GateKind::Xor),
            3 => Some(GateKind::Nand),
            4 => Some(GateKind::Nor),
            5 => Some(GateKind::Not),
            _ => None,
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single gate: one or two input wires and exactly one output wire.
///
/// Unary gates carry `b: None`; the `-1` sentinel of the wire format exists
/// only in the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gate {
    /// The wire written by this gate.
    pub out: usize,
    /// The first input wire.
    pub a: usize,
    /// The second input wire, absent for unary gates.
    pub b: Option<usize>,
    /// The boolean function of the gate.
    pub kind: GateKind,
}

impl Gate {
    /// A binary gate.
    pub fn binary(kind: GateKind, a: usize, b: usize, out: usize) -> Self {
        Gate {
            out,
            a,
            b: Some(b),
            kind,
        }
    }

    /// A unary gate.
    pub fn unary(kind: GateKind, a: usize, out: usize) -> Self {
        Gate {
            out,
            a,
            b: None,
            kind,
        }
    }
}

/// Structural errors detected by [`Circuit::validate`] or plaintext
/// evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitError {
    /// A gate references a wire outside `0..num_wires`.
    WireOutOfRange(usize),
    /// A wire is written more than once, or a gate writes an input wire.
    RedefinedWire(usize),
    /// A gate reads a wire that is neither an input nor an earlier output.
    UndefinedWire(usize),
    /// A unary gate has two inputs or a binary gate has one.
    BadArity {
        /// Index of the offending gate.
        gate: usize,
    },
    /// Some wire is neither an input nor written by any gate.
    UnusedWire(usize),
    /// The input partition does not fit into the wire count.
    PartitionMismatch,
    /// The number of provided input bits does not match the circuit.
    InputCountMismatch {
        /// Number of bits the circuit expects.
        expected: usize,
        /// Number of bits provided.
        actual: usize,
    },
}

/// A boolean circuit as a topologically ordered gate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Circuit {
    /// Total number of wires; valid indices are `0..num_wires`.
    pub num_wires: usize,
    /// Per-party input wire counts; element 0 belongs to the garbler.
    pub input_partition: Vec<usize>,
    /// Per-party output wire counts (informational).
    pub output_partition: Vec<usize>,
    /// The gates, in topological order.
    pub gates: Vec<Gate>,
}

impl Circuit {
    /// Total number of input wires.
    pub fn num_inputs(&self) -> usize {
        self.input_partition.iter().sum()
    }

    /// Total number of output wires.
    pub fn num_outputs(&self) -> usize {
        self.output_partition.iter().sum()
    }

    /// The input wires: always the first `num_inputs` wires.
    pub fn input_wires(&self) -> Range<usize> {
        0..self.num_inputs()
    }

    /// The output wires: always the last `num_outputs` wires.
    pub fn output_wires(&self) -> Range<usize> {
        self.num_wires - self.num_outputs()..self.num_wires
    }

    /// The input wires belonging to the garbler (partition element 0).
    pub fn garbler_input_wires(&self) -> Range<usize> {
        0..self.input_partition.first().copied().unwrap_or(0)
    }

    /// The input wires belonging to the evaluator (partition elements 1..).
    pub fn evaluator_input_wires(&self) -> Range<usize> {
        self.input_partition.first().copied().unwrap_or(0)..self.num_inputs()
    }

    /// Checks all structural invariants of the circuit.
    pub fn validate(&self) -> Result<(), CircuitError> {
        let num_inputs = self.num_inputs();
        let num_outputs = self.num_outputs();
        if num_inputs + num_outputs > self.num_wires {
            return Err(CircuitError::PartitionMismatch);
        }

        let mut defined = vec![false; self.num_wires];
        for w in self.input_wires() {
            defined[w] = true;
        }
        for (i, gate) in self.gates.iter().enumerate() {
            if gate.kind.is_unary() != gate.b.is_none() {
                return Err(CircuitError::BadArity { gate: i });
            }
            for wire in [Some(gate.a), gate.b, Some(gate.out)].into_iter().flatten() {
                if wire >= self.num_wires {
                    return Err(CircuitError::WireOutOfRange(wire));
                }
            }
            if !defined[gate.a] {
                return Err(CircuitError::UndefinedWire(gate.a));
            }
            if let Some(b) = gate.b {
                if !defined[b] {
                    return Err(CircuitError::UndefinedWire(b));
                }
            }
            if defined[gate.out] {
                return Err(CircuitError::RedefinedWire(gate.out));
            }
            defined[gate.out] = true;
        }
        if let Some(w) = defined.iter().position(|d| !d) {
            return Err(CircuitError::UnusedWire(w));
        }
        Ok(())
    }

    /// Evaluates the circuit in the clear over the concatenated inputs of all
    /// parties, returning one bit per output wire.
    pub fn eval_plain(&self, inputs: &[bool]) -> Result<Vec<bool>, CircuitError> {
        if inputs.len() != self.num_inputs() {
            return Err(CircuitError::InputCountMismatch {
                expected: self.num_inputs(),
                actual: inputs.len(),
            });
        }
        let mut wires: Vec<Option<bool>> = vec![None; self.num_wires];
        for (w, bit) in self.input_wires().zip(inputs) {
            wires[w] = Some(*bit);
        }
        for gate in &self.gates {
            let a = wires[gate.a].ok_or(CircuitError::UndefinedWire(gate.a))?;
            let b = match gate.b {
                Some(b) => wires[b].ok_or(CircuitError::UndefinedWire(b))?,
                None => false,
            };
            wires[gate.out] = Some(gate.kind.eval(a, b));
        }
        self.output_wires()
            .map(|w| wires[w].ok_or(CircuitError::UndefinedWire(w)))
            .collect()
    }

    /// The canonical two-input, one-gate AND circuit.
    pub fn and_gate() -> Self {
        Circuit {
            num_wires: 3,
            input_partition: vec![1, 1],
            output_partition: vec![1],
            gates: vec![Gate::binary(GateKind::And, 0, 1, 2)],
        }
    }

    /// The canonical two-input, one-gate XOR circuit.
    pub fn xor_gate() -> Self {
        Circuit {
            num_wires: 3,
            input_partition: vec![1, 1],
            output_partition: vec![1],
            gates: vec![Gate::binary(GateKind::Xor, 0, 1, 2)],
        }
    }

    /// The canonical one-input NOT circuit (the evaluator holds no input).
    pub fn not_gate() -> Self {
        Circuit {
            num_wires: 2,
            input_partition: vec![1],
            output_partition: vec![1],
            gates: vec![Gate::unary(GateKind::Not, 0, 1)],
        }
    }
}

/// A character that is neither `0`, `1`, whitespace nor a comma.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidBitChar(
    /// The offending character.
    pub char,
);

impl fmt::Display for InvalidBitChar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid input bit: {:?}", self.0)
    }
}

impl std::error::Error for InvalidBitChar {}

/// Parses a bit string such as `"0110"`; whitespace and commas are ignored.
pub fn bits_from_str(s: &str) -> Result<Vec<bool>, InvalidBitChar> {
    let mut bits = vec![];
    for c in s.chars() {
        match c {
            '0' => bits.push(false),
            '1' => bits.push(true),
            ',' => {}
            c if c.is_whitespace() => {}
            c => return Err(InvalidBitChar(c)),
        }
    }
    Ok(bits)
}

/// Formats bits as a `0`/`1` string, most significant bit first.
pub fn bits_to_string(bits: &[bool]) -> String {
    bits.iter().map(|b| if *b { '1' } else { '0' }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_gates() {
        for (a, b) in [(false, false), (false, true), (true, false), (true, true)] {
            assert_eq!(Circuit::and_gate().eval_plain(&[a, b]).unwrap(), vec![a && b]);
            assert_eq!(Circuit::xor_gate().eval_plain(&[a, b]).unwrap(), vec![a ^ b]);
        }
        assert_eq!(Circuit::not_gate().eval_plain(&[true]).unwrap(), vec![false]);
        assert_eq!(Circuit::not_gate().eval_plain(&[false]).unwrap(), vec![true]);
    }

    #[test]
    fn validate_rejects_undefined_wire() {
        let c = Circuit {
            num_wires: 4,
            input_partition: vec![1, 1],
            output_partition: vec![1],
            gates: vec![Gate::binary(GateKind::And, 0, 3, 3)],
        };
        assert_eq!(c.validate(), Err(CircuitError::UndefinedWire(3)));
    }

    #[test]
    fn validate_rejects_redefined_wire() {
        let c = Circuit {
            num_wires: 4,
            input_partition: vec![1, 1],
            output_partition: vec![1],
            gates: vec![
                Gate::binary(GateKind::And, 0, 1, 3),
                Gate::binary(GateKind::Or, 0, 1, 3),
            ],
        };
        assert_eq!(c.validate(), Err(CircuitError::RedefinedWire(3)));
    }

    #[test]
    fn validate_rejects_bad_arity() {
        let c = Circuit {
            num_wires: 3,
            input_partition: vec![2],
            output_partition: vec![1],
            gates: vec![Gate {
                out: 2,
                a: 0,
                b: Some(1),
                kind: GateKind::Not,
            }],
        };
        assert_eq!(c.validate(), Err(CircuitError::BadArity { gate: 0 }));
    }

    #[test]
    fn validate_rejects_gap_wire() {
        let c = Circuit {
            num_wires: 4,
            input_partition: vec![1, 1],
            output_partition: vec![1],
            gates: vec![Gate::binary(GateKind::And, 0, 1, 3)],
        };
        assert_eq!(c.validate(), Err(CircuitError::UnusedWire(2)));
    }

    #[test]
    fn bit_strings() {
        assert_eq!(bits_from_str("1 0, 1").unwrap(), vec![true, false, true]);
        assert_eq!(bits_from_str(""), Ok(vec![]));
        assert_eq!(bits_from_str("012"), Err(InvalidBitChar('2')));
        assert_eq!(bits_to_string(&[true, false]), "10");
    }
}
