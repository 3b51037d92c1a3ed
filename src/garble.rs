//! The garbling engine: samples wire labels, builds the encrypted truth
//! tables and produces the encoding/decoding information kept by the garbler.

use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng, RngCore};
use tracing::debug;

use crate::circuit::{Circuit, Gate};
use crate::crypto::{encrypt_row, RowCiphertext, WireLabel, ROW_SIZE};

/// How truth-table rows are arranged inside a garbled gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GarbleMode {
    /// Rows are uniformly shuffled; the evaluator trial-decrypts all four.
    Shuffled,
    /// Rows are ordered by the permutation bits of the input labels; the
    /// evaluator decrypts exactly one row.
    PointAndPermute,
}

/// Errors raised by garbling and by the encoding/decoding operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GarbleError {
    /// A wire index has no label pair (not an input wire of this circuit).
    UnknownWire(usize),
    /// The number of input bits does not match the number of wires.
    InputCountMismatch {
        /// Number of wires to encode for.
        expected: usize,
        /// Number of bits provided.
        actual: usize,
    },
}

/// The two labels of a wire, in semantic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireLabelPair {
    /// The label representing logical 0.
    pub zero: WireLabel,
    /// The label representing logical 1.
    pub one: WireLabel,
}

impl WireLabelPair {
    /// Samples a fresh pair. In point-and-permute mode the permutation bits
    /// are forced to 0 and 1 respectively; the labels stay otherwise uniform.
    fn sample<R: Rng + CryptoRng>(rng: &mut R, mode: GarbleMode) -> Self {
        match mode {
            GarbleMode::Shuffled => WireLabelPair {
                zero: WireLabel::random(rng),
                one: WireLabel::random(rng),
            },
            GarbleMode::PointAndPermute => WireLabelPair {
                zero: WireLabel::random_with_perm_bit(rng, false),
                one: WireLabel::random_with_perm_bit(rng, true),
            },
        }
    }

    /// The label for the given semantic bit.
    pub fn select(&self, bit: bool) -> WireLabel {
        if bit {
            self.one
        } else {
            self.zero
        }
    }
}

/// The four encrypted rows of one gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GarbledGate(
    /// The rows, in table order.
    pub [RowCiphertext; 4],
);

/// The transferable part of a garbled circuit: the plain circuit plus one
/// encrypted table per gate. This is what the CIRCUIT message carries; the
/// label pairs and the decoding information never leave the garbler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GarbledCircuit {
    /// The underlying circuit.
    pub circuit: Circuit,
    /// One garbled table per gate, aligned with `circuit.gates`.
    pub gates: Vec<GarbledGate>,
    /// The row arrangement both parties agreed on.
    pub mode: GarbleMode,
}

/// The garbler's private output: the transferable circuit together with the
/// input label pairs and the zero labels of the output wires.
#[derive(Debug)]
pub struct Garbling {
    /// The garbled circuit to send to the evaluator.
    pub garbled: GarbledCircuit,
    input_labels: Vec<WireLabelPair>,
    output_zeros: Vec<WireLabel>,
}

/// Garbles a validated circuit with fresh randomness.
pub fn garble<R: Rng + CryptoRng>(circuit: &Circuit, mode: GarbleMode, rng: &mut R) -> Garbling {
    // Sample both labels of every wire. Validation guarantees that the input
    // wires and the gate outputs cover all of 0..num_wires.
    let mut pairs: Vec<WireLabelPair> = vec![
        WireLabelPair {
            zero: WireLabel::ZERO,
            one: WireLabel::ZERO,
        };
        circuit.num_wires
    ];
    for w in circuit.input_wires() {
        pairs[w] = WireLabelPair::sample(rng, mode);
    }
    for gate in &circuit.gates {
        pairs[gate.out] = WireLabelPair::sample(rng, mode);
    }

    let mut gates = Vec::with_capacity(circuit.gates.len());
    for (i, gate) in circuit.gates.iter().enumerate() {
        let table = match gate.b {
            Some(b) => {
                garble_binary(gate, i as u32, pairs[gate.a], pairs[b], pairs[gate.out], mode, rng)
            }
            None => garble_unary(gate, i as u32, pairs[gate.a], pairs[gate.out], mode, rng),
        };
        gates.push(GarbledGate(table));
    }

    let input_labels = circuit.input_wires().map(|w| pairs[w]).collect();
    let output_zeros = circuit.output_wires().map(|w| pairs[w].zero).collect();
    debug!(
        gates = circuit.gates.len(),
        wires = circuit.num_wires,
        ?mode,
        "garbled circuit"
    );
    Garbling {
        garbled: GarbledCircuit {
            circuit: circuit.clone(),
            gates,
            mode,
        },
        input_labels,
        output_zeros,
    }
}

/// Builds the four rows of a binary gate. Each entry `(a, b)` of the truth
/// table encrypts the output label under the two matching input labels.
fn garble_binary<R: Rng + CryptoRng>(
    gate: &Gate,
    gate_id: u32,
    in1: WireLabelPair,
    in2: WireLabelPair,
    out: WireLabelPair,
    mode: GarbleMode,
    rng: &mut R,
) -> [RowCiphertext; 4] {
    let mut table = [[0; ROW_SIZE]; 4];
    let mut next = 0;
    for a in [false, true] {
        for b in [false, true] {
            let k1 = in1.select(a);
            let k2 = in2.select(b);
            let m = out.select(gate.kind.eval(a, b));
            let row = encrypt_row(&m, &k1, &k2, gate_id);
            let idx = match mode {
                // The permutation bits of a pair are 0 and 1, so the four
                // (a, b) combinations hit the four slots exactly once.
                GarbleMode::PointAndPermute => {
                    ((k1.perm_bit() as usize) << 1) | k2.perm_bit() as usize
                }
                GarbleMode::Shuffled => {
                    next += 1;
                    next - 1
                }
            };
            table[idx] = row;
        }
    }
    if mode == GarbleMode::Shuffled {
        table.shuffle(rng);
    }
    table
}

/// Builds the table of a unary gate: two real rows keyed by the single input
/// label (with the all-zero label as the absent second key) and two filler
/// rows of random bytes so every gate serializes to the same size.
fn garble_unary<R: Rng + CryptoRng>(
    gate: &Gate,
    gate_id: u32,
    input: WireLabelPair,
    out: WireLabelPair,
    mode: GarbleMode,
    rng: &mut R,
) -> [RowCiphertext; 4] {
    let mut table = [[0; ROW_SIZE]; 4];
    for row in &mut table {
        rng.fill_bytes(row);
    }
    match mode {
        GarbleMode::PointAndPermute => {
            for a in [false, true] {
                let k = input.select(a);
                let m = out.select(gate.kind.eval(a, false));
                table[k.perm_bit() as usize] = encrypt_row(&m, &k, &WireLabel::ZERO, gate_id);
            }
        }
        GarbleMode::Shuffled => {
            for (slot, a) in [false, true].into_iter().enumerate() {
                let k = input.select(a);
                let m = out.select(gate.kind.eval(a, false));
                table[slot] = encrypt_row(&m, &k, &WireLabel::ZERO, gate_id);
            }
            table.shuffle(rng);
        }
    }
    table
}

impl Garbling {
    /// Picks the label matching each input bit, one per wire index.
    ///
    /// The wire indices must be input wires of the circuit.
    pub fn encode_inputs(
        &self,
        bits: &[bool],
        wires: impl ExactSizeIterator<Item = usize>,
    ) -> Result<Vec<WireLabel>, GarbleError> {
        if bits.len() != wires.len() {
            return Err(GarbleError::InputCountMismatch {
                expected: wires.len(),
                actual: bits.len(),
            });
        }
        bits.iter()
            .zip(wires)
            .map(|(bit, w)| Ok(self.input_pair(w)?.select(*bit)))
            .collect()
    }

    /// Decodes output labels by comparing against the stored zero labels.
    ///
    /// This never fails: a label that is not the zero label of its wire reads
    /// as 1, since under the protocol's correctness invariant it must be one
    /// of the two.
    pub fn decode_outputs(&self, labels: &[WireLabel]) -> Vec<bool> {
        labels
            .iter()
            .zip(&self.output_zeros)
            .map(|(label, zero)| label != zero)
            .collect()
    }

    /// The label pairs handed to the OT sender for the given input wires, in
    /// semantic (zero, one) order.
    pub fn ot_pairs(
        &self,
        wires: impl IntoIterator<Item = usize>,
    ) -> Result<Vec<WireLabelPair>, GarbleError> {
        wires.into_iter().map(|w| self.input_pair(w)).collect()
    }

    fn input_pair(&self, wire: usize) -> Result<WireLabelPair, GarbleError> {
        self.input_labels
            .get(wire)
            .copied()
            .ok_or(GarbleError::UnknownWire(wire))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::circuit::GateKind;
    use crate::crypto::decrypt_row;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(42)
    }

    #[test]
    fn labels_are_unique_per_wire() {
        let circuit = Circuit::and_gate();
        for mode in [GarbleMode::Shuffled, GarbleMode::PointAndPermute] {
            let garbling = garble(&circuit, mode, &mut rng());
            for w in circuit.input_wires() {
                let pair = garbling.input_pair(w).unwrap();
                assert_ne!(pair.zero, pair.one);
            }
        }
    }

    #[test]
    fn perm_bit_discipline() {
        let circuit = Circuit::xor_gate();
        let garbling = garble(&circuit, GarbleMode::PointAndPermute, &mut rng());
        for w in circuit.input_wires() {
            let pair = garbling.input_pair(w).unwrap();
            assert!(!pair.zero.perm_bit());
            assert!(pair.one.perm_bit());
        }
    }

    #[test]
    fn exactly_one_row_decrypts_at_the_permuted_index() {
        let circuit = Circuit::and_gate();
        let garbling = garble(&circuit, GarbleMode::PointAndPermute, &mut rng());
        let in1 = garbling.input_pair(0).unwrap();
        let in2 = garbling.input_pair(1).unwrap();
        let table = &garbling.garbled.gates[0];

        for a in [false, true] {
            for b in [false, true] {
                let k1 = in1.select(a);
                let k2 = in2.select(b);
                let idx = ((k1.perm_bit() as usize) << 1) | k2.perm_bit() as usize;
                for (i, row) in table.0.iter().enumerate() {
                    let decrypted = decrypt_row(row, &k1, &k2, 0);
                    assert_eq!(decrypted.is_ok(), i == idx);
                }
            }
        }
    }

    #[test]
    fn encoding_is_total_over_input_bits() {
        let circuit = Circuit::and_gate();
        let garbling = garble(&circuit, GarbleMode::Shuffled, &mut rng());
        for bits in [[false, false], [false, true], [true, false], [true, true]] {
            let labels = garbling.encode_inputs(&bits, circuit.input_wires()).unwrap();
            for (w, (label, bit)) in labels.iter().zip(bits).enumerate() {
                let pair = garbling.input_pair(w).unwrap();
                assert_eq!(*label, pair.select(bit));
            }
        }
    }

    #[test]
    fn encode_rejects_mismatched_bit_count() {
        let circuit = Circuit::and_gate();
        let garbling = garble(&circuit, GarbleMode::Shuffled, &mut rng());
        assert_eq!(
            garbling.encode_inputs(&[true], circuit.input_wires()),
            Err(GarbleError::InputCountMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn ot_pairs_reject_non_input_wires() {
        let circuit = Circuit::and_gate();
        let garbling = garble(&circuit, GarbleMode::Shuffled, &mut rng());
        assert_eq!(garbling.ot_pairs([2]), Err(GarbleError::UnknownWire(2)));
    }

    #[test]
    fn decode_compares_against_zero_labels() {
        let circuit = Circuit {
            num_wires: 4,
            input_partition: vec![1, 1],
            output_partition: vec![2],
            gates: vec![
                Gate::binary(GateKind::And, 0, 1, 2),
                Gate::binary(GateKind::Or, 0, 1, 3),
            ],
        };
        let garbling = garble(&circuit, GarbleMode::Shuffled, &mut rng());
        let zeros = garbling.output_zeros.clone();
        assert_eq!(garbling.decode_outputs(&zeros), vec![false, false]);
        let mut rng = rng();
        let stray = WireLabel::random(&mut rng);
        assert_eq!(garbling.decode_outputs(&[zeros[0], stray]), vec![false, true]);
    }
}
