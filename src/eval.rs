//! The evaluation engine: a single-threaded linear scan that decrypts one
//! output label per gate, given one input label per input wire.

use std::time::{Duration, Instant};

use rand::{CryptoRng, Rng};
use tracing::debug;

use crate::circuit::Circuit;
use crate::crypto::{decrypt_row, WireLabel};
use crate::garble::{garble, GarbleMode, GarbledCircuit};

/// Errors raised while evaluating a garbled circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluateError {
    /// The number of input labels does not match the circuit's input wires.
    InputCountMismatch {
        /// Number of input wires.
        expected: usize,
        /// Number of labels provided.
        actual: usize,
    },
    /// A gate read a wire that no earlier gate or input defined.
    MissingWire(usize),
    /// No row of a shuffled gate table decrypted successfully.
    NoRowDecrypted {
        /// Index of the gate that failed.
        gate: usize,
    },
    /// The row selected by the permutation bits failed its padding check,
    /// which indicates corruption or a garbling-mode mismatch between the
    /// parties.
    PandpFailure {
        /// Index of the gate that failed.
        gate: usize,
    },
}

/// Counters collected during one evaluation run, for observability only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalStats {
    /// Gates processed.
    pub gates_evaluated: usize,
    /// Calls to the row decryption primitive.
    pub decryption_attempts: usize,
    /// Row decryptions that passed the padding check.
    pub successful_decryptions: usize,
    /// Wall-clock time of the scan.
    pub elapsed: Duration,
}

/// The result of evaluating a garbled circuit: one label per output wire.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// The output labels, in output wire order.
    pub outputs: Vec<WireLabel>,
    /// Counters for logging and diagnostics.
    pub stats: EvalStats,
}

/// Evaluates a garbled circuit over one label per input wire.
///
/// Gates are processed in circuit order, which the structural invariants
/// guarantee to be a topological order.
pub fn evaluate(
    gc: &GarbledCircuit,
    input_labels: &[WireLabel],
) -> Result<Evaluation, EvaluateError> {
    let circuit = &gc.circuit;
    if input_labels.len() != circuit.num_inputs() {
        return Err(EvaluateError::InputCountMismatch {
            expected: circuit.num_inputs(),
            actual: input_labels.len(),
        });
    }

    let start = Instant::now();
    let mut stats = EvalStats::default();
    let mut wires: Vec<Option<WireLabel>> = vec![None; circuit.num_wires];
    for (w, label) in circuit.input_wires().zip(input_labels) {
        wires[w] = Some(*label);
    }

    for (i, gate) in circuit.gates.iter().enumerate() {
        let k1 = wires[gate.a].ok_or(EvaluateError::MissingWire(gate.a))?;
        let k2 = match gate.b {
            Some(b) => wires[b].ok_or(EvaluateError::MissingWire(b))?,
            None => WireLabel::ZERO,
        };
        let table = &gc.gates[i];
        let result = match gc.mode {
            GarbleMode::PointAndPermute => {
                let idx = match gate.b {
                    Some(_) => ((k1.perm_bit() as usize) << 1) | k2.perm_bit() as usize,
                    None => k1.perm_bit() as usize,
                };
                stats.decryption_attempts += 1;
                decrypt_row(&table.0[idx], &k1, &k2, i as u32)
                    .map_err(|_| EvaluateError::PandpFailure { gate: i })?
            }
            GarbleMode::Shuffled => {
                let mut found = None;
                for row in &table.0 {
                    stats.decryption_attempts += 1;
                    if let Ok(label) = decrypt_row(row, &k1, &k2, i as u32) {
                        found = Some(label);
                        break;
                    }
                }
                found.ok_or(EvaluateError::NoRowDecrypted { gate: i })?
            }
        };
        stats.successful_decryptions += 1;
        stats.gates_evaluated += 1;
        wires[gate.out] = Some(result);
    }

    let outputs = circuit
        .output_wires()
        .map(|w| wires[w].ok_or(EvaluateError::MissingWire(w)))
        .collect::<Result<Vec<_>, _>>()?;
    stats.elapsed = start.elapsed();
    debug!(
        gates = stats.gates_evaluated,
        attempts = stats.decryption_attempts,
        elapsed_us = stats.elapsed.as_micros() as u64,
        "evaluated garbled circuit"
    );
    Ok(Evaluation { outputs, stats })
}

/// Garbles the circuit and, for `trials` random inputs, checks that
/// garble-evaluate-decode agrees with plaintext evaluation. Returns `false`
/// on the first disagreement.
pub fn check_garbling<R: Rng + CryptoRng>(
    circuit: &Circuit,
    mode: GarbleMode,
    trials: usize,
    rng: &mut R,
) -> Result<bool, EvaluateError> {
    let garbling = garble(circuit, mode, rng);
    for _ in 0..trials {
        let bits: Vec<bool> = (0..circuit.num_inputs()).map(|_| rng.gen()).collect();
        let expected = match circuit.eval_plain(&bits) {
            Ok(expected) => expected,
            Err(_) => return Ok(false),
        };
        let labels = match garbling.encode_inputs(&bits, circuit.input_wires()) {
            Ok(labels) => labels,
            Err(_) => return Ok(false),
        };
        let evaluation = evaluate(&garbling.garbled, &labels)?;
        if garbling.decode_outputs(&evaluation.outputs) != expected {
            return Ok(false);
        }
    }
    Ok(true)
}
