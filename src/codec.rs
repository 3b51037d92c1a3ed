//! Bit-exact wire serialization: message framing and the garbled-circuit,
//! label-list and result payloads. All multi-byte integers are big-endian.

use crate::circuit::{Circuit, CircuitError, Gate, GateKind};
use crate::crypto::{WireLabel, LABEL_SIZE, ROW_SIZE};
use crate::garble::{GarbleMode, GarbledCircuit, GarbledGate};

/// Upper bound on the payload of a single framed message.
pub const MAX_MESSAGE_SIZE: usize = 65_536;

/// Errors raised while encoding or decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A payload exceeds [`MAX_MESSAGE_SIZE`].
    MessageTooLarge(usize),
    /// The input ended before the announced data was complete.
    Truncated,
    /// A frame's length field disagrees with the bytes present.
    LengthMismatch {
        /// Length announced by the header.
        announced: usize,
        /// Bytes actually present.
        actual: usize,
    },
    /// The frame carries an unknown message type byte.
    UnknownMessageType(u8),
    /// A gate description carries an unknown type code.
    UnknownGateKind(u8),
    /// A wire index is negative (other than the `-1` unary sentinel).
    BadWireIndex(i32),
    /// Data remained after the announced content was decoded.
    TrailingBytes(usize),
    /// The decoded circuit violates a structural invariant.
    Circuit(CircuitError),
}

impl From<CircuitError> for CodecError {
    fn from(e: CircuitError) -> Self {
        CodecError::Circuit(e)
    }
}

/// The typed messages exchanged by the two parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Party name exchange, both directions.
    Hello,
    /// The serialized garbled circuit, garbler to evaluator.
    Circuit,
    /// The garbler's own input labels.
    InputLabels,
    /// Oblivious-transfer bytes, evaluator to garbler.
    OtRequest,
    /// Oblivious-transfer bytes, garbler to evaluator.
    OtResponse,
    /// The output labels, evaluator to garbler.
    Result,
    /// A UTF-8 error description, either direction.
    Error,
    /// Session termination, garbler to evaluator.
    Goodbye,
}

impl MessageType {
    /// The type byte of the frame header.
    pub fn code(self) -> u8 {
        match self {
            MessageType::Hello => 0,
            MessageType::Circuit => 1,
            MessageType::InputLabels => 2,
            MessageType::OtRequest => 3,
            MessageType::OtResponse => 4,
            MessageType::Result => 5,
            MessageType::Error => 6,
            MessageType::Goodbye => 7,
        }
    }

    /// The inverse of [`MessageType::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MessageType::Hello),
            1 => Some(MessageType::Circuit),
            2 => Some(MessageType::InputLabels),
            3 => Some(MessageType::OtRequest),
            4 => Some(MessageType::OtResponse),
            5 => Some(MessageType::Result),
            6 => Some(MessageType::Error),
            7 => Some(MessageType::Goodbye),
            _ => None,
        }
    }
}

/// One protocol message: a type and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The message type.
    pub msg_type: MessageType,
    /// The raw payload bytes.
    pub payload: Vec<u8>,
}

impl Message {
    /// A message with the given type and payload.
    pub fn new(msg_type: MessageType, payload: Vec<u8>) -> Self {
        Message { msg_type, payload }
    }

    /// Encodes the message as `type || payload_len || payload`.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.payload.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge(self.payload.len()));
        }
        let mut frame = Vec::with_capacity(5 + self.payload.len());
        frame.push(self.msg_type.code());
        frame.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&self.payload);
        Ok(frame)
    }

    /// Decodes a full frame back into a message.
    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(frame);
        let code = r.u8()?;
        let msg_type = MessageType::from_code(code).ok_or(CodecError::UnknownMessageType(code))?;
        let announced = r.u32()? as usize;
        if announced > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge(announced));
        }
        if announced != r.remaining() {
            return Err(CodecError::LengthMismatch {
                announced,
                actual: r.remaining(),
            });
        }
        let payload = r.take(announced)?.to_vec();
        Ok(Message { msg_type, payload })
    }
}

/// Serializes the transferable garbled circuit for the CIRCUIT payload.
///
/// Layout: gate/input/output counts, the input and output wire lists, one
/// gate description per gate (`-1` marking an absent second input), then the
/// four 32-byte ciphertext rows of every gate.
pub fn encode_garbled_circuit(gc: &GarbledCircuit) -> Vec<u8> {
    let circuit = &gc.circuit;
    let mut data = vec![];
    data.extend_from_slice(&(circuit.gates.len() as u32).to_be_bytes());
    data.extend_from_slice(&(circuit.num_inputs() as u32).to_be_bytes());
    data.extend_from_slice(&(circuit.num_outputs() as u32).to_be_bytes());
    for w in circuit.input_wires() {
        data.extend_from_slice(&(w as u32).to_be_bytes());
    }
    for w in circuit.output_wires() {
        data.extend_from_slice(&(w as u32).to_be_bytes());
    }
    for gate in &circuit.gates {
        data.extend_from_slice(&(gate.a as i32).to_be_bytes());
        let b = gate.b.map(|b| b as i32).unwrap_or(-1);
        data.extend_from_slice(&b.to_be_bytes());
        data.extend_from_slice(&(gate.out as i32).to_be_bytes());
        data.push(gate.kind.code());
    }
    for table in &gc.gates {
        for row in &table.0 {
            data.extend_from_slice(row);
        }
    }
    data
}

/// Decodes a CIRCUIT payload.
///
/// The legacy layout does not carry the wire count or the party partitions:
/// the wire count is reconstructed as the highest index plus one, and the
/// partitions collapse to a single bucket each (the protocol layer recovers
/// the garbler/evaluator split from the label counts). The garbling mode is
/// agreed out of band and supplied by the caller.
pub fn decode_garbled_circuit(data: &[u8], mode: GarbleMode) -> Result<GarbledCircuit, CodecError> {
    let mut r = Reader::new(data);
    let num_gates = r.u32()? as usize;
    let num_inputs = r.u32()? as usize;
    let num_outputs = r.u32()? as usize;

    let mut input_wires = vec![];
    for _ in 0..num_inputs {
        input_wires.push(r.u32()? as usize);
    }
    let mut output_wires = vec![];
    for _ in 0..num_outputs {
        output_wires.push(r.u32()? as usize);
    }

    let mut gates = vec![];
    let mut max_wire = input_wires.iter().chain(&output_wires).copied().max();
    for _ in 0..num_gates {
        let a = r.wire()?;
        let b = r.i32()?;
        let b = match b {
            -1 => None,
            b if b >= 0 => Some(b as usize),
            b => return Err(CodecError::BadWireIndex(b)),
        };
        let out = r.wire()?;
        let code = r.u8()?;
        let kind = GateKind::from_code(code).ok_or(CodecError::UnknownGateKind(code))?;
        for w in [Some(a), b, Some(out)].into_iter().flatten() {
            max_wire = Some(max_wire.map_or(w, |m: usize| m.max(w)));
        }
        gates.push(Gate { out, a, b, kind });
    }

    let mut tables = vec![];
    for _ in 0..num_gates {
        let mut table = [[0; ROW_SIZE]; 4];
        for row in &mut table {
            row.copy_from_slice(r.take(ROW_SIZE)?);
        }
        tables.push(GarbledGate(table));
    }
    if r.remaining() > 0 {
        return Err(CodecError::TrailingBytes(r.remaining()));
    }

    let num_wires = max_wire.map_or(0, |m| m + 1);
    let circuit = Circuit {
        num_wires,
        input_partition: vec![num_inputs],
        output_partition: vec![num_outputs],
        gates,
    };
    // The wire lists are fixed by the model; a peer sending anything else is
    // violating the format.
    if !circuit.input_wires().eq(input_wires.iter().copied()) {
        return Err(CodecError::Circuit(CircuitError::PartitionMismatch));
    }
    if !circuit.output_wires().eq(output_wires.iter().copied()) {
        return Err(CodecError::Circuit(CircuitError::PartitionMismatch));
    }
    circuit.validate()?;
    Ok(GarbledCircuit {
        circuit,
        gates: tables,
        mode,
    })
}

/// Encodes the INPUT_LABELS payload: a count followed by the labels.
pub fn encode_input_labels(labels: &[WireLabel]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + labels.len() * LABEL_SIZE);
    data.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    for label in labels {
        data.extend_from_slice(label.as_bytes());
    }
    data
}

/// Decodes an INPUT_LABELS payload.
pub fn decode_input_labels(data: &[u8]) -> Result<Vec<WireLabel>, CodecError> {
    let mut r = Reader::new(data);
    let count = r.u32()? as usize;
    if r.remaining() != count * LABEL_SIZE {
        return Err(CodecError::LengthMismatch {
            announced: count * LABEL_SIZE,
            actual: r.remaining(),
        });
    }
    read_labels(&mut r, count)
}

/// Encodes a bare label sequence (the RESULT payload, OT masks).
pub fn encode_labels(labels: &[WireLabel]) -> Vec<u8> {
    let mut data = Vec::with_capacity(labels.len() * LABEL_SIZE);
    for label in labels {
        data.extend_from_slice(label.as_bytes());
    }
    data
}

/// Decodes a bare label sequence of known length.
pub fn decode_labels(data: &[u8], expected: usize) -> Result<Vec<WireLabel>, CodecError> {
    if data.len() != expected * LABEL_SIZE {
        return Err(CodecError::LengthMismatch {
            announced: expected * LABEL_SIZE,
            actual: data.len(),
        });
    }
    read_labels(&mut Reader::new(data), expected)
}

fn read_labels(r: &mut Reader, count: usize) -> Result<Vec<WireLabel>, CodecError> {
    let mut labels = Vec::with_capacity(count);
    for _ in 0..count {
        let mut bytes = [0; LABEL_SIZE];
        bytes.copy_from_slice(r.take(LABEL_SIZE)?);
        labels.push(WireLabel::from_bytes(bytes));
    }
    Ok(labels)
}

/// A cursor over untrusted bytes; every read checks the remaining length.
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data }
    }

    fn remaining(&self) -> usize {
        self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.data.len() < n {
            return Err(CodecError::Truncated);
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("length checked");
        Ok(u32::from_be_bytes(bytes))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("length checked");
        Ok(i32::from_be_bytes(bytes))
    }

    /// A wire index: a non-negative `i32`.
    fn wire(&mut self) -> Result<usize, CodecError> {
        let w = self.i32()?;
        if w < 0 {
            return Err(CodecError::BadWireIndex(w));
        }
        Ok(w as usize)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::bristol;
    use crate::garble::garble;

    #[test]
    fn message_roundtrip() {
        let msg = Message::new(MessageType::Hello, b"garbler".to_vec());
        let frame = msg.encode().unwrap();
        assert_eq!(frame[0], 0);
        assert_eq!(&frame[1..5], &7u32.to_be_bytes());
        assert_eq!(Message::decode(&frame).unwrap(), msg);

        let empty = Message::new(MessageType::Goodbye, vec![]);
        assert_eq!(Message::decode(&empty.encode().unwrap()).unwrap(), empty);
    }

    #[test]
    fn oversized_message_is_rejected() {
        let msg = Message::new(MessageType::Circuit, vec![0; MAX_MESSAGE_SIZE + 1]);
        assert_eq!(
            msg.encode().unwrap_err(),
            CodecError::MessageTooLarge(MAX_MESSAGE_SIZE + 1)
        );

        let mut frame = vec![1];
        frame.extend_from_slice(&(MAX_MESSAGE_SIZE as u32 + 1).to_be_bytes());
        assert_eq!(
            Message::decode(&frame).unwrap_err(),
            CodecError::MessageTooLarge(MAX_MESSAGE_SIZE + 1)
        );
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let mut frame = vec![9];
        frame.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(
            Message::decode(&frame).unwrap_err(),
            CodecError::UnknownMessageType(9)
        );
    }

    #[test]
    fn frame_length_must_match() {
        let mut frame = vec![0];
        frame.extend_from_slice(&4u32.to_be_bytes());
        frame.push(0xaa);
        assert_eq!(
            Message::decode(&frame).unwrap_err(),
            CodecError::LengthMismatch {
                announced: 4,
                actual: 1
            }
        );
    }

    #[test]
    fn garbled_circuit_roundtrip() {
        let circuit = bristol::parse_str(
            "5 9\n2 2 2\n1 1\n\
             2 1 0 2 4 XOR\n2 1 1 3 5 XOR\n1 1 4 6 INV\n1 1 5 7 INV\n2 1 6 7 8 AND\n",
        )
        .unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        for mode in [GarbleMode::Shuffled, GarbleMode::PointAndPermute] {
            let gc = garble(&circuit, mode, &mut rng).garbled;
            let data = encode_garbled_circuit(&gc);
            let decoded = decode_garbled_circuit(&data, mode).unwrap();
            // The partitions are not transmitted, so compare the rest.
            assert_eq!(decoded.gates, gc.gates);
            assert_eq!(decoded.circuit.gates, gc.circuit.gates);
            assert_eq!(decoded.circuit.num_wires, gc.circuit.num_wires);
            assert_eq!(decoded.circuit.num_inputs(), gc.circuit.num_inputs());
            assert_eq!(decoded.circuit.num_outputs(), gc.circuit.num_outputs());
            assert_eq!(encode_garbled_circuit(&decoded), data);
        }
    }

    #[test]
    fn truncated_circuit_is_rejected() {
        let circuit = Circuit::and_gate();
        let mut rng = ChaCha20Rng::seed_from_u64(10);
        let gc = garble(&circuit, GarbleMode::Shuffled, &mut rng).garbled;
        let data = encode_garbled_circuit(&gc);
        assert_eq!(
            decode_garbled_circuit(&data[..data.len() - 1], GarbleMode::Shuffled).unwrap_err(),
            CodecError::Truncated
        );
        let mut extended = data;
        extended.push(0);
        assert_eq!(
            decode_garbled_circuit(&extended, GarbleMode::Shuffled).unwrap_err(),
            CodecError::TrailingBytes(1)
        );
    }

    #[test]
    fn input_labels_roundtrip() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let labels: Vec<WireLabel> = (0..3).map(|_| WireLabel::random(&mut rng)).collect();
        let data = encode_input_labels(&labels);
        assert_eq!(decode_input_labels(&data).unwrap(), labels);

        assert!(decode_input_labels(&data[..data.len() - 1]).is_err());
        assert_eq!(
            decode_labels(&encode_labels(&labels), 3).unwrap(),
            labels
        );
        assert!(decode_labels(&encode_labels(&labels), 2).is_err());
    }
}
