//! The two-party protocol: a single linear sequence of typed messages that
//! carries the handshake, the garbled circuit, the garbler's input labels,
//! the oblivious transfer of the evaluator's input labels, the result and the
//! session termination.
//!
//! Both parties walk the same sequence; any deviation surfaces as a
//! [`ProtocolError`]. On failure a best-effort ERROR message is sent to the
//! peer before the session returns.

use std::fmt;

use rand::{CryptoRng, Rng};
use tracing::{debug, info};

use crate::bristol::ParseError;
use crate::channel::{recv_msg, send_msg, Channel, ChannelError};
use crate::circuit::Circuit;
use crate::codec::{
    decode_garbled_circuit, decode_input_labels, decode_labels, encode_garbled_circuit,
    encode_input_labels, encode_labels, CodecError, Message, MessageType, MAX_MESSAGE_SIZE,
};
use crate::crypto::CryptoError;
use crate::eval::{evaluate, EvalStats, EvaluateError};
use crate::garble::{garble, GarbleError, GarbleMode};
use crate::ot::{ot_receive, ot_send, OtError};

/// The party name sent in the garbler's HELLO message.
pub const GARBLER_NAME: &str = "garbler";
/// The party name sent in the evaluator's HELLO message.
pub const EVALUATOR_NAME: &str = "evaluator";

/// A custom error type for all two-party computation and communication
/// failures.
#[derive(Debug)]
pub enum Error {
    /// The circuit file could not be parsed.
    Parse(ParseError),
    /// A cryptographic primitive failed.
    Crypto(CryptoError),
    /// Garbling-side encoding or decoding failed.
    Garble(GarbleError),
    /// The garbled circuit could not be evaluated.
    Evaluate(EvaluateError),
    /// The peer deviated from the message sequence or sent malformed data.
    Protocol(ProtocolError),
    /// A message could not be sent or received.
    Channel(ChannelError),
    /// The oblivious transfer subprotocol failed.
    Ot(OtError),
    /// The number of provided input bits does not match the inputs expected
    /// in the circuit.
    WrongInputSize {
        /// The number of input bits specified in the circuit.
        expected: usize,
        /// The number of input bits provided by the user.
        actual: usize,
    },
}

/// Violations of the message sequence or of message contents.
#[derive(Debug)]
pub enum ProtocolError {
    /// The peer sent a message of a different type than the sequence allows.
    UnexpectedMessage {
        /// The type the sequence expects here.
        expected: MessageType,
        /// The type actually received.
        actual: MessageType,
    },
    /// The peer reported an error and the session must terminate.
    Remote(String),
    /// The INPUT_LABELS count does not match the garbler's partition.
    InputLabelCount {
        /// Labels implied by the circuit and our own input length.
        expected: usize,
        /// Labels the peer sent.
        actual: usize,
    },
    /// The RESULT payload does not hold one label per output wire.
    ResultLength {
        /// Output labels expected.
        expected: usize,
        /// Payload labels received.
        actual: usize,
    },
    /// A payload could not be encoded or decoded.
    Codec(CodecError),
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        Error::Crypto(e)
    }
}

impl From<GarbleError> for Error {
    fn from(e: GarbleError) -> Self {
        Error::Garble(e)
    }
}

impl From<EvaluateError> for Error {
    fn from(e: EvaluateError) -> Self {
        Error::Evaluate(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Error::Channel(e)
    }
}

impl From<OtError> for Error {
    fn from(e: OtError) -> Self {
        Error::Ot(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Protocol(ProtocolError::Codec(e))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "circuit parse error: {e:?}"),
            Error::Crypto(e) => write!(f, "crypto error: {e:?}"),
            Error::Garble(e) => write!(f, "garbling error: {e:?}"),
            Error::Evaluate(e) => write!(f, "evaluation error: {e:?}"),
            Error::Protocol(e) => write!(f, "protocol error: {e:?}"),
            Error::Channel(e) => write!(f, "channel error: {e:?}"),
            Error::Ot(e) => write!(f, "oblivious transfer error: {e:?}"),
            Error::WrongInputSize { expected, actual } => {
                write!(f, "expected {expected} input bits, got {actual}")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Receives the next message, which must have the given type. An ERROR
/// message from the peer is surfaced as [`ProtocolError::Remote`].
async fn expect<C: Channel>(
    channel: &mut C,
    phase: &str,
    expected: MessageType,
) -> Result<Vec<u8>, Error> {
    let msg = recv_msg(channel, phase).await?;
    match msg.msg_type {
        t if t == expected => Ok(msg.payload),
        MessageType::Error => Err(ProtocolError::Remote(
            String::from_utf8_lossy(&msg.payload).into_owned(),
        )
        .into()),
        actual => Err(ProtocolError::UnexpectedMessage { expected, actual }.into()),
    }
}

async fn exchange_hello<C: Channel>(channel: &mut C, name: &str) -> Result<String, Error> {
    send_msg(
        channel,
        "hello",
        &Message::new(MessageType::Hello, name.as_bytes().to_vec()),
    )
    .await?;
    let peer = expect(channel, "hello", MessageType::Hello).await?;
    let peer = String::from_utf8_lossy(&peer).into_owned();
    info!(peer = %peer, "handshake complete");
    Ok(peer)
}

/// Runs the garbler's side of the session and returns the decoded output
/// bits. On failure, a best-effort ERROR message is sent before returning.
pub async fn run_garbler<C: Channel, R: Rng + CryptoRng>(
    channel: &mut C,
    circuit: &Circuit,
    bits: &[bool],
    mode: GarbleMode,
    rng: &mut R,
) -> Result<Vec<bool>, Error> {
    match garbler_session(channel, circuit, bits, mode, rng).await {
        Ok(outputs) => Ok(outputs),
        Err(e) => {
            report_error(channel, &e).await;
            Err(e)
        }
    }
}

/// Runs the evaluator's side of the session and returns the evaluation
/// statistics. On failure, a best-effort ERROR message is sent before
/// returning.
pub async fn run_evaluator<C: Channel, R: Rng + CryptoRng>(
    channel: &mut C,
    bits: &[bool],
    mode: GarbleMode,
    rng: &mut R,
) -> Result<EvalStats, Error> {
    match evaluator_session(channel, bits, mode, rng).await {
        Ok(stats) => Ok(stats),
        Err(e) => {
            report_error(channel, &e).await;
            Err(e)
        }
    }
}

async fn report_error<C: Channel>(channel: &mut C, e: &Error) {
    // The peer may already be gone; nothing to do about a failed report.
    let msg = Message::new(MessageType::Error, e.to_string().into_bytes());
    let _ = send_msg(channel, "error", &msg).await;
}

async fn garbler_session<C: Channel, R: Rng + CryptoRng>(
    channel: &mut C,
    circuit: &Circuit,
    bits: &[bool],
    mode: GarbleMode,
    rng: &mut R,
) -> Result<Vec<bool>, Error> {
    let garbler_wires = circuit.garbler_input_wires();
    if bits.len() != garbler_wires.len() {
        return Err(Error::WrongInputSize {
            expected: garbler_wires.len(),
            actual: bits.len(),
        });
    }
    let garbling = garble(circuit, mode, rng);

    exchange_hello(channel, GARBLER_NAME).await?;

    let payload = encode_garbled_circuit(&garbling.garbled);
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::Codec(CodecError::MessageTooLarge(payload.len())).into());
    }
    send_msg(channel, "circuit", &Message::new(MessageType::Circuit, payload)).await?;
    debug!(gates = circuit.gates.len(), "sent garbled circuit");

    if !garbler_wires.is_empty() {
        let labels = garbling.encode_inputs(bits, garbler_wires.clone())?;
        let payload = encode_input_labels(&labels);
        send_msg(
            channel,
            "input labels",
            &Message::new(MessageType::InputLabels, payload),
        )
        .await?;
        debug!(labels = bits.len(), "sent garbler input labels");
    }

    let evaluator_wires = circuit.evaluator_input_wires();
    if !evaluator_wires.is_empty() {
        let pairs = garbling.ot_pairs(evaluator_wires)?;
        ot_send(channel, &pairs, rng).await?;
    }

    let payload = expect(channel, "result", MessageType::Result).await?;
    let outputs = decode_labels(&payload, circuit.num_outputs()).map_err(|_| {
        ProtocolError::ResultLength {
            expected: circuit.num_outputs(),
            actual: payload.len() / crate::crypto::LABEL_SIZE,
        }
    })?;
    let result = garbling.decode_outputs(&outputs);

    send_msg(channel, "goodbye", &Message::new(MessageType::Goodbye, vec![])).await?;
    info!(output = %crate::circuit::bits_to_string(&result), "session complete");
    Ok(result)
}

async fn evaluator_session<C: Channel, R: Rng + CryptoRng>(
    channel: &mut C,
    bits: &[bool],
    mode: GarbleMode,
    rng: &mut R,
) -> Result<EvalStats, Error> {
    exchange_hello(channel, EVALUATOR_NAME).await?;

    let payload = expect(channel, "circuit", MessageType::Circuit).await?;
    let gc = decode_garbled_circuit(&payload, mode)?;
    let num_inputs = gc.circuit.num_inputs();
    debug!(
        gates = gc.circuit.gates.len(),
        inputs = num_inputs,
        "received garbled circuit"
    );
    if bits.len() > num_inputs {
        return Err(Error::WrongInputSize {
            expected: num_inputs,
            actual: bits.len(),
        });
    }
    let garbler_count = num_inputs - bits.len();

    let mut input_labels = vec![];
    if garbler_count > 0 {
        let payload = expect(channel, "input labels", MessageType::InputLabels).await?;
        let labels = decode_input_labels(&payload)?;
        if labels.len() != garbler_count {
            return Err(ProtocolError::InputLabelCount {
                expected: garbler_count,
                actual: labels.len(),
            }
            .into());
        }
        debug!(labels = labels.len(), "received garbler input labels");
        input_labels.extend(labels);
    }

    if !bits.is_empty() {
        let labels = ot_receive(channel, bits, rng).await?;
        input_labels.extend(labels);
    }

    let evaluation = evaluate(&gc, &input_labels)?;
    send_msg(
        channel,
        "result",
        &Message::new(MessageType::Result, encode_labels(&evaluation.outputs)),
    )
    .await?;

    expect(channel, "goodbye", MessageType::Goodbye).await?;
    info!("session complete");
    Ok(evaluation.stats)
}
