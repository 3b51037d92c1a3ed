//! 1-out-of-2 oblivious transfer of wire labels, via the Chou-Orlandi
//! protocol (cf. <https://eprint.iacr.org/2015/267>) over the Ristretto prime
//! order group of `curve25519-dalek`.
//!
//! For every transfer the receiver learns exactly the label matching its
//! choice bit and nothing about the other; the sender learns nothing about
//! the choices. The exchange runs over the session channel as OT_REQUEST
//! (evaluator to garbler) and OT_RESPONSE (garbler to evaluator) messages, so
//! no side connection is needed.
//!
//! As in the write-up fix noted by the swanky `ocelot` library, the transfer
//! index is hashed into the key derivation so that equal receiver points
//! still yield independent keys.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_TABLE;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoBasepointTable, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, Rng};
use tracing::debug;

use crate::channel::{recv_msg, send_msg, Channel, ChannelError};
use crate::codec::{Message, MessageType};
use crate::crypto::{WireLabel, LABEL_SIZE};
use crate::garble::WireLabelPair;

/// The compressed size of a Ristretto group element.
const POINT_SIZE: usize = 32;

/// Errors raised by the oblivious transfer subprotocol.
#[derive(Debug)]
pub enum OtError {
    /// A message could not be sent or received.
    Channel(ChannelError),
    /// Received bytes do not decode to a group element.
    InvalidPoint,
    /// A peer message did not carry the expected number of elements.
    WrongCount {
        /// Number of bytes expected.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },
    /// The peer sent a message of an unexpected type.
    UnexpectedMessage(MessageType),
    /// The peer reported a protocol error.
    Remote(String),
}

impl From<ChannelError> for OtError {
    fn from(e: ChannelError) -> Self {
        OtError::Channel(e)
    }
}

/// Key derivation: a keyed BLAKE3 hash of the compressed point, tweaked by
/// the transfer index, truncated to one label.
fn hash_pt(tweak: u128, pt: &RistrettoPoint) -> WireLabel {
    let h = blake3::keyed_hash(pt.compress().as_bytes(), &tweak.to_le_bytes());
    WireLabel::from_slice(&h.as_bytes()[..LABEL_SIZE]).expect("BLAKE3 digests are long enough")
}

fn decode_point(bytes: &[u8]) -> Result<RistrettoPoint, OtError> {
    let bytes: [u8; POINT_SIZE] = bytes.try_into().map_err(|_| OtError::InvalidPoint)?;
    CompressedRistretto::from_slice(&bytes)
        .map_err(|_| OtError::InvalidPoint)?
        .decompress()
        .ok_or(OtError::InvalidPoint)
}

async fn send_ot<C: Channel>(
    channel: &mut C,
    msg_type: MessageType,
    payload: Vec<u8>,
) -> Result<(), OtError> {
    Ok(send_msg(channel, "ot", &Message::new(msg_type, payload)).await?)
}

async fn recv_ot<C: Channel>(
    channel: &mut C,
    expected_type: MessageType,
    expected_len: usize,
) -> Result<Vec<u8>, OtError> {
    let msg = recv_msg(channel, "ot").await?;
    match msg.msg_type {
        t if t == expected_type => {}
        MessageType::Error => {
            return Err(OtError::Remote(
                String::from_utf8_lossy(&msg.payload).into_owned(),
            ))
        }
        t => return Err(OtError::UnexpectedMessage(t)),
    }
    if msg.payload.len() != expected_len {
        return Err(OtError::WrongCount {
            expected: expected_len,
            actual: msg.payload.len(),
        });
    }
    Ok(msg.payload)
}

/// Transfers one of each label pair to the receiver, learning nothing about
/// which.
pub async fn ot_send<C: Channel, R: Rng + CryptoRng>(
    channel: &mut C,
    pairs: &[WireLabelPair],
    rng: &mut R,
) -> Result<(), OtError> {
    let y = Scalar::random(rng);
    let s = &y * RISTRETTO_BASEPOINT_TABLE;
    send_ot(channel, MessageType::OtResponse, s.compress().as_bytes().to_vec()).await?;

    let ys = y * s;
    let r_bytes = recv_ot(channel, MessageType::OtRequest, pairs.len() * POINT_SIZE).await?;
    let mut masked = Vec::with_capacity(pairs.len() * 2 * LABEL_SIZE);
    for (i, (pair, r_bytes)) in pairs.iter().zip(r_bytes.chunks_exact(POINT_SIZE)).enumerate() {
        let r = decode_point(r_bytes)?;
        let yr = y * r;
        let k0 = hash_pt(i as u128, &yr);
        let k1 = hash_pt(i as u128, &(yr - ys));
        masked.extend_from_slice((k0 ^ pair.zero).as_bytes());
        masked.extend_from_slice((k1 ^ pair.one).as_bytes());
    }
    send_ot(channel, MessageType::OtResponse, masked).await?;
    debug!(transfers = pairs.len(), "oblivious transfer sent");
    Ok(())
}

/// Obtains one label per choice bit from the sender, revealing nothing about
/// the choices.
pub async fn ot_receive<C: Channel, R: Rng + CryptoRng>(
    channel: &mut C,
    choices: &[bool],
    rng: &mut R,
) -> Result<Vec<WireLabel>, OtError> {
    let s_bytes = recv_ot(channel, MessageType::OtResponse, POINT_SIZE).await?;
    let s = RistrettoBasepointTable::create(&decode_point(&s_bytes)?);
    let zero = &Scalar::ZERO * &s;
    let one = &Scalar::ONE * &s;

    let mut ks = Vec::with_capacity(choices.len());
    let mut r_bytes = Vec::with_capacity(choices.len() * POINT_SIZE);
    for (i, b) in choices.iter().enumerate() {
        let x = Scalar::random(rng);
        let c = if *b { one } else { zero };
        let r = c + &x * RISTRETTO_BASEPOINT_TABLE;
        r_bytes.extend_from_slice(r.compress().as_bytes());
        ks.push(hash_pt(i as u128, &(&x * &s)));
    }
    send_ot(channel, MessageType::OtRequest, r_bytes).await?;

    let masked = recv_ot(
        channel,
        MessageType::OtResponse,
        choices.len() * 2 * LABEL_SIZE,
    )
    .await?;
    let mut labels = Vec::with_capacity(choices.len());
    for ((pair, b), k) in masked
        .chunks_exact(2 * LABEL_SIZE)
        .zip(choices)
        .zip(ks)
    {
        let chosen = if *b {
            &pair[LABEL_SIZE..]
        } else {
            &pair[..LABEL_SIZE]
        };
        let chosen = WireLabel::from_slice(chosen).expect("chunk size is fixed");
        labels.push(chosen ^ k);
    }
    debug!(transfers = choices.len(), "oblivious transfer received");
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::channel::SimpleChannel;

    #[tokio::test]
    async fn receiver_gets_exactly_the_chosen_labels() {
        let mut rng = ChaCha20Rng::seed_from_u64(21);
        let pairs: Vec<WireLabelPair> = (0..8)
            .map(|_| WireLabelPair {
                zero: WireLabel::random(&mut rng),
                one: WireLabel::random(&mut rng),
            })
            .collect();
        let choices: Vec<bool> = (0..8).map(|i| i % 3 == 0).collect();

        let (mut sender_channel, mut receiver_channel) = SimpleChannel::pair();
        let sender_pairs = pairs.clone();
        let sender = tokio::spawn(async move {
            let mut rng = ChaCha20Rng::seed_from_u64(22);
            ot_send(&mut sender_channel, &sender_pairs, &mut rng).await
        });
        let mut receiver_rng = ChaCha20Rng::seed_from_u64(23);
        let received = ot_receive(&mut receiver_channel, &choices, &mut receiver_rng)
            .await
            .unwrap();
        sender.await.unwrap().unwrap();

        for ((label, pair), b) in received.iter().zip(&pairs).zip(&choices) {
            assert_eq!(*label, pair.select(*b));
            assert_ne!(*label, pair.select(!*b));
        }
    }

    #[tokio::test]
    async fn sender_rejects_malformed_points() {
        let (mut sender_channel, mut receiver_channel) = SimpleChannel::pair();
        let pairs = vec![WireLabelPair {
            zero: WireLabel::ZERO,
            one: WireLabel::ZERO,
        }];
        let sender = tokio::spawn(async move {
            let mut rng = ChaCha20Rng::seed_from_u64(24);
            ot_send(&mut sender_channel, &pairs, &mut rng).await
        });
        // Swallow the sender's public point, then answer with garbage bytes.
        recv_msg(&mut receiver_channel, "test").await.unwrap();
        send_msg(
            &mut receiver_channel,
            "test",
            &Message::new(MessageType::OtRequest, vec![0xff; POINT_SIZE]),
        )
        .await
        .unwrap();
        assert!(matches!(
            sender.await.unwrap(),
            Err(OtError::InvalidPoint)
        ));
    }
}
