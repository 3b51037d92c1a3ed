//! Two-party secure computation engine based on Yao's
//! [garbled circuits](https://en.wikipedia.org/wiki/Garbled_circuit).
//!
//! A garbler and an evaluator jointly compute a boolean circuit over their
//! private inputs; each party learns only the output bits. The circuit is
//! read from a Bristol Fashion file, garbled with per-wire random labels and
//! encrypted truth tables, transferred over a typed message protocol, and
//! evaluated gate by gate. The evaluator obtains the labels of its own
//! inputs through oblivious transfer, so neither party sees anything beyond
//! the output.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod bristol;
pub mod channel;
pub mod circuit;
pub mod codec;
pub mod crypto;
pub mod eval;
pub mod garble;
pub mod ot;
pub mod protocol;
