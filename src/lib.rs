//! Block-processing engine of an identity-based proof-of-stake blockchain.
//!
//! The [`chain::Blockchain`] façade owns the canonical head, applies blocks
//! to a versioned account/identity state, proposes candidate blocks and
//! validates peer proposals. The Byzantine-agreement voting protocol, gossip
//! and the mempool are external collaborators: the engine consumes
//! [`mempool::TxPool`], exposes the certificate-write hook, and persists
//! through [`repository::Storage`]. [`state::StateDB`] provides the versioned
//! state with speculative check snapshots; [`validators::ValidatorsCache`]
//! answers committee queries; [`vrf`] backs proposer sortition and block
//! seeds.

pub mod chain;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod fees;
pub mod mempool;
pub mod repository;
pub mod rlp;
pub mod state;
pub mod types;
pub mod validation;
pub mod validators;
pub mod vrf;
