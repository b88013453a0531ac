//! Per-transaction checks applied before execution: signature recovery,
//! structural requirements and economic preconditions. Epoch and nonce rules
//! live in the executor itself.

use crate::errors::{ChainError, ChainResult};
use crate::fees;
use crate::state::StateDB;
use crate::types::{Transaction, TxType};

/// Signature and structural checks that need no state access.
pub fn validate_tx_stateless(tx: &Transaction) -> ChainResult<()> {
    tx.sender()?;
    match tx.tx_type {
        TxType::Regular | TxType::Activation | TxType::Invite => {
            if tx.to.is_none() {
                return Err(ChainError::InvalidTransaction(
                    "destination address required".into(),
                ));
            }
        }
        TxType::Kill | TxType::NewEpoch => {}
    }
    Ok(())
}

/// Full validation: stateless checks plus the economic preconditions against
/// the given state.
pub fn validate_tx(state: &StateDB, network_size: usize, tx: &Transaction) -> ChainResult<()> {
    validate_tx_stateless(tx)?;
    let sender = tx.sender()?;
    let cost = fees::calculate_cost(network_size, tx);
    if state.balance(&sender) < cost {
        return Err(ChainError::InvalidTransaction(
            "insufficient balance to cover cost".into(),
        ));
    }
    if tx.tx_type == TxType::Invite && state.identity(&sender).invites == 0 {
        return Err(ChainError::InvalidTransaction(
            "sender has no invites left".into(),
        ));
    }
    Ok(())
}
