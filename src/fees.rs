//! Fee, cost and reward-rate arithmetic.
//!
//! All rate products go through integer scaling (multiply by a parts-per-
//! million numerator, then divide) so every node truncates identically.

use malachite::base::num::arithmetic::traits::Pow;
use malachite::Natural;

use crate::types::{Coins, Transaction, TxType};

/// Smallest-unit scale of one coin.
pub fn dna_base() -> Natural {
    Natural::from(10u32).pow(18)
}

/// Coins locked per invitation before scaling down by network size.
pub const INVITATION_COEF: u64 = 11_000;

pub(crate) const RATE_DENOM: u64 = 1_000_000;

/// Converts a configured `[0, 1]` rate into a parts-per-million numerator.
pub(crate) fn rate_ppm(rate: f64) -> u64 {
    (rate.clamp(0.0, 1.0) * RATE_DENOM as f64).round() as u64
}

/// Truncating product of a value and a configured rate.
pub fn scale_by_rate(value: &Natural, rate: f64) -> Natural {
    value * Natural::from(rate_ppm(rate)) / Natural::from(RATE_DENOM)
}

/// Per-transaction fee: free for `Kill`/`NewEpoch` and for an unknown network
/// size, otherwise `(dna_base / network_size) * size_in_bytes`.
pub fn calculate_fee(network_size: usize, tx: &Transaction) -> Coins {
    if matches!(tx.tx_type, TxType::Kill | TxType::NewEpoch) {
        return Coins::zero();
    }
    if network_size == 0 {
        return Coins::zero();
    }
    let fee_per_byte = dna_base() / Natural::from(network_size as u64);
    Coins::from_natural(fee_per_byte * Natural::from(tx.size() as u64))
}

/// Total amount debited from the sender: amount plus fee, plus the invitation
/// surcharge for `Invite` transactions.
pub fn calculate_cost(network_size: usize, tx: &Transaction) -> Coins {
    let mut result = tx.amount_or_zero().as_natural().clone();
    result += calculate_fee(network_size, tx).as_natural().clone();
    if tx.tx_type == TxType::Invite && network_size > 0 {
        result += Natural::from(INVITATION_COEF) * dna_base() / Natural::from(network_size as u64);
    }
    Coins::from_natural(result)
}
