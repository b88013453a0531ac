mod support;

use dna_chain::config::ChainConfig;
use dna_chain::fees;
use dna_chain::state::StateDB;
use dna_chain::types::{Address, Coins, Header, Transaction, TxType};
use tempfile::tempdir;

use support::{address_of, coins, fund, node_key, open_chain, seed_verified_identities, TestChain};

fn committee_free_config() -> ChainConfig {
    let mut config = ChainConfig::default();
    config.consensus.final_committee_reward = Coins::zero();
    config
}

/// Chain with ten validators (the node's coinbase among them) and a funded
/// sender whose transfer sits in the mempool.
fn prepared_chain(dir: &tempfile::TempDir) -> (TestChain, Address, Address) {
    let setup = open_chain(dir, committee_free_config());
    setup
        .chain
        .initialize_chain(&node_key(1))
        .expect("initialize");
    let coinbase = setup.chain.coinbase().expect("coinbase");
    seed_verified_identities(&setup.chain, 9, &[coinbase]);

    let sender_key = node_key(7);
    let sender = address_of(&sender_key);
    let recipient = Address::new([0x61; 20]);
    fund(&setup.chain, &sender, coins("100000000000000000000"));

    let mut tx = Transaction::new(
        TxType::Regular,
        0,
        1,
        Some(recipient),
        coins("5000000000000000000"),
    );
    tx.sign(&sender_key).expect("sign");
    setup.pool.add(tx).expect("queue");

    (setup, sender, recipient)
}

fn supply_of(state: &StateDB, addresses: &[Address]) -> Coins {
    let mut total = Coins::zero();
    for address in addresses {
        total.add_assign(&state.balance(address));
        total.add_assign(&state.identity(address).stake);
    }
    total
}

#[test]
fn block_application_is_deterministic() {
    let dir = tempdir().expect("tempdir");
    let (setup, _, _) = prepared_chain(&dir);

    let block = setup.chain.propose_block().expect("propose");
    assert_eq!(block.body.transactions.len(), 1);

    let mut first = setup.chain.state().new_for_check(1);
    let mut second = setup.chain.state().new_for_check(1);
    let first_root = setup
        .chain
        .execute_block_on(&mut first, &block)
        .expect("execute");
    let second_root = setup
        .chain
        .execute_block_on(&mut second, &block)
        .expect("execute");
    assert_eq!(first_root, second_root);
    assert_eq!(first_root, block.state_root());

    setup.chain.add_block(&block).expect("add");
    assert_eq!(setup.chain.get_head().expect("head").hash(), block.hash());
}

#[test]
fn supply_grows_by_reward_minus_burn() {
    let dir = tempdir().expect("tempdir");
    let (setup, sender, recipient) = prepared_chain(&dir);
    let coinbase = setup.chain.coinbase().expect("coinbase");

    let mut watched = vec![coinbase, sender, recipient];
    watched.extend(seeded_addresses());

    let before = supply_of(&setup.chain.state(), &watched);

    let block = setup.chain.propose_block().expect("propose");
    let tx = &block.body.transactions[0];
    let total_fee = fees::calculate_fee(10, tx);
    setup.chain.add_block(&block).expect("add");

    let after = supply_of(&setup.chain.state(), &watched);

    let config = committee_free_config();
    let burn = fees::scale_by_rate(total_fee.as_natural(), config.consensus.fee_burn_rate);
    let expected_delta =
        Coins::from_natural(config.consensus.block_reward.as_natural() - &burn);
    assert_eq!(after.checked_sub(&before).expect("supply grew"), expected_delta);
}

fn seeded_addresses() -> Vec<Address> {
    (0u8..9).map(|tag| Address::new([0xA0 + tag; 20])).collect()
}

#[test]
fn coinbase_earns_reward_stake_and_invite() {
    let dir = tempdir().expect("tempdir");
    let (setup, _, _) = prepared_chain(&dir);
    let coinbase = setup.chain.coinbase().expect("coinbase");

    let block = setup.chain.propose_block().expect("propose");
    setup.chain.add_block(&block).expect("add");

    let state = setup.chain.state();
    let config = committee_free_config();
    let stake_share = fees::scale_by_rate(
        config.consensus.block_reward.as_natural(),
        config.consensus.stake_reward_rate,
    );
    assert_eq!(
        state.identity(&coinbase).stake,
        Coins::from_natural(stake_share)
    );
    assert_eq!(state.identity(&coinbase).invites, 1);
    assert!(!state.balance(&coinbase).is_zero());
}

#[test]
fn stale_declared_state_root_rejects_block() {
    let dir = tempdir().expect("tempdir");
    let (setup, _, _) = prepared_chain(&dir);

    let block = setup.chain.propose_block().expect("propose");
    // The live state moves on after the proposal was built, so the declared
    // root no longer matches the transition.
    fund(
        &setup.chain,
        &Address::new([0x77; 20]),
        coins("1000000000000000000"),
    );

    let root_before = setup.chain.state().root();
    let err = setup.chain.add_block(&block).expect_err("stale root");
    assert_eq!(err.code(), "INVALID_STATE_ROOT");
    assert_eq!(setup.chain.state().root(), root_before);
    assert_eq!(setup.chain.get_head().expect("head").height(), 1);
}

#[test]
fn body_divergence_rejects_tx_root() {
    let dir = tempdir().expect("tempdir");
    let (setup, _, _) = prepared_chain(&dir);

    let mut block = setup.chain.propose_block().expect("propose");
    // Dropping a transaction leaves the header hash (and thus the seed)
    // intact but breaks the declared transaction root.
    block.body.transactions.clear();

    let err = setup.chain.add_block(&block).expect_err("diverged body");
    assert_eq!(err.code(), "INVALID_TX_ROOT");
}

#[test]
fn height_gap_rejects_block() {
    let dir = tempdir().expect("tempdir");
    let (setup, _, _) = prepared_chain(&dir);

    let mut empty = setup.chain.generate_empty_block().expect("generate");
    if let Header::Empty(header) = &mut empty.header {
        header.height = 5;
    }

    let err = setup.chain.add_block(&empty).expect_err("height gap");
    assert_eq!(err.code(), "INVALID_PARENT");
}

#[test]
fn mempool_resets_to_committed_block() {
    let dir = tempdir().expect("tempdir");
    let (setup, _, _) = prepared_chain(&dir);
    assert_eq!(setup.pool.len(), 1);

    let block = setup.chain.propose_block().expect("propose");
    setup.chain.add_block(&block).expect("add");
    assert!(setup.pool.is_empty());
}

#[test]
fn proposal_filters_invalid_candidates_silently() {
    let dir = tempdir().expect("tempdir");
    let (setup, _, _) = prepared_chain(&dir);

    // A transaction from an unfunded key cannot cover its fee.
    let broke_key = node_key(9);
    let mut broke = Transaction::new(
        TxType::Regular,
        0,
        1,
        Some(Address::new([0x62; 20])),
        coins("1000000000000000000"),
    );
    broke.sign(&broke_key).expect("sign");
    setup.pool.add(broke).expect("queue");

    let block = setup.chain.propose_block().expect("propose");
    assert_eq!(block.body.transactions.len(), 1);
    setup.chain.add_block(&block).expect("add");
}
