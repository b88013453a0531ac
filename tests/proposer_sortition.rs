mod support;

use dna_chain::config::ChainConfig;
use dna_chain::crypto::pubkey_bytes;
use dna_chain::types::Address;
use tempfile::tempdir;

use support::{address_of, node_key, open_chain, seed_verified_identities};

fn config_with_threshold(threshold: f64) -> ChainConfig {
    let mut config = ChainConfig::default();
    config.consensus.proposer_threshold = threshold;
    config
}

#[test]
fn zero_threshold_always_elects() {
    let dir = tempdir().expect("tempdir");
    let setup = open_chain(&dir, config_with_threshold(0.0));
    let key = node_key(1);
    setup.chain.initialize_chain(&key).expect("initialize");

    let (eligible, randomness, proof) =
        setup.chain.get_proposer_sortition().expect("sortition");
    assert!(eligible);
    assert!(!randomness.is_zero());
    assert!(!proof.is_empty());

    setup
        .chain
        .validate_proposer_proof(&proof, &randomness, &pubkey_bytes(key.verifying_key()))
        .expect("own proof verifies");
}

#[test]
fn full_threshold_never_elects() {
    let dir = tempdir().expect("tempdir");
    let setup = open_chain(&dir, config_with_threshold(1.0));
    setup
        .chain
        .initialize_chain(&node_key(1))
        .expect("initialize");

    let (eligible, randomness, proof) =
        setup.chain.get_proposer_sortition().expect("sortition");
    assert!(!eligible);
    assert!(randomness.is_zero());
    assert!(proof.is_empty());
}

#[test]
fn threshold_is_enforced_on_verification() {
    let proving_dir = tempdir().expect("tempdir");
    let prover = open_chain(&proving_dir, config_with_threshold(0.0));
    let key = node_key(1);
    prover.chain.initialize_chain(&key).expect("initialize");
    let (eligible, randomness, proof) = prover.chain.get_proposer_sortition().expect("sortition");
    assert!(eligible);

    // Same genesis, stricter threshold: the proof itself verifies but the
    // eligibility test fails.
    let strict_dir = tempdir().expect("tempdir");
    let strict = open_chain(&strict_dir, config_with_threshold(1.0));
    strict.chain.initialize_chain(&key).expect("initialize");
    let err = strict
        .chain
        .validate_proposer_proof(&proof, &randomness, &pubkey_bytes(key.verifying_key()))
        .expect_err("threshold unmet");
    assert_eq!(err.code(), "INVALID_PROPOSER");
}

#[test]
fn tampered_eligibility_proof_rejected() {
    let dir = tempdir().expect("tempdir");
    let setup = open_chain(&dir, config_with_threshold(0.0));
    let key = node_key(1);
    setup.chain.initialize_chain(&key).expect("initialize");

    let (_, randomness, mut proof) = setup.chain.get_proposer_sortition().expect("sortition");
    proof[40] ^= 0x01;
    let err = setup
        .chain
        .validate_proposer_proof(&proof, &randomness, &pubkey_bytes(key.verifying_key()))
        .expect_err("tampered proof");
    assert_eq!(err.code(), "INVALID_SEED");
}

#[test]
fn unknown_proposer_rejected_when_cache_is_populated() {
    let dir = tempdir().expect("tempdir");
    let setup = open_chain(&dir, config_with_threshold(0.0));
    let key = node_key(1);
    setup.chain.initialize_chain(&key).expect("initialize");
    // The node's own address is deliberately absent.
    seed_verified_identities(&setup.chain, 5, &[]);

    let (_, randomness, proof) = setup.chain.get_proposer_sortition().expect("sortition");
    let err = setup
        .chain
        .validate_proposer_proof(&proof, &randomness, &pubkey_bytes(key.verifying_key()))
        .expect_err("not a validator");
    assert_eq!(err.code(), "INVALID_PROPOSER");
}

#[test]
fn tampered_block_seed_proof_rejected() {
    let dir = tempdir().expect("tempdir");
    let setup = open_chain(&dir, ChainConfig::default());
    setup
        .chain
        .initialize_chain(&node_key(1))
        .expect("initialize");

    let mut block = setup.chain.propose_block().expect("propose");
    block.body.seed_proof[50] ^= 0x01;
    let err = setup.chain.add_block(&block).expect_err("tampered seed");
    assert_eq!(err.code(), "INVALID_SEED");
}

#[test]
fn proposals_from_non_validators_rejected() {
    let dir = tempdir().expect("tempdir");
    let setup = open_chain(&dir, ChainConfig::default());
    setup
        .chain
        .initialize_chain(&node_key(1))
        .expect("initialize");
    // Populate the cache without the node's coinbase.
    seed_verified_identities(&setup.chain, 5, &[]);

    let block = setup.chain.propose_block().expect("propose");
    let err = setup.chain.add_block(&block).expect_err("not a validator");
    assert_eq!(err.code(), "INVALID_PROPOSER");
}

#[test]
fn committee_sizing_follows_validator_count() {
    let dir = tempdir().expect("tempdir");
    let setup = open_chain(&dir, ChainConfig::default());
    setup
        .chain
        .initialize_chain(&node_key(1))
        .expect("initialize");

    // Small networks: the whole validator set is the committee.
    seed_verified_identities(&setup.chain, 5, &[]);
    assert_eq!(setup.chain.get_committee_size(false), 5);
    assert_eq!(setup.chain.get_committee_votes_threshold(false), 3);

    // Large networks scale by the configured percentages.
    seed_verified_identities(&setup.chain, 20, &[]);
    assert_eq!(setup.chain.get_committee_size(false), 6);
    assert_eq!(setup.chain.get_committee_size(true), 14);
    assert_eq!(setup.chain.get_committee_votes_threshold(false), 3);
}

#[test]
fn vote_threshold_table_for_small_networks() {
    let dir = tempdir().expect("tempdir");
    let setup = open_chain(&dir, ChainConfig::default());
    setup
        .chain
        .initialize_chain(&node_key(1))
        .expect("initialize");

    let expected: [(u8, usize); 8] =
        [(1, 1), (2, 2), (3, 2), (4, 3), (5, 3), (6, 4), (7, 4), (8, 5)];
    for (count, threshold) in expected {
        seed_verified_identities(&setup.chain, count, &[]);
        assert_eq!(
            setup.chain.get_committee_votes_threshold(false),
            threshold,
            "validator count {count}"
        );
    }
}

#[test]
fn unknown_destination_has_no_identity() {
    // Guard against accidental identity creation through committee rewards.
    let dir = tempdir().expect("tempdir");
    let setup = open_chain(&dir, ChainConfig::default());
    setup
        .chain
        .initialize_chain(&node_key(1))
        .expect("initialize");
    let coinbase = setup.chain.coinbase().expect("coinbase");
    seed_verified_identities(&setup.chain, 9, &[coinbase]);

    let block = setup.chain.propose_block().expect("propose");
    setup.chain.add_block(&block).expect("add");

    let stranger = Address::new([0xEE; 20]);
    assert!(setup.chain.state().identity(&stranger).is_empty());
    assert_eq!(address_of(&node_key(1)), coinbase);
}
