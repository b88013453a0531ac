mod support;

use dna_chain::config::{ChainConfig, Network};
use dna_chain::crypto::keccak256;
use dna_chain::types::{BlockCert, Hash};
use tempfile::tempdir;

use support::{node_key, open_chain};

#[test]
fn genesis_matches_network_seed() {
    let dir = tempdir().expect("tempdir");
    let setup = open_chain(&dir, ChainConfig::default());
    setup
        .chain
        .initialize_chain(&node_key(1))
        .expect("initialize");

    let head = setup.chain.get_head().expect("head");
    assert_eq!(head.height(), 1);
    assert_eq!(head.parent_hash(), Hash::default());
    assert_eq!(
        head.seed().to_hash(),
        keccak256(&[0x1, 0x2, 0x3, 0x4, 0x5, 0x6, 0x1])
    );
    assert_eq!(setup.chain.genesis(), Some(head.hash()));
    assert_eq!(setup.chain.round(), 2);
    assert_eq!(setup.chain.network(), Network::Mainnet);

    let state = setup.chain.state();
    assert_eq!(state.epoch(), 0);
    assert_eq!(state.next_epoch_block(), 100);
}

#[test]
fn testnet_genesis_uses_its_network_id() {
    let dir = tempdir().expect("tempdir");
    let mut config = ChainConfig::default();
    config.network = Network::Testnet;
    let setup = open_chain(&dir, config);
    setup
        .chain
        .initialize_chain(&node_key(1))
        .expect("initialize");

    let head = setup.chain.get_head().expect("head");
    assert_eq!(
        head.seed().to_hash(),
        keccak256(&[0x1, 0x2, 0x3, 0x4, 0x5, 0x6, 0x2])
    );
}

#[test]
fn proposed_blocks_roundtrip_through_repository() {
    let dir = tempdir().expect("tempdir");
    let setup = open_chain(&dir, ChainConfig::default());
    setup
        .chain
        .initialize_chain(&node_key(1))
        .expect("initialize");

    let block = setup.chain.propose_block().expect("propose");
    assert_eq!(block.height(), 2);
    setup.chain.add_block(&block).expect("add");

    let head = setup.chain.get_head().expect("head");
    assert_eq!(head.hash(), block.hash());
    assert_eq!(
        setup
            .chain
            .get_block(&block.hash())
            .expect("read")
            .expect("present"),
        block
    );
    assert_eq!(
        setup
            .chain
            .get_block_by_height(2)
            .expect("read")
            .expect("present")
            .hash(),
        block.hash()
    );
    assert_eq!(setup.chain.round(), 3);
}

#[test]
fn empty_block_advances_head() {
    let dir = tempdir().expect("tempdir");
    let setup = open_chain(&dir, ChainConfig::default());
    setup
        .chain
        .initialize_chain(&node_key(1))
        .expect("initialize");

    let empty = setup.chain.generate_empty_block().expect("generate");
    assert!(empty.is_empty());
    assert!(!empty.seed().is_zero());
    setup.chain.add_block(&empty).expect("add");

    // The received block is the one inserted.
    let head = setup.chain.get_head().expect("head");
    assert_eq!(head.hash(), empty.hash());
}

#[test]
fn head_recovers_after_reopen() {
    let dir = tempdir().expect("tempdir");
    let head_hash;
    {
        let setup = open_chain(&dir, ChainConfig::default());
        setup
            .chain
            .initialize_chain(&node_key(1))
            .expect("initialize");
        let block = setup.chain.propose_block().expect("propose");
        setup.chain.add_block(&block).expect("add");
        head_hash = block.hash();
    }

    let setup = open_chain(&dir, ChainConfig::default());
    setup
        .chain
        .initialize_chain(&node_key(1))
        .expect("reinitialize");
    let head = setup.chain.get_head().expect("head");
    assert_eq!(head.hash(), head_hash);
    assert_eq!(head.height(), 2);
    assert_eq!(
        setup.chain.genesis(),
        Some(
            setup
                .chain
                .get_block_by_height(1)
                .expect("read")
                .expect("genesis")
                .hash()
        )
    );
}

#[test]
fn final_consensus_hook_stores_certificate() {
    let dir = tempdir().expect("tempdir");
    let setup = open_chain(&dir, ChainConfig::default());
    setup
        .chain
        .initialize_chain(&node_key(1))
        .expect("initialize");

    let head = setup.chain.get_head().expect("head");
    let cert = BlockCert::new(vec![0xca, 0xfe]);
    setup
        .chain
        .write_final_consensus(&head.hash(), &cert)
        .expect("write final");

    assert!(setup.storage.is_final(&head.hash()).expect("read"));
    assert_eq!(
        setup
            .storage
            .read_cert(&head.hash())
            .expect("read")
            .expect("cert"),
        cert
    );
}
