use crate::crypto::keccak256;
use crate::errors::{ChainError, ChainResult};
use crate::rlp;
use crate::types::{Address, Hash, Seed, Transaction};

const EMPTY_HEADER_TAG: u64 = 0;
const PROPOSED_HEADER_TAG: u64 = 1;

/// Header of a block built by an elected proposer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposedHeader {
    pub parent_hash: Hash,
    pub height: u64,
    pub time: u64,
    pub proposer_pubkey: Vec<u8>,
    pub tx_root: Hash,
    pub state_root: Hash,
    pub coinbase: Address,
}

/// Header reconstructed for a round that produced no proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmptyHeader {
    pub parent_hash: Hash,
    pub height: u64,
    pub state_root: Hash,
}

/// A block header is exactly one of the two variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Header {
    Proposed(ProposedHeader),
    Empty(EmptyHeader),
}

impl Header {
    pub fn height(&self) -> u64 {
        match self {
            Header::Proposed(header) => header.height,
            Header::Empty(header) => header.height,
        }
    }

    pub fn parent_hash(&self) -> Hash {
        match self {
            Header::Proposed(header) => header.parent_hash,
            Header::Empty(header) => header.parent_hash,
        }
    }

    pub fn state_root(&self) -> Hash {
        match self {
            Header::Proposed(header) => header.state_root,
            Header::Empty(header) => header.state_root,
        }
    }

    pub fn coinbase(&self) -> Option<Address> {
        match self {
            Header::Proposed(header) => Some(header.coinbase),
            Header::Empty(_) => None,
        }
    }

    pub fn proposer_pubkey(&self) -> Option<&[u8]> {
        match self {
            Header::Proposed(header) => Some(&header.proposer_pubkey),
            Header::Empty(_) => None,
        }
    }

    pub fn hash(&self) -> Hash {
        keccak256(&self.to_rlp())
    }

    pub fn to_rlp(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        match self {
            Header::Empty(header) => {
                payload.extend_from_slice(&rlp::encode_uint(EMPTY_HEADER_TAG));
                payload.extend_from_slice(&rlp::encode_bytes(header.parent_hash.as_bytes()));
                payload.extend_from_slice(&rlp::encode_uint(header.height));
                payload.extend_from_slice(&rlp::encode_bytes(header.state_root.as_bytes()));
            }
            Header::Proposed(header) => {
                payload.extend_from_slice(&rlp::encode_uint(PROPOSED_HEADER_TAG));
                payload.extend_from_slice(&rlp::encode_bytes(header.parent_hash.as_bytes()));
                payload.extend_from_slice(&rlp::encode_uint(header.height));
                payload.extend_from_slice(&rlp::encode_uint(header.time));
                payload.extend_from_slice(&rlp::encode_bytes(&header.proposer_pubkey));
                payload.extend_from_slice(&rlp::encode_bytes(header.tx_root.as_bytes()));
                payload.extend_from_slice(&rlp::encode_bytes(header.state_root.as_bytes()));
                payload.extend_from_slice(&rlp::encode_bytes(header.coinbase.as_bytes()));
            }
        }
        rlp::encode_list(&payload)
    }

    pub fn from_rlp(data: &[u8]) -> ChainResult<Self> {
        let item = rlp::decode(data)?;
        Self::from_item(&item)
    }

    fn from_item(item: &rlp::Item<'_>) -> ChainResult<Self> {
        let fields = item.list()?;
        let tag = fields
            .first()
            .ok_or_else(|| ChainError::Encoding("header is empty".into()))?
            .uint()?;
        match tag {
            EMPTY_HEADER_TAG => {
                if fields.len() != 4 {
                    return Err(ChainError::Encoding("empty header must have 4 fields".into()));
                }
                Ok(Header::Empty(EmptyHeader {
                    parent_hash: Hash::from_slice(fields[1].bytes()?)?,
                    height: fields[2].uint()?,
                    state_root: Hash::from_slice(fields[3].bytes()?)?,
                }))
            }
            PROPOSED_HEADER_TAG => {
                if fields.len() != 8 {
                    return Err(ChainError::Encoding(
                        "proposed header must have 8 fields".into(),
                    ));
                }
                Ok(Header::Proposed(ProposedHeader {
                    parent_hash: Hash::from_slice(fields[1].bytes()?)?,
                    height: fields[2].uint()?,
                    time: fields[3].uint()?,
                    proposer_pubkey: fields[4].bytes()?.to_vec(),
                    tx_root: Hash::from_slice(fields[5].bytes()?)?,
                    state_root: Hash::from_slice(fields[6].bytes()?)?,
                    coinbase: Address::from_slice(fields[7].bytes()?)?,
                }))
            }
            other => Err(ChainError::Encoding(format!("unknown header tag {other}"))),
        }
    }
}

/// Transactions plus the VRF seed material of a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Body {
    pub transactions: Vec<Transaction>,
    pub block_seed: Seed,
    pub seed_proof: Vec<u8>,
}

impl Body {
    fn to_rlp(&self) -> Vec<u8> {
        let mut txs_payload = Vec::new();
        for tx in &self.transactions {
            txs_payload.extend_from_slice(&tx.to_rlp());
        }
        let mut payload = rlp::encode_list(&txs_payload);
        payload.extend_from_slice(&rlp::encode_bytes(self.block_seed.as_bytes()));
        payload.extend_from_slice(&rlp::encode_bytes(&self.seed_proof));
        rlp::encode_list(&payload)
    }

    fn from_item(item: &rlp::Item<'_>) -> ChainResult<Self> {
        let fields = item.list()?;
        if fields.len() != 3 {
            return Err(ChainError::Encoding("body must have 3 fields".into()));
        }
        let mut transactions = Vec::new();
        for tx_item in fields[0].list()? {
            let encoded = match tx_item {
                rlp::Item::List(_) => {
                    // Re-encode the nested item so the transaction decoder sees
                    // its own canonical bytes.
                    reencode(tx_item)
                }
                rlp::Item::Bytes(_) => {
                    return Err(ChainError::Encoding("transaction must be a list".into()))
                }
            };
            transactions.push(Transaction::from_rlp(&encoded)?);
        }
        Ok(Self {
            transactions,
            block_seed: Seed::from_slice(fields[1].bytes()?)?,
            seed_proof: fields[2].bytes()?.to_vec(),
        })
    }
}

fn reencode(item: &rlp::Item<'_>) -> Vec<u8> {
    match item {
        rlp::Item::Bytes(data) => rlp::encode_bytes(data),
        rlp::Item::List(items) => {
            let mut payload = Vec::new();
            for inner in items {
                payload.extend_from_slice(&reencode(inner));
            }
            rlp::encode_list(&payload)
        }
    }
}

/// Header plus body; the block hash commits to the header only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub body: Body,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn height(&self) -> u64 {
        self.header.height()
    }

    pub fn parent_hash(&self) -> Hash {
        self.header.parent_hash()
    }

    pub fn state_root(&self) -> Hash {
        self.header.state_root()
    }

    pub fn seed(&self) -> &Seed {
        &self.body.block_seed
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.header, Header::Empty(_))
    }

    pub fn to_rlp(&self) -> Vec<u8> {
        let mut payload = self.header.to_rlp();
        payload.extend_from_slice(&self.body.to_rlp());
        rlp::encode_list(&payload)
    }

    pub fn from_rlp(data: &[u8]) -> ChainResult<Self> {
        let item = rlp::decode(data)?;
        let fields = item.list()?;
        if fields.len() != 2 {
            return Err(ChainError::Encoding("block must have 2 fields".into()));
        }
        Ok(Self {
            header: Header::from_item(&fields[0])?,
            body: Body::from_item(&fields[1])?,
        })
    }
}

/// Opaque finality certificate produced by the external voting protocol.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockCert(Vec<u8>);

impl BlockCert {
    pub fn new(payload: Vec<u8>) -> Self {
        Self(payload)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_rlp(&self) -> Vec<u8> {
        rlp::encode_bytes(&self.0)
    }

    pub fn from_rlp(data: &[u8]) -> ChainResult<Self> {
        Ok(Self(rlp::decode(data)?.bytes()?.to_vec()))
    }
}

/// Pairwise-folded keccak merkle root; the odd leaf is paired with itself.
pub fn compute_merkle_root(leaves: &mut Vec<Hash>) -> Hash {
    if leaves.is_empty() {
        return keccak256(&rlp::encode_list(&[]));
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let left = chunk[0];
            let right = if chunk.len() == 2 { chunk[1] } else { chunk[0] };
            let mut data = Vec::with_capacity(64);
            data.extend_from_slice(left.as_bytes());
            data.extend_from_slice(right.as_bytes());
            next.push(keccak256(&data));
        }
        *leaves = next;
    }
    leaves[0]
}

/// Merkle root over the wire encoding of the body's transactions.
pub fn derive_tx_root(transactions: &[Transaction]) -> Hash {
    let mut leaves = transactions
        .iter()
        .map(|tx| keccak256(&tx.to_rlp()))
        .collect::<Vec<_>>();
    compute_merkle_root(&mut leaves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keypair_from_seed;
    use crate::types::{Coins, TxType};

    fn sample_block() -> Block {
        let key = keypair_from_seed(&[3u8; 32]).expect("key");
        let mut tx = Transaction::new(
            TxType::Regular,
            0,
            1,
            Some(Address::new([0x11; 20])),
            Coins::from_u64(5),
        );
        tx.sign(&key).expect("sign");
        let transactions = vec![tx];
        Block {
            header: Header::Proposed(ProposedHeader {
                parent_hash: Hash::new([0xaa; 32]),
                height: 2,
                time: 1_700_000_000,
                proposer_pubkey: vec![0x04; 65],
                tx_root: derive_tx_root(&transactions),
                state_root: Hash::new([0xbb; 32]),
                coinbase: Address::new([0xcc; 20]),
            }),
            body: Body {
                transactions,
                block_seed: Seed::new([0xdd; 32]),
                seed_proof: vec![0xee; 97],
            },
        }
    }

    #[test]
    fn block_wire_roundtrip() {
        let block = sample_block();
        let decoded = Block::from_rlp(&block.to_rlp()).expect("decode");
        assert_eq!(decoded, block);
        assert_eq!(decoded.hash(), block.hash());
    }

    #[test]
    fn empty_header_roundtrip() {
        let header = Header::Empty(EmptyHeader {
            parent_hash: Hash::new([0x01; 32]),
            height: 9,
            state_root: Hash::new([0x02; 32]),
        });
        assert_eq!(Header::from_rlp(&header.to_rlp()).expect("decode"), header);
    }

    #[test]
    fn block_hash_commits_to_header_only() {
        let block = sample_block();
        let mut reseeded = block.clone();
        reseeded.body.block_seed = Seed::new([0x55; 32]);
        assert_eq!(block.hash(), reseeded.hash());

        let mut reparented = block.clone();
        if let Header::Proposed(header) = &mut reparented.header {
            header.parent_hash = Hash::new([0x56; 32]);
        }
        assert_ne!(block.hash(), reparented.hash());
    }

    #[test]
    fn tx_root_depends_on_order() {
        let key = keypair_from_seed(&[4u8; 32]).expect("key");
        let mut first = Transaction::new(TxType::Kill, 0, 1, None, Coins::zero());
        first.sign(&key).expect("sign");
        let mut second = Transaction::new(TxType::Kill, 0, 2, None, Coins::zero());
        second.sign(&key).expect("sign");

        let forward = derive_tx_root(&[first.clone(), second.clone()]);
        let backward = derive_tx_root(&[second, first]);
        assert_ne!(forward, backward);
        assert_eq!(derive_tx_root(&[]), derive_tx_root(&[]));
    }
}
