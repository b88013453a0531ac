//! Durable repository over RocksDB column families.
//!
//! Keys are typed per column family (block hashes, big-endian heights,
//! addresses); values carry the crate's wire encoding. Block insertion writes
//! block → canonical index → head so a crash leaves the head at most one
//! entry behind durable data.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options,
};

use crate::errors::{ChainError, ChainResult};
use crate::types::{Account, Address, Block, BlockCert, Global, Hash, Header, Identity};

pub(crate) const CF_BLOCKS: &str = "blocks";
pub(crate) const CF_CANONICAL: &str = "canonical";
pub(crate) const CF_CERTS: &str = "certs";
pub(crate) const CF_METADATA: &str = "metadata";
pub(crate) const CF_ACCOUNTS: &str = "accounts";
pub(crate) const CF_IDENTITIES: &str = "identities";

const HEAD_KEY: &[u8] = b"head";
const GLOBAL_KEY: &[u8] = b"global";
const STATE_VERSION_KEY: &[u8] = b"state_version";
const FINAL_PREFIX: &[u8] = b"final:";

pub struct Storage {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl Storage {
    pub fn open(path: &Path) -> ChainResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BLOCKS, Options::default()),
            ColumnFamilyDescriptor::new(CF_CANONICAL, Options::default()),
            ColumnFamilyDescriptor::new(CF_CERTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_METADATA, Options::default()),
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_IDENTITIES, Options::default()),
        ];
        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> ChainResult<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ChainError::Config(format!("missing {name} column family")))
    }

    pub fn write_block(&self, block: &Block) -> ChainResult<()> {
        let cf = self.cf(CF_BLOCKS)?;
        self.db
            .put_cf(&cf, block.hash().as_bytes(), block.to_rlp())?;
        Ok(())
    }

    pub fn read_block(&self, hash: &Hash) -> ChainResult<Option<Block>> {
        let cf = self.cf(CF_BLOCKS)?;
        match self.db.get_cf(&cf, hash.as_bytes())? {
            Some(value) => Ok(Some(Block::from_rlp(&value)?)),
            None => Ok(None),
        }
    }

    pub fn write_head(&self, header: &Header) -> ChainResult<()> {
        let cf = self.cf(CF_METADATA)?;
        self.db.put_cf(&cf, HEAD_KEY, header.to_rlp())?;
        Ok(())
    }

    pub fn read_head(&self) -> ChainResult<Option<Header>> {
        let cf = self.cf(CF_METADATA)?;
        match self.db.get_cf(&cf, HEAD_KEY)? {
            Some(value) => Ok(Some(Header::from_rlp(&value)?)),
            None => Ok(None),
        }
    }

    pub fn write_canonical_hash(&self, height: u64, hash: &Hash) -> ChainResult<()> {
        let cf = self.cf(CF_CANONICAL)?;
        self.db.put_cf(&cf, height.to_be_bytes(), hash.as_bytes())?;
        Ok(())
    }

    pub fn read_canonical_hash(&self, height: u64) -> ChainResult<Option<Hash>> {
        let cf = self.cf(CF_CANONICAL)?;
        match self.db.get_cf(&cf, height.to_be_bytes())? {
            Some(value) => Ok(Some(Hash::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    pub fn write_cert(&self, hash: &Hash, cert: &BlockCert) -> ChainResult<()> {
        let cf = self.cf(CF_CERTS)?;
        self.db.put_cf(&cf, hash.as_bytes(), cert.to_rlp())?;
        Ok(())
    }

    pub fn read_cert(&self, hash: &Hash) -> ChainResult<Option<BlockCert>> {
        let cf = self.cf(CF_CERTS)?;
        match self.db.get_cf(&cf, hash.as_bytes())? {
            Some(value) => Ok(Some(BlockCert::from_rlp(&value)?)),
            None => Ok(None),
        }
    }

    pub fn write_final_consensus(&self, hash: &Hash) -> ChainResult<()> {
        let cf = self.cf(CF_METADATA)?;
        self.db.put_cf(&cf, final_key(hash), [1u8])?;
        Ok(())
    }

    pub fn is_final(&self, hash: &Hash) -> ChainResult<bool> {
        let cf = self.cf(CF_METADATA)?;
        Ok(self.db.get_cf(&cf, final_key(hash))?.is_some())
    }

    pub fn put_account(&self, address: &Address, account: &Account) -> ChainResult<()> {
        let cf = self.cf(CF_ACCOUNTS)?;
        self.db.put_cf(&cf, address.as_bytes(), account.to_rlp())?;
        Ok(())
    }

    pub fn delete_account(&self, address: &Address) -> ChainResult<()> {
        let cf = self.cf(CF_ACCOUNTS)?;
        self.db.delete_cf(&cf, address.as_bytes())?;
        Ok(())
    }

    pub fn load_accounts(&self) -> ChainResult<BTreeMap<Address, Account>> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let mut accounts = BTreeMap::new();
        for entry in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = entry?;
            accounts.insert(Address::from_slice(&key)?, Account::from_rlp(&value)?);
        }
        Ok(accounts)
    }

    pub fn put_identity(&self, address: &Address, identity: &Identity) -> ChainResult<()> {
        let cf = self.cf(CF_IDENTITIES)?;
        self.db.put_cf(&cf, address.as_bytes(), identity.to_rlp())?;
        Ok(())
    }

    pub fn delete_identity(&self, address: &Address) -> ChainResult<()> {
        let cf = self.cf(CF_IDENTITIES)?;
        self.db.delete_cf(&cf, address.as_bytes())?;
        Ok(())
    }

    pub fn load_identities(&self) -> ChainResult<BTreeMap<Address, Identity>> {
        let cf = self.cf(CF_IDENTITIES)?;
        let mut identities = BTreeMap::new();
        for entry in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = entry?;
            identities.insert(Address::from_slice(&key)?, Identity::from_rlp(&value)?);
        }
        Ok(identities)
    }

    pub fn write_global(&self, global: &Global) -> ChainResult<()> {
        let cf = self.cf(CF_METADATA)?;
        self.db.put_cf(&cf, GLOBAL_KEY, global.to_rlp())?;
        Ok(())
    }

    pub fn read_global(&self) -> ChainResult<Option<Global>> {
        let cf = self.cf(CF_METADATA)?;
        match self.db.get_cf(&cf, GLOBAL_KEY)? {
            Some(value) => Ok(Some(Global::from_rlp(&value)?)),
            None => Ok(None),
        }
    }

    pub fn write_state_version(&self, version: u64) -> ChainResult<()> {
        let cf = self.cf(CF_METADATA)?;
        self.db
            .put_cf(&cf, STATE_VERSION_KEY, version.to_be_bytes())?;
        Ok(())
    }

    pub fn read_state_version(&self) -> ChainResult<Option<u64>> {
        let cf = self.cf(CF_METADATA)?;
        match self.db.get_cf(&cf, STATE_VERSION_KEY)? {
            Some(value) => {
                let bytes: [u8; 8] = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| ChainError::Encoding("invalid state version encoding".into()))?;
                Ok(Some(u64::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }
}

fn final_key(hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(FINAL_PREFIX.len() + Hash::LEN);
    key.extend_from_slice(FINAL_PREFIX);
    key.extend_from_slice(hash.as_bytes());
    key
}

impl Clone for Storage {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}
