use serde::{Deserialize, Serialize};

use crate::encode::{write_compact_size, Decoder};
use crate::error::TypeError;
use crate::hash::Hash;
use crate::tx::Transaction;

/// Size of a serialized block header in bytes.
pub const HEADER_SIZE: usize = 80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.prev_block.as_bytes());
        out[36..68].copy_from_slice(self.merkle_root.as_bytes());
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// Decode a header from the first 80 bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, TypeError> {
        Self::decode_from(&mut Decoder::new(bytes))
    }

    pub fn decode_from(dec: &mut Decoder<'_>) -> Result<Self, TypeError> {
        Ok(Self {
            version: dec.read_i32_le()?,
            prev_block: dec.read_hash()?,
            merkle_root: dec.read_hash()?,
            timestamp: dec.read_u32_le()?,
            bits: dec.read_u32_le()?,
            nonce: dec.read_u32_le()?,
        })
    }

    /// Block hash: double SHA-256 of the 80 header bytes.
    pub fn hash(&self) -> Hash {
        Hash::double_sha256(&self.encode())
    }
}

/// Byte range of one transaction inside a serialized block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLoc {
    pub offset: u32,
    pub len: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            HEADER_SIZE + 9 + self.transactions.iter().map(|t| t.serialized_size()).sum::<usize>(),
        );
        out.extend_from_slice(&self.header.encode());
        write_compact_size(&mut out, self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.encode_into(&mut out);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TypeError> {
        Self::decode_with_locations(bytes).map(|(block, _)| block)
    }

    /// Decode a block and record where each transaction sits in `bytes`.
    pub fn decode_with_locations(bytes: &[u8]) -> Result<(Self, Vec<TxLoc>), TypeError> {
        let mut dec = Decoder::new(bytes);
        let header = BlockHeader::decode_from(&mut dec)?;
        let count = dec.read_count()?;

        let mut transactions = Vec::with_capacity(count);
        let mut locations = Vec::with_capacity(count);
        for _ in 0..count {
            let start = dec.position();
            transactions.push(Transaction::decode_from(&mut dec)?);
            locations.push(TxLoc {
                offset: start as u32,
                len: (dec.position() - start) as u32,
            });
        }
        dec.finish()?;

        Ok((
            Self {
                header,
                transactions,
            },
            locations,
        ))
    }

    /// Merkle root over the block's transaction ids.
    pub fn compute_merkle_root(&self) -> Hash {
        let txids: Vec<Hash> = self.transactions.iter().map(Transaction::txid).collect();
        merkle_root(&txids)
    }
}

/// Bitcoin-style merkle root: pairs are hashed with double SHA-256 and an odd
/// trailing node is paired with itself. An empty list yields the zero hash.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::ZERO;
    }
    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(left);
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(left.as_bytes());
                buf[32..].copy_from_slice(right.as_bytes());
                Hash::double_sha256(&buf)
            })
            .collect();
    }
    level[0]
}

/// A decoded block placed on the chain.
///
/// Caches the block hash, its height, and the byte location of every
/// transaction so indexers never re-serialize the block to find them.
#[derive(Clone, Debug)]
pub struct ChainBlock {
    block: Block,
    hash: Hash,
    height: u32,
    tx_locs: Vec<TxLoc>,
    txids: Vec<Hash>,
}

impl ChainBlock {
    /// Decode a serialized block at `height`.
    pub fn from_bytes(bytes: &[u8], height: u32) -> Result<Self, TypeError> {
        let (block, tx_locs) = Block::decode_with_locations(bytes)?;
        // A legacy transaction's bytes are exactly what its txid commits to.
        let txids = block
            .transactions
            .iter()
            .zip(&tx_locs)
            .map(|(tx, loc)| match tx.has_witness() {
                true => tx.txid(),
                false => {
                    let start = loc.offset as usize;
                    Hash::double_sha256(&bytes[start..start + loc.len as usize])
                }
            })
            .collect();
        Ok(Self {
            hash: block.hash(),
            block,
            height,
            tx_locs,
            txids,
        })
    }

    pub fn new(block: Block, height: u32) -> Self {
        let bytes = block.encode();
        let mut tx_locs = Vec::with_capacity(block.transactions.len());
        let mut offset = bytes.len();
        for tx in block.transactions.iter().rev() {
            let len = tx.serialized_size();
            offset -= len;
            tx_locs.push(TxLoc {
                offset: offset as u32,
                len: len as u32,
            });
        }
        tx_locs.reverse();
        let txids = block.transactions.iter().map(Transaction::txid).collect();
        Self {
            hash: block.hash(),
            block,
            height,
            tx_locs,
            txids,
        }
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn prev_hash(&self) -> Hash {
        self.block.header.prev_block
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.block.transactions
    }

    /// Transaction ids, parallel to [`transactions`](Self::transactions).
    pub fn txids(&self) -> &[Hash] {
        &self.txids
    }

    /// Transaction byte locations, parallel to [`transactions`](Self::transactions).
    pub fn tx_locs(&self) -> &[TxLoc] {
        &self.tx_locs
    }

    pub fn into_block(self) -> Block {
        self.block
    }
}
