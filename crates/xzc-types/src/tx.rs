use serde::{Deserialize, Serialize};

use crate::encode::{compact_size_len, write_compact_size, write_var_bytes, Decoder};
use crate::error::TypeError;
use crate::hash::Hash;

/// Reference to a specific output of a previous transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    /// The outpoint carried by a coinbase input.
    pub const NULL: OutPoint = OutPoint {
        hash: Hash::ZERO,
        index: u32::MAX,
    };

    pub fn new(hash: Hash, index: u32) -> Self {
        Self { hash, index }
    }

    pub fn is_null(&self) -> bool {
        self.index == u32::MAX && self.hash.is_zero()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub signature_script: Vec<u8>,
    pub sequence: u32,
    /// Segregated witness stack; empty for inputs without one.
    #[serde(default)]
    pub witness: Vec<Vec<u8>>,
}

impl TxIn {
    pub fn new(previous_output: OutPoint, signature_script: Vec<u8>, sequence: u32) -> Self {
        Self {
            previous_output,
            signature_script,
            sequence,
            witness: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: i64,
    pub pk_script: Vec<u8>,
}

/// Marker and flag bytes that follow the version in a witness serialization.
const WITNESS_MARKER: u8 = 0x00;
const WITNESS_FLAG: u8 = 0x01;

/// A transaction. Encodes in the witness serialization when any input
/// carries a witness stack and in the legacy one otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// A transaction is a coinbase when its only input spends the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|i| !i.witness.is_empty())
    }

    /// Transaction id: double SHA-256 of the legacy serialization, so it
    /// does not commit to witness data.
    pub fn txid(&self) -> Hash {
        let mut out = Vec::with_capacity(self.base_size());
        self.encode_base(&mut out, false);
        Hash::double_sha256(&out)
    }

    /// Witness transaction id: double SHA-256 of the full serialization.
    /// Equal to [`txid`](Self::txid) for transactions without witnesses.
    pub fn wtxid(&self) -> Hash {
        Hash::double_sha256(&self.encode())
    }

    /// Full serialization, including witness data when present.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_size());
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        self.encode_base(out, self.has_witness());
    }

    fn encode_base(&self, out: &mut Vec<u8>, witness: bool) {
        out.extend_from_slice(&self.version.to_le_bytes());
        if witness {
            out.push(WITNESS_MARKER);
            out.push(WITNESS_FLAG);
        }
        write_compact_size(out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(input.previous_output.hash.as_bytes());
            out.extend_from_slice(&input.previous_output.index.to_le_bytes());
            write_var_bytes(out, &input.signature_script);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_compact_size(out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_var_bytes(out, &output.pk_script);
        }
        if witness {
            for input in &self.inputs {
                write_compact_size(out, input.witness.len() as u64);
                for item in &input.witness {
                    write_var_bytes(out, item);
                }
            }
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
    }

    /// Size of the full serialization returned by [`encode`](Self::encode).
    pub fn serialized_size(&self) -> usize {
        if !self.has_witness() {
            return self.base_size();
        }
        let witness: usize = self
            .inputs
            .iter()
            .map(|i| {
                compact_size_len(i.witness.len() as u64)
                    + i.witness
                        .iter()
                        .map(|item| compact_size_len(item.len() as u64) + item.len())
                        .sum::<usize>()
            })
            .sum();
        self.base_size() + 2 + witness
    }

    /// Size of the legacy serialization.
    pub fn base_size(&self) -> usize {
        let inputs: usize = self
            .inputs
            .iter()
            .map(|i| {
                32 + 4
                    + compact_size_len(i.signature_script.len() as u64)
                    + i.signature_script.len()
                    + 4
            })
            .sum();
        let outputs: usize = self
            .outputs
            .iter()
            .map(|o| 8 + compact_size_len(o.pk_script.len() as u64) + o.pk_script.len())
            .sum();
        4 + compact_size_len(self.inputs.len() as u64)
            + inputs
            + compact_size_len(self.outputs.len() as u64)
            + outputs
            + 4
    }

    /// Decode exactly one transaction from `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, TypeError> {
        let mut dec = Decoder::new(bytes);
        let tx = Self::decode_from(&mut dec)?;
        dec.finish()?;
        Ok(tx)
    }

    /// Decode one transaction in either serialization.
    ///
    /// A zero input count directly after the version is read as the witness
    /// marker, which must be followed by the flag byte.
    pub fn decode_from(dec: &mut Decoder<'_>) -> Result<Self, TypeError> {
        let version = dec.read_i32_le()?;

        let witness = match dec.peek(1) {
            Some([WITNESS_MARKER]) => {
                dec.read_u8()?;
                let flag = dec.read_u8()?;
                if flag != WITNESS_FLAG {
                    return Err(TypeError::MalformedWitness(format!(
                        "unknown flag byte {flag:#04x}"
                    )));
                }
                true
            }
            _ => false,
        };

        let n_in = dec.read_count()?;
        let mut inputs = Vec::with_capacity(n_in);
        for _ in 0..n_in {
            let hash = dec.read_hash()?;
            let index = dec.read_u32_le()?;
            let signature_script = dec.read_var_bytes()?;
            let sequence = dec.read_u32_le()?;
            inputs.push(TxIn::new(OutPoint { hash, index }, signature_script, sequence));
        }

        let n_out = dec.read_count()?;
        let mut outputs = Vec::with_capacity(n_out);
        for _ in 0..n_out {
            let value = dec.read_i64_le()?;
            let pk_script = dec.read_var_bytes()?;
            outputs.push(TxOut { value, pk_script });
        }

        if witness {
            for input in &mut inputs {
                let items = dec.read_count()?;
                input.witness.reserve(items);
                for _ in 0..items {
                    input.witness.push(dec.read_var_bytes()?);
                }
            }
            if inputs.iter().all(|i| i.witness.is_empty()) {
                return Err(TypeError::MalformedWitness(
                    "witness serialization without any witness data".into(),
                ));
            }
        }

        let lock_time = dec.read_u32_le()?;
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }
}

/// The previous output consumed by a transaction input.
///
/// Blocks only carry outpoints; indexers that key on the spending script
/// receive the spent outputs alongside the block, one per non-coinbase input
/// in block order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentOutput {
    pub amount: i64,
    pub pk_script: Vec<u8>,
}

impl From<&TxOut> for SpentOutput {
    fn from(out: &TxOut) -> Self {
        Self {
            amount: out.value,
            pk_script: out.pk_script.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coinbase() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn::new(OutPoint::NULL, vec![0x51, 0x01, 0x02], u32::MAX)],
            outputs: vec![TxOut {
                value: 50 * 100_000_000,
                pk_script: vec![0x76, 0xa9],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn coinbase_detection() {
        let cb = coinbase();
        assert!(cb.is_coinbase());

        let mut spend = cb.clone();
        spend.inputs[0].previous_output = OutPoint::new(cb.txid(), 0);
        assert!(!spend.is_coinbase());
    }

    #[test]
    fn serialized_size_matches_encoding() {
        let tx = coinbase();
        assert_eq!(tx.encode().len(), tx.serialized_size());
    }

    #[test]
    fn decode_restores_transaction() {
        let tx = coinbase();
        let decoded = Transaction::decode(&tx.encode()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.txid(), tx.txid());
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut bytes = coinbase().encode();
        bytes.push(0);
        assert_eq!(Transaction::decode(&bytes), Err(TypeError::TrailingBytes(1)));
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let bytes = coinbase().encode();
        let err = Transaction::decode(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, TypeError::UnexpectedEof { .. }));
    }

    fn witness_spend() -> Transaction {
        let mut input = TxIn::new(OutPoint::new(coinbase().txid(), 0), Vec::new(), 0xffff_fffd);
        input.witness = vec![vec![0x30; 71], vec![0x02; 33]];
        Transaction {
            version: 2,
            inputs: vec![input],
            outputs: vec![TxOut {
                value: 49 * 100_000_000,
                pk_script: [&[0x00, 0x14][..], &[0x11; 20]].concat(),
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn witness_transaction_round_trips() {
        let tx = witness_spend();
        let bytes = tx.encode();
        assert_eq!(&bytes[4..6], &[WITNESS_MARKER, WITNESS_FLAG]);
        assert_eq!(bytes.len(), tx.serialized_size());

        let decoded = Transaction::decode(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert!(decoded.has_witness());
    }

    #[test]
    fn txid_ignores_witness_data() {
        let tx = witness_spend();
        let mut stripped = tx.clone();
        stripped.inputs[0].witness.clear();

        assert_eq!(tx.txid(), stripped.txid());
        assert_eq!(stripped.txid(), stripped.wtxid());
        assert_ne!(tx.txid(), tx.wtxid());
        assert_eq!(stripped.encode().len(), tx.base_size());
    }

    #[test]
    fn decode_rejects_bad_witness_flag() {
        let mut bytes = witness_spend().encode();
        bytes[5] = 0x02;
        assert!(matches!(
            Transaction::decode(&bytes),
            Err(TypeError::MalformedWitness(_))
        ));
    }

    #[test]
    fn decode_rejects_empty_witness_serialization() {
        let mut tx = witness_spend();
        tx.inputs[0].witness.clear();
        let mut bytes = Vec::new();
        tx.encode_base(&mut bytes, true);
        assert!(matches!(
            Transaction::decode(&bytes),
            Err(TypeError::MalformedWitness(_))
        ));
    }
}
