//! Transaction types.
//!
//! A [`Transaction`] optionally carries a currency part (inputs/outputs over
//! the UTXO set) and/or a [`SqlUpdate`] recording a database mutation
//! together with its pre-computed rollback statement.

//---------------------------------------------------------------------------------------------------- Import
use std::fmt;

use serde::{Deserialize, Serialize};

//---------------------------------------------------------------------------------------------------- Aliases
/// A transaction's content hash.
pub type TxId = [u8; 32];

/// BLAKE3 hash of a raw public key, the address form used by outputs.
pub fn pubkey_hash(pubkey: &[u8]) -> [u8; 32] {
    blake3::hash(pubkey).into()
}

//---------------------------------------------------------------------------------------------------- OutPoint
/// A reference to a single output of a previous transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx: TxId,
    pub vout: u32,
}

//---------------------------------------------------------------------------------------------------- Currency
/// A currency input spending one output of a previous transaction.
///
/// The `(signature, pubkey)` pair is filled when the owner signs; the
/// referenced output's `pubkey_hash` must equal [`pubkey_hash`] of `pubkey`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyInput {
    pub prev_tx: TxId,
    pub vout: u32,
    pub signature: Vec<u8>,
    pub pubkey: Vec<u8>,
}

impl CurrencyInput {
    /// The output this input spends.
    pub const fn outpoint(&self) -> OutPoint {
        OutPoint {
            tx: self.prev_tx,
            vout: self.vout,
        }
    }
}

/// A currency output: an amount in atomic units locked to an address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyOutput {
    pub amount: u64,
    pub pubkey_hash: Vec<u8>,
}

//---------------------------------------------------------------------------------------------------- RefId
/// The stable identity of a database row (or a whole table) across its
/// lifetime: `<table>.<primary_key_value>`, or bare `<table>` for
/// table-level identity (CREATE TABLE).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefId {
    table: String,
    row: Option<String>,
}

impl RefId {
    /// Row-level identity: `table.key`.
    pub fn row(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            row: Some(key.into()),
        }
    }

    /// Table-level identity: bare `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            row: None,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn row_key(&self) -> Option<&str> {
        self.row.as_deref()
    }

    pub const fn is_table_level(&self) -> bool {
        self.row.is_none()
    }

    /// The table-level identity of this reference, e.g. `t.1` -> `t`.
    pub fn table_level(&self) -> Self {
        Self {
            table: self.table.clone(),
            row: None,
        }
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.row {
            Some(key) => write!(f, "{}.{}", self.table, key),
            None => f.write_str(&self.table),
        }
    }
}

//---------------------------------------------------------------------------------------------------- SqlUpdate
/// The SQL command carried by a transaction.
///
/// `rollback_query`, applied to the post-image state, restores the
/// pre-image; it is synthesized from the pre-image *before* the canonical
/// query is executed. `prev_sql_tx` links to the last transaction that
/// mutated the same [`RefId`], forming a per-row hash chain; it is `None`
/// for row creation and for statements that do not require a base.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlUpdate {
    pub canonical_query: String,
    pub reference_id: RefId,
    pub rollback_query: String,
    pub prev_sql_tx: Option<TxId>,
}

//---------------------------------------------------------------------------------------------------- Transaction
/// A sqlchain transaction.
///
/// Immutable once its signature is attached; identified by [`Transaction::id`],
/// the BLAKE3 hash of its canonical bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Creation time, seconds since the UNIX epoch.
    pub time: u64,
    pub inputs: Vec<CurrencyInput>,
    pub outputs: Vec<CurrencyOutput>,
    pub sql: Option<SqlUpdate>,
    /// Public key of the submitter, authenticating input-less SQL
    /// transactions. Currency inputs carry their own `(signature, pubkey)`.
    pub signer: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Transaction {
    /// The transaction's content hash.
    pub fn id(&self) -> TxId {
        blake3::hash(&self.to_bytes()).into()
    }

    /// Canonical bytes, the form hashed, signed over and persisted.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("serializing a transaction to JSON")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// A coinbase transaction creates currency: no inputs, no SQL command.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty() && self.sql.is_none() && !self.outputs.is_empty()
    }

    pub const fn is_sql(&self) -> bool {
        self.sql.is_some()
    }

    pub fn has_currency_part(&self) -> bool {
        !self.inputs.is_empty() || !self.outputs.is_empty()
    }

    /// The data a client must sign.
    ///
    /// The pre-image covers the creation time, every input together with the
    /// output it spends, every output, and the SQL command; input signatures
    /// and pubkeys are excluded so the digest is stable across signing.
    ///
    /// `prev_outputs` must map every input's [`OutPoint`] to the output it
    /// spends; missing entries are an error on the caller's side and yield
    /// `None`.
    pub fn sign_data(&self, prev_outputs: &[(OutPoint, CurrencyOutput)]) -> Option<[u8; 32]> {
        let inputs = self
            .inputs
            .iter()
            .map(|input| {
                let outpoint = input.outpoint();
                let (_, prev_out) = prev_outputs.iter().find(|(op, _)| *op == outpoint)?;
                Some(InputPreimage {
                    prev_tx: input.prev_tx,
                    vout: input.vout,
                    prev_out,
                })
            })
            .collect::<Option<Vec<_>>>()?;

        let preimage = SignPreimage {
            time: self.time,
            inputs,
            outputs: &self.outputs,
            sql: self.sql.as_ref(),
        };

        let bytes = serde_json::to_vec(&preimage).expect("serializing a sign pre-image to JSON");
        Some(blake3::hash(&bytes).into())
    }
}

/// The canonical hash pre-image over `(inputs, outputs, previous outputs)`.
#[derive(Serialize)]
struct SignPreimage<'a> {
    time: u64,
    inputs: Vec<InputPreimage<'a>>,
    outputs: &'a [CurrencyOutput],
    sql: Option<&'a SqlUpdate>,
}

#[derive(Serialize)]
struct InputPreimage<'a> {
    prev_tx: TxId,
    vout: u32,
    prev_out: &'a CurrencyOutput,
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sql_tx() -> Transaction {
        Transaction {
            time: 1_700_000_000,
            inputs: vec![],
            outputs: vec![],
            sql: Some(SqlUpdate {
                canonical_query: "INSERT INTO t (id,v) VALUES ('1','x')".into(),
                reference_id: RefId::row("t", "1"),
                rollback_query: "DELETE FROM t WHERE id='1'".into(),
                prev_sql_tx: None,
            }),
            signer: vec![1, 2, 3],
            signature: vec![],
        }
    }

    #[test]
    fn serde_round_trip_preserves_id() {
        let tx = sql_tx();
        let bytes = tx.to_bytes();
        let back = Transaction::from_bytes(&bytes).unwrap();
        assert_eq!(tx, back);
        assert_eq!(tx.id(), back.id());
    }

    #[test]
    fn id_changes_with_signature() {
        let mut tx = sql_tx();
        let unsigned = tx.id();
        tx.signature = vec![0xaa; 16];
        assert_ne!(unsigned, tx.id());
    }

    #[test]
    fn sign_data_ignores_input_signatures() {
        let prev_out = CurrencyOutput {
            amount: 10,
            pubkey_hash: pubkey_hash(b"alice").to_vec(),
        };
        let mut tx = Transaction {
            time: 7,
            inputs: vec![CurrencyInput {
                prev_tx: [9; 32],
                vout: 0,
                signature: vec![],
                pubkey: vec![],
            }],
            outputs: vec![CurrencyOutput {
                amount: 10,
                pubkey_hash: pubkey_hash(b"bob").to_vec(),
            }],
            sql: None,
            signer: vec![],
            signature: vec![],
        };
        let prevs = vec![(tx.inputs[0].outpoint(), prev_out)];

        let before = tx.sign_data(&prevs).unwrap();
        tx.inputs[0].signature = vec![0xff; 8];
        tx.inputs[0].pubkey = b"alice".to_vec();
        assert_eq!(before, tx.sign_data(&prevs).unwrap());
    }

    #[test]
    fn sign_data_requires_all_previous_outputs() {
        let tx = Transaction {
            time: 7,
            inputs: vec![CurrencyInput {
                prev_tx: [9; 32],
                vout: 0,
                signature: vec![],
                pubkey: vec![],
            }],
            outputs: vec![],
            sql: None,
            signer: vec![],
            signature: vec![],
        };
        assert_eq!(tx.sign_data(&[]), None);
    }

    #[test]
    fn ref_id_display() {
        assert_eq!(RefId::row("t", "1").to_string(), "t.1");
        assert_eq!(RefId::table("t").to_string(), "t");
        assert_eq!(RefId::row("t", "1").table_level(), RefId::table("t"));
    }

    #[test]
    fn coinbase_classification() {
        let coinbase = Transaction {
            time: 0,
            inputs: vec![],
            outputs: vec![CurrencyOutput {
                amount: 50,
                pubkey_hash: vec![1],
            }],
            sql: None,
            signer: vec![],
            signature: vec![],
        };
        assert!(coinbase.is_coinbase());
        assert!(!sql_tx().is_coinbase());
    }
}
