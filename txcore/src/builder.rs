//! Transaction assembly: input selection over confirmed + pending state,
//! change handling, and sign-data production.

use sqlchain_types::{
    pubkey_hash, CurrencyInput, CurrencyOutput, OutPoint, SqlUpdate, Transaction,
};

use crate::{
    config::Config,
    error::{CoreError, StoreError, VerifyError},
    lineage,
    sql::StatementKind,
    store::{RowIndex, UnapprovedPool, UnspentOutput, UtxoStore},
};

//---------------------------------------------------------------------------------------------------- PreparedTransaction
/// An assembled, not yet signed transaction plus the digest to sign.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedTransaction {
    pub tx: Transaction,
    pub sign_data: [u8; 32],
}

/// The pool-owned UTXO delta of one key: outpoints its pool transactions
/// spend, and pool outputs to it not yet consumed by a later pool
/// transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingDelta {
    pub inputs: Vec<OutPoint>,
    pub outputs: Vec<UnspentOutput>,
}

//---------------------------------------------------------------------------------------------------- Pending state
/// Computes the pool-owned UTXO delta for `pubkey`, in arrival order.
pub fn pending_currency_delta<P>(pool: &P, pubkey: &[u8]) -> Result<PendingDelta, StoreError>
where
    P: UnapprovedPool + ?Sized,
{
    let address = pubkey_hash(pubkey);
    let mut delta = PendingDelta::default();
    pool.for_each(&mut |id, tx| {
        for input in &tx.inputs {
            let outpoint = input.outpoint();
            // A pool spend consumes earlier pending outputs, whoever owns it.
            if let Some(pos) = delta.outputs.iter().position(|o| o.outpoint == outpoint) {
                delta.outputs.remove(pos);
            }
            if input.pubkey == pubkey {
                delta.inputs.push(outpoint);
            }
        }
        for (vout, output) in tx.outputs.iter().enumerate() {
            if output.pubkey_hash == address {
                delta.outputs.push(UnspentOutput {
                    outpoint: OutPoint {
                        tx: *id,
                        vout: vout as u32,
                    },
                    output: output.clone(),
                });
            }
        }
        std::ops::ControlFlow::Continue(())
    })?;
    Ok(delta)
}

//---------------------------------------------------------------------------------------------------- Constructors
/// Builds a currency transfer of `amount` atomic units to `to`.
///
/// Confirmed inputs are gathered first, excluding outpoints already consumed
/// by the sender's pending transactions; when insufficient, the selection
/// extends over pending outputs. Change returns to the sender only when the
/// remainder is at least one smallest unit; below that it is burned.
pub fn new_currency_transaction<U, P>(
    utxo: &U,
    pool: &P,
    config: &Config,
    pubkey: &[u8],
    to: &[u8],
    amount: u64,
    time: u64,
) -> Result<PreparedTransaction, CoreError>
where
    U: UtxoStore + ?Sized,
    P: UnapprovedPool + ?Sized,
{
    let (inputs, prev_outputs, outputs) = currency_parts(utxo, pool, config, pubkey, to, amount)?;
    finalize(Transaction {
        time,
        inputs,
        outputs,
        sql: None,
        signer: vec![],
        signature: vec![],
    }, prev_outputs)
}

/// Builds a SQL transaction, optionally carrying a currency transfer.
///
/// The currency part (if a payment is attached) is assembled first, then
/// the SQL command is attached with its `prev_sql_tx` base resolved; the
/// sign data covers the combined form.
#[allow(clippy::too_many_arguments)]
pub fn new_sql_transaction<U, P, R>(
    utxo: &U,
    pool: &P,
    rows: &R,
    config: &Config,
    pubkey: &[u8],
    update: SqlUpdate,
    kind: StatementKind,
    payment: Option<(&[u8], u64)>,
    time: u64,
) -> Result<PreparedTransaction, CoreError>
where
    U: UtxoStore + ?Sized,
    P: UnapprovedPool + ?Sized,
    R: RowIndex + ?Sized,
{
    let (inputs, prev_outputs, outputs) = match payment {
        Some((to, amount)) if amount > 0 => {
            currency_parts(utxo, pool, config, pubkey, to, amount)?
        }
        _ => (vec![], vec![], vec![]),
    };

    let prev_sql_tx = lineage::resolve_base_transaction(pool, rows, kind, &update.reference_id)?;

    finalize(Transaction {
        time,
        inputs,
        outputs,
        sql: Some(SqlUpdate {
            prev_sql_tx,
            ..update
        }),
        signer: vec![],
        signature: vec![],
    }, prev_outputs)
}

/// Builds a coinbase transaction paying `reward` to `to`.
pub fn new_coinbase_transaction(to: &[u8], reward: u64, time: u64) -> Transaction {
    Transaction {
        time,
        inputs: vec![],
        outputs: vec![CurrencyOutput {
            amount: reward,
            pubkey_hash: to.to_vec(),
        }],
        sql: None,
        signer: vec![],
        signature: vec![],
    }
}

/// Attaches a signature, finalizing the transaction: every input and the
/// transaction level carry the `(signature, pubkey)` pair.
pub fn attach_signature(tx: &mut Transaction, pubkey: &[u8], signature: &[u8]) {
    for input in &mut tx.inputs {
        input.pubkey = pubkey.to_vec();
        input.signature = signature.to_vec();
    }
    tx.signer = pubkey.to_vec();
    tx.signature = signature.to_vec();
}

//---------------------------------------------------------------------------------------------------- Internals
type CurrencyParts = (
    Vec<CurrencyInput>,
    Vec<(OutPoint, CurrencyOutput)>,
    Vec<CurrencyOutput>,
);

/// Input selection and output construction per the pending-aware rules.
fn currency_parts<U, P>(
    utxo: &U,
    pool: &P,
    config: &Config,
    pubkey: &[u8],
    to: &[u8],
    amount: u64,
) -> Result<CurrencyParts, CoreError>
where
    U: UtxoStore + ?Sized,
    P: UnapprovedPool + ?Sized,
{
    let from = pubkey_hash(pubkey);
    let pending = pending_currency_delta(pool, pubkey)?;

    let mut selected = utxo.new_transaction_inputs(&from, amount, &pending.inputs)?;
    let mut total: u64 = selected.iter().map(|u| u.output.amount).sum();
    if total < amount {
        selected = utxo.extend_new_transaction_inputs(selected, amount, &pending.outputs)?;
        total = selected.iter().map(|u| u.output.amount).sum();
    }
    if total < amount {
        return Err(CoreError::InsufficientFunds {
            required: amount,
            available: total,
        });
    }

    let inputs = selected
        .iter()
        .map(|u| CurrencyInput {
            prev_tx: u.outpoint.tx,
            vout: u.outpoint.vout,
            signature: vec![],
            pubkey: vec![],
        })
        .collect();
    let prev_outputs = selected
        .into_iter()
        .map(|u| (u.outpoint, u.output))
        .collect();

    let mut outputs = vec![CurrencyOutput {
        amount,
        pubkey_hash: to.to_vec(),
    }];
    let change = total - amount;
    if change >= config.smallest_unit {
        outputs.push(CurrencyOutput {
            amount: change,
            pubkey_hash: from.to_vec(),
        });
    }

    Ok((inputs, prev_outputs, outputs))
}

fn finalize(
    tx: Transaction,
    prev_outputs: Vec<(OutPoint, CurrencyOutput)>,
) -> Result<PreparedTransaction, CoreError> {
    let sign_data = tx
        .sign_data(&prev_outputs)
        .ok_or(CoreError::VerificationFailed(VerifyError::MissingSignData))?;
    Ok(PreparedTransaction { tx, sign_data })
}
