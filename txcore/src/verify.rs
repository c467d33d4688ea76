//! Transaction verification.
//!
//! Two strengths: [`verify_quick`] gates mempool admission against the
//! confirmed UTXO set with fallback to pool-local inputs, [`verify_deep`]
//! walks the canonical chain under a tip during block construction.
//! Signature checking is shared and delegated to a [`SignatureBackend`];
//! this module is only responsible for reconstructing the correct
//! previous-output pre-image.

use indexmap::IndexMap;

use sqlchain_types::{pubkey_hash, BlockHash, CurrencyOutput, OutPoint, Transaction, TxId};

use crate::{
    error::VerifyError,
    store::{BlockIndex, UnapprovedPool, UtxoStore},
};

/// The external signature primitive.
pub trait SignatureBackend {
    /// Whether `signature` by `pubkey` verifies over `message`.
    fn verify(&self, pubkey: &[u8], message: &[u8], signature: &[u8]) -> bool;
}

//---------------------------------------------------------------------------------------------------- Quick
/// Mempool-admission verification.
///
/// Inputs not found unspent in the UTXO store must be prepared by an
/// earlier pool transaction whose output is still unspent within the pool
/// chain.
pub fn verify_quick<U, P, S>(
    tx: &Transaction,
    utxo: &U,
    pool: &P,
    sigs: &S,
) -> Result<(), VerifyError>
where
    U: UtxoStore + ?Sized,
    P: UnapprovedPool + ?Sized,
    S: SignatureBackend + ?Sized,
{
    if tx.is_coinbase() {
        return Ok(());
    }
    let tx_id = tx.id();

    let missing = utxo.outputs_not_spent(&tx.inputs)?;
    let mut prev_outputs = Vec::with_capacity(tx.inputs.len());
    for (i, input) in tx.inputs.iter().enumerate() {
        let outpoint = input.outpoint();
        let not_found = || VerifyError::InputNotFound {
            prev_tx: input.prev_tx,
            vout: input.vout,
        };
        let prev = if missing.contains(&i) {
            if !pool.output_unspent_in_pool(&outpoint, &tx_id)? {
                return Err(not_found());
            }
            pool.pool_output(&outpoint)?.ok_or_else(not_found)?
        } else {
            utxo.get_unspent(&outpoint)?.ok_or_else(not_found)?
        };
        prev_outputs.push((outpoint, prev));
    }

    check_signatures(tx, &prev_outputs, sigs)
}

//---------------------------------------------------------------------------------------------------- Deep
/// Block-construction verification against the branch ending at `tip`.
///
/// Inputs with no containing block under `tip` must be satisfied by a
/// predecessor in the `prevtxs` window (the in-progress batch when building
/// a block from interdependent pool transactions). Resolved inputs must not
/// be spent under `tip`.
pub fn verify_deep<B, S>(
    tx: &Transaction,
    tip: &BlockHash,
    prevtxs: &IndexMap<TxId, Transaction>,
    blocks: &B,
    sigs: &S,
) -> Result<(), VerifyError>
where
    B: BlockIndex + ?Sized,
    S: SignatureBackend + ?Sized,
{
    if tx.is_coinbase() {
        return Ok(());
    }

    let mut prev_outputs = Vec::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        let outpoint = input.outpoint();
        let not_found = || VerifyError::InputNotFound {
            prev_tx: input.prev_tx,
            vout: input.vout,
        };

        let prev = match blocks.transaction_under_tip(&input.prev_tx, tip)? {
            Some(prev_tx) => {
                if blocks.spent_outputs(&input.prev_tx, tip)?.contains(&input.vout) {
                    return Err(VerifyError::InputAlreadySpent {
                        prev_tx: input.prev_tx,
                        vout: input.vout,
                    });
                }
                prev_tx
                    .outputs
                    .get(input.vout as usize)
                    .cloned()
                    .ok_or_else(not_found)?
            }
            None => prevtxs
                .get(&input.prev_tx)
                .and_then(|prev_tx| prev_tx.outputs.get(input.vout as usize))
                .cloned()
                .ok_or_else(not_found)?,
        };
        prev_outputs.push((outpoint, prev));
    }

    check_signatures(tx, &prev_outputs, sigs)
}

//---------------------------------------------------------------------------------------------------- Signatures
/// Verifies every signature over the transaction's sign data.
///
/// Currency inputs each carry a `(signature, pubkey)` pair whose pubkey must
/// hash to the referenced output's address; input-less SQL transactions are
/// authenticated by the transaction-level signer.
fn check_signatures<S>(
    tx: &Transaction,
    prev_outputs: &[(OutPoint, CurrencyOutput)],
    sigs: &S,
) -> Result<(), VerifyError>
where
    S: SignatureBackend + ?Sized,
{
    let sign_data = tx
        .sign_data(prev_outputs)
        .ok_or(VerifyError::MissingSignData)?;

    if tx.inputs.is_empty() {
        if tx.signer.is_empty() || !sigs.verify(&tx.signer, &sign_data, &tx.signature) {
            return Err(VerifyError::BadSignature);
        }
        return Ok(());
    }

    for input in &tx.inputs {
        let outpoint = input.outpoint();
        let (_, prev) = prev_outputs
            .iter()
            .find(|(op, _)| *op == outpoint)
            .ok_or(VerifyError::MissingSignData)?;
        if pubkey_hash(&input.pubkey).as_slice() != prev.pubkey_hash.as_slice() {
            return Err(VerifyError::PubkeyMismatch);
        }
        if !sigs.verify(&input.pubkey, &sign_data, &input.signature) {
            return Err(VerifyError::BadSignature);
        }
    }
    Ok(())
}
