//! Block-event handling: promotion, removal round trips, primary-chain
//! branch switches with reverse-order SQL rollback, and re-reception of
//! canceled-block transactions.

use pretty_assertions::assert_eq;

use sqlchain_test_utils::{
    build_block, genesis_block, keypair, memory_manager, submit_signed, MemoryManager,
};
use sqlchain_txcore::store::{RowIndex, UnapprovedPool};
use sqlchain_types::{pubkey_hash, Block, RefId};

/// Manager with a mined chain: genesis, then a block carrying the CREATE
/// TABLE, then a block carrying one INSERT (row `t.1`).
fn mined_chain(alice: &[u8]) -> (MemoryManager, Block, Block, Block) {
    let mut manager = memory_manager();
    let genesis = genesis_block(&pubkey_hash(alice), 50);
    manager.on_block_added(&genesis, true).unwrap();

    submit_signed(
        &mut manager,
        alice,
        "CREATE TABLE t (id INT PRIMARY KEY AUTO_INCREMENT, v TEXT)",
    )
    .unwrap();
    let selected = manager
        .transactions_for_new_block(10, &genesis.hash())
        .unwrap();
    let block1 = build_block(genesis.hash(), 1, selected);
    manager.on_block_added(&block1, true).unwrap();

    submit_signed(&mut manager, alice, "INSERT INTO t (v) VALUES ('x')").unwrap();
    let selected = manager
        .transactions_for_new_block(10, &block1.hash())
        .unwrap();
    let block2 = build_block(block1.hash(), 2, selected);
    manager.on_block_added(&block2, true).unwrap();

    (manager, genesis, block1, block2)
}

#[test]
fn mined_transactions_are_promoted_out_of_the_pool() {
    let alice = keypair("alice");
    let (manager, _, _, _) = mined_chain(&alice);

    assert_eq!(manager.pool().count().unwrap(), 0);
    // The optimistically-executed state is simply kept.
    assert_eq!(manager.engine().row("t", "1").unwrap().get("v").unwrap(), "x");
    // The row index maps the row to its mining transaction.
    assert!(manager.rows().get(&RefId::row("t", "1")).unwrap().is_some());
    assert!(manager.rows().get(&RefId::table("t")).unwrap().is_some());
}

#[test]
fn block_add_then_remove_restores_pool_and_utxo() {
    let alice = keypair("alice");
    let mut manager = memory_manager();
    let genesis = genesis_block(&pubkey_hash(&alice), 50);
    manager.on_block_added(&genesis, true).unwrap();

    submit_signed(
        &mut manager,
        &alice,
        "CREATE TABLE t (id INT PRIMARY KEY AUTO_INCREMENT, v TEXT)",
    )
    .unwrap();
    let pool_before = manager.pool().clone();
    let utxo_before = manager.utxo().clone();
    let engine_before = manager.engine().clone();

    let selected = manager
        .transactions_for_new_block(10, &genesis.hash())
        .unwrap();
    let block = build_block(genesis.hash(), 1, selected);
    manager.on_block_added(&block, true).unwrap();
    assert_eq!(manager.pool().count().unwrap(), 0);

    // Removal re-admits without rollback: the SQL post-image stays live.
    manager.on_block_removed(&block).unwrap();
    assert_eq!(manager.pool(), &pool_before);
    assert_eq!(manager.utxo(), &utxo_before);
    assert_eq!(manager.engine(), &engine_before);
}

#[test]
fn side_branch_blocks_are_indexed_only() {
    let alice = keypair("alice");
    let (mut manager, _, block1, _) = mined_chain(&alice);

    let engine_before = manager.engine().clone();
    let utxo_before = manager.utxo().clone();
    let side = build_block(block1.hash(), 2, vec![]);
    manager.on_block_added(&side, false).unwrap();

    assert_eq!(manager.engine(), &engine_before);
    assert_eq!(manager.utxo(), &utxo_before);
}

#[test]
fn primary_chain_removal_rolls_back_sql_and_unmaps_the_row() {
    let alice = keypair("alice");
    let (mut manager, _, block1, block2) = mined_chain(&alice);

    // An empty competing block on the other branch.
    let block2b = build_block(block1.hash(), 2, vec![]);
    manager.on_block_added(&block2b, false).unwrap();

    manager.on_block_removed_from_primary_chain(&block2).unwrap();
    manager.on_block_added_to_primary_chain(&block2b).unwrap();

    // The row is gone; its table (created in block1) survives.
    assert!(manager.engine().has_table("t"));
    assert_eq!(manager.engine().row_count("t"), 0);
    // The row index no longer maps the row: the INSERT's base was the
    // table-level CREATE, not a same-row mutation.
    assert_eq!(manager.rows().get(&RefId::row("t", "1")).unwrap(), None);
}

#[test]
fn branch_switch_there_and_back_restores_state() {
    let alice = keypair("alice");
    let (mut manager, _, block1, block2) = mined_chain(&alice);

    let engine_before = manager.engine().clone();
    let utxo_before = manager.utxo().clone();
    let row_head_before = manager.rows().get(&RefId::row("t", "1")).unwrap();

    let block2b = build_block(block1.hash(), 2, vec![]);
    manager.on_block_added(&block2b, false).unwrap();

    // Switch to the other branch…
    manager.on_block_removed_from_primary_chain(&block2).unwrap();
    manager.on_block_added_to_primary_chain(&block2b).unwrap();
    assert_eq!(manager.engine().row_count("t"), 0);

    // …and back.
    manager.on_block_removed_from_primary_chain(&block2b).unwrap();
    manager.on_block_added_to_primary_chain(&block2).unwrap();

    assert_eq!(manager.engine(), &engine_before);
    assert_eq!(manager.utxo(), &utxo_before);
    assert_eq!(
        manager.rows().get(&RefId::row("t", "1")).unwrap(),
        row_head_before
    );
}

#[test]
fn canceled_block_transactions_are_re_received_with_sql_execution() {
    let alice = keypair("alice");
    let (mut manager, _, block1, block2) = mined_chain(&alice);

    let block2b = build_block(block1.hash(), 2, vec![]);
    manager.on_block_added(&block2b, false).unwrap();
    manager.on_block_removed_from_primary_chain(&block2).unwrap();
    manager.on_block_added_to_primary_chain(&block2b).unwrap();
    assert_eq!(manager.engine().row_count("t"), 0);

    manager
        .receive_transactions_from_canceled_blocks(block2.transactions.clone())
        .unwrap();

    // The INSERT is back in the pool and its post-image is live again.
    assert_eq!(manager.pool().count().unwrap(), 1);
    assert_eq!(manager.engine().row("t", "1").unwrap().get("v").unwrap(), "x");
}

#[test]
fn update_rewinds_the_row_head_to_its_base_on_primary_removal() {
    let alice = keypair("alice");
    let (mut manager, _, _, block2) = mined_chain(&alice);

    // Mine an UPDATE of the same row on top.
    submit_signed(&mut manager, &alice, "UPDATE t SET v='y' WHERE id='1'").unwrap();
    let selected = manager
        .transactions_for_new_block(10, &block2.hash())
        .unwrap();
    let block3 = build_block(block2.hash(), 3, selected);
    manager.on_block_added(&block3, true).unwrap();

    let insert_id = block2
        .transactions
        .iter()
        .find(|tx| tx.is_sql())
        .map(sqlchain_types::Transaction::id)
        .expect("block2 carries the INSERT");
    assert_eq!(manager.engine().row("t", "1").unwrap().get("v").unwrap(), "y");

    // Dropping block3 from the primary chain rolls the UPDATE back and the
    // head rewinds to the INSERT (a same-row base).
    manager.on_block_removed_from_primary_chain(&block3).unwrap();
    assert_eq!(manager.engine().row("t", "1").unwrap().get("v").unwrap(), "x");
    assert_eq!(
        manager.rows().get(&RefId::row("t", "1")).unwrap(),
        Some(insert_id)
    );
}
