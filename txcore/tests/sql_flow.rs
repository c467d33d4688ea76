//! End-to-end SQL submission flows: canonical rewriting, rollback
//! synthesis, lineage links, cancellation cascades, and the signed-error
//! protocol.

use pretty_assertions::assert_eq;

use sqlchain_test_utils::{keypair, memory_manager, submit_signed, MemoryManager, MockSqlEngine};
use sqlchain_txcore::{
    signal,
    sql::ParseError,
    store::UnapprovedPool,
    CoreError, ProcessError, QueryOutcome,
};
use sqlchain_types::{SqlUpdate, TxId};

fn pool_sql(manager: &MemoryManager, tx_id: &TxId) -> SqlUpdate {
    manager
        .pool()
        .get_if_exists(tx_id)
        .unwrap()
        .expect("transaction should be in the pool")
        .sql
        .expect("transaction should carry SQL")
}

/// Manager with `t(id INT PRIMARY KEY AUTO_INCREMENT, v TEXT)` created by
/// `alice`, returning the CREATE transaction's ID.
fn manager_with_table(alice: &[u8]) -> (MemoryManager, TxId) {
    let mut manager = memory_manager();
    let create = submit_signed(
        &mut manager,
        alice,
        "CREATE TABLE t (id INT PRIMARY KEY AUTO_INCREMENT, v TEXT)",
    )
    .unwrap();
    assert!(manager.engine().has_table("t"));
    (manager, create)
}

#[test]
fn insert_is_rewritten_with_predicted_key() {
    let alice = keypair("alice");
    let (mut manager, create) = manager_with_table(&alice);

    let insert = submit_signed(&mut manager, &alice, "INSERT INTO t (v) VALUES ('x')").unwrap();

    let sql = pool_sql(&manager, &insert);
    assert_eq!(sql.canonical_query, "INSERT INTO t (id,v) VALUES ('1','x')");
    assert_eq!(sql.reference_id.to_string(), "t.1");
    assert_eq!(sql.rollback_query, "DELETE FROM t WHERE id='1'");
    // An INSERT right after CREATE TABLE chains onto the table's creation.
    assert_eq!(sql.prev_sql_tx, Some(create));

    let row = manager.engine().row("t", "1").unwrap().clone();
    assert_eq!(row.get("id").unwrap(), "1");
    assert_eq!(row.get("v").unwrap(), "x");
}

#[test]
fn update_rolls_back_to_pre_image_and_links_its_base() {
    let alice = keypair("alice");
    let (mut manager, _) = manager_with_table(&alice);
    let insert = submit_signed(&mut manager, &alice, "INSERT INTO t (v) VALUES ('x')").unwrap();

    let update = submit_signed(&mut manager, &alice, "UPDATE t SET v='y' WHERE id='1'").unwrap();

    let sql = pool_sql(&manager, &update);
    assert_eq!(sql.canonical_query, "UPDATE t SET v='y' WHERE id='1'");
    assert_eq!(sql.rollback_query, "UPDATE t SET v='x' WHERE id='1'");
    assert_eq!(sql.prev_sql_tx, Some(insert));
    assert_eq!(manager.engine().row("t", "1").unwrap().get("v").unwrap(), "y");
}

#[test]
fn delete_rolls_back_to_full_row_insert() {
    let alice = keypair("alice");
    let (mut manager, _) = manager_with_table(&alice);
    let insert = submit_signed(&mut manager, &alice, "INSERT INTO t (v) VALUES ('x')").unwrap();

    let delete = submit_signed(&mut manager, &alice, "DELETE FROM t WHERE id='1'").unwrap();

    let sql = pool_sql(&manager, &delete);
    assert_eq!(sql.rollback_query, "INSERT INTO t (id,v) VALUES ('1','x')");
    assert_eq!(sql.prev_sql_tx, Some(insert));
    assert_eq!(manager.engine().row_count("t"), 0);
}

#[test]
fn primary_key_mutation_is_forbidden() {
    let alice = keypair("alice");
    let (mut manager, _) = manager_with_table(&alice);
    submit_signed(&mut manager, &alice, "INSERT INTO t (v) VALUES ('x')").unwrap();

    let err = submit_signed(&mut manager, &alice, "UPDATE t SET id='2' WHERE id='1'").unwrap_err();
    assert_eq!(
        err,
        CoreError::Process(ProcessError::PrimaryKeyMutationForbidden)
    );
}

#[test]
fn where_must_be_on_the_primary_key() {
    let alice = keypair("alice");
    let (mut manager, _) = manager_with_table(&alice);
    submit_signed(&mut manager, &alice, "INSERT INTO t (v) VALUES ('x')").unwrap();

    let err = submit_signed(&mut manager, &alice, "DELETE FROM t WHERE v='x'").unwrap_err();
    assert_eq!(
        err,
        CoreError::Process(ProcessError::NoPrimaryKeyInCondition {
            table: "t".into(),
            column: "id".into(),
        })
    );
}

#[test]
fn missing_pubkey_is_signaled_with_the_exact_wire_string() {
    let alice = keypair("alice");
    let (mut manager, _) = manager_with_table(&alice);

    let err = manager
        .execute_query("INSERT INTO t (v) VALUES ('x')")
        .unwrap_err();
    assert_eq!(err, CoreError::PubKeyRequired);
    assert_eq!(
        signal::format_special_error_message(&err),
        Some((2, "Error(2): Public Key required".to_string()))
    );
}

#[test]
fn signature_request_carries_the_transaction_to_countersign() {
    let alice = keypair("alice");
    let (mut manager, _) = manager_with_table(&alice);

    let sql = format!(
        "/*PUBKEY:{}*/ INSERT INTO t (v) VALUES ('x')",
        hex::encode(&alice)
    );
    let err = manager.execute_query(&sql).unwrap_err();
    let CoreError::SignatureRequired { .. } = &err else {
        panic!("expected a signature request, got {err:?}");
    };

    let (code, message) = signal::format_special_error_message(&err).unwrap();
    assert_eq!(code, 3);
    let (tx_bytes, _sign_data) = signal::parse_signature_request(&message).unwrap();

    // The wire bytes decode back into the unsigned transaction, canonical
    // form included.
    let tx = sqlchain_types::Transaction::from_bytes(&tx_bytes).unwrap();
    assert_eq!(
        tx.sql.unwrap().canonical_query,
        "INSERT INTO t (id,v) VALUES ('1','x')"
    );
    // Nothing was executed or admitted.
    assert_eq!(manager.engine().row_count("t"), 0);
    assert_eq!(manager.pool().count().unwrap(), 1); // the CREATE only
}

#[test]
fn non_mutations_pass_through_without_a_transaction() {
    let alice = keypair("alice");
    let (mut manager, _) = manager_with_table(&alice);

    let outcome = manager.execute_query("SELECT * FROM t").unwrap();
    assert_eq!(outcome, QueryOutcome::ReadOnly);
    assert_eq!(manager.pool().count().unwrap(), 1);
}

#[test]
fn drop_table_is_rejected_as_non_invertible() {
    let alice = keypair("alice");
    let (mut manager, _) = manager_with_table(&alice);

    let err = submit_signed(&mut manager, &alice, "DROP TABLE t").unwrap_err();
    assert_eq!(err, CoreError::Process(ProcessError::NotInvertible));
    assert!(manager.engine().has_table("t"));
}

#[test]
fn update_of_a_missing_row_is_rejected_before_execution() {
    let alice = keypair("alice");
    let (mut manager, _) = manager_with_table(&alice);

    let err = submit_signed(&mut manager, &alice, "UPDATE t SET v='q' WHERE id='9'").unwrap_err();
    assert_eq!(
        err,
        CoreError::Process(ProcessError::RowNotFound {
            table: "t".into(),
            key: "9".into(),
        })
    );
}

#[test]
fn insert_without_auto_increment_or_key_is_rejected() {
    let alice = keypair("alice");
    let mut manager = memory_manager();
    submit_signed(
        &mut manager,
        &alice,
        "CREATE TABLE u (k INT PRIMARY KEY, w TEXT)",
    )
    .unwrap();

    // Explicit key works.
    submit_signed(&mut manager, &alice, "INSERT INTO u (k,w) VALUES ('7','a')").unwrap();
    assert!(manager.engine().row("u", "7").is_some());

    // A missing key cannot be predicted without auto-increment.
    let err = submit_signed(&mut manager, &alice, "INSERT INTO u (w) VALUES ('b')").unwrap_err();
    assert_eq!(
        err,
        CoreError::Process(ProcessError::NoAutoIncrement("u".into()))
    );
}

#[test]
fn tables_without_a_primary_key_reject_dml() {
    let alice = keypair("alice");
    let mut manager = memory_manager();
    submit_signed(&mut manager, &alice, "CREATE TABLE logs (msg TEXT, at INT)").unwrap();

    let err =
        submit_signed(&mut manager, &alice, "INSERT INTO logs (msg) VALUES ('hi')").unwrap_err();
    assert_eq!(
        err,
        CoreError::Process(ProcessError::NoPrimaryKey("logs".into()))
    );
}

#[test]
fn explain_failures_become_syntax_errors() {
    let alice = keypair("alice");
    let mut manager = memory_manager();

    let err =
        submit_signed(&mut manager, &alice, "INSERT INTO nope (v) VALUES ('x')").unwrap_err();
    assert!(matches!(
        err,
        CoreError::Process(ProcessError::Syntax(_))
    ));

    let err = submit_signed(&mut manager, &alice, "INSERT INTO t (a,b) VALUES ('1')").unwrap_err();
    assert_eq!(
        err,
        CoreError::Process(ProcessError::Parse(ParseError::ColumnValueMismatch))
    );
}

#[test]
fn cancel_rolls_back_and_cascades_to_dependents() {
    let alice = keypair("alice");
    let (mut manager, create) = manager_with_table(&alice);
    let insert = submit_signed(&mut manager, &alice, "INSERT INTO t (v) VALUES ('x')").unwrap();
    let update = submit_signed(&mut manager, &alice, "UPDATE t SET v='y' WHERE id='1'").unwrap();

    // Canceling the INSERT cancels the dependent UPDATE first (LIFO), so
    // both rollbacks apply cleanly.
    manager.cancel_transaction(&insert).unwrap();

    assert!(manager.pool().get_if_exists(&update).unwrap().is_none());
    assert!(manager.pool().get_if_exists(&insert).unwrap().is_none());
    assert!(manager.pool().get_if_exists(&create).unwrap().is_some());
    assert!(manager.engine().has_table("t"));
    assert_eq!(manager.engine().row_count("t"), 0);
}

#[test]
fn cancel_everything_restores_a_pristine_engine() {
    let alice = keypair("alice");
    let (mut manager, create) = manager_with_table(&alice);
    submit_signed(&mut manager, &alice, "INSERT INTO t (v) VALUES ('x')").unwrap();
    submit_signed(&mut manager, &alice, "UPDATE t SET v='y' WHERE id='1'").unwrap();

    manager.cancel_transaction(&create).unwrap();

    assert_eq!(manager.pool().count().unwrap(), 0);
    assert_eq!(manager.engine(), &MockSqlEngine::new());
}

#[test]
fn cancel_of_an_unknown_transaction_errors() {
    let mut manager = memory_manager();
    assert_eq!(
        manager.cancel_transaction(&[7; 32]).unwrap_err(),
        CoreError::NotInPool([7; 32])
    );
}

#[test]
fn reinsert_after_delete_chains_onto_the_delete() {
    let alice = keypair("alice");
    let (mut manager, _) = manager_with_table(&alice);
    submit_signed(&mut manager, &alice, "INSERT INTO t (v) VALUES ('x')").unwrap();
    let delete = submit_signed(&mut manager, &alice, "DELETE FROM t WHERE id='1'").unwrap();

    let reinsert =
        submit_signed(&mut manager, &alice, "INSERT INTO t (id,v) VALUES ('1','z')").unwrap();
    assert_eq!(pool_sql(&manager, &reinsert).prev_sql_tx, Some(delete));
}
