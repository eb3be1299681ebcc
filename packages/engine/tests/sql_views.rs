mod support;

use lix_state::errors::ErrorCode;
use lix_state::sql::StatementKind;
use lix_state::{LixError, StateFilter, Value};
use serde_json::json;

use support::simulation_test::SimulationSession;

fn register_line_schema(session: &mut SimulationSession) {
    session
        .execute(
            "INSERT INTO stored_schema (value) VALUES (?)",
            &[Value::Text(support::line_schema().to_string())],
        )
        .expect("register schema");
}

simulation_test!(entity_view_round_trip, |sim| {
    let engine = sim.boot_simulated_engine(None).expect("boot");
    let mut session = engine.session().expect("session");
    register_line_schema(&mut session);

    let inserted = session
        .execute(
            "INSERT INTO test_line (id, value) VALUES ('l0', 'zero'), ('l1', 'one'), ($1, $2)",
            &[Value::text("l2"), Value::text("two")],
        )
        .expect("insert");
    assert_eq!(inserted.rows_affected, 3);

    let rows = session
        .execute(
            "SELECT id, value FROM test_line WHERE id <> 'l1' ORDER BY id DESC",
            &[],
        )
        .expect("select");
    assert_eq!(rows.columns, vec!["id".to_string(), "value".to_string()]);
    assert_eq!(
        rows.rows,
        vec![
            vec![Value::text("l2"), Value::text("two")],
            vec![Value::text("l0"), Value::text("zero")],
        ]
    );

    let updated = session
        .execute("UPDATE test_line SET value = 'uno' WHERE id = ?", &[Value::text("l1")])
        .expect("update");
    assert_eq!(updated.rows_affected, 1);
    let state = session
        .resolve_state(&StateFilter::default().with_entity("l1"))
        .expect("state");
    assert_eq!(state[0].snapshot_content, Some(json!({ "id": "l1", "value": "uno" })));

    let deleted = session
        .execute("DELETE FROM test_line WHERE value LIKE 't%'", &[])
        .expect("delete");
    assert_eq!(deleted.rows_affected, 1);

    let remaining = session
        .execute(
            "SELECT lixcol_entity_id, lixcol_file_id FROM test_line ORDER BY lixcol_entity_id",
            &[],
        )
        .expect("remaining");
    assert_eq!(
        remaining.rows,
        vec![
            vec![Value::text("l0"), Value::text("lix")],
            vec![Value::text("l1"), Value::text("lix")],
        ]
    );
    sim.assert_deterministic(remaining.rows);
});

simulation_test!(updating_a_primary_key_moves_the_entity, |sim| {
    let engine = sim.boot_simulated_engine(None).expect("boot");
    let mut session = engine.session().expect("session");
    register_line_schema(&mut session);
    session
        .execute("INSERT INTO test_line (id, value) VALUES ('old', 'v')", &[])
        .expect("insert");

    session
        .execute("UPDATE test_line SET id = 'new' WHERE id = 'old'", &[])
        .expect("rename");

    let ids = session
        .execute("SELECT lixcol_entity_id FROM test_line", &[])
        .expect("ids");
    assert_eq!(ids.rows, vec![vec![Value::text("new")]]);
});

simulation_test!(state_view_writes_and_json_extract, |sim| {
    let engine = sim.boot_simulated_engine(None).expect("boot");
    let mut session = engine.session().expect("session");
    register_line_schema(&mut session);

    session
        .execute(
            "INSERT INTO state (entity_id, schema_key, file_id, snapshot_content) \
             VALUES ('a', 'test_line', 'doc.txt', '{\"id\":\"a\",\"value\":\"alpha\"}')",
            &[],
        )
        .expect("insert");

    let rows = session
        .execute(
            "SELECT entity_id, json_extract(snapshot_content, '$.value') AS value, plugin_key \
             FROM state WHERE schema_key = 'test_line'",
            &[],
        )
        .expect("select");
    assert_eq!(
        rows.rows,
        vec![vec![
            Value::text("a"),
            Value::text("alpha"),
            Value::text("lix_own_entity"),
        ]]
    );

    session
        .execute(
            "UPDATE state SET snapshot_content = NULL WHERE entity_id = 'a' AND schema_key = 'test_line'",
            &[],
        )
        .expect("null snapshot deletes");
    let count = session
        .execute(
            "SELECT COUNT(*) AS n FROM state WHERE schema_key = 'test_line'",
            &[],
        )
        .expect("count");
    assert_eq!(count.get(0, "n"), Some(&Value::Integer(0)));

    let error = session
        .execute(
            "INSERT INTO state (entity_id, schema_key, file_id, version_id, snapshot_content) \
             VALUES ('b', 'test_line', 'doc.txt', 'global', '{\"id\":\"b\",\"value\":\"b\"}')",
            &[],
        )
        .expect_err("state writes go to the active version");
    assert!(error.is(ErrorCode::InvalidParameter));

    session
        .execute(
            "INSERT INTO state_by_version (entity_id, schema_key, file_id, version_id, snapshot_content) \
             VALUES ('b', 'test_line', 'doc.txt', 'global', '{\"id\":\"b\",\"value\":\"b\"}')",
            &[],
        )
        .expect("write into global");
    let inherited = session
        .execute(
            "SELECT inherited_from_version_id FROM state WHERE entity_id = 'b'",
            &[],
        )
        .expect("inherited");
    assert_eq!(inherited.rows, vec![vec![Value::text("global")]]);
});

simulation_test!(invalid_snapshots_are_rejected_and_the_script_rolls_back, |sim| {
    let engine = sim.boot_simulated_engine(None).expect("boot");
    let mut session = engine.session().expect("session");
    register_line_schema(&mut session);

    let error = session
        .execute(
            "INSERT INTO test_line (id, value) VALUES ('ok', 'fine'); \
             INSERT INTO test_line (id, value) VALUES ('bad', 42)",
            &[],
        )
        .expect_err("second statement violates the schema");
    assert!(error.is(ErrorCode::SnapshotValidation));

    let count = session
        .execute("SELECT COUNT(*) FROM test_line", &[])
        .expect("count");
    assert_eq!(count.rows, vec![vec![Value::Integer(0)]]);
});

simulation_test!(read_only_and_unsupported_statements_fail, |sim| {
    let engine = sim.boot_simulated_engine(None).expect("boot");
    let mut session = engine.session().expect("session");

    let error = session
        .execute("DELETE FROM commit WHERE id = 'x'", &[])
        .expect_err("commit is read-only");
    assert!(error.is(ErrorCode::ReadOnlyViewWriteDenied));

    let error = session
        .execute("CREATE TABLE t (id TEXT)", &[])
        .expect_err("ddl");
    assert!(error.is(ErrorCode::UnsupportedStatement));

    let error = session
        .execute("SELECT * FROM no_such_view", &[])
        .expect_err("unknown view");
    assert!(error.is(ErrorCode::TableNotFound));

    let error = session
        .execute("SELECT * FROM version WHERE id = ?2", &[Value::text("x")])
        .expect_err("missing parameter");
    assert!(error.is(ErrorCode::InvalidParameter));
});

simulation_test!(builtin_views_expose_the_graph, |sim| {
    let engine = sim.boot_simulated_engine(None).expect("boot");
    let mut session = engine.session().expect("session");
    register_line_schema(&mut session);
    session
        .execute("INSERT INTO test_line (id, value) VALUES ('x', 'y')", &[])
        .expect("insert");

    let active = session
        .execute(
            "SELECT name FROM version WHERE id = (SELECT version_id FROM active_version)",
            &[],
        )
        .err();
    // Subqueries are not part of the executable subset.
    assert!(active.is_some_and(|error| error.is(ErrorCode::UnsupportedStatement)));

    let version_id = session.session().active_version_id().to_string();
    let commit = session
        .execute(
            "SELECT commit_id FROM version WHERE id = ?",
            &[Value::text(version_id)],
        )
        .expect("version");
    let commit_id = commit.rows[0][0].clone();

    let elements = session
        .execute(
            "SELECT e.entity_id FROM change_set_element AS e WHERE schema_key = 'test_line'",
            &[],
        )
        .expect("elements");
    assert_eq!(elements.rows, vec![vec![Value::text("x")]]);

    let commits = session
        .execute("SELECT COUNT(*) AS n FROM commit WHERE id = ?", &[commit_id.clone()])
        .expect("commit");
    assert_eq!(commits.get(0, "n"), Some(&Value::Integer(1)));

    let tip = session.session().active_version().expect("version").commit_id;
    let parents = engine
        .engine()
        .read(|store| Ok(store.graph().commit_parents(&tip).to_vec()))
        .expect("parents");
    assert_eq!(parents.len(), 1);
    let listed = session
        .execute("SELECT parent_commit_ids FROM commit WHERE id = ?", &[commit_id])
        .expect("commit parents");
    assert_eq!(listed.rows, vec![vec![Value::text(json!(parents).to_string())]]);

    let schemas = session
        .execute(
            "SELECT key, version FROM stored_schema WHERE key IN ('lix_key_value', 'test_line') ORDER BY key",
            &[],
        )
        .expect("schemas");
    assert_eq!(
        schemas.rows,
        vec![
            vec![Value::text("lix_key_value"), Value::text("1.0")],
            vec![Value::text("test_line"), Value::text("1.0")],
        ]
    );
});

simulation_test!(preprocess_expands_views_over_physical_tables, |sim| {
    let engine = sim.boot_simulated_engine(None).expect("boot");
    let mut session = engine.session().expect("session");
    register_line_schema(&mut session);

    let output = session
        .session()
        .preprocess(
            "SELECT id FROM test_line WHERE value = ?; CREATE TABLE t (x INT); \
             DELETE FROM test_line WHERE id IN (SELECT entity_id FROM state)",
            &[Value::text("v")],
        )
        .expect("preprocess");
    assert_eq!(
        output.kinds,
        vec![StatementKind::Select, StatementKind::Other, StatementKind::Delete]
    );
    assert!(output.sql.contains("state_cache_test_line"));
    assert!(output.sql.contains("lix_internal_version"));
    assert!(output.sql.contains("CREATE TABLE t (x INT)"));
    assert!(output.sql.contains("DELETE FROM test_line"));
    assert_eq!(output.parameters, vec![Value::text("v")]);
    sim.assert_deterministic(output.sql);
});

simulation_test!(stored_schema_rows_must_match_their_document, |sim| {
    let engine = sim.boot_simulated_engine(None).expect("boot");
    let mut session = engine.session().expect("session");

    let error = session
        .execute(
            "INSERT INTO stored_schema (key, version, value) VALUES ('test_line', '2.0', ?)",
            &[Value::Text(support::line_schema().to_string())],
        )
        .expect_err("version column disagrees with the document");
    assert!(error.is(ErrorCode::SchemaMismatch));

    let registered = session
        .execute("SELECT COUNT(*) FROM stored_schema WHERE key = 'test_line'", &[])
        .expect("count");
    assert_eq!(registered.rows, vec![vec![Value::Integer(0)]]);

    session
        .execute(
            "INSERT INTO stored_schema (key, version, value) VALUES ('test_line', '1.0', ?)",
            &[Value::Text(support::line_schema().to_string())],
        )
        .expect("matching row");
});

simulation_test!(views_follow_a_schema_registered_again_after_rollback, |sim| {
    let engine = sim.boot_simulated_engine(None).expect("boot");
    let mut session = engine.session().expect("session");
    let todo = |second: &str| {
        let mut schema = json!({
            "x-lix-key": "todo",
            "x-lix-version": "1.0",
            "x-lix-primary-key": ["/id"],
            "type": "object",
            "properties": { "id": { "type": "string" } }
        });
        schema["properties"][second] = json!({ "type": "string" });
        schema
    };

    let rolled_back = session.session().transaction(|tx| {
        tx.register_schema(todo("title"))?;
        let rows = tx.execute("SELECT * FROM todo", &[])?;
        assert!(rows.columns.contains(&"title".to_string()));
        Err::<(), _>(LixError::new("LIX_ERROR_TEST", "Abort", "discard the schema"))
    });
    assert!(rolled_back.is_err());

    session
        .session()
        .transaction(|tx| tx.register_schema(todo("name")).map(|_| ()))
        .expect("register again");
    session
        .execute("INSERT INTO todo (id, name) VALUES ('t1', 'write tests')", &[])
        .expect("insert with the new column");

    let rows = session.execute("SELECT * FROM todo", &[]).expect("select");
    assert!(rows.columns.contains(&"name".to_string()));
    assert!(!rows.columns.contains(&"title".to_string()));
    assert_eq!(rows.get(0, "name"), Some(&Value::text("write tests")));
});
