mod support;

use std::collections::BTreeMap;

use lix_state::{NewChange, StateFilter};
use serde_json::json;

use support::simulation_test::SimulationSession;

fn line(id: &str, value: &str) -> NewChange {
    NewChange::upsert(
        id,
        "test_line",
        "1.0",
        "doc.txt",
        json!({ "id": id, "value": value }),
    )
}

fn lines(session: &mut SimulationSession) -> BTreeMap<String, String> {
    session
        .resolve_state(&StateFilter::default().with_schema("test_line"))
        .expect("resolve_state")
        .into_iter()
        .map(|row| {
            let value = row
                .snapshot_content
                .as_ref()
                .and_then(|snapshot| snapshot.get("value"))
                .and_then(|value| value.as_str())
                .unwrap_or_default()
                .to_string();
            (row.entity_id, value)
        })
        .collect()
}

fn expected(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(id, value)| (id.to_string(), value.to_string()))
        .collect()
}

simulation_test!(three_commits_then_transition_back_to_the_first, |sim| {
    let engine = sim.boot_simulated_engine(None).expect("boot");
    let mut session = engine.session().expect("session");
    session
        .session()
        .transaction(|tx| tx.register_schema(support::line_schema()))
        .expect("register schema");

    session
        .session()
        .transaction(|tx| {
            tx.record_change(line("l0", "Value 0"))?;
            tx.record_change(line("l1", "Value 1"))?;
            tx.record_change(line("l2", "Value 2"))?;
            Ok(())
        })
        .expect("commit0");
    let commit0 = session.session().active_version().expect("version").commit_id;
    assert_eq!(
        lines(&mut session),
        expected(&[("l0", "Value 0"), ("l1", "Value 1"), ("l2", "Value 2")])
    );

    session
        .session()
        .record_change(line("l2", "Value 2 Modified"))
        .expect("commit1");
    let commit1 = session.session().active_version().expect("version").commit_id;
    assert_eq!(
        lines(&mut session),
        expected(&[("l0", "Value 0"), ("l1", "Value 1"), ("l2", "Value 2 Modified")])
    );

    session
        .session()
        .transaction(|tx| {
            tx.record_change(line("l3", "Value 3"))?;
            tx.record_change(line("l4", "Value 4"))?;
            Ok(())
        })
        .expect("commit2");
    let commit2 = session.session().active_version().expect("version").commit_id;
    assert_eq!(
        lines(&mut session),
        expected(&[
            ("l0", "Value 0"),
            ("l1", "Value 1"),
            ("l2", "Value 2 Modified"),
            ("l3", "Value 3"),
            ("l4", "Value 4"),
        ])
    );

    let parents = engine
        .engine()
        .read(|store| {
            Ok((
                store.graph().commit_parents(&commit1).to_vec(),
                store.graph().commit_parents(&commit2).to_vec(),
            ))
        })
        .expect("parents");
    assert_eq!(parents, (vec![commit0.clone()], vec![commit1.clone()]));

    let outcome = session.session().transition(&commit0).expect("transition");
    let derived = outcome.commit_id.clone().expect("derived commit");
    assert_eq!(outcome.reused_change_ids.len(), 1);
    assert_eq!(outcome.delete_change_ids.len(), 2);
    assert_eq!(
        lines(&mut session),
        expected(&[("l0", "Value 0"), ("l1", "Value 1"), ("l2", "Value 2")])
    );

    let derived_parents = engine
        .engine()
        .read(|store| Ok(store.graph().commit_parents(&derived).to_vec()))
        .expect("derived parents");
    assert_eq!(derived_parents, vec![commit2.clone()]);
    assert_eq!(
        session.session().active_version().expect("version").commit_id,
        derived
    );

    sim.assert_deterministic(vec![commit0, commit1, commit2, derived]);
});

simulation_test!(second_transition_is_a_noop, |sim| {
    let engine = sim.boot_simulated_engine(None).expect("boot");
    let mut session = engine.session().expect("session");
    session
        .session()
        .transaction(|tx| {
            tx.register_schema(support::line_schema())?;
            tx.record_change(line("a", "first"))?;
            Ok(())
        })
        .expect("first commit");
    let first = session.session().active_version().expect("version").commit_id;
    session
        .session()
        .record_change(line("b", "second"))
        .expect("second commit");

    let outcome = session.session().transition(&first).expect("transition");
    assert!(!outcome.is_noop());

    let writes_before = engine.engine().cache_write_count().expect("count");
    let commits_before = engine
        .engine()
        .read(|store| Ok(store.graph().commits().count()))
        .expect("commits");
    let again = session.session().transition(&first).expect("second transition");
    assert!(again.is_noop());
    assert_eq!(engine.engine().cache_write_count().expect("count"), writes_before);
    assert_eq!(
        engine
            .engine()
            .read(|store| Ok(store.graph().commits().count()))
            .expect("commits"),
        commits_before
    );
    assert_eq!(lines(&mut session), expected(&[("a", "first")]));
});
