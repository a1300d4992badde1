use super::*;
use crate::driver::mock::MockDriver;
use crate::error::PgError;
use crate::monitor::{FnHook, StatsHook};
use crate::sql::Statement;
use crate::value::Value;
use crate::{record, sql};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;

type Events = Arc<Mutex<Vec<String>>>;

/// Hook that renders every event into a line.
fn recorder() -> (FnHook, Events) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let (q, e, t) = (events.clone(), events.clone(), events.clone());
    let hook = FnHook::new()
        .with_query(move |ev| {
            q.lock().unwrap().push(format!(
                "query {} tx={} depth={}",
                ev.text, ev.in_transaction, ev.depth
            ));
        })
        .with_error(move |ev| {
            e.lock().unwrap().push(format!("error {} depth={}", ev.error, ev.depth));
        })
        .with_transaction(move |ev| {
            t.lock().unwrap().push(format!(
                "{} depth={} timed={} error={:?}",
                ev.phase,
                ev.depth,
                ev.duration.is_some(),
                ev.error.map(ToString::to_string)
            ));
        });
    (hook, events)
}

fn lines(events: &Events) -> Vec<String> {
    events.lock().unwrap().clone()
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("db: {0}")]
    Db(#[from] PgError),
    #[error("rejected: {0}")]
    Rejected(&'static str),
}

// ── Retrieval ──

#[tokio::test]
async fn one_on_empty_result_is_not_found_without_retry() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    let err = pg
        .one(sql!("SELECT * FROM users WHERE id = {}", 42))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn retrieval_semantics() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    mock.push_rows(vec![record! { "id" => 1 }, record! { "id" => 2 }]);
    assert_eq!(pg.one("SELECT id FROM t").await.unwrap().get_i64("id"), Some(1));

    assert!(pg.maybe_one("SELECT id FROM t").await.unwrap().is_none());
    assert!(pg.any("SELECT id FROM t").await.unwrap().is_empty());
    assert!(pg.many("SELECT id FROM t").await.unwrap_err().is_not_found());

    mock.push_rows(vec![record! { "id" => 1 }, record! { "id" => 2 }]);
    assert_eq!(pg.many("SELECT id FROM t").await.unwrap().len(), 2);
}

#[tokio::test]
async fn prebuilt_statements_are_sent_verbatim() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    pg.any(Statement::new("SELECT * FROM t WHERE a = $1").bind("x"))
        .await
        .unwrap();

    let calls = mock.calls();
    assert_eq!(calls[0].text, "SELECT * FROM t WHERE a = $1");
    assert_eq!(calls[0].params, vec![Value::Text("x".into())]);
}

#[tokio::test]
async fn returned_rows_are_camel_cased() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    mock.push_rows(vec![record! {
        "first_name" => "Ada",
        "profile_data" => record! { "avatar_url" => "a.png" },
    }]);
    let rs = pg.query("SELECT * FROM users").await.unwrap();

    assert_eq!(rs.columns, vec!["firstName", "profileData"]);
    let row = &rs.rows[0];
    assert_eq!(row.get_str("firstName"), Some("Ada"));
    let profile = row.get("profileData").and_then(Value::as_map).unwrap();
    assert_eq!(profile.get_str("avatarUrl"), Some("a.png"));
}

#[tokio::test]
async fn preserve_casing_leaves_rows_alone() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone()).with_casing(RowCasing::Preserve);

    mock.push_rows(vec![record! { "first_name" => "Ada" }]);
    let row = pg.one("SELECT * FROM users").await.unwrap();
    assert_eq!(row.get_str("first_name"), Some("Ada"));
}

#[tokio::test]
async fn typed_helpers_decode_application_case_rows() {
    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct User {
        id: i64,
        first_name: String,
    }

    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    mock.push_rows(vec![record! { "id" => 7, "first_name" => "Ada" }]);
    let user: User = pg.one_as("SELECT * FROM users").await.unwrap();
    assert_eq!(
        user,
        User {
            id: 7,
            first_name: "Ada".into()
        }
    );

    let none: Option<User> = pg.maybe_one_as("SELECT * FROM users").await.unwrap();
    assert!(none.is_none());

    mock.push_rows(vec![record! { "id" => "not a number", "first_name" => "x" }]);
    let err = pg.any_as::<User>("SELECT * FROM users").await.unwrap_err();
    assert!(matches!(err, PgError::Serialization(_)));
}

// ── Unique lookups ──

#[tokio::test]
async fn many_by_unique_builds_quoted_any_lookup() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    mock.push_rows(vec![record! { "id" => 1 }, record! { "id" => 2 }]);
    let rows = pg.many_by_id("users", vec![1, 2]).await.unwrap();
    assert_eq!(rows.len(), 2);

    let calls = mock.calls();
    assert_eq!(calls[0].text, r#"SELECT * FROM "users" WHERE "id" = ANY($1)"#);
    assert_eq!(calls[0].params, vec![Value::from(vec![1, 2])]);
}

#[tokio::test]
async fn partial_matches_are_not_found() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    mock.push_rows(vec![record! { "id" => 1 }, record! { "id" => 3 }]);
    let err = pg
        .many_by_unique("users", "id", vec![1, 2, 3])
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Not found: Entities not found");
}

#[tokio::test]
async fn empty_value_list_is_rejected_before_dispatch() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    let err = pg
        .many_by_unique("users", "email", Vec::<String>::new())
        .await
        .unwrap_err();

    assert!(err.is_invalid_input());
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn by_unique_returns_the_single_row() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    mock.push_rows(vec![record! { "id" => 5, "email" => "a@b.c" }]);
    let row = pg
        .by_unique(&("auth", "users"), "email", "a@b.c")
        .await
        .unwrap();
    assert_eq!(row.get_i64("id"), Some(5));
    assert_eq!(
        mock.calls()[0].text,
        r#"SELECT * FROM "auth"."users" WHERE "email" = ANY($1)"#
    );

    assert!(pg.by_id("users", 9).await.unwrap_err().is_not_found());
}

// ── Inserts ──

#[tokio::test]
async fn insert_many_keeps_falsy_values_as_parameters() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    mock.push_rows(vec![record! { "id" => 1, "a" => 0 }]);
    let row = pg
        .insert_one("t", record! { "a" => 0 }, &["id", "a"])
        .await
        .unwrap();
    assert_eq!(row.get_i64("a"), Some(0));

    let call = &mock.calls()[0];
    assert_eq!(
        call.text,
        "INSERT INTO \"t\" (\"a\")\nVALUES ($1)\nRETURNING \"id\", \"a\""
    );
    assert_eq!(call.params, vec![Value::Int(0)]);
}

#[tokio::test]
async fn insert_converts_keys_to_storage_case() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    pg.insert_many(
        "users",
        vec![record! { "firstName" => "Ada" }, record! { "lastName" => "L" }],
        &[],
    )
    .await
    .unwrap();

    assert_eq!(
        mock.calls()[0].text,
        "INSERT INTO \"users\" (\"first_name\", \"last_name\")\nVALUES ($1, DEFAULT), (DEFAULT, $2)\nRETURNING *"
    );
}

#[tokio::test]
async fn empty_insert_is_rejected_before_dispatch() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    let err = pg.insert_many("t", Vec::new(), &[]).await.unwrap_err();
    assert!(err.is_invalid_input());
    assert_eq!(mock.call_count(), 0);
}

// ── Events ──

#[tokio::test]
async fn failed_query_emits_query_then_error_then_returns_it() {
    let mock = MockDriver::new();
    let (hook, events) = recorder();
    let pg = Pg::new(mock.clone()).with_hook(hook);

    mock.push_error(PgError::UniqueViolation("users_email_key: dup".into()));
    let err = pg.query("INSERT INTO users DEFAULT VALUES").await.unwrap_err();

    assert!(err.is_unique_violation());
    assert_eq!(
        lines(&events),
        vec![
            "query INSERT INTO users DEFAULT VALUES tx=false depth=0",
            "error Unique constraint violation: users_email_key: dup depth=0",
        ]
    );
}

#[tokio::test]
async fn wrapper_errors_do_not_emit_error_events() {
    let mock = MockDriver::new();
    let (hook, events) = recorder();
    let pg = Pg::new(mock.clone()).with_hook(hook);

    assert!(pg.one("SELECT 1").await.unwrap_err().is_not_found());
    assert_eq!(lines(&events), vec!["query SELECT 1 tx=false depth=0"]);
}

#[tokio::test]
async fn add_hook_composes_with_existing_hook() {
    let mock = MockDriver::new();
    let (hook, events) = recorder();
    let stats = Arc::new(StatsHook::new());
    let pg = Pg::new(mock.clone())
        .with_hook(hook)
        .add_hook(stats.clone());

    pg.any("SELECT 1").await.unwrap();

    assert_eq!(lines(&events).len(), 1);
    assert_eq!(stats.stats().total_queries, 1);
}

// ── Transactions ──

#[tokio::test]
async fn tx_commits_and_reports_depth() {
    let mock = MockDriver::new();
    let (hook, events) = recorder();
    let pg = Pg::new(mock.clone()).with_hook(hook);

    mock.push_rows(vec![]);
    mock.push_rows(vec![record! { "id" => 1 }]);
    let id = pg
        .tx(async |tx| {
            assert!(tx.context().in_transaction());
            assert_eq!(tx.context().depth(), 1);
            tx.any("UPDATE t SET a = 1").await?;
            let row = tx.one("SELECT id FROM t").await?;
            Ok::<_, PgError>(row.get_i64("id"))
        })
        .await
        .unwrap();

    assert_eq!(id, Some(1));
    assert_eq!(mock.tx_log(), vec!["BEGIN", "COMMIT"]);
    assert_eq!(
        lines(&events),
        vec![
            "BEGIN depth=1 timed=false error=None",
            "query UPDATE t SET a = 1 tx=true depth=1",
            "query SELECT id FROM t tx=true depth=1",
            "COMMIT depth=1 timed=true error=None",
        ]
    );
    assert!(!pg.context().in_transaction());
}

#[tokio::test]
async fn tx_rolls_back_and_returns_the_callback_error_unchanged() {
    let mock = MockDriver::new();
    let (hook, events) = recorder();
    let pg = Pg::new(mock.clone()).with_hook(hook);

    let result: Result<(), AppError> = pg
        .tx(async |tx| {
            tx.any("DELETE FROM t").await?;
            Err(AppError::Rejected("insufficient funds"))
        })
        .await;

    assert!(matches!(result, Err(AppError::Rejected("insufficient funds"))));
    assert_eq!(mock.tx_log(), vec!["BEGIN", "ROLLBACK"]);
    assert_eq!(
        lines(&events).last().unwrap(),
        "ROLLBACK depth=1 timed=true error=Some(\"rejected: insufficient funds\")"
    );
}

#[tokio::test]
async fn driver_error_inside_tx_rolls_back_and_propagates() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    mock.push_error(PgError::CheckViolation("positive_balance: violated".into()));
    let err = pg
        .tx(async |tx| {
            tx.any("UPDATE accounts SET balance = balance - 100").await?;
            Ok::<_, AppError>(())
        })
        .await
        .unwrap_err();

    match err {
        AppError::Db(inner) => assert_eq!(inner.sqlstate(), Some("23514")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mock.tx_log(), vec!["BEGIN", "ROLLBACK"]);
}

#[tokio::test]
async fn nested_tx_uses_savepoints_and_increments_depth() {
    let mock = MockDriver::new();
    let (hook, events) = recorder();
    let pg = Pg::new(mock.clone()).with_hook(hook);

    pg.tx(async |outer| {
        outer
            .tx(async |inner| {
                assert_eq!(inner.context().depth(), 2);
                inner.any("SELECT 1").await?;
                Ok::<_, PgError>(())
            })
            .await
    })
    .await
    .unwrap();

    assert_eq!(
        mock.tx_log(),
        vec![
            "BEGIN",
            "SAVEPOINT pgplus_sp_2",
            "RELEASE SAVEPOINT pgplus_sp_2",
            "COMMIT"
        ]
    );
    assert_eq!(
        lines(&events),
        vec![
            "BEGIN depth=1 timed=false error=None",
            "BEGIN depth=2 timed=false error=None",
            "query SELECT 1 tx=true depth=2",
            "COMMIT depth=2 timed=true error=None",
            "COMMIT depth=1 timed=true error=None",
        ]
    );
}

#[tokio::test]
async fn inner_failure_only_rolls_back_the_savepoint() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    let outcome = pg
        .tx(async |outer| {
            let inner: Result<(), AppError> = outer
                .tx(async |_inner| Err(AppError::Rejected("skip")))
                .await;
            assert!(inner.is_err());
            outer.any("SELECT 2").await?;
            Ok::<_, PgError>("done")
        })
        .await
        .unwrap();

    assert_eq!(outcome, "done");
    assert_eq!(
        mock.tx_log(),
        vec![
            "BEGIN",
            "SAVEPOINT pgplus_sp_2",
            "ROLLBACK TO SAVEPOINT pgplus_sp_2",
            "COMMIT"
        ]
    );
}

#[tokio::test]
async fn begin_failure_skips_the_callback() {
    let mock = MockDriver::new();
    let (hook, events) = recorder();
    let pg = Pg::new(mock.clone()).with_hook(hook);
    mock.fail_begin();

    let ran = Arc::new(Mutex::new(false));
    let flag = ran.clone();
    let err = pg
        .tx(async move |_tx| {
            *flag.lock().unwrap() = true;
            Ok::<_, PgError>(())
        })
        .await
        .unwrap_err();

    assert!(err.is_driver_failure());
    assert!(!*ran.lock().unwrap());
    assert_eq!(mock.call_count(), 0);
    assert_eq!(lines(&events).len(), 1);
    assert!(lines(&events)[0].starts_with("ROLLBACK depth=1"));
}

#[tokio::test]
async fn commit_failure_is_reported_as_rollback() {
    let mock = MockDriver::new();
    let (hook, events) = recorder();
    let pg = Pg::new(mock.clone()).with_hook(hook);
    mock.fail_commit();

    let err = pg
        .tx(async |_tx| Ok::<_, PgError>(()))
        .await
        .unwrap_err();

    assert!(matches!(err, PgError::Connection(_)));
    assert_eq!(mock.tx_log(), vec!["BEGIN", "COMMIT"]);
    assert!(lines(&events).last().unwrap().starts_with("ROLLBACK depth=1 timed=true error=Some("));
}

#[tokio::test]
async fn rollback_events_carry_the_typed_error() {
    let mock = MockDriver::new();
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let hook = FnHook::new().with_transaction(move |ev| {
        let Some(error) = ev.error else { return };
        let kind = if let Some(app) = error.downcast_ref::<AppError>() {
            format!("app {app}")
        } else if let Some(db) = error.downcast_ref::<PgError>() {
            format!("db driver_failure={}", db.is_driver_failure())
        } else {
            "unknown".to_string()
        };
        sink.lock().unwrap().push(kind);
    });
    let pg = Pg::new(mock.clone()).with_hook(hook);

    let _: Result<(), AppError> = pg
        .tx(async |_tx| Err(AppError::Rejected("limit")))
        .await;
    mock.fail_commit();
    let _: Result<(), AppError> = pg.tx(async |_tx| Ok(())).await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["app rejected: limit", "db driver_failure=true"]
    );
}

// ── Cancellation ──

#[tokio::test]
async fn dropped_tx_is_rolled_back_before_the_next_statement() {
    let mock = MockDriver::new();
    let (hook, events) = recorder();
    let pg = Pg::new(mock.clone()).with_hook(hook);

    let cancelled = tokio::time::timeout(
        Duration::from_millis(10),
        pg.tx(async |tx| {
            tx.any("UPDATE accounts SET balance = 0").await?;
            std::future::pending::<()>().await;
            Ok::<_, PgError>(())
        }),
    )
    .await;
    assert!(cancelled.is_err());
    assert_eq!(mock.tx_log(), vec!["BEGIN"]);
    assert_eq!(
        lines(&events).last().unwrap(),
        "ROLLBACK depth=1 timed=true error=Some(\"transaction dropped before completion\")"
    );

    pg.any("SELECT 1").await.unwrap();
    assert_eq!(mock.tx_log(), vec!["BEGIN", "ROLLBACK"]);
    let texts: Vec<String> = mock.calls().into_iter().map(|c| c.text).collect();
    assert_eq!(texts, vec!["UPDATE accounts SET balance = 0", "SELECT 1"]);
}

#[tokio::test]
async fn dropped_savepoint_is_discarded_before_the_parent_continues() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    pg.tx(async |outer| {
        let inner = tokio::time::timeout(
            Duration::from_millis(10),
            outer.tx(async |sp| {
                sp.any("INSERT INTO audit DEFAULT VALUES").await?;
                std::future::pending::<()>().await;
                Ok::<_, PgError>(())
            }),
        )
        .await;
        assert!(inner.is_err());
        outer.any("SELECT 2").await?;
        Ok::<_, PgError>(())
    })
    .await
    .unwrap();

    assert_eq!(
        mock.tx_log(),
        vec![
            "BEGIN",
            "SAVEPOINT pgplus_sp_2",
            "ROLLBACK TO SAVEPOINT pgplus_sp_2; RELEASE SAVEPOINT pgplus_sp_2",
            "COMMIT"
        ]
    );
}

#[tokio::test]
async fn dropped_savepoint_is_discarded_before_commit() {
    let mock = MockDriver::new();
    let pg = Pg::new(mock.clone());

    pg.tx(async |outer| {
        let inner = tokio::time::timeout(
            Duration::from_millis(10),
            outer.tx(async |_sp| {
                std::future::pending::<()>().await;
                Ok::<_, PgError>(())
            }),
        )
        .await;
        assert!(inner.is_err());
        Ok::<_, PgError>(())
    })
    .await
    .unwrap();

    assert_eq!(
        mock.tx_log(),
        vec![
            "BEGIN",
            "SAVEPOINT pgplus_sp_2",
            "ROLLBACK TO SAVEPOINT pgplus_sp_2; RELEASE SAVEPOINT pgplus_sp_2",
            "COMMIT"
        ]
    );
}
