use std::sync::Arc;

use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};

use sqlbulk::prelude::*;
use sqlbulk_sqlite::SqliteConnection;

fn unwrap_outcome<T, E: std::fmt::Debug>(outcome: Outcome<T, E>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e:?}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

fn unwrap_err<T, E>(outcome: Outcome<T, E>) -> E {
    match outcome {
        Outcome::Err(e) => e,
        Outcome::Ok(_) => panic!("expected an error, got Ok"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Customer {
    id: i64,
    email: String,
    name: String,
}

fn customer(email: &str) -> Customer {
    Customer {
        id: 0,
        email: email.to_string(),
        name: format!("Name of {email}"),
    }
}

fn customer_profile() -> EntityProfile<Customer> {
    let mut b = EntityProfile::<Customer>::builder();
    b.property("id", |c| c.id, |c, v| c.id = v)
        .unwrap()
        .private_key()
        .auto_generated()
        .updated_after_insert();
    b.property("email", |c| c.email.clone(), |c, v| c.email = v)
        .unwrap()
        .unique();
    b.property("name", |c| c.name.clone(), |c, v| c.name = v)
        .unwrap();
    b.build().unwrap()
}

/// One element per portion, so every element is its own unit.
fn service(strategy: FailureStrategy) -> BulkService {
    let options = BulkServiceOptions::builder()
        .failure_strategy(strategy)
        .maximum_sent_elements(1)
        .keep_operated_in_exception(true)
        .keep_not_operated_in_exception(true)
        .keep_problem_in_exception(true)
        .register(customer_profile())
        .unwrap()
        .build()
        .unwrap();
    BulkService::new(Arc::new(options))
}

fn open() -> SqliteConnection {
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    conn.execute_raw(
        "CREATE TABLE customer (
            id INTEGER PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )",
    )
    .expect("create customer table");
    conn
}

async fn row_count(cx: &Cx, conn: &SqliteConnection) -> i64 {
    let rows = unwrap_outcome(
        conn.query(cx, "SELECT COUNT(*) AS n FROM customer", &[])
            .await,
    );
    rows[0].get_named::<i64>("n").expect("count column")
}

#[test]
fn sqlite_ignore_failure_returns_rejected_elements_and_keeps_the_rest() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = open();
        conn.execute_raw("INSERT INTO customer (email, name) VALUES ('a@x.io', 'existing')")
            .unwrap();

        let service = service(FailureStrategy::IgnoreFailure);
        let mut items = vec![customer("a@x.io"), customer("b@x.io")];

        let not_operated = unwrap_outcome(service.insert(&cx, &conn, items.iter_mut()).await);
        assert_eq!(not_operated, vec![customer("a@x.io")]);

        assert_eq!(row_count(&cx, &conn).await, 2);
        // The accepted element got its generated id back.
        assert_eq!(items[1].id, 2);
        assert_eq!(items[0].id, 0);
        assert!(!conn.in_transaction());
    });
}

#[test]
fn sqlite_stop_everything_keeps_earlier_units() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = open();
        let service = service(FailureStrategy::StopEverything);
        let mut items = vec![
            customer("a@x.io"),
            customer("a@x.io"),
            customer("c@x.io"),
        ];

        let err = unwrap_err(service.insert(&cx, &conn, items.iter_mut()).await);
        let failure = err.as_execution().expect("execution error");
        assert_eq!(failure.strategy, FailureStrategy::StopEverything);
        assert_eq!(failure.operation, BulkOperation::Insert);
        assert!(failure.source.is_constraint_violation());
        assert!(failure.sql().is_some_and(|sql| sql.starts_with("insert into \"customer\"")));

        let operated = failure.operated.as_ref().expect("operated kept");
        assert_eq!(operated.len(), 1);
        assert_eq!(operated[0].id, 1);
        assert_eq!(failure.problem.as_ref().map(Vec::len), Some(1));
        assert_eq!(
            failure.not_operated.as_ref().map(|v| v[0].email.clone()),
            Some("c@x.io".to_string())
        );

        assert_eq!(row_count(&cx, &conn).await, 1);
        assert!(!conn.in_transaction());
    });
}

#[test]
fn sqlite_stop_everything_and_rollback_undoes_the_whole_call() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = open();
        let service = service(FailureStrategy::StopEverythingAndRollback);
        let mut items = vec![customer("a@x.io"), customer("a@x.io")];

        let err = unwrap_err(service.insert(&cx, &conn, items.iter_mut()).await);
        assert!(err.is_execution());
        assert_eq!(row_count(&cx, &conn).await, 0);
        assert!(!conn.in_transaction());

        // The connection is usable afterwards.
        let mut items = vec![customer("a@x.io"), customer("b@x.io")];
        let not_operated = unwrap_outcome(service.insert(&cx, &conn, items.iter_mut()).await);
        assert!(not_operated.is_empty());
        assert_eq!(row_count(&cx, &conn).await, 2);
    });
}

#[test]
fn sqlite_profile_strategy_overrides_service_default() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let conn = open();
        let mut profile = EntityProfile::<Customer>::builder();
        profile
            .property("id", |c| c.id, |c, v| c.id = v)
            .unwrap()
            .private_key()
            .auto_generated();
        profile
            .property("email", |c| c.email.clone(), |c, v| c.email = v)
            .unwrap()
            .unique();
        profile
            .property("name", |c| c.name.clone(), |c, v| c.name = v)
            .unwrap();
        profile
            .failure_strategy(FailureStrategy::IgnoreFailure)
            .maximum_sent_elements(1);

        let options = BulkServiceOptions::builder()
            .failure_strategy(FailureStrategy::StopEverythingAndRollback)
            .register(profile.build().unwrap())
            .unwrap()
            .build()
            .unwrap();
        let service = BulkService::new(Arc::new(options));

        let mut items = vec![customer("a@x.io"), customer("a@x.io"), customer("b@x.io")];
        let not_operated = unwrap_outcome(service.insert(&cx, &conn, items.iter_mut()).await);
        assert_eq!(not_operated.len(), 1);
        assert_eq!(row_count(&cx, &conn).await, 2);
    });
}
