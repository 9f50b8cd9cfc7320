//! Bulk execution orchestrator for sqlbulk.
//!
//! `sqlbulk-executor` drives a bulk call end to end:
//!
//! 1. split the input into user-level portions (`maximum_sent_elements`)
//! 2. generate the command units of each portion with `sqlbulk-query`
//! 3. run each unit in a transaction and write RETURNING values back onto
//!    the in-memory elements, by position
//! 4. apply the failure strategy when the database rejects a unit
//!
//! Portions and units are processed strictly in order, one at a time.
//!
//! # Failure strategies
//!
//! | Strategy | Transaction scope | On a rejected unit |
//! |---|---|---|
//! | `StopEverything` | one per unit | roll the unit back, keep earlier ones, return the error |
//! | `StopEverythingAndRollback` | one for the whole call | roll everything back, return the error |
//! | `IgnoreFailure` | one per unit | roll the unit back, report its elements, carry on |
//!
//! # Example
//!
//! ```rust,ignore
//! let service = BulkService::new(Arc::new(options));
//! let not_operated = service.insert(&cx, &conn, customers.iter_mut()).await;
//! ```

pub mod error;

pub use error::{BulkError, BulkExecutionError};

use std::ops::Range;
use std::sync::Arc;

use asupersync::{Cx, Outcome};
use sqlbulk_core::{
    BulkOperation, BulkServiceOptions, ColumnInfo, Connection, EntityProfile, Error,
    FailureStrategy, PropertyProfile, Row, TransactionOps,
};
use sqlbulk_query::SqlCommandBuilderResult;

/// Runs bulk insert, update, delete and upsert calls against a connection.
///
/// Holds only the frozen options, so one service can be shared by any
/// number of concurrent callers, each with its own connection.
#[derive(Debug, Clone)]
pub struct BulkService {
    options: Arc<BulkServiceOptions>,
}

impl BulkService {
    pub fn new(options: Arc<BulkServiceOptions>) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BulkServiceOptions {
        &self.options
    }

    /// Insert the elements, reading back columns flagged
    /// updated-after-insert.
    ///
    /// Returns the elements that were not operated (only ever non-empty
    /// under `IgnoreFailure`).
    pub async fn insert<'e, T, C, I>(
        &self,
        cx: &Cx,
        conn: &C,
        elements: I,
    ) -> Outcome<Vec<T>, BulkError<T>>
    where
        T: Clone + Send + Sync + 'static,
        C: Connection,
        I: IntoIterator,
        I::Item: Into<Option<&'e mut T>>,
    {
        self.execute(cx, conn, BulkOperation::Insert, elements)
            .await
    }

    /// Update the elements by private key, reading back columns flagged
    /// updated-after-update.
    pub async fn update<'e, T, C, I>(
        &self,
        cx: &Cx,
        conn: &C,
        elements: I,
    ) -> Outcome<Vec<T>, BulkError<T>>
    where
        T: Clone + Send + Sync + 'static,
        C: Connection,
        I: IntoIterator,
        I::Item: Into<Option<&'e mut T>>,
    {
        self.execute(cx, conn, BulkOperation::Update, elements)
            .await
    }

    /// Delete the rows matching the elements' private keys.
    pub async fn delete<'e, T, C, I>(
        &self,
        cx: &Cx,
        conn: &C,
        elements: I,
    ) -> Outcome<Vec<T>, BulkError<T>>
    where
        T: Clone + Send + Sync + 'static,
        C: Connection,
        I: IntoIterator,
        I::Item: Into<Option<&'e mut T>>,
    {
        self.execute(cx, conn, BulkOperation::Delete, elements)
            .await
    }

    /// Insert the elements, updating rows that collide on the unique
    /// constraint.
    pub async fn upsert<'e, T, C, I>(
        &self,
        cx: &Cx,
        conn: &C,
        elements: I,
    ) -> Outcome<Vec<T>, BulkError<T>>
    where
        T: Clone + Send + Sync + 'static,
        C: Connection,
        I: IntoIterator,
        I::Item: Into<Option<&'e mut T>>,
    {
        self.execute(cx, conn, BulkOperation::Upsert, elements)
            .await
    }

    /// Run `operation` over the elements. `None` entries are skipped.
    pub async fn execute<'e, T, C, I>(
        &self,
        cx: &Cx,
        conn: &C,
        operation: BulkOperation,
        elements: I,
    ) -> Outcome<Vec<T>, BulkError<T>>
    where
        T: Clone + Send + Sync + 'static,
        C: Connection,
        I: IntoIterator,
        I::Item: Into<Option<&'e mut T>>,
    {
        let slots: Vec<Option<&'e mut T>> = elements.into_iter().map(Into::into).collect();
        if slots.is_empty() {
            return Outcome::Err(BulkError::Argument(format!(
                "{} needs at least one element",
                operation
            )));
        }
        let elements: Vec<&'e mut T> = slots.into_iter().flatten().collect();
        if elements.is_empty() {
            return Outcome::Err(BulkError::Argument(format!(
                "{} needs at least one element that is not None",
                operation
            )));
        }
        self.run(cx, conn, operation, elements).await
    }

    #[tracing::instrument(
        level = "info",
        skip(self, cx, conn, elements),
        fields(entity = std::any::type_name::<T>(), count = elements.len())
    )]
    async fn run<T, C>(
        &self,
        cx: &Cx,
        conn: &C,
        operation: BulkOperation,
        mut elements: Vec<&mut T>,
    ) -> Outcome<Vec<T>, BulkError<T>>
    where
        T: Clone + Send + Sync + 'static,
        C: Connection,
    {
        let profile = match self.options.profile::<T>() {
            Ok(profile) => profile,
            Err(e) => return Outcome::Err(e.into()),
        };
        let strategy = self.options.failure_strategy_for(&profile);
        let settings = self.options.settings();
        let portions = portions(elements.len(), self.options.batch_size_for(&profile));

        tracing::info!(
            operation = %operation,
            table = profile.quoted_table(),
            strategy = %strategy,
            portions = portions.len(),
            "Starting bulk operation"
        );
        let start = std::time::Instant::now();

        // StopEverythingAndRollback makes the whole call one transaction.
        let shared = if strategy == FailureStrategy::StopEverythingAndRollback {
            match conn.begin(cx).await {
                Outcome::Ok(tx) => Some(tx),
                Outcome::Err(e) => return Outcome::Err(BulkError::Driver(e)),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        } else {
            None
        };

        let mut not_operated: Vec<T> = Vec::new();
        let mut unit_count = 0_usize;

        for (portion_index, portion) in portions.iter().enumerate() {
            if let Some(reason) = cx.cancel_reason() {
                return abort(cx, shared, Outcome::Cancelled(reason)).await;
            }

            let units = {
                let view: Vec<Option<&T>> = elements[portion.clone()]
                    .iter()
                    .map(|e| Some(&**e))
                    .collect();
                match sqlbulk_query::generate(cx, operation, &view, &profile) {
                    Outcome::Ok(units) => units,
                    Outcome::Err(e) => return abort(cx, shared, Outcome::Err(e.into())).await,
                    Outcome::Cancelled(r) => return abort(cx, shared, Outcome::Cancelled(r)).await,
                    Outcome::Panicked(p) => return abort(cx, shared, Outcome::Panicked(p)).await,
                }
            };
            tracing::debug!(
                portion = portion_index,
                elements = portion.len(),
                units = units.len(),
                "Executing portion"
            );

            let mut next = portion.start;
            for unit in &units {
                let range = next..next + unit.elements_count;
                next = range.end;
                unit_count += 1;

                if let Some(reason) = cx.cancel_reason() {
                    return abort(cx, shared, Outcome::Cancelled(reason)).await;
                }

                let unit_elements = &mut elements[range.clone()];
                let outcome = match &shared {
                    Some(tx) => match execute_unit(cx, tx, &profile, unit, unit_elements).await {
                        Outcome::Ok(()) => Outcome::Ok(()),
                        Outcome::Err(e) => Outcome::Err(UnitError::Rejected(e)),
                        Outcome::Cancelled(r) => Outcome::Cancelled(r),
                        Outcome::Panicked(p) => Outcome::Panicked(p),
                    },
                    None => execute_in_transaction(cx, conn, &profile, unit, unit_elements).await,
                };

                match outcome {
                    Outcome::Ok(()) => {}
                    Outcome::Err(UnitError::Driver(e)) => {
                        return abort(cx, shared, Outcome::Err(BulkError::Driver(e))).await;
                    }
                    Outcome::Err(UnitError::Rejected(source)) => {
                        if strategy == FailureStrategy::IgnoreFailure {
                            tracing::warn!(
                                operation = %operation,
                                table = profile.quoted_table(),
                                elements = range.len(),
                                error = %source,
                                "Ignoring failed unit"
                            );
                            not_operated.extend(clone_all(&elements[range]));
                            continue;
                        }
                        let failure = BulkExecutionError {
                            operation,
                            strategy,
                            source,
                            operated: keep(
                                settings.keep_operated_in_exception,
                                &elements[..range.start],
                            ),
                            not_operated: keep(
                                settings.keep_not_operated_in_exception,
                                &elements[range.end..],
                            ),
                            problem: keep(settings.keep_problem_in_exception, &elements[range]),
                        };
                        tracing::debug!(error = %failure, "Stopping bulk operation");
                        return abort(cx, shared, Outcome::Err(failure.into())).await;
                    }
                    Outcome::Cancelled(r) => return abort(cx, shared, Outcome::Cancelled(r)).await,
                    Outcome::Panicked(p) => return abort(cx, shared, Outcome::Panicked(p)).await,
                }
            }
        }

        if let Some(tx) = shared {
            match tx.commit(cx).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(BulkError::Driver(e)),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis(),
            operated = elements.len() - not_operated.len(),
            not_operated = not_operated.len(),
            portions = portions.len(),
            units = unit_count,
            "Bulk operation complete"
        );
        Outcome::Ok(not_operated)
    }
}

/// Why a unit did not complete.
enum UnitError {
    /// The database refused the unit, or its RETURNING values could not be
    /// written back. Subject to the failure strategy.
    Rejected(Error),
    /// Starting or committing the unit's transaction failed.
    Driver(Error),
}

/// Consecutive `size`-element ranges over `total` elements; the last one
/// takes the remainder. `None` means a single portion.
fn portions(total: usize, size: Option<usize>) -> Vec<Range<usize>> {
    let size = size.unwrap_or(total).max(1);
    (0..total)
        .step_by(size)
        .map(|start| start..(start + size).min(total))
        .collect()
}

fn clone_all<T: Clone>(elements: &[&mut T]) -> Vec<T> {
    elements.iter().map(|e| (**e).clone()).collect()
}

fn keep<T: Clone>(enabled: bool, elements: &[&mut T]) -> Option<Vec<T>> {
    enabled.then(|| clone_all(elements))
}

/// Roll back the call-wide transaction, if any, and hand back `result`.
async fn abort<X: TransactionOps, R>(cx: &Cx, shared: Option<X>, result: R) -> R {
    if let Some(tx) = shared {
        rollback_quietly(cx, tx).await;
    }
    result
}

async fn rollback_quietly<X: TransactionOps>(cx: &Cx, tx: X) {
    match tx.rollback(cx).await {
        Outcome::Ok(()) => {}
        Outcome::Err(e) => tracing::warn!(error = %e, "Rollback failed"),
        Outcome::Cancelled(_) | Outcome::Panicked(_) => {
            tracing::warn!("Rollback did not complete");
        }
    }
}

/// Run one unit in its own transaction.
async fn execute_in_transaction<C: Connection, T: Clone>(
    cx: &Cx,
    conn: &C,
    profile: &EntityProfile<T>,
    unit: &SqlCommandBuilderResult,
    elements: &mut [&mut T],
) -> Outcome<(), UnitError> {
    let tx = match conn.begin(cx).await {
        Outcome::Ok(tx) => tx,
        Outcome::Err(e) => return Outcome::Err(UnitError::Driver(e)),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    match execute_unit(cx, &tx, profile, unit, elements).await {
        Outcome::Ok(()) => match tx.commit(cx).await {
            Outcome::Ok(()) => Outcome::Ok(()),
            Outcome::Err(e) => Outcome::Err(UnitError::Driver(e)),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        },
        Outcome::Err(e) => {
            rollback_quietly(cx, tx).await;
            Outcome::Err(UnitError::Rejected(e))
        }
        Outcome::Cancelled(r) => {
            rollback_quietly(cx, tx).await;
            Outcome::Cancelled(r)
        }
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// Execute one unit inside `tx` and write RETURNING values back.
#[tracing::instrument(
    level = "debug",
    skip(cx, tx, profile, unit, elements),
    fields(elements = unit.elements_count, parameters = unit.parameters.len())
)]
async fn execute_unit<X: TransactionOps, T: Clone>(
    cx: &Cx,
    tx: &X,
    profile: &EntityProfile<T>,
    unit: &SqlCommandBuilderResult,
    elements: &mut [&mut T],
) -> Outcome<(), Error> {
    tracing::trace!(sql = %unit.sql, "Executing command unit");

    if !unit.has_returning {
        return match tx.execute(cx, &unit.sql, &unit.parameters).await {
            Outcome::Ok(affected) => {
                tracing::debug!(affected = affected, "Unit executed");
                Outcome::Ok(())
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        };
    }

    let rows = match tx.query(cx, &unit.sql, &unit.parameters).await {
        Outcome::Ok(rows) => rows,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    tracing::debug!(rows = rows.len(), "Unit executed");
    write_back(profile, &rows, elements).map_or_else(Outcome::Err, Outcome::Ok)
}

/// Pair RETURNING rows with elements by position and set every returned
/// column through its property.
///
/// Values land on copies first; the elements are only replaced once every
/// row has converted, so a failed unit leaves its elements untouched.
fn write_back<T: Clone>(
    profile: &EntityProfile<T>,
    rows: &[Row],
    elements: &mut [&mut T],
) -> Result<(), Error> {
    if rows.len() != elements.len() {
        tracing::warn!(
            rows = rows.len(),
            elements = elements.len(),
            table = profile.quoted_table(),
            "RETURNING row count differs from unit element count"
        );
    }

    // Column -> property resolution is redone only when the result set
    // changes (an update unit returns one result set per statement).
    let mut resolved: Option<&Arc<ColumnInfo>> = None;
    let mut targets: Vec<Option<&PropertyProfile<T>>> = Vec::new();
    let mut staged: Vec<T> = Vec::with_capacity(rows.len().min(elements.len()));
    for (row, element) in rows.iter().zip(elements.iter()) {
        if !resolved.is_some_and(|columns| Arc::ptr_eq(columns, row.columns())) {
            targets = row
                .columns()
                .names()
                .iter()
                .map(|column| profile.property_by_column(column))
                .collect();
            resolved = Some(row.columns());
        }
        let mut copy = (**element).clone();
        for (property, value) in targets.iter().zip(row.values()) {
            if let Some(property) = property {
                property.set_value(&mut copy, value)?;
            }
        }
        staged.push(copy);
    }

    for (element, copy) in elements.iter_mut().zip(staged) {
        **element = copy;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use asupersync::types::CancelKind;
    use sqlbulk_core::{EntityProfileBuilder, Parameter, QueryError, QueryErrorKind, Value};
    use std::future::Future;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Account {
        id: i64,
        email: String,
        balance: i64,
    }

    fn account(email: &str) -> Account {
        Account {
            id: 0,
            email: email.to_string(),
            balance: 10,
        }
    }

    fn account_profile(
        configure: impl FnOnce(&mut EntityProfileBuilder<Account>),
    ) -> EntityProfile<Account> {
        let mut b = EntityProfile::<Account>::builder();
        b.property("id", |a| a.id, |a, v| a.id = v)
            .unwrap()
            .private_key()
            .auto_generated()
            .updated_after_insert();
        b.property("email", |a| a.email.clone(), |a, v| a.email = v)
            .unwrap()
            .unique();
        b.property("balance", |a| a.balance, |a, v| a.balance = v)
            .unwrap();
        configure(&mut b);
        b.build().unwrap()
    }

    fn service(
        strategy: FailureStrategy,
        batch: Option<usize>,
        configure: impl FnOnce(&mut EntityProfileBuilder<Account>),
    ) -> BulkService {
        let mut options = BulkServiceOptions::builder()
            .failure_strategy(strategy)
            .keep_operated_in_exception(true)
            .keep_not_operated_in_exception(true)
            .keep_problem_in_exception(true);
        if let Some(size) = batch {
            options = options.maximum_sent_elements(size);
        }
        let options = options
            .register(account_profile(configure))
            .unwrap()
            .build()
            .unwrap();
        BulkService::new(Arc::new(options))
    }

    #[derive(Debug, Default)]
    struct MockState {
        /// `begin`, `commit`, `rollback`, and every executed text.
        log: Vec<String>,
        /// Reject any text containing this substring.
        fail_on: Option<String>,
        next_id: i64,
        /// Hand ids from this one on back as text, so write-back fails.
        text_ids_from: Option<i64>,
        /// Cancel the caller's context once the log holds this many entries.
        cancel_after: Option<usize>,
    }

    impl MockState {
        fn record(&mut self, cx: &Cx, entry: &str) {
            self.log.push(entry.to_string());
            if self.cancel_after == Some(self.log.len()) {
                cx.cancel_with(CancelKind::User, Some("caller gave up"));
            }
        }

        fn respond(
            &mut self,
            cx: &Cx,
            sql: &str,
            params: &[Parameter],
        ) -> Outcome<Vec<Row>, Error> {
            self.record(cx, sql);
            let rejected = self.fail_on.as_deref().is_some_and(|needle| {
                sql.contains(needle)
                    || params
                        .iter()
                        .any(|p| p.value.as_str().is_some_and(|s| s.contains(needle)))
            });
            if rejected {
                return Outcome::Err(Error::Query(QueryError {
                    kind: QueryErrorKind::Constraint,
                    sql: Some(sql.to_string()),
                    sqlstate: None,
                    message: "UNIQUE constraint failed: account.email".to_string(),
                    source: None,
                }));
            }
            let mut rows = Vec::new();
            if sql.contains(" returning ") {
                for _ in 0..sql.matches("@param_email_").count() {
                    self.next_id += 1;
                    let id = if self.text_ids_from.is_some_and(|from| self.next_id >= from) {
                        Value::Text(format!("id-{}", self.next_id))
                    } else {
                        Value::BigInt(self.next_id)
                    };
                    rows.push(Row::new(vec!["id".into()], vec![id]));
                }
            }
            Outcome::Ok(rows)
        }
    }

    #[derive(Debug, Clone)]
    struct MockConnection {
        state: Arc<Mutex<MockState>>,
    }

    impl MockConnection {
        fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(MockState::default())),
            }
        }

        fn failing_on(needle: &str) -> Self {
            let conn = Self::new();
            conn.state.lock().expect("lock poisoned").fail_on = Some(needle.to_string());
            conn
        }

        fn with_state(self, configure: impl FnOnce(&mut MockState)) -> Self {
            configure(&mut *self.state.lock().expect("lock poisoned"));
            self
        }

        fn log(&self) -> Vec<String> {
            self.state.lock().expect("lock poisoned").log.clone()
        }

        fn count(&self, entry: &str) -> usize {
            self.log().iter().filter(|e| e.as_str() == entry).count()
        }

        fn statements(&self) -> Vec<String> {
            self.log()
                .into_iter()
                .filter(|e| !matches!(e.as_str(), "begin" | "commit" | "rollback"))
                .collect()
        }
    }

    impl Connection for MockConnection {
        type Tx<'conn>
            = MockTransaction
        where
            Self: 'conn;

        fn query(
            &self,
            cx: &Cx,
            sql: &str,
            params: &[Parameter],
        ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
            let result = self.state.lock().expect("lock poisoned").respond(cx, sql, params);
            async move { result }
        }

        fn execute(
            &self,
            cx: &Cx,
            sql: &str,
            params: &[Parameter],
        ) -> impl Future<Output = Outcome<u64, Error>> + Send {
            let result = self.state.lock().expect("lock poisoned").respond(cx, sql, params);
            async move {
                match result {
                    Outcome::Ok(_) => Outcome::Ok(1),
                    Outcome::Err(e) => Outcome::Err(e),
                    Outcome::Cancelled(r) => Outcome::Cancelled(r),
                    Outcome::Panicked(p) => Outcome::Panicked(p),
                }
            }
        }

        fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
            self.state.lock().expect("lock poisoned").record(cx, "begin");
            let tx = MockTransaction {
                conn: self.clone(),
            };
            async move { Outcome::Ok(tx) }
        }

        fn ping(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
            async { Outcome::Ok(()) }
        }
    }

    struct MockTransaction {
        conn: MockConnection,
    }

    impl MockTransaction {
        fn finish(&self, cx: &Cx, entry: &str) {
            self.conn.state.lock().expect("lock poisoned").record(cx, entry);
        }
    }

    impl TransactionOps for MockTransaction {
        fn query(
            &self,
            cx: &Cx,
            sql: &str,
            params: &[Parameter],
        ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
            self.conn.query(cx, sql, params)
        }

        fn execute(
            &self,
            cx: &Cx,
            sql: &str,
            params: &[Parameter],
        ) -> impl Future<Output = Outcome<u64, Error>> + Send {
            self.conn.execute(cx, sql, params)
        }

        fn commit(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
            self.finish(cx, "commit");
            async { Outcome::Ok(()) }
        }

        fn rollback(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
            self.finish(cx, "rollback");
            async { Outcome::Ok(()) }
        }
    }

    fn unwrap_outcome<T, E: std::fmt::Debug>(outcome: Outcome<T, E>) -> T {
        match outcome {
            Outcome::Ok(value) => value,
            Outcome::Err(err) => panic!("unexpected error: {err:?}"),
            Outcome::Cancelled(reason) => panic!("cancelled: {reason:?}"),
            Outcome::Panicked(payload) => panic!("panicked: {payload:?}"),
        }
    }

    fn unwrap_err<T, E>(outcome: Outcome<T, E>) -> E {
        match outcome {
            Outcome::Err(err) => err,
            _ => panic!("expected an error"),
        }
    }

    fn block_on<F: Future>(future: F) -> F::Output {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        rt.block_on(future)
    }

    #[test]
    fn test_portions_last_absorbs_remainder() {
        assert_eq!(portions(5, Some(2)), vec![0..2, 2..4, 4..5]);
        assert_eq!(portions(4, Some(2)), vec![0..2, 2..4]);
        assert_eq!(portions(3, None), vec![0..3]);
        assert_eq!(portions(3, Some(10)), vec![0..3]);
    }

    #[test]
    fn test_insert_writes_back_generated_ids() {
        let service = service(FailureStrategy::StopEverything, None, |_| {});
        let conn = MockConnection::new();
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io"), account("b@x.io")];

        let not_operated = block_on(service.insert(&cx, &conn, items.iter_mut()));
        assert!(unwrap_outcome(not_operated).is_empty());

        assert_eq!(items[0].id, 1);
        assert_eq!(items[1].id, 2);
        assert_eq!(conn.count("begin"), 1);
        assert_eq!(conn.count("commit"), 1);
        assert_eq!(
            conn.statements(),
            vec![
                "insert into \"account\" (\"email\", \"balance\") values \
                 (@param_email_0, 10), (@param_email_1, 10) returning \"id\";"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_portions_of_two_over_five_elements() {
        let service = service(FailureStrategy::StopEverything, Some(2), |_| {});
        let conn = MockConnection::new();
        let cx = Cx::for_testing();
        let mut items: Vec<Account> = (0..5).map(|i| account(&format!("{i}@x.io"))).collect();

        unwrap_outcome(block_on(service.insert(&cx, &conn, items.iter_mut())));

        let per_statement: Vec<usize> = conn
            .statements()
            .iter()
            .map(|sql| sql.matches("@param_email_").count())
            .collect();
        assert_eq!(per_statement, vec![2, 2, 1]);
        assert_eq!(conn.count("commit"), 3);
        let ids: Vec<i64> = items.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_profile_batch_size_overrides_default() {
        let service = service(FailureStrategy::StopEverything, Some(10), |b| {
            b.maximum_sent_elements(1);
        });
        let conn = MockConnection::new();
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io"), account("b@x.io"), account("c@x.io")];

        unwrap_outcome(block_on(service.insert(&cx, &conn, items.iter_mut())));
        assert_eq!(conn.statements().len(), 3);
    }

    #[test]
    fn test_ignore_failure_reports_rejected_elements() {
        let service = service(FailureStrategy::IgnoreFailure, Some(1), |_| {});
        let conn = MockConnection::failing_on("dup@x.io");
        let cx = Cx::for_testing();
        let mut items = vec![account("dup@x.io"), account("ok@x.io")];

        let not_operated = unwrap_outcome(block_on(service.insert(&cx, &conn, items.iter_mut())));
        assert_eq!(not_operated, vec![account("dup@x.io")]);
        assert_eq!(conn.count("rollback"), 1);
        assert_eq!(conn.count("commit"), 1);
        assert_eq!(items[0].id, 0);
        assert_eq!(items[1].id, 1);
    }

    #[test]
    fn test_stop_everything_keeps_earlier_units() {
        let service = service(FailureStrategy::StopEverything, Some(1), |_| {});
        let conn = MockConnection::failing_on("b@x.io");
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io"), account("b@x.io"), account("c@x.io")];

        let err = unwrap_err(block_on(service.insert(&cx, &conn, items.iter_mut())));
        let err = err.into_execution().expect("execution error");
        assert_eq!(err.operation, BulkOperation::Insert);
        assert_eq!(err.strategy, FailureStrategy::StopEverything);
        assert!(err.source.is_constraint_violation());

        let emails = |v: &Option<Vec<Account>>| -> Vec<String> {
            v.iter().flatten().map(|a| a.email.clone()).collect()
        };
        assert_eq!(emails(&err.operated), vec!["a@x.io"]);
        assert_eq!(emails(&err.problem), vec!["b@x.io"]);
        assert_eq!(emails(&err.not_operated), vec!["c@x.io"]);

        assert_eq!(
            conn.log()
                .iter()
                .filter(|e| !e.starts_with("insert"))
                .cloned()
                .collect::<Vec<_>>(),
            vec!["begin", "commit", "begin", "rollback"]
        );
        assert_eq!(conn.statements().len(), 2);
    }

    #[test]
    fn test_stop_everything_and_rollback_uses_one_transaction() {
        let service = service(FailureStrategy::StopEverythingAndRollback, Some(1), |_| {});
        let conn = MockConnection::failing_on("c@x.io");
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io"), account("b@x.io"), account("c@x.io")];

        let err = unwrap_err(block_on(service.insert(&cx, &conn, items.iter_mut())));
        assert!(err.is_execution());
        assert_eq!(conn.count("begin"), 1);
        assert_eq!(conn.count("commit"), 0);
        assert_eq!(conn.count("rollback"), 1);
        assert_eq!(conn.log().last().map(String::as_str), Some("rollback"));
    }

    #[test]
    fn test_stop_everything_and_rollback_commits_once_on_success() {
        let service = service(FailureStrategy::StopEverythingAndRollback, Some(1), |_| {});
        let conn = MockConnection::new();
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io"), account("b@x.io")];

        unwrap_outcome(block_on(service.insert(&cx, &conn, items.iter_mut())));
        assert_eq!(conn.count("begin"), 1);
        assert_eq!(conn.count("commit"), 1);
        assert_eq!(conn.statements().len(), 2);
    }

    #[test]
    fn test_profile_strategy_overrides_default() {
        let service = service(FailureStrategy::StopEverything, Some(1), |b| {
            b.failure_strategy(FailureStrategy::IgnoreFailure);
        });
        let conn = MockConnection::failing_on("a@x.io");
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io"), account("b@x.io")];

        let not_operated = unwrap_outcome(block_on(service.insert(&cx, &conn, items.iter_mut())));
        assert_eq!(not_operated.len(), 1);
    }

    #[test]
    fn test_write_back_failure_counts_as_unit_failure() {
        let service = service(FailureStrategy::IgnoreFailure, None, |_| {});
        let conn = MockConnection::new().with_state(|s| s.text_ids_from = Some(1));
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io")];

        let not_operated = unwrap_outcome(block_on(service.insert(&cx, &conn, items.iter_mut())));
        assert_eq!(not_operated, vec![account("a@x.io")]);
        assert_eq!(conn.count("rollback"), 1);
    }

    #[test]
    fn test_failed_write_back_leaves_the_whole_unit_untouched() {
        let service = service(FailureStrategy::IgnoreFailure, None, |_| {});
        // The first row converts, the second does not.
        let conn = MockConnection::new().with_state(|s| s.text_ids_from = Some(2));
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io"), account("b@x.io")];

        let not_operated = unwrap_outcome(block_on(service.insert(&cx, &conn, items.iter_mut())));
        assert_eq!(not_operated, vec![account("a@x.io"), account("b@x.io")]);
        assert_eq!((items[0].id, items[1].id), (0, 0));
        assert_eq!(conn.count("rollback"), 1);
    }

    fn unwrap_cancelled<T, E>(outcome: Outcome<T, E>) -> asupersync::types::CancelReason {
        match outcome {
            Outcome::Cancelled(reason) => reason,
            _ => panic!("expected cancellation"),
        }
    }

    #[test]
    fn test_cancelled_before_first_portion_sends_nothing() {
        let service = service(FailureStrategy::StopEverything, Some(1), |_| {});
        let conn = MockConnection::new();
        let cx = Cx::for_testing();
        cx.cancel_with(CancelKind::User, Some("caller gave up"));
        let mut items = vec![account("a@x.io"), account("b@x.io")];

        let reason = unwrap_cancelled(block_on(service.insert(&cx, &conn, items.iter_mut())));
        assert_eq!(reason.kind, CancelKind::User);
        assert!(conn.log().is_empty());
        assert_eq!((items[0].id, items[1].id), (0, 0));
    }

    #[test]
    fn test_cancellation_keeps_committed_units() {
        let service = service(FailureStrategy::StopEverything, Some(1), |_| {});
        // begin, insert, commit: cancel right after the first unit commits.
        let conn = MockConnection::new().with_state(|s| s.cancel_after = Some(3));
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io"), account("b@x.io"), account("c@x.io")];

        unwrap_cancelled(block_on(service.insert(&cx, &conn, items.iter_mut())));
        assert_eq!(conn.count("commit"), 1);
        assert_eq!(conn.count("rollback"), 0);
        assert_eq!(conn.statements().len(), 1);
        assert_eq!(items[0].id, 1);
        assert_eq!(items[1].id, 0);
    }

    #[test]
    fn test_cancellation_rolls_back_call_transaction() {
        let service = service(FailureStrategy::StopEverythingAndRollback, Some(1), |_| {});
        // begin, insert: cancel while the call-wide transaction is open.
        let conn = MockConnection::new().with_state(|s| s.cancel_after = Some(2));
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io"), account("b@x.io"), account("c@x.io")];

        unwrap_cancelled(block_on(service.insert(&cx, &conn, items.iter_mut())));
        assert_eq!(conn.count("begin"), 1);
        assert_eq!(conn.count("commit"), 0);
        assert_eq!(conn.count("rollback"), 1);
        assert_eq!(conn.statements().len(), 1);
        assert_eq!(conn.log().last().map(String::as_str), Some("rollback"));
    }

    #[test]
    fn test_exception_collections_are_off_by_default() {
        let options = BulkServiceOptions::builder()
            .failure_strategy(FailureStrategy::StopEverything)
            .maximum_sent_elements(1)
            .register(account_profile(|_| {}))
            .unwrap()
            .build()
            .unwrap();
        let service = BulkService::new(Arc::new(options));
        let conn = MockConnection::failing_on("b@x.io");
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io"), account("b@x.io"), account("c@x.io")];

        let err = unwrap_err(block_on(service.insert(&cx, &conn, items.iter_mut())));
        let err = err.into_execution().expect("execution error");
        assert!(err.source.is_constraint_violation());
        assert!(err.operated.is_none());
        assert!(err.not_operated.is_none());
        assert!(err.problem.is_none());
    }

    #[test]
    fn test_exception_collections_follow_their_own_flag() {
        let options = BulkServiceOptions::builder()
            .failure_strategy(FailureStrategy::StopEverything)
            .maximum_sent_elements(1)
            .keep_problem_in_exception(true)
            .register(account_profile(|_| {}))
            .unwrap()
            .build()
            .unwrap();
        let service = BulkService::new(Arc::new(options));
        let conn = MockConnection::failing_on("b@x.io");
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io"), account("b@x.io"), account("c@x.io")];

        let err = unwrap_err(block_on(service.insert(&cx, &conn, items.iter_mut())));
        let err = err.into_execution().expect("execution error");
        assert_eq!(err.problem, Some(vec![account("b@x.io")]));
        assert!(err.operated.is_none());
        assert!(err.not_operated.is_none());
    }

    #[test]
    fn test_none_entries_are_skipped() {
        let service = service(FailureStrategy::StopEverything, None, |_| {});
        let conn = MockConnection::new();
        let cx = Cx::for_testing();
        let mut a = account("a@x.io");
        let mut b = account("b@x.io");

        let elements = vec![None, Some(&mut a), None, Some(&mut b)];
        unwrap_outcome(block_on(service.insert(&cx, &conn, elements)));
        assert_eq!((a.id, b.id), (1, 2));
    }

    #[test]
    fn test_empty_and_all_none_input_are_argument_errors() {
        let service = service(FailureStrategy::StopEverything, None, |_| {});
        let conn = MockConnection::new();
        let cx = Cx::for_testing();

        let empty: Vec<&mut Account> = Vec::new();
        let err = unwrap_err(block_on(service.insert(&cx, &conn, empty)));
        assert!(matches!(err, BulkError::Argument(_)));

        let nones: Vec<Option<&mut Account>> = vec![None, None];
        let err = unwrap_err(block_on(service.delete(&cx, &conn, nones)));
        assert!(matches!(err, BulkError::Argument(_)));
        assert!(conn.log().is_empty());
    }

    #[test]
    fn test_unregistered_entity_is_mapping_error() {
        #[derive(Clone)]
        struct Stranger;

        let service = service(FailureStrategy::StopEverything, None, |_| {});
        let conn = MockConnection::new();
        let cx = Cx::for_testing();
        let mut items = vec![Stranger];

        let err = unwrap_err(block_on(service.insert(&cx, &conn, items.iter_mut())));
        assert!(matches!(err, BulkError::Mapping(_)));
    }

    #[test]
    fn test_generation_error_rolls_back_call_transaction() {
        let options = BulkServiceOptions::builder()
            .failure_strategy(FailureStrategy::StopEverythingAndRollback)
            .register({
                let mut b = EntityProfile::<Account>::builder();
                b.property("email", |a| a.email.clone(), |a, v| a.email = v)
                    .unwrap();
                b.build().unwrap()
            })
            .unwrap()
            .build()
            .unwrap();
        let service = BulkService::new(Arc::new(options));
        let conn = MockConnection::new();
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io")];

        let err = unwrap_err(block_on(service.delete(&cx, &conn, items.iter_mut())));
        assert!(matches!(err, BulkError::Generation(_)));
        assert_eq!(conn.log(), vec!["begin", "rollback"]);
    }

    #[test]
    fn test_update_and_delete_without_returning_execute() {
        let service = service(FailureStrategy::StopEverything, None, |_| {});
        let conn = MockConnection::new();
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io"), account("b@x.io")];
        items[0].id = 7;
        items[1].id = 8;

        unwrap_outcome(block_on(service.update(&cx, &conn, items.iter_mut())));
        unwrap_outcome(block_on(service.delete(&cx, &conn, items.iter_mut())));

        let statements = conn.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("update \"account\" set \"email\" = @param_email_0"));
        assert_eq!(
            statements[1],
            "delete from \"account\" where \"id\" in (7, 8);"
        );
        assert_eq!((items[0].id, items[1].id), (7, 8));
    }

    #[test]
    fn test_upsert_writes_back_ids() {
        let service = service(FailureStrategy::StopEverything, None, |_| {});
        let conn = MockConnection::new();
        let cx = Cx::for_testing();
        let mut items = vec![account("a@x.io")];

        unwrap_outcome(block_on(service.upsert(&cx, &conn, items.iter_mut())));
        assert!(conn.statements()[0].contains(
            " on conflict (\"email\") do update set \"balance\" = excluded.\"balance\" \
             returning \"id\";"
        ));
        assert_eq!(items[0].id, 1);
    }
}
