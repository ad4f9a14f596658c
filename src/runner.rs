//! Transaction orchestration: run a unit of work directly or through the
//! connection's transactional primitive, then report the outcome.

use crate::connection::TransactionManager;
use crate::core::{Error, Result};
use std::future::Future;
use tracing::{Instrument, Level, event, info_span};

pub type SuccessHook<'h, T> = Box<dyn FnOnce(&T) + Send + 'h>;
pub type FailureHook<'h> = Box<dyn FnOnce(&Error) + Send + 'h>;

/// Outcome observers. Each fires at most once and neither can change the
/// value or error the runner returns.
pub struct Hooks<'h, T> {
    on_success: Option<SuccessHook<'h, T>>,
    on_failure: Option<FailureHook<'h>>,
}

impl<T> Default for Hooks<'_, T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_failure: None,
        }
    }
}

impl<'h, T> Hooks<'h, T> {
    pub fn none() -> Self {
        Self::default()
    }

    /// Replaces any previously registered success hook.
    pub fn on_success(mut self, hook: impl FnOnce(&T) + Send + 'h) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    /// Replaces any previously registered failure hook.
    pub fn on_failure(mut self, hook: impl FnOnce(&Error) + Send + 'h) -> Self {
        self.on_failure = Some(Box::new(hook));
        self
    }

    fn report(self, outcome: &Result<T>) {
        match outcome {
            Ok(value) => {
                if let Some(hook) = self.on_success {
                    hook(value);
                }
            }
            Err(err) => {
                if let Some(hook) = self.on_failure {
                    hook(err);
                }
            }
        }
    }
}

/// Attempt budgets below one are treated as one.
pub fn clamp_attempts(attempts: usize) -> usize {
    if attempts == 0 {
        event!(Level::WARN, attempts, "attempt budget below 1, using 1");
        return 1;
    }
    attempts
}

pub struct TransactionRunner;

impl TransactionRunner {
    /// Runs `op` once on `conn` when `wrapped` is false, or through
    /// [`TransactionManager::run_in_transaction`] with `attempts` tries when
    /// it is true.
    ///
    /// Hooks observe the final outcome; the outcome itself is returned as is.
    pub async fn run<C, T, F, Fut>(
        conn: &C,
        op: F,
        wrapped: bool,
        attempts: usize,
        hooks: Hooks<'_, T>,
    ) -> Result<T>
    where
        C: TransactionManager,
        T: Send,
        F: FnMut(C) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let attempts = clamp_attempts(attempts);
        let span = info_span!(
            "transaction.run",
            wrapped,
            attempts,
            joined = conn.in_transaction()
        );

        let outcome = async {
            if wrapped {
                conn.run_in_transaction(attempts, op).await
            } else {
                let mut op = op;
                op(conn.clone()).await
            }
        }
        .instrument(span.clone())
        .await;

        span.in_scope(|| match &outcome {
            Ok(_) => event!(Level::DEBUG, "unit of work succeeded"),
            Err(err) => event!(Level::WARN, error = %err, "unit of work failed"),
        });

        hooks.report(&outcome);
        outcome
    }
}

/// Runs `op` in a transaction with a single attempt and no hooks.
pub async fn transaction<C, T, F, Fut>(conn: &C, op: F) -> Result<T>
where
    C: TransactionManager,
    T: Send,
    F: FnMut(C) -> Fut + Send,
    Fut: Future<Output = Result<T>> + Send,
{
    TransactionRunner::run(conn, op, true, 1, Hooks::none()).await
}

/// Runs `op` in a transaction with an explicit attempt budget and hooks.
pub async fn transaction_with<C, T, F, Fut>(
    conn: &C,
    attempts: usize,
    hooks: Hooks<'_, T>,
    op: F,
) -> Result<T>
where
    C: TransactionManager,
    T: Send,
    F: FnMut(C) -> Fut + Send,
    Fut: Future<Output = Result<T>> + Send,
{
    TransactionRunner::run(conn, op, true, attempts, hooks).await
}
