//! Work functions: the per-item predicate each worker applies to its range.

use anyhow::Result;
use clap::ValueEnum;
use serde::Deserialize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Per-item evaluation `(item) -> bool`. Must be callable from many workers at once
/// without coordination.
///
/// Any `Fn(i64) -> bool + Send + Sync` is a work function. Wrap `Fn(i64) -> Result<bool>`
/// in [`Fallible`] to report per-item failures.
pub trait WorkFunction: Send + Sync {
    fn evaluate(&self, item: i64) -> Result<bool>;
}

impl<F> WorkFunction for F
where
    F: Fn(i64) -> bool + Send + Sync,
{
    fn evaluate(&self, item: i64) -> Result<bool> {
        Ok(self(item))
    }
}

/// Shared handle passed to every worker.
pub type SharedWorkFunction = Arc<dyn WorkFunction>;

/// Adapter for fallible predicates.
pub struct Fallible<F>(pub F);

impl<F> WorkFunction for Fallible<F>
where
    F: Fn(i64) -> Result<bool> + Send + Sync,
{
    fn evaluate(&self, item: i64) -> Result<bool> {
        (self.0)(item)
    }
}

/// Adds a fixed simulated cost to every evaluation (the cost is paid even for rejected items).
/// The sleep is part of the evaluation and is not interrupted by cancellation.
pub struct Throttled<W> {
    inner: W,
    cost: Duration,
}

impl<W: WorkFunction> Throttled<W> {
    pub fn new(inner: W, cost: Duration) -> Self {
        Self { inner, cost }
    }
}

impl<W: WorkFunction> WorkFunction for Throttled<W> {
    fn evaluate(&self, item: i64) -> Result<bool> {
        let accepted = self.inner.evaluate(item)?;
        thread::sleep(self.cost);
        Ok(accepted)
    }
}

/// Trial division up to `sqrt(n)`. 0, 1 and negatives are not prime.
pub fn is_prime(n: i64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let mut d = 5_i64;
    // d <= n / d avoids overflow of d * d near i64::MAX
    while d <= n / d {
        if n % d == 0 || n % (d + 2) == 0 {
            return false;
        }
        d += 6;
    }
    true
}

pub fn is_even(n: i64) -> bool {
    n % 2 == 0
}

pub fn is_odd(n: i64) -> bool {
    n % 2 != 0
}

/// Perfect square (0 and 1 included; negatives never).
pub fn is_square(n: i64) -> bool {
    if n < 0 {
        return false;
    }
    let r = (n as f64).sqrt() as i64;
    // float sqrt can be off by one for large n
    (r.saturating_sub(1)..=r.saturating_add(1)).any(|c| c.checked_mul(c) == Some(n))
}

/// Built-in work functions, selectable by name from the CLI and config file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkKind {
    #[default]
    Prime,
    Even,
    Odd,
    Square,
}

impl WorkKind {
    pub fn predicate(self) -> fn(i64) -> bool {
        match self {
            WorkKind::Prime => is_prime,
            WorkKind::Even => is_even,
            WorkKind::Odd => is_odd,
            WorkKind::Square => is_square,
        }
    }

    /// Build the shared work function, throttled when `item_cost` is non-zero.
    pub fn build(self, item_cost: Duration) -> SharedWorkFunction {
        let f = self.predicate();
        if item_cost.is_zero() {
            Arc::new(f)
        } else {
            Arc::new(Throttled::new(f, item_cost))
        }
    }
}
