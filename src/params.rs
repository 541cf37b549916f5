use tracing::error;

use crate::catalog::StatementId;
use crate::types::SqlValue;

/// A detached, positionally-indexed bag of values to bind into one prepared
/// statement execution.
///
/// Capacity is fixed at construction to the statement's declared argument
/// count. Every slot is meant to be assigned exactly once before execution;
/// assigning a slot twice is a logic defect that is diagnosed (and the new
/// value wins), while assigning past the capacity is a fatal precondition
/// violation.
///
/// ```rust
/// use sql_workpool::{ParameterSet, SqlValue};
///
/// let mut params = ParameterSet::new(0, 2);
/// params.set(0, "a@b.com");
/// params.set(1, 42_i64);
/// assert_eq!(params.assigned_count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ParameterSet {
    statement_id: StatementId,
    slots: Vec<Option<SqlValue>>,
}

impl ParameterSet {
    /// A parameter set for `statement_id` with `capacity` declared slots.
    ///
    /// Usually obtained from [`WorkerPool::statement`](crate::WorkerPool::statement),
    /// which sizes it from the pool's shared parameter-count table.
    #[must_use]
    pub fn new(statement_id: StatementId, capacity: usize) -> Self {
        Self {
            statement_id,
            slots: vec![None; capacity],
        }
    }

    #[must_use]
    pub fn statement_id(&self) -> StatementId {
        self.statement_id
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Assign `value` to slot `index`.
    ///
    /// # Panics
    /// Panics if `index` is at or beyond the declared capacity.
    pub fn set<T: Into<SqlValue>>(&mut self, index: usize, value: T) {
        assert!(
            index < self.slots.len(),
            "statement {}: parameter index {} out of range ({} declared)",
            self.statement_id,
            index,
            self.slots.len()
        );
        if self.slots[index].is_some() {
            error!(
                "statement {}: parameter {} assigned twice",
                self.statement_id, index
            );
        }
        self.slots[index] = Some(value.into());
    }

    /// Assign NULL to slot `index`.
    ///
    /// # Panics
    /// Panics if `index` is at or beyond the declared capacity.
    pub fn set_null(&mut self, index: usize) {
        self.set(index, SqlValue::Null);
    }

    /// The value assigned to slot `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// How many slots have been assigned so far.
    #[must_use]
    pub fn assigned_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub(crate) fn slots(&self) -> &[Option<SqlValue>] {
        &self.slots
    }
}
