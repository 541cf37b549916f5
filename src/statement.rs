use std::sync::Arc;

use tracing::warn;

use crate::catalog::StatementId;
use crate::params::ParameterSet;
use crate::types::SqlValue;

/// A statement compiled on one connection: the interned SQL, the parameter
/// count the driver reported at prepare time, and the bind buffers one
/// execution fills and clears.
///
/// Owned exclusively by its connection (and therefore by that connection's
/// thread); created during statement preparation, destroyed with the
/// connection.
#[derive(Debug)]
pub struct PreparedStatementHandle {
    id: StatementId,
    sql: Arc<str>,
    declared_count: usize,
    bound: Vec<Option<SqlValue>>,
}

impl PreparedStatementHandle {
    pub(crate) fn new(id: StatementId, sql: Arc<str>, declared_count: usize) -> Self {
        Self {
            id,
            sql,
            declared_count,
            bound: vec![None; declared_count],
        }
    }

    #[must_use]
    pub fn statement_id(&self) -> StatementId {
        self.id
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.declared_count
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub(crate) fn sql_arc(&self) -> Arc<str> {
        Arc::clone(&self.sql)
    }

    /// Copy every assigned slot of `params` into the bind buffers, in index
    /// order. Binding fewer than the declared count is permitted but
    /// logged; whether partial binds are acceptable is the caller's
    /// contract.
    pub(crate) fn bind_parameters(&mut self, params: &ParameterSet) {
        for (index, slot) in params.slots().iter().enumerate() {
            if let Some(value) = slot {
                self.set_parameter(index, value.clone());
            }
        }

        let assigned = params.assigned_count();
        if assigned < self.declared_count {
            warn!(
                "statement {}: bound {assigned} of {} declared parameters",
                self.id, self.declared_count
            );
        }
    }

    fn set_parameter(&mut self, index: usize, value: SqlValue) {
        assert!(
            index < self.declared_count,
            "statement {}: bind index {} beyond declared parameter count {}",
            self.id,
            index,
            self.declared_count
        );
        self.bound[index] = Some(value);
    }

    /// Release every bind buffer. Runs after every execution, success or
    /// failure, so no stale binding is visible to the next use. Safe to call
    /// repeatedly.
    pub(crate) fn clear_parameters(&mut self) {
        for slot in &mut self.bound {
            *slot = None;
        }
    }

    /// The bound values in index order, unassigned slots as NULL.
    pub(crate) fn bound_values(&self) -> Vec<SqlValue> {
        self.bound
            .iter()
            .map(|slot| slot.clone().unwrap_or(SqlValue::Null))
            .collect()
    }

    /// The SQL with `?` placeholders replaced by display forms of the bound
    /// values. Diagnostics only; the rendering is never executed and makes
    /// no quoting guarantees.
    #[must_use]
    pub fn render_sql(&self) -> String {
        let mut rendered = self.sql.to_string();
        let mut search_from = 0;
        for slot in &self.bound {
            let Some(value) = slot else { continue };
            let Some(found) = rendered[search_from..].find('?') else {
                break;
            };
            let at = search_from + found;
            let replacement = value.display_form();
            rendered.replace_range(at..=at, &replacement);
            search_from = at + replacement.len();
        }
        rendered
    }
}
