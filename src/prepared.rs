//! Prepared-statement handle, per spec §3/§4.8.
//!
//! Grounded in `zero-mysql`'s `src/prepared.rs`, fleshed out with the
//! column/parameter metadata the teacher's stub only gestures at.

use crate::protocol::ColumnDefinition;

/// { server-assigned id, parameter count, column count }, per spec §3.
/// Column metadata is cached once (it doesn't change across executions)
/// so repeated executes on MariaDB-style servers that only resend it on
/// the first resultset can reuse it.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub(crate) statement_id: u32,
    pub(crate) param_count: usize,
    pub(crate) column_count: usize,
    pub(crate) columns: Option<Vec<ColumnDefinition>>,
}

impl PreparedStatement {
    pub(crate) fn new(statement_id: u32, param_count: usize, column_count: usize) -> Self {
        Self {
            statement_id,
            param_count,
            column_count,
            columns: None,
        }
    }

    pub fn statement_id(&self) -> u32 {
        self.statement_id
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn columns(&self) -> Option<&[ColumnDefinition]> {
        self.columns.as_deref()
    }
}
