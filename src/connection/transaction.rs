//! Transaction state machine and staged operations
//!
//! States: Active -> Prepared -> Committed, with RolledBack reachable from
//! both Active and Prepared. A commit straight from Active is a one-phase
//! commit.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{ConnectionError, ConnectionResult};

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    Active,
    Prepared,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    pub fn can_transition_to(&self, next: TransactionState) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (Active, Prepared)
                | (Active, Committed)
                | (Active, RolledBack)
                | (Prepared, Committed)
                | (Prepared, RolledBack)
        )
    }
}

/// A mutation recorded inside a transaction, applied at commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StagedOperation {
    Write {
        path: String,
        offset: u64,
        data: Vec<u8>,
    },
    Delete {
        path: String,
    },
    Copy {
        source: String,
        target: String,
    },
    Move {
        source: String,
        target: String,
    },
}

/// Journal record of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub state: TransactionState,
    pub staged: Vec<StagedOperation>,
}

impl TransactionRecord {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            staged: Vec::new(),
        }
    }

    /// Move to `next`, rejecting transitions the state machine forbids
    pub fn transition(&mut self, next: TransactionState) -> ConnectionResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ConnectionError::InvalidTransition {
                id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Stage a mutation; only allowed while Active
    pub fn stage(&mut self, op: StagedOperation) -> ConnectionResult<()> {
        if self.state != TransactionState::Active {
            return Err(ConnectionError::InvalidTransition {
                id: self.id,
                from: self.state,
                to: TransactionState::Active,
            });
        }
        self.staged.push(op);
        Ok(())
    }
}
