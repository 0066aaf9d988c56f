//! Transactions: atomic groups of optimistic mutations.

mod manager;
mod state;

pub use manager::TransactionManager;
pub use state::{Mutation, MutationAck, MutationKind, Transaction, TransactionState};
