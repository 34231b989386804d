//! Core business logic - the receipt reconciliation engine.
//!
//! Operations are free async functions taking their collaborators (database connection,
//! fiscal ticket source, settings) explicitly. Leaf to root: [`fiscal`] parses tickets,
//! [`matcher`] resolves line items against the catalog, [`status`] folds item states into a
//! receipt state, [`alias`] propagates alias decisions, and [`balance`] keeps user balances.

/// Product aliases and alias decision propagation
pub mod alias;
/// User balance calculation and reconciliation
pub mod balance;
/// Payout requests
pub mod cashback_request;
/// Fiscal ticket lookup and parsing
pub mod fiscal;
/// Line-item to product matching
pub mod matcher;
/// Product catalog
pub mod product;
/// Receipt submission and retrieval
pub mod receipt;
/// Receipt state machine
pub mod status;
/// User accounts
pub mod user;
