//! Rule engine (C4): evaluates governance rules against tool invocations
//! and resolves conflicting field-level decisions.

pub mod engine;
pub mod evaluate;
pub mod store;

pub use engine::{RuleAuditRecord, RuleEngine};
pub use evaluate::EvaluationResult;
pub use store::RuleStore;
