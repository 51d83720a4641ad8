pub mod ledger;
pub mod trigger;

pub use ledger::{RetryCounter, RetryLedger, RetryOutcome};
pub use trigger::{TriggerDirective, TriggerError, TriggerKind};
