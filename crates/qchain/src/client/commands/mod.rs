pub mod autorun;
pub mod counter;
pub mod drop;
pub mod ledger;
pub mod submit;
