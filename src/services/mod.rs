pub(crate) mod aggregation;
pub(crate) mod ownership;
pub(crate) mod recognition;
pub(crate) mod reconciliation;
pub(crate) mod reports;
pub(crate) mod run_lease;
pub(crate) mod scratch;
pub(crate) mod score_store;
