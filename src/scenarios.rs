//! End-to-end runs of the production loop against the scripted backend.
//!
//! These drive the real agent through whole mine-smelt-forge-sell cycles,
//! checking the task handovers and the final ledger rather than any single
//! module's behavior.
