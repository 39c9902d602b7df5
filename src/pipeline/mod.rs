pub mod analysis;
pub mod structuring;
pub mod enhancement;
pub mod summary;
pub mod storage; // Fixed-width projection of records
pub mod store; // Staging and final persistence tiers
pub mod processor; // End-to-end annotation orchestrator
