/// Anonymity set construction for transfers
pub mod anonymity;
/// Proof latency bounds used for admission control
pub mod timing;

pub use anonymity::{AnonymitySet, AnonymitySetBuilder, validate_set_size};
pub use timing::{BURN_PROOF_WINDOW_MS, ProofTimingEstimator, SUBMISSION_OVERHEAD_MS};
