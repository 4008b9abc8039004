//! Property-based invariant suites for the Tripcoin validator core.
//!
//! Properties covered:
//! 1. Agreement: no two replicas finalize different hashes at a height.
//! 2. Table bounds: vote tables never exceed N or double-count a voter.
//! 3. Mempool bounds: size cap and hash uniqueness under any op sequence.
//! 4. Pipeline idempotence: at-least-once delivery applies each message
//!    exactly once.

pub mod consensus_invariants;
pub mod mempool_invariants;
pub mod pipeline_invariants;
