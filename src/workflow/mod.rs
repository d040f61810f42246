pub mod final_submitter;
pub mod pass_ctx;
pub mod pass_runner;
pub mod recovery;

pub use final_submitter::{FinalOutcome, FinalSubmitter};
pub use pass_ctx::PassCtx;
pub use pass_runner::PassRunner;
pub use recovery::Recovery;
