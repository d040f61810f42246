pub mod analysis;
pub mod answer_key;
pub mod option;
pub mod pass_result;
pub mod session;

pub use analysis::{Confidence, QuestionAnalysis};
pub use answer_key::{AnswerKey, AnswerKeyArtifact, SummaryCounts};
pub use option::OptionSet;
pub use pass_result::{normalize_per_question, PassFlags, PassResult};
pub use session::{SessionRecord, SessionSummary};
