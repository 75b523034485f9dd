mod harness;
mod report;
mod scoring;

pub use harness::{
    AnswerService, DEFAULT_ANSWER_TIMEOUT_SECS, HttpAnswerService, LocalAnswerService, run_cases,
};
pub use report::{EvaluationReport, build_report, percent, render_markdown};
