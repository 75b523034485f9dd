use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("retrieval unavailable during {stage}: {reason}")]
    Unavailable { stage: &'static str, reason: String },
}

impl RetrievalError {
    pub fn unavailable(stage: &'static str, err: &anyhow::Error) -> Self {
        Self::Unavailable {
            stage,
            reason: format!("{err:#}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error("answer generation failed: {0}")]
    Generation(String),
}

#[derive(Error, Debug)]
pub enum AnswerServiceError {
    #[error("answer service transport error: {0}")]
    Transport(String),
    #[error("answer service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("answer service response could not be decoded: {0}")]
    Decode(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
