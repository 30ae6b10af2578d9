use thiserror::Error;

#[derive(Debug, Error)]
pub enum TfConvergeError {
    #[error(transparent)]
    Config(#[from] crate::scenario::ConfigError),

    #[error(transparent)]
    Engine(#[from] crate::engine::EngineError),

    #[error("could not parse change summary: {0}")]
    Parse(#[from] crate::summary::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),

    #[error("{failed} of {total} scenario(s) failed")]
    ScenariosFailed { failed: usize, total: usize },
}
