/// Errors from starting the notifier.
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("invalid notifier configuration: {0}")]
    InvalidConfig(String),

    #[error("notifier runtime unavailable: {0}")]
    Runtime(String),
}
