use crate::llm::LlmError;
use crate::market::BrokerError;

/// A dispatch failure: a collaborator fault or cancellation. User-input mistakes never end
/// up here; they become ordinary replies.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to {op}: {source}")]
    Brokerage {
        op: &'static str,
        #[source]
        source: BrokerError,
    },
    #[error("failed to process text: {0}")]
    Language(#[from] LlmError),
    #[error("unexpected callback action: {0}")]
    UnexpectedCallback(String),
    #[error("dispatch cancelled")]
    Cancelled,
}

impl DispatchError {
    pub(crate) fn brokerage(op: &'static str) -> impl FnOnce(BrokerError) -> Self {
        move |source| DispatchError::Brokerage { op, source }
    }
}
