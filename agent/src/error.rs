/// Every way an ask, a load or a save can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QaError {
    /// Bad input; nothing was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An ask is already running for this panel.
    #[error("a question is already being answered")]
    Busy,

    #[error("document {0} could not be found")]
    NotFound(String),

    #[error("document {0} is not a regular item")]
    InvalidTarget(String),

    #[error("no PDF attachment found for document {0}")]
    NoAttachment(String),

    #[error("this host cannot extract PDF text")]
    UnsupportedHost,

    #[error("no text could be extracted from the PDF")]
    EmptyResult,

    /// The extraction backend itself failed.
    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("answer service returned {status}: {body}")]
    RemoteError { status: u16, body: String },

    #[error("answer service returned an empty, unparsable body")]
    MalformedResponse,

    #[error("could not reach the answer service: {0}")]
    Transport(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("preference store failure: {0}")]
    PersistenceFailure(String),
}

impl QaError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True for failures that happen while resolving or reading the PDF.
    pub fn is_extraction(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::InvalidTarget(_)
                | Self::NoAttachment(_)
                | Self::UnsupportedHost
                | Self::EmptyResult
                | Self::Extraction(_)
        )
    }

    /// One line suitable for the panel.
    pub fn user_message(&self) -> String {
        match self {
            Self::RemoteError { status, body } if body.trim().is_empty() => {
                format!("Request failed: {status}")
            }
            Self::RemoteError { status, body } => format!("Request failed: {status} {}", body.trim()),
            other => {
                let text = other.to_string();
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => text,
                }
            }
        }
    }
}
