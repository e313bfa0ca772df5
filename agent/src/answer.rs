use crate::QaError;
use records::{AnswerPayload, AnswerRequest};
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct AnswerBody<'a> {
    model: Option<&'a str>,
    question: &'a str,
    document: &'a str,
}

/// HTTP client for the remote answer service.
///
/// One POST per call, no retries and no timeout of its own: callers bound
/// the call by cancelling the token they pass in.
#[derive(Clone, Default)]
pub struct AnswerClient {
    http: reqwest::Client,
}

impl AnswerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn send(
        &self,
        request: &AnswerRequest,
        cancel: &CancellationToken,
    ) -> Result<AnswerPayload, QaError> {
        let endpoint = validate(request)?;
        if cancel.is_cancelled() {
            return Err(QaError::Cancelled);
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(%endpoint, "answer: request aborted");
                Err(QaError::Cancelled)
            }
            result = self.exchange(endpoint.clone(), request) => result,
        }
    }

    async fn exchange(&self, endpoint: Url, request: &AnswerRequest) -> Result<AnswerPayload, QaError> {
        let body = AnswerBody {
            model: non_blank(request.model.as_deref()),
            question: &request.question,
            document: &request.document_text,
        };
        let mut builder = self.http.post(endpoint.clone()).json(&body);
        if let Some(key) = non_blank(request.api_key.as_deref()) {
            builder = builder.bearer_auth(key);
        }

        debug!(%endpoint, document_chars = request.document_text.len(), "answer: sending");
        let response = builder
            .send()
            .await
            .map_err(|e| QaError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(text) => text,
                Err(_) => status.canonical_reason().unwrap_or_default().to_string(),
            };
            warn!(%endpoint, status = status.as_u16(), "answer: service returned an error");
            return Err(QaError::RemoteError {
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| QaError::Transport(e.to_string()))?;
        parse_answer_body(&text)
    }
}

/// Turns a 2xx body into a payload. Plain text is accepted as the answer itself.
pub fn parse_answer_body(text: &str) -> Result<AnswerPayload, QaError> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(AnswerPayload::new(value)),
        Err(_) if !text.trim().is_empty() => Ok(AnswerPayload::from_text(text)),
        Err(_) => Err(QaError::MalformedResponse),
    }
}

fn validate(request: &AnswerRequest) -> Result<Url, QaError> {
    let endpoint = request.endpoint.trim();
    if endpoint.is_empty() {
        return Err(QaError::InvalidRequest("no answer service endpoint is configured".to_string()));
    }
    if request.question.trim().is_empty() {
        return Err(QaError::InvalidRequest("the question is empty".to_string()));
    }
    Url::parse(endpoint)
        .map_err(|e| QaError::InvalidRequest(format!("endpoint '{endpoint}' is not a valid URL: {e}")))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
