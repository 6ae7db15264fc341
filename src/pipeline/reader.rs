//! Reader backed by an HTTP question-answering endpoint.
//!
//! The endpoint follows the common inference API shape for extractive QA:
//!
//! ```text
//! POST <url>
//! {"inputs": {"question": "...", "context": "..."}}
//!
//! 200 OK
//! {"answer": "...", "score": 0.93, "start": 12, "end": 27}
//! ```
//!
//! Some deployments wrap the answer in a one-element array; both shapes are
//! accepted. `start` and `end` are character offsets into the context.
//! Documents are read one at a time with no retries and no timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{PipelineError, PipelineResult, Reader};
use crate::models::{sort_by_score, Answer, Document, Span};

#[derive(Debug, Serialize)]
struct QaRequest<'a> {
    inputs: QaInputs<'a>,
}

#[derive(Debug, Serialize)]
struct QaInputs<'a> {
    question: &'a str,
    context: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct QaSpan {
    answer: String,
    score: f32,
    start: usize,
    end: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QaResponse {
    One(QaSpan),
    Many(Vec<QaSpan>),
}

impl QaResponse {
    fn best(self) -> Option<QaSpan> {
        match self {
            QaResponse::One(span) => Some(span),
            QaResponse::Many(spans) => spans
                .into_iter()
                .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal)),
        }
    }
}

/// Reader calling an external extractive QA model over HTTP.
#[derive(Debug, Clone)]
pub struct HttpReader {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpReader {
    pub fn new(url: String, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            token,
        }
    }

    async fn read_one(&self, question: &str, document: &Document) -> PipelineResult<Option<Answer>> {
        let body = QaRequest {
            inputs: QaInputs {
                question,
                context: &document.content,
            },
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::ReaderError(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::ReaderError(format!("HTTP {}: {}", status, text)));
        }

        let parsed: QaResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::InvalidResponse(e.to_string()))?;

        let Some(span) = parsed.best() else {
            warn!("Reader returned no answer for document {}", document.id);
            return Ok(None);
        };

        Ok(Some(Answer {
            answer: span.answer,
            score: span.score,
            context: document.content.clone(),
            document_id: document.id.clone(),
            offsets_in_document: Span::new(span.start, span.end),
            meta: document.meta.clone(),
        }))
    }
}

#[async_trait]
impl Reader for HttpReader {
    async fn read(
        &self,
        question: &str,
        documents: &[Document],
        top_k: usize,
    ) -> PipelineResult<Vec<Answer>> {
        let mut answers = Vec::with_capacity(documents.len());
        for document in documents {
            if let Some(answer) = self.read_one(question, document).await? {
                debug!("Document {}: {:?} ({:.3})", document.id, answer.answer, answer.score);
                answers.push(answer);
            }
        }

        sort_by_score(&mut answers);
        answers.truncate(top_k);
        Ok(answers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMeta;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_document(id: &str, content: &str) -> Document {
        Document {
            id: id.to_string(),
            content: content.to_string(),
            content_type: "text".to_string(),
            meta: DocumentMeta {
                name: "A paper".to_string(),
                categories: "cs.CL".to_string(),
                update_date: String::new(),
            },
            score: 80.0,
            embedding: None,
        }
    }

    #[tokio::test]
    async fn test_read_maps_response_to_answer() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/qa"))
            .and(header("Authorization", "Bearer test_token"))
            .and(body_partial_json(json!({
                "inputs": {"question": "What is BERT?", "context": "BERT is a language model."}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": "a language model",
                "score": 0.87,
                "start": 8,
                "end": 24
            })))
            .mount(&mock_server)
            .await;

        let reader = HttpReader::new(
            format!("{}/qa", mock_server.uri()),
            Some("test_token".to_string()),
        );
        let docs = vec![create_test_document("1810.04805", "BERT is a language model.")];
        let answers = reader.read("What is BERT?", &docs, 5).await.unwrap();

        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].answer, "a language model");
        assert_eq!(answers[0].document_id, "1810.04805");
        assert_eq!(answers[0].offsets_in_document, Span::new(8, 24));
        assert_eq!(answers[0].context, "BERT is a language model.");
        assert_eq!(answers[0].meta.categories, "cs.CL");
    }

    #[tokio::test]
    async fn test_read_accepts_array_and_keeps_top_k() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/qa"))
            .and(body_partial_json(json!({"inputs": {"context": "first"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"answer": "first", "score": 0.2, "start": 0, "end": 5}
            ])))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/qa"))
            .and(body_partial_json(json!({"inputs": {"context": "second"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"answer": "sec", "score": 0.4, "start": 0, "end": 3},
                {"answer": "second", "score": 0.7, "start": 0, "end": 6}
            ])))
            .mount(&mock_server)
            .await;

        let reader = HttpReader::new(format!("{}/qa", mock_server.uri()), None);
        let docs = vec![
            create_test_document("a", "first"),
            create_test_document("b", "second"),
        ];
        let answers = reader.read("q", &docs, 1).await.unwrap();

        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].answer, "second");
        assert_eq!(answers[0].document_id, "b");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/qa"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
            .mount(&mock_server)
            .await;

        let reader = HttpReader::new(format!("{}/qa", mock_server.uri()), None);
        let docs = vec![create_test_document("a", "text")];
        let result = reader.read("q", &docs, 5).await;

        match result {
            Err(PipelineError::ReaderError(msg)) => assert!(msg.contains("503")),
            other => panic!("Expected ReaderError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/qa"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "nope"})))
            .mount(&mock_server)
            .await;

        let reader = HttpReader::new(format!("{}/qa", mock_server.uri()), None);
        let docs = vec![create_test_document("a", "text")];
        let result = reader.read("q", &docs, 5).await;
        assert!(matches!(result, Err(PipelineError::InvalidResponse(_))));
    }
}
