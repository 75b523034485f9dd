use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::AnswerServiceError;
use crate::model::{AskResponse, EvaluationCase, QuestionEntry};
use crate::pipeline::AnswerPipeline;

use super::scoring::{faithfulness, is_hallucination, retrieval_hit};

pub const DEFAULT_ANSWER_TIMEOUT_SECS: u64 = 60;

pub trait AnswerService {
    fn ask(&self, question: &str) -> Result<AskResponse, AnswerServiceError>;
}

pub struct LocalAnswerService {
    pipeline: AnswerPipeline,
}

impl LocalAnswerService {
    pub fn new(pipeline: AnswerPipeline) -> Self {
        Self { pipeline }
    }
}

impl AnswerService for LocalAnswerService {
    fn ask(&self, question: &str) -> Result<AskResponse, AnswerServiceError> {
        Ok(self.pipeline.ask_question(question, true)?)
    }
}

#[derive(Serialize)]
struct AskRequest<'a> {
    question: &'a str,
    debug: bool,
}

pub struct HttpAnswerService {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpAnswerService {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        Self::with_client_builder(
            endpoint,
            reqwest::blocking::Client::builder().timeout(timeout),
        )
    }

    fn with_client_builder(
        endpoint: &str,
        builder: reqwest::blocking::ClientBuilder,
    ) -> Result<Self> {
        let client = builder
            .build()
            .context("failed to build answer-service http client")?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

impl AnswerService for HttpAnswerService {
    fn ask(&self, question: &str) -> Result<AskResponse, AnswerServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&AskRequest {
                question,
                debug: true,
            })
            .send()
            .map_err(|err| AnswerServiceError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| AnswerServiceError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(AnswerServiceError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        decode_ask_response(&body)
    }
}

fn decode_ask_response(body: &str) -> Result<AskResponse, AnswerServiceError> {
    serde_json::from_str(body).map_err(|err| AnswerServiceError::Decode(err.to_string()))
}

pub fn score_case(question: &QuestionEntry, response: AskResponse) -> EvaluationCase {
    let hit = retrieval_hit(&response.answer, &response.fragments);
    let faith = faithfulness(&response.answer, &response.fragments);
    let hallucination = is_hallucination(&response.answer, &response.fragments);

    EvaluationCase {
        question: question.question.clone(),
        question_type: question.question_type.clone(),
        answer: response.answer,
        citations: response.citations,
        fragments: response.fragments,
        error: None,
        retrieval_hit: hit,
        faithfulness: faith,
        hallucination,
    }
}

pub fn failed_case(question: &QuestionEntry, error: &AnswerServiceError) -> EvaluationCase {
    EvaluationCase {
        question: question.question.clone(),
        question_type: question.question_type.clone(),
        answer: String::new(),
        citations: Vec::new(),
        fragments: Vec::new(),
        error: Some(error.to_string()),
        retrieval_hit: false,
        faithfulness: 0.0,
        hallucination: true,
    }
}

pub fn run_cases(service: &dyn AnswerService, questions: &[QuestionEntry]) -> Vec<EvaluationCase> {
    let total = questions.len();
    let mut results = Vec::<EvaluationCase>::with_capacity(total);

    for (index, question) in questions.iter().enumerate() {
        let case = match service.ask(&question.question) {
            Ok(response) => score_case(question, response),
            Err(err) => {
                warn!(
                    case = index + 1,
                    total,
                    question = %preview(&question.question, 50),
                    error = %err,
                    "answer service failed; recording failed case"
                );
                results.push(failed_case(question, &err));
                continue;
            }
        };

        info!(
            "[{}/{}] {}: {}... -> hit={}, faith={:.2}, hall={}",
            index + 1,
            total,
            case.question_type,
            preview(&case.question, 50),
            case.retrieval_hit,
            case.faithfulness,
            case.hallucination
        );
        results.push(case);
    }

    results
}

pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    use super::*;
    use crate::model::Fragment;
    use crate::pipeline::REFUSAL;

    struct ScriptedService {
        answers: HashMap<String, AskResponse>,
    }

    impl AnswerService for ScriptedService {
        fn ask(&self, question: &str) -> Result<AskResponse, AnswerServiceError> {
            self.answers
                .get(question)
                .cloned()
                .ok_or_else(|| AnswerServiceError::Transport("connection refused".to_string()))
        }
    }

    fn question(text: &str) -> QuestionEntry {
        QuestionEntry {
            question: text.to_string(),
            question_type: "factual".to_string(),
        }
    }

    fn response(answer: &str, fragment_text: &str) -> AskResponse {
        AskResponse {
            answer: answer.to_string(),
            citations: vec!["a.pdf page 1".to_string()],
            fragments: vec![Fragment::new("a.pdf", 0, fragment_text)],
        }
    }

    #[test]
    fn failed_requests_become_failed_cases_and_batch_continues() {
        let mut answers = HashMap::new();
        answers.insert(
            "interval?".to_string(),
            response("Inspect every 50 hours.", "inspect every 50 hours"),
        );
        let service = ScriptedService { answers };

        let results = run_cases(&service, &[question("unreachable?"), question("interval?")]);
        assert_eq!(results.len(), 2);

        let failed = &results[0];
        assert!(failed.hallucination);
        assert!(!failed.retrieval_hit);
        assert_eq!(failed.faithfulness, 0.0);
        assert!(failed.answer.is_empty());
        assert!(failed.citations.is_empty() && failed.fragments.is_empty());
        assert!(
            failed
                .error
                .as_deref()
                .is_some_and(|error| error.contains("connection refused"))
        );

        let scored = &results[1];
        assert!(scored.retrieval_hit);
        assert_eq!(scored.faithfulness, 1.0);
        assert!(!scored.hallucination);
        assert!(scored.error.is_none());
    }

    #[test]
    fn refusal_with_no_fragments_scores_as_faithful_miss() {
        let case = score_case(
            &question("What is the tail number?"),
            AskResponse {
                answer: REFUSAL.to_string(),
                citations: Vec::new(),
                fragments: Vec::new(),
            },
        );
        assert!(!case.retrieval_hit);
        assert_eq!(case.faithfulness, 1.0);
        assert!(!case.hallucination);
    }

    #[test]
    fn decode_reports_malformed_bodies() {
        let error = decode_ask_response("<html>").expect_err("html is not json");
        assert!(matches!(error, AnswerServiceError::Decode(_)));

        let decoded = decode_ask_response(r#"{"answer": "ok", "citations": [], "chunks": []}"#)
            .expect("minimal body decodes");
        assert_eq!(decoded.answer, "ok");
    }

    #[test]
    fn body_without_answer_scores_as_empty_answer() {
        let decoded = decode_ask_response(r#"{"detail": "bad"}"#).expect("body decodes");
        assert!(decoded.answer.is_empty());

        let case = score_case(&question("interval?"), decoded);
        assert!(case.error.is_none());
        assert!(case.hallucination);
        assert_eq!(case.faithfulness, 0.0);
    }

    fn loopback_service(endpoint: &str, timeout: Duration) -> HttpAnswerService {
        HttpAnswerService::with_client_builder(
            endpoint,
            reqwest::blocking::Client::builder()
                .timeout(timeout)
                .no_proxy(),
        )
        .expect("client builds")
    }

    fn read_request(stream: &mut TcpStream) {
        let mut received = Vec::<u8>::new();
        let mut buf = [0_u8; 1024];
        loop {
            let count = stream.read(&mut buf).expect("read request");
            if count == 0 {
                return;
            }
            received.extend_from_slice(&buf[..count]);

            let Some(header_end) = received
                .windows(4)
                .position(|window| window == b"\r\n\r\n")
            else {
                continue;
            };
            let headers = String::from_utf8_lossy(&received[..header_end]);
            let body_len = headers
                .to_ascii_lowercase()
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if received.len() >= header_end + 4 + body_len {
                return;
            }
        }
    }

    fn serve_once(status_line: &str, body: &str) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let endpoint = format!("http://{}/ask", listener.local_addr().expect("local addr"));
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            read_request(&mut stream);
            stream.write_all(response.as_bytes()).expect("write response");
        });
        (endpoint, handle)
    }

    #[test]
    fn silent_endpoint_times_out_as_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let endpoint = format!("http://{}/ask", listener.local_addr().expect("local addr"));
        let service = loopback_service(&endpoint, Duration::from_millis(100));

        let error = service.ask("interval?").expect_err("no response arrives");
        assert!(matches!(error, AnswerServiceError::Transport(_)), "{error}");
        drop(listener);
    }

    #[test]
    fn non_success_status_is_reported_with_body() {
        let (endpoint, server) = serve_once("500 Internal Server Error", "boom");
        let service = loopback_service(&endpoint, Duration::from_secs(5));

        let error = service.ask("interval?").expect_err("server error");
        server.join().expect("server thread");
        assert!(
            matches!(error, AnswerServiceError::Status { status: 500, ref body } if body == "boom"),
            "{error}"
        );
    }

    #[test]
    fn success_body_with_chunks_decodes() {
        let body = r#"{"answer": "Every 50 hours.", "citations": ["a.pdf page 1"], "chunks": [{"doc": "a.pdf", "page": 0, "text": "inspect every 50 hours"}]}"#;
        let (endpoint, server) = serve_once("200 OK", body);
        let service = loopback_service(&endpoint, Duration::from_secs(5));

        let response = service.ask("interval?").expect("answer decodes");
        server.join().expect("server thread");
        assert_eq!(response.answer, "Every 50 hours.");
        assert_eq!(response.citations, vec!["a.pdf page 1"]);
        assert_eq!(
            response.fragments,
            vec![Fragment::new("a.pdf", 0, "inspect every 50 hours")]
        );
    }

    #[test]
    fn preview_truncates_on_characters() {
        assert_eq!(preview("héllo world", 5), "héllo");
        assert_eq!(preview("short", 50), "short");
    }
}
