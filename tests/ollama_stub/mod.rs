use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum StubBehavior {
    /// Reply with `answer` when the prompt contains `needle`, else with `''`.
    AnswerWhenContains {
        needle: &'static str,
        answer: &'static str,
    },
    /// Fail with HTTP 500 on every request.
    AlwaysError,
    /// Reply 200 with a body that is not an Ollama response.
    Malformed,
}

pub struct OllamaStub {
    pub base_url: String,
    requests: Arc<AtomicUsize>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OllamaStub {
    pub fn spawn(behavior: StubBehavior) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start ollama stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post || path != "/api/generate" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }
                counter.fetch_add(1, Ordering::SeqCst);

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string(r#"{"error":"invalid json"}"#)
                                .with_status_code(400),
                        );
                        continue;
                    }
                };

                let Some(prompt) = parsed.get("prompt").and_then(|v| v.as_str()) else {
                    let _ = request.respond(
                        tiny_http::Response::from_string(r#"{"error":"missing prompt"}"#)
                            .with_status_code(400),
                    );
                    continue;
                };

                let (status, response_body) = match behavior {
                    StubBehavior::AnswerWhenContains { needle, answer } => {
                        let text = if prompt.contains(needle) { answer } else { "''" };
                        let body = serde_json::json!({
                            "model": parsed.get("model").cloned().unwrap_or(Value::String("stub-model".to_owned())),
                            "created_at": "2026-01-01T00:00:00Z",
                            "response": text,
                            "done": true,
                        });
                        (200, body.to_string())
                    }
                    StubBehavior::AlwaysError => {
                        (500, r#"{"error":"model runner crashed"}"#.to_owned())
                    }
                    StubBehavior::Malformed => (200, r#"{"done":true}"#.to_owned()),
                };

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(response_body)
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[allow(dead_code)]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for OllamaStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
