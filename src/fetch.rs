use std::time::Duration;

use tokio::time::Instant;

/// Outcome of a single page load.
///
/// A page that loaded but rendered nothing is `Html(String::new())`; it is
/// never reported as `TimedOut`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Html(String),
    TimedOut,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("launch browser: {0}")]
    Launch(String),
    #[error("navigate to {url}: {message}")]
    Navigation { url: String, message: String },
    #[error("browser session: {0}")]
    Browser(String),
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub headless: bool,
    pub max_duration: Duration,
    pub poll_interval: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            headless: true,
            max_duration: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[async_trait::async_trait]
pub trait BrowserBackend: Send + Sync {
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserSession>, FetchError>;
}

/// One isolated browser instance, owned by exactly one `fetch` call.
#[async_trait::async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError>;

    /// Current value of `document.readyState`.
    async fn ready_state(&mut self) -> Result<String, FetchError>;

    async fn page_source(&mut self) -> Result<String, FetchError>;

    async fn close(self: Box<Self>) -> Result<(), FetchError>;
}

pub async fn fetch(
    backend: &dyn BrowserBackend,
    url: &str,
    settings: &FetchSettings,
) -> Result<FetchResult, FetchError> {
    tracing::info!(url, headless = settings.headless, "launching browser");
    let mut session = backend.launch(settings.headless).await?;

    let started_at = Instant::now();
    let result = load_page(session.as_mut(), url, settings, started_at).await;

    match session.close().await {
        Ok(()) => tracing::debug!(url, "browser closed"),
        Err(err) => tracing::warn!(url, %err, "failed to close browser session"),
    }

    result
}

async fn load_page(
    session: &mut dyn BrowserSession,
    url: &str,
    settings: &FetchSettings,
    started_at: Instant,
) -> Result<FetchResult, FetchError> {
    if started_at.elapsed() >= settings.max_duration {
        return Ok(timed_out(url, started_at, settings));
    }

    // Navigation counts against the same deadline as the readiness poll.
    match started_at.checked_add(settings.max_duration) {
        Some(deadline) => match tokio::time::timeout_at(deadline, session.navigate(url)).await {
            Ok(navigated) => navigated?,
            Err(_) => return Ok(timed_out(url, started_at, settings)),
        },
        None => session.navigate(url).await?,
    }

    loop {
        if started_at.elapsed() >= settings.max_duration {
            return Ok(timed_out(url, started_at, settings));
        }

        let state = session.ready_state().await?;
        if state == "complete" {
            break;
        }

        tracing::trace!(url, state = %state, "page not ready yet");
        tokio::time::sleep(settings.poll_interval).await;
    }

    tracing::info!(
        url,
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "page loaded"
    );
    let html = session.page_source().await?;
    Ok(FetchResult::Html(html))
}

fn timed_out(url: &str, started_at: Instant, settings: &FetchSettings) -> FetchResult {
    tracing::warn!(
        url,
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        max_duration_secs = settings.max_duration.as_secs(),
        "page did not finish loading before the deadline"
    );
    FetchResult::TimedOut
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Default)]
    struct Calls {
        launches: usize,
        navigations: usize,
        closes: usize,
        ready_checks: usize,
    }

    struct ScriptedBackend {
        states: Vec<&'static str>,
        html: &'static str,
        fail_navigation: bool,
        navigation_time: Duration,
        calls: Arc<Mutex<Calls>>,
    }

    impl ScriptedBackend {
        fn new(states: Vec<&'static str>, html: &'static str) -> Self {
            Self {
                states,
                html,
                fail_navigation: false,
                navigation_time: Duration::ZERO,
                calls: Arc::new(Mutex::new(Calls::default())),
            }
        }
    }

    struct ScriptedSession {
        states: VecDeque<&'static str>,
        html: &'static str,
        fail_navigation: bool,
        navigation_time: Duration,
        calls: Arc<Mutex<Calls>>,
    }

    #[async_trait::async_trait]
    impl BrowserBackend for ScriptedBackend {
        async fn launch(&self, _headless: bool) -> Result<Box<dyn BrowserSession>, FetchError> {
            self.calls.lock().unwrap().launches += 1;
            Ok(Box::new(ScriptedSession {
                states: self.states.iter().copied().collect(),
                html: self.html,
                fail_navigation: self.fail_navigation,
                navigation_time: self.navigation_time,
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    #[async_trait::async_trait]
    impl BrowserSession for ScriptedSession {
        async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
            self.calls.lock().unwrap().navigations += 1;
            if !self.navigation_time.is_zero() {
                tokio::time::sleep(self.navigation_time).await;
            }
            if self.fail_navigation {
                return Err(FetchError::Navigation {
                    url: url.to_owned(),
                    message: "net::ERR_NAME_NOT_RESOLVED".to_owned(),
                });
            }
            Ok(())
        }

        async fn ready_state(&mut self) -> Result<String, FetchError> {
            self.calls.lock().unwrap().ready_checks += 1;
            // The last scripted state repeats forever.
            let state = if self.states.len() > 1 {
                self.states.pop_front()
            } else {
                self.states.front().copied()
            };
            Ok(state.unwrap_or("loading").to_owned())
        }

        async fn page_source(&mut self) -> Result<String, FetchError> {
            Ok(self.html.to_owned())
        }

        async fn close(self: Box<Self>) -> Result<(), FetchError> {
            self.calls.lock().unwrap().closes += 1;
            Ok(())
        }
    }

    fn settings(max_secs: u64) -> FetchSettings {
        FetchSettings {
            headless: true,
            max_duration: Duration::from_secs(max_secs),
            poll_interval: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn returns_html_once_document_is_complete() {
        let backend = ScriptedBackend::new(
            vec!["loading", "interactive", "complete"],
            "<html><body>ok</body></html>",
        );

        let result = fetch(&backend, "https://example.com/", &settings(30))
            .await
            .unwrap();

        assert_eq!(
            result,
            FetchResult::Html("<html><body>ok</body></html>".to_owned())
        );
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.launches, 1);
        assert_eq!(calls.ready_checks, 3);
        assert_eq!(calls.closes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_page_never_completes() {
        let backend = ScriptedBackend::new(vec!["loading"], "<html></html>");
        let started = Instant::now();

        let result = fetch(&backend, "https://example.com/", &settings(5))
            .await
            .unwrap();

        assert_eq!(result, FetchResult::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(5));
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.ready_checks, 5);
        assert_eq!(calls.closes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_deadline_times_out_without_polling() {
        let backend = ScriptedBackend::new(vec!["complete"], "<html></html>");
        let started = Instant::now();

        let result = fetch(&backend, "https://example.com/", &settings(0))
            .await
            .unwrap();

        assert_eq!(result, FetchResult::TimedOut);
        assert_eq!(started.elapsed(), Duration::ZERO);
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.navigations, 0);
        assert_eq!(calls.ready_checks, 0);
        assert_eq!(calls.closes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_navigation_times_out_at_the_deadline() {
        let mut backend = ScriptedBackend::new(vec!["complete"], "<html></html>");
        backend.navigation_time = Duration::from_secs(600);
        let started = Instant::now();

        let result = fetch(&backend, "https://slow.example/", &settings(5))
            .await
            .unwrap();

        assert_eq!(result, FetchResult::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.navigations, 1);
        assert_eq!(calls.ready_checks, 0);
        assert_eq!(calls.closes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_navigation_uses_up_the_polling_budget() {
        let mut backend = ScriptedBackend::new(vec!["loading"], "<html></html>");
        backend.navigation_time = Duration::from_secs(3);

        let result = fetch(&backend, "https://slow.example/", &settings(5))
            .await
            .unwrap();

        assert_eq!(result, FetchResult::TimedOut);
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.ready_checks, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_page_is_html_not_timeout() {
        let backend = ScriptedBackend::new(vec!["complete"], "");

        let result = fetch(&backend, "https://example.com/", &settings(30))
            .await
            .unwrap();

        assert_eq!(result, FetchResult::Html(String::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_failure_is_an_error_and_still_closes_session() {
        let mut backend = ScriptedBackend::new(vec!["complete"], "");
        backend.fail_navigation = true;

        let err = fetch(&backend, "https://unreachable.invalid/", &settings(30))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Navigation { .. }));
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.ready_checks, 0);
        assert_eq!(calls.closes, 1);
    }
}
