use std::path::PathBuf;

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::error::CdpError;
use futures::StreamExt as _;
use tokio::task::JoinHandle;

use crate::fetch::{BrowserBackend, BrowserSession, FetchError};

/// Launches a fresh Chromium process per session over the DevTools protocol.
#[derive(Debug, Clone, Default)]
pub struct ChromiumBackend {
    /// Browser binary; `chromiumoxide` searches the usual locations when unset.
    pub executable: Option<PathBuf>,
}

impl ChromiumBackend {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }
}

#[async_trait::async_trait]
impl BrowserBackend for ChromiumBackend {
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserSession>, FetchError> {
        let mut builder = BrowserConfig::builder();
        if headless {
            builder = builder.arg("--disable-gpu");
        } else {
            builder = builder.with_head();
        }
        if let Some(executable) = self.executable.as_deref() {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(FetchError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| FetchError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    tracing::debug!(%err, "browser event handler stopped");
                    break;
                }
            }
        });

        Ok(Box::new(ChromiumSession {
            browser,
            page: None,
            target_url: String::new(),
            navigation: None,
            handler_task,
        }))
    }
}

struct ChromiumSession {
    browser: Browser,
    page: Option<Page>,
    target_url: String,
    /// `goto` resolves only once the page has loaded, so it runs in the
    /// background while `fetch` polls `document.readyState` against its own deadline.
    navigation: Option<JoinHandle<Result<(), CdpError>>>,
    handler_task: JoinHandle<()>,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, FetchError> {
        self.page
            .as_ref()
            .ok_or_else(|| FetchError::Browser("no page has been opened".to_owned()))
    }
}

/// A protocol timeout only means the page is still loading; the readiness poll
/// decides when to give up. Any other failure is a navigation error.
fn settle_navigation(url: &str, outcome: Result<(), CdpError>) -> Result<(), FetchError> {
    match outcome {
        Ok(()) => Ok(()),
        Err(CdpError::Timeout) => {
            tracing::debug!(url, "navigation still loading after protocol timeout");
            Ok(())
        }
        Err(err) => Err(FetchError::Navigation {
            url: url.to_owned(),
            message: err.to_string(),
        }),
    }
}

#[async_trait::async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|err| FetchError::Browser(format!("open page: {err}")))?;

        let loading = page.clone();
        let params = NavigateParams::new(url);
        self.navigation = Some(tokio::spawn(async move {
            loading.goto(params).await.map(|_| ())
        }));
        self.page = Some(page);
        self.target_url = url.to_owned();
        tracing::info!(url, "navigation started");
        Ok(())
    }

    async fn ready_state(&mut self) -> Result<String, FetchError> {
        if let Some(task) = self.navigation.as_mut() {
            if !task.is_finished() {
                return Ok("loading".to_owned());
            }
            let joined = task
                .await
                .map_err(|err| FetchError::Browser(format!("navigation task: {err}")))?;
            self.navigation = None;
            settle_navigation(&self.target_url, joined)?;
        }

        let state = self
            .page()?
            .evaluate("document.readyState")
            .await
            .map_err(|err| FetchError::Browser(format!("query document.readyState: {err}")))?
            .into_value::<String>()
            .map_err(|err| FetchError::Browser(format!("decode document.readyState: {err}")))?;
        Ok(state)
    }

    async fn page_source(&mut self) -> Result<String, FetchError> {
        self.page()?
            .content()
            .await
            .map_err(|err| FetchError::Browser(format!("read page source: {err}")))
    }

    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        let Self {
            mut browser,
            page,
            navigation,
            handler_task,
            ..
        } = *self;

        if let Some(navigation) = navigation {
            navigation.abort();
        }

        if let Some(page) = page
            && let Err(err) = page.close().await
        {
            tracing::debug!(%err, "close page");
        }

        let closed = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|err| FetchError::Browser(format!("close browser: {err}")));
        if let Err(err) = browser.wait().await {
            tracing::debug!(%err, "wait for browser process");
        }
        handler_task.abort();

        closed
    }
}
