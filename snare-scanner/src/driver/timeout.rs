use super::{ElementRef, PageDriver, Probe};
use crate::error::{Result, ScanError};
use crate::record::VisitRecord;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Per-call deadlines, by kind of browser operation.
#[derive(Debug, Clone, Copy)]
pub struct CallTimeouts {
    pub navigation: Duration,
    pub action: Duration,
    pub query: Duration,
    pub fill: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            action: Duration::from_secs(30),
            query: Duration::from_secs(5),
            fill: Duration::from_secs(5),
        }
    }
}

async fn guard<T>(
    operation: &'static str,
    duration: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| ScanError::Timeout {
            operation,
            duration,
        })?
}

/// Wraps a page so that no single call can hang its caller.
pub struct TimedPage {
    inner: Box<dyn PageDriver>,
    timeouts: CallTimeouts,
}

impl TimedPage {
    pub fn new(inner: Box<dyn PageDriver>, timeouts: CallTimeouts) -> Self {
        Self { inner, timeouts }
    }
}

#[async_trait]
impl PageDriver for TimedPage {
    fn current_url(&self) -> String {
        self.inner.current_url()
    }

    async fn open(&mut self, url: &str) -> Result<VisitRecord> {
        guard("open", self.timeouts.navigation, self.inner.open(url)).await
    }

    async fn reload(&mut self) -> Result<VisitRecord> {
        guard("reload", self.timeouts.navigation, self.inner.reload()).await
    }

    async fn content(&mut self) -> Result<String> {
        guard("content", self.timeouts.query, self.inner.content()).await
    }

    async fn query_all_elements(&mut self) -> Result<Vec<ElementRef>> {
        guard("query", self.timeouts.query, self.inner.query_all_elements()).await
    }

    async fn evaluate(&mut self, element: &ElementRef, probe: &Probe) -> Result<serde_json::Value> {
        guard("evaluate", self.timeouts.query, self.inner.evaluate(element, probe)).await
    }

    async fn click(&mut self, element: &ElementRef, timeout: Duration) -> Result<VisitRecord> {
        let limit = self.timeouts.action.max(timeout);
        guard("click", limit, self.inner.click(element, timeout)).await
    }

    async fn press_enter(
        &mut self,
        element: &ElementRef,
        timeout: Duration,
    ) -> Result<VisitRecord> {
        let limit = self.timeouts.action.max(timeout);
        guard("press_enter", limit, self.inner.press_enter(element, timeout)).await
    }

    async fn fill(&mut self, element: &ElementRef, text: &str) -> Result<()> {
        guard("fill", self.timeouts.fill, self.inner.fill(element, text)).await
    }

    async fn screenshot(&mut self, full_page: bool) -> Result<Vec<u8>> {
        guard("screenshot", self.timeouts.navigation, self.inner.screenshot(full_page)).await
    }

    async fn clone_context(&self) -> Result<Box<dyn PageDriver>> {
        let inner = guard(
            "clone_context",
            self.timeouts.navigation,
            self.inner.clone_context(),
        )
        .await?;
        Ok(Box::new(TimedPage::new(inner, self.timeouts)))
    }

    async fn close(&mut self) -> Result<()> {
        guard("close", self.timeouts.query, self.inner.close()).await
    }
}
