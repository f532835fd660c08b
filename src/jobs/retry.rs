//! Polling primitive: retry a lookup until it yields something
//!
//! Used when a download must show up in the download client or in cloud storage
//! before it can be moved. Season packs additionally wait until the folder holds
//! enough episodes, then give slow siblings a short courtesy wait.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use tracing::{debug, info};

use super::Result;
use crate::error::EngineError;
use crate::services::clock::{Clock, minutes};

/// Lists the children of an element already found (episodes inside a season folder).
pub type ChildrenRetriever<D> = Box<dyn Fn(D) -> BoxFuture<'static, Result<Vec<D>>> + Send + Sync>;

pub struct RetryEngine<D> {
    minutes_to_wait: u64,
    children_must_have: usize,
    children_retriever: Option<ChildrenRetriever<D>>,
    /// `None` retries forever.
    max_attempts: Option<u32>,
    clock: Arc<dyn Clock>,
}

impl<D: Clone + Send + 'static> RetryEngine<D> {
    pub fn new(minutes_to_wait: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            minutes_to_wait,
            children_must_have: 0,
            children_retriever: None,
            max_attempts: None,
            clock,
        }
    }

    /// Require at least `must_have` children before the found element is returned.
    pub fn with_children<F, Fut>(mut self, must_have: usize, retriever: F) -> Self
    where
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<D>>> + Send + 'static,
    {
        self.children_must_have = must_have;
        self.children_retriever = Some(Box::new(move |element| Box::pin(retriever(element))));
        self
    }

    /// Bound each polling loop to `max` attempts. `None` or `Some(0)` means unbounded.
    pub fn with_max_attempts(mut self, max: Option<u32>) -> Self {
        self.max_attempts = max.filter(|m| *m > 0);
        self
    }

    /// Invoke `producer` until it returns `Some`, waiting between attempts.
    ///
    /// When children are required, keeps polling the retriever until enough are
    /// present, then waits an extra `minutes_to_wait / 3` minutes before returning.
    pub async fn try_until_got_desired<P, Fut>(&self, mut producer: P) -> Result<D>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<D>>>,
    {
        let mut attempts = 0;
        let desired = loop {
            attempts += 1;
            match producer().await? {
                Some(found) => break found,
                None => {
                    info!(attempt = attempts, "Couldn't find it");
                    self.check_budget(attempts)?;
                    self.wait_before_next_retry(self.minutes_to_wait, None).await?;
                }
            }
        };

        if self.children_must_have > 0
            && let Some(retriever) = &self.children_retriever
        {
            self.wait_for_children(&desired, retriever).await?;
        }

        debug!("Found desired element and returning it");
        Ok(desired)
    }

    async fn wait_for_children(&self, desired: &D, retriever: &ChildrenRetriever<D>) -> Result<()> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let children = retriever(desired.clone()).await?;
            if children.len() >= self.children_must_have {
                let shorter_time = self.minutes_to_wait / 3;
                return self
                    .wait_before_next_retry(
                        shorter_time,
                        Some(format!("Waiting a bit more for courtesy: {shorter_time}min")),
                    )
                    .await;
            }
            info!(
                found = children.len(),
                required = self.children_must_have,
                "There are not enough child elements yet"
            );
            self.check_budget(attempts)?;
            self.wait_before_next_retry(self.minutes_to_wait, None).await?;
        }
    }

    fn check_budget(&self, attempts: u32) -> Result<()> {
        match self.max_attempts {
            Some(max) if attempts >= max => Err(EngineError::TooManyRetries { attempts }),
            _ => Ok(()),
        }
    }

    pub async fn wait_before_next_retry(&self, wait_minutes: u64, message: Option<String>) -> Result<()> {
        let message =
            message.unwrap_or_else(|| format!("Waiting {wait_minutes} minutes before the next try"));
        let next_try_at = Utc::now() + chrono::Duration::minutes(wait_minutes as i64);
        info!(next_try_at = %next_try_at.format("%Y-%m-%d %H:%M:%S"), "{}", message);

        self.clock.sleep(minutes(wait_minutes)).await
    }
}
