use std::sync::Arc;
use std::time::Duration;

use organizer_core::{Category, Tab};
use organizer_logging::{organizer_debug, organizer_warn};

use crate::cache::CategoryCache;
use crate::service::{ClassificationRequest, ClassificationService};
use crate::{ClassifyError, FailureKind};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

/// Cache-first classifier that never fails: exhausted retries degrade to `Other`.
pub struct Classifier {
    service: Arc<dyn ClassificationService>,
    cache: CategoryCache,
    retry: RetryPolicy,
}

impl Classifier {
    pub fn new(
        service: Arc<dyn ClassificationService>,
        cache: CategoryCache,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            service,
            cache,
            retry,
        }
    }

    pub async fn classify(&self, tab: &Tab) -> Category {
        if let Some(cached) = self.cache.get(&tab.url) {
            return cached;
        }

        let request = ClassificationRequest::for_tab(tab);
        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.attempt(&request).await {
                Ok(category) => {
                    organizer_debug!("Tab {} classified as {}", tab.id, category);
                    self.cache.put(&tab.url, category.clone());
                    return category;
                }
                Err(err) => {
                    organizer_warn!(
                        "Classification attempt {}/{} for tab {} failed: {}",
                        attempt,
                        attempts,
                        tab.id,
                        err
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
            }
        }

        organizer_warn!(
            "All {} attempts failed for tab {}; falling back to {}",
            attempts,
            tab.id,
            Category::other()
        );
        Category::other()
    }

    async fn attempt(&self, request: &ClassificationRequest) -> Result<Category, ClassifyError> {
        let text = self.service.generate(request).await?;
        Category::from_generation(&text).ok_or_else(|| {
            ClassifyError::new(FailureKind::EmptyGeneration, "generation had no usable text")
        })
    }
}
