use std::sync::Arc;

use futures_util::future::try_join_all;
use organizer_core::{Category, Tab};
use organizer_logging::{organizer_debug, organizer_warn};

use crate::classify::Classifier;

#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Upper bound on classifications in flight at once.
    pub chunk_size: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { chunk_size: 20 }
    }
}

/// Classifies tabs chunk by chunk; results line up with the input order.
#[derive(Clone)]
pub struct BatchClassifier {
    classifier: Arc<Classifier>,
    settings: BatchSettings,
}

impl BatchClassifier {
    pub fn new(classifier: Arc<Classifier>, settings: BatchSettings) -> Self {
        Self {
            classifier,
            settings,
        }
    }

    pub async fn classify_all(&self, tabs: &[Tab]) -> Vec<Category> {
        let chunk_size = self.settings.chunk_size.max(1);
        let mut results = Vec::with_capacity(tabs.len());

        for (number, chunk) in tabs.chunks(chunk_size).enumerate() {
            let tasks = chunk.iter().cloned().map(|tab| {
                let classifier = self.classifier.clone();
                tokio::spawn(async move { classifier.classify(&tab).await })
            });

            match try_join_all(tasks).await {
                Ok(categories) => {
                    organizer_debug!("Classified chunk {}: {:?}", number + 1, categories);
                    results.extend(categories);
                }
                Err(err) => {
                    organizer_warn!("Chunk {} failed as a whole: {}", number + 1, err);
                    results.extend(chunk.iter().map(|_| Category::other()));
                }
            }
        }
        results
    }
}
