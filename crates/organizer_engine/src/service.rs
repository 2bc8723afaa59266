use std::time::Duration;

use organizer_core::Tab;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;

use crate::{ClassifyError, FailureKind};

/// Characters of page text included when content is supplied.
const CONTENT_CHAR_LIMIT: usize = 500;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub stop_sequences: Vec<String>,
    pub connect_timeout: Duration,
    /// Transport-level deadline. Classification itself has none by default.
    pub request_timeout: Option<Duration>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.cohere.ai/v1/generate".to_string(),
            api_key: String::new(),
            model: "command-nightly".to_string(),
            max_tokens: 10,
            temperature: 0.2,
            stop_sequences: vec!["\n".to_string()],
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
        }
    }
}

/// What the classifier knows about a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRequest {
    pub url: String,
    pub title: String,
    /// Page body text. Not collected today; included in the prompt when set.
    pub content: Option<String>,
}

impl ClassificationRequest {
    pub fn for_tab(tab: &Tab) -> Self {
        Self {
            url: tab.url.clone(),
            title: tab.title.clone(),
            content: None,
        }
    }

    pub fn prompt(&self) -> String {
        let mut prompt = String::from(
            "Classify the web page below into a single short category such as Work, \
             Entertainment, Shopping, Social Media, Education, News, Technology, Finance, \
             Travel, Health or Other. Other categories are allowed. \
             Answer with the category name only.\n\n",
        );
        prompt.push_str(&format!("URL: {}\nTitle: {}\n", self.url, self.title));
        if let Some(content) = self.content.as_deref().filter(|c| !c.trim().is_empty()) {
            let excerpt: String = content.chars().take(CONTENT_CHAR_LIMIT).collect();
            prompt.push_str(&format!("Content: {excerpt}\n"));
        }
        prompt.push_str("\nCategory:");
        prompt
    }
}

/// Remote text generation used for classification. Returns the raw text of
/// the first candidate.
#[async_trait::async_trait]
pub trait ClassificationService: Send + Sync {
    async fn generate(&self, request: &ClassificationRequest) -> Result<String, ClassifyError>;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    generations: Vec<Generation>,
}

#[derive(Debug, Deserialize)]
struct Generation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone)]
pub struct HttpClassificationService {
    settings: ServiceSettings,
    client: reqwest::Client,
}

impl HttpClassificationService {
    pub fn new(settings: ServiceSettings) -> Result<Self, ClassifyError> {
        let mut builder = reqwest::Client::builder().connect_timeout(settings.connect_timeout);
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| ClassifyError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { settings, client })
    }

    fn body(&self, request: &ClassificationRequest) -> serde_json::Value {
        json!({
            "model": self.settings.model,
            "prompt": request.prompt(),
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
            "k": 0,
            "stop_sequences": self.settings.stop_sequences,
            "return_likelihoods": "NONE",
        })
    }
}

#[async_trait::async_trait]
impl ClassificationService for HttpClassificationService {
    async fn generate(&self, request: &ClassificationRequest) -> Result<String, ClassifyError> {
        let endpoint = reqwest::Url::parse(&self.settings.endpoint)
            .map_err(|err| ClassifyError::new(FailureKind::InvalidRequest, err.to_string()))?;
        let body = serde_json::to_vec(&self.body(request))
            .map_err(|err| ClassifyError::new(FailureKind::InvalidRequest, err.to_string()))?;

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&self.settings.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifyError::new(
                FailureKind::HttpStatus(status.as_u16()),
                format!("API request failed with status {status}"),
            ));
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let parsed: GenerateResponse = serde_json::from_slice(&bytes)
            .map_err(|err| ClassifyError::new(FailureKind::MalformedResponse, err.to_string()))?;

        parsed
            .generations
            .into_iter()
            .next()
            .map(|generation| generation.text)
            .ok_or_else(|| {
                ClassifyError::new(FailureKind::EmptyGeneration, "no generations returned")
            })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ClassifyError {
    if err.is_timeout() {
        return ClassifyError::new(FailureKind::Timeout, err.to_string());
    }
    ClassifyError::new(FailureKind::Network, err.to_string())
}
