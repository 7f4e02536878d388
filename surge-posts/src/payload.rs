use rand::Rng;
use reqwest::{
    Method, Url,
    header::{CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_AUTHOR: &str = "sounish";

/// Body of a create-post request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPayload {
    pub author: String,
    pub title: String,
    pub subtitle: String,
    pub content: String,
}

/// A fully formed request, ready for a [`crate::transport::Transport`] to send.
#[derive(Debug, Clone)]
pub struct PostRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub payload: PostPayload,
}

impl PostRequest {
    /// The JSON body bytes.
    pub fn body(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.payload)
    }
}

/// Template for create-post requests. Every call to [`PostGenerator::generate`]
/// draws fresh random values for the title, subtitle and content.
#[derive(Debug, Clone)]
pub struct PostGenerator {
    url: Url,
    headers: HeaderMap,
    author: String,
}

impl PostGenerator {
    pub fn new(url: Url, author: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            url,
            headers,
            author: author.into(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Build one request. Only consumes randomness from `rng`; nothing is sent.
    pub fn generate<R: Rng>(&self, rng: &mut R) -> PostRequest {
        let payload = PostPayload {
            author: self.author.clone(),
            title: format!("Blog title {}", rng.random::<f64>()),
            subtitle: format!("Subtitle {}", rng.random::<f64>()),
            content: format!("My blog content {}", rng.random::<f64>()),
        };
        PostRequest {
            method: Method::POST,
            url: self.url.clone(),
            headers: self.headers.clone(),
            payload,
        }
    }
}
