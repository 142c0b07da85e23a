use thiserror::Error;

/// A fetch that never produced a response.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Failed to read response body from {url}: {reason}")]
    Body { url: String, reason: String },
}

/// Maximum length for error descriptions carried in log fields
const MAX_ERROR_LENGTH: usize = 200;

impl FetchError {
    /// Truncated description, safe for logging.
    pub fn summary(&self) -> String {
        let text = self.to_string();
        if text.len() <= MAX_ERROR_LENGTH {
            return text;
        }
        let mut end = MAX_ERROR_LENGTH;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &text[..end])
    }
}
