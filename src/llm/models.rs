//! Vertex AI Gemini model names and the auto-detect fallback order.

/// Supported Vertex AI Gemini models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexModel {
    Gemini20Flash,
    Gemini25Flash,
    Gemini25Pro,
    Gemini15Pro,
    Gemini15Flash,
    GeminiPro,
}

impl VertexModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VertexModel::Gemini20Flash => "gemini-2.0-flash",
            VertexModel::Gemini25Flash => "gemini-2.5-flash",
            VertexModel::Gemini25Pro => "gemini-2.5-pro",
            VertexModel::Gemini15Pro => "gemini-1.5-pro",
            VertexModel::Gemini15Flash => "gemini-1.5-flash",
            VertexModel::GeminiPro => "gemini-pro",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gemini-2.0-flash" => Some(VertexModel::Gemini20Flash),
            "gemini-2.5-flash" => Some(VertexModel::Gemini25Flash),
            "gemini-2.5-pro" => Some(VertexModel::Gemini25Pro),
            "gemini-1.5-pro" => Some(VertexModel::Gemini15Pro),
            "gemini-1.5-flash" => Some(VertexModel::Gemini15Flash),
            "gemini-pro" => Some(VertexModel::GeminiPro),
            _ => None,
        }
    }
}

/// Sentinel accepted in requests to trigger the fallback order below.
pub const AUTO_DETECT: &str = "auto-detect";

/// Model fallback order tried when the caller asks for auto-detection.
pub fn auto_detect_order() -> &'static [VertexModel] {
    &[
        VertexModel::Gemini20Flash,
        VertexModel::Gemini25Flash,
        VertexModel::Gemini15Pro,
        VertexModel::Gemini15Flash,
        VertexModel::GeminiPro,
    ]
}

/// Default region priority; a configured preferred region is tried first.
pub fn default_regions() -> &'static [&'static str] {
    &["us-central1", "us-east1", "us-west1", "europe-west4"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        for model in auto_detect_order() {
            assert_eq!(VertexModel::parse(model.as_str()), Some(*model));
        }
    }

    #[test]
    fn test_auto_detect_order_starts_with_flash() {
        assert_eq!(auto_detect_order()[0], VertexModel::Gemini20Flash);
    }

    #[test]
    fn test_unknown_model() {
        assert!(VertexModel::parse("gpt-4").is_none());
    }
}
