use serde::{Deserialize, Serialize};

/// Closed set of translation contexts; each carries the static directives
/// folded into the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationContext {
    #[default]
    Casual,
    Legal,
    Spiritual,
    Marketing,
    Scientific,
    Educational,
    News,
}

/// Per-context prompt directives.
#[derive(Debug, Clone, Copy)]
pub struct ContextProfile {
    pub instruction: &'static str,
    pub terminology: &'static str,
    pub tone: &'static str,
}

impl TranslationContext {
    pub fn profile(&self) -> ContextProfile {
        match self {
            TranslationContext::Spiritual => ContextProfile {
                instruction: "Preserve the spiritual, uplifting, and compassionate tone. Maintain motivational language and keep religious/spiritual terminology accurate. Focus on emotional resonance.",
                terminology: "Use respectful spiritual language, preserve metaphors and inspirational phrases",
                tone: "Warm, encouraging, and reverent",
            },
            TranslationContext::Legal => ContextProfile {
                instruction: "Keep the formal legal register and ensure precise terminology. Maintain professional tone and accuracy of legal concepts. Avoid ambiguity.",
                terminology: "Use exact legal terminology, preserve technical precision",
                tone: "Formal, precise, and authoritative",
            },
            TranslationContext::Marketing => ContextProfile {
                instruction: "Adapt for marketing purposes: make it persuasive, engaging, and action-oriented. Preserve selling points and emotional appeals.",
                terminology: "Use compelling marketing language, maintain call-to-action elements",
                tone: "Persuasive, engaging, and dynamic",
            },
            TranslationContext::Scientific => ContextProfile {
                instruction: "Maintain scientific accuracy and technical precision. Keep technical terms consistent and preserve logical flow.",
                terminology: "Use precise scientific vocabulary, maintain technical accuracy",
                tone: "Objective, precise, and analytical",
            },
            TranslationContext::Educational => ContextProfile {
                instruction: "Make it clear and educational. Ensure concepts are well-explained and accessible to the learning audience.",
                terminology: "Use clear educational language, define complex terms",
                tone: "Clear, instructive, and supportive",
            },
            TranslationContext::News => ContextProfile {
                instruction: "Maintain journalistic objectivity and factual accuracy. Keep the informational tone and news-style structure.",
                terminology: "Use professional news language, maintain factual precision",
                tone: "Objective, informative, and professional",
            },
            TranslationContext::Casual => ContextProfile {
                instruction: "Maintain natural conversational tone. Keep it friendly and accessible while preserving the speaker's personality.",
                terminology: "Use natural conversational language, maintain personal style",
                tone: "Natural, friendly, and conversational",
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationContext::Casual => "casual",
            TranslationContext::Legal => "legal",
            TranslationContext::Spiritual => "spiritual",
            TranslationContext::Marketing => "marketing",
            TranslationContext::Scientific => "scientific",
            TranslationContext::Educational => "educational",
            TranslationContext::News => "news",
        }
    }
}

impl std::str::FromStr for TranslationContext {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "casual" => Ok(TranslationContext::Casual),
            "legal" => Ok(TranslationContext::Legal),
            "spiritual" => Ok(TranslationContext::Spiritual),
            "marketing" => Ok(TranslationContext::Marketing),
            "scientific" => Ok(TranslationContext::Scientific),
            "educational" => Ok(TranslationContext::Educational),
            "news" => Ok(TranslationContext::News),
            _ => Err(format!("Unknown translation context: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_contexts_have_profiles() {
        let contexts = [
            TranslationContext::Casual,
            TranslationContext::Legal,
            TranslationContext::Spiritual,
            TranslationContext::Marketing,
            TranslationContext::Scientific,
            TranslationContext::Educational,
            TranslationContext::News,
        ];
        for ctx in contexts {
            let profile = ctx.profile();
            assert!(!profile.instruction.is_empty());
            assert!(!profile.terminology.is_empty());
            assert!(!profile.tone.is_empty());
        }
    }

    #[test]
    fn test_parse_roundtrip() {
        assert_eq!(
            "legal".parse::<TranslationContext>().unwrap(),
            TranslationContext::Legal
        );
        assert_eq!(
            "NEWS".parse::<TranslationContext>().unwrap(),
            TranslationContext::News
        );
        assert!("poetry".parse::<TranslationContext>().is_err());
    }
}
