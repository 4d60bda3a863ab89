//! Provider registry: availability probing with a short cache, auto or
//! explicit provider selection, and the static cross-provider voice map.

use crate::error::{DubberError, Result};
use crate::tts::{Synthesizer, TtsProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Probe results are reused for this long.
const AVAILABILITY_CACHE_TTL: Duration = Duration::from_secs(60);

/// Caller's provider preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderPreference {
    #[default]
    Auto,
    Explicit(TtsProvider),
}

impl std::str::FromStr for ProviderPreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ProviderPreference::Auto),
            "elevenlabs" => Ok(ProviderPreference::Explicit(TtsProvider::Elevenlabs)),
            "google_tts" | "google" => Ok(ProviderPreference::Explicit(TtsProvider::GoogleTts)),
            _ => Err(format!(
                "Unknown TTS provider: {s}. Use auto, elevenlabs, or google_tts"
            )),
        }
    }
}

/// Provider status as reported to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: TtsProvider,
    pub display_name: String,
    pub available: bool,
    pub cost_per_1k_chars: f64,
    pub voice_count: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedProbe {
    available: bool,
    voice_count: usize,
    last_error: Option<String>,
    checked_at: Instant,
}

pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Synthesizer>>,
    probes: Mutex<HashMap<TtsProvider, CachedProbe>>,
}

impl ProviderRegistry {
    /// Build a registry over the given providers; listing order is the
    /// tie-break order for auto-selection.
    pub fn new(providers: Vec<Arc<dyn Synthesizer>>) -> Self {
        Self {
            providers,
            probes: Mutex::new(HashMap::new()),
        }
    }

    fn find(&self, id: TtsProvider) -> Option<&Arc<dyn Synthesizer>> {
        self.providers.iter().find(|p| p.provider() == id)
    }

    /// Probe a provider by listing its voices, caching the outcome.
    async fn probe(&self, synthesizer: &Arc<dyn Synthesizer>) -> CachedProbe {
        let id = synthesizer.provider();

        {
            let probes = self.probes.lock().await;
            if let Some(cached) = probes.get(&id) {
                if cached.checked_at.elapsed() < AVAILABILITY_CACHE_TTL {
                    return cached.clone();
                }
            }
        }

        let result = synthesizer.list_voices().await;
        let probe = match result {
            Ok(voices) => CachedProbe {
                available: true,
                voice_count: voices.len(),
                last_error: None,
                checked_at: Instant::now(),
            },
            Err(e) => {
                debug!("Provider {id} probe failed: {e}");
                CachedProbe {
                    available: false,
                    voice_count: 0,
                    last_error: Some(e.to_string()),
                    checked_at: Instant::now(),
                }
            }
        };

        let mut probes = self.probes.lock().await;
        probes.insert(id, probe.clone());
        probe
    }

    /// Enumerate all registered providers with availability and cost.
    pub async fn enumerate(&self) -> Vec<ProviderInfo> {
        let mut infos = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let probe = self.probe(provider).await;
            infos.push(ProviderInfo {
                id: provider.provider(),
                display_name: provider.provider().display_name().to_string(),
                available: probe.available,
                cost_per_1k_chars: provider.cost_per_1k_chars(),
                voice_count: probe.voice_count,
                last_error: probe.last_error,
            });
        }
        infos
    }

    /// Select a synthesizer.
    ///
    /// `Auto` picks the cheapest available provider, ties broken by listing
    /// order. `Explicit` fails if the named provider's probe fails; only
    /// auto-selection falls through to the next candidate.
    pub async fn select(&self, preference: ProviderPreference) -> Result<Arc<dyn Synthesizer>> {
        match preference {
            ProviderPreference::Explicit(id) => {
                let synthesizer = self.find(id).ok_or_else(|| {
                    DubberError::ProviderNotAvailable(format!("Provider {id} is not registered"))
                })?;
                let probe = self.probe(synthesizer).await;
                if !probe.available {
                    return Err(DubberError::ProviderNotAvailable(format!(
                        "Provider {id} is not available: {}",
                        probe.last_error.unwrap_or_else(|| "probe failed".into())
                    )));
                }
                Ok(synthesizer.clone())
            }
            ProviderPreference::Auto => {
                // Stable sort keeps listing order for equal costs.
                let mut candidates: Vec<&Arc<dyn Synthesizer>> = self.providers.iter().collect();
                candidates.sort_by(|a, b| {
                    a.cost_per_1k_chars()
                        .partial_cmp(&b.cost_per_1k_chars())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

                for candidate in candidates {
                    let probe = self.probe(candidate).await;
                    if probe.available {
                        info!(
                            "Auto-selected TTS provider {} (${:.3}/1k chars)",
                            candidate.provider(),
                            candidate.cost_per_1k_chars()
                        );
                        return Ok(candidate.clone());
                    }
                    warn!("Provider {} unavailable, trying next", candidate.provider());
                }

                Err(DubberError::ProviderNotAvailable(
                    "No TTS providers are available".to_string(),
                ))
            }
        }
    }

    /// Synthesis rate assumed for cost estimation under a preference,
    /// without probing: an explicit provider's own rate, or the cheapest
    /// registered rate for auto-selection.
    pub fn rate_for(&self, preference: ProviderPreference) -> f64 {
        match preference {
            ProviderPreference::Explicit(id) => self
                .find(id)
                .map(|p| p.cost_per_1k_chars())
                .unwrap_or(0.0),
            ProviderPreference::Auto => {
                let cheapest = self
                    .providers
                    .iter()
                    .map(|p| p.cost_per_1k_chars())
                    .fold(f64::INFINITY, f64::min);
                if cheapest.is_finite() {
                    cheapest
                } else {
                    0.0
                }
            }
        }
    }

    /// Map a voice id across providers using the static equivalence table.
    pub fn map_voice(
        from_provider: TtsProvider,
        to_provider: TtsProvider,
        voice_id: &str,
    ) -> Option<&'static str> {
        if from_provider == to_provider {
            return None;
        }
        match (from_provider, to_provider) {
            (TtsProvider::Elevenlabs, TtsProvider::GoogleTts) => VOICE_EQUIVALENTS
                .iter()
                .find(|(el, _)| *el == voice_id)
                .map(|(_, g)| *g),
            (TtsProvider::GoogleTts, TtsProvider::Elevenlabs) => VOICE_EQUIVALENTS
                .iter()
                .find(|(_, g)| *g == voice_id)
                .map(|(el, _)| *el),
            _ => None,
        }
    }
}

/// Popular ElevenLabs voices and their closest Google Neural2 equivalents.
const VOICE_EQUIVALENTS: &[(&str, &str)] = &[
    ("21m00Tcm4TlvDq8ikWAM", "en-US-Neural2-F"), // Rachel
    ("pNInz6obpgDQGcFmaJgB", "en-US-Neural2-D"), // Adam
    ("yoZ06aMxZJJ28mfd3POQ", "en-US-Neural2-A"), // Sam
    ("piTKgcLEGmPE4e6mEKli", "en-US-Neural2-E"), // Nicole
    ("TxGEqnHWrfWFTfGW9XjX", "en-US-Neural2-C"), // Josh
    ("EXAVITQu4vr4xnSDxMaL", "en-US-Neural2-G"), // Bella
    ("ThT5KcBeYPX3keUQqHPh", "en-GB-Neural2-A"), // Dorothy
    ("ErXwobaYiN019PkySvjV", "en-US-Neural2-J"), // Antoni
];
