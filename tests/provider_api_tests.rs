//! Provider HTTP behavior against mock endpoints: voice listing, synthesis
//! modes, fault handling, and translator region/model fallback.

use dubber::auth::AccessTokenCache;
use dubber::error::DubberError;
use dubber::job::progress::ProgressFn;
use dubber::llm::VertexClient;
use dubber::script::timestamp::extract_timestamps;
use dubber::translate::{
    TranslationContext, TranslationQuality, TranslationRequest, Translator, VertexTranslator,
};
use dubber::tts::{AudioQuality, ElevenLabsSynthesizer, GoogleTtsSynthesizer, Synthesizer};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn no_progress() -> ProgressFn {
    Arc::new(|_| {})
}

fn not_cancelled() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

fn tokens() -> Arc<AccessTokenCache> {
    // The cache reads GOOGLE_ACCESS_TOKEN; set a dummy so no gcloud
    // invocation happens in tests.
    std::env::set_var("GOOGLE_ACCESS_TOKEN", "test-token");
    Arc::new(AccessTokenCache::new())
}

// ────────────────────────────────────────────────────────────────────────
// ElevenLabs
// ────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn elevenlabs_lists_and_validates_voices() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/voices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "voices": [
                {
                    "voice_id": "21m00Tcm4TlvDq8ikWAM",
                    "name": "Rachel",
                    "category": "premium",
                    "preview_url": "https://example.com/rachel.mp3",
                    "labels": {"gender": "female", "language": "en"}
                },
                {"voice_id": "pNInz6obpgDQGcFmaJgB", "name": "Adam"}
            ]
        })))
        .mount(&server)
        .await;

    let synth = ElevenLabsSynthesizer::new("key".into()).with_base_url(server.uri());
    let voices = synth.list_voices().await.unwrap();
    assert_eq!(voices.len(), 2);
    assert_eq!(voices[0].display_name, "Rachel");
    assert!(voices[0].premium);
    assert_eq!(voices[0].gender.as_deref(), Some("female"));
    assert!(!voices[1].premium);

    assert!(synth.validate_voice_id("21m00Tcm4TlvDq8ikWAM").await.unwrap());
    assert!(!synth.validate_voice_id("nope").await.unwrap());
}

#[tokio::test]
async fn elevenlabs_single_call_writes_audio() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/text-to-speech/voice-1"))
        .and(body_string_contains("mp3_44100_128"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fake-mp3-bytes".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.mp3");
    let synth = ElevenLabsSynthesizer::new("key".into()).with_base_url(server.uri());

    let script = "[00:00:01] Hello there everyone.\n[00:00:04] Second line here.";
    let result = synth
        .synthesize_script(
            script,
            "voice-1",
            &output,
            AudioQuality::High,
            no_progress(),
            not_cancelled(),
        )
        .await
        .unwrap();

    assert_eq!(result.method, dubber::tts::SynthesisMethod::SingleCall);
    assert_eq!(result.segments_processed, 2);
    assert_eq!(std::fs::read(&output).unwrap(), b"fake-mp3-bytes");
}

#[tokio::test]
async fn elevenlabs_unknown_voice_is_voice_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/text-to-speech/.*$"))
        .respond_with(ResponseTemplate::new(404).set_body_string("voice does not exist"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let synth = ElevenLabsSynthesizer::new("key".into()).with_base_url(server.uri());
    let result = synth
        .synthesize_script(
            "[00:00:01] Hello world today.",
            "ghost",
            &dir.path().join("out.mp3"),
            AudioQuality::Medium,
            no_progress(),
            not_cancelled(),
        )
        .await;

    assert!(matches!(result, Err(DubberError::VoiceNotFound(_))));
}

#[tokio::test]
async fn elevenlabs_empty_script_yields_empty_wav() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("empty.wav");
    let synth = ElevenLabsSynthesizer::new("key".into()).with_base_url(server.uri());

    // Only pause markers: no speakable segments, no API calls.
    let result = synth
        .synthesize_script(
            "[00:00:01] [breath]\n[00:00:03] [long pause]",
            "voice-1",
            &output,
            AudioQuality::Low,
            no_progress(),
            not_cancelled(),
        )
        .await
        .unwrap();

    assert_eq!(result.duration_seconds, 0.0);
    assert_eq!(result.segments_processed, 0);
    assert!(output.exists());
    assert_eq!(server.received_requests().await.unwrap().len(), 0);
}

/// Chunked-mode placement: 60 segments at 5-second starts, ~12 words each,
/// mock returning one second of signal per request. The assembled track
/// runs to the last segment's estimated end and carries signal at each
/// group's start offset.
#[tokio::test]
async fn elevenlabs_chunked_mode_places_groups_on_timeline() {
    let server = MockServer::start().await;

    // 1 s of full-scale mono PCM at the low-quality rate.
    let sample_rate = 16_000usize;
    let pcm: Vec<u8> = vec![1000i16; sample_rate]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();

    Mock::given(method("POST"))
        .and(path("/text-to-speech/voice-1"))
        .respond_with(move |_req: &Request| {
            ResponseTemplate::new(200).set_body_bytes(pcm.clone())
        })
        .mount(&server)
        .await;

    let mut script = String::new();
    for i in 0..60 {
        let start = i * 5;
        script.push_str(&format!(
            "[{:02}:{:02}:{:02}] alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu\n",
            start / 3600,
            (start % 3600) / 60,
            start % 60
        ));
    }

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("long.wav");
    let synth = ElevenLabsSynthesizer::new("key".into())
        .with_base_url(server.uri())
        .with_max_parallel(4);

    let result = synth
        .synthesize_script(
            &script,
            "voice-1",
            &output,
            AudioQuality::Low,
            no_progress(),
            not_cancelled(),
        )
        .await
        .unwrap();

    assert_eq!(result.method, dubber::tts::SynthesisMethod::Chunked);
    assert_eq!(result.segments_processed, 60);
    // Last segment starts at 295 s; twelve words estimate 4.8 s.
    assert!(
        result.duration_seconds >= 299.0 && result.duration_seconds <= 301.0,
        "duration {} out of range",
        result.duration_seconds
    );

    // The final audio has signal at the start of the timeline and silence
    // in an inter-group gap.
    let reader = hound::WavReader::open(&output).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16_000);
    let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples[0], 1000);
    // 3 s in: the first group's single second of audio has ended.
    assert_eq!(samples[3 * sample_rate], 0);

    // Several synthesis requests were issued (one per group).
    let requests = server.received_requests().await.unwrap();
    assert!(requests.len() > 1, "expected chunked requests");
}

#[tokio::test]
async fn elevenlabs_chunk_failure_fails_whole_synthesis_and_cleans_temps() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/text-to-speech/voice-1"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(&server)
        .await;

    let mut script = String::new();
    for i in 0..60 {
        let start = i * 5;
        script.push_str(&format!(
            "[{:02}:{:02}:{:02}] alpha beta gamma delta epsilon zeta eta theta iota kappa\n",
            start / 3600,
            (start % 3600) / 60,
            start % 60
        ));
    }

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("fail.wav");
    let synth = ElevenLabsSynthesizer::new("key".into()).with_base_url(server.uri());

    let result = synth
        .synthesize_script(
            &script,
            "voice-1",
            &output,
            AudioQuality::Low,
            no_progress(),
            not_cancelled(),
        )
        .await;
    assert!(result.is_err());

    // No partial group temps survive.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert!(
        leftovers.is_empty(),
        "temp files left behind: {leftovers:?}"
    );
}

// ────────────────────────────────────────────────────────────────────────
// Google TTS
// ────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn google_tts_single_call_decodes_audio_content() {
    let server = MockServer::start().await;
    use base64::Engine;
    let audio = base64::engine::general_purpose::STANDARD.encode(b"fake-mp3");
    Mock::given(method("POST"))
        .and(path("/text:synthesize"))
        .and(body_string_contains("<speak>"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "audioContent": audio })),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.mp3");
    let synth = GoogleTtsSynthesizer::new(tokens()).with_base_url(server.uri());

    let result = synth
        .synthesize_script(
            "[00:00:01] Hello there everyone.",
            "en-US-Neural2-F",
            &output,
            AudioQuality::Medium,
            no_progress(),
            not_cancelled(),
        )
        .await
        .unwrap();

    assert_eq!(result.provider, dubber::tts::TtsProvider::GoogleTts);
    assert_eq!(result.sample_rate, 24_000);
    assert_eq!(std::fs::read(&output).unwrap(), b"fake-mp3");
}

#[tokio::test]
async fn google_tts_voice_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/voices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "voices": [
                {
                    "name": "en-US-Neural2-F",
                    "languageCodes": ["en-US"],
                    "ssmlGender": "FEMALE",
                    "naturalSampleRateHertz": 24000
                },
                {
                    "name": "hu-HU-Standard-A",
                    "languageCodes": ["hu-HU"],
                    "ssmlGender": "FEMALE"
                }
            ]
        })))
        .mount(&server)
        .await;

    let synth = GoogleTtsSynthesizer::new(tokens()).with_base_url(server.uri());
    let voices = synth.list_voices().await.unwrap();
    assert_eq!(voices.len(), 2);
    assert!(voices[0].premium); // Neural2
    assert!(!voices[1].premium); // Standard
    assert_eq!(voices[0].language_tag, "en-US");
    assert_eq!(voices[0].gender.as_deref(), Some("female"));
}

#[tokio::test]
async fn google_tts_bad_voice_is_voice_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/text:synthesize"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string("Unsupported voice: xx-XX-Fake-Z"),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let synth = GoogleTtsSynthesizer::new(tokens()).with_base_url(server.uri());
    let result = synth
        .synthesize_script(
            "[00:00:01] Hello world today.",
            "xx-XX-Fake-Z",
            &dir.path().join("out.mp3"),
            AudioQuality::Low,
            no_progress(),
            not_cancelled(),
        )
        .await;

    assert!(matches!(result, Err(DubberError::VoiceNotFound(_))));
}

// ────────────────────────────────────────────────────────────────────────
// Vertex translation
// ────────────────────────────────────────────────────────────────────────

fn translation_request(script: &str) -> TranslationRequest {
    TranslationRequest {
        script: script.to_string(),
        source_language: "hu-HU".into(),
        target_language: "fr-FR".into(),
        context: TranslationContext::Casual,
        audience: "general public".into(),
        tone: "neutral".into(),
        quality: TranslationQuality::Balanced,
        preserve_timing: true,
    }
}

fn vertex_response(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{"content": {"parts": [{"text": text}]}}]
    })
}

#[tokio::test]
async fn translator_accepts_valid_single_pass() {
    let server = MockServer::start().await;
    let translated = "[00:00:01] Bonjour.\n[00:00:05] Le monde.\n[00:00:10] Fin.";
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/projects/p/locations/.*:generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vertex_response(translated)))
        .mount(&server)
        .await;

    let translator = VertexTranslator::new(
        VertexClient::new("p".into(), tokens()).with_base_url(server.uri()),
    );

    let script = "[00:00:01] Hello.\n[00:00:05] World.\n[00:00:10] End.";
    let result = translator
        .translate(&translation_request(script), no_progress())
        .await
        .unwrap();

    assert_eq!(result.translated_text, translated);
    assert_eq!(
        extract_timestamps(&result.translated_text),
        extract_timestamps(script)
    );
    assert_eq!(result.chunks_processed, 1);
    assert_eq!(result.model_used.as_deref(), Some("gemini-2.0-flash"));
    assert_eq!(result.region_used.as_deref(), Some("us-central1"));
}

#[tokio::test]
async fn translator_falls_through_models_on_client_error() {
    let server = MockServer::start().await;
    let translated = "[00:00:01] Bonjour tout le monde.";

    // First model in the fallback order is rejected outright; the second
    // one answers with a valid translation.
    Mock::given(method("POST"))
        .and(path_regex(r"gemini-2\.0-flash:generateContent$"))
        .respond_with(ResponseTemplate::new(400).set_body_string("model not allowed"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"gemini-2\.5-flash:generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vertex_response(translated)))
        .mount(&server)
        .await;

    let translator = VertexTranslator::new(
        VertexClient::new("p".into(), tokens()).with_base_url(server.uri()),
    );

    let result = translator
        .translate(
            &translation_request("[00:00:01] Szia mindenki, jó napot."),
            no_progress(),
        )
        .await
        .unwrap();

    assert_eq!(result.model_used.as_deref(), Some("gemini-2.5-flash"));
    assert_eq!(result.region_used.as_deref(), Some("us-central1"));
}

#[tokio::test]
async fn translator_rejects_output_with_altered_timestamps() {
    let server = MockServer::start().await;
    // Every model in every region returns a translation that drops the
    // second timestamp, so the whole call must fail.
    Mock::given(method("POST"))
        .and(path_regex(r":generateContent$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vertex_response("[00:00:01] Bonjour le monde et fin.")),
        )
        .mount(&server)
        .await;

    let translator = VertexTranslator::new(
        VertexClient::new("p".into(), tokens()).with_base_url(server.uri()),
    );

    let result = translator
        .translate(
            &translation_request("[00:00:01] Hello.\n[00:00:05] World."),
            no_progress(),
        )
        .await;

    assert!(matches!(result, Err(DubberError::TranslationFailed(_))));
}
