// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM adapters for deterministic testing.
//!
//! `MockProvider` answers `generate` from prompt-matching rules, then a FIFO
//! queue, then a default of `[]`. `MockEmbedder` produces bag-of-words
//! vectors so texts sharing words are similar. Both can be switched into a
//! failing or slow mode to exercise the circuit breakers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use murmur_core::types::{AdapterType, GenerateOptions, HealthStatus, Transcription};
use murmur_core::{
    EmbeddingAdapter, MurmurError, PluginAdapter, ProviderAdapter, SynthesisAdapter,
    TranscriptionAdapter,
};

/// Failure and latency switches shared by the mocks.
#[derive(Debug, Default)]
struct Faults {
    failing: AtomicBool,
    fail_next: AtomicUsize,
    delay_ms: AtomicUsize,
    calls: AtomicUsize,
}

impl Faults {
    async fn enter(&self, name: &str) -> Result<(), MurmurError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        let scheduled = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scheduled || self.failing.load(Ordering::SeqCst) {
            return Err(MurmurError::Provider {
                message: format!("{name} injected failure"),
                source: None,
            });
        }
        Ok(())
    }
}

macro_rules! fault_controls {
    () => {
        /// Fail every call until switched off.
        pub fn set_failing(&self, failing: bool) {
            self.faults.failing.store(failing, Ordering::SeqCst);
        }

        /// Fail the next `n` calls, then recover.
        pub fn fail_next(&self, n: usize) {
            self.faults.fail_next.store(n, Ordering::SeqCst);
        }

        /// Sleep this long before answering each call.
        pub fn set_delay(&self, delay: Duration) {
            self.faults
                .delay_ms
                .store(delay.as_millis() as usize, Ordering::SeqCst);
        }

        /// Number of calls received, including failed ones.
        pub fn calls(&self) -> usize {
            self.faults.calls.load(Ordering::SeqCst)
        }
    };
}

macro_rules! mock_adapter {
    ($ty:ty, $name:literal, $kind:expr) => {
        #[async_trait]
        impl PluginAdapter for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn version(&self) -> semver::Version {
                semver::Version::new(0, 1, 0)
            }

            fn adapter_type(&self) -> AdapterType {
                $kind
            }

            async fn health_check(&self) -> Result<HealthStatus, MurmurError> {
                if self.faults.failing.load(Ordering::SeqCst) {
                    Ok(HealthStatus::Unhealthy("failing".into()))
                } else {
                    Ok(HealthStatus::Healthy)
                }
            }

            async fn shutdown(&self) -> Result<(), MurmurError> {
                Ok(())
            }
        }
    };
}

/// A mock text generator.
#[derive(Debug, Default)]
pub struct MockProvider {
    rules: Mutex<Vec<(String, String)>>,
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    faults: Faults,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock provider pre-loaded with queued responses.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
            ..Self::default()
        }
    }

    /// Answer any prompt containing `needle` with `response`. Rules are
    /// checked in insertion order and are not consumed.
    pub async fn respond_when(&self, needle: &str, response: &str) {
        self.rules
            .lock()
            .await
            .push((needle.to_string(), response.to_string()));
    }

    /// Add a response to the end of the queue.
    pub async fn add_response(&self, text: &str) {
        self.responses.lock().await.push_back(text.to_string());
    }

    /// Every prompt received so far.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    fault_controls!();
}

mock_adapter!(MockProvider, "mock-provider", AdapterType::Provider);

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<String, MurmurError> {
        self.prompts.lock().await.push(prompt.to_string());
        self.faults.enter("mock-provider").await?;

        let matched = self
            .rules
            .lock()
            .await
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone());
        if let Some(response) = matched {
            return Ok(response);
        }
        Ok(self
            .responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "[]".to_string()))
    }
}

/// A deterministic embedder hashing lowercase words into buckets.
#[derive(Debug)]
pub struct MockEmbedder {
    dimensions: usize,
    faults: Faults,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            faults: Faults::default(),
        }
    }

    /// The vector `embed` would return, without fault injection.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(2166136261u32, |h, b| (h ^ u32::from(b)).wrapping_mul(16777619));
            vector[bucket as usize % self.dimensions] += 1.0;
        }
        vector
    }

    fault_controls!();
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

mock_adapter!(MockEmbedder, "mock-embedder", AdapterType::Embedding);

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MurmurError> {
        self.faults.enter("mock-embedder").await?;
        Ok(self.vector_for(text))
    }
}

/// A speech-to-text mock that "transcribes" UTF-8 bytes.
#[derive(Debug, Default)]
pub struct MockTranscriber {
    faults: Faults,
}

impl MockTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    fault_controls!();
}

mock_adapter!(MockTranscriber, "mock-stt", AdapterType::Transcription);

#[async_trait]
impl TranscriptionAdapter for MockTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcription, MurmurError> {
        self.faults.enter("mock-stt").await?;
        Ok(Transcription {
            text: String::from_utf8_lossy(audio).into_owned(),
            language: "en".into(),
            confidence: 0.95,
        })
    }
}

/// A text-to-speech mock returning the text bytes prefixed by the voice id.
#[derive(Debug, Default)]
pub struct MockSynthesizer {
    faults: Faults,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    fault_controls!();
}

mock_adapter!(MockSynthesizer, "mock-tts", AdapterType::Synthesis);

#[async_trait]
impl SynthesisAdapter for MockSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, MurmurError> {
        self.faults.enter("mock-tts").await?;
        Ok(format!("{voice_id}:{text}").into_bytes())
    }
}
