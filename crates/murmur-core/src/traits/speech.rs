// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Speech adapter traits. The core only routes these through breakers.

use async_trait::async_trait;

use crate::error::MurmurError;
use crate::traits::adapter::PluginAdapter;
use crate::types::Transcription;

#[async_trait]
pub trait TranscriptionAdapter: PluginAdapter {
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcription, MurmurError>;
}

#[async_trait]
pub trait SynthesisAdapter: PluginAdapter {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, MurmurError>;
}
