//! Fabrique des périphériques cpal réels

use async_trait::async_trait;

use crate::{AudioCapture, AudioConfig, AudioDevices, AudioResult, AudioSink, CpalCapture, CpalSink};

/// Ouvre le micro et la sortie par défaut du système
#[derive(Clone, Debug, Default)]
pub struct CpalDevices;

impl CpalDevices {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioDevices for CpalDevices {
    async fn open_capture(&self, config: &AudioConfig) -> AudioResult<Box<dyn AudioCapture>> {
        let mut capture = CpalCapture::new(config.clone());
        capture.start().await?;
        Ok(Box::new(capture))
    }

    async fn open_sink(&self, config: &AudioConfig) -> AudioResult<Box<dyn AudioSink>> {
        let sink = CpalSink::open(config).await?;
        Ok(Box::new(sink))
    }
}
