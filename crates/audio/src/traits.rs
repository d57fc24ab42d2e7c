//! Traits abstraits pour le système audio
//!
//! Ce module définit les interfaces que doivent implémenter les périphériques
//! de l'assistant vocal. La session ne manipule que ces traits, ce qui permet
//! de remplacer cpal par des périphériques simulés dans les tests.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{AudioChunk, AudioConfig, AudioError, AudioResult, DecodedBuffer, EncodedChunk, SourceId};

/// Trait pour capturer l'audio depuis un périphérique d'entrée
///
/// Implémentations :
/// - CpalCapture : microphone réel via cpal
/// - SimulatedCapture : blocs injectés à la main dans les tests
///
/// Les blocs sont livrés sur un channel borné ; quand le consommateur prend
/// du retard, les blocs en trop sont abandonnés côté périphérique.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Démarre la capture audio
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` : Aucun microphone trouvé
    /// - `AudioError::PermissionDenied` : Accès refusé par le système
    /// - `AudioError::ConfigError` : Format non supporté
    async fn start(&mut self) -> AudioResult<()>;

    /// Arrête la capture et libère le périphérique
    ///
    /// Le channel de blocs se ferme une fois le périphérique relâché.
    async fn stop(&mut self) -> AudioResult<()>;

    /// Récupère le récepteur des blocs capturés
    ///
    /// Ne peut être pris qu'une seule fois ; retourne `None` ensuite.
    ///
    /// # Example
    /// ```rust,no_run
    /// use audio::{AudioCapture, AudioConfig, CpalCapture};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut capture = CpalCapture::new(AudioConfig::default());
    /// capture.start().await?;
    ///
    /// let mut chunks = capture.take_chunk_receiver().expect("récepteur déjà pris");
    /// while let Some(chunk) = chunks.recv().await {
    ///     println!("Bloc de {} échantillons", chunk.len());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn take_chunk_receiver(&mut self) -> Option<mpsc::Receiver<AudioChunk>>;

    /// Récupère le récepteur des erreurs survenues pendant la capture
    ///
    /// Un micro débranché y est signalé par `AudioError::DeviceDisconnected`.
    /// Ne peut être pris qu'une seule fois.
    fn take_error_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<AudioError>> {
        None
    }

    /// Fréquence native du périphérique (connue après `start()`)
    fn sample_rate(&self) -> u32;

    /// Vérifie si la capture est active
    fn is_recording(&self) -> bool;

    /// Retourne des informations sur le périphérique utilisé
    fn device_info(&self) -> String {
        "Périphérique inconnu".to_string()
    }
}

/// Trait pour un périphérique de sortie doté d'une horloge de lecture
///
/// Les sources sont planifiées à une date absolue sur l'horloge du sink
/// (en secondes). Chaque source terminée, naturellement ou par
/// `stop_source`, est signalée une fois sur le channel de fin.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Horloge de lecture courante en secondes
    fn current_time(&self) -> f64;

    /// Planifie la lecture d'un buffer à la date `start_at`
    ///
    /// # Arguments
    /// * `id` - Identifiant unique de la source
    /// * `buffer` - Voix décodée à jouer
    /// * `start_at` - Date de début sur l'horloge du sink
    fn start_source(&mut self, id: SourceId, buffer: &DecodedBuffer, start_at: f64) -> AudioResult<()>;

    /// Arrête une source (sans effet si elle est déjà terminée)
    fn stop_source(&mut self, id: SourceId);

    /// Récupère le récepteur des notifications de fin de source
    ///
    /// Ne peut être pris qu'une seule fois.
    fn take_ended_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SourceId>>;

    /// Ferme le périphérique de sortie
    async fn close(&mut self) -> AudioResult<()>;

    /// Retourne des informations sur le périphérique de sortie
    fn device_info(&self) -> String {
        "Périphérique de sortie inconnu".to_string()
    }
}

/// Fabrique de périphériques, injectée dans la session
#[async_trait]
pub trait AudioDevices: Send + Sync {
    /// Ouvre et démarre le périphérique de capture
    async fn open_capture(&self, config: &AudioConfig) -> AudioResult<Box<dyn AudioCapture>>;

    /// Ouvre le périphérique de sortie
    async fn open_sink(&self, config: &AudioConfig) -> AudioResult<Box<dyn AudioSink>>;
}

/// Trait pour encoder/décoder l'audio échangé avec le modèle
///
/// L'implémentation principale (`Pcm16Codec`) produit du PCM16 LE brut.
pub trait AudioCodec: Send + Sync {
    /// Encode un bloc capturé à la fréquence de transport
    ///
    /// # Example
    /// ```rust
    /// use audio::{AudioChunk, AudioCodec, AudioConfig, Pcm16Codec};
    ///
    /// let mut codec = Pcm16Codec::new(&AudioConfig::default());
    /// let chunk = AudioChunk::silence(4800, 48000, 0);
    /// let encoded = codec.encode(&chunk).unwrap();
    ///
    /// assert_eq!(encoded.sample_count(), 1600);
    /// ```
    fn encode(&mut self, chunk: &AudioChunk) -> AudioResult<EncodedChunk>;

    /// Décode des octets PCM reçus du modèle
    fn decode(&mut self, payload: &[u8]) -> AudioResult<DecodedBuffer>;

    /// Retourne des informations sur la configuration du codec
    fn codec_info(&self) -> String {
        "Codec audio".to_string()
    }
}
