//! Thread dédié propriétaire d'un stream cpal
//!
//! Un `cpal::Stream` n'est pas `Send` sur toutes les plateformes : il est
//! construit, démarré et détruit sur son propre thread. Le reste du code ne
//! garde qu'un signal d'arrêt.

use std::sync::mpsc as std_mpsc;
use std::thread;

use cpal::traits::StreamTrait;
use tokio::sync::oneshot;
use tracing::debug;

use crate::{AudioError, AudioResult};

/// Poignée vers le thread qui possède un stream actif
///
/// Le stream est relâché quand `stop()` est appelé ou quand la poignée est
/// détruite.
pub(crate) struct StreamThread {
    name: String,
    stop_sender: Option<std_mpsc::Sender<()>>,
}

impl StreamThread {
    /// Lance le thread, construit le stream avec `build` et le démarre
    ///
    /// `build` retourne le stream et des informations sur le périphérique
    /// (nom, fréquence...) renvoyées à l'appelant une fois la lecture lancée.
    pub(crate) async fn spawn<T, F>(name: &str, build: F) -> AudioResult<(Self, T)>
    where
        T: Send + 'static,
        F: FnOnce() -> AudioResult<(cpal::Stream, T)> + Send + 'static,
    {
        let (ready_sender, ready_receiver) = oneshot::channel::<AudioResult<T>>();
        let (stop_sender, stop_receiver) = std_mpsc::channel::<()>();
        let thread_name = name.to_string();

        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let (stream, info) = match build() {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_sender.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_sender.send(Err(e.into()));
                    return;
                }

                if ready_sender.send(Ok(info)).is_err() {
                    return;
                }

                // Bloque jusqu'au signal d'arrêt ou à la destruction de la poignée
                let _ = stop_receiver.recv();
                drop(stream);
                debug!(thread = %thread_name, "stream audio relâché");
            })
            .map_err(|e| AudioError::InitializationError(format!("Thread audio: {}", e)))?;

        let info = ready_receiver.await.map_err(|_| {
            AudioError::InitializationError("Le thread audio s'est arrêté avant le démarrage".to_string())
        })??;

        Ok((
            Self {
                name: name.to_string(),
                stop_sender: Some(stop_sender),
            },
            info,
        ))
    }

    /// Demande l'arrêt du stream (idempotent)
    pub(crate) fn stop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.send(());
            debug!(thread = %self.name, "arrêt du stream demandé");
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}
