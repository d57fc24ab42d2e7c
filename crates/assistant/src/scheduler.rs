//! Planification sans trou ni chevauchement de la voix du modèle
//!
//! Les fragments audio arrivent en rafales irrégulières. Chaque fragment est
//! planifié à `max(next_start_time, horloge du sink)` : les fragments
//! s'enchaînent bord à bord tant que le flux suit, et un fragment arrivé en
//! retard démarre immédiatement au lieu de partir dans le passé.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use audio::{AudioResult, AudioSink, DecodedBuffer, SourceId};

use crate::SessionIdentity;

/// Source en cours de lecture
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackSource {
    pub id: SourceId,
    /// Durée en secondes
    pub duration: f64,
    /// Date de début sur l'horloge du sink
    pub scheduled_start: f64,
    pub owner: SessionIdentity,
}

impl PlaybackSource {
    pub fn scheduled_end(&self) -> f64 {
        self.scheduled_start + self.duration
    }
}

/// Planificateur de lecture, propriétaire du sink de la session
pub struct PlaybackScheduler {
    sink: Box<dyn AudioSink>,
    owner: SessionIdentity,
    active: BTreeMap<SourceId, PlaybackSource>,
    next_start_time: f64,
    next_source_id: u64,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn AudioSink>, owner: SessionIdentity) -> Self {
        let next_start_time = sink.current_time();
        Self {
            sink,
            owner,
            active: BTreeMap::new(),
            next_start_time,
            next_source_id: 0,
        }
    }

    /// Planifie un buffer à la suite des sources déjà en file
    ///
    /// # Erreurs
    /// Erreur du sink si la source n'a pas pu démarrer ; l'horloge de
    /// planification n'avance pas dans ce cas.
    pub fn enqueue(&mut self, buffer: &DecodedBuffer) -> AudioResult<PlaybackSource> {
        let now = self.sink.current_time();
        let start = self.next_start_time.max(now);
        let id = SourceId(self.next_source_id);

        let source = PlaybackSource {
            id,
            duration: buffer.duration(),
            scheduled_start: start,
            owner: self.owner,
        };

        self.sink.start_source(id, buffer, start)?;

        self.next_source_id += 1;
        self.next_start_time = source.scheduled_end();
        self.active.insert(id, source.clone());

        trace!(source = %id, start, duration = source.duration, "source planifiée");
        Ok(source)
    }

    /// Retire une source terminée
    ///
    /// Retourne `true` quand plus aucune source n'est active. Les
    /// identifiants inconnus (déjà retirés par `flush`) sont ignorés.
    pub fn on_source_ended(&mut self, id: SourceId) -> bool {
        if self.active.remove(&id).is_none() {
            return false;
        }
        self.active.is_empty()
    }

    /// Arrête toutes les sources et recale l'horloge sur le présent
    pub fn flush(&mut self) {
        let ids: Vec<SourceId> = self.active.keys().copied().collect();
        for id in &ids {
            self.sink.stop_source(*id);
        }
        self.active.clear();
        self.next_start_time = self.sink.current_time();

        if !ids.is_empty() {
            debug!(stopped = ids.len(), "lecture interrompue");
        }
    }

    /// Arrête la lecture et ferme le sink
    pub async fn close(mut self) -> AudioResult<()> {
        self.flush();
        self.sink.close().await
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Sources actives dans l'ordre de planification
    pub fn active_sources(&self) -> impl Iterator<Item = &PlaybackSource> {
        self.active.values()
    }

    pub fn current_time(&self) -> f64 {
        self.sink.current_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio::{SimulatedSink, SimulatedSinkHandle};

    fn scheduler() -> (PlaybackScheduler, SimulatedSinkHandle) {
        let sink = SimulatedSink::new();
        let handle = sink.handle();
        (PlaybackScheduler::new(Box::new(sink), SessionIdentity::new()), handle)
    }

    fn buffer(seconds: f64) -> DecodedBuffer {
        DecodedBuffer::new(vec![0.0; (seconds * 24000.0).round() as usize], 24000)
    }

    #[test]
    fn test_back_to_back_enqueue() {
        let (mut scheduler, handle) = scheduler();
        handle.set_time(1.0);

        let a = scheduler.enqueue(&buffer(0.5)).unwrap();
        let b = scheduler.enqueue(&buffer(0.25)).unwrap();

        assert!((a.scheduled_start - 1.0).abs() < 1e-9);
        assert!((b.scheduled_start - 1.5).abs() < 1e-9);
        assert!((scheduler.next_start_time() - 1.75).abs() < 1e-9);
        assert_eq!(scheduler.active_count(), 2);
    }

    #[test]
    fn test_late_chunk_starts_now() {
        let (mut scheduler, handle) = scheduler();

        scheduler.enqueue(&buffer(0.1)).unwrap();
        handle.set_time(2.0);
        let late = scheduler.enqueue(&buffer(0.1)).unwrap();

        assert!((late.scheduled_start - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_sources_never_overlap() {
        let (mut scheduler, handle) = scheduler();
        let durations = [0.2, 0.05, 0.5, 0.01, 0.3];
        let mut clock = 0.0;

        for (i, d) in durations.iter().enumerate() {
            if i % 2 == 1 {
                clock += 0.1;
                handle.set_time(clock);
            }
            scheduler.enqueue(&buffer(*d)).unwrap();
        }

        let started = handle.started();
        for pair in started.windows(2) {
            assert!(pair[0].end() <= pair[1].start_at + 1e-9);
        }
        for source in &started {
            assert!(source.start_at >= 0.0);
        }
    }

    #[test]
    fn test_flush_resets_clock() {
        let (mut scheduler, handle) = scheduler();
        scheduler.enqueue(&buffer(1.0)).unwrap();
        scheduler.enqueue(&buffer(1.0)).unwrap();
        handle.set_time(0.4);

        scheduler.flush();

        assert!(scheduler.is_idle());
        assert!((scheduler.next_start_time() - 0.4).abs() < 1e-9);
        assert_eq!(handle.stopped(), vec![SourceId(0), SourceId(1)]);

        let next = scheduler.enqueue(&buffer(0.1)).unwrap();
        assert!((next.scheduled_start - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_on_source_ended() {
        let (mut scheduler, _handle) = scheduler();
        let a = scheduler.enqueue(&buffer(0.1)).unwrap();
        let b = scheduler.enqueue(&buffer(0.1)).unwrap();

        assert!(!scheduler.on_source_ended(a.id));
        assert!(!scheduler.on_source_ended(SourceId(99)));
        assert!(scheduler.on_source_ended(b.id));
        assert!(!scheduler.on_source_ended(b.id));
    }

    #[test]
    fn test_ended_after_flush_is_ignored() {
        let (mut scheduler, _handle) = scheduler();
        let stale = scheduler.enqueue(&buffer(0.1)).unwrap();
        scheduler.flush();
        let fresh = scheduler.enqueue(&buffer(0.1)).unwrap();

        // La notification de la source arrêtée arrive après le flush
        assert!(!scheduler.on_source_ended(stale.id));
        assert_eq!(scheduler.active_count(), 1);
        assert!(scheduler.on_source_ended(fresh.id));
    }

    #[tokio::test]
    async fn test_close_stops_and_closes_sink() {
        let (mut scheduler, handle) = scheduler();
        scheduler.enqueue(&buffer(0.1)).unwrap();

        scheduler.close().await.unwrap();

        assert!(handle.is_closed());
        assert_eq!(handle.stopped(), vec![SourceId(0)]);
    }
}
