//! État observable de la session

use std::fmt;

/// Statut publié vers l'interface
///
/// Modifié uniquement par le contrôleur de session.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SessionStatus {
    /// Le canal est ouvert et le micro est relié
    pub connected: bool,

    /// Le modèle est en train de parler
    pub speaking: bool,

    /// Niveau du micro dans [0, 1]
    pub volume: f32,
}

impl SessionStatus {
    /// Statut de repos `{false, false, 0}`
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::idle()
    }
}

/// Phase du contrôleur
///
/// `Idle → Connecting → Open → Closing → Idle` ; une erreur ramène à `Idle`
/// depuis n'importe quelle phase active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Open => "open",
            SessionPhase::Closing => "closing",
        }
    }

    /// Une session est en cours d'ouverture ou ouverte
    pub fn is_active(&self) -> bool {
        matches!(self, SessionPhase::Connecting | SessionPhase::Open)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_status() {
        assert!(SessionStatus::idle().is_idle());
        assert!(!SessionStatus { speaking: true, ..SessionStatus::idle() }.is_idle());
    }

    #[test]
    fn test_phase_activity() {
        assert!(!SessionPhase::Idle.is_active());
        assert!(SessionPhase::Connecting.is_active());
        assert!(SessionPhase::Open.is_active());
        assert!(!SessionPhase::Closing.is_active());
        assert_eq!(SessionPhase::Open.to_string(), "open");
    }
}
