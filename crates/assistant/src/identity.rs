//! Identité de session
//!
//! Chaque `connect()` frappe une nouvelle identité. Toute continuation
//! asynchrone (bloc micro, événement du canal, fin de lecture) emporte
//! l'identité sous laquelle elle a été créée et devient sans effet dès
//! qu'elle ne correspond plus à l'identité courante.

use std::fmt;

use uuid::Uuid;

/// Jeton opaque et unique d'une session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionIdentity(Uuid);

impl SessionIdentity {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new()
    }
}

// Forme courte pour les logs
impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = self.0.simple().to_string();
        f.write_str(&full[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities_are_unique() {
        let a = SessionIdentity::new();
        let b = SessionIdentity::new();

        assert_ne!(a, b);
        let copy = a;
        assert_eq!(a, copy);
        assert_eq!(a.to_string().len(), 8);
    }
}
