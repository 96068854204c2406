//! Process-wide guard: at most one live server per backend kind.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock, PoisonError};

use toke_core::BackendKind;

use crate::error::BackendError;

fn claimed() -> &'static Mutex<HashSet<BackendKind>> {
    static CLAIMED: OnceLock<Mutex<HashSet<BackendKind>>> = OnceLock::new();
    CLAIMED.get_or_init(Mutex::default)
}

/// Exclusive claim on a backend kind, released on drop.
#[derive(Debug)]
pub struct KindGuard {
    kind: BackendKind,
}

impl KindGuard {
    /// Claim `kind`, failing if another owner holds it.
    pub fn acquire(kind: BackendKind) -> Result<Self, BackendError> {
        let mut set = claimed().lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(kind) {
            return Err(BackendError::AlreadyRunning(kind));
        }
        Ok(Self { kind })
    }

    pub const fn kind(&self) -> BackendKind {
        self.kind
    }
}

impl Drop for KindGuard {
    fn drop(&mut self) {
        claimed()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Only the MLX kind is used here so orchestrator tests on llama.cpp
    // never race with this one.
    #[test]
    fn second_claim_fails_until_release() {
        let first = KindGuard::acquire(BackendKind::Mlx).unwrap();
        assert_eq!(first.kind(), BackendKind::Mlx);
        let err = KindGuard::acquire(BackendKind::Mlx).unwrap_err();
        assert!(matches!(err, BackendError::AlreadyRunning(BackendKind::Mlx)));

        drop(first);
        let again = KindGuard::acquire(BackendKind::Mlx).unwrap();
        drop(again);
    }
}
