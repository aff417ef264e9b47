use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{SpectrumKey, SpectrumSummary};

/// A shared record of spectra encountered while reading identification files. Implementations
/// must serialise writes: readers for different files can run on different threads.
pub trait SpectrumRegistry: Send + Sync {
    /// Store the summary if there is no entry for this key yet, returns true if it was inserted.
    /// An existing entry is never replaced or duplicated.
    fn insert_if_absent(&self, key: SpectrumKey, summary: SpectrumSummary) -> bool;

    /// Get the summary for a spectrum
    fn get(&self, key: &SpectrumKey) -> Option<SpectrumSummary>;

    /// If the spectrum is known and explicitly flagged as decoy
    fn is_flagged_decoy(&self, key: &SpectrumKey) -> bool {
        self.get(key).is_some_and(|s| s.decoy)
    }
}

/// An in memory registry, all access goes through a single lock
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    spectra: Mutex<HashMap<SpectrumKey, SpectrumSummary>>,
}

impl MemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from known spectra, for example with spectra flagged as decoy
    pub fn with_spectra(spectra: impl IntoIterator<Item = (SpectrumKey, SpectrumSummary)>) -> Self {
        Self {
            spectra: Mutex::new(spectra.into_iter().collect()),
        }
    }

    /// The number of registered spectra
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// If no spectra are registered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take all registered spectra out of the registry
    pub fn into_inner(self) -> HashMap<SpectrumKey, SpectrumSummary> {
        self.spectra
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // A panic while holding the lock cannot leave the map half updated, so poisoning is ignored
    fn lock(&self) -> MutexGuard<'_, HashMap<SpectrumKey, SpectrumSummary>> {
        self.spectra.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SpectrumRegistry for MemoryRegistry {
    fn insert_if_absent(&self, key: SpectrumKey, summary: SpectrumSummary) -> bool {
        let mut spectra = self.lock();
        if spectra.contains_key(&key) {
            false
        } else {
            spectra.insert(key, summary);
            true
        }
    }

    fn get(&self, key: &SpectrumKey) -> Option<SpectrumSummary> {
        self.lock().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn insert_once() {
        let registry = MemoryRegistry::new();
        let key = SpectrumKey::new("run.mgf", "scan 1");
        assert!(registry.insert_if_absent(
            key.clone(),
            SpectrumSummary {
                query: 1,
                ..Default::default()
            }
        ));
        assert!(!registry.insert_if_absent(
            key.clone(),
            SpectrumSummary {
                query: 2,
                decoy: true,
                ..Default::default()
            }
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&key).map(|s| s.query), Some(1));
        assert!(!registry.is_flagged_decoy(&key));
    }

    #[test]
    fn concurrent_inserts() {
        let registry = Arc::new(MemoryRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|thread| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|i| {
                            registry.insert_if_absent(
                                SpectrumKey::new("run.mgf", format!("scan {i}")),
                                SpectrumSummary {
                                    query: thread,
                                    ..Default::default()
                                },
                            )
                        })
                        .count()
                })
            })
            .collect();
        let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(inserted, 100);
        assert_eq!(registry.len(), 100);
    }
}
