//! bakery-allocator — finds free loopback TCP ports inside a configured
//! range.
//!
//! Allocation uses two exclusion layers: the caller's reserved set (ports
//! already persisted in the store, possibly stale) and a live bind probe
//! (catches ports held by other processes on the host). Both are required:
//! the probe alone races against concurrent daemon callers, the reserved set
//! alone trusts reservations that may have been abandoned.

use std::collections::HashSet;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Errors from port allocation.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("port count must be a positive integer")]
    InvalidCount,

    #[error("Unable to allocate {needed} free ports in configured range")]
    Exhausted { needed: usize, start: u16, end: u16 },
}

/// Allocates free TCP ports in `[start, end]`, ascending.
///
/// The candidate-selection loop is serialized on an internal mutex so
/// overlapping calls within the daemon walk the range one at a time.
pub struct PortAllocator {
    start: u16,
    end: u16,
    lock: Mutex<()>,
}

impl PortAllocator {
    /// Create an allocator over the inclusive range `[start, end]`.
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            start,
            end,
            lock: Mutex::new(()),
        }
    }

    /// Inclusive range bounds.
    pub fn range(&self) -> (u16, u16) {
        (self.start, self.end)
    }

    /// Return `count` distinct ports in the range, none in `reserved`, each
    /// momentarily bindable on the loopback interface at selection time.
    /// Ports are ascending. Fails with [`AllocError::Exhausted`] when the
    /// range runs out before `count` ports are found.
    pub async fn allocate_many(
        &self,
        count: usize,
        reserved: &HashSet<u16>,
    ) -> Result<Vec<u16>, AllocError> {
        if count == 0 {
            return Err(AllocError::InvalidCount);
        }

        let _guard = self.lock.lock().await;

        let mut result = Vec::with_capacity(count);
        for port in self.start..=self.end {
            if reserved.contains(&port) || result.contains(&port) {
                continue;
            }
            if probe(port).await {
                result.push(port);
                if result.len() == count {
                    debug!(?result, "ports allocated");
                    return Ok(result);
                }
            }
        }

        Err(AllocError::Exhausted {
            needed: count,
            start: self.start,
            end: self.end,
        })
    }
}

/// Transient bind-and-release on loopback. The listener is dropped before
/// returning, releasing the port.
async fn probe(port: u16) -> bool {
    match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(e) => {
            trace!(port, error = %e, "port probe failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn allocates_distinct_ascending_ports() {
        let allocator = PortAllocator::new(41000, 41100);
        let ports = allocator.allocate_many(3, &HashSet::new()).await.unwrap();

        assert_eq!(ports.len(), 3);
        let mut sorted = ports.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted, ports, "ports are ascending and distinct");
        assert!(ports.iter().all(|p| (41000..=41100).contains(p)));
    }

    #[tokio::test]
    async fn skips_reserved_ports() {
        let allocator = PortAllocator::new(41200, 41210);
        let reserved: HashSet<u16> = [41200, 41201, 41202].into_iter().collect();

        let ports = allocator.allocate_many(2, &reserved).await.unwrap();
        assert!(ports.iter().all(|p| !reserved.contains(p)));
        assert!(ports[0] >= 41203);
    }

    #[tokio::test]
    async fn skips_ports_held_by_other_processes() {
        // Occupy the first port of the range for the duration of the call.
        let held = TcpListener::bind(("127.0.0.1", 41300)).await.unwrap();

        let allocator = PortAllocator::new(41300, 41310);
        let ports = allocator.allocate_many(1, &HashSet::new()).await.unwrap();
        assert_ne!(ports[0], 41300);

        drop(held);
    }

    #[tokio::test]
    async fn zero_count_is_invalid() {
        let allocator = PortAllocator::new(41400, 41410);
        let err = allocator.allocate_many(0, &HashSet::new()).await.unwrap_err();
        assert!(matches!(err, AllocError::InvalidCount));
    }

    #[tokio::test]
    async fn exhaustion_when_range_fully_reserved() {
        let allocator = PortAllocator::new(41500, 41501);
        let reserved: HashSet<u16> = [41500, 41501].into_iter().collect();

        let err = allocator.allocate_many(2, &reserved).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to allocate 2 free ports in configured range"
        );
    }

    #[tokio::test]
    async fn exhaustion_when_range_too_small() {
        let allocator = PortAllocator::new(41600, 41601);
        let err = allocator.allocate_many(5, &HashSet::new()).await.unwrap_err();
        assert!(matches!(err, AllocError::Exhausted { needed: 5, .. }));
    }

    #[tokio::test]
    async fn probe_releases_the_port() {
        let allocator = PortAllocator::new(41700, 41700);
        let ports = allocator.allocate_many(1, &HashSet::new()).await.unwrap();

        // The probe's listener is gone; the returned port binds cleanly.
        let listener = TcpListener::bind(("127.0.0.1", ports[0])).await;
        assert!(listener.is_ok());
    }

    #[tokio::test]
    async fn concurrent_calls_serialize() {
        let allocator = Arc::new(PortAllocator::new(41800, 41900));

        let a = {
            let allocator = allocator.clone();
            tokio::spawn(async move { allocator.allocate_many(5, &HashSet::new()).await })
        };
        let b = {
            let allocator = allocator.clone();
            tokio::spawn(async move { allocator.allocate_many(5, &HashSet::new()).await })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_eq!(a.len(), 5);
        assert_eq!(b.len(), 5);
        // Each call individually returns distinct ports; with empty reserved
        // sets the two calls may overlap — the store's uniqueness constraint
        // and the orchestrator's serialization handle that layer.
        for ports in [&a, &b] {
            let mut sorted = (*ports).clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(&sorted, ports);
        }
    }
}
