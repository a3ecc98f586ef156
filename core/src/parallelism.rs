//! parallelism.rs
//! Default pool width and engine thread count for this host.

/// Parallelism configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelismProfile {
    /// Worker tasks running at once.
    pub concurrency: usize,
    /// Threads inside one engine call.
    pub engine_threads: usize,
}

impl ParallelismProfile {
    /// One worker per core.
    pub fn detect() -> Self {
        let cores = num_cpus::get().max(1);
        Self {
            concurrency: cores,
            engine_threads: 1,
        }
    }

    /// Cap pool width by memory: each in-flight chunk is assumed to hold
    /// `chunk_bytes` (payload, parsed rows and output together).
    pub fn dynamic(chunk_bytes: u64, mem_fraction: f64, hard_cap: usize) -> Self {
        let cores = num_cpus::get().max(1);

        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        let avail_bytes = sys.available_memory();
        let budget = (avail_bytes as f64 * mem_fraction) as u64;
        let by_memory = if chunk_bytes == 0 {
            hard_cap as u64
        } else {
            budget / chunk_bytes
        };

        let concurrency = (by_memory.min(hard_cap as u64) as usize).clamp(1, cores);
        let engine_threads = (cores / concurrency).max(1);

        log::info!(
            "[PROFILE] cores={}, avail_mem={}B, concurrency={}, engine_threads={}",
            cores,
            avail_bytes,
            concurrency,
            engine_threads
        );

        Self {
            concurrency,
            engine_threads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_profile_is_never_zero() {
        let p = ParallelismProfile::dynamic(u64::MAX, 0.5, 8);
        assert!(p.concurrency >= 1);
        assert!(p.engine_threads >= 1);
    }
}
