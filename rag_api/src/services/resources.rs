//! CPU and memory sampling for admission control and `/stats`.

use parking_lot::Mutex;
use sysinfo::{CpuExt, System, SystemExt};

use helpdesk_config::ResourceLimits;

pub struct ResourceMonitor {
    sys: Mutex<System>,
    limits: ResourceLimits,
}

impl ResourceMonitor {
    pub fn new(limits: ResourceLimits) -> Self {
        let mut sys = System::new();
        // First refresh primes the CPU counters; usage numbers are deltas.
        sys.refresh_cpu();
        sys.refresh_memory();
        Self {
            sys: Mutex::new(sys),
            limits,
        }
    }

    /// Current (cpu %, memory %) sample.
    pub fn sample(&self) -> (f32, f32) {
        let mut sys = self.sys.lock();
        sys.refresh_cpu();
        sys.refresh_memory();

        let cpu = sys.global_cpu_info().cpu_usage();
        let memory = if sys.total_memory() > 0 {
            sys.used_memory() as f32 / sys.total_memory() as f32 * 100.0
        } else {
            0.0
        };
        (cpu, memory)
    }

    /// True when the process should stop admitting queries.
    pub fn overloaded(&self) -> bool {
        let (cpu, memory) = self.sample();
        if cpu > self.limits.max_cpu_percent {
            tracing::warn!("CPU usage too high: {:.1}%", cpu);
            return true;
        }
        if memory > self.limits.max_memory_percent {
            tracing::warn!("Memory usage too high: {:.1}%", memory);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_in_percent_range() {
        let monitor = ResourceMonitor::new(ResourceLimits {
            max_cpu_percent: 80.0,
            max_memory_percent: 80.0,
        });
        let (cpu, memory) = monitor.sample();
        assert!((0.0..=100.0).contains(&cpu));
        assert!((0.0..=100.0).contains(&memory));
    }

    #[test]
    fn test_generous_limits_never_overload() {
        let monitor = ResourceMonitor::new(ResourceLimits {
            max_cpu_percent: 100.0,
            max_memory_percent: 100.0,
        });
        assert!(!monitor.overloaded());
    }
}
