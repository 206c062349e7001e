//! NUMA topology discovery.
//!
//! Grounded on the `NumaTopology::detect` / `current_node` pattern used for
//! NUMA-aware allocation in the reference pack (parsing
//! `/sys/devices/system/node/` on Linux, falling back to a single node
//! everywhere else). Discovery happens once, during `init`; the result is
//! immutable for the remainder of the process's life.

use log::{info, warn};

/// An immutable topology record: node count, CPU count, and the CPU-to-node
/// mapping.
#[derive(Debug, Clone)]
pub struct Topology {
    num_nodes: usize,
    num_cpus: usize,
    cpu_to_node: Vec<u32>,
}

impl Topology {
    /// Discover the host's NUMA topology.
    ///
    /// Degrades to a single-node topology (every CPU maps to node 0)
    /// whenever the platform's NUMA facility is absent or reports only one
    /// node; this is not treated as an error per `spec.md` §4.2.
    pub fn discover() -> Self {
        #[cfg(target_os = "linux")]
        {
            if let Some(t) = Self::discover_linux() {
                return t;
            }
        }
        let num_cpus = num_cpus::get().max(1);
        info!(
            "NUMA topology unavailable or single-node; using {} CPU(s) on node 0",
            num_cpus
        );
        Topology {
            num_nodes: 1,
            num_cpus,
            cpu_to_node: vec![0; num_cpus],
        }
    }

    #[cfg(target_os = "linux")]
    fn discover_linux() -> Option<Self> {
        let entries = std::fs::read_dir("/sys/devices/system/node/").ok()?;
        let mut node_ids: Vec<u32> = Vec::new();
        let mut node_cpus: Vec<(u32, Vec<usize>)> = Vec::new();

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_str()?;
            if let Some(rest) = name.strip_prefix("node") {
                if let Ok(node_id) = rest.parse::<u32>() {
                    let cpulist_path = entry.path().join("cpulist");
                    let cpus = std::fs::read_to_string(&cpulist_path)
                        .ok()
                        .map(|s| parse_cpu_list(&s))
                        .unwrap_or_default();
                    node_ids.push(node_id);
                    node_cpus.push((node_id, cpus));
                }
            }
        }

        if node_ids.len() <= 1 {
            return None;
        }

        let num_cpus = num_cpus::get().max(1);
        let mut cpu_to_node = vec![0u32; num_cpus];
        for (node, cpus) in &node_cpus {
            for &cpu in cpus {
                if cpu < num_cpus {
                    cpu_to_node[cpu] = *node;
                }
            }
        }

        let num_nodes = node_ids.iter().max().map(|m| *m as usize + 1).unwrap_or(1);
        Some(Topology {
            num_nodes,
            num_cpus,
            cpu_to_node,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_cpus(&self) -> usize {
        self.num_cpus
    }

    /// The home node of the currently executing CPU.
    ///
    /// Clamped to 0 if the observed CPU index is outside the known range.
    pub fn current_node(&self) -> u32 {
        let cpu = current_cpu();
        self.cpu_to_node.get(cpu).copied().unwrap_or(0)
    }

    /// Render a human-readable summary to the logging sink.
    pub fn print(&self) {
        info!(
            "topology: {} node(s), {} logical CPU(s)",
            self.num_nodes, self.num_cpus
        );
        for node in 0..self.num_nodes as u32 {
            let cpus: Vec<usize> = self
                .cpu_to_node
                .iter()
                .enumerate()
                .filter(|(_, n)| **n == node)
                .map(|(c, _)| c)
                .collect();
            info!("  node {}: cpus {:?}", node, cpus);
        }
    }
}

#[cfg(target_os = "linux")]
fn current_cpu() -> usize {
    let cpu = unsafe { libc::sched_getcpu() };
    if cpu >= 0 {
        cpu as usize
    } else {
        warn!("sched_getcpu failed, assuming cpu 0");
        0
    }
}

#[cfg(not(target_os = "linux"))]
fn current_cpu() -> usize {
    0
}

/// Parse a `/sys`-style CPU list such as `"0-3,8-11"`.
fn parse_cpu_list(cpulist: &str) -> Vec<usize> {
    let mut cpus = Vec::new();
    for part in cpulist.trim().split(',') {
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.parse::<usize>(), end.parse::<usize>()) {
                cpus.extend(start..=end);
            }
        } else if let Ok(cpu) = part.parse::<usize>() {
            cpus.push(cpu);
        }
    }
    cpus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cpu_list_ranges_and_singletons() {
        assert_eq!(parse_cpu_list("0-3,8-11"), vec![0, 1, 2, 3, 8, 9, 10, 11]);
        assert_eq!(parse_cpu_list("5"), vec![5]);
        assert_eq!(parse_cpu_list(""), Vec::<usize>::new());
    }

    #[test]
    fn discover_produces_consistent_topology() {
        let t = Topology::discover();
        assert!(t.num_nodes() >= 1);
        assert!(t.num_cpus() >= 1);
        let node = t.current_node();
        assert!((node as usize) < t.num_nodes());
    }
}
