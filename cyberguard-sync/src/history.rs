//! Sparkline history: per-node series fed by node updates and cluster series
//! fed by the fixed-interval sampler.

use crate::buffer::RingBuffer;
use crate::models::Node;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct NodeHistory {
    /// cpu %, 0..=100
    pub cpu: RingBuffer<f64>,
    /// memory %, 0..=100
    pub memory: RingBuffer<f64>,
    /// inbound + outbound kbps
    pub network: RingBuffer<f64>,
}

impl NodeHistory {
    fn new(capacity: usize) -> Self {
        Self {
            cpu: RingBuffer::new(capacity),
            memory: RingBuffer::new(capacity),
            network: RingBuffer::new(capacity),
        }
    }

    pub fn series(&self) -> NodeSeries {
        NodeSeries {
            cpu: self.cpu.to_vec(),
            memory: self.memory.to_vec(),
            network: self.network.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterTrends {
    /// average cpu % across nodes
    pub cpu: RingBuffer<f64>,
    pub network_in: RingBuffer<f64>,
    pub network_out: RingBuffer<f64>,
    /// seconds from attack start to detection
    pub detection_latency: RingBuffer<f64>,
}

impl ClusterTrends {
    fn new(capacity: usize) -> Self {
        Self {
            cpu: RingBuffer::new(capacity),
            network_in: RingBuffer::new(capacity),
            network_out: RingBuffer::new(capacity),
            detection_latency: RingBuffer::new(capacity),
        }
    }

    pub fn series(&self) -> ClusterSeries {
        ClusterSeries {
            cpu: self.cpu.to_vec(),
            network_in: self.network_in.to_vec(),
            network_out: self.network_out.to_vec(),
            detection_latency: self.detection_latency.to_vec(),
        }
    }
}

/// Read-only copy of one node's series, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeSeries {
    pub cpu: Vec<f64>,
    pub memory: Vec<f64>,
    pub network: Vec<f64>,
}

/// Read-only copy of the cluster series, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterSeries {
    pub cpu: Vec<f64>,
    pub network_in: Vec<f64>,
    pub network_out: Vec<f64>,
    pub detection_latency: Vec<f64>,
}

/// One cluster sample, rounded the way the sparklines display it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterSample {
    pub avg_cpu_percent: f64,
    pub network_in: f64,
    pub network_out: f64,
}

#[derive(Debug, Clone)]
pub struct History {
    capacity: usize,
    nodes: HashMap<String, NodeHistory>,
    cluster: ClusterTrends,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            nodes: HashMap::new(),
            cluster: ClusterTrends::new(capacity),
        }
    }

    /// Append the node's current cpu %, memory % and throughput
    pub fn record_node(&mut self, node: &Node) {
        let capacity = self.capacity;
        let history = self
            .nodes
            .entry(node.id.clone())
            .or_insert_with(|| NodeHistory::new(capacity));
        history.cpu.push(node.cpu_percent());
        history.memory.push(node.memory_percent());
        history.network.push(node.network_total());
    }

    /// Drop the series of nodes that are no longer tracked
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.nodes.retain(|id, _| keep(id.as_str()));
    }

    /// Aggregate a snapshot of the node map into the cluster series.
    /// Returns `None` (and appends nothing) when there are no nodes.
    pub fn sample_cluster<'a, I>(&mut self, nodes: I) -> Option<ClusterSample>
    where
        I: IntoIterator<Item = &'a Node>,
    {
        let mut count = 0usize;
        let mut cpu_sum = 0.0;
        let mut in_sum = 0.0;
        let mut out_sum = 0.0;
        for node in nodes {
            count += 1;
            cpu_sum += node.metrics.cpu;
            in_sum += node.metrics.network_in;
            out_sum += node.metrics.network_out;
        }
        if count == 0 {
            return None;
        }

        let sample = ClusterSample {
            avg_cpu_percent: (cpu_sum / count as f64 * 100.0).round(),
            network_in: in_sum.round(),
            network_out: out_sum.round(),
        };
        self.cluster.cpu.push(sample.avg_cpu_percent);
        self.cluster.network_in.push(sample.network_in);
        self.cluster.network_out.push(sample.network_out);
        Some(sample)
    }

    pub fn record_detection(&mut self, seconds: f64) {
        self.cluster.detection_latency.push(seconds);
    }

    pub fn node(&self, id: &str) -> Option<&NodeHistory> {
        self.nodes.get(id)
    }

    pub fn node_series(&self) -> HashMap<String, NodeSeries> {
        self.nodes
            .iter()
            .map(|(id, history)| (id.clone(), history.series()))
            .collect()
    }

    pub fn cluster(&self) -> &ClusterTrends {
        &self.cluster
    }
}
