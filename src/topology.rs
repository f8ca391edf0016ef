//! Network topology and route reconstruction from message history.
//!
//! Both views are derived read-only from the message log. The route
//! estimator is a heuristic: it groups historical traffic addressed to the
//! target by recorded hop distance and threads the most recent witness per
//! distance into a path. It approximates how packets have been reaching the
//! node; it is not a live traceroute and can disagree with the route the
//! mesh would pick right now.

use std::collections::BTreeMap;

use crate::db::{Database, NetworkTopology, RouteObservation};
use crate::directory::NodeDirectory;

/// Messages considered when estimating a route.
const ROUTE_EVIDENCE_LIMIT: i64 = 100;

/// One hop of an estimated route.
#[derive(Debug, Clone)]
pub struct RouteHop {
    pub node_id: String,
    pub node_name: String,
    /// Recorded hop distance of the witness message; 0 for the target.
    pub hops_away: i64,
    pub snr: Option<f64>,
    pub rssi: Option<f64>,
}

/// An estimated path to a node plus a coarse quality grade.
#[derive(Debug, Clone)]
pub struct RouteEstimate {
    pub hops: Vec<RouteHop>,
    pub quality: &'static str,
}

#[derive(Clone)]
pub struct TopologyReconstructor {
    db: Database,
    directory: NodeDirectory,
}

impl TopologyReconstructor {
    pub fn new(db: Database, directory: NodeDirectory) -> Self {
        TopologyReconstructor { db, directory }
    }

    /// Who has talked to whom over the trailing 24 hours, busiest pairs
    /// first, plus roster aggregates.
    pub async fn network_topology(&self) -> NetworkTopology {
        self.db.get_network_topology().await
    }

    /// Estimate the hop-by-hop path traffic takes to reach `target_node_id`.
    /// Empty when no message history exists for the target.
    pub async fn route_to_node(&self, target_node_id: &str) -> RouteEstimate {
        let observations = self
            .db
            .messages_to_node(target_node_id, ROUTE_EVIDENCE_LIMIT)
            .await;
        if observations.is_empty() {
            return RouteEstimate {
                hops: Vec::new(),
                quality: "unknown",
            };
        }

        // Most recent witness per distinct hop distance.
        let mut by_hops: BTreeMap<i64, &RouteObservation> = BTreeMap::new();
        for obs in &observations {
            let hops = obs.hops_away.unwrap_or(0);
            let newer = by_hops
                .get(&hops)
                .map(|existing| obs.timestamp > existing.timestamp)
                .unwrap_or(true);
            if newer {
                by_hops.insert(hops, obs);
            }
        }

        let mut hops = Vec::with_capacity(by_hops.len() + 1);
        for (hop_count, obs) in &by_hops {
            let node_id = obs.from_node_id.clone().unwrap_or_default();
            let node_name = if node_id.is_empty() {
                "unknown".to_string()
            } else {
                self.directory.display_name(&node_id).await
            };
            hops.push(RouteHop {
                node_id,
                node_name,
                hops_away: *hop_count,
                snr: obs.snr,
                rssi: obs.rssi,
            });
        }

        hops.push(RouteHop {
            node_id: target_node_id.to_string(),
            node_name: self.directory.display_name(target_node_id).await,
            hops_away: 0,
            snr: None,
            rssi: None,
        });

        let quality = assess_route_quality(&hops);
        RouteEstimate { hops, quality }
    }
}

/// Coarse grade from the path's average SNR and length.
fn assess_route_quality(hops: &[RouteHop]) -> &'static str {
    let snrs: Vec<f64> = hops.iter().filter_map(|hop| hop.snr).collect();
    let avg_snr = if snrs.is_empty() {
        0.0
    } else {
        snrs.iter().sum::<f64>() / snrs.len() as f64
    };
    let total_hops = hops.len().saturating_sub(1);

    if avg_snr > 10.0 && total_hops <= 2 {
        "excellent"
    } else if avg_snr > 5.0 && total_hops <= 4 {
        "good"
    } else if avg_snr > 0.0 && total_hops <= 6 {
        "fair"
    } else {
        "poor"
    }
}

#[cfg(test)]
mod tests {
    use super::{assess_route_quality, RouteHop};

    fn hop(snr: Option<f64>) -> RouteHop {
        RouteHop {
            node_id: "!00000001".into(),
            node_name: "n".into(),
            hops_away: 1,
            snr,
            rssi: None,
        }
    }

    #[test]
    fn quality_grading() {
        assert_eq!(assess_route_quality(&[hop(Some(12.0)), hop(None)]), "excellent");
        assert_eq!(
            assess_route_quality(&[hop(Some(7.0)), hop(Some(6.0)), hop(None)]),
            "good"
        );
        assert_eq!(
            assess_route_quality(&[hop(Some(1.0)), hop(Some(2.0)), hop(None)]),
            "fair"
        );
        assert_eq!(assess_route_quality(&[hop(Some(-5.0)), hop(None)]), "poor");
    }
}
