use std::cmp::Ordering;
use std::collections::HashMap;

use crate::instance::InstanceRecord;

/// Implements §4.6's fair-share rule: base = `floor(total / n)` (min 1),
/// remainder distributed to the peers with the most `pendingCount` (ties
/// broken by higher `avgLatencyMs`, then by older `startedAt`).
///
/// When `total < n` the minimum-1 floor can't be honoured without the sum
/// exceeding `total`; this implementation keeps the floor and lets the sum
/// exceed `total` in that edge case rather than starving an instance to 0.
pub(crate) fn compute(peers: &[InstanceRecord], total_max_llm: usize) -> HashMap<String, usize> {
    if peers.is_empty() {
        return HashMap::new();
    }

    let n = peers.len();
    let base = (total_max_llm / n).max(1);
    let mut shares: HashMap<String, usize> =
        peers.iter().map(|p| (p.instance_id.clone(), base)).collect();

    let remainder = total_max_llm.saturating_sub(base * n);

    let mut order: Vec<&InstanceRecord> = peers.iter().collect();
    order.sort_by(|a, b| {
        b.pending_count
            .cmp(&a.pending_count)
            .then_with(|| {
                b.avg_latency_ms
                    .partial_cmp(&a.avg_latency_ms)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.started_at.cmp(&b.started_at))
    });

    for peer in order.into_iter().take(remainder) {
        if let Some(share) = shares.get_mut(&peer.instance_id) {
            *share += 1;
        }
    }

    let cap = total_max_llm.max(1);
    for share in shares.values_mut() {
        *share = (*share).min(cap);
    }

    shares
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str, pending: usize, latency: f64, started_at: u64) -> InstanceRecord {
        InstanceRecord {
            instance_id: id.to_string(),
            pid: 1,
            cwd: "/".to_string(),
            started_at,
            last_heartbeat_at: started_at,
            active_models: vec![],
            active_requests: 0,
            active_llm: 0,
            pending_count: pending,
            avg_latency_ms: latency,
        }
    }

    #[test]
    fn splits_evenly_with_no_remainder() {
        let peers = vec![instance("a", 0, 0.0, 0), instance("b", 0, 0.0, 1)];
        let shares = compute(&peers, 10);
        assert_eq!(shares["a"], 5);
        assert_eq!(shares["b"], 5);
    }

    #[test]
    fn remainder_goes_to_busiest_by_pending_count() {
        let peers = vec![
            instance("a", 5, 0.0, 0),
            instance("b", 1, 0.0, 1),
            instance("c", 0, 0.0, 2),
        ];
        let shares = compute(&peers, 10);
        assert_eq!(shares["a"], 4);
        assert_eq!(shares["b"], 3);
        assert_eq!(shares["c"], 3);
        assert_eq!(shares.values().sum::<usize>(), 10);
    }

    #[test]
    fn minimum_share_is_one() {
        let peers = vec![instance("a", 0, 0.0, 0), instance("b", 0, 0.0, 1)];
        let shares = compute(&peers, 1);
        assert_eq!(shares["a"], 1);
        assert_eq!(shares["b"], 1);
    }

    #[test]
    fn ties_broken_by_older_started_at() {
        let peers = vec![instance("newer", 2, 5.0, 100), instance("older", 2, 5.0, 10)];
        let shares = compute(&peers, 3);
        assert_eq!(shares["older"], 2);
        assert_eq!(shares["newer"], 1);
    }
}
