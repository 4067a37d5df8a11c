use alloc::vec::Vec;

use derive_new::new;

use super::{DistributedType, Placement, divided_tensor_efficiency, leaf_candidate_nd_sbps};
use crate::SearchConfig;
use crate::ir::TensorType;

/// A feasible distribution together with its burst efficiency.
#[derive(new, Clone, Debug, PartialEq)]
pub struct RankedCandidate {
    /// The candidate distribution.
    pub distributed: DistributedType,
    /// Score of [`divided_tensor_efficiency`] at the configured burst length.
    pub efficiency: f64,
}

/// Scores every leaf candidate of `tensor_type` and sorts them, most efficient first.
///
/// Candidates with the same score keep their enumeration order. At most
/// [`candidate_limit`](SearchConfig::candidate_limit) candidates are returned.
pub fn rank_leaf_candidates(
    tensor_type: &TensorType,
    placement: &Placement,
    config: &SearchConfig,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = leaf_candidate_nd_sbps(tensor_type, placement)
        .map(|nd_sbp| {
            let distributed =
                DistributedType::from_parts(tensor_type.clone(), nd_sbp, placement.clone());
            let efficiency = divided_tensor_efficiency(&distributed, config.burst_length);
            RankedCandidate::new(distributed, efficiency)
        })
        .collect();

    ranked.sort_by(|a, b| b.efficiency.total_cmp(&a.efficiency));
    if let Some(limit) = config.candidate_limit {
        ranked.truncate(limit);
    }

    log::debug!(
        "Ranked {} candidate(s) for {} on {}",
        ranked.len(),
        tensor_type,
        placement
    );
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DType;
    use crate::sharding::{DeviceKind, Sbp};
    use alloc::vec;

    #[test]
    fn test_ranking_prefers_contiguous_tiles() {
        let tensor_type = TensorType::fixed(DType::F32, [8, 16]);
        let placement = Placement::new(DeviceKind::Cpu, vec![4], ["x"]).unwrap();
        let ranked = rank_leaf_candidates(&tensor_type, &placement, &SearchConfig::default());

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].efficiency, 1.0);
        // Splitting the inner axis leaves 16-byte runs.
        let last = ranked.last().unwrap();
        assert_eq!(last.distributed.nd_sbp(), &[Sbp::split(1)]);
        assert!(last.efficiency < 1.0);
        for pair in ranked.windows(2) {
            assert!(pair[0].efficiency >= pair[1].efficiency);
        }
    }

    #[test]
    fn test_ranking_honors_candidate_limit() {
        let tensor_type = TensorType::fixed(DType::F32, [8, 16]);
        let placement = Placement::new(DeviceKind::Cpu, vec![2, 4], ["x", "y"]).unwrap();
        let config = SearchConfig::default().with_candidate_limit(Some(2));

        assert_eq!(rank_leaf_candidates(&tensor_type, &placement, &config).len(), 2);
    }
}
