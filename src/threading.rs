use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::errors::{Result, TrimError};
use crate::filter::TrimStats;

/// Slots of one batch assigned to a single worker, in batch order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkLane {
    pub slots: Vec<usize>,
    /// Total bases assigned so far.
    pub load: usize,
}

/// Spreads slots over `workers` lanes, always feeding the lightest lane next.
///
/// `weights` holds one entry per slot (sequence length, or both mates' lengths for a
/// pair). Ties go to the lowest lane number, so the result is deterministic.
pub fn distribute<I>(weights: I, workers: usize) -> Vec<WorkLane>
where
    I: IntoIterator<Item = usize>,
{
    let workers = workers.max(1);
    let mut lanes = vec![WorkLane::default(); workers];
    let mut lightest: BinaryHeap<Reverse<(usize, usize)>> =
        (0..workers).map(|lane| Reverse((0, lane))).collect();

    for (slot, weight) in weights.into_iter().enumerate() {
        let Some(Reverse((load, lane))) = lightest.pop() else { break };
        lanes[lane].slots.push(slot);
        lanes[lane].load = load + weight;
        lightest.push(Reverse((lanes[lane].load, lane)));
    }
    lanes
}

/// Runs `task` for every slot of every lane, one scoped thread per non-empty lane, and
/// returns the results in slot order.
///
/// Returns after every lane has finished. If several slots fail, the error of the
/// lowest slot wins so the reported failure does not depend on scheduling.
pub fn run_lanes<T, F>(lanes: &[WorkLane], task: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync,
{
    let slot_count: usize = lanes.iter().map(|lane| lane.slots.len()).sum();
    let busy: Vec<&WorkLane> = lanes.iter().filter(|lane| !lane.slots.is_empty()).collect();

    let lane_results: Vec<LaneResult<T>> = if busy.len() <= 1 {
        busy.iter().map(|lane| run_lane(lane, &task)).collect()
    } else {
        let task = &task;
        crossbeam::scope(|scope| {
            let handles: Vec<_> = busy
                .iter()
                .map(|lane| scope.spawn(move |_| run_lane(lane, task)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().map_err(|_| TrimError::WorkerPanicked))
                .collect::<Result<Vec<_>>>()
        })
        .map_err(|_| TrimError::WorkerPanicked)??
    };

    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(slot_count).collect();
    let mut first_error: Option<(usize, TrimError)> = None;
    for result in lane_results {
        match result {
            Ok(done) => {
                for (slot, value) in done {
                    slots[slot] = Some(value);
                }
            }
            Err((slot, err)) => {
                if first_error.as_ref().map_or(true, |(s, _)| slot < *s) {
                    first_error = Some((slot, err));
                }
            }
        }
    }
    if let Some((_, err)) = first_error {
        return Err(err);
    }
    slots.into_iter().map(|v| v.ok_or(TrimError::WorkerPanicked)).collect()
}

type LaneResult<T> = std::result::Result<Vec<(usize, T)>, (usize, TrimError)>;

fn run_lane<T, F>(lane: &WorkLane, task: &F) -> LaneResult<T>
where
    F: Fn(usize) -> Result<T>,
{
    lane.slots
        .iter()
        .map(|&slot| task(slot).map(|value| (slot, value)).map_err(|err| (slot, err)))
        .collect()
}

/// Formatted output of one batch, ready for the writer.
#[derive(Debug, Default)]
pub struct ProcessedBatch {
    /// Position of the batch in read order, starting at 0.
    pub serial: u64,
    /// Kept single-end records, forward mates, or interleaved pairs.
    pub primary: Vec<u8>,
    /// Reverse mates of split paired output.
    pub mate: Vec<u8>,
    /// Mates whose partner was discarded.
    pub singles: Vec<u8>,
    pub stats: TrimStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_slot_assigned_once_in_order() {
        let weights = vec![100, 5, 5, 5, 90, 10, 10, 1];
        let lanes = distribute(weights.iter().copied(), 3);
        let mut all: Vec<usize> = lanes.iter().flat_map(|l| l.slots.iter().copied()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..weights.len()).collect::<Vec<_>>());
        for lane in &lanes {
            assert!(lane.slots.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(lane.load, lane.slots.iter().map(|&s| weights[s]).sum::<usize>());
        }
    }

    #[test]
    fn test_long_reads_spread_out() {
        let lanes = distribute([150, 150, 150, 150, 10, 10, 10, 10], 4);
        for lane in &lanes {
            assert_eq!(lane.load, 160);
        }
    }

    #[test]
    fn test_more_workers_than_slots() {
        let lanes = distribute([3, 4], 8);
        assert_eq!(lanes.len(), 8);
        assert_eq!(lanes.iter().filter(|l| !l.slots.is_empty()).count(), 2);
    }

    #[test]
    fn test_run_lanes_restores_slot_order() {
        let weights: Vec<usize> = (0..200).map(|i| (i * 37) % 101).collect();
        for workers in [1, 2, 5, 16] {
            let lanes = distribute(weights.iter().copied(), workers);
            let out = run_lanes(&lanes, |slot| Ok(slot * 2)).unwrap();
            assert_eq!(out, (0..200).map(|s| s * 2).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_run_lanes_reports_lowest_failing_slot() {
        let lanes = distribute(vec![1; 50], 4);
        let err = run_lanes(&lanes, |slot| {
            if slot == 17 || slot == 33 {
                Err(TrimError::TruncatedRecord { lines: slot })
            } else {
                Ok(slot)
            }
        })
        .unwrap_err();
        assert!(matches!(err, TrimError::TruncatedRecord { lines: 17 }));
    }

    #[test]
    fn test_run_lanes_empty() {
        let lanes = distribute(std::iter::empty(), 4);
        let out: Vec<usize> = run_lanes(&lanes, |slot| Ok(slot)).unwrap();
        assert!(out.is_empty());
    }
}
