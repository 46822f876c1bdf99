use std::collections::{HashMap, VecDeque};

use crate::sink::{PlotCommand, TraceId};

/// Rolling buffer of one trace.
#[derive(Debug, Default)]
pub struct TraceData {
    pub name: String,
    pub unit: String,
    pub live: VecDeque<[f64; 2]>,
    /// Frozen copy shown while paused.
    pub snap: Option<VecDeque<[f64; 2]>>,
}

impl TraceData {
    pub fn prune_by_points(&mut self, max_points: usize) {
        while self.live.len() > max_points {
            self.live.pop_front();
        }
    }

    /// Drop points older than `window` seconds before the newest point.
    pub fn prune_by_time(&mut self, window: f64) {
        let Some(&[t_latest, _]) = self.live.back() else {
            return;
        };
        let cutoff = t_latest - window;
        while matches!(self.live.front(), Some(&[t, _]) if t < cutoff) {
            self.live.pop_front();
        }
    }

    /// Points to draw: the snapshot while paused, else the live buffer.
    pub fn shown(&self) -> &VecDeque<[f64; 2]> {
        self.snap.as_ref().unwrap_or(&self.live)
    }

    /// (min, max) of the shown values, if any are finite.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.shown()
            .iter()
            .map(|p| p[1])
            .filter(|y| y.is_finite())
            .fold(None, |range, y| match range {
                None => Some((y, y)),
                Some((lo, hi)) => Some((lo.min(y), hi.max(y))),
            })
    }
}

/// All traces in registration order.
#[derive(Debug)]
pub struct TracesCollection {
    pub traces: HashMap<TraceId, TraceData>,
    pub order: Vec<TraceId>,
    pub max_points: usize,
    pub time_window: f64,
}

impl TracesCollection {
    pub fn new(max_points: usize, time_window: f64) -> Self {
        Self {
            traces: HashMap::new(),
            order: Vec::new(),
            max_points,
            time_window,
        }
    }

    pub fn apply(&mut self, command: PlotCommand) {
        match command {
            PlotCommand::RegisterTrace { id, name, unit } => {
                if !self.traces.contains_key(&id) {
                    self.order.push(id);
                }
                self.traces.insert(id, TraceData { name, unit, ..Default::default() });
            }
            PlotCommand::Points { trace_id, points } => {
                let Some(trace) = self.traces.get_mut(&trace_id) else {
                    log::trace!("points for unknown trace {}", trace_id);
                    return;
                };
                trace.live.extend(points.iter().map(|p| [p.x, p.y]));
                trace.prune_by_points(self.max_points);
                trace.prune_by_time(self.time_window);
            }
            PlotCommand::ClearAll => self.clear_all(),
        }
    }

    pub fn clear_all(&mut self) {
        for trace in self.traces.values_mut() {
            trace.live.clear();
            trace.snap = None;
        }
    }

    pub fn take_snapshot(&mut self) {
        for trace in self.traces.values_mut() {
            trace.snap = Some(trace.live.clone());
        }
    }

    pub fn clear_snapshot(&mut self) {
        for trace in self.traces.values_mut() {
            trace.snap = None;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceData> + '_ {
        self.order.iter().filter_map(|id| self.traces.get(id))
    }

    /// Time of the newest shown point across all traces.
    pub fn latest_time(&self) -> Option<f64> {
        self.iter()
            .filter_map(|trace| trace.shown().back().map(|p| p[0]))
            .fold(None, |latest: Option<f64>, t| Some(latest.map_or(t, |l| l.max(t))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::PlotPoint;

    fn points(xs: &[f64]) -> Vec<PlotPoint> {
        xs.iter().map(|&x| PlotPoint { x, y: x * 2.0 }).collect()
    }

    fn collection() -> TracesCollection {
        let mut traces = TracesCollection::new(4, 10.0);
        traces.apply(PlotCommand::RegisterTrace { id: 7, name: "BIP 01".into(), unit: "uVolt".into() });
        traces
    }

    #[test]
    fn test_prunes_by_points() {
        let mut traces = collection();
        traces.apply(PlotCommand::Points { trace_id: 7, points: points(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]) });
        let live: Vec<f64> = traces.traces[&7].live.iter().map(|p| p[0]).collect();
        assert_eq!(live, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_prunes_by_time() {
        let mut traces = collection();
        traces.max_points = 100;
        traces.apply(PlotCommand::Points { trace_id: 7, points: points(&[0.0, 5.0, 10.0, 15.0]) });
        let live: Vec<f64> = traces.traces[&7].live.iter().map(|p| p[0]).collect();
        assert_eq!(live, vec![5.0, 10.0, 15.0]);
        assert_eq!(traces.latest_time(), Some(15.0));
    }

    #[test]
    fn test_snapshot_freezes_shown_points() {
        let mut traces = collection();
        traces.apply(PlotCommand::Points { trace_id: 7, points: points(&[0.0]) });
        traces.take_snapshot();
        traces.apply(PlotCommand::Points { trace_id: 7, points: points(&[1.0]) });
        assert_eq!(traces.traces[&7].shown().len(), 1);
        assert_eq!(traces.traces[&7].live.len(), 2);
        traces.clear_snapshot();
        assert_eq!(traces.traces[&7].shown().len(), 2);
        assert_eq!(traces.traces[&7].value_range(), Some((0.0, 2.0)));
    }

    #[test]
    fn test_unknown_trace_and_clear() {
        let mut traces = collection();
        traces.apply(PlotCommand::Points { trace_id: 99, points: points(&[0.0]) });
        assert_eq!(traces.order, vec![7]);
        traces.apply(PlotCommand::Points { trace_id: 7, points: points(&[0.0]) });
        traces.apply(PlotCommand::ClearAll);
        assert!(traces.traces[&7].live.is_empty());
        assert_eq!(traces.latest_time(), None);
    }
}
