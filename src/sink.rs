//! Channel types for feeding samples into the plot window.
//!
//! Register a [`Trace`] first (the sink assigns its numeric ID), then send
//! [`PlotPoint`]s to it in chunks.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, SendError, Sender};

/// Numeric identifier for a trace, assigned when the trace is created.
pub type TraceId = u32;

/// A single point on a plot: x is time in seconds, y is the value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
}

/// Declaration of a trace; returned to the caller after registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub id: TraceId,
    pub name: String,
    pub unit: String,
}

/// Messages sent over the channel to drive the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum PlotCommand {
    RegisterTrace {
        id: TraceId,
        name: String,
        unit: String,
    },
    Points {
        trace_id: TraceId,
        points: Vec<PlotPoint>,
    },
    /// Drop all buffered points of every trace.
    ClearAll,
}

/// Sender half of the plot channel.
#[derive(Debug, Clone)]
pub struct PlotSink {
    tx: Sender<PlotCommand>,
}

impl PlotSink {
    /// Register a new trace with a unique numeric ID.
    pub fn create_trace(&self, name: impl Into<String>, unit: impl Into<String>) -> Trace {
        static NEXT_ID: AtomicU32 = AtomicU32::new(1);
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let trace = Trace {
            id,
            name: name.into(),
            unit: unit.into(),
        };
        // the UI may already be gone; the trace is still valid to hold
        let _ = self.tx.send(PlotCommand::RegisterTrace {
            id,
            name: trace.name.clone(),
            unit: trace.unit.clone(),
        });
        trace
    }

    /// Send a chunk of points for a given `Trace`.
    pub fn send_points<I>(&self, trace: &Trace, points: I) -> Result<(), SendError<PlotCommand>>
    where
        I: Into<Vec<PlotPoint>>,
    {
        self.tx.send(PlotCommand::Points {
            trace_id: trace.id,
            points: points.into(),
        })
    }

    pub fn clear_all(&self) -> Result<(), SendError<PlotCommand>> {
        self.tx.send(PlotCommand::ClearAll)
    }
}

/// Create a plot channel: the sink feeds samples, the receiver goes to the UI.
pub fn channel_plot() -> (PlotSink, Receiver<PlotCommand>) {
    let (tx, rx) = std::sync::mpsc::channel();
    (PlotSink { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_ids_are_unique() {
        let (sink, rx) = channel_plot();
        let a = sink.create_trace("BIP 01", "uVolt");
        let b = sink.create_trace("BIP 02", "uVolt");
        assert_ne!(a.id, b.id);
        let registered: Vec<PlotCommand> = rx.try_iter().collect();
        assert_eq!(registered.len(), 2);
        assert!(matches!(&registered[0], PlotCommand::RegisterTrace { name, .. } if name == "BIP 01"));
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (sink, rx) = channel_plot();
        let trace = sink.create_trace("BIP 01", "uVolt");
        drop(rx);
        assert!(sink.send_points(&trace, vec![PlotPoint { x: 0.0, y: 1.0 }]).is_err());
    }

    #[test]
    fn test_clear_all() {
        let (sink, rx) = channel_plot();
        sink.clear_all().unwrap();
        assert_eq!(rx.try_recv(), Ok(PlotCommand::ClearAll));
    }
}
