//! The detection tick state machine.
//!
//! [`DetectionLoop`] decides when a tick is due and which replies may be
//! applied; [`worker::DetectionWorker`] runs the detector off the UI thread.
//! At most one tick is in flight. Every tick carries the epoch of the session
//! it was started in, and stopping bumps the epoch, so a reply that arrives
//! after stop is dropped.

pub mod worker;

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::detector::DetectionResult;
use crate::error::DetectError;
use crate::expression::Expression;
use crate::summary::{self, ExpressionTally, Labelled};

pub use worker::{DetectionWorker, SpawnError, TickReply, TickRequest, WorkerGone};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("models are not loaded")]
    ModelsNotReady,
    #[error("no active camera session")]
    NoSession,
}

/// Identifies one tick: the session epoch plus a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickTicket {
    pub epoch: u64,
    pub seq: u64,
}

/// A detection result with its dominant expression picked.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedFace {
    pub result: DetectionResult,
    pub dominant: Expression,
}

impl AnnotatedFace {
    pub fn new(result: DetectionResult) -> Self {
        let dominant = result.expressions.dominant();
        Self { result, dominant }
    }
}

impl Labelled for AnnotatedFace {
    fn dominant(&self) -> Expression {
        self.dominant
    }
}

/// What one applied tick produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    NoFaces,
    Faces {
        faces: Vec<AnnotatedFace>,
        tally: ExpressionTally,
    },
}

impl TickOutcome {
    pub fn from_results(results: Vec<DetectionResult>) -> Self {
        if results.is_empty() {
            return TickOutcome::NoFaces;
        }
        let faces: Vec<AnnotatedFace> = results.into_iter().map(AnnotatedFace::new).collect();
        let tally = summary::tally(&faces);
        TickOutcome::Faces { faces, tally }
    }
}

pub struct DetectionLoop {
    state: LoopState,
    period: Duration,
    next_due: Option<Instant>,
    epoch: u64,
    next_seq: u64,
    in_flight: Option<TickTicket>,
    last_applied: Option<u64>,
}

impl DetectionLoop {
    pub fn new(period: Duration) -> Self {
        Self {
            state: LoopState::Idle,
            period,
            next_due: None,
            epoch: 0,
            next_seq: 0,
            in_flight: None,
            last_applied: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn in_flight(&self) -> Option<TickTicket> {
        self.in_flight
    }

    /// Idle -> Running. The first tick is due immediately.
    pub fn start(&mut self, models_ready: bool, session_active: bool, now: Instant) -> Result<(), StartError> {
        if !models_ready {
            return Err(StartError::ModelsNotReady);
        }
        if !session_active {
            return Err(StartError::NoSession);
        }
        if self.is_running() {
            return Ok(());
        }

        self.state = LoopState::Running;
        self.next_due = Some(now);
        self.in_flight = None;
        self.last_applied = None;
        tracing::debug!(epoch = self.epoch, period_ms = self.period.as_millis() as u64, "Detection loop started");
        Ok(())
    }

    /// Running -> Idle. Cancels the timer; any outstanding reply becomes stale.
    pub fn stop(&mut self) {
        if self.state == LoopState::Idle {
            return;
        }
        self.state = LoopState::Idle;
        self.next_due = None;
        if let Some(ticket) = self.in_flight.take() {
            tracing::debug!(seq = ticket.seq, "Abandoning in-flight detection");
        }
        self.epoch += 1;
        tracing::debug!(epoch = self.epoch, "Detection loop stopped");
    }

    /// Returns a ticket when a tick should start now. A slot that comes due
    /// while the previous tick is still in flight is skipped, not queued.
    pub fn poll_tick(&mut self, now: Instant) -> Option<TickTicket> {
        if !self.is_running() {
            return None;
        }
        let due = self.next_due?;
        if now < due {
            return None;
        }

        let mut next = due + self.period;
        if next <= now {
            next = now + self.period;
        }
        self.next_due = Some(next);

        if self.in_flight.is_some() {
            tracing::trace!("Detection still running, skipping tick");
            return None;
        }

        let ticket = TickTicket {
            epoch: self.epoch,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.in_flight = Some(ticket);
        Some(ticket)
    }

    /// Releases an issued ticket whose tick never reached the detector.
    pub fn abandon(&mut self, ticket: TickTicket) {
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }
    }

    /// How long the UI loop may sleep before the next tick is due.
    pub fn time_until_next_tick(&self, now: Instant) -> Option<Duration> {
        if !self.is_running() {
            return None;
        }
        self.next_due.map(|due| due.saturating_duration_since(now))
    }

    /// Turns a detector reply into an outcome, or `None` when the reply
    /// belongs to a stopped session or an older tick.
    pub fn accept(
        &mut self,
        ticket: TickTicket,
        result: Result<Vec<DetectionResult>, DetectError>,
    ) -> Option<TickOutcome> {
        if ticket.epoch != self.epoch || !self.is_running() {
            tracing::debug!(seq = ticket.seq, epoch = ticket.epoch, "Discarding stale detection");
            return None;
        }
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }
        if self.last_applied.is_some_and(|last| ticket.seq <= last) {
            tracing::debug!(seq = ticket.seq, "Discarding out-of-order detection");
            return None;
        }
        self.last_applied = Some(ticket.seq);

        match result {
            Ok(results) => Some(TickOutcome::from_results(results)),
            Err(e) => {
                tracing::warn!(error = %e, seq = ticket.seq, "Detection failed, treating tick as empty");
                Some(TickOutcome::NoFaces)
            }
        }
    }
}
