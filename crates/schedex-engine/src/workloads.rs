//! Small built-in programs with known bugs (and one without), used by the
//! CLI and the integration tests.

use crate::program::{ChoiceSource, Program, SafetyViolation};
use schedex_state::{FingerprintBuilder, MonitorSnapshot, MonitorStatus, ProgramState};
use schedex_strategy::{OperationKind, Schedulable, SchedulableId};
use std::fmt;
use std::str::FromStr;

/// A built-in program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workload {
    /// Two workers increment a shared counter with a separate read and write.
    RacyCounter,
    /// Two workers take two locks in opposite orders.
    LockOrder,
    /// A client whose requests can be dropped retries forever.
    LossyRetry,
    /// A token passed around a ring for a fixed number of laps, watched by an
    /// auditor. Bug-free.
    TokenRing,
}

impl Workload {
    pub fn all() -> [Workload; 4] {
        [
            Workload::RacyCounter,
            Workload::LockOrder,
            Workload::LossyRetry,
            Workload::TokenRing,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Workload::RacyCounter => "racy-counter",
            Workload::LockOrder => "lock-order",
            Workload::LossyRetry => "lossy-retry",
            Workload::TokenRing => "token-ring",
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            Workload::RacyCounter => "lost update between two read-then-write workers (safety)",
            Workload::LockOrder => "lock acquisition in opposite orders (deadlock)",
            Workload::LossyRetry => "request retried over a lossy link is never acknowledged (liveness)",
            Workload::TokenRing => "token ring with an auditor, no bug",
        }
    }

    pub fn build(self) -> Box<dyn Program + Send> {
        match self {
            Workload::RacyCounter => Box::new(RacyCounter::new(2)),
            Workload::LockOrder => Box::new(LockOrder::new()),
            Workload::LossyRetry => Box::new(LossyRetry::new()),
            Workload::TokenRing => Box::new(TokenRing::new(3, 2)),
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Workload {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Workload::all()
            .into_iter()
            .find(|w| w.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Workload::all().iter().map(|w| w.name()).collect();
                format!("unknown workload '{}' (expected one of {})", s, names.join(", "))
            })
    }
}

/// Waiting on another entity, without being runnable.
fn idle(id: u64, next_operation: OperationKind) -> Schedulable {
    Schedulable {
        id: SchedulableId::new(id),
        enabled: false,
        blocked: false,
        next_operation,
    }
}

// -- racy-counter --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerPc {
    Read,
    Write(i64),
    Done,
}

#[derive(Debug, Clone)]
pub struct RacyCounter {
    workers: Vec<WorkerPc>,
    counter: i64,
}

impl RacyCounter {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: vec![WorkerPc::Read; workers],
            counter: 0,
        }
    }
}

impl Program for RacyCounter {
    fn name(&self) -> &str {
        "racy-counter"
    }

    fn reset(&mut self) {
        self.workers.fill(WorkerPc::Read);
        self.counter = 0;
    }

    fn schedulables(&self) -> Vec<Schedulable> {
        self.workers
            .iter()
            .enumerate()
            .map(|(i, pc)| match pc {
                WorkerPc::Read => Schedulable::new(i as u64, OperationKind::Receive),
                WorkerPc::Write(_) => Schedulable::new(i as u64, OperationKind::Send),
                WorkerPc::Done => Schedulable::finished(i as u64),
            })
            .collect()
    }

    fn state(&self) -> ProgramState {
        let mut fields = FingerprintBuilder::new();
        fields.int_field(0, self.counter);
        for (i, pc) in self.workers.iter().enumerate() {
            let code = match pc {
                WorkerPc::Read => -1,
                WorkerPc::Write(seen) => *seen,
                WorkerPc::Done => -2,
            };
            fields.int_field(i as u64 + 1, code);
        }
        let enabled = self.schedulables().into_iter().filter(|s| s.enabled).map(|s| s.id);
        ProgramState::capture(enabled, Vec::new(), fields)
    }

    fn step(&mut self, id: SchedulableId, _choices: &mut dyn ChoiceSource) -> Result<(), SafetyViolation> {
        let pc = &mut self.workers[id.as_u64() as usize];
        *pc = match *pc {
            WorkerPc::Read => WorkerPc::Write(self.counter),
            WorkerPc::Write(seen) => {
                self.counter = seen + 1;
                WorkerPc::Done
            }
            WorkerPc::Done => WorkerPc::Done,
        };
        Ok(())
    }

    fn on_quiescence(&self) -> Result<(), SafetyViolation> {
        let expected = self.workers.len() as i64;
        if self.counter != expected {
            return Err(SafetyViolation::new(format!(
                "lost update: counter is {}, expected {}",
                self.counter, expected
            )));
        }
        Ok(())
    }
}

// -- lock-order --

const LOCKS: usize = 2;

/// Worker `i` acquires its locks in `ORDER[i]` and releases them in reverse.
const ORDER: [[usize; LOCKS]; 2] = [[0, 1], [1, 0]];

#[derive(Debug, Clone)]
pub struct LockOrder {
    /// Steps taken per worker: `0..LOCKS` acquire, `LOCKS..2*LOCKS` release.
    pcs: [usize; 2],
    owners: [Option<usize>; LOCKS],
}

impl LockOrder {
    pub fn new() -> Self {
        Self {
            pcs: [0; 2],
            owners: [None; LOCKS],
        }
    }

    /// The lock worker `w` acquires next, if it is still acquiring.
    fn wanted(&self, w: usize) -> Option<usize> {
        (self.pcs[w] < LOCKS).then(|| ORDER[w][self.pcs[w]])
    }
}

impl Default for LockOrder {
    fn default() -> Self {
        Self::new()
    }
}

impl Program for LockOrder {
    fn name(&self) -> &str {
        "lock-order"
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn schedulables(&self) -> Vec<Schedulable> {
        (0..2)
            .map(|w| {
                let id = w as u64;
                match self.wanted(w) {
                    Some(lock) if self.owners[lock].is_some() => {
                        Schedulable::blocked(id, OperationKind::Receive)
                    }
                    Some(_) => Schedulable::new(id, OperationKind::Receive),
                    None if self.pcs[w] < 2 * LOCKS => Schedulable::new(id, OperationKind::Send),
                    None => Schedulable::finished(id),
                }
            })
            .collect()
    }

    fn state(&self) -> ProgramState {
        let mut fields = FingerprintBuilder::new();
        for (w, pc) in self.pcs.iter().enumerate() {
            fields.int_field(w as u64, *pc as i64);
        }
        for (lock, owner) in self.owners.iter().enumerate() {
            fields.int_field(10 + lock as u64, owner.map_or(-1, |o| o as i64));
        }
        let enabled = self.schedulables().into_iter().filter(|s| s.enabled).map(|s| s.id);
        ProgramState::capture(enabled, Vec::new(), fields)
    }

    fn step(&mut self, id: SchedulableId, _choices: &mut dyn ChoiceSource) -> Result<(), SafetyViolation> {
        let w = id.as_u64() as usize;
        let pc = self.pcs[w];
        if pc < LOCKS {
            let lock = ORDER[w][pc];
            if let Some(owner) = self.owners[lock] {
                return Err(SafetyViolation::new(format!(
                    "worker {} acquired lock {} held by worker {}",
                    w, lock, owner
                )));
            }
            self.owners[lock] = Some(w);
        } else if pc < 2 * LOCKS {
            let lock = ORDER[w][2 * LOCKS - 1 - pc];
            self.owners[lock] = None;
        }
        self.pcs[w] = (pc + 1).min(2 * LOCKS);
        Ok(())
    }
}

// -- lossy-retry --

const CLIENT: u64 = 0;
const SERVER: u64 = 1;
const ACKED: &str = "request-acked";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientPc {
    Idle,
    Waiting,
    Done,
}

#[derive(Debug, Clone)]
pub struct LossyRetry {
    client: ClientPc,
    request_in_flight: bool,
    ack_in_flight: bool,
}

impl LossyRetry {
    pub fn new() -> Self {
        Self {
            client: ClientPc::Idle,
            request_in_flight: false,
            ack_in_flight: false,
        }
    }

    fn monitor(&self) -> MonitorStatus {
        match self.client {
            ClientPc::Idle => MonitorStatus::None,
            ClientPc::Waiting => MonitorStatus::Hot,
            ClientPc::Done => MonitorStatus::Cold,
        }
    }

    /// Send the request; the link drops it with probability 1/2.
    fn send(&mut self, choices: &mut dyn ChoiceSource) {
        let dropped = choices.boolean(2);
        self.request_in_flight = !dropped;
        self.client = ClientPc::Waiting;
    }
}

impl Default for LossyRetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Program for LossyRetry {
    fn name(&self) -> &str {
        "lossy-retry"
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn schedulables(&self) -> Vec<Schedulable> {
        let client = match self.client {
            ClientPc::Idle => Schedulable::new(CLIENT, OperationKind::Send),
            ClientPc::Waiting if self.ack_in_flight => Schedulable::new(CLIENT, OperationKind::Receive),
            // Retry once the request has been lost (a timeout).
            ClientPc::Waiting if !self.request_in_flight => Schedulable::new(CLIENT, OperationKind::Send),
            ClientPc::Waiting => Schedulable::blocked(CLIENT, OperationKind::Receive),
            ClientPc::Done => Schedulable::finished(CLIENT),
        };
        let server = if self.request_in_flight {
            Schedulable::new(SERVER, OperationKind::Send)
        } else {
            idle(SERVER, OperationKind::Receive)
        };
        vec![client, server]
    }

    fn state(&self) -> ProgramState {
        let mut fields = FingerprintBuilder::new();
        fields
            .field("client", &(self.client as u8))
            .int_field(0, self.request_in_flight as i64)
            .int_field(1, self.ack_in_flight as i64);
        let enabled = self.schedulables().into_iter().filter(|s| s.enabled).map(|s| s.id);
        ProgramState::capture(enabled, vec![MonitorSnapshot::new(ACKED, self.monitor())], fields)
    }

    fn step(&mut self, id: SchedulableId, choices: &mut dyn ChoiceSource) -> Result<(), SafetyViolation> {
        match id.as_u64() {
            CLIENT if self.ack_in_flight => {
                self.ack_in_flight = false;
                self.client = ClientPc::Done;
            }
            CLIENT if self.client != ClientPc::Done => self.send(choices),
            SERVER if self.request_in_flight => {
                self.request_in_flight = false;
                self.ack_in_flight = true;
            }
            _ => {}
        }
        Ok(())
    }
}

// -- token-ring --

const AUDITOR_PASSES_SEEN: u64 = 100;

#[derive(Debug, Clone)]
pub struct TokenRing {
    nodes: usize,
    total_passes: usize,
    passes: usize,
    /// Passes the auditor saw when it ran.
    audited: Option<usize>,
}

impl TokenRing {
    pub fn new(nodes: usize, laps: usize) -> Self {
        Self {
            nodes,
            total_passes: nodes * laps,
            passes: 0,
            audited: None,
        }
    }

    fn auditor(&self) -> u64 {
        self.nodes as u64
    }

    fn holder(&self) -> Option<usize> {
        (self.passes < self.total_passes).then(|| self.passes % self.nodes)
    }
}

impl Program for TokenRing {
    fn name(&self) -> &str {
        "token-ring"
    }

    fn reset(&mut self) {
        self.passes = 0;
        self.audited = None;
    }

    fn schedulables(&self) -> Vec<Schedulable> {
        let holder = self.holder();
        let mut choices: Vec<Schedulable> = (0..self.nodes)
            .map(|n| match holder {
                Some(h) if h == n => Schedulable::new(n as u64, OperationKind::Send),
                Some(_) => Schedulable::blocked(n as u64, OperationKind::Receive),
                None => Schedulable::finished(n as u64),
            })
            .collect();
        choices.push(match self.audited {
            None => Schedulable::new(self.auditor(), OperationKind::Receive),
            Some(_) => Schedulable::finished(self.auditor()),
        });
        choices
    }

    fn state(&self) -> ProgramState {
        let mut fields = FingerprintBuilder::new();
        fields
            .int_field(0, self.passes as i64)
            .int_field(AUDITOR_PASSES_SEEN, self.audited.map_or(-1, |p| p as i64));
        let enabled = self.schedulables().into_iter().filter(|s| s.enabled).map(|s| s.id);
        ProgramState::capture(enabled, Vec::new(), fields)
    }

    fn step(&mut self, id: SchedulableId, _choices: &mut dyn ChoiceSource) -> Result<(), SafetyViolation> {
        if id.as_u64() == self.auditor() {
            if self.passes > self.total_passes {
                return Err(SafetyViolation::new(format!(
                    "token passed {} times, at most {} expected",
                    self.passes, self.total_passes
                )));
            }
            self.audited = Some(self.passes);
        } else if self.holder() == Some(id.as_u64() as usize) {
            self.passes += 1;
        } else {
            return Err(SafetyViolation::new(format!("node {} ran without the token", id)));
        }
        Ok(())
    }

    fn on_quiescence(&self) -> Result<(), SafetyViolation> {
        if self.passes != self.total_passes || self.audited.is_none() {
            return Err(SafetyViolation::new("ring stopped early"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers every choice with fixed values.
    struct Fixed(bool);

    impl ChoiceSource for Fixed {
        fn boolean(&mut self, _max_value: usize) -> bool {
            self.0
        }

        fn integer(&mut self, _max_value: usize) -> usize {
            0
        }

        fn fair_boolean(&mut self, _id: u64) -> bool {
            self.0
        }
    }

    fn run(program: &mut dyn Program, order: &[u64]) -> Result<(), SafetyViolation> {
        let mut choices = Fixed(false);
        for &id in order {
            program.step(SchedulableId::new(id), &mut choices)?;
        }
        Ok(())
    }

    #[test]
    fn test_parse_workloads() {
        for workload in Workload::all() {
            assert_eq!(workload.name().parse::<Workload>(), Ok(workload));
        }
        assert!("nope".parse::<Workload>().is_err());
    }

    #[test]
    fn test_racy_counter_lost_update() {
        let mut program = RacyCounter::new(2);
        run(&mut program, &[0, 0, 1, 1]).unwrap();
        assert!(program.on_quiescence().is_ok());

        program.reset();
        run(&mut program, &[0, 1, 0, 1]).unwrap();
        assert!(program.schedulables().iter().all(|s| !s.enabled));
        assert_eq!(
            program.on_quiescence(),
            Err(SafetyViolation::new("lost update: counter is 1, expected 2"))
        );
    }

    #[test]
    fn test_lock_order_deadlock_state() {
        let mut program = LockOrder::new();
        run(&mut program, &[0, 1]).unwrap();
        let choices = program.schedulables();
        assert!(choices.iter().all(|s| !s.enabled && s.blocked));

        program.reset();
        run(&mut program, &[0, 0, 0, 0, 1, 1, 1, 1]).unwrap();
        assert!(program.schedulables().iter().all(|s| !s.enabled && !s.blocked));
    }

    #[test]
    fn test_lossy_retry_repeats_state_on_drop() {
        let mut program = LossyRetry::new();
        let mut lossy = Fixed(true);
        program.step(SchedulableId::new(CLIENT), &mut lossy).unwrap();
        let after_first = program.state();
        program.step(SchedulableId::new(CLIENT), &mut lossy).unwrap();
        assert_eq!(program.state(), after_first);
        assert_eq!(after_first.hot_monitors().collect::<Vec<_>>(), vec![ACKED]);

        let mut deliver = Fixed(false);
        program.step(SchedulableId::new(CLIENT), &mut deliver).unwrap();
        program.step(SchedulableId::new(SERVER), &mut deliver).unwrap();
        program.step(SchedulableId::new(CLIENT), &mut deliver).unwrap();
        assert_eq!(program.state().hot_monitors().count(), 0);
        assert!(program.schedulables().iter().all(|s| !s.enabled && !s.blocked));
    }

    #[test]
    fn test_token_ring_only_holder_runs() {
        let mut program = TokenRing::new(3, 2);
        let enabled: Vec<u64> = program
            .schedulables()
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.id.as_u64())
            .collect();
        assert_eq!(enabled, vec![0, 3]);
        assert!(run(&mut program, &[1]).is_err());

        program.reset();
        run(&mut program, &[0, 1, 2, 3, 0, 1, 2]).unwrap();
        assert!(program.on_quiescence().is_ok());
    }
}
