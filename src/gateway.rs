use std::{collections::VecDeque, sync::Arc, time::Duration};

use log::{debug, info};
use parking_lot::Mutex;

use crate::{
    error::{GatewayFault, InitFailure},
    pixel_buffer::Frame,
};

/// The boundary to the panel electronics. Implementations own the GPIO
/// handle; the refresh thread is the only caller of `commit` while a session
/// is running.
pub trait HardwareGateway: Send + 'static {
    fn init(&mut self) -> Result<(), InitFailure>;
    fn commit(&mut self, frame: &Frame) -> Result<(), GatewayFault>;
    /// Switches every LED off without a frame. Used at shutdown when the
    /// final blank commit fails.
    fn clear(&mut self) -> Result<(), GatewayFault>;
}
impl<G: HardwareGateway + ?Sized> HardwareGateway for Box<G> {
    fn init(&mut self) -> Result<(), InitFailure> {
        (**self).init()
    }
    fn commit(&mut self, frame: &Frame) -> Result<(), GatewayFault> {
        (**self).commit(frame)
    }
    fn clear(&mut self) -> Result<(), GatewayFault> {
        (**self).clear()
    }
}

/// Headless stand-in for a real panel. Every commit costs `latency`, which is
/// roughly what one PWM pass over a 32x16 panel takes on a Raspberry Pi.
pub struct SimulatedPanel {
    latency: Duration,
    initialized: bool,
    frames: u64,
    lit: usize,
}
impl SimulatedPanel {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            initialized: false,
            frames: 0,
            lit: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
    pub fn lit(&self) -> usize {
        self.lit
    }
}
impl HardwareGateway for SimulatedPanel {
    fn init(&mut self) -> Result<(), InitFailure> {
        info!("simulated panel ready, {:?} per commit", self.latency);
        self.initialized = true;
        Ok(())
    }

    fn commit(&mut self, frame: &Frame) -> Result<(), GatewayFault> {
        if !self.initialized {
            return Err(GatewayFault("commit before init".into()));
        }
        if !self.latency.is_zero() {
            spin_sleep::sleep(self.latency);
        }
        self.frames += 1;
        self.lit = frame.lit();
        Ok(())
    }

    fn clear(&mut self) -> Result<(), GatewayFault> {
        debug!("simulated panel cleared after {} frames", self.frames);
        self.lit = 0;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayCall {
    Init,
    Commit(Frame),
    Clear,
}

const HISTORY: usize = 64;

#[derive(Default)]
struct Recorded {
    init_calls: u64,
    commits: u64,
    clears: u64,
    history: VecDeque<GatewayCall>,
}

/// Shared view of everything a [`RecordingGateway`] was asked to do. Only the
/// most recent calls are kept in full.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Recorded>>);
impl CallLog {
    fn record(&self, call: GatewayCall) {
        let mut recorded = self.0.lock();
        match call {
            GatewayCall::Init => recorded.init_calls += 1,
            GatewayCall::Commit(_) => recorded.commits += 1,
            GatewayCall::Clear => recorded.clears += 1,
        }
        if recorded.history.len() == HISTORY {
            recorded.history.pop_front();
        }
        recorded.history.push_back(call);
    }

    pub fn init_calls(&self) -> u64 {
        self.0.lock().init_calls
    }
    pub fn commits(&self) -> u64 {
        self.0.lock().commits
    }
    pub fn clears(&self) -> u64 {
        self.0.lock().clears
    }

    pub fn recent(&self) -> Vec<GatewayCall> {
        self.0.lock().history.iter().cloned().collect()
    }
    pub fn last_commit(&self) -> Option<Frame> {
        self.0.lock().history.iter().rev().find_map(|call| match call {
            GatewayCall::Commit(frame) => Some(frame.clone()),
            _ => None,
        })
    }
}

/// Gateway that keeps a [`CallLog`] instead of driving hardware, with
/// optional fault injection.
pub struct RecordingGateway {
    log: CallLog,
    latency: Duration,
    init_failure: Option<String>,
    failing_commits: u64,
}
impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            latency: Duration::ZERO,
            init_failure: None,
            failing_commits: 0,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
    pub fn failing_init(mut self, reason: impl Into<String>) -> Self {
        self.init_failure = Some(reason.into());
        self
    }
    /// The next `count` commits are recorded but report a fault.
    pub fn failing_commits(mut self, count: u64) -> Self {
        self.failing_commits = count;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}
impl Default for RecordingGateway {
    fn default() -> Self {
        Self::new()
    }
}
impl HardwareGateway for RecordingGateway {
    fn init(&mut self) -> Result<(), InitFailure> {
        self.log.record(GatewayCall::Init);
        match &self.init_failure {
            Some(reason) => Err(InitFailure(reason.clone())),
            None => Ok(()),
        }
    }

    fn commit(&mut self, frame: &Frame) -> Result<(), GatewayFault> {
        if !self.latency.is_zero() {
            spin_sleep::sleep(self.latency);
        }
        self.log.record(GatewayCall::Commit(frame.clone()));
        if self.failing_commits > 0 {
            self.failing_commits -= 1;
            return Err(GatewayFault("injected commit fault".into()));
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), GatewayFault> {
        self.log.record(GatewayCall::Clear);
        Ok(())
    }
}
