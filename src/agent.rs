//! Cooperative agents and their duty-cycle scheduling
//!
//! Each driver agent is single-threaded, owns its mutable state exclusively
//! and communicates only through shared-memory buffers. An agent's loop is:
//! bounded work, stop-flag check, idle strategy. Nothing blocks
//! indefinitely; shutdown sets the stop flag and the in-flight cycle
//! completes before the thread joins.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Epoch wall-clock time in nanoseconds
pub fn epoch_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// Epoch wall-clock time in milliseconds
pub fn epoch_millis() -> i64 {
    epoch_nanos() / 1_000_000
}

/// A unit of driver work driven on a duty cycle.
///
/// `do_work` receives the cycle's cached wall-clock time in epoch
/// nanoseconds and returns how much work it performed; zero lets the runner
/// apply the idle strategy. Tests drive agents directly with a virtual
/// clock.
pub trait Agent: Send {
    /// Name used for the thread and for tracing
    fn name(&self) -> &'static str;

    /// Perform one bounded duty cycle
    fn do_work(&mut self, now_ns: i64) -> Result<usize>;

    /// Called once after the final cycle before the thread exits
    fn on_close(&mut self) {}
}

/// What an agent does when a duty cycle performs no work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdleStrategy {
    /// Burn the core; lowest latency
    BusySpin,
    /// Yield the scheduler slot
    Yield,
    /// Park for the given number of microseconds
    Park(u64),
}

impl IdleStrategy {
    /// Apply the strategy after a work-free cycle
    pub fn idle(&self) {
        match self {
            IdleStrategy::BusySpin => std::hint::spin_loop(),
            IdleStrategy::Yield => std::thread::yield_now(),
            IdleStrategy::Park(micros) => std::thread::sleep(Duration::from_micros(*micros)),
        }
    }
}

impl Default for IdleStrategy {
    fn default() -> Self {
        IdleStrategy::Park(100)
    }
}

/// Bit assigned to each agent in the `AERON_AGENT_MASK` trace mask
#[derive(Debug, Clone, Copy)]
#[repr(u32)]
pub enum AgentKind {
    Conductor = 1,
    Sender = 1 << 1,
    Receiver = 1 << 2,
    NameResolver = 1 << 3,
}

/// Whether duty-cycle tracing is enabled for the given agent.
///
/// `AERON_AGENT_MASK` is parsed as a decimal or `0x`-prefixed hex bitmask.
pub fn trace_enabled(kind: AgentKind) -> bool {
    let raw = match std::env::var("AERON_AGENT_MASK") {
        Ok(raw) => raw,
        Err(_) => return false,
    };

    let mask = if let Some(hex) = raw.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).unwrap_or(0)
    } else {
        raw.parse::<u32>().unwrap_or(0)
    };

    mask & kind as u32 != 0
}

/// Owns an agent thread and its stop flag
#[derive(Debug)]
pub struct AgentRunner {
    name: &'static str,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AgentRunner {
    /// Spawn the agent on its own named thread
    pub fn start<A: Agent + 'static>(
        mut agent: A,
        idle_strategy: IdleStrategy,
        kind: AgentKind,
    ) -> Result<Self> {
        let name = agent.name();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let trace = trace_enabled(kind);

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while !stop_flag.load(Ordering::Acquire) {
                    let now_ns = epoch_nanos();
                    match agent.do_work(now_ns) {
                        Ok(0) => idle_strategy.idle(),
                        Ok(work_count) => {
                            if trace {
                                log::trace!("{}: work_count={}", agent.name(), work_count);
                            }
                        }
                        Err(e) => {
                            log::error!("{}: duty cycle failed: {}", agent.name(), e);
                            idle_strategy.idle();
                        }
                    }
                }
                agent.on_close();
            })
            .map_err(|e| {
                crate::error::DriverError::from_io(e, "Failed to spawn agent thread")
            })?;

        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    /// Agent name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the agent to stop after its current cycle
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stop and join the agent thread
    pub fn close(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{}: agent thread panicked", self.name);
            }
        }
    }
}

impl Drop for AgentRunner {
    fn drop(&mut self) {
        self.close();
    }
}
