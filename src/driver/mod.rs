//! Driver assembly: CnC creation, agent startup and teardown

pub mod channel;
pub mod client;
pub mod conductor;
pub mod publication;
pub mod subscription;

pub use channel::{ChannelKind, ChannelUri, IPC_CHANNEL};
pub use conductor::DriverConductor;
pub use publication::Publication;
pub use subscription::{Image, Subscription};

use std::sync::Arc;

use crate::agent::{epoch_millis, AgentKind, AgentRunner};
use crate::cnc::CncFile;
use crate::context::DriverContext;
use crate::error::Result;

/// A running media driver: the CnC file plus its agents.
///
/// The sender and receiver agents belong to the media transport and attach
/// here when that layer is linked in; this core runs the conductor, which
/// also drives the gossip resolver so name resolution stays synchronous on
/// the conductor thread.
#[derive(Debug)]
pub struct MediaDriver {
    context: DriverContext,
    cnc: Arc<CncFile>,
    conductor_runner: AgentRunner,
}

impl MediaDriver {
    /// Validate the context, create the CnC file and start the agents
    pub fn launch(context: DriverContext) -> Result<Self> {
        context.validate()?;

        let now_ms = epoch_millis();
        let cnc = Arc::new(CncFile::create(
            &context.aeron_dir,
            context.cnc_lengths(),
            context.client_liveness_timeout_ns,
            now_ms,
        )?);

        let conductor = DriverConductor::new(context.clone(), Arc::clone(&cnc), now_ms)?;
        let conductor_runner = AgentRunner::start(
            conductor,
            context.conductor_idle_strategy,
            AgentKind::Conductor,
        )?;

        log::info!("media driver launched in {}", context.aeron_dir.display());

        Ok(Self {
            context,
            cnc,
            conductor_runner,
        })
    }

    /// The launch configuration
    pub fn context(&self) -> &DriverContext {
        &self.context
    }

    /// The CnC file clients attach to
    pub fn cnc(&self) -> &Arc<CncFile> {
        &self.cnc
    }

    /// Stop all agents and join their threads; the in-flight duty cycle
    /// completes first.
    pub fn close(&mut self) {
        self.conductor_runner.close();
        log::info!("media driver closed");
    }
}

impl Drop for MediaDriver {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::IdleStrategy;
    use crate::concurrent::{BroadcastReceiver, CommandRing, CopyBroadcastReceiver};

    #[test]
    fn test_launch_attach_close() {
        let dir = tempfile::TempDir::new().unwrap();
        let context = DriverContext {
            aeron_dir: dir.path().join("driver"),
            to_driver_buffer_length: 64 * 1024,
            to_clients_buffer_length: 64 * 1024,
            conductor_idle_strategy: IdleStrategy::Yield,
            ..Default::default()
        };

        let mut driver = MediaDriver::launch(context).unwrap();

        // A client can attach through a second mapping of the CnC file.
        let attached = CncFile::map_existing(&driver.context().aeron_dir).unwrap();
        let ring = CommandRing::new(attached.to_driver_buffer()).unwrap();
        let mut receiver =
            CopyBroadcastReceiver::new(BroadcastReceiver::new(attached.to_clients_buffer()).unwrap());

        let client_id = ring.next_correlation_id();
        let correlation_id = ring.next_correlation_id();
        let (msg_type_id, payload) =
            crate::command::encode::add_subscription(client_id, correlation_id, 10, "aeron:ipc");
        ring.write(msg_type_id, &payload).unwrap();

        // The conductor drains the command on its own thread.
        let mut events = Vec::new();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while events.is_empty() {
            assert!(std::time::Instant::now() < deadline, "no response from driver");
            receiver
                .receive(|type_id, payload| {
                    events.push(crate::command::decode_event(type_id, payload).unwrap())
                })
                .unwrap();
            std::thread::yield_now();
        }

        assert!(matches!(
            events[0],
            crate::command::DriverEvent::OnSubscriptionReady { correlation_id: c, .. } if c == correlation_id
        ));

        driver.close();
    }
}
