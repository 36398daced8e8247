use std::sync::Arc;
use std::time::Duration;

use mflow_core::{
    Config, NodeError, ParameterMap, ParameterValue, Registry, Statistics, StatisticsSample,
    StatisticsSnapshot,
};
use mflow_transport::Transport;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::control::{ControlFuture, NodeControl};
use crate::live_flag::LiveFlag;
use crate::processor::Processor;
use crate::processor_worker;
use crate::receiver_worker;
use crate::state::NodeState;

/// Where a fresh receiver's transport connection comes from on every
/// `start()`.
pub enum TransportSource {
    /// Clone this already-connected transport for every receiver. The
    /// natural choice for the in-memory backend in tests and demos: cloning
    /// an `mflow_transport::MemTransport` is cheap (an `Arc` bump) and
    /// multiple receivers become competing consumers on the same channel.
    Fixed(Transport),
    /// Connect a fresh TCP pull socket to `config.connect_address` for each
    /// receiver, the production deployment mode.
    TcpPull,
}

async fn open_receiver_transport(
    source: &TransportSource,
    config: &Config,
) -> Result<Transport, NodeError> {
    match source {
        TransportSource::Fixed(transport) => Ok(transport.clone()),
        TransportSource::TcpPull => {
            let transport = mflow_transport::TcpPullTransport::connect(&config.connect_address)
                .await
                .map_err(|e| NodeError::TransportError { detail: e.0 })?;
            Ok(Transport::TcpPull(transport))
        }
    }
}

struct RunningWorkers {
    processor_handle: JoinHandle<()>,
    processor_live: LiveFlag,
    receiver_handles: Vec<JoinHandle<()>>,
    receiver_lives: Vec<LiveFlag>,
    param_tx: mpsc::UnboundedSender<(String, ParameterValue)>,
}

impl RunningWorkers {
    fn all_live_flags(&self) -> Vec<LiveFlag> {
        let mut flags = vec![self.processor_live.clone()];
        flags.extend(self.receiver_lives.iter().cloned());
        flags
    }

    fn is_fully_alive(&self) -> bool {
        !self.processor_handle.is_finished()
            && self.processor_live.is_set()
            && self
                .receiver_handles
                .iter()
                .all(|h| !h.is_finished())
            && self.receiver_lives.iter().all(LiveFlag::is_set)
    }
}

/// Waits for every flag in `flags` to be set, sharing one overall `timeout`
/// across all of them rather than budgeting `timeout` per flag. Returns
/// `false` at the first flag that does not get set before the shared
/// deadline.
async fn wait_all_live(flags: &[LiveFlag], timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    for flag in flags {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() || !flag.wait_until_set(remaining).await {
            return false;
        }
    }
    true
}

/// Awaits `handle` up to `grace`, then aborts it if it has not finished.
async fn join_with_grace(handle: &mut JoinHandle<()>, grace: Duration) {
    if tokio::time::timeout(grace, handle).await.is_err() {
        handle.abort();
    }
}

/// Clears every live-flag, then joins receivers (stop producing first) and
/// finally the processor, each bounded by `shutdown_timeout` with a hard
/// abort past that.
async fn teardown(mut workers: RunningWorkers, shutdown_timeout: Duration) {
    workers.processor_live.clear();
    for live in &workers.receiver_lives {
        live.clear();
    }
    for handle in &mut workers.receiver_handles {
        join_with_grace(handle, shutdown_timeout).await;
    }
    join_with_grace(&mut workers.processor_handle, shutdown_timeout).await;
}

/// In-process supervisor for one node: owns the codec registry, the user
/// processor, the authoritative current-parameters map, and the statistics
/// ring, and spawns/joins the worker tasks that do the actual work.
pub struct NodeManager {
    config: Config,
    registry: Arc<Registry>,
    processor: Arc<dyn Processor>,
    transport_source: TransportSource,
    stats: Arc<Statistics>,
    current_parameters: SyncMutex<ParameterMap>,
    workers: AsyncMutex<Option<RunningWorkers>>,
    state: SyncMutex<NodeState>,
}

impl NodeManager {
    pub fn new(
        config: Config,
        registry: Arc<Registry>,
        processor: Arc<dyn Processor>,
        transport_source: TransportSource,
    ) -> Self {
        let stats = Arc::new(Statistics::new(config.statistics_buffer_length));
        NodeManager {
            config,
            registry,
            processor,
            transport_source,
            stats,
            current_parameters: SyncMutex::new(ParameterMap::new()),
            workers: AsyncMutex::new(None),
            state: SyncMutex::new(NodeState::Idle),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The node's current lifecycle state. A failed `start()` leaves this at
    /// `Idle`, never stuck in `Starting`.
    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    pub async fn start(&self) -> Result<(), NodeError> {
        let mut guard = self.workers.lock().await;

        if let Some(existing) = guard.as_ref() {
            if existing.is_fully_alive() {
                return Err(NodeError::AlreadyRunning);
            }
        }
        if let Some(stale) = guard.take() {
            teardown(stale, self.config.shutdown_timeout()).await;
        }

        *self.state.lock() = NodeState::Starting;

        let (data_tx, data_rx) = mpsc::channel(self.config.data_queue_length);
        let (param_tx, param_rx) = mpsc::unbounded_channel();

        for (name, value) in self.current_parameters.lock().iter() {
            let _ = param_tx.send((name.clone(), value.clone()));
        }

        let processor_live = LiveFlag::new();
        let processor_handle = tokio::spawn(processor_worker::run(
            processor_live.clone(),
            data_rx,
            param_rx,
            self.stats.clone(),
            self.processor.clone(),
            self.config.receive_timeout(),
        ));

        let mut receiver_handles = Vec::new();
        let mut receiver_lives = Vec::new();
        let mut connect_error = None;
        for _ in 0..self.config.n_receiving_threads.max(1) {
            match open_receiver_transport(&self.transport_source, &self.config).await {
                Ok(transport) => {
                    let live = LiveFlag::new();
                    let handle = tokio::spawn(receiver_worker::run(
                        live.clone(),
                        data_tx.clone(),
                        self.registry.clone(),
                        transport,
                        self.config.receive_timeout(),
                    ));
                    receiver_lives.push(live);
                    receiver_handles.push(handle);
                }
                Err(e) => {
                    connect_error = Some(e);
                    break;
                }
            }
        }
        drop(data_tx);

        let workers = RunningWorkers {
            processor_handle,
            processor_live,
            receiver_handles,
            receiver_lives,
            param_tx,
        };

        if let Some(e) = connect_error {
            teardown(workers, self.config.shutdown_timeout()).await;
            *self.state.lock() = NodeState::Idle;
            return Err(e);
        }

        let all_live = workers.all_live_flags();
        if !wait_all_live(&all_live, self.config.startup_timeout()).await {
            teardown(workers, self.config.shutdown_timeout()).await;
            *self.state.lock() = NodeState::Idle;
            return Err(NodeError::StartupFailed {
                detail: "one or more workers did not signal liveness within the startup timeout"
                    .to_string(),
            });
        }

        *guard = Some(workers);
        *self.state.lock() = NodeState::Running;
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), NodeError> {
        let mut guard = self.workers.lock().await;
        if let Some(workers) = guard.take() {
            *self.state.lock() = NodeState::Stopping;
            teardown(workers, self.config.shutdown_timeout()).await;
        }
        *self.state.lock() = NodeState::Idle;
        Ok(())
    }

    pub async fn is_running(&self) -> Result<bool, NodeError> {
        let guard = self.workers.lock().await;
        Ok(guard.as_ref().is_some_and(RunningWorkers::is_fully_alive))
    }

    pub async fn set_parameters(&self, params: ParameterMap) -> Result<(), NodeError> {
        let guard = self.workers.lock().await;
        let mut current = self.current_parameters.lock();
        for (name, value) in params {
            if let Some(workers) = guard.as_ref() {
                if workers.param_tx.send((name.clone(), value.clone())).is_err() {
                    tracing::warn!(parameter = %name, "parameter worker channel closed, value recorded but not applied");
                }
            }
            current.insert(name, value);
        }
        Ok(())
    }

    pub async fn get_parameters(&self) -> Result<ParameterMap, NodeError> {
        let mut merged = self.processor.current_parameters();
        merged.extend(self.current_parameters.lock().clone());
        Ok(merged)
    }

    pub async fn get_statistics(&self) -> Result<StatisticsSnapshot, NodeError> {
        Ok(self.stats.aggregate())
    }

    pub async fn get_statistics_raw(&self) -> Result<Vec<StatisticsSample>, NodeError> {
        Ok(self.stats.raw())
    }

    pub async fn describe(&self) -> Result<String, NodeError> {
        Ok(self.processor.describe())
    }

    pub async fn reset(&self) -> Result<ParameterMap, NodeError> {
        self.processor
            .reset()
            .map_err(|e| NodeError::ProcessorError { detail: e.0 })?;
        self.get_parameters().await
    }
}

impl NodeControl for NodeManager {
    fn start(&self) -> ControlFuture<'_, ()> {
        Box::pin(self.start())
    }

    fn stop(&self) -> ControlFuture<'_, ()> {
        Box::pin(self.stop())
    }

    fn is_running(&self) -> ControlFuture<'_, bool> {
        Box::pin(self.is_running())
    }

    fn set_parameters(&self, params: ParameterMap) -> ControlFuture<'_, ()> {
        Box::pin(self.set_parameters(params))
    }

    fn get_parameters(&self) -> ControlFuture<'_, ParameterMap> {
        Box::pin(self.get_parameters())
    }

    fn get_statistics(&self) -> ControlFuture<'_, StatisticsSnapshot> {
        Box::pin(self.get_statistics())
    }

    fn get_statistics_raw(&self) -> ControlFuture<'_, Vec<StatisticsSample>> {
        Box::pin(self.get_statistics_raw())
    }

    fn describe(&self) -> ControlFuture<'_, String> {
        Box::pin(self.describe())
    }

    fn reset(&self) -> ControlFuture<'_, ParameterMap> {
        Box::pin(self.reset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ProcessorError;
    use bytes::Bytes;
    use mflow_core::MessageData;
    use mflow_transport::MemTransport;
    use serde_json::json;
    use std::time::Duration as StdDuration;

    struct RecordingProcessor {
        seen: SyncMutex<Vec<i64>>,
        start_delay: Option<StdDuration>,
    }

    impl Processor for RecordingProcessor {
        fn start(&self) -> Result<(), ProcessorError> {
            if let Some(delay) = self.start_delay {
                std::thread::sleep(delay);
            }
            Ok(())
        }

        fn process(&self, message: &mflow_core::Message) -> Result<(), ProcessorError> {
            self.seen.lock().push(message.frame_index());
            Ok(())
        }

        fn set_parameter(&self, _name: &str, _value: ParameterValue) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.data_queue_length = 16;
        config.startup_timeout_secs = 1;
        config.shutdown_timeout_secs = 1;
        config.receive_timeout_millis = 20;
        config
    }

    fn frame(frame_index: i64) -> Vec<Bytes> {
        vec![
            Bytes::from(format!(
                r#"{{"htype":"array-1.0","frame":{frame_index},"shape":[1],"type":"u8"}}"#
            )),
            Bytes::from_static(b"x"),
        ]
    }

    #[tokio::test]
    async fn start_stop_round_trip_processes_frames_end_to_end() {
        let (local, remote) = MemTransport::pair();
        let processor = Arc::new(RecordingProcessor {
            seen: SyncMutex::new(Vec::new()),
            start_delay: None,
        });
        let manager = NodeManager::new(
            test_config(),
            Arc::new(Registry::standard()),
            processor.clone(),
            TransportSource::Fixed(Transport::Mem(local)),
        );

        manager.start().await.unwrap();
        assert!(manager.is_running().await.unwrap());

        for i in 0..16 {
            remote.send_frame(frame(i)).await.unwrap();
        }
        tokio::time::sleep(StdDuration::from_millis(200)).await;

        let stats = manager.get_statistics().await.unwrap();
        assert_eq!(stats.total_frames, 16);
        assert_eq!(processor.seen.lock().len(), 16);

        manager.stop().await.unwrap();
        assert!(!manager.is_running().await.unwrap());
        manager.stop().await.unwrap(); // idempotent
    }

    #[tokio::test]
    async fn second_start_fails_with_already_running() {
        let (local, _remote) = MemTransport::pair();
        let processor = Arc::new(RecordingProcessor {
            seen: SyncMutex::new(Vec::new()),
            start_delay: None,
        });
        let manager = NodeManager::new(
            test_config(),
            Arc::new(Registry::standard()),
            processor,
            TransportSource::Fixed(Transport::Mem(local)),
        );

        manager.start().await.unwrap();
        let err = manager.start().await.unwrap_err();
        assert_eq!(err, NodeError::AlreadyRunning);
        manager.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_processor_start_surfaces_startup_failed() {
        let (local, _remote) = MemTransport::pair();
        let processor = Arc::new(RecordingProcessor {
            seen: SyncMutex::new(Vec::new()),
            start_delay: Some(StdDuration::from_secs(5)),
        });
        let manager = NodeManager::new(
            test_config(),
            Arc::new(Registry::standard()),
            processor,
            TransportSource::Fixed(Transport::Mem(local)),
        );

        let err = manager.start().await.unwrap_err();
        assert!(matches!(err, NodeError::StartupFailed { .. }));
        assert!(!manager.is_running().await.unwrap());
    }

    #[tokio::test]
    async fn set_parameters_merges_and_is_visible_in_get_parameters() {
        let (local, _remote) = MemTransport::pair();
        let processor = Arc::new(RecordingProcessor {
            seen: SyncMutex::new(Vec::new()),
            start_delay: None,
        });
        let manager = NodeManager::new(
            test_config(),
            Arc::new(Registry::standard()),
            processor,
            TransportSource::Fixed(Transport::Mem(local)),
        );

        manager.start().await.unwrap();
        let mut params = ParameterMap::new();
        params.insert("threshold".to_string(), json!(10));
        manager.set_parameters(params).await.unwrap();

        let current = manager.get_parameters().await.unwrap();
        assert_eq!(current.get("threshold"), Some(&json!(10)));
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn get_parameters_preserves_insertion_order_not_alphabetical() {
        let (local, _remote) = MemTransport::pair();
        let processor = Arc::new(RecordingProcessor {
            seen: SyncMutex::new(Vec::new()),
            start_delay: None,
        });
        let manager = NodeManager::new(
            test_config(),
            Arc::new(Registry::standard()),
            processor,
            TransportSource::Fixed(Transport::Mem(local)),
        );

        manager.start().await.unwrap();
        let mut first = ParameterMap::new();
        first.insert("zebra".to_string(), json!(1));
        manager.set_parameters(first).await.unwrap();
        let mut second = ParameterMap::new();
        second.insert("apple".to_string(), json!(2));
        manager.set_parameters(second).await.unwrap();

        let current = manager.get_parameters().await.unwrap();
        let names: Vec<&str> = current.keys().map(String::as_str).collect();
        // "zebra" was set first; a BTreeMap would alphabetize "apple" ahead of it.
        assert_eq!(names, vec!["zebra", "apple"]);
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn state_reflects_start_stop_and_failed_start() {
        let (local, _remote) = MemTransport::pair();
        let processor = Arc::new(RecordingProcessor {
            seen: SyncMutex::new(Vec::new()),
            start_delay: None,
        });
        let manager = NodeManager::new(
            test_config(),
            Arc::new(Registry::standard()),
            processor,
            TransportSource::Fixed(Transport::Mem(local)),
        );

        assert_eq!(manager.state(), NodeState::Idle);
        manager.start().await.unwrap();
        assert_eq!(manager.state(), NodeState::Running);
        manager.stop().await.unwrap();
        assert_eq!(manager.state(), NodeState::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_start_leaves_state_idle_not_stuck_starting() {
        let (local, _remote) = MemTransport::pair();
        let processor = Arc::new(RecordingProcessor {
            seen: SyncMutex::new(Vec::new()),
            start_delay: Some(StdDuration::from_secs(5)),
        });
        let manager = NodeManager::new(
            test_config(),
            Arc::new(Registry::standard()),
            processor,
            TransportSource::Fixed(Transport::Mem(local)),
        );

        manager.start().await.unwrap_err();
        assert_eq!(manager.state(), NodeState::Idle);
    }
}
