use std::sync::Arc;
use std::time::{Duration, Instant};

use mflow_core::{Message, NodeError, ParameterValue, Statistics, StatisticsSample};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::live_flag::LiveFlag;
use crate::processor::Processor;
use crate::reserved::{apply_reserved, is_reserved, MessageLimit};

fn apply_parameter(
    name: &str,
    value: &ParameterValue,
    limit: &MessageLimit,
    processor: &dyn Processor,
) -> Result<(), NodeError> {
    if is_reserved(name) {
        apply_reserved(name, value, limit)
    } else {
        processor
            .set_parameter(name, value.clone())
            .map_err(|e| NodeError::ProcessorError { detail: e.0 })
    }
}

/// Drains every pending entry currently on `param_rx` without blocking.
fn drain_parameters(
    param_rx: &mut mpsc::UnboundedReceiver<(String, ParameterValue)>,
    limit: &MessageLimit,
    processor: &dyn Processor,
) {
    while let Ok((name, value)) = param_rx.try_recv() {
        if let Err(e) = apply_parameter(&name, &value, limit, processor) {
            tracing::warn!(parameter = %name, error = %e, "failed to apply parameter");
        }
    }
}

/// Single-threaded drain of the data queue through the user processor.
///
/// Startup (in order): drain and apply all pending parameters; call
/// `processor.start()`; set `live_flag`. Main loop: bounded-wait pop from
/// the data queue, `processor.process`, append a statistics sample, drain
/// and apply parameters again, and stop once the `n_messages` limit (if
/// configured) is reached. `processor.stop()` runs on every exit path.
pub async fn run(
    live_flag: LiveFlag,
    mut data_rx: mpsc::Receiver<Message>,
    mut param_rx: mpsc::UnboundedReceiver<(String, ParameterValue)>,
    stats: Arc<Statistics>,
    processor: Arc<dyn Processor>,
    poll_timeout: Duration,
) {
    let limit = MessageLimit::new();

    drain_parameters(&mut param_rx, &limit, processor.as_ref());

    if let Err(e) = processor.start() {
        tracing::error!(error = %e, "processor.start() failed, worker will not run");
        // live_flag stays clear; the manager's startup wait will time out.
        return;
    }

    live_flag.set();
    tracing::debug!("processor worker entered main loop");

    'main: while live_flag.is_set() {
        match timeout(poll_timeout, data_rx.recv()).await {
            Ok(Some(message)) => {
                let byte_length = message.data_length();
                let frame_index = message.frame_index();
                let started = Instant::now();
                let result = processor.process(&message);
                let processing_time_seconds = started.elapsed().as_secs_f64();

                match result {
                    Ok(()) => {
                        stats.push(StatisticsSample {
                            frame_index,
                            byte_length,
                            processing_time_seconds,
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "processor.process() failed, stopping");
                        break 'main;
                    }
                }

                if limit.record_one_processed() {
                    tracing::debug!("n_messages limit reached, stopping gracefully");
                    break 'main;
                }
            }
            Ok(None) => {
                tracing::debug!("data queue closed, stopping processor worker");
                break 'main;
            }
            Err(_) => {
                // Bounded-wait timed out with nothing to process. Normal.
            }
        }

        drain_parameters(&mut param_rx, &limit, processor.as_ref());
    }

    if let Err(e) = processor.stop() {
        tracing::warn!(error = %e, "processor.stop() returned an error");
    }
    live_flag.clear();
    tracing::debug!("processor worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use mflow_core::MessageData;
    use parking_lot::Mutex;
    use serde_json::json;

    struct RecordingProcessor {
        seen: Mutex<Vec<i64>>,
        threshold: Mutex<i64>,
    }

    impl Processor for RecordingProcessor {
        fn process(&self, message: &Message) -> Result<(), crate::processor::ProcessorError> {
            self.seen.lock().push(message.frame_index());
            Ok(())
        }

        fn set_parameter(
            &self,
            name: &str,
            value: ParameterValue,
        ) -> Result<(), crate::processor::ProcessorError> {
            if name == "threshold" {
                *self.threshold.lock() = value.as_i64().unwrap_or(0);
            }
            Ok(())
        }
    }

    fn make_message(frame_index: i64) -> Message {
        Message::new(
            "array-1.0",
            json!({}),
            frame_index,
            Some(vec![1]),
            Some("u8".to_string()),
            MessageData::Bytes(vec![]),
        )
    }

    #[tokio::test]
    async fn processes_every_message_in_order_and_records_statistics() {
        let processor = Arc::new(RecordingProcessor {
            seen: Mutex::new(Vec::new()),
            threshold: Mutex::new(0),
        });
        let stats = Arc::new(Statistics::new(100));
        let live_flag = LiveFlag::new();
        let (data_tx, data_rx) = mpsc::channel(16);
        let (_param_tx, param_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(run(
            live_flag.clone(),
            data_rx,
            param_rx,
            stats.clone(),
            processor.clone(),
            Duration::from_millis(20),
        ));

        assert!(live_flag.wait_until_set(Duration::from_secs(1)).await);
        for i in 0..5 {
            data_tx.send(make_message(i)).await.unwrap();
        }
        // give the worker a moment to drain
        tokio::time::sleep(Duration::from_millis(100)).await;
        live_flag.clear();
        handle.await.unwrap();

        assert_eq!(*processor.seen.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(stats.aggregate().total_frames, 5);
    }

    #[tokio::test]
    async fn n_messages_stops_after_exactly_k() {
        let processor = Arc::new(RecordingProcessor {
            seen: Mutex::new(Vec::new()),
            threshold: Mutex::new(0),
        });
        let stats = Arc::new(Statistics::new(100));
        let live_flag = LiveFlag::new();
        let (data_tx, data_rx) = mpsc::channel(16);
        let (param_tx, param_rx) = mpsc::unbounded_channel();
        param_tx.send(("n_messages".to_string(), json!(3))).unwrap();

        let handle = tokio::spawn(run(
            live_flag.clone(),
            data_rx,
            param_rx,
            stats,
            processor.clone(),
            Duration::from_millis(20),
        ));

        assert!(live_flag.wait_until_set(Duration::from_secs(1)).await);
        for i in 0..10 {
            // A full channel would block forever once the worker stops
            // draining, so bail out politely if the send can't land.
            if data_tx.send(make_message(i)).await.is_err() {
                break;
            }
        }
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(processor.seen.lock().len(), 3);
        assert!(!live_flag.is_set());
    }
}
