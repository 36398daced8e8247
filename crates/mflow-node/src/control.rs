use std::future::Future;
use std::pin::Pin;

use mflow_core::{NodeError, ParameterMap, StatisticsSample, StatisticsSnapshot};

pub type ControlFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, NodeError>> + Send + 'a>>;

/// Uniform control surface implemented by both the in-process `NodeManager`
/// and the out-of-process `NodeManagerProxy`, so the HTTP layer can hold
/// either behind one `Arc<dyn NodeControl>` without knowing which deployment
/// mode it is talking to.
///
/// Boxed futures rather than the `impl Future` return-position-impl-trait
/// `Transport` uses: `Transport` dispatches through an enum and never needs
/// `dyn`, while `NodeControl` is always reached as `Arc<dyn NodeControl>`,
/// which requires object safety.
pub trait NodeControl: Send + Sync {
    fn start(&self) -> ControlFuture<'_, ()>;
    fn stop(&self) -> ControlFuture<'_, ()>;
    fn is_running(&self) -> ControlFuture<'_, bool>;
    fn set_parameters(&self, params: ParameterMap) -> ControlFuture<'_, ()>;
    fn get_parameters(&self) -> ControlFuture<'_, ParameterMap>;
    fn get_statistics(&self) -> ControlFuture<'_, StatisticsSnapshot>;
    fn get_statistics_raw(&self) -> ControlFuture<'_, Vec<StatisticsSample>>;
    fn describe(&self) -> ControlFuture<'_, String>;
    /// Processor-defined reset; returns the processor's current parameters
    /// afterwards, matching the HTTP `reset` endpoint's response.
    fn reset(&self) -> ControlFuture<'_, ParameterMap>;
}
