//! Typed defaults for the numeric knobs spec.md names inline rather than in
//! a layered configuration subsystem.
//!
//! A full `ConfigurationSource`/`ConfigurationLayer` stack (as
//! `spark-core::configuration` provides for the host actor framework) is
//! explicitly OUT OF SCOPE per spec.md §1 — configuration loading belongs to
//! the surrounding actor framework. What the flow engine still needs,
//! matching the "ambient config concern" every teacher module carries, is a
//! small `Copy` struct with sane defaults that a host can override and
//! (optionally, behind the `serde` feature) deserialize from its own config
//! layer.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowConfig {
    /// `merge`'s default concurrency cap (spec.md §4.4.3).
    pub merge_max_concurrent: usize,
    /// `merge`'s default per-input pending budget (spec.md §4.4.3).
    pub merge_max_pending_per_input: usize,
    /// `cache`'s default initial history capacity (spec.md §4.4.4).
    pub cache_initial_capacity: usize,
    /// `for_each`'s default requested buffer size (spec.md §4.4.6).
    pub for_each_default_request: usize,
    /// `observe_on`/`to_resource` default buffer size (spec.md §6.2).
    pub default_flow_buffer_size: usize,
    /// `observe_on`/`to_resource` default minimum re-request size (spec.md §6.2).
    pub default_min_demand: usize,
    /// Stream bridge constant (spec.md §4.5/§6.6).
    pub min_batch_buffering: usize,
    /// Stream bridge constant (spec.md §4.5/§6.6).
    pub min_batch_request_threshold: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            merge_max_concurrent: usize::MAX,
            merge_max_pending_per_input: 8,
            cache_initial_capacity: 64,
            for_each_default_request: 128,
            default_flow_buffer_size: 32,
            default_min_demand: 8,
            min_batch_buffering: 5,
            min_batch_request_threshold: 3,
        }
    }
}
