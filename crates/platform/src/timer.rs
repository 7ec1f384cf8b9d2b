//! Sample-rate timer abstraction
//!
//! The recorder gates sampling by enabling this clock when a recording
//! starts and disabling it when the stop switch is seen. The 10 ms
//! housekeeping tick that drives the storage driver's soft timers is *not*
//! behind this trait — it runs from power-on and is never gated.

/// The periodic timer that paces analog conversions.
pub trait SampleClock {
    /// Start firing sample interrupts at the configured rate.
    fn enable(&mut self);

    /// Stop firing sample interrupts.
    fn disable(&mut self);
}
