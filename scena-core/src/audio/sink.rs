//! Host-provided audio backend surface

/// A playable audio source owned by the host.
///
/// Positions are milliseconds from the start of the source. Implementations
/// must be cheap to poll; `position_ms` is read every tick.
pub trait AudioSink: Send {
    fn play(&mut self);
    fn pause(&mut self);
    fn is_playing(&self) -> bool;
    fn position_ms(&mut self) -> f64;
    fn set_position_ms(&mut self, position: f64);
    /// Linear gain, 0.0..=1.0.
    fn set_volume(&mut self, volume: f64);
    /// Restart from the beginning on reaching the end. Sinks that cannot
    /// loop may ignore this.
    fn set_loop(&mut self, _looped: bool) {}
}
