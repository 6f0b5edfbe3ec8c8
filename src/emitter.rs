use crate::error::HardwareError;

/// A built-in consumer IR transmitter.
pub trait IrEmitter: Send + Sync {
    fn has_emitter(&self) -> bool;

    /// Sends `pattern_us` modulated at `frequency_hz`. Blocks until the driver accepts it.
    fn transmit(&self, frequency_hz: u32, pattern_us: &[i32]) -> Result<(), HardwareError>;
}

/// Stand-in for hosts without an IR transmitter.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEmitter;

impl IrEmitter for NoEmitter {
    fn has_emitter(&self) -> bool {
        false
    }

    fn transmit(&self, _frequency_hz: u32, _pattern_us: &[i32]) -> Result<(), HardwareError> {
        Err(HardwareError("no IR emitter on this host".into()))
    }
}
