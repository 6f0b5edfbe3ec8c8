use crate::dispatch::Dispatcher;
use crate::error::{ErrorReport, IrError, ValidationError};
use crate::signal::{classify, CodeType, IrSignal, TransmissionMethod};
use crate::validate::{prepare, Purpose};
use std::time::Duration;

pub const CONFIRM_VIBRATION: Duration = Duration::from_millis(50);
pub const FAILURE_VIBRATION: Duration = Duration::from_millis(500);

/// Haptic feedback on the host device.
pub trait Haptics {
    fn vibrate(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn vibrate(&self, duration: Duration) {
        log::debug!("vibrate: {:?} (no haptics)", duration);
    }
}

/// One live input plus the outcome of the last validation or transmission.
#[derive(Debug, Default)]
pub struct EngineSession {
    input: Option<String>,
    last_error: Option<IrError>,
}

impl EngineSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the live input. The previous error stays until the next check.
    pub fn update_input(&mut self, input: impl Into<String>) {
        let input = input.into();
        log::info!("update_input: {}", input);
        self.input = Some(input);
    }

    pub fn input(&self) -> Option<&str> {
        self.input.as_deref()
    }

    pub fn code_type(&self) -> CodeType {
        self.input.as_deref().map(classify).unwrap_or(CodeType::Unknown)
    }

    pub fn last_error(&self) -> Option<&IrError> {
        self.last_error.as_ref()
    }

    fn check(&mut self, purpose: Purpose) -> Result<Option<IrSignal>, IrError> {
        let result = match self.input.as_deref() {
            Some(input) => prepare(input, purpose).map_err(IrError::from),
            None => Err(IrError::from(ValidationError::EmptyInput(String::new()))),
        };
        self.last_error = result.as_ref().err().cloned();
        result
    }

    /// Whether the input may be stored; unresolved variables are accepted.
    pub fn validate_for_save(&mut self) -> Result<(), IrError> {
        self.check(Purpose::Save).map(|_| ())
    }

    pub fn validate_for_transmit(&mut self) -> Result<IrSignal, IrError> {
        let signal = self.check(Purpose::Transmit)?;
        signal.ok_or_else(|| {
            let err = IrError::from(ValidationError::EmptyInput(
                self.input.clone().unwrap_or_default(),
            ));
            self.last_error = Some(err.clone());
            err
        })
    }

    pub fn transmit(
        &mut self,
        dispatcher: &Dispatcher,
        method: TransmissionMethod,
    ) -> Result<(), IrError> {
        let signal = self.validate_for_transmit()?;
        let result = dispatcher.transmit(&signal, method).map_err(IrError::from);
        self.last_error = result.as_ref().err().cloned();
        result
    }
}

/// A transmit action as issued by the host automation tool.
#[derive(Debug, Clone)]
pub struct TransmitRequest {
    pub code: String,
    /// Explicit delivery method; inferred from hardware when absent.
    pub method: Option<TransmissionMethod>,
    pub allow_audio_fallback: bool,
    pub vibrate: bool,
}

impl TransmitRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            method: None,
            allow_audio_fallback: false,
            vibrate: false,
        }
    }
}

/// Validates and sends one request, returning the host-facing error pair on failure.
pub fn run_request(
    dispatcher: &Dispatcher,
    haptics: &dyn Haptics,
    request: &TransmitRequest,
) -> Result<(), ErrorReport> {
    let mut session = EngineSession::new();
    session.update_input(request.code.as_str());

    let result = session.validate_for_transmit().and_then(|signal| {
        if request.vibrate {
            haptics.vibrate(CONFIRM_VIBRATION);
        }
        let method = request
            .method
            .unwrap_or_else(|| dispatcher.select_method(request.allow_audio_fallback));
        dispatcher.transmit(&signal, method).map_err(IrError::from)
    });

    result.map_err(|e| {
        if request.vibrate {
            haptics.vibrate(FAILURE_VIBRATION);
        }
        let report = e.report();
        log::error!("run_request: {} | input: {}", report, request.code);
        report
    })
}
