use std::fmt;
use thiserror::Error;

/// Numeric error taxonomy reported to the host automation tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Generic,
    EmptyInput,
    InvalidFrequency,
    InvalidLength,
    NoBuiltinEmitter,
    TransmissionFailed,
    NoWiredHeadphone,
    InvalidData,
}

impl ErrorCode {
    pub fn code(&self) -> u16 {
        match self {
            ErrorCode::Generic => 1,
            ErrorCode::EmptyInput => 2,
            ErrorCode::InvalidFrequency => 3,
            ErrorCode::InvalidLength => 4,
            ErrorCode::NoBuiltinEmitter => 5,
            ErrorCode::TransmissionFailed => 6,
            ErrorCode::NoWiredHeadphone => 7,
            ErrorCode::InvalidData => 8,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::Generic => "unknown error",
            ErrorCode::EmptyInput => "variable value unset",
            ErrorCode::InvalidFrequency => "invalid frequency",
            ErrorCode::InvalidLength => "invalid code length calculated",
            ErrorCode::NoBuiltinEmitter => "no builtin ir emitter, fallback not permitted",
            ErrorCode::TransmissionFailed => "unknown error during transmission",
            ErrorCode::NoWiredHeadphone => "no ir blaster detected on 3.5mm audio port",
            ErrorCode::InvalidData => "invalid data",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed preamble: expected 4 words, found {0}")]
    MalformedPreamble(usize),

    #[error("invalid hex word: {0:?}")]
    InvalidWord(String),

    #[error("invalid number: {0:?}")]
    InvalidNumber(String),

    #[error("frequency without pulse pattern")]
    MissingPattern,

    #[error("expected 8 hex digits, found {0}")]
    InvalidDigitCount(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0}")]
    EmptyInput(String),

    #[error("{actual}")]
    InvalidFrequency { actual: u32 },

    #[error("calculated length - {expected} | actual length = {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("{0}")]
    InvalidData(String),

    #[error("unrecognized input {0:?}")]
    Unrecognized(String),

    #[error("{0}")]
    Malformed(#[from] DecodeError),
}

impl ValidationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ValidationError::EmptyInput(_) => ErrorCode::EmptyInput,
            ValidationError::InvalidFrequency { .. } => ErrorCode::InvalidFrequency,
            ValidationError::InvalidLength { .. } => ErrorCode::InvalidLength,
            ValidationError::InvalidData(_) => ErrorCode::InvalidData,
            ValidationError::Unrecognized(_) | ValidationError::Malformed(_) => ErrorCode::Generic,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthError {
    #[error("empty pulse pattern")]
    EmptyPattern,

    #[error("carrier frequency {0} Hz cannot be synthesized")]
    InvalidFrequency(u32),

    #[error("signal lasts {duration_ms} ms, limit is {limit_ms} ms")]
    SignalTooLong { duration_ms: u64, limit_ms: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Audio routing error: {0}")]
    Routing(String),

    #[error("Audio stream error: {0}")]
    Stream(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("IR hardware error: {0}")]
pub struct HardwareError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransmitError {
    #[error("no built-in IR emitter")]
    NoBuiltinEmitter,

    #[error("no wired audio sink")]
    NoWiredHeadphone,

    #[error("{0}")]
    Unknown(String),
}

impl TransmitError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TransmitError::NoBuiltinEmitter => ErrorCode::NoBuiltinEmitter,
            TransmitError::NoWiredHeadphone => ErrorCode::NoWiredHeadphone,
            TransmitError::Unknown(_) => ErrorCode::TransmissionFailed,
        }
    }
}

impl From<HardwareError> for TransmitError {
    fn from(e: HardwareError) -> Self {
        TransmitError::Unknown(e.to_string())
    }
}

impl From<AudioError> for TransmitError {
    fn from(e: AudioError) -> Self {
        TransmitError::Unknown(e.to_string())
    }
}

impl From<SynthError> for TransmitError {
    fn from(e: SynthError) -> Self {
        TransmitError::Unknown(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transmit(#[from] TransmitError),
}

impl IrError {
    pub fn code(&self) -> ErrorCode {
        match self {
            IrError::Validation(e) => e.code(),
            IrError::Transmit(e) => e.code(),
        }
    }

    pub fn report(&self) -> ErrorReport {
        let code = self.code();
        let detail = match self {
            IrError::Transmit(TransmitError::NoBuiltinEmitter | TransmitError::NoWiredHeadphone) => {
                String::new()
            }
            _ => self.to_string(),
        };
        let message = if detail.is_empty() {
            code.message().to_string()
        } else {
            format!("{}: {}", code.message(), detail)
        };
        ErrorReport {
            code: code.code(),
            message,
        }
    }
}

/// The `(code, message)` pair surfaced to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub code: u16,
    pub message: String,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {}: {}", self.code, self.message)
    }
}

impl From<&IrError> for ErrorReport {
    fn from(e: &IrError) -> Self {
        e.report()
    }
}

pub type Result<T> = std::result::Result<T, IrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_codes_are_stable() {
        let codes: Vec<u16> = [
            ErrorCode::Generic,
            ErrorCode::EmptyInput,
            ErrorCode::InvalidFrequency,
            ErrorCode::InvalidLength,
            ErrorCode::NoBuiltinEmitter,
            ErrorCode::TransmissionFailed,
            ErrorCode::NoWiredHeadphone,
            ErrorCode::InvalidData,
        ]
        .iter()
        .map(ErrorCode::code)
        .collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_report_carries_detail() {
        let err = IrError::from(ValidationError::InvalidFrequency { actual: 318_880 });
        let report = err.report();
        assert_eq!(report.code, 3);
        assert_eq!(report.message, "invalid frequency: 318880");
    }

    #[test]
    fn test_lower_level_failures_normalize_to_transmission_error() {
        let err = TransmitError::from(AudioError::Stream("underrun".into()));
        assert_eq!(err.code(), ErrorCode::TransmissionFailed);
        let err = TransmitError::from(HardwareError("busy".into()));
        assert_eq!(err.code().code(), 6);
    }
}
