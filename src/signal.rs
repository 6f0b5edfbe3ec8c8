use std::fmt;

/// Marker that starts a host variable reference such as `%ir_code`.
pub const VARIABLE_MARKER: char = '%';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeType {
    Hex,
    Raw,
    Nec,
    EmptyVariable,
    Unknown,
}

impl fmt::Display for CodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodeType::Hex => "HEX",
            CodeType::Raw => "RAW",
            CodeType::Nec => "NEC",
            CodeType::EmptyVariable => "EMPTY_VARIABLE",
            CodeType::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionMethod {
    DeviceEmitter,
    AudioPulse,
}

impl TransmissionMethod {
    /// Picks a method from hardware capability when the caller did not choose one.
    pub fn infer(has_emitter: bool, allow_audio_fallback: bool) -> Self {
        if !has_emitter && allow_audio_fallback {
            TransmissionMethod::AudioPulse
        } else {
            TransmissionMethod::DeviceEmitter
        }
    }
}

/// Carrier frequency plus alternating mark/space intervals, mark first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrSignal {
    carrier_frequency_hz: u32,
    pulse_pattern_us: Vec<u32>,
}

impl IrSignal {
    pub fn new(carrier_frequency_hz: u32, pulse_pattern_us: Vec<u32>) -> Self {
        Self {
            carrier_frequency_hz,
            pulse_pattern_us,
        }
    }

    pub fn carrier_frequency_hz(&self) -> u32 {
        self.carrier_frequency_hz
    }

    pub fn pulse_pattern_us(&self) -> &[u32] {
        &self.pulse_pattern_us
    }

    pub fn total_duration_us(&self) -> u64 {
        self.pulse_pattern_us.iter().map(|&v| v as u64).sum()
    }
}

/// Determines the notation of `input` from its lexical shape alone.
///
/// NEC is checked before HEX so a `0x`-prefixed 8 digit value can never be
/// mistaken for anything else.
pub fn classify(input: &str) -> CodeType {
    let code_type = if is_nec_shape(input) {
        CodeType::Nec
    } else if is_hex_shape(input) {
        CodeType::Hex
    } else if is_raw_shape(input) {
        CodeType::Raw
    } else if is_variable_name(input) {
        CodeType::EmptyVariable
    } else {
        CodeType::Unknown
    };
    log::debug!("classify: {:?} -> {}", input, code_type);
    code_type
}

fn is_nec_shape(input: &str) -> bool {
    input
        .strip_prefix("0x")
        .map(|digits| digits.len() == 8 && digits.bytes().all(|b| b.is_ascii_hexdigit()))
        .unwrap_or(false)
}

fn is_hex_shape(input: &str) -> bool {
    input
        .split(' ')
        .all(|word| word.len() == 4 && word.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn is_raw_shape(input: &str) -> bool {
    input.split(',').all(|token| {
        let token = token.trim();
        !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
    })
}

fn is_variable_name(input: &str) -> bool {
    let Some(name) = input.strip_prefix(VARIABLE_MARKER) else {
        return false;
    };
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    name.len() >= 2 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
