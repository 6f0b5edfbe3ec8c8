//! Notation-specific checks layered on top of decoding.

use crate::codec::{decode_hex, decode_nec, decode_raw, parse_preamble, NecFrame};
use crate::error::ValidationError;
use crate::signal::{classify, CodeType, IrSignal};
use crate::{MAX_CARRIER_HZ, MIN_CARRIER_HZ};

/// What a validation result will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Storing the input in a host configuration; unresolved variables are allowed.
    Save,
    /// Sending the code now; there must be something to decode.
    Transmit,
}

pub fn is_frequency_valid(frequency_hz: u32) -> bool {
    (MIN_CARRIER_HZ..=MAX_CARRIER_HZ).contains(&frequency_hz)
}

/// Validates a decoded signal for transmission.
pub fn validate(
    signal: &IrSignal,
    code_type: CodeType,
    raw_input: &str,
) -> Result<(), ValidationError> {
    match code_type {
        CodeType::EmptyVariable => {
            return Err(ValidationError::EmptyInput(raw_input.to_string()));
        }
        CodeType::Unknown => {
            return Err(ValidationError::Unrecognized(raw_input.to_string()));
        }
        CodeType::Hex | CodeType::Raw | CodeType::Nec => {}
    }

    let frequency = signal.carrier_frequency_hz();
    log::debug!("validate: {} frequency {}", code_type, frequency);
    if !is_frequency_valid(frequency) {
        return Err(ValidationError::InvalidFrequency { actual: frequency });
    }

    match code_type {
        CodeType::Hex => check_hex_length(raw_input),
        CodeType::Nec => check_nec_checksum(raw_input),
        _ => Ok(()),
    }
}

fn check_hex_length(raw_input: &str) -> Result<(), ValidationError> {
    let preamble = parse_preamble(raw_input)?;
    let expected = preamble.expected_word_count();
    let actual = raw_input.split_whitespace().count();
    log::debug!("check_hex_length: expected {} actual {}", expected, actual);
    if expected != actual {
        return Err(ValidationError::InvalidLength { expected, actual });
    }
    Ok(())
}

fn check_nec_checksum(raw_input: &str) -> Result<(), ValidationError> {
    let frame = NecFrame::parse(raw_input)?;
    if !frame.address_checks() {
        log::info!(
            "check_nec_checksum: address {:#04x} / {:#04x} not complementary, assuming extended addressing",
            frame.address,
            frame.inverse_address
        );
    }
    if !frame.command_checks() {
        return Err(ValidationError::InvalidData(
            "command/inverted command mismatch".to_string(),
        ));
    }
    Ok(())
}

pub fn decode(code_type: CodeType, input: &str) -> Result<IrSignal, ValidationError> {
    let signal = match code_type {
        CodeType::Hex => decode_hex(input)?,
        CodeType::Raw => decode_raw(input)?,
        CodeType::Nec => decode_nec(input)?,
        CodeType::EmptyVariable => return Err(ValidationError::EmptyInput(input.to_string())),
        CodeType::Unknown => return Err(ValidationError::Unrecognized(input.to_string())),
    };
    Ok(signal)
}

/// Classifies, decodes and validates `input`.
///
/// Returns `Ok(None)` only for an unresolved variable saved with [`Purpose::Save`].
pub fn prepare(input: &str, purpose: Purpose) -> Result<Option<IrSignal>, ValidationError> {
    let code_type = classify(input);
    if code_type == CodeType::EmptyVariable && purpose == Purpose::Save {
        return Ok(None);
    }

    let signal = decode(code_type, input)?;
    validate(&signal, code_type, input)?;
    Ok(Some(signal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    const HEX_CODE: &str = "0000 006D 0000 0008 0060 0040 0040 0020 0020 0040 0020 0040 0020 0040 0020 0040 0020 0020 0020 0D7A";
    const RAW_CODE: &str = "38028,2526,1684,1684,842,842,1684,842,1684,842,1684,842,1684,842,842,842,90789";

    #[test]
    fn test_valid_codes_pass() {
        assert!(prepare(HEX_CODE, Purpose::Transmit).unwrap().is_some());
        assert!(prepare(RAW_CODE, Purpose::Transmit).unwrap().is_some());
        assert!(prepare("0xF708FB04", Purpose::Transmit).unwrap().is_some());
    }

    #[test]
    fn test_hex_frequency_out_of_range() {
        let input = HEX_CODE.replacen("006D", "000D", 1);
        let err = prepare(&input, Purpose::Transmit).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFrequency { actual } if actual > MAX_CARRIER_HZ));
        assert_eq!(err.code(), ErrorCode::InvalidFrequency);
    }

    #[test]
    fn test_hex_inconsistent_length() {
        let input = HEX_CODE.replacen("0008", "0005", 1);
        let signal = decode_hex(&input).unwrap();
        assert!(is_frequency_valid(signal.carrier_frequency_hz()));

        let err = validate(&signal, CodeType::Hex, &input).unwrap_err();
        assert_eq!(err, ValidationError::InvalidLength { expected: 14, actual: 20 });
        assert_eq!(err.code().code(), 4);
    }

    #[test]
    fn test_raw_frequency_bounds_are_inclusive() {
        assert!(prepare("30000,100,100", Purpose::Transmit).is_ok());
        assert!(prepare("60000,100,100", Purpose::Transmit).is_ok());
        let err = prepare("29999,100,100", Purpose::Transmit).unwrap_err();
        assert_eq!(err, ValidationError::InvalidFrequency { actual: 29_999 });
        let err = prepare("60001,100,100", Purpose::Transmit).unwrap_err();
        assert_eq!(err, ValidationError::InvalidFrequency { actual: 60_001 });
    }

    #[test]
    fn test_nec_command_mismatch_fails() {
        // command 0x08 with inverse 0xF6
        let err = prepare("0xF608FB04", Purpose::Transmit).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidData("command/inverted command mismatch".to_string())
        );
        assert_eq!(err.code(), ErrorCode::InvalidData);
    }

    #[test]
    fn test_nec_address_mismatch_is_informational_only() {
        // Address bytes 0x04/0x12 are not complementary, as with 16-bit extended
        // addressing. Only the command pair is enforced.
        let signal = prepare("0xF7081204", Purpose::Transmit).unwrap();
        assert_eq!(signal.unwrap().pulse_pattern_us().len(), 67);
    }

    #[test]
    fn test_empty_variable_depends_on_purpose() {
        assert_eq!(prepare("%input", Purpose::Save), Ok(None));
        let err = prepare("%input", Purpose::Transmit).unwrap_err();
        assert_eq!(err, ValidationError::EmptyInput("%input".to_string()));
        assert_eq!(err.code(), ErrorCode::EmptyInput);
    }

    #[test]
    fn test_unknown_fails_for_both_purposes() {
        for purpose in [Purpose::Save, Purpose::Transmit] {
            let err = prepare("not a code", purpose).unwrap_err();
            assert_eq!(err.code(), ErrorCode::Generic);
        }
    }

    #[test]
    fn test_decode_failure_is_reported_before_validation() {
        let err = prepare("38000", Purpose::Transmit).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
        let err = prepare("0000 006D", Purpose::Save).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }
}
