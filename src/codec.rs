use crate::error::DecodeError;
use crate::signal::IrSignal;

/// Pronto clock tick in microseconds, used to turn the frequency divisor into Hz.
pub const PRONTO_CLOCK_US: f64 = 0.241246;
pub const PRONTO_PREAMBLE_WORDS: usize = 4;

pub const NEC_CARRIER_HZ: u32 = 38_000;
pub const NEC_HEADER_MARK_US: u32 = 9_000;
pub const NEC_HEADER_SPACE_US: u32 = 4_500;
pub const NEC_BIT_MARK_US: u32 = 563;
pub const NEC_ONE_SPACE_US: u32 = 1_688;
pub const NEC_ZERO_SPACE_US: u32 = 563;
/// Header pair, 32 mark/space bit pairs and the trailing mark.
pub const NEC_PATTERN_LEN: usize = 2 + 32 * 2 + 1;

/// First four words of a Pronto HEX code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProntoPreamble {
    pub format: u16,
    pub frequency_divisor: u16,
    pub burst_pairs_1: u16,
    pub burst_pairs_2: u16,
}

impl ProntoPreamble {
    pub fn carrier_frequency_hz(&self) -> u32 {
        (1_000_000.0 / (self.frequency_divisor as f64 * PRONTO_CLOCK_US)) as u32
    }

    /// Word count implied by the preamble: itself plus both burst pair sequences.
    pub fn expected_word_count(&self) -> usize {
        PRONTO_PREAMBLE_WORDS + self.burst_pairs_1 as usize * 2 + self.burst_pairs_2 as usize * 2
    }
}

/// The four bytes of an NEC code, byte 0 being the least significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NecFrame {
    pub address: u8,
    pub inverse_address: u8,
    pub command: u8,
    pub inverse_command: u8,
}

impl NecFrame {
    pub fn from_value(value: u32) -> Self {
        let [address, inverse_address, command, inverse_command] = value.to_le_bytes();
        Self {
            address,
            inverse_address,
            command,
            inverse_command,
        }
    }

    pub fn parse(input: &str) -> Result<Self, DecodeError> {
        parse_nec_value(input).map(Self::from_value)
    }

    pub fn value(&self) -> u32 {
        u32::from_le_bytes([
            self.address,
            self.inverse_address,
            self.command,
            self.inverse_command,
        ])
    }

    pub fn command_checks(&self) -> bool {
        self.command == !self.inverse_command
    }

    pub fn address_checks(&self) -> bool {
        self.address == !self.inverse_address
    }
}

fn parse_hex_word(word: &str) -> Result<u16, DecodeError> {
    if word.is_empty() || !word.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DecodeError::InvalidWord(word.to_string()));
    }
    u16::from_str_radix(word, 16).map_err(|_| DecodeError::InvalidWord(word.to_string()))
}

pub fn parse_preamble(input: &str) -> Result<ProntoPreamble, DecodeError> {
    let words: Vec<&str> = input.split_whitespace().take(PRONTO_PREAMBLE_WORDS).collect();
    if words.len() < PRONTO_PREAMBLE_WORDS {
        return Err(DecodeError::MalformedPreamble(words.len()));
    }

    Ok(ProntoPreamble {
        format: parse_hex_word(words[0])?,
        frequency_divisor: parse_hex_word(words[1])?,
        burst_pairs_1: parse_hex_word(words[2])?,
        burst_pairs_2: parse_hex_word(words[3])?,
    })
}

/// Decodes a Pronto HEX code. Pattern words are kept as their raw values.
pub fn decode_hex(input: &str) -> Result<IrSignal, DecodeError> {
    let preamble = parse_preamble(input)?;

    let pattern = input
        .split_whitespace()
        .skip(PRONTO_PREAMBLE_WORDS)
        .map(|word| parse_hex_word(word).map(u32::from))
        .collect::<Result<Vec<u32>, DecodeError>>()?;

    if pattern.is_empty() {
        return Err(DecodeError::MissingPattern);
    }

    let signal = IrSignal::new(preamble.carrier_frequency_hz(), pattern);
    log::debug!(
        "decode_hex: {} Hz, {} intervals",
        signal.carrier_frequency_hz(),
        signal.pulse_pattern_us().len()
    );
    Ok(signal)
}

/// Decodes `frequency,tick,tick,...`, scaling ticks by `frequency / 1e6`.
pub fn decode_raw(input: &str) -> Result<IrSignal, DecodeError> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let tokens: Vec<&str> = compact.split(',').collect();
    if tokens.len() < 2 {
        return Err(DecodeError::MissingPattern);
    }

    let frequency = parse_decimal(tokens[0])?;
    let frequency = u32::try_from(frequency)
        .map_err(|_| DecodeError::InvalidNumber(tokens[0].to_string()))?;

    let pattern = tokens[1..]
        .iter()
        .map(|token| {
            let ticks = parse_decimal(token)?;
            // rounded half-up, not truncated: 90789 ticks at 38028 Hz is 3453
            let scaled = (ticks as u128 * frequency as u128 + 500_000) / 1_000_000;
            u32::try_from(scaled).map_err(|_| DecodeError::InvalidNumber(token.to_string()))
        })
        .collect::<Result<Vec<u32>, DecodeError>>()?;

    let signal = IrSignal::new(frequency, pattern);
    log::debug!("decode_raw: {} Hz, pattern {:?}", frequency, signal.pulse_pattern_us());
    Ok(signal)
}

fn parse_decimal(token: &str) -> Result<u64, DecodeError> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidNumber(token.to_string()));
    }
    token
        .parse::<u64>()
        .map_err(|_| DecodeError::InvalidNumber(token.to_string()))
}

fn parse_nec_value(input: &str) -> Result<u32, DecodeError> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    if digits.len() != 8 {
        return Err(DecodeError::InvalidDigitCount(digits.len()));
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DecodeError::InvalidWord(digits.to_string()));
    }
    u32::from_str_radix(digits, 16).map_err(|_| DecodeError::InvalidWord(digits.to_string()))
}

/// Encodes an NEC code as a 38 kHz pulse train, LSB byte and LSB bit first.
pub fn decode_nec(input: &str) -> Result<IrSignal, DecodeError> {
    let value = parse_nec_value(input)?;

    let mut pattern = Vec::with_capacity(NEC_PATTERN_LEN);
    pattern.push(NEC_HEADER_MARK_US);
    pattern.push(NEC_HEADER_SPACE_US);

    for byte in value.to_le_bytes() {
        for bit in 0..8 {
            pattern.push(NEC_BIT_MARK_US);
            if (byte >> bit) & 1 == 1 {
                pattern.push(NEC_ONE_SPACE_US);
            } else {
                pattern.push(NEC_ZERO_SPACE_US);
            }
        }
    }

    pattern.push(NEC_BIT_MARK_US);

    Ok(IrSignal::new(NEC_CARRIER_HZ, pattern))
}
