#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
use crate::{
    classify,
    error::IrError,
    modulation::PulseSynthesizer,
    validate::{decode, prepare, Purpose},
    DEFAULT_MIN_BUFFER_BYTES, SAMPLE_RATE,
};

/// Browser facade: decode codes and synthesize the jack waveform for Web Audio.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub struct IrPulseWasm {
    synthesizer: PulseSynthesizer,
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl IrPulseWasm {
    #[wasm_bindgen(constructor)]
    pub fn new(min_buffer_bytes: Option<u32>) -> Self {
        console_error_panic_hook::set_once();

        let min_buffer_bytes = min_buffer_bytes
            .map(|b| b as usize)
            .unwrap_or(DEFAULT_MIN_BUFFER_BYTES);
        Self {
            synthesizer: PulseSynthesizer::new(min_buffer_bytes),
        }
    }

    #[wasm_bindgen]
    pub fn classify(&self, code: &str) -> String {
        classify(code).to_string()
    }

    #[wasm_bindgen]
    pub fn frequency(&self, code: &str) -> Result<u32, JsValue> {
        decode(classify(code), code)
            .map(|signal| signal.carrier_frequency_hz())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen]
    pub fn pattern(&self, code: &str) -> Result<Vec<u32>, JsValue> {
        decode(classify(code), code)
            .map(|signal| signal.pulse_pattern_us().to_vec())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Error code for the input, 0 when it is valid.
    #[wasm_bindgen]
    pub fn validation_code(&self, code: &str, for_save: bool) -> u16 {
        let purpose = if for_save { Purpose::Save } else { Purpose::Transmit };
        match prepare(code, purpose) {
            Ok(_) => 0,
            Err(e) => IrError::from(e).report().code,
        }
    }

    /// Interleaved stereo i16 samples at [`IrPulseWasm::sample_rate`].
    #[wasm_bindgen]
    pub fn synthesize(&self, code: &str) -> Result<Vec<i16>, JsValue> {
        let signal = match prepare(code, Purpose::Transmit) {
            Ok(Some(signal)) => signal,
            Ok(None) => return Err(JsValue::from_str("nothing to synthesize")),
            Err(e) => return Err(JsValue::from_str(&IrError::from(e).report().to_string())),
        };

        self.synthesizer
            .synthesize(signal.carrier_frequency_hz(), signal.pulse_pattern_us())
            .map(|pcm| pcm.samples().to_vec())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen]
    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn init() {
    console_error_panic_hook::set_once();
}
