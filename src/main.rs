use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use irpulse_core::{
    audio::{list_audio_devices, AudioSink, CpalAudioSink},
    classify,
    dispatch::Dispatcher,
    emitter::NoEmitter,
    run_request,
    validate::{decode, prepare, Purpose},
    Config, NoHaptics, RoutingStrategy, TransmissionMethod, TransmitRequest,
};
use std::fs::File;
use std::io::{self, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "irpulse")]
#[command(about = "Send infrared remote codes through an IR emitter or the audio jack", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    Native,
    Audio,
}

impl From<Method> for TransmissionMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Native => TransmissionMethod::DeviceEmitter,
            Method::Audio => TransmissionMethod::AudioPulse,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Routing {
    Auto,
    Device,
    Default,
}

impl From<Routing> for RoutingStrategy {
    fn from(routing: Routing) -> Self {
        match routing {
            Routing::Auto => RoutingStrategy::Auto,
            Routing::Device => RoutingStrategy::Device,
            Routing::Default => RoutingStrategy::Default,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the notation of a code (HEX, RAW, NEC, EMPTY_VARIABLE, UNKNOWN)
    Classify {
        /// IR code (if not provided, reads from stdin)
        code: Option<String>,
    },

    /// Decode a code into carrier frequency and pulse pattern
    Decode {
        code: Option<String>,
    },

    /// Validate a code for transmission, or for saving with --save
    Validate {
        /// Accept unresolved %variables
        #[arg(long)]
        save: bool,

        code: Option<String>,
    },

    /// Synthesize the audio waveform and write it as raw s16le stereo PCM
    Render {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Minimum device buffer in bytes
        #[arg(long, default_value = "3528")]
        min_buffer: usize,

        code: Option<String>,
    },

    /// Transmit a code
    Send {
        /// Play through the audio jack when no IR emitter exists
        #[arg(long, short)]
        audio_fallback: bool,

        /// Force a delivery method instead of inferring it
        #[arg(long, value_enum)]
        method: Option<Method>,

        /// How to pick the audio output
        #[arg(long, value_enum, default_value = "auto")]
        routing: Routing,

        /// Override the device minimum buffer size in bytes
        #[arg(long)]
        min_buffer: Option<usize>,

        /// Extra wait for playback to finish, in milliseconds
        #[arg(long, default_value = "500")]
        grace_ms: u64,

        /// Haptic confirmation (logged on hosts without a vibrator)
        #[arg(long)]
        vibrate: bool,

        code: Option<String>,
    },

    /// List available audio output devices
    Devices,
}

fn read_code(code: Option<String>) -> Result<String> {
    let code = match code {
        Some(c) => c,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer.trim().to_string()
        }
    };

    if code.is_empty() {
        bail!("No code given");
    }
    Ok(code)
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Classify { code } => {
            let code = read_code(code)?;
            println!("{}", classify(&code));
        }

        Commands::Decode { code } => {
            let code = read_code(code)?;
            let signal = decode(classify(&code), &code)?;
            println!("frequency: {} Hz", signal.carrier_frequency_hz());
            println!(
                "pattern: {}",
                signal
                    .pulse_pattern_us()
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            );
        }

        Commands::Validate { save, code } => {
            let code = read_code(code)?;
            let purpose = if save { Purpose::Save } else { Purpose::Transmit };
            match prepare(&code, purpose) {
                Ok(_) => println!("{}: valid", classify(&code)),
                Err(e) => {
                    let report = irpulse_core::IrError::from(e).report();
                    println!("{}", report);
                    std::process::exit(1);
                }
            }
        }

        Commands::Render {
            output,
            min_buffer,
            code,
        } => {
            let code = read_code(code)?;
            render(&code, &output, min_buffer)?;
        }

        Commands::Send {
            audio_fallback,
            method,
            routing,
            min_buffer,
            grace_ms,
            vibrate,
            code,
        } => {
            let config = Config {
                min_buffer_bytes: min_buffer,
                routing: routing.into(),
                playback_grace: Duration::from_millis(grace_ms),
                allow_audio_fallback: audio_fallback,
                ..Default::default()
            };
            let request = TransmitRequest {
                code: read_code(code)?,
                method: method.map(Into::into),
                allow_audio_fallback: config.allow_audio_fallback,
                vibrate,
            };

            let sink = CpalAudioSink::new(config.routing, config.min_buffer_bytes);
            eprintln!("Minimum buffer: {} bytes", sink.min_buffer_bytes());
            let dispatcher = Dispatcher::new(Arc::new(NoEmitter), Arc::new(sink), &config);

            if let Err(report) = run_request(&dispatcher, &NoHaptics, &request) {
                println!("{}", report);
                std::process::exit(1);
            }
            eprintln!("Transmission complete!");
        }

        Commands::Devices => {
            let devices = list_audio_devices();
            println!("Available audio devices:");
            for device in devices {
                println!("  {}", device);
            }
        }
    }

    Ok(())
}

fn render(code: &str, output: &Path, min_buffer: usize) -> Result<()> {
    let signal = match prepare(code, Purpose::Transmit) {
        Ok(Some(signal)) => signal,
        Ok(None) => bail!("Nothing to render for {}", code),
        Err(e) => bail!("{}", irpulse_core::IrError::from(e).report()),
    };

    let synthesizer = irpulse_core::PulseSynthesizer::new(min_buffer);
    let pcm = synthesizer.synthesize(signal.carrier_frequency_hz(), signal.pulse_pattern_us())?;

    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    pcm.write_le(&mut writer)?;

    eprintln!("Carrier: {} Hz", signal.carrier_frequency_hz());
    eprintln!("Samples: {} ({} bytes)", pcm.samples().len(), pcm.byte_len());
    eprintln!("Duration: {:.1} ms", pcm.duration().as_secs_f64() * 1000.0);
    eprintln!("Wrote {}", output.display());
    Ok(())
}
