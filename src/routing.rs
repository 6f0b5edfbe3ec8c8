//! Selection of the analog output that drives the IR LED adapter.
//!
//! Hosts that can enumerate their outputs get [`DeviceRouter`], which picks a
//! wired device by name. Everything else falls back to [`DefaultRouter`],
//! which drives whatever the host's default output is.

use crate::error::AudioError;
use crate::RoutingStrategy;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};
use parking_lot::Mutex;

const WIRED_MARKERS: [&str; 7] = [
    "headphone",
    "headset",
    "line out",
    "lineout",
    "analog",
    "aux",
    "3.5",
];

/// Whether a device name looks like a wired analog output.
pub fn is_wired_name(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    WIRED_MARKERS.iter().any(|marker| name.contains(marker))
}

pub trait AudioRouter: Send + Sync {
    fn name(&self) -> &'static str;

    /// The wired output this router would drive, if one is attached.
    fn wired_output(&self, host: &Host) -> Option<Device>;

    /// Routes playback to the wired output and remembers the choice.
    fn select(&self, host: &Host) -> Result<String, AudioError>;

    /// The device playback should open: the selected one, or the wired one.
    fn output(&self, host: &Host) -> Result<Device, AudioError>;

    /// Forgets the selection made by [`AudioRouter::select`].
    fn restore(&self);
}

pub fn router_for(strategy: RoutingStrategy, host: &Host) -> Box<dyn AudioRouter> {
    let router: Box<dyn AudioRouter> = match strategy {
        RoutingStrategy::Device => Box::new(DeviceRouter::default()),
        RoutingStrategy::Default => Box::new(DefaultRouter::new(true)),
        RoutingStrategy::Auto => {
            if host.output_devices().is_ok() {
                Box::new(DeviceRouter::default())
            } else {
                Box::new(DefaultRouter::new(false))
            }
        }
    };
    log::info!("router_for: {:?} -> {}", strategy, router.name());
    router
}

fn device_name(device: &Device) -> String {
    device.name().unwrap_or_else(|_| "Unknown".to_string())
}

#[derive(Default)]
pub struct DeviceRouter {
    selected: Mutex<Option<String>>,
}

impl DeviceRouter {
    fn find_by_name(host: &Host, name: &str) -> Option<Device> {
        host.output_devices()
            .ok()?
            .find(|device| device.name().map(|n| n == name).unwrap_or(false))
    }
}

impl AudioRouter for DeviceRouter {
    fn name(&self) -> &'static str {
        "device"
    }

    fn wired_output(&self, host: &Host) -> Option<Device> {
        let devices = host.output_devices().ok()?;
        for device in devices {
            let name = device_name(&device);
            log::debug!("wired_output: candidate {}", name);
            if is_wired_name(&name) {
                return Some(device);
            }
        }
        None
    }

    fn select(&self, host: &Host) -> Result<String, AudioError> {
        let device = self
            .wired_output(host)
            .ok_or_else(|| AudioError::Routing("no wired output device".into()))?;
        let name = device_name(&device);
        log::info!("select: routing to {}", name);
        *self.selected.lock() = Some(name.clone());
        Ok(name)
    }

    fn output(&self, host: &Host) -> Result<Device, AudioError> {
        let selected = self.selected.lock().clone();
        match selected {
            Some(name) => Self::find_by_name(host, &name)
                .ok_or_else(|| AudioError::Device(format!("{} disappeared", name))),
            None => self
                .wired_output(host)
                .ok_or_else(|| AudioError::Device("no wired output device".into())),
        }
    }

    fn restore(&self) {
        if let Some(name) = self.selected.lock().take() {
            log::info!("restore: released {}", name);
        }
    }
}

/// Drives the host default output. With `assume_wired` the default output is
/// trusted to be the adapter even when its name says nothing about it.
pub struct DefaultRouter {
    assume_wired: bool,
}

impl DefaultRouter {
    pub fn new(assume_wired: bool) -> Self {
        Self { assume_wired }
    }
}

impl AudioRouter for DefaultRouter {
    fn name(&self) -> &'static str {
        "default"
    }

    fn wired_output(&self, host: &Host) -> Option<Device> {
        let device = host.default_output_device()?;
        if self.assume_wired || is_wired_name(&device_name(&device)) {
            Some(device)
        } else {
            None
        }
    }

    fn select(&self, host: &Host) -> Result<String, AudioError> {
        self.wired_output(host)
            .map(|device| device_name(&device))
            .ok_or_else(|| AudioError::Routing("default output is not a wired device".into()))
    }

    fn output(&self, host: &Host) -> Result<Device, AudioError> {
        host.default_output_device()
            .ok_or_else(|| AudioError::Device("No output device found".into()))
    }

    fn restore(&self) {}
}
