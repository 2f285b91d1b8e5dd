//! Device chains and drum-pad lookup

use serde::{Deserialize, Serialize};

/// Deepest rack nesting searched for drum pads
pub const MAX_RACK_DEPTH: usize = 8;

/// Parameters shown on the device page at once
pub const PARAMETERS_PER_BANK: usize = 8;

/// One page of device parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterBank {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

/// A device on a track. Racks carry nested chains; a drum rack additionally
/// carries its pad names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNode {
    pub name: String,
    #[serde(default)]
    pub drum_pads: Option<Vec<String>>,
    #[serde(default)]
    pub chains: Vec<Vec<DeviceNode>>,
    #[serde(default)]
    pub banks: Vec<ParameterBank>,
}

impl DeviceNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn drum_rack(name: impl Into<String>, pads: &[&str]) -> Self {
        Self {
            name: name.into(),
            drum_pads: Some(pads.iter().map(|p| p.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn rack(name: impl Into<String>, chains: Vec<Vec<DeviceNode>>) -> Self {
        Self {
            name: name.into(),
            chains,
            ..Default::default()
        }
    }

    pub fn with_bank(mut self, name: impl Into<String>, parameters: &[&str]) -> Self {
        self.banks.push(ParameterBank {
            name: name.into(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
        });
        self
    }

    /// Bank names joined for the bank list payload
    pub fn bank_names(&self) -> String {
        self.banks
            .iter()
            .map(|b| b.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Names on the page of `bank`; unmapped (empty) slots are skipped
    pub fn parameter_names(&self, bank: usize) -> String {
        self.banks
            .get(bank)
            .map(|b| {
                b.parameters
                    .iter()
                    .take(PARAMETERS_PER_BANK)
                    .filter(|p| !p.is_empty())
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default()
    }
}

/// Pad names of the first drum rack found, searching depth-first in device
/// order. Racks nested deeper than [`MAX_RACK_DEPTH`] are not visited.
pub fn find_drum_pads(devices: &[DeviceNode]) -> Option<&[String]> {
    let mut stack: Vec<(&DeviceNode, usize)> = devices.iter().rev().map(|d| (d, 0)).collect();

    while let Some((device, depth)) = stack.pop() {
        if let Some(pads) = &device.drum_pads {
            return Some(pads);
        }
        if depth + 1 >= MAX_RACK_DEPTH {
            continue;
        }
        for chain in device.chains.iter().rev() {
            for nested in chain.iter().rev() {
                stack.push((nested, depth + 1));
            }
        }
    }

    None
}

/// Top-level device names joined for the device list payload
pub fn device_names(devices: &[DeviceNode]) -> String {
    devices
        .iter()
        .map(|d| d.name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
