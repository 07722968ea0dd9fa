// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use serde::Deserialize;

/// A YAML representation of the MIDI configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Midi {
    /// The MIDI input port. Matched as a substring of the port name.
    device: Option<String>,
}

impl Midi {
    pub fn new(device: &str) -> Midi {
        Midi {
            device: Some(device.to_string()),
        }
    }

    /// Returns the device from the configuration, if any.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn set_device(&mut self, device: &str) {
        self.device = Some(device.to_string());
    }
}
