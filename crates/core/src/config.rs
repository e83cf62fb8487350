// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Fault instruction fetches from the peripheral-mapped I/O region.
    pub peripheral_fetch_guard: bool,
    /// Emit a disassembled line for every executed instruction at debug level.
    pub trace_disassembly: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            peripheral_fetch_guard: true,
            trace_disassembly: false,
        }
    }
}
