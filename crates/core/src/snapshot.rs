// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MachineSnapshot {
    pub cpu: CpuSnapshot,
    pub steps: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CpuSnapshot {
    /// R0..R15 in index order.
    pub registers: Vec<u16>,
    pub pc: u16,
    pub sp: u16,
    pub sr: u16,
}
