// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::MemoryWriteHook;
use std::any::Any;
use std::ops::RangeInclusive;

pub const P1IN: u16 = 0x0020;
pub const P1OUT: u16 = 0x0021;
pub const P1DIR: u16 = 0x0022;

/// Observes writes to the Port 1 registers.
///
/// The register contents themselves stay in plain memory; the monitor only
/// tracks how firmware drives the port so tests and the CLI can inspect it.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Port1Monitor {
    out: u8,
    dir: u8,
    /// Every P1OUT value written, in order.
    history: Vec<u8>,
}

impl Port1Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address range the monitor must be attached to.
    pub fn range() -> RangeInclusive<u16> {
        P1IN..=P1DIR
    }

    pub fn output(&self) -> u8 {
        self.out
    }

    pub fn direction(&self) -> u8 {
        self.dir
    }

    pub fn history(&self) -> &[u8] {
        &self.history
    }

    /// Output level of `pin` as seen from outside: only pins configured as
    /// outputs are driven.
    pub fn pin_driven_high(&self, pin: u8) -> bool {
        let mask = 1u8 << (pin & 7);
        self.dir & mask != 0 && self.out & mask != 0
    }
}

impl MemoryWriteHook for Port1Monitor {
    fn on_write(&mut self, addr: u16, value: u8) {
        match addr {
            P1OUT => {
                if value != self.out {
                    tracing::info!("P1OUT {:#04x} -> {:#04x}", self.out, value);
                }
                self.out = value;
                self.history.push(value);
            }
            P1DIR => {
                tracing::debug!("P1DIR = {:#04x}", value);
                self.dir = value;
            }
            _ => {}
        }
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}
