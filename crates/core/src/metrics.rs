// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::decoder::Opcode;
use crate::SimulationObserver;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug)]
pub struct PerformanceMetrics {
    instruction_count: AtomicU64,
    retired_count: AtomicU64,
    opcode_histogram: Mutex<BTreeMap<Opcode, u64>>,
    start_time: Mutex<Instant>,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            instruction_count: AtomicU64::new(0),
            retired_count: AtomicU64::new(0),
            opcode_histogram: Mutex::new(BTreeMap::new()),
            start_time: Mutex::new(Instant::now()),
        }
    }

    pub fn reset(&self) {
        self.instruction_count.store(0, Ordering::SeqCst);
        self.retired_count.store(0, Ordering::SeqCst);
        if let Ok(mut m) = self.opcode_histogram.lock() {
            m.clear();
        }
        if let Ok(mut t) = self.start_time.lock() {
            *t = Instant::now();
        }
    }

    /// Instructions fetched, including one that faulted.
    pub fn get_instructions(&self) -> u64 {
        self.instruction_count.load(Ordering::SeqCst)
    }

    /// Instructions that completed without a fault.
    pub fn get_retired(&self) -> u64 {
        self.retired_count.load(Ordering::SeqCst)
    }

    pub fn get_opcode_count(&self, opcode: Opcode) -> u64 {
        self.opcode_histogram
            .lock()
            .ok()
            .and_then(|m| m.get(&opcode).copied())
            .unwrap_or(0)
    }

    /// Retired instructions per mnemonic, ordered by opcode.
    pub fn opcode_histogram(&self) -> Vec<(Opcode, u64)> {
        self.opcode_histogram
            .lock()
            .map(|m| m.iter().map(|(op, n)| (*op, *n)).collect())
            .unwrap_or_default()
    }

    pub fn get_ips(&self) -> f64 {
        let elapsed = self
            .start_time
            .lock()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        if elapsed > 0.0 {
            self.get_instructions() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl SimulationObserver for PerformanceMetrics {
    fn on_simulation_start(&self) {
        self.reset();
    }

    fn on_step_start(&self, _pc: u16, _word: u16) {
        self.instruction_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_step_end(&self, _pc: u16, opcode: Opcode) {
        self.retired_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut m) = self.opcode_histogram.lock() {
            *m.entry(opcode).or_insert(0) += 1;
        }
    }
}
