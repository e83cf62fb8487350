// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("address is empty")]
    Empty,
    #[error("'{0}' is not a hex (0x...) or decimal address")]
    Invalid(String),
    #[error("address '{0}' does not fit in 16 bits")]
    OutOfRange(String),
}

/// Parse `0x`-prefixed hex or plain decimal into a 16-bit address.
pub fn parse_address(s: &str) -> Result<u16, AddressParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AddressParseError::Empty);
    }

    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse::<u32>()
    }
    .map_err(|_| AddressParseError::Invalid(s.to_string()))?;

    u16::try_from(value).map_err(|_| AddressParseError::OutOfRange(s.to_string()))
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunInputs {
    pub firmware: String,
    /// Treat the firmware as a flat binary loaded at this address.
    #[serde(default)]
    pub raw_base: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunLimits {
    pub max_steps: u64,
    /// Stop once the PC has not changed for this many consecutive steps.
    #[serde(default)]
    pub no_progress_steps: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Runner failed before simulation started (e.g. script parse/validation error).
    ConfigError,
    MaxSteps,
    Breakpoint,
    NoProgress,
    UndefinedOpcode,
    UnimplementedOpcode,
    AlignmentFault,
    PeripheralFetchFault,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessWidth {
    Byte,
    #[default]
    Word,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StopReasonAssertion {
    pub expected_stop_reason: StopReason,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterValueDetails {
    pub register: u8,
    pub expected_value: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterValueAssertion {
    pub register_value: RegisterValueDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryValueDetails {
    pub address: u16,
    pub expected_value: u16,
    #[serde(default)]
    pub width: AccessWidth,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryValueAssertion {
    pub memory_value: MemoryValueDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum RunAssertion {
    ExpectedStopReason(StopReasonAssertion),
    RegisterValue(RegisterValueAssertion),
    MemoryValue(MemoryValueAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunScript {
    pub schema_version: String,
    pub inputs: RunInputs,
    pub limits: RunLimits,
    #[serde(default)]
    pub breakpoints: Vec<String>,
    #[serde(default)]
    pub assertions: Vec<RunAssertion>,
}

impl RunScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read run script at {:?}", path.as_ref()))?;
        let script = Self::from_yaml(&contents)?;
        tracing::debug!(
            "Loaded run script {:?}: {} breakpoints, {} assertions",
            path.as_ref(),
            script.breakpoints.len(),
            script.assertions.len()
        );
        Ok(script)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let script: Self =
            serde_yaml::from_str(contents).context("Failed to parse Run Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '{}'",
                self.schema_version,
                SCHEMA_VERSION
            );
        }

        if self.inputs.firmware.trim().is_empty() {
            anyhow::bail!("Input 'firmware' path cannot be empty");
        }

        if let Some(base) = &self.inputs.raw_base {
            parse_address(base).context("Invalid input 'raw_base'")?;
        }

        if self.limits.max_steps == 0 {
            anyhow::bail!("Limit 'max_steps' must be greater than zero");
        }

        if self.limits.no_progress_steps == Some(0) {
            anyhow::bail!("Limit 'no_progress_steps' must be greater than zero");
        }

        self.breakpoint_addresses()?;

        for assertion in &self.assertions {
            match assertion {
                RunAssertion::RegisterValue(a) if a.register_value.register > 15 => {
                    anyhow::bail!(
                        "register_value: register index {} is out of range (0-15)",
                        a.register_value.register
                    );
                }
                RunAssertion::MemoryValue(a) => {
                    let m = &a.memory_value;
                    if m.width == AccessWidth::Word && m.address & 1 != 0 {
                        anyhow::bail!(
                            "memory_value: word address {:#06x} is not aligned",
                            m.address
                        );
                    }
                    if m.width == AccessWidth::Byte && m.expected_value > 0xFF {
                        anyhow::bail!(
                            "memory_value: expected byte value {:#x} does not fit in 8 bits",
                            m.expected_value
                        );
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    pub fn breakpoint_addresses(&self) -> Result<Vec<u16>> {
        self.breakpoints
            .iter()
            .map(|bp| parse_address(bp).with_context(|| format!("Invalid breakpoint '{}'", bp)))
            .collect()
    }

    pub fn raw_base(&self) -> Result<Option<u16>> {
        self.inputs
            .raw_base
            .as_deref()
            .map(|base| parse_address(base).context("Invalid input 'raw_base'"))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn test_valid_script() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  firmware: "path/to/fw.elf"
limits:
  max_steps: 1000
  no_progress_steps: 10
breakpoints: ["0xf818", "63520"]
assertions:
  - expected_stop_reason: breakpoint
  - register_value:
      register: 4
      expected_value: 5
  - memory_value:
      address: 0x0021
      expected_value: 1
      width: byte
  - memory_value:
      address: 0x03fe
      expected_value: 0xf80e
"#;
        let script = RunScript::from_yaml(yaml).unwrap();
        assert_eq!(script.inputs.firmware, "path/to/fw.elf");
        assert_eq!(script.limits.max_steps, 1000);
        assert_eq!(script.limits.no_progress_steps, Some(10));
        assert_eq!(script.breakpoint_addresses().unwrap(), vec![0xF818, 0xF820]);
        assert_eq!(script.assertions.len(), 4);

        assert!(matches!(
            script.assertions[0],
            RunAssertion::ExpectedStopReason(StopReasonAssertion {
                expected_stop_reason: StopReason::Breakpoint
            })
        ));
        match &script.assertions[3] {
            RunAssertion::MemoryValue(a) => {
                assert_eq!(a.memory_value.width, AccessWidth::Word);
                assert_eq!(a.memory_value.expected_value, 0xF80E);
            }
            other => panic!("unexpected assertion {:?}", other),
        }
    }

    #[test]
    fn test_invalid_version() {
        let yaml = r#"
schema_version: "2.0"
inputs:
  firmware: "fw.elf"
limits:
  max_steps: 100
"#;
        let err = RunScript::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("Unsupported schema_version"));
    }

    #[test]
    fn test_invalid_max_steps() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  firmware: "fw.elf"
limits:
  max_steps: 0
"#;
        let err = RunScript::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("max_steps"));
    }

    #[test]
    fn test_empty_firmware() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  firmware: ""
limits:
  max_steps: 100
"#;
        let err = RunScript::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("firmware"));
    }

    #[test]
    fn test_register_index_out_of_range() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  firmware: "fw.elf"
limits:
  max_steps: 100
assertions:
  - register_value:
      register: 16
      expected_value: 0
"#;
        let err = RunScript::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_unaligned_word_assertion() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  firmware: "fw.elf"
limits:
  max_steps: 100
assertions:
  - memory_value:
      address: 0x0201
      expected_value: 0
"#;
        let err = RunScript::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("not aligned"));
    }

    #[test]
    fn test_bad_breakpoint() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  firmware: "fw.elf"
limits:
  max_steps: 100
breakpoints: ["main"]
"#;
        let err = RunScript::from_yaml(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid breakpoint 'main'"));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  firmware: "fw.elf"
limits:
  max_steps: 100
  max_cycles: 5
"#;
        assert!(RunScript::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_raw_base() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  firmware: "fw.bin"
  raw_base: "0xc000"
limits:
  max_steps: 100
"#;
        let script = RunScript::from_yaml(yaml).unwrap();
        assert_eq!(script.raw_base().unwrap(), Some(0xC000));
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0xF800"), Ok(0xF800));
        assert_eq!(parse_address(" 0x21 "), Ok(0x21));
        assert_eq!(parse_address("512"), Ok(0x200));
        assert_eq!(parse_address(""), Err(AddressParseError::Empty));
        assert_eq!(
            parse_address("0x10000"),
            Err(AddressParseError::OutOfRange("0x10000".to_string()))
        );
        assert_eq!(
            parse_address("zz"),
            Err(AddressParseError::Invalid("zz".to_string()))
        );
    }

    #[test]
    fn test_stop_reason_names() {
        let reasons: Vec<StopReason> = serde_yaml::from_str(
            "[max_steps, breakpoint, no_progress, undefined_opcode, unimplemented_opcode, \
             alignment_fault, peripheral_fetch_fault, config_error]",
        )
        .unwrap();
        assert_eq!(reasons.len(), 8);
        assert_eq!(reasons[6], StopReason::PeripheralFetchFault);
    }

    #[test]
    fn test_from_file() {
        let mut path = std::env::temp_dir();
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        path.push(format!("msp430sim-config-{}.yaml", nonce));
        std::fs::write(
            &path,
            "schema_version: \"1.0\"\ninputs:\n  firmware: fw.elf\nlimits:\n  max_steps: 5\n",
        )
        .unwrap();

        let script = RunScript::from_file(&path).unwrap();
        assert_eq!(script.limits.max_steps, 5);
        let _ = std::fs::remove_file(&path);

        assert!(RunScript::from_file(&path).is_err());
    }
}
