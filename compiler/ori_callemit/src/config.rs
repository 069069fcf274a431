//! Target ABI configuration.
//!
//! Whether an aggregate argument is split into scalars or spilled and
//! passed by address, and whether a result comes back in registers or
//! through a hidden pointer, depends on the target and on the calling
//! convention. These thresholds live here instead of being hard-coded in
//! the lowering.
//!
//! # Usage
//!
//! ```ignore
//! let config = AbiConfig::for_target("x86_64-pc-windows-msvc")?;
//! assert_eq!(config.rules(CallConv::C).indirect_arg_threshold, Some(8));
//! ```

use std::fmt;

use crate::CallConv;

/// Environment variable naming the target triple for [`AbiConfig::from_env`].
pub const TARGET_ENV_VAR: &str = "ORI_TARGET";

/// Targets with a known ABI preset.
pub const SUPPORTED_TARGETS: &[&str] = &[
    // Linux
    "x86_64-unknown-linux-gnu",
    "x86_64-unknown-linux-musl",
    "aarch64-unknown-linux-gnu",
    "aarch64-unknown-linux-musl",
    // macOS
    "x86_64-apple-darwin",
    "aarch64-apple-darwin",
    // Windows
    "x86_64-pc-windows-msvc",
    "x86_64-pc-windows-gnu",
    // WebAssembly
    "wasm32-unknown-unknown",
    "wasm32-wasi",
];

/// Error type for ABI configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiConfigError {
    #[error("unsupported target `{triple}` (supported: {})", supported.join(", "))]
    UnsupportedTarget {
        triple: String,
        supported: Vec<&'static str>,
    },
}

/// Passing rules for one calling convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvRules {
    /// Aggregate arguments larger than this many bytes are spilled and passed
    /// by address. `None` means never spill.
    pub indirect_arg_threshold: Option<u64>,
    /// Aggregate results larger than this many bytes are returned through a
    /// hidden pointer in the first argument slot.
    pub indirect_return_threshold: u64,
}

impl ConvRules {
    /// Should an aggregate argument of `size` bytes be passed by address?
    #[inline]
    pub fn spills_arg(&self, size: u64) -> bool {
        self.indirect_arg_threshold.is_some_and(|limit| size > limit)
    }

    /// Should an aggregate result of `size` bytes be returned indirectly?
    #[inline]
    pub fn returns_indirectly(&self, size: u64) -> bool {
        size > self.indirect_return_threshold
    }
}

/// Internal (`Fast`) convention: arguments are always split, results up to
/// four words come back directly.
const FAST_RULES: ConvRules = ConvRules {
    indirect_arg_threshold: None,
    indirect_return_threshold: 32,
};

/// System V x86-64 and AAPCS64: two eightbytes.
const SYSV_RULES: ConvRules = ConvRules {
    indirect_arg_threshold: Some(16),
    indirect_return_threshold: 16,
};

/// Win64: anything wider than a register goes by reference.
const WIN64_RULES: ConvRules = ConvRules {
    indirect_arg_threshold: Some(8),
    indirect_return_threshold: 8,
};

/// wasm32 C ABI: every aggregate goes through memory.
const WASM32_RULES: ConvRules = ConvRules {
    indirect_arg_threshold: Some(0),
    indirect_return_threshold: 0,
};

/// ABI rules for both calling conventions.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AbiConfig {
    /// Target triple the rules were derived from.
    pub triple: String,
    pub c: ConvRules,
    pub fast: ConvRules,
}

impl AbiConfig {
    /// Preset for a target triple.
    ///
    /// # Errors
    ///
    /// Returns [`AbiConfigError::UnsupportedTarget`] if the triple is not in
    /// [`SUPPORTED_TARGETS`].
    pub fn for_target(triple: &str) -> Result<Self, AbiConfigError> {
        if !SUPPORTED_TARGETS.contains(&triple) {
            return Err(AbiConfigError::UnsupportedTarget {
                triple: triple.to_string(),
                supported: SUPPORTED_TARGETS.to_vec(),
            });
        }
        let c = if triple.starts_with("wasm32") {
            WASM32_RULES
        } else if triple.contains("windows") {
            WIN64_RULES
        } else {
            SYSV_RULES
        };
        Ok(Self {
            triple: triple.to_string(),
            c,
            fast: FAST_RULES,
        })
    }

    /// Preset for the host.
    pub fn native() -> Self {
        let (triple, c) = if cfg!(target_arch = "wasm32") {
            ("wasm32-unknown-unknown", WASM32_RULES)
        } else if cfg!(windows) {
            ("x86_64-pc-windows-msvc", WIN64_RULES)
        } else if cfg!(all(target_arch = "aarch64", target_os = "macos")) {
            ("aarch64-apple-darwin", SYSV_RULES)
        } else if cfg!(target_arch = "aarch64") {
            ("aarch64-unknown-linux-gnu", SYSV_RULES)
        } else if cfg!(target_os = "macos") {
            ("x86_64-apple-darwin", SYSV_RULES)
        } else {
            ("x86_64-unknown-linux-gnu", SYSV_RULES)
        };
        Self {
            triple: triple.to_string(),
            c,
            fast: FAST_RULES,
        }
    }

    /// Preset for the triple in `ORI_TARGET`, or the host if unset.
    ///
    /// # Errors
    ///
    /// Returns an error if `ORI_TARGET` names an unsupported target.
    pub fn from_env() -> Result<Self, AbiConfigError> {
        match std::env::var(TARGET_ENV_VAR) {
            Ok(triple) if !triple.trim().is_empty() => Self::for_target(triple.trim()),
            _ => Ok(Self::native()),
        }
    }

    /// Rules for a calling convention.
    #[inline]
    pub fn rules(&self, conv: CallConv) -> ConvRules {
        match conv {
            CallConv::C => self.c,
            CallConv::Fast => self.fast,
        }
    }
}

impl Default for AbiConfig {
    fn default() -> Self {
        Self {
            triple: "x86_64-unknown-linux-gnu".to_string(),
            c: SYSV_RULES,
            fast: FAST_RULES,
        }
    }
}

impl fmt::Display for AbiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.triple)?;
        match self.c.indirect_arg_threshold {
            Some(limit) => write!(f, " (C args > {limit}B by address")?,
            None => write!(f, " (C args always split")?,
        }
        write!(
            f,
            ", C results > {}B indirect)",
            self.c.indirect_return_threshold
        )
    }
}
