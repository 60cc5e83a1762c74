// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Generator configuration.
//!
//! Values are merged from, in increasing priority:
//!  - the built-in defaults;
//!  - a TOML file (`--config`, or `tilegen.toml` if present);
//!  - `TILEGEN_` prefixed environment variables;
//!  - the command line.
//!
//! Every field is optional so that a source only overrides what it sets.

use std::path::{Path, PathBuf};

use byte_unit::Byte;
use clap::Args;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize, de};
use serde_yaml::Value;

use crate::binder::{KernelCatalog, KernelSignature};
use crate::design::DesignParams;
use crate::device::DeviceVariant;
use crate::gen_error;
use crate::plan::{GridShape, KindRule, builtin_kinds};
use crate::schedule::AwaitPolicy;
use crate::topology::RegionAssignmentPolicy;
use crate::types::{GenError, GenResult};

/// Configuration file read when `--config` is not given.
pub const DEFAULT_CONF_FILE: &str = "tilegen.toml";

/// Prefix of environment variables overriding the configuration.
pub const ENV_PREFIX: &str = "TILEGEN_";

fn byte_str_to_u64(s: &str) -> Result<u64, String> {
    if let Ok(number) = s.parse::<u64>() {
        return Ok(number);
    }

    // Convert to lowercase in order to standardise any 0x prefix
    let lowercase = s.to_lowercase();

    if lowercase.starts_with("0x") {
        let without_underscore = lowercase.replace('_', "");
        let without_0x = without_underscore.trim_start_matches("0x");
        u64::from_str_radix(without_0x, 16)
            .map_err(|e| format!("Unable to parse {s} as hex string: {e}"))
    } else {
        let ignore_case = false;
        let num_bytes = Byte::parse_str(s, ignore_case)
            .map_err(|e| format!("Unable to parse {s} as Byte string: {e}"))?;
        Ok(num_bytes.as_u64())
    }
}

/// Parse a byte size given on the command line.
pub fn parse_byte_arg(s: &str) -> Result<u64, String> {
    byte_str_to_u64(s)
}

/// Deserialize a byte size given as an integer, a hex string or a byte-unit
/// string such as `1KiB`.
pub fn parse_optional_byte_str<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: de::Deserializer<'de>,
{
    // We need to first deserialize to a generic `Value` so that we can
    // support the case where it is already a u64.
    let value: Value = Deserialize::deserialize(deserializer)?;

    if value.is_null() {
        return Ok(None);
    }
    if let Some(number) = value.as_u64() {
        return Ok(Some(number));
    }

    match value.as_str() {
        Some(s) => byte_str_to_u64(s).map(Some).map_err(de::Error::custom),
        None => Err(de::Error::custom(format!(
            "'{value:?}': Unsupported type for Deserialize (should be u64 or String)"
        ))),
    }
}

#[derive(Args, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Compiled kernel object linked into every compute tile.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_object: Option<String>,

    /// Bytes in one processing block.
    #[arg(long, value_parser = parse_byte_arg)]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "parse_optional_byte_str"
    )]
    pub block_size: Option<u64>,

    /// Blocks in one chunk.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks_per_chunk: Option<u64>,

    /// Bytes in one chunk, overriding `blocks_per_chunk`.
    #[arg(long, value_parser = parse_byte_arg)]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "parse_optional_byte_str"
    )]
    pub chunk_size: Option<u64>,

    /// Columns of compute tiles. Defaults to 4, or fewer if the device has
    /// fewer columns.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_cols: Option<usize>,

    /// Rows of compute tiles in each column.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_rows: Option<usize>,

    /// Target device.
    #[arg(long, value_enum)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_variant: Option<DeviceVariant>,

    /// Kernel for each region, in region order (repeat for two regions).
    #[arg(long = "kernel")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<Vec<String>>,

    /// How compute tiles are divided between kernels. Defaults to `single`
    /// for one kernel and `column-halves` otherwise.
    #[arg(long, value_enum)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_policy: Option<RegionAssignmentPolicy>,

    /// Which host transfers are awaited.
    #[arg(long, value_enum)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub await_policy: Option<AwaitPolicy>,

    /// Extra kernel declarations (configuration file only).
    #[arg(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernels: Option<Vec<KernelSignature>>,

    /// Extra data kind declarations (configuration file only).
    #[arg(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<KindRule>>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let params = DesignParams::default();
        Self {
            kernel_object: None,
            block_size: Some(params.block_size),
            blocks_per_chunk: Some(params.chunk_size / params.block_size),
            chunk_size: None,
            num_cols: None,
            num_rows: Some(params.grid.rows),
            device_variant: Some(params.device),
            kernel: Some(params.kernels),
            region_policy: None,
            await_policy: Some(params.await_policy),
            kernels: None,
            kinds: None,
        }
    }
}

impl GeneratorConfig {
    /// A configuration with nothing set, as produced by an empty command
    /// line.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            kernel_object: None,
            block_size: None,
            blocks_per_chunk: None,
            chunk_size: None,
            num_cols: None,
            num_rows: None,
            device_variant: None,
            kernel: None,
            region_policy: None,
            await_policy: None,
            kernels: None,
            kinds: None,
        }
    }

    fn figment_with_defaults() -> Figment {
        Figment::new().merge(Serialized::defaults(GeneratorConfig::default()))
    }

    fn figment_conf_file_merge(config: Figment, conf_file: &Path) -> Figment {
        config.merge(Toml::file(conf_file))
    }

    fn figment_env_var_merge(config: Figment) -> Figment {
        config.merge(Env::prefixed(ENV_PREFIX))
    }

    fn figment_extract(config: &Figment) -> GenResult<GeneratorConfig> {
        config
            .extract()
            .map_err(|e| GenError::Config(e.to_string()))
    }

    fn clap_merge(mut self, cli: GeneratorConfig) -> Self {
        if cli.kernel_object.is_some() {
            self.kernel_object = cli.kernel_object;
        }
        if cli.block_size.is_some() {
            self.block_size = cli.block_size;
        }
        if cli.blocks_per_chunk.is_some() {
            self.blocks_per_chunk = cli.blocks_per_chunk;
        }
        if cli.chunk_size.is_some() {
            self.chunk_size = cli.chunk_size;
        }
        if cli.num_cols.is_some() {
            self.num_cols = cli.num_cols;
        }
        if cli.num_rows.is_some() {
            self.num_rows = cli.num_rows;
        }
        if cli.device_variant.is_some() {
            self.device_variant = cli.device_variant;
        }
        if cli.kernel.is_some() {
            self.kernel = cli.kernel;
        }
        if cli.region_policy.is_some() {
            self.region_policy = cli.region_policy;
        }
        if cli.await_policy.is_some() {
            self.await_policy = cli.await_policy;
        }
        if cli.kernels.is_some() {
            self.kernels = cli.kernels;
        }
        if cli.kinds.is_some() {
            self.kinds = cli.kinds;
        }

        self
    }

    /// Merge every source, with `cli` taking priority.
    ///
    /// An explicitly named `conf_file` must exist. Without one,
    /// [`DEFAULT_CONF_FILE`] is used if it exists.
    pub fn load(conf_file: Option<&Path>, cli: GeneratorConfig) -> GenResult<Self> {
        let mut figment = Self::figment_with_defaults();
        match conf_file {
            Some(path) => {
                check_conf_file(path)?;
                figment = Self::figment_conf_file_merge(figment, path);
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONF_FILE);
                if default_path.is_file() {
                    figment = Self::figment_conf_file_merge(figment, &default_path);
                }
            }
        }
        figment = Self::figment_env_var_merge(figment);

        let config = Self::figment_extract(&figment)?;
        Ok(config.clap_merge(cli))
    }

    /// The kernel catalog including kernels declared in the configuration.
    #[must_use]
    pub fn catalog(&self) -> KernelCatalog {
        match &self.kernels {
            Some(kernels) => KernelCatalog::builtin().with_kernels(kernels),
            None => KernelCatalog::builtin(),
        }
    }

    /// Resolve into concrete design parameters.
    pub fn design_params(&self) -> GenResult<DesignParams> {
        let defaults = DesignParams::default();
        let block_size = self.block_size.unwrap_or(defaults.block_size);
        let chunk_size = match (self.chunk_size, self.blocks_per_chunk) {
            (Some(chunk_size), _) => chunk_size,
            (None, Some(blocks)) => blocks.checked_mul(block_size).ok_or_else(|| {
                GenError::Config(format!("{blocks} blocks of {block_size} bytes overflows"))
            })?,
            (None, None) => defaults.chunk_size,
        };

        let mut kinds = builtin_kinds();
        if let Some(custom) = &self.kinds {
            for kind in custom {
                kinds.retain(|k| k.name != kind.name);
                kinds.push(kind.clone());
            }
        }

        let kernels = self.kernel.clone().unwrap_or(defaults.kernels);
        if kernels.is_empty() {
            return gen_error!(Config, "No kernel selected");
        }

        let device = self.device_variant.unwrap_or(defaults.device);
        let num_cols = self
            .num_cols
            .unwrap_or_else(|| defaults.grid.cols.min(device.num_cols()));
        let policy = self.region_policy.unwrap_or(match kernels.len() {
            1 => RegionAssignmentPolicy::Single,
            _ => RegionAssignmentPolicy::ColumnHalves,
        });

        Ok(DesignParams {
            kernel_object: self.kernel_object.clone(),
            device,
            grid: GridShape::new(num_cols, self.num_rows.unwrap_or(defaults.grid.rows)),
            block_size,
            chunk_size,
            kernels,
            policy,
            await_policy: self.await_policy.unwrap_or(defaults.await_policy),
            kinds,
        })
    }
}

fn check_conf_file(conf_file: &Path) -> GenResult<()> {
    if conf_file.is_dir() {
        return Err(GenError::Io(std::io::Error::new(
            std::io::ErrorKind::IsADirectory,
            format!("{} is not a file path", conf_file.display()),
        )));
    }
    if !conf_file.exists() {
        return Err(GenError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", conf_file.display()),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_strings() {
        assert_eq!(byte_str_to_u64("1024"), Ok(1024));
        assert_eq!(byte_str_to_u64("0x4_00"), Ok(1024));
        assert_eq!(byte_str_to_u64("1KiB"), Ok(1024));
        assert_eq!(byte_str_to_u64("4 MB"), Ok(4_000_000));
        assert!(byte_str_to_u64("lots").is_err());
    }

    #[test]
    fn defaults_resolve() {
        let params = GeneratorConfig::default().design_params().unwrap();
        assert_eq!(params, DesignParams::default());
        assert_eq!(params.chunk_size, 4_096_000);
    }

    #[test]
    fn chunk_size_overrides_blocks() {
        let config = GeneratorConfig {
            chunk_size: Some(8192),
            ..GeneratorConfig::default()
        };
        assert_eq!(config.design_params().unwrap().chunk_size, 8192);
    }

    #[test]
    fn cli_wins() {
        let cli = GeneratorConfig {
            num_cols: Some(2),
            ..GeneratorConfig::empty()
        };
        let merged = GeneratorConfig::default().clap_merge(cli);
        assert_eq!(merged.num_cols, Some(2));
        assert_eq!(merged.num_rows, Some(4));
    }

    #[test]
    fn one_kernel_uses_single_region() {
        let config = GeneratorConfig {
            kernel: Some(vec!["vector_scalar_add".to_string()]),
            ..GeneratorConfig::default()
        };
        let params = config.design_params().unwrap();
        assert_eq!(params.policy, RegionAssignmentPolicy::Single);

        let config = GeneratorConfig {
            region_policy: Some(RegionAssignmentPolicy::RowHalves),
            ..config
        };
        assert_eq!(
            config.design_params().unwrap().policy,
            RegionAssignmentPolicy::RowHalves
        );
    }

    #[test]
    fn columns_follow_device() {
        let small = GeneratorConfig {
            device_variant: Some(DeviceVariant::Npu1Col2),
            ..GeneratorConfig::default()
        };
        assert_eq!(small.design_params().unwrap().grid, GridShape::new(2, 4));

        let large = GeneratorConfig {
            device_variant: Some(DeviceVariant::Npu2),
            ..GeneratorConfig::default()
        };
        assert_eq!(large.design_params().unwrap().grid, GridShape::new(4, 4));

        let explicit = GeneratorConfig {
            num_cols: Some(3),
            ..small
        };
        assert_eq!(explicit.design_params().unwrap().grid.cols, 3);
    }
}
