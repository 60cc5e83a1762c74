// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Serialisation of a verified [`Design`].

use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tilegen_track::entity::Entity;
use tilegen_track::{error, info};

use crate::design::Design;
use crate::types::{GenError, GenResult};
use crate::verify::verify;

pub mod mlir;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Textual `aie`/`aiex` dialect.
    #[default]
    Mlir,

    /// The whole design as YAML.
    Yaml,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Mlir => write!(f, "mlir"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}

pub struct Emitter {
    entity: Rc<Entity>,
}

impl Emitter {
    #[must_use]
    pub fn new(parent: &Rc<Entity>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "emit")),
        }
    }

    /// Verify `design` and render it.
    pub fn render(&self, design: &Design, format: OutputFormat) -> GenResult<String> {
        if let Err(e) = verify(design) {
            error!(self.entity ; "{e}");
            return Err(e);
        }

        match format {
            OutputFormat::Mlir => mlir::render(design),
            OutputFormat::Yaml => serde_yaml::to_string(design)
                .map_err(|e| GenError::Io(std::io::Error::other(e.to_string()))),
        }
    }

    /// Verify `design` and write it to `path`.
    ///
    /// The file is left untouched if verification fails.
    pub fn write(&self, design: &Design, format: OutputFormat, path: &Path) -> GenResult<()> {
        let text = self.render(design, format)?;
        fs::write(path, text)?;
        info!(self.entity ; "wrote {format} description to {}", path.display());
        Ok(())
    }
}
