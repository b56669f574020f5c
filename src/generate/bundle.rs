// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bundle synthesis: inputs in, three serialized documents out.

use std::fmt;

use tracing::{debug, info};

use crate::config::GenerationDefaults;
use crate::error::{Result, SerializationErrorKind, TalosError};
use crate::generate::engine::{ConfigGenerator, GeneratedConfigs, V1Alpha1Generator};
use crate::generate::inputs::GenerationInputs;
use crate::generate::options::OptionCompiler;
use crate::runtime::{LoggingConfig, StageLogger};

/// Control-plane, worker and client configs of one synthesis.
///
/// Either all three documents exist or the synthesis failed.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigBundle {
    /// Random opaque identifier, 32 hex characters.
    pub id: String,
    pub control_plane: String,
    pub worker: String,
    pub talosconfig: String,
}

impl fmt::Debug for ConfigBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigBundle")
            .field("id", &self.id)
            .field("control_plane_len", &self.control_plane.len())
            .field("worker_len", &self.worker.len())
            .field("talosconfig_len", &self.talosconfig.len())
            .finish()
    }
}

/// Runs option compilation, generation and serialization.
///
/// # Example
///
/// ```no_run
/// use talos_bootstrap::generate::{BundleSynthesizer, GenerationInputs};
///
/// let inputs = GenerationInputs::builder("demo", "https://10.0.0.1:6443")
///     .build()
///     .unwrap();
/// let bundle = BundleSynthesizer::new().synthesize(&inputs).unwrap();
/// println!("{}", bundle.talosconfig);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BundleSynthesizer<G = V1Alpha1Generator> {
    generator: G,
    compiler: OptionCompiler,
    logging: LoggingConfig,
}

impl BundleSynthesizer<V1Alpha1Generator> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in engine with non-default generation defaults.
    #[must_use]
    pub fn with_defaults(defaults: GenerationDefaults) -> Self {
        Self::with_generator(V1Alpha1Generator::new(), OptionCompiler::new(defaults))
    }
}

impl<G: ConfigGenerator> BundleSynthesizer<G> {
    #[must_use]
    pub fn with_generator(generator: G, compiler: OptionCompiler) -> Self {
        Self {
            generator,
            compiler,
            logging: LoggingConfig::default(),
        }
    }

    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    #[must_use]
    pub fn compiler(&self) -> &OptionCompiler {
        &self.compiler
    }

    /// Synthesize a bundle from `inputs`.
    ///
    /// # Errors
    ///
    /// `Validation` for bad inputs, `VersionSelector` for an unparseable
    /// contract, `Generation` when the engine rejects the directives or a
    /// patch, `Serialization` when a document cannot be rendered.
    #[allow(clippy::result_large_err)]
    pub fn synthesize(&self, inputs: &GenerationInputs) -> Result<ConfigBundle> {
        let mut logger = StageLogger::new("synthesize", self.logging.clone());
        let result = self.run(inputs, &mut logger);
        logger.complete();
        result
    }

    #[allow(clippy::result_large_err)]
    fn run(&self, inputs: &GenerationInputs, logger: &mut StageLogger) -> Result<ConfigBundle> {
        let options = logger.stage_sync("compile", || {
            inputs.validate()?;
            self.compiler.compile(inputs)
        })?;
        debug!(
            cluster = %options.cluster_name,
            directives = options.directives.len(),
            "Compiled generation directives"
        );

        let GeneratedConfigs {
            control_plane,
            worker,
            talosconfig,
        } = logger.stage_sync("generate", || self.generator.generate(&options))?;

        let (control_plane, worker, talosconfig) = logger.stage_sync("serialize", || {
            let control_plane = serde_yaml::to_string(&control_plane).map_err(|e| {
                TalosError::serialization(SerializationErrorKind::ControlPlane, e.to_string())
            })?;
            let worker = serde_yaml::to_string(&worker)
                .map_err(|e| TalosError::serialization(SerializationErrorKind::Worker, e.to_string()))?;
            let talosconfig = talosconfig.to_yaml().map_err(|e| {
                TalosError::serialization(SerializationErrorKind::ClientConfig, e.to_string())
            })?;
            Ok((control_plane, worker, talosconfig))
        })?;

        let bundle = ConfigBundle {
            id: hex::encode(rand::random::<[u8; 16]>()),
            control_plane,
            worker,
            talosconfig,
        };
        info!(
            cluster = %options.cluster_name,
            bundle = %bundle.id,
            bytes = bundle.control_plane.len() + bundle.worker.len() + bundle.talosconfig.len(),
            "Synthesized config bundle"
        );
        Ok(bundle)
    }
}
