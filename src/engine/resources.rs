//! Resource manager
//!
//! Owns the loaded model families. The handle set is built once during
//! startup and never mutated afterwards; each family is either fully loaded
//! or reported disabled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use serde::Serialize;

use super::capability::{
    ChatTurn, Codec, Conversational, Family, Latent, SynthesisInput, Synthesizer, Transcriber,
    Transcript,
};
use crate::audio::AudioBuffer;
use crate::config::{DeviceConfig, GatewayConfig, GenerationConfig, OperatingMode, Precision};
use crate::error::{GatewayError, Result};

/// Whether a family must, may, or must not be loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Load failure aborts startup
    Required,
    /// Load failure disables the family only
    Optional,
    /// Not loaded in this configuration
    Off,
}

impl Requirement {
    /// Requirement of a family under the given configuration
    pub fn for_family(config: &GatewayConfig, family: Family) -> Self {
        match family {
            Family::Codec | Family::Synthesizer => Requirement::Required,
            Family::Conversational => match config.mode() {
                OperatingMode::Agent => Requirement::Required,
                OperatingMode::Tts => Requirement::Off,
            },
            Family::Transcriber => {
                if config.inference.load_asr_model {
                    Requirement::Optional
                } else {
                    Requirement::Off
                }
            }
        }
    }
}

/// Everything a backend needs to load one family
#[derive(Debug, Clone)]
pub struct LoadSpec {
    pub family: Family,
    pub device: DeviceConfig,
    pub precision: Precision,
    pub compile: bool,
    pub checkpoint: PathBuf,
    /// Architecture name (codec only)
    pub config_name: Option<String>,
    /// Token table (language-model families only)
    pub tokenizer: Option<PathBuf>,
}

impl LoadSpec {
    fn for_family(config: &GatewayConfig, family: Family) -> std::result::Result<Self, anyhow::Error> {
        let checkpoints = &config.checkpoints;
        let (checkpoint, config_name, tokenizer) = match family {
            Family::Codec => (
                checkpoints.decoder_checkpoint_path.clone(),
                Some(checkpoints.decoder_config_name.clone()),
                None,
            ),
            Family::Synthesizer | Family::Conversational => (
                checkpoints.llama_checkpoint_path.clone(),
                None,
                Some(checkpoints.tokenizer()),
            ),
            Family::Transcriber => (
                checkpoints
                    .asr_checkpoint_path
                    .clone()
                    .ok_or_else(|| anyhow!("no asr_checkpoint_path configured"))?,
                None,
                None,
            ),
        };

        Ok(Self {
            family,
            device: config.inference.device.clone(),
            precision: config.inference.precision,
            compile: config.inference.compile,
            checkpoint,
            config_name,
            tokenizer,
        })
    }
}

/// Backend that turns checkpoints into capabilities
///
/// Loading is blocking and may take a long time; it runs on the blocking pool.
pub trait ModelLoader: Send + Sync {
    /// Device the loaded models actually run on
    fn device(&self, requested: &DeviceConfig) -> DeviceConfig {
        requested.clone()
    }

    fn load_codec(&self, spec: &LoadSpec) -> anyhow::Result<Arc<dyn Codec>>;
    fn load_transcriber(&self, spec: &LoadSpec) -> anyhow::Result<Arc<dyn Transcriber>>;
    fn load_synthesizer(&self, spec: &LoadSpec) -> anyhow::Result<Arc<dyn Synthesizer>>;
    fn load_conversational(&self, spec: &LoadSpec) -> anyhow::Result<Arc<dyn Conversational>>;
}

/// Metadata for one model family
#[derive(Debug, Clone, Serialize)]
pub struct ResourceHandle {
    pub family: Family,
    pub device: String,
    pub precision: Precision,
    pub compiled: bool,
    pub enabled: bool,
    /// Why the family is disabled, if it is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
}

/// The loaded handle set
pub struct ResourceManager {
    codec: Option<Arc<dyn Codec>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    conversational: Option<Arc<dyn Conversational>>,
    handles: Vec<ResourceHandle>,
}

/// A loaded capability of any family
enum Loaded {
    Codec(Arc<dyn Codec>),
    Transcriber(Arc<dyn Transcriber>),
    Synthesizer(Arc<dyn Synthesizer>),
    Conversational(Arc<dyn Conversational>),
}

fn load_family(loader: &dyn ModelLoader, spec: &LoadSpec) -> anyhow::Result<Loaded> {
    Ok(match spec.family {
        Family::Codec => Loaded::Codec(loader.load_codec(spec)?),
        Family::Transcriber => Loaded::Transcriber(loader.load_transcriber(spec)?),
        Family::Synthesizer => Loaded::Synthesizer(loader.load_synthesizer(spec)?),
        Family::Conversational => Loaded::Conversational(loader.load_conversational(spec)?),
    })
}

impl ResourceManager {
    /// Load every family the configuration asks for
    ///
    /// Families load independently. A failing optional family is disabled;
    /// a failing required family aborts with `Initialization`.
    pub fn initialize(config: &GatewayConfig, loader: &dyn ModelLoader) -> Result<Self> {
        let mut manager = Self {
            codec: None,
            transcriber: None,
            synthesizer: None,
            conversational: None,
            handles: Vec::with_capacity(Family::ALL.len()),
        };

        let device = loader.device(&config.inference.device).to_string();
        for family in Family::ALL {
            let requirement = Requirement::for_family(config, family);
            let handle = |enabled: bool, reason: Option<String>| ResourceHandle {
                family,
                device: device.clone(),
                precision: config.inference.precision,
                compiled: config.inference.compile,
                enabled,
                disabled_reason: reason,
            };

            if requirement == Requirement::Off {
                tracing::debug!("Skipping {} (not enabled in {} mode)", family, config.mode());
                manager
                    .handles
                    .push(handle(false, Some("not enabled in this deployment".into())));
                continue;
            }

            let start = Instant::now();
            let loaded =
                LoadSpec::for_family(config, family).and_then(|spec| {
                    tracing::info!(
                        "Loading {} from {} (device={}, precision={}, compile={})",
                        family,
                        spec.checkpoint.display(),
                        spec.device,
                        spec.precision,
                        spec.compile
                    );
                    load_family(loader, &spec)
                });

            match loaded {
                Ok(model) => {
                    tracing::info!("Loaded {} in {:?}", family, start.elapsed());
                    manager.install(model);
                    manager.handles.push(handle(true, None));
                }
                Err(source) if requirement == Requirement::Required => {
                    tracing::error!("Failed to load required family {}: {:#}", family, source);
                    return Err(GatewayError::Initialization { family, source });
                }
                Err(source) => {
                    tracing::warn!("Disabling optional family {}: {:#}", family, source);
                    manager
                        .handles
                        .push(handle(false, Some("failed to load".into())));
                }
            }
        }

        Ok(manager)
    }

    /// Unload a family and report it disabled
    ///
    /// For deployments that serve a subset of what their mode loads. Only
    /// usable before the manager is handed to the lifecycle.
    pub fn disable(mut self, family: Family, reason: impl Into<String>) -> Self {
        match family {
            Family::Codec => self.codec = None,
            Family::Transcriber => self.transcriber = None,
            Family::Synthesizer => self.synthesizer = None,
            Family::Conversational => self.conversational = None,
        }
        if let Some(handle) = self.handles.iter_mut().find(|h| h.family == family) {
            handle.enabled = false;
            handle.disabled_reason = Some(reason.into());
        }
        self
    }

    fn install(&mut self, model: Loaded) {
        match model {
            Loaded::Codec(m) => self.codec = Some(m),
            Loaded::Transcriber(m) => self.transcriber = Some(m),
            Loaded::Synthesizer(m) => self.synthesizer = Some(m),
            Loaded::Conversational(m) => self.conversational = Some(m),
        }
    }

    /// Handles for every family, enabled or not
    pub fn handles(&self) -> &[ResourceHandle] {
        &self.handles
    }

    /// Families that can serve requests
    pub fn enabled(&self) -> Vec<Family> {
        self.handles
            .iter()
            .filter(|h| h.enabled)
            .map(|h| h.family)
            .collect()
    }

    pub fn is_enabled(&self, family: Family) -> bool {
        match family {
            Family::Codec => self.codec.is_some(),
            Family::Transcriber => self.transcriber.is_some(),
            Family::Synthesizer => self.synthesizer.is_some(),
            Family::Conversational => self.conversational.is_some(),
        }
    }

    /// Fail with `ResourceUnavailable` unless the family is loaded
    pub fn require(&self, family: Family) -> Result<()> {
        if self.is_enabled(family) {
            Ok(())
        } else {
            Err(GatewayError::ResourceUnavailable(family))
        }
    }

    fn codec(&self) -> Result<&Arc<dyn Codec>> {
        self.codec
            .as_ref()
            .ok_or(GatewayError::ResourceUnavailable(Family::Codec))
    }

    fn transcriber(&self) -> Result<&Arc<dyn Transcriber>> {
        self.transcriber
            .as_ref()
            .ok_or(GatewayError::ResourceUnavailable(Family::Transcriber))
    }

    fn synthesizer(&self) -> Result<&Arc<dyn Synthesizer>> {
        self.synthesizer
            .as_ref()
            .ok_or(GatewayError::ResourceUnavailable(Family::Synthesizer))
    }

    fn conversational(&self) -> Result<&Arc<dyn Conversational>> {
        self.conversational
            .as_ref()
            .ok_or(GatewayError::ResourceUnavailable(Family::Conversational))
    }

    pub fn encode(&self, audio: &AudioBuffer) -> Result<Latent> {
        self.codec()?.encode(audio).map_err(GatewayError::Inference)
    }

    pub fn decode(&self, latent: &Latent) -> Result<AudioBuffer> {
        self.codec()?.decode(latent).map_err(GatewayError::Inference)
    }

    pub fn transcribe(&self, audio: &AudioBuffer, language: &str) -> Result<Transcript> {
        self.transcriber()?
            .transcribe(audio, language)
            .map_err(GatewayError::Inference)
    }

    pub fn synthesize(&self, input: &SynthesisInput) -> Result<AudioBuffer> {
        self.synthesizer()?
            .synthesize(input)
            .map_err(GatewayError::Inference)
    }

    pub fn converse(&self, history: &[ChatTurn], options: &GenerationConfig) -> Result<String> {
        self.conversational()?
            .converse(history, options)
            .map_err(GatewayError::Inference)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory backends for engine and server tests

    use std::collections::HashSet;

    use super::*;

    pub struct StubModel;

    impl Codec for StubModel {
        fn encode(&self, audio: &AudioBuffer) -> anyhow::Result<Latent> {
            Ok(Latent {
                codes: vec![vec![0; audio.samples.len().max(1)]],
            })
        }

        fn decode(&self, latent: &Latent) -> anyhow::Result<AudioBuffer> {
            Ok(AudioBuffer::new(16_000, vec![0.0; latent.frames()]))
        }
    }

    impl Transcriber for StubModel {
        fn transcribe(&self, audio: &AudioBuffer, language: &str) -> anyhow::Result<Transcript> {
            Ok(Transcript {
                text: "stub".into(),
                duration_secs: audio.duration_secs(),
                language: language.into(),
            })
        }
    }

    impl Synthesizer for StubModel {
        fn synthesize(&self, input: &SynthesisInput) -> anyhow::Result<AudioBuffer> {
            Ok(AudioBuffer::new(16_000, vec![0.1; input.text.len()]))
        }
    }

    impl Conversational for StubModel {
        fn converse(&self, history: &[ChatTurn], _: &GenerationConfig) -> anyhow::Result<String> {
            Ok(history.last().map(|t| t.content.clone()).unwrap_or_default())
        }
    }

    /// Loads `StubModel` for every family except the listed failures
    #[derive(Default)]
    pub struct StubLoader {
        pub failing: HashSet<Family>,
    }

    impl StubLoader {
        pub fn failing(families: &[Family]) -> Self {
            Self {
                failing: families.iter().copied().collect(),
            }
        }

        fn check(&self, spec: &LoadSpec) -> anyhow::Result<()> {
            if self.failing.contains(&spec.family) {
                Err(anyhow!("checkpoint for {} is corrupt", spec.family))
            } else {
                Ok(())
            }
        }
    }

    impl ModelLoader for StubLoader {
        fn load_codec(&self, spec: &LoadSpec) -> anyhow::Result<Arc<dyn Codec>> {
            self.check(spec)?;
            Ok(Arc::new(StubModel))
        }

        fn load_transcriber(&self, spec: &LoadSpec) -> anyhow::Result<Arc<dyn Transcriber>> {
            self.check(spec)?;
            Ok(Arc::new(StubModel))
        }

        fn load_synthesizer(&self, spec: &LoadSpec) -> anyhow::Result<Arc<dyn Synthesizer>> {
            self.check(spec)?;
            Ok(Arc::new(StubModel))
        }

        fn load_conversational(
            &self,
            spec: &LoadSpec,
        ) -> anyhow::Result<Arc<dyn Conversational>> {
            self.check(spec)?;
            Ok(Arc::new(StubModel))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubLoader;
    use super::*;

    fn config(mode: OperatingMode, asr: bool) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.inference.mode = mode;
        config.inference.load_asr_model = asr;
        config.checkpoints.asr_checkpoint_path = Some(PathBuf::from("asr"));
        config
    }

    #[test]
    fn test_requirements_by_mode() {
        let tts = config(OperatingMode::Tts, false);
        assert_eq!(Requirement::for_family(&tts, Family::Codec), Requirement::Required);
        assert_eq!(
            Requirement::for_family(&tts, Family::Conversational),
            Requirement::Off
        );
        assert_eq!(
            Requirement::for_family(&tts, Family::Transcriber),
            Requirement::Off
        );

        let agent = config(OperatingMode::Agent, true);
        assert_eq!(
            Requirement::for_family(&agent, Family::Conversational),
            Requirement::Required
        );
        assert_eq!(
            Requirement::for_family(&agent, Family::Transcriber),
            Requirement::Optional
        );
    }

    #[test]
    fn test_tts_mode_enables_codec_and_synthesizer() {
        let manager =
            ResourceManager::initialize(&config(OperatingMode::Tts, false), &StubLoader::default())
                .unwrap();
        assert_eq!(manager.enabled(), vec![Family::Codec, Family::Synthesizer]);
        assert_eq!(manager.handles().len(), 4);
        assert!(matches!(
            manager.require(Family::Conversational),
            Err(GatewayError::ResourceUnavailable(Family::Conversational))
        ));
    }

    #[test]
    fn test_optional_failure_disables_only_that_family() {
        let manager = ResourceManager::initialize(
            &config(OperatingMode::Agent, true),
            &StubLoader::failing(&[Family::Transcriber]),
        )
        .unwrap();
        assert!(!manager.is_enabled(Family::Transcriber));
        assert!(manager.is_enabled(Family::Conversational));
        let handle = manager
            .handles()
            .iter()
            .find(|h| h.family == Family::Transcriber)
            .unwrap();
        // The cause is logged, not published
        assert_eq!(handle.disabled_reason.as_deref(), Some("failed to load"));

        let audio = AudioBuffer::new(16_000, vec![0.0; 10]);
        assert!(matches!(
            manager.transcribe(&audio, "auto"),
            Err(GatewayError::ResourceUnavailable(Family::Transcriber))
        ));
    }

    #[test]
    fn test_missing_asr_checkpoint_disables_transcriber() {
        let mut cfg = config(OperatingMode::Tts, true);
        cfg.checkpoints.asr_checkpoint_path = None;
        let manager = ResourceManager::initialize(&cfg, &StubLoader::default()).unwrap();
        assert!(!manager.is_enabled(Family::Transcriber));
    }

    #[test]
    fn test_required_failure_aborts() {
        let result = ResourceManager::initialize(
            &config(OperatingMode::Agent, false),
            &StubLoader::failing(&[Family::Conversational]),
        );
        match result {
            Err(GatewayError::Initialization { family, .. }) => {
                assert_eq!(family, Family::Conversational)
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected initialization failure"),
        }
    }

    #[test]
    fn test_disable_after_load() {
        let manager =
            ResourceManager::initialize(&config(OperatingMode::Tts, false), &StubLoader::default())
                .unwrap()
                .disable(Family::Synthesizer, "maintenance");
        assert_eq!(manager.enabled(), vec![Family::Codec]);
        let input = SynthesisInput {
            text: "hi".into(),
            references: Vec::new(),
            options: GenerationConfig::default(),
        };
        assert!(matches!(
            manager.synthesize(&input),
            Err(GatewayError::ResourceUnavailable(Family::Synthesizer))
        ));
    }

    #[test]
    fn test_handles_carry_load_settings() {
        let mut cfg = config(OperatingMode::Tts, false);
        cfg.inference.compile = true;
        cfg.inference.precision = Precision::Float16;
        let manager = ResourceManager::initialize(&cfg, &StubLoader::default()).unwrap();
        let codec = &manager.handles()[0];
        assert_eq!(codec.family, Family::Codec);
        assert!(codec.compiled);
        assert_eq!(codec.precision, Precision::Float16);
        assert_eq!(codec.device, "cuda:0");
    }
}
