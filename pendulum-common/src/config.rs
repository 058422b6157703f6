use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::{SimParams, GRAVITY_RANGE, LENGTH_MULTIPLIER_RANGE, SPEED_MULTIPLIER_RANGE};
use crate::snapshot::Viewport;
use std::path::Path;

// Initial size of the drawing surface
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ViewportConfig {
    pub width: f64,
    pub height: f64,
}

// Tunable physical parameters; each falls back to its slider default
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ParametersConfig {
    #[serde(default = "default_gravity")]
    pub gravity: f64,
    #[serde(default = "default_length_multiplier")]
    pub length_multiplier: f64,
    #[serde(default = "default_speed_multiplier")]
    pub speed_multiplier: f64,
}

impl Default for ParametersConfig {
    fn default() -> Self {
        ParametersConfig {
            gravity: default_gravity(),
            length_multiplier: default_length_multiplier(),
            speed_multiplier: default_speed_multiplier(),
        }
    }
}

// Configuration for the host frame loop
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub total_frames: u64,
    #[serde(default = "default_record_interval")]
    pub record_interval_frames: u64,
    /// Frames per second of the host scheduler. 0 runs headless without pacing.
    #[serde(default)]
    pub frame_rate_hz: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct InitialConditions {
    /// Seed for the initialization RNG. Absent means OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default = "default_true")]
    pub save_snapshots: bool,
    #[serde(default)]
    pub save_final_poses: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Bincode,
    MessagePack,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Bincode => "bin",
            OutputFormat::MessagePack => "msgpack",
        }
    }

    /// Guesses the format of a snapshot file from its extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "bin" | "bincode" => Some(OutputFormat::Bincode),
            "msgpack" | "messagepack" => Some(OutputFormat::MessagePack),
            _ => None,
        }
    }
}

impl OutputConfig {
    /// Resolves the configured format name. Unknown names fall back to JSON.
    pub fn output_format(&self) -> OutputFormat {
        match self.format.as_deref().unwrap_or("json") {
            "json" => OutputFormat::Json,
            "bincode" => OutputFormat::Bincode,
            "messagepack" => OutputFormat::MessagePack,
            other => {
                log::error!("Unknown output format: {}. Using JSON instead.", other);
                OutputFormat::Json
            }
        }
    }
}

/// A host event (window resize or slider move) applied before frame `at_frame` is drawn.
/// Every event triggers a full re-initialization of the population.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ChangeEvent {
    pub at_frame: u64,
    #[serde(default)]
    pub viewport_width: Option<f64>,
    #[serde(default)]
    pub viewport_height: Option<f64>,
    #[serde(default)]
    pub gravity: Option<f64>,
    #[serde(default)]
    pub length_multiplier: Option<f64>,
    #[serde(default)]
    pub speed_multiplier: Option<f64>,
}

impl ChangeEvent {
    /// Overlays the fields present in this event onto the current host inputs.
    pub fn apply(&self, viewport: Viewport, params: SimParams) -> (Viewport, SimParams) {
        let viewport = Viewport {
            width: self.viewport_width.unwrap_or(viewport.width),
            height: self.viewport_height.unwrap_or(viewport.height),
        };
        let params = SimParams {
            gravity: self.gravity.unwrap_or(params.gravity),
            length_multiplier: self.length_multiplier.unwrap_or(params.length_multiplier),
            speed_multiplier: self.speed_multiplier.unwrap_or(params.speed_multiplier),
        };
        (viewport, params)
    }

    fn values(&self) -> impl Iterator<Item = f64> + '_ {
        [
            self.viewport_width,
            self.viewport_height,
            self.gravity,
            self.length_multiplier,
            self.speed_multiplier,
        ]
        .into_iter()
        .flatten()
    }

    fn snap_parameters(&mut self) {
        if let Some(g) = self.gravity.as_mut() {
            *g = GRAVITY_RANGE.snap(*g);
        }
        if let Some(l) = self.length_multiplier.as_mut() {
            *l = LENGTH_MULTIPLIER_RANGE.snap(*l);
        }
        if let Some(s) = self.speed_multiplier.as_mut() {
            *s = SPEED_MULTIPLIER_RANGE.snap(*s);
        }
    }
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub parameters: ParametersConfig,
    pub timing: TimingConfig,
    #[serde(default)]
    pub initial_conditions: InitialConditions,
    pub output: OutputConfig,
    #[serde(default)]
    pub changes: Vec<ChangeEvent>,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let mut config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        let vp = &self.viewport;
        if !vp.width.is_finite() || !vp.height.is_finite() {
            anyhow::bail!("viewport dimensions must be finite.");
        }
        if vp.width < 0.0 || vp.height < 0.0 {
            anyhow::bail!("viewport dimensions must not be negative.");
        }
        if self.timing.total_frames == 0 {
            anyhow::bail!("total_frames must be greater than 0.");
        }
        if !self.timing.frame_rate_hz.is_finite() || self.timing.frame_rate_hz < 0.0 {
            anyhow::bail!("frame_rate_hz must be a finite, non-negative number.");
        }
        if self.timing.record_interval_frames == 0 {
            log::warn!("record_interval_frames is 0. Recording every frame.");
            self.timing.record_interval_frames = 1;
        }

        // Slider collaborator duty: the core only ever sees in-range, on-step values.
        let requested = SimParams::new(
            self.parameters.gravity,
            self.parameters.length_multiplier,
            self.parameters.speed_multiplier,
        );
        if !requested.is_finite() {
            anyhow::bail!("parameters must be finite numbers.");
        }
        let (snapped, adjusted) = requested.snapped();
        for name in adjusted {
            log::warn!("Parameter '{}' outside its slider range or step; adjusted.", name);
        }
        self.parameters.gravity = snapped.gravity;
        self.parameters.length_multiplier = snapped.length_multiplier;
        self.parameters.speed_multiplier = snapped.speed_multiplier;

        for change in &mut self.changes {
            if change.values().any(|v| !v.is_finite()) {
                anyhow::bail!("change at frame {} contains a non-finite value.", change.at_frame);
            }
            if change.viewport_width.is_some_and(|w| w < 0.0) || change.viewport_height.is_some_and(|h| h < 0.0) {
                anyhow::bail!("change at frame {} has a negative viewport dimension.", change.at_frame);
            }
            change.snap_parameters();
        }
        self.changes.sort_by_key(|c| c.at_frame);

        Ok(())
    }

    /// Converts the configured parameters into the runtime parameter set.
    pub fn get_sim_params(&self) -> SimParams {
        SimParams {
            gravity: self.parameters.gravity,
            length_multiplier: self.parameters.length_multiplier,
            speed_multiplier: self.parameters.speed_multiplier,
        }
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.viewport.width, self.viewport.height)
    }
}

fn default_gravity() -> f64 {
    GRAVITY_RANGE.default
}

fn default_length_multiplier() -> f64 {
    LENGTH_MULTIPLIER_RANGE.default
}

fn default_speed_multiplier() -> f64 {
    SPEED_MULTIPLIER_RANGE.default
}

fn default_record_interval() -> u64 {
    1
}

fn default_true() -> bool {
    true
}
