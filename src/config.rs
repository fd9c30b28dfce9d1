//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/ccogrow/ccogrow.toml`
//! 3. Local config: the file passed with `--config`
//! 4. Environment variables: `CCOGROW_*` prefix

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::{
    ApplicationError, ApplicationResult, GeneratorData, ResourceBudget, StageSettings,
    TreeGenerator,
};
use crate::domain::space::DEFAULT_SAMPLING_BUDGET;
use crate::domain::{
    DistributionGenerator, DomainResult, HydraulicLaws, Point, Shape, SimpleDomain, Sphere, Stage,
    StagedDomain, TreeParameters,
};

/// Growth region and sampling rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DomainSettings {
    pub region: Shape,
    /// Regions removed from the growth region
    pub exclusions: Vec<Shape>,
    pub distribution: DistributionGenerator,
    /// Draws per sample before the domain reports exhaustion
    pub sampling_budget: usize,
    /// Degrees
    pub min_bifurcation_angle: f64,
    /// Degrees
    pub min_plane_angle: f64,
    /// Stages whose vessels may receive branches (all when unset)
    pub growing_stages: Option<Vec<i32>>,
}

impl Default for DomainSettings {
    fn default() -> Self {
        Self {
            region: Shape::Sphere(Sphere {
                center: Point::origin(),
                radius: 10.0,
            }),
            exclusions: Vec::new(),
            distribution: DistributionGenerator::Uniform,
            sampling_budget: DEFAULT_SAMPLING_BUDGET,
            min_bifurcation_angle: 0.0,
            min_plane_angle: 0.0,
            growing_stages: None,
        }
    }
}

fn validate_shape(shape: &Shape) -> DomainResult<()> {
    match shape {
        Shape::Sphere(s) => Sphere::new(s.center, s.radius).map(|_| ()),
        Shape::Cuboid(_) => Ok(()),
    }
}

impl DomainSettings {
    pub fn build(&self) -> ApplicationResult<SimpleDomain> {
        validate_shape(&self.region)?;
        let mut domain = SimpleDomain::new(Arc::new(self.region.clone()))
            .with_distribution(self.distribution.clone())?
            .with_sampling_budget(self.sampling_budget)
            .with_min_bifurcation_angle(self.min_bifurcation_angle.to_radians())?
            .with_min_plane_angle(self.min_plane_angle.to_radians())?;
        for exclusion in &self.exclusions {
            validate_shape(exclusion)?;
            domain = domain.with_exclusion(Arc::new(exclusion.clone()));
        }
        if let Some(stages) = &self.growing_stages {
            domain = domain.with_growing_stages(stages.clone());
        }
        Ok(domain)
    }
}

/// Run-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunSettings {
    /// Terminal target when no `stages` are configured
    pub terminals: usize,
    pub seed: u64,
    pub max_iterations: Option<usize>,
    pub max_seconds: Option<f64>,
    /// Snapshot destination
    pub output: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            terminals: 50,
            seed: 0,
            max_iterations: None,
            max_seconds: None,
            output: None,
        }
    }
}

impl RunSettings {
    pub fn budget(&self) -> ResourceBudget {
        let mut budget = ResourceBudget::unlimited();
        if let Some(n) = self.max_iterations {
            budget = budget.with_max_iterations(n);
        }
        if let Some(secs) = self.max_seconds.filter(|s| s.is_finite() && *s >= 0.0) {
            budget = budget.with_max_duration(Duration::from_secs_f64(secs));
        }
        budget
    }
}

/// One growth stage. Sections left out fall back to the top-level ones;
/// sections given replace them whole.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StageConfig {
    pub terminals: usize,
    pub domain: Option<DomainSettings>,
    pub generator: Option<GeneratorData>,
    pub laws: Option<HydraulicLaws>,
}

/// Unified configuration for ccogrow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub tree: TreeParameters,
    pub laws: HydraulicLaws,
    pub generator: GeneratorData,
    pub domain: DomainSettings,
    pub run: RunSettings,
    pub stages: Vec<StageConfig>,
}

/// Get the XDG config directory for ccogrow.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "ccogrow").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("ccogrow.toml"))
}

impl Settings {
    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `local` - Optional config file; must exist when given
    pub fn load(local: Option<&Path>) -> Result<Self, ApplicationError> {
        Self::load_from(global_config_path().as_deref(), local)
    }

    /// Layered load with an explicit global file location.
    pub fn load_from(global: Option<&Path>, local: Option<&Path>) -> Result<Self, ApplicationError> {
        let defaults = Config::try_from(&Settings::default()).map_err(config_err)?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(global_path) = global {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }
        if let Some(local_path) = local {
            builder = builder.add_source(File::from(local_path).required(true));
        }

        let config = builder.build().map_err(config_err)?;
        let settings: Self = config.try_deserialize().map_err(config_err)?;
        let settings = Self::apply_env_overrides(settings)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply CCOGROW_* environment variables as explicit overrides.
    ///
    /// Nested keys use `__`, e.g. `CCOGROW_RUN__SEED=7`.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("CCOGROW")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get::<usize>("run.terminals") {
            settings.run.terminals = val;
        }
        if let Ok(val) = config.get::<u64>("run.seed") {
            settings.run.seed = val;
        }
        if let Ok(val) = config.get::<usize>("run.max_iterations") {
            settings.run.max_iterations = Some(val);
        }
        if let Ok(val) = config.get::<f64>("run.max_seconds") {
            settings.run.max_seconds = Some(val);
        }
        if let Ok(val) = config.get_string("run.output") {
            settings.run.output = Some(PathBuf::from(val));
        }
        if let Ok(val) = config.get::<f64>("tree.root_radius") {
            settings.tree.root_radius = val;
        }
        if let Ok(val) = config.get::<f64>("tree.inflow") {
            settings.tree.inflow = val;
        }
        if let Ok(val) = config.get::<f64>("tree.reference_pressure") {
            settings.tree.reference_pressure = val;
        }
        if let Ok(val) = config.get::<usize>("generator.n_terminal_trial") {
            settings.generator.n_terminal_trial = val;
        }
        if let Ok(val) = config.get::<usize>("generator.candidate_count") {
            settings.generator.candidate_count = val;
        }
        if let Ok(val) = config.get::<usize>("generator.n_bifurcation_test") {
            settings.generator.n_bifurcation_test = val;
        }
        if let Ok(val) = config.get::<f64>("generator.min_terminal_distance") {
            settings.generator.min_terminal_distance = val;
        }
        if let Ok(val) = config.get::<f64>("generator.failure_rate_threshold") {
            settings.generator.failure_rate_threshold = val;
        }
        if let Ok(val) = config.get::<usize>("domain.sampling_budget") {
            settings.domain.sampling_budget = val;
        }
        if let Ok(val) = config.get::<f64>("domain.min_bifurcation_angle") {
            settings.domain.min_bifurcation_angle = val;
        }
        if let Ok(val) = config.get::<f64>("domain.min_plane_angle") {
            settings.domain.min_plane_angle = val;
        }

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ApplicationError> {
        self.generator.validate()?;
        for (i, stage) in self.stages.iter().enumerate() {
            if let Some(generator) = &stage.generator {
                generator
                    .validate()
                    .map_err(|e| ApplicationError::config(format!("stage {i}: {e}")))?;
            }
        }
        Ok(())
    }

    /// Total terminals the configured run adds.
    pub fn total_terminals(&self) -> usize {
        if self.stages.is_empty() {
            self.run.terminals
        } else {
            self.stages.iter().map(|s| s.terminals).sum()
        }
    }

    pub fn staged_domain(&self) -> ApplicationResult<StagedDomain> {
        if self.stages.is_empty() {
            let domain = self.domain.build()?;
            return Ok(StagedDomain::single(Arc::new(domain), self.run.terminals));
        }
        let stages = self
            .stages
            .iter()
            .map(|stage| {
                let domain = stage.domain.as_ref().unwrap_or(&self.domain).build()?;
                Ok(Stage::new(Arc::new(domain), stage.terminals))
            })
            .collect::<ApplicationResult<Vec<_>>>()?;
        Ok(StagedDomain::new(stages)?)
    }

    pub fn stage_settings(&self) -> Vec<StageSettings> {
        if self.stages.is_empty() {
            return vec![StageSettings::new(self.generator.clone(), self.laws.clone())];
        }
        self.stages
            .iter()
            .map(|stage| {
                StageSettings::new(
                    stage.generator.clone().unwrap_or_else(|| self.generator.clone()),
                    stage.laws.clone().unwrap_or_else(|| self.laws.clone()),
                )
            })
            .collect()
    }

    /// Generator for a fresh tree as configured.
    pub fn generator(&self) -> ApplicationResult<TreeGenerator> {
        let generator = TreeGenerator::new(
            self.tree.clone(),
            self.staged_domain()?,
            self.stage_settings(),
            self.run.seed,
        )?;
        Ok(generator.with_budget(self.run.budget()))
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# ccogrow configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/ccogrow/ccogrow.toml
#   Local:  file passed with --config
#   Env:    CCOGROW_* environment variables, nested keys joined by "__"
#           (e.g. CCOGROW_RUN__SEED=7, CCOGROW_GENERATOR__CANDIDATE_COUNT=10)

[run]
# terminals = 50
# seed = 0
# max_iterations = 100000
# max_seconds = 600.0
# output = "tree.toml"

[tree]
# perfusion_point = { x = 0.0, y = 0.0, z = 0.0 }
# root_radius = 0.5
# inflow = 1.0
# reference_pressure = 0.0

[laws]
# murray_exponent = { kind = "constant", value = 3.0 }
# symmetry_limit = { kind = "constant", value = 0.0 }
# viscosity = { kind = "by_level", function = { kind = "constant", value = 3.6 } }

[generator]
# n_terminal_trial = 500
# d_lim_reduction_factor = 0.9
# perfusion_area_factor = 0.5
# close_neighborhood_factor = 4.0
# n_bifurcation_test = 7
# candidate_count = 20
# branching_mode = "deformable_parent"
# min_terminal_distance = 0.0
# failure_rate_threshold = 0.9
# cost_estimator = { kind = "volumetric" }
# cost_estimator = { kind = "linear_combination", terms = [{ alpha = 1.0, length_exponent = 1.0, radius_exponent = 2.0 }] }
# strategy = { kind = "nearest_segments" }
# strategy = { kind = "fixed_perfusion_radius", radius = 1.0 }

[domain]
# region = { shape = "sphere", center = { x = 0.0, y = 0.0, z = 0.0 }, radius = 10.0 }
# region = { shape = "cuboid", min = { x = 0.0, y = 0.0, z = 0.0 }, max = { x = 1.0, y = 1.0, z = 1.0 } }
# distribution = { kind = "uniform" }
# sampling_budget = 10000
# min_bifurcation_angle = 0.0  # degrees
# min_plane_angle = 0.0  # degrees

# Stages replace run.terminals; a stage section replaces the top-level one.
# [[stages]]
# terminals = 10
#
# [[stages]]
# terminals = 20
# [stages.generator]
# resets_d_lim = true
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
