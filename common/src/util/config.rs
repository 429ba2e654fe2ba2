use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("grid pitch must be positive, got {0}")]
    NonPositivePitch(f64),
    #[error("track width must be positive, got {0}")]
    NonPositiveTrackWidth(f64),
    #[error("via drill {drill} must be positive and not exceed diameter {diameter}")]
    BadViaGeometry { diameter: f64, drill: f64 },
    #[error("heuristic weight {0} outside [0, 4]")]
    HeuristicWeightOutOfRange(f64),
    #[error("iteration budget must be nonzero")]
    ZeroIterationBudget,
    #[error("escape clearance {escape} exceeds standard clearance {standard}")]
    EscapeClearanceTooLarge { escape: f64, standard: f64 },
    #[error("max jump length must be at least 1")]
    ZeroMaxJump,
    #[error("coarse grid multiplier must be at least 2, got {0}")]
    BadCoarseMultiplier(u32),
    #[error("differential pair spacing must be positive, got {0}")]
    NonPositivePairSpacing(f64),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ordering: OrderingConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Fail-fast validation, run once at load time so nonsense parameters
    /// never reach the search loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.pitch <= 0.0 {
            return Err(ConfigError::NonPositivePitch(self.grid.pitch));
        }
        if self.rules.track_width <= 0.0 {
            return Err(ConfigError::NonPositiveTrackWidth(self.rules.track_width));
        }
        if self.rules.via_drill <= 0.0 || self.rules.via_drill > self.rules.via_diameter {
            return Err(ConfigError::BadViaGeometry {
                diameter: self.rules.via_diameter,
                drill: self.rules.via_drill,
            });
        }
        if !(0.0..=4.0).contains(&self.search.heuristic_weight) {
            return Err(ConfigError::HeuristicWeightOutOfRange(
                self.search.heuristic_weight,
            ));
        }
        if self.search.max_iterations == 0 {
            return Err(ConfigError::ZeroIterationBudget);
        }
        if self.rules.escape_clearance > self.rules.clearance {
            return Err(ConfigError::EscapeClearanceTooLarge {
                escape: self.rules.escape_clearance,
                standard: self.rules.clearance,
            });
        }
        if self.search.max_jump == 0 {
            return Err(ConfigError::ZeroMaxJump);
        }
        if self.search.coarse_first && self.grid.coarse_multiplier < 2 {
            return Err(ConfigError::BadCoarseMultiplier(self.grid.coarse_multiplier));
        }
        if self.rules.pair_spacing <= 0.0 {
            return Err(ConfigError::NonPositivePairSpacing(self.rules.pair_spacing));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    /// Physical spacing of one grid unit, in mm.
    #[serde(default = "default_pitch")]
    pub pitch: f64,
    /// Coarse-pass pitch = pitch * multiplier.
    #[serde(default = "default_coarse_multiplier")]
    pub coarse_multiplier: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            pitch: default_pitch(),
            coarse_multiplier: default_coarse_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    #[serde(default = "default_track_width")]
    pub track_width: f64,
    #[serde(default = "default_clearance")]
    pub clearance: f64,
    #[serde(default = "default_via_diameter")]
    pub via_diameter: f64,
    #[serde(default = "default_via_drill")]
    pub via_drill: f64,
    #[serde(default = "default_via_clearance")]
    pub via_clearance: f64,
    /// Radius around route endpoints where the escape clearance applies, mm.
    #[serde(default = "default_escape_radius")]
    pub escape_radius: f64,
    /// Reduced track-to-track clearance inside escape zones. Never applied
    /// to via placement.
    #[serde(default = "default_escape_clearance")]
    pub escape_clearance: f64,
    /// Differential pair half-spacing: centerline to each lane, mm.
    #[serde(default = "default_pair_spacing")]
    pub pair_spacing: f64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            track_width: default_track_width(),
            clearance: default_clearance(),
            via_diameter: default_via_diameter(),
            via_drill: default_via_drill(),
            via_clearance: default_via_clearance(),
            escape_radius: default_escape_radius(),
            escape_clearance: default_escape_clearance(),
            pair_spacing: default_pair_spacing(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Cost of one layer change, in milli-grid-units (one orthogonal step = 1000).
    #[serde(default = "default_via_cost")]
    pub via_cost: i64,
    #[serde(default = "default_heuristic_weight")]
    pub heuristic_weight: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_jps")]
    pub jps: bool,
    /// Longest single JPS jump, in cells.
    #[serde(default = "default_max_jump")]
    pub max_jump: u32,
    #[serde(default = "default_coarse_first")]
    pub coarse_first: bool,
    /// Added to expansions landing outside the coarse corridor.
    #[serde(default = "default_corridor_penalty")]
    pub corridor_penalty: i64,
    /// Stub repulsion: peak cost at the hotspot center, milli-grid-units.
    #[serde(default = "default_proximity_cost")]
    pub proximity_cost: i64,
    /// Stub repulsion radius, mm.
    #[serde(default = "default_proximity_radius")]
    pub proximity_radius: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            via_cost: default_via_cost(),
            heuristic_weight: default_heuristic_weight(),
            max_iterations: default_max_iterations(),
            jps: default_jps(),
            max_jump: default_max_jump(),
            coarse_first: default_coarse_first(),
            corridor_penalty: default_corridor_penalty(),
            proximity_cost: default_proximity_cost(),
            proximity_radius: default_proximity_radius(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderingConfig {
    /// Route in planar-subset order instead of board order.
    #[serde(default = "default_ordering_enabled")]
    pub enabled: bool,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            enabled: default_ordering_enabled(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_board_file")]
    pub board_file: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            board_file: default_board_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_board_out")]
    pub board_out: String,
    #[serde(default = "default_image_out")]
    pub image_out: String,
    #[serde(default = "default_render")]
    pub render: bool,
    #[serde(default = "default_image_size")]
    pub image_width: u32,
    #[serde(default = "default_image_size")]
    pub image_height: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            board_out: default_board_out(),
            image_out: default_image_out(),
            render: default_render(),
            image_width: default_image_size(),
            image_height: default_image_size(),
        }
    }
}

fn default_pitch() -> f64 {
    0.1
}

fn default_coarse_multiplier() -> u32 {
    4
}

fn default_track_width() -> f64 {
    0.25
}

fn default_clearance() -> f64 {
    0.2
}

fn default_via_diameter() -> f64 {
    0.6
}

fn default_via_drill() -> f64 {
    0.3
}

fn default_via_clearance() -> f64 {
    0.25
}

fn default_escape_radius() -> f64 {
    1.5
}

fn default_escape_clearance() -> f64 {
    0.1
}

fn default_pair_spacing() -> f64 {
    0.3
}

fn default_via_cost() -> i64 {
    10_000
}

fn default_heuristic_weight() -> f64 {
    1.0
}

fn default_max_iterations() -> u32 {
    200_000
}

fn default_jps() -> bool {
    true
}

fn default_max_jump() -> u32 {
    32
}

fn default_coarse_first() -> bool {
    false
}

fn default_corridor_penalty() -> i64 {
    2_000
}

fn default_proximity_cost() -> i64 {
    3_000
}

fn default_proximity_radius() -> f64 {
    2.0
}

fn default_ordering_enabled() -> bool {
    true
}

fn default_board_file() -> String {
    "inputs/board.json".to_string()
}

fn default_board_out() -> String {
    "output/routed.json".to_string()
}

fn default_image_out() -> String {
    "output/routed.png".to_string()
}

fn default_render() -> bool {
    true
}

fn default_image_size() -> u32 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn bad_pitch_rejected() {
        let mut cfg = Config::default();
        cfg.grid.pitch = 0.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonPositivePitch(_))
        ));
    }

    #[test]
    fn input_output_tables_parse() {
        let cfg: Config = toml::from_str(
            r#"
            [input]
            board_file = "boards/demo.json"

            [output]
            board_out = "out/demo_routed.json"
            render = false
            image_width = 800
            "#,
        )
        .unwrap();
        assert_eq!(cfg.input.board_file, "boards/demo.json");
        assert_eq!(cfg.output.board_out, "out/demo_routed.json");
        assert!(!cfg.output.render);
        assert_eq!(cfg.output.image_width, 800);
        // Omitted keys keep their defaults.
        assert_eq!(cfg.output.image_height, 2000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn escape_clearance_capped_by_clearance() {
        let mut cfg = Config::default();
        cfg.rules.escape_clearance = cfg.rules.clearance + 0.1;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::EscapeClearanceTooLarge { .. })
        ));
    }
}
