//! Ground Models and Terrain Queries
//!
//! A ground model is a named set of friction/bounce parameters for a terrain
//! material. Terrain is reached only through [`TerrainQuery`], which answers
//! height, surface normal and the nearest sampled ground model at a
//! horizontal position. A `None` answer means "no ground data here" and is
//! how off-map nodes are detected.
//!
//! Terrain is read-only while a step is in flight; authoring tools swap the
//! whole terrain between frames.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// ============================================================================
// GROUND MODELS
// ============================================================================

/// Index into a [`GroundModelSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroundModelId(pub u16);

/// Friction and restitution parameters of a terrain material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundModel {
    /// Material name ("concrete", "mud", ...)
    pub name: String,

    /// Friction coefficient at rest
    pub static_friction: f64,

    /// Friction coefficient when sliding fast
    pub dynamic_friction: f64,

    /// Speed scale of the static-to-dynamic transition in m/s
    pub stribeck_velocity: f64,

    /// 0 = fully damped contact, 1 = no normal damping
    pub bounce: f64,

    /// Multiplier on the terrain penalty stiffness
    pub stiffness_scale: f64,
}

impl GroundModel {
    pub fn new(name: impl Into<String>, static_friction: f64, dynamic_friction: f64) -> Self {
        Self {
            name: name.into(),
            static_friction,
            dynamic_friction,
            stribeck_velocity: 1.0,
            bounce: 0.0,
            stiffness_scale: 1.0,
        }
    }

    pub fn with_bounce(mut self, bounce: f64) -> Self {
        self.bounce = bounce.clamp(0.0, 1.0);
        self
    }

    pub fn with_stiffness_scale(mut self, scale: f64) -> Self {
        self.stiffness_scale = scale;
        self
    }

    /// Stribeck curve: `mc + (ms - mc) * exp(-speed / vs)`.
    pub fn effective_mu(&self, speed: f64) -> f64 {
        let vs = self.stribeck_velocity.max(1e-6);
        self.dynamic_friction + (self.static_friction - self.dynamic_friction) * (-speed / vs).exp()
    }
}

/// Ordered collection of ground models addressed by [`GroundModelId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundModelSet {
    models: Vec<GroundModel>,
}

impl Default for GroundModelSet {
    fn default() -> Self {
        Self {
            models: vec![
                GroundModel::new("concrete", 1.0, 0.8),
                GroundModel::new("asphalt", 0.95, 0.75),
                GroundModel::new("gravel", 0.7, 0.55),
                GroundModel::new("grass", 0.6, 0.45),
                GroundModel::new("mud", 0.4, 0.3).with_stiffness_scale(0.5),
                GroundModel::new("ice", 0.1, 0.05),
            ],
        }
    }
}

impl GroundModelSet {
    pub fn empty() -> Self {
        Self { models: Vec::new() }
    }

    /// Adds a model and returns its id. A model with the same name is replaced.
    pub fn insert(&mut self, model: GroundModel) -> GroundModelId {
        if let Some(pos) = self.models.iter().position(|m| m.name == model.name) {
            self.models[pos] = model;
            return GroundModelId(pos as u16);
        }
        self.models.push(model);
        GroundModelId((self.models.len() - 1) as u16)
    }

    pub fn get(&self, id: GroundModelId) -> Option<&GroundModel> {
        self.models.get(id.0 as usize)
    }

    pub fn id_of(&self, name: &str) -> Option<GroundModelId> {
        self.models
            .iter()
            .position(|m| m.name == name)
            .map(|i| GroundModelId(i as u16))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

// ============================================================================
// TERRAIN QUERY
// ============================================================================

/// Result of a terrain lookup at a horizontal position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundSample {
    /// Surface height (Y) in world coordinates
    pub height: f64,

    /// Unit surface normal
    pub normal: Vector3<f64>,

    /// Nearest sampled ground model
    pub model: GroundModelId,

    /// False when the position fell between samples and the model was picked fuzzily
    pub exact: bool,
}

/// Height and ground-model lookup in world coordinates.
pub trait TerrainQuery: Send + Sync {
    /// Samples the ground below `(x, z)`; `None` when the query is off-map.
    fn sample(&self, x: f64, z: f64) -> Option<GroundSample>;

    /// Resolves a ground model id returned by [`TerrainQuery::sample`].
    fn ground_model(&self, id: GroundModelId) -> Option<&GroundModel>;
}

/// Infinite (or square-bounded) horizontal plane of a single material.
#[derive(Debug, Clone)]
pub struct FlatGround {
    pub height: f64,
    pub model: GroundModelId,
    pub models: GroundModelSet,

    /// Half-width of the mapped square around the origin; `None` is unbounded
    pub extent: Option<f64>,
}

impl FlatGround {
    /// Unbounded concrete plane at `height`.
    pub fn new(height: f64) -> Self {
        Self {
            height,
            model: GroundModelId(0),
            models: GroundModelSet::default(),
            extent: None,
        }
    }

    pub fn with_extent(mut self, half_width: f64) -> Self {
        self.extent = Some(half_width);
        self
    }

    /// Selects a material by name; unknown names keep the current one.
    pub fn with_material(mut self, name: &str) -> Self {
        if let Some(id) = self.models.id_of(name) {
            self.model = id;
        }
        self
    }
}

impl TerrainQuery for FlatGround {
    fn sample(&self, x: f64, z: f64) -> Option<GroundSample> {
        if let Some(extent) = self.extent {
            if x.abs() > extent || z.abs() > extent {
                return None;
            }
        }
        Some(GroundSample {
            height: self.height,
            normal: Vector3::y(),
            model: self.model,
            exact: true,
        })
    }

    fn ground_model(&self, id: GroundModelId) -> Option<&GroundModel> {
        self.models.get(id)
    }
}

/// Regular grid height field with a per-sample material map.
///
/// Sample `(ix, iz)` sits at `origin + (ix * spacing, iz * spacing)`; heights
/// are row-major in Z. Between samples the height is bilinear and the ground
/// model is the nearest sample's, ties going to the lower index.
#[derive(Debug, Clone)]
pub struct HeightField {
    origin_x: f64,
    origin_z: f64,
    spacing: f64,
    columns: usize,
    rows: usize,
    heights: Vec<f64>,
    materials: Vec<GroundModelId>,
    models: GroundModelSet,
}

impl HeightField {
    /// Builds a height field; returns `None` if the arrays don't match the grid.
    pub fn new(
        origin_x: f64,
        origin_z: f64,
        spacing: f64,
        columns: usize,
        rows: usize,
        heights: Vec<f64>,
        materials: Vec<GroundModelId>,
        models: GroundModelSet,
    ) -> Option<Self> {
        let count = columns.checked_mul(rows)?;
        if columns < 2 || rows < 2 || spacing <= 0.0 || heights.len() != count || materials.len() != count {
            return None;
        }
        Some(Self {
            origin_x,
            origin_z,
            spacing,
            columns,
            rows,
            heights,
            materials,
            models,
        })
    }

    /// Flat field of one material, handy for tests.
    pub fn uniform(spacing: f64, columns: usize, rows: usize, height: f64, model: GroundModelId) -> Option<Self> {
        let count = columns.checked_mul(rows)?;
        Self::new(
            0.0,
            0.0,
            spacing,
            columns,
            rows,
            vec![height; count],
            vec![model; count],
            GroundModelSet::default(),
        )
    }

    pub fn set_height(&mut self, ix: usize, iz: usize, height: f64) {
        if ix < self.columns && iz < self.rows {
            self.heights[iz * self.columns + ix] = height;
        }
    }

    pub fn set_material(&mut self, ix: usize, iz: usize, model: GroundModelId) {
        if ix < self.columns && iz < self.rows {
            self.materials[iz * self.columns + ix] = model;
        }
    }

    #[inline]
    fn h(&self, ix: usize, iz: usize) -> f64 {
        self.heights[iz * self.columns + ix]
    }

    /// Grid-space coordinates, or `None` outside the mapped rectangle.
    fn grid_coords(&self, x: f64, z: f64) -> Option<(f64, f64)> {
        let fx = (x - self.origin_x) / self.spacing;
        let fz = (z - self.origin_z) / self.spacing;
        let max_x = (self.columns - 1) as f64;
        let max_z = (self.rows - 1) as f64;
        if !(0.0..=max_x).contains(&fx) || !(0.0..=max_z).contains(&fz) {
            return None;
        }
        Some((fx, fz))
    }

    fn bilinear(&self, fx: f64, fz: f64) -> f64 {
        let x0 = (fx.floor() as usize).min(self.columns - 2);
        let z0 = (fz.floor() as usize).min(self.rows - 2);
        let tx = fx - x0 as f64;
        let tz = fz - z0 as f64;
        let a = self.h(x0, z0) * (1.0 - tx) + self.h(x0 + 1, z0) * tx;
        let b = self.h(x0, z0 + 1) * (1.0 - tx) + self.h(x0 + 1, z0 + 1) * tx;
        a * (1.0 - tz) + b * tz
    }

    /// Central-difference normal, one cell either side (clamped to the grid).
    fn normal(&self, fx: f64, fz: f64) -> Vector3<f64> {
        let max_x = (self.columns - 1) as f64;
        let max_z = (self.rows - 1) as f64;
        let (x0, x1) = ((fx - 1.0).max(0.0), (fx + 1.0).min(max_x));
        let (z0, z1) = ((fz - 1.0).max(0.0), (fz + 1.0).min(max_z));
        let ddx = (self.bilinear(x1, fz) - self.bilinear(x0, fz)) / ((x1 - x0).max(1e-9) * self.spacing);
        let ddz = (self.bilinear(fx, z1) - self.bilinear(fx, z0)) / ((z1 - z0).max(1e-9) * self.spacing);
        Vector3::new(-ddx, 1.0, -ddz).normalize()
    }

    /// Nearest sample; exactly half-way rounds toward the lower index.
    fn nearest(&self, fx: f64, fz: f64) -> (usize, usize, bool) {
        let ix = ((fx - 0.5).ceil().max(0.0) as usize).min(self.columns - 1);
        let iz = ((fz - 0.5).ceil().max(0.0) as usize).min(self.rows - 1);
        let exact = (fx - ix as f64).abs() < 1e-9 && (fz - iz as f64).abs() < 1e-9;
        (ix, iz, exact)
    }
}

impl TerrainQuery for HeightField {
    fn sample(&self, x: f64, z: f64) -> Option<GroundSample> {
        let (fx, fz) = self.grid_coords(x, z)?;
        let (ix, iz, exact) = self.nearest(fx, fz);
        Some(GroundSample {
            height: self.bilinear(fx, fz),
            normal: self.normal(fx, fz),
            model: self.materials[iz * self.columns + ix],
            exact,
        })
    }

    fn ground_model(&self, id: GroundModelId) -> Option<&GroundModel> {
        self.models.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_models_resolve_by_name() {
        let set = GroundModelSet::default();
        let ice = set.id_of("ice").unwrap();
        assert!(set.get(ice).unwrap().static_friction < 0.2);
        assert!(set.id_of("lava").is_none());
    }

    #[test]
    fn test_insert_replaces_same_name() {
        let mut set = GroundModelSet::default();
        let before = set.len();
        let id = set.insert(GroundModel::new("mud", 0.2, 0.1));
        assert_eq!(set.len(), before);
        assert_relative_eq!(set.get(id).unwrap().static_friction, 0.2);
    }

    #[test]
    fn test_stribeck_curve_limits() {
        let model = GroundModel::new("test", 1.0, 0.5);
        assert_relative_eq!(model.effective_mu(0.0), 1.0);
        assert_relative_eq!(model.effective_mu(1000.0), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_flat_ground_extent() {
        let ground = FlatGround::new(2.0).with_extent(10.0);
        assert_relative_eq!(ground.sample(3.0, -4.0).unwrap().height, 2.0);
        assert!(ground.sample(11.0, 0.0).is_none());
    }

    #[test]
    fn test_heightfield_bilinear_on_slope() {
        let mut field = HeightField::uniform(1.0, 3, 3, 0.0, GroundModelId(0)).unwrap();
        for iz in 0..3 {
            for ix in 0..3 {
                field.set_height(ix, iz, ix as f64);
            }
        }
        let s = field.sample(0.5, 1.0).unwrap();
        assert_relative_eq!(s.height, 0.5);
        // Slope of +1 in X tilts the normal toward -X
        assert!(s.normal.x < 0.0);
        assert_relative_eq!(s.normal.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_heightfield_fuzzy_material() {
        let mut field = HeightField::uniform(1.0, 2, 2, 0.0, GroundModelId(0)).unwrap();
        field.set_material(1, 0, GroundModelId(3));

        let exact = field.sample(1.0, 0.0).unwrap();
        assert!(exact.exact);
        assert_eq!(exact.model, GroundModelId(3));

        let near = field.sample(0.8, 0.1).unwrap();
        assert!(!near.exact);
        assert_eq!(near.model, GroundModelId(3));

        // Half-way goes to the lower index
        let tie = field.sample(0.5, 0.0).unwrap();
        assert_eq!(tie.model, GroundModelId(0));
    }

    #[test]
    fn test_heightfield_off_map() {
        let field = HeightField::uniform(1.0, 4, 4, 0.0, GroundModelId(0)).unwrap();
        assert!(field.sample(-0.1, 1.0).is_none());
        assert!(field.sample(1.0, 3.5).is_none());
        assert!(HeightField::new(0.0, 0.0, 1.0, 2, 2, vec![0.0; 3], vec![GroundModelId(0); 4], GroundModelSet::default()).is_none());
    }
}
