//! Processing recipes - what each workshop station turns into what
//!
//! Recipes specify input resources, output resources, the number of work
//! ticks required, and the stock level the tribe tries to keep of the
//! primary output.

use serde::{Deserialize, Serialize};

use crate::city::resource::ResourceKind;
use crate::core::error::SimError;

/// Workshop stations, placed at fixed offsets around the start outpost
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Station {
    Kitchen,
    Smelter,
    Sawpit,
    Kiln,
    Ropewalk,
    Fletchery,
    Workbench,
    Apothecary,
}

impl Station {
    /// Micro-tile offset from the start outpost center
    pub fn offset(&self) -> (i32, i32) {
        match self {
            Station::Kitchen => (2, 3),
            Station::Smelter => (-3, 2),
            Station::Sawpit => (3, -2),
            Station::Kiln => (-3, -3),
            Station::Ropewalk => (0, 4),
            Station::Fletchery => (4, 1),
            Station::Workbench => (-4, 0),
            Station::Apothecary => (1, -4),
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key.to_lowercase().as_str() {
            "kitchen" => Some(Station::Kitchen),
            "smelter" => Some(Station::Smelter),
            "sawpit" => Some(Station::Sawpit),
            "kiln" => Some(Station::Kiln),
            "ropewalk" => Some(Station::Ropewalk),
            "fletchery" => Some(Station::Fletchery),
            "workbench" => Some(Station::Workbench),
            "apothecary" => Some(Station::Apothecary),
            _ => None,
        }
    }
}

/// A processing recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub station: Station,
    /// Input resources consumed on the first work tick
    pub inputs: Vec<(ResourceKind, u32)>,
    /// Output resources produced on completion
    pub outputs: Vec<(ResourceKind, u32)>,
    /// Work ticks to complete one batch
    pub duration_ticks: u32,
    /// Stock of the primary output the tribe tries to hold
    pub target_stock: u32,
    pub weight: f32,
    /// Feeds automated defenses; gains priority under threat
    pub defense: bool,
}

impl Recipe {
    /// First output; drives demand scoring
    pub fn primary_output(&self) -> Option<ResourceKind> {
        self.outputs.first().map(|(r, _)| *r)
    }

    pub fn consumes(&self, resource: ResourceKind) -> bool {
        self.inputs.iter().any(|(r, _)| *r == resource)
    }
}

/// Catalog of all available recipes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeCatalog {
    recipes: Vec<Recipe>,
}

impl RecipeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        use ResourceKind::*;

        let mut catalog = Self::new();
        let mut add = |id: &str,
                       name: &str,
                       station: Station,
                       inputs: Vec<(ResourceKind, u32)>,
                       outputs: Vec<(ResourceKind, u32)>,
                       duration_ticks: u32,
                       target_stock: u32,
                       weight: f32,
                       defense: bool| {
            catalog.add(Recipe {
                id: id.into(),
                name: name.into(),
                station,
                inputs,
                outputs,
                duration_ticks,
                target_stock,
                weight,
                defense,
            });
        };

        add("cook", "Cook Mushrooms", Station::Kitchen, vec![(Mushrooms, 2)], vec![(Food, 3)], 4, 120, 1.2, false);
        add("smelt", "Smelt Ore", Station::Smelter, vec![(MetalOre, 2), (Charcoal, 1)], vec![(MetalParts, 1)], 6, 12, 1.0, true);
        add("saw", "Saw Planks", Station::Sawpit, vec![(Wood, 2)], vec![(WoodPlanks, 1)], 4, 16, 0.8, false);
        add("burn", "Burn Charcoal", Station::Kiln, vec![(Wood, 2)], vec![(Charcoal, 2)], 5, 10, 0.7, false);
        add("twist", "Twist Rope", Station::Ropewalk, vec![(Fiber, 3)], vec![(Rope, 1)], 4, 8, 0.5, false);
        add("fletch", "Fletch Bolts", Station::Fletchery, vec![(WoodPlanks, 1), (MetalParts, 1)], vec![(AmmoBolts, 4)], 5, 14, 0.9, true);
        add("wind", "Wind Springs", Station::Workbench, vec![(MetalParts, 1)], vec![(Springs, 2)], 6, 8, 0.6, true);
        add("brew", "Brew Fuel", Station::Apothecary, vec![(Herbs, 2)], vec![(Fuel, 1)], 4, 6, 0.5, false);

        catalog
    }

    pub fn add(&mut self, recipe: Recipe) {
        self.recipes.push(recipe);
    }

    pub fn get(&self, id: &str) -> Option<&Recipe> {
        self.recipes.iter().find(|r| r.id == id)
    }

    pub fn for_station(&self, station: Station) -> impl Iterator<Item = &Recipe> {
        self.recipes.iter().filter(move |r| r.station == station)
    }

    pub fn all(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn load_from_toml(path: &std::path::Path) -> Result<Self, SimError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse recipes from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, SimError> {
        let toml_data: TomlRecipes = toml::from_str(content)?;

        let mut catalog = Self::new();
        for recipe in toml_data.recipes {
            catalog.add(recipe.into_recipe()?);
        }
        Ok(catalog)
    }
}

#[derive(Debug, Deserialize)]
struct TomlRecipes {
    recipes: Vec<TomlRecipe>,
}

#[derive(Debug, Deserialize)]
struct TomlRecipe {
    id: String,
    name: String,
    station: String,
    #[serde(default)]
    inputs: Vec<TomlResourceAmount>,
    outputs: Vec<TomlResourceAmount>,
    duration_ticks: u32,
    target_stock: u32,
    #[serde(default = "default_weight")]
    weight: f32,
    #[serde(default)]
    defense: bool,
}

fn default_weight() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
struct TomlResourceAmount {
    resource: String,
    amount: u32,
}

impl TomlResourceAmount {
    fn into_resource_amount(self) -> Result<(ResourceKind, u32), SimError> {
        ResourceKind::from_key(&self.resource)
            .map(|r| (r, self.amount))
            .ok_or_else(|| SimError::Recipe(format!("unknown resource '{}'", self.resource)))
    }
}

impl TomlRecipe {
    fn into_recipe(self) -> Result<Recipe, SimError> {
        let station = Station::from_key(&self.station)
            .ok_or_else(|| SimError::Recipe(format!("unknown station '{}'", self.station)))?;

        let inputs = self
            .inputs
            .into_iter()
            .map(TomlResourceAmount::into_resource_amount)
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = self
            .outputs
            .into_iter()
            .map(TomlResourceAmount::into_resource_amount)
            .collect::<Result<Vec<_>, _>>()?;

        if outputs.is_empty() {
            return Err(SimError::Recipe(format!("recipe '{}' has no outputs", self.id)));
        }

        Ok(Recipe {
            id: self.id,
            name: self.name,
            station,
            inputs,
            outputs,
            duration_ticks: self.duration_ticks.max(1),
            target_stock: self.target_stock,
            weight: self.weight,
            defense: self.defense,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = RecipeCatalog::with_defaults();
        assert_eq!(catalog.all().len(), 8);

        let smelt = catalog.get("smelt").unwrap();
        assert_eq!(smelt.station, Station::Smelter);
        assert!(smelt.consumes(ResourceKind::Charcoal));
        assert_eq!(smelt.primary_output(), Some(ResourceKind::MetalParts));
    }

    #[test]
    fn test_for_station() {
        let catalog = RecipeCatalog::with_defaults();
        let kitchen: Vec<_> = catalog.for_station(Station::Kitchen).collect();
        assert_eq!(kitchen.len(), 1);
        assert_eq!(kitchen[0].id, "cook");
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [[recipes]]
            id = "bake"
            name = "Bake Bread"
            station = "kitchen"
            inputs = [{ resource = "mushrooms", amount = 1 }]
            outputs = [{ resource = "food", amount = 2 }]
            duration_ticks = 3
            target_stock = 50
        "#;
        let catalog = RecipeCatalog::parse_toml(toml).unwrap();
        let bake = catalog.get("bake").unwrap();
        assert_eq!(bake.inputs, vec![(ResourceKind::Mushrooms, 1)]);
        assert_eq!(bake.weight, 1.0);
        assert!(!bake.defense);
    }

    #[test]
    fn test_parse_toml_rejects_unknown_station() {
        let toml = r#"
            [[recipes]]
            id = "x"
            name = "X"
            station = "forge"
            outputs = [{ resource = "food", amount = 1 }]
            duration_ticks = 1
            target_stock = 1
        "#;
        assert!(matches!(
            RecipeCatalog::parse_toml(toml),
            Err(SimError::Recipe(_))
        ));
    }
}
