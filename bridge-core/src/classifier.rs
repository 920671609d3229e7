use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    accessory::{CharacteristicKind, ServiceKind},
    model::Device,
};

pub const MODEL_LIGHT: &str = "light";
pub const MODEL_DIMMER: &str = "dimmer";
pub const MODEL_SWITCHED_GENERIC: &str = "switched-generic";

/// How to build an accessory for one device category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessoryRecipe {
    pub service: ServiceKind,
    pub characteristics: Vec<CharacteristicKind>,
}

impl AccessoryRecipe {
    pub fn new(service: ServiceKind, characteristics: &[CharacteristicKind]) -> Self {
        Self { service, characteristics: characteristics.to_vec() }
    }
}

/// Lookup table from controller model string to recipe.
#[derive(Debug, Clone)]
pub struct Classifier {
    recipes: BTreeMap<String, AccessoryRecipe>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::empty()
            .with_recipe(
                MODEL_LIGHT,
                AccessoryRecipe::new(ServiceKind::Lightbulb, &[CharacteristicKind::On]),
            )
            .with_recipe(
                MODEL_DIMMER,
                AccessoryRecipe::new(
                    ServiceKind::Lightbulb,
                    &[CharacteristicKind::On, CharacteristicKind::Brightness],
                ),
            )
            .with_recipe(
                MODEL_SWITCHED_GENERIC,
                AccessoryRecipe::new(ServiceKind::Switch, &[CharacteristicKind::On]),
            )
    }
}

impl Classifier {
    pub fn empty() -> Self {
        Self { recipes: BTreeMap::new() }
    }

    /// Adds a category, replacing any recipe already bound to `model`.
    pub fn with_recipe(mut self, model: impl Into<String>, recipe: AccessoryRecipe) -> Self {
        self.recipes.insert(model.into(), recipe);
        self
    }

    pub fn classify(&self, device: &Device) -> Option<&AccessoryRecipe> {
        self.recipes.get(&device.model)
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }
}
