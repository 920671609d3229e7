use std::sync::Arc;

use tracing::debug;

use crate::{
    accessory::{
        Accessory, Characteristic, CharacteristicKind, CharacteristicValue, Service, SetHandler,
    },
    classifier::AccessoryRecipe,
    model::{Device, DeviceUuid},
    reconciler::apply_properties,
    router::CommandRouter,
};

/// Builds accessories and wires their set handlers to the command router.
#[derive(Clone)]
pub struct AccessoryFactory {
    router: CommandRouter,
}

impl AccessoryFactory {
    pub fn new(router: CommandRouter) -> Self {
        Self { router }
    }

    pub fn build(&self, device: &Device, recipe: &AccessoryRecipe) -> Arc<Accessory> {
        let mut service = Service::new(recipe.service, device.name.clone());
        for kind in &recipe.characteristics {
            let handler = self.set_handler(*kind, device.uuid.clone());
            service.characteristics.push(Characteristic::new(*kind).with_set_handler(handler));
        }

        let accessory = Accessory {
            identity: device.uuid.clone(),
            display_name: device.name.clone(),
            model: device.model.clone(),
            services: vec![service],
        };
        apply_properties(&accessory, &device.properties);
        debug!(uuid = %device.uuid, model = %device.model, "built accessory");
        Arc::new(accessory)
    }

    fn set_handler(&self, kind: CharacteristicKind, id: DeviceUuid) -> SetHandler {
        let router = self.router.clone();
        match kind {
            CharacteristicKind::On => Arc::new(move |value: &CharacteristicValue| {
                if let CharacteristicValue::Bool(on) = value {
                    router.send_status_change(&id, *on);
                }
            }),
            CharacteristicKind::Brightness => Arc::new(move |value: &CharacteristicValue| {
                if let CharacteristicValue::Level(level) = value {
                    router.send_brightness_change(&id, *level);
                }
            }),
        }
    }
}
