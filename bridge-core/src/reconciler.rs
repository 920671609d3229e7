use std::sync::Arc;

use tracing::{debug, trace};

use crate::{
    accessory::{Accessory, CharacteristicKind, CharacteristicValue},
    model::{Event, Property, Status},
    registry::Registry,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub dropped: usize,
}

/// Applies incremental controller events to registered accessories.
#[derive(Clone)]
pub struct Reconciler {
    registry: Arc<Registry>,
}

impl Reconciler {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn apply(&self, event: &Event) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        for device in event.devices() {
            let Some(accessory) = self.registry.find_by_identity(&device.uuid) else {
                trace!(uuid = %device.uuid, "no accessory for event, dropping");
                outcome.dropped += 1;
                continue;
            };
            debug!(uuid = %device.uuid, name = %accessory.display_name, "applying event");
            apply_properties(&accessory, &device.properties);
            outcome.applied += 1;
        }
        outcome
    }
}

/// Pushes reported properties into every service of `accessory`. Properties
/// the accessory has no characteristic for are ignored.
pub fn apply_properties(accessory: &Accessory, properties: &[Property]) {
    for property in properties {
        let update = match property {
            Property::Status(Status::On) => {
                (CharacteristicKind::On, CharacteristicValue::Bool(true))
            }
            Property::Status(Status::Off) => {
                (CharacteristicKind::On, CharacteristicValue::Bool(false))
            }
            Property::Brightness(Some(level)) => {
                (CharacteristicKind::Brightness, CharacteristicValue::Level(to_level(*level)))
            }
            Property::Status(Status::Other(_)) | Property::Brightness(None) => continue,
            Property::Unknown { .. } => continue,
        };

        let (kind, value) = update;
        for service in &accessory.services {
            if let Some(c) = service.characteristic(kind) {
                c.update_value(value);
            }
        }
    }
}

fn to_level(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_rounds_and_clamps() {
        assert_eq!(to_level(42.4), 42);
        assert_eq!(to_level(42.5), 43);
        assert_eq!(to_level(-3.0), 0);
        assert_eq!(to_level(250.0), 100);
        assert_eq!(to_level(0.0), 0);
    }
}
