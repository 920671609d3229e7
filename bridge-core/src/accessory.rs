use std::{
    fmt,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::CharacteristicError, model::DeviceUuid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacteristicKind {
    On,
    Brightness,
}

impl CharacteristicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CharacteristicKind::On => "on",
            CharacteristicKind::Brightness => "brightness",
        }
    }

    /// Coerces a loosely typed host value into this characteristic's type.
    pub fn coerce(
        &self,
        raw: &serde_json::Value,
    ) -> Result<CharacteristicValue, CharacteristicError> {
        let invalid = |reason: &str| CharacteristicError::InvalidValue {
            kind: *self,
            reason: reason.to_string(),
        };
        match self {
            CharacteristicKind::On => match raw {
                serde_json::Value::Bool(b) => Ok(CharacteristicValue::Bool(*b)),
                serde_json::Value::Number(n) if n.as_u64() == Some(0) => {
                    Ok(CharacteristicValue::Bool(false))
                }
                serde_json::Value::Number(n) if n.as_u64() == Some(1) => {
                    Ok(CharacteristicValue::Bool(true))
                }
                _ => Err(invalid("expected a boolean")),
            },
            CharacteristicKind::Brightness => {
                let level = raw.as_u64().ok_or_else(|| invalid("expected an integer"))?;
                if level > 100 {
                    return Err(invalid("expected 0..=100"));
                }
                Ok(CharacteristicValue::Level(level as u8))
            }
        }
    }

    fn validate(&self, value: &CharacteristicValue) -> Result<(), CharacteristicError> {
        match (self, value) {
            (CharacteristicKind::On, CharacteristicValue::Bool(_)) => Ok(()),
            (CharacteristicKind::Brightness, CharacteristicValue::Level(l)) if *l <= 100 => Ok(()),
            _ => Err(CharacteristicError::InvalidValue {
                kind: *self,
                reason: format!("unexpected value {value:?}"),
            }),
        }
    }
}

impl fmt::Display for CharacteristicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CharacteristicKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on" => Ok(CharacteristicKind::On),
            "brightness" => Ok(CharacteristicKind::Brightness),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CharacteristicValue {
    Bool(bool),
    Level(u8), // 0..=100
}

pub type SetHandler = Arc<dyn Fn(&CharacteristicValue) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
struct Cell {
    value: Option<CharacteristicValue>,
    updated_at: Option<DateTime<Utc>>,
}

/// A typed value cell. `update_value` pushes controller state in;
/// `handle_set` carries a host request out. The two never cross.
pub struct Characteristic {
    kind: CharacteristicKind,
    cell: Mutex<Cell>,
    on_set: Option<SetHandler>,
}

impl Characteristic {
    pub fn new(kind: CharacteristicKind) -> Self {
        Self { kind, cell: Mutex::new(Cell::default()), on_set: None }
    }

    pub fn with_set_handler(mut self, handler: SetHandler) -> Self {
        self.on_set = Some(handler);
        self
    }

    pub fn kind(&self) -> CharacteristicKind {
        self.kind
    }

    pub fn value(&self) -> Option<CharacteristicValue> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner).value
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner).updated_at
    }

    pub fn update_value(&self, value: CharacteristicValue) {
        let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        cell.value = Some(value);
        cell.updated_at = Some(Utc::now());
    }

    /// Acknowledges as soon as the handler returns. The cell keeps its old
    /// value until the controller confirms through an event.
    pub fn handle_set(&self, value: CharacteristicValue) -> Result<(), CharacteristicError> {
        self.kind.validate(&value)?;
        let handler = self.on_set.as_ref().ok_or(CharacteristicError::ReadOnly(self.kind))?;
        handler(&value);
        Ok(())
    }
}

impl fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Characteristic")
            .field("kind", &self.kind)
            .field("value", &self.value())
            .field("writable", &self.on_set.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Lightbulb,
    Switch,
}

#[derive(Debug)]
pub struct Service {
    pub kind: ServiceKind,
    pub name: String,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn new(kind: ServiceKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into(), characteristics: Vec::new() }
    }

    pub fn characteristic(&self, kind: CharacteristicKind) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.kind == kind)
    }
}

#[derive(Debug)]
pub struct Accessory {
    pub identity: DeviceUuid,
    pub display_name: String,
    pub model: String,
    pub services: Vec<Service>,
}

impl Accessory {
    pub fn characteristic(&self, kind: CharacteristicKind) -> Option<&Characteristic> {
        self.services.iter().find_map(|s| s.characteristic(kind))
    }

    pub fn snapshot(&self) -> AccessorySnapshot {
        AccessorySnapshot {
            identity: self.identity.clone(),
            display_name: self.display_name.clone(),
            model: self.model.clone(),
            services: self
                .services
                .iter()
                .map(|s| ServiceSnapshot {
                    kind: s.kind,
                    name: s.name.clone(),
                    characteristics: s
                        .characteristics
                        .iter()
                        .map(|c| CharacteristicSnapshot {
                            kind: c.kind,
                            value: c.value(),
                            updated_at: c.updated_at(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicSnapshot {
    pub kind: CharacteristicKind,
    pub value: Option<CharacteristicValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub kind: ServiceKind,
    pub name: String,
    pub characteristics: Vec<CharacteristicSnapshot>,
}

/// Point-in-time view of an accessory, suitable for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessorySnapshot {
    pub identity: DeviceUuid,
    pub display_name: String,
    pub model: String,
    pub services: Vec<ServiceSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn update_does_not_invoke_set_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let c = Characteristic::new(CharacteristicKind::On).with_set_handler(Arc::new(
            move |_: &CharacteristicValue| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));

        c.update_value(CharacteristicValue::Bool(true));
        assert_eq!(c.value(), Some(CharacteristicValue::Bool(true)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn set_leaves_cell_untouched() {
        let c = Characteristic::new(CharacteristicKind::Brightness)
            .with_set_handler(Arc::new(|_: &CharacteristicValue| {}));
        c.handle_set(CharacteristicValue::Level(30)).unwrap();
        assert_eq!(c.value(), None);
    }

    #[test]
    fn set_rejects_wrong_type_and_missing_handler() {
        let writable = Characteristic::new(CharacteristicKind::On)
            .with_set_handler(Arc::new(|_: &CharacteristicValue| {}));
        assert!(matches!(
            writable.handle_set(CharacteristicValue::Level(1)),
            Err(CharacteristicError::InvalidValue { .. })
        ));

        let read_only = Characteristic::new(CharacteristicKind::On);
        assert!(matches!(
            read_only.handle_set(CharacteristicValue::Bool(true)),
            Err(CharacteristicError::ReadOnly(CharacteristicKind::On))
        ));
    }

    #[test]
    fn coerces_host_values() {
        assert_eq!(
            CharacteristicKind::On.coerce(&json!(1)).unwrap(),
            CharacteristicValue::Bool(true)
        );
        assert_eq!(
            CharacteristicKind::Brightness.coerce(&json!(55)).unwrap(),
            CharacteristicValue::Level(55)
        );
        assert!(CharacteristicKind::Brightness.coerce(&json!(101)).is_err());
        assert!(CharacteristicKind::On.coerce(&json!("yes")).is_err());
    }
}
