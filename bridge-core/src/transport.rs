use anyhow::Result;
use async_trait::async_trait;
use tokio_stream::Stream;

use crate::model::{Device, DeviceUuid, Event};

pub type EventStream = Box<dyn Stream<Item = Event> + Unpin + Send>;

/// Connection to the home-automation controller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn subscribe(&self) -> Result<()>;
    async fn get_accessories(&self) -> Result<Vec<Device>>;
    /// Live, unbounded stream of controller events.
    async fn get_events(&self) -> Result<EventStream>;
    fn send_status_change_command(&self, id: &DeviceUuid, on: bool) -> Result<()>;
    fn send_brightness_change_command(&self, id: &DeviceUuid, level: u8) -> Result<()>;
}
