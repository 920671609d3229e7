pub mod protocol;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bridge_core::{
    model::{Device, DeviceUuid},
    transport::{EventStream, Transport},
};
use bytes::Bytes;
use rumqttc::{
    AsyncClient, Event, Incoming, MqttOptions, QoS, TlsConfiguration, Transport as MqttTransport,
};
use tokio::sync::broadcast;
use tokio_stream::{
    Stream, StreamExt,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use tracing::{debug, warn};

use crate::protocol::{TOPIC_CMD, TOPIC_ERR, TOPIC_EVT, TOPIC_RSP};

pub const DEFAULT_PORT: u16 = 8884;
pub const DEFAULT_CLIENT_ID: &str = "nhc2-bridge";
pub const DEFAULT_USERNAME: &str = "hobby";

#[derive(Clone, Debug, PartialEq)]
pub struct Nhc2Options {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub tls: bool,
    /// CA bundle for the controller's certificate; system roots otherwise.
    pub ca_file: Option<PathBuf>,
}

impl Default for Nhc2Options {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: String::new(),
            tls: true,
            ca_file: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Message {
    topic: String,
    payload: Bytes,
}

/// MQTT connection to a controller's hobby API.
#[derive(Clone)]
pub struct Nhc2Transport {
    client: AsyncClient,
    tx: Arc<broadcast::Sender<Message>>,
}

impl Nhc2Transport {
    pub async fn connect(options: &Nhc2Options) -> Result<Self> {
        let mut opts = MqttOptions::new(&options.client_id, &options.host, options.port);
        opts.set_keep_alive(Duration::from_secs(5));
        opts.set_clean_session(true);
        opts.set_credentials(&options.username, &options.password);
        if options.tls {
            let transport = match &options.ca_file {
                Some(path) => {
                    let ca = tokio::fs::read(path)
                        .await
                        .with_context(|| format!("read ca file {}", path.display()))?;
                    MqttTransport::tls_with_config(TlsConfiguration::Simple {
                        ca,
                        alpn: None,
                        client_auth: None,
                    })
                }
                None => MqttTransport::tls_with_default_config(),
            };
            opts.set_transport(transport);
        }

        let (client, mut eventloop) = AsyncClient::new(opts, 10);

        let (tx, _rx) = broadcast::channel(1024);
        let tx = Arc::new(tx);
        let forwarder_tx = Arc::clone(&tx);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::Publish(p))) => {
                        if p.topic == TOPIC_ERR {
                            warn!(payload = %String::from_utf8_lossy(&p.payload), "controller reported an error");
                        }
                        let _ = forwarder_tx.send(Message { topic: p.topic, payload: p.payload });
                    }
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => debug!("connected to controller"),
                    Ok(_) => {}
                    Err(e) => {
                        warn!("mqtt event loop error: {e}");
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                }
            }
        });

        Ok(Self { client, tx })
    }

    fn messages(&self, topic: &'static str) -> impl Stream<Item = Message> + Unpin + Send + use<> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(move |item| on_topic(item, topic))
    }
}

fn on_topic(item: Result<Message, BroadcastStreamRecvError>, topic: &str) -> Option<Message> {
    match item {
        Ok(msg) if msg.topic == topic => Some(msg),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, topic, "consumer lagged, controller messages lost");
            None
        }
    }
}

#[async_trait]
impl Transport for Nhc2Transport {
    async fn subscribe(&self) -> Result<()> {
        for topic in [TOPIC_RSP, TOPIC_EVT, TOPIC_ERR] {
            self.client
                .subscribe(topic, QoS::AtLeastOnce)
                .await
                .with_context(|| format!("subscribe {topic}"))?;
        }
        Ok(())
    }

    async fn get_accessories(&self) -> Result<Vec<Device>> {
        let mut responses = self.messages(TOPIC_RSP);
        self.client
            .publish(TOPIC_CMD, QoS::AtLeastOnce, false, protocol::list_request()?)
            .await
            .context("publish devices.list")?;

        while let Some(msg) = responses.next().await {
            match protocol::decode_list_response(&msg.payload) {
                Ok(Some(devices)) => return Ok(devices),
                Ok(None) => continue,
                Err(e) => warn!("bad response payload: {e:#}"),
            }
        }
        bail!("connection closed before devices.list response")
    }

    async fn get_events(&self) -> Result<EventStream> {
        let events = self.messages(TOPIC_EVT).filter_map(|msg| {
            let parsed = protocol::decode_message(&msg.payload);
            if let Err(err) = &parsed {
                warn!(error = %err, "failed to decode controller event");
            }
            parsed.ok()
        });
        Ok(Box::new(events))
    }

    fn send_status_change_command(&self, id: &DeviceUuid, on: bool) -> Result<()> {
        let payload = protocol::status_command(id, on)?;
        self.client
            .try_publish(TOPIC_CMD, QoS::AtLeastOnce, false, payload)
            .context("publish status change")
    }

    fn send_brightness_change_command(&self, id: &DeviceUuid, level: u8) -> Result<()> {
        let payload = protocol::brightness_command(id, level)?;
        self.client
            .try_publish(TOPIC_CMD, QoS::AtLeastOnce, false, payload)
            .context("publish brightness change")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::model::{Property, Status};
    use serde_json::json;
    use std::{
        io::ErrorKind,
        net::TcpListener,
        process::{Child, Command, Stdio},
    };
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn lagging_consumer_skips_lost_messages_and_keeps_going() {
        let (tx, rx) = broadcast::channel(1);
        for topic in [TOPIC_EVT, TOPIC_EVT, TOPIC_RSP, TOPIC_EVT] {
            let msg = Message { topic: topic.to_string(), payload: Bytes::from_static(b"{}") };
            assert!(tx.send(msg).is_ok());
        }
        drop(tx);

        let received: Vec<_> = BroadcastStream::new(rx)
            .filter_map(|item| on_topic(item, TOPIC_EVT))
            .collect()
            .await;

        assert_eq!(received.len(), 1);
        assert_eq!(received[0].topic, TOPIC_EVT);
    }

    struct MosquittoGuard(Child);

    impl Drop for MosquittoGuard {
        fn drop(&mut self) {
            let _ = self.0.kill();
        }
    }

    async fn start_broker() -> Result<(MosquittoGuard, u16)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        drop(listener);

        let child = Command::new("mosquitto")
            .args(["-p", &port.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("spawn mosquitto")?;

        let guard = MosquittoGuard(child);
        let mut attempts = 0;
        loop {
            match tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
                Ok(_) => break,
                Err(_) if attempts < 20 => {
                    attempts += 1;
                    sleep(Duration::from_millis(50)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok((guard, port))
    }

    fn plain(port: u16, client_id: &str) -> Nhc2Options {
        Nhc2Options {
            host: "127.0.0.1".into(),
            port,
            client_id: client_id.into(),
            tls: false,
            ..Default::default()
        }
    }

    /// Stands in for the controller: answers devices.list and records commands.
    async fn fake_controller(
        port: u16,
    ) -> Result<(AsyncClient, tokio::sync::mpsc::UnboundedReceiver<serde_json::Value>)> {
        let opts = MqttOptions::new("fake-controller", "127.0.0.1", port);
        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        client.subscribe(TOPIC_CMD, QoS::AtLeastOnce).await?;
        let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();
        let responder = client.clone();
        tokio::spawn(async move {
            while let Ok(event) = eventloop.poll().await {
                let Event::Incoming(Incoming::Publish(p)) = event else { continue };
                let Ok(cmd) = serde_json::from_slice::<serde_json::Value>(&p.payload) else {
                    continue;
                };
                if cmd["Method"] == "devices.list" {
                    let rsp = json!({"Method": "devices.list", "Params": [{"Devices": [
                        {"Uuid": "U1", "Name": "Hall", "Model": "light", "Type": "action",
                         "Properties": [{"Status": "On"}]}
                    ]}]});
                    let payload = serde_json::to_vec(&rsp).unwrap();
                    let _ = responder.publish(TOPIC_RSP, QoS::AtLeastOnce, false, payload).await;
                } else {
                    let _ = cmd_tx.send(cmd);
                }
            }
        });
        Ok((client, cmd_rx))
    }

    #[tokio::test]
    async fn lists_devices_and_streams_events() -> Result<()> {
        let (_guard, port) = match start_broker().await {
            Ok(ok) => ok,
            Err(e)
                if e.downcast_ref::<std::io::Error>().map(|io| io.kind())
                    == Some(ErrorKind::NotFound) =>
            {
                eprintln!("skipping lists_devices_and_streams_events: mosquitto not installed");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let (controller, mut commands) = fake_controller(port).await?;
        let transport = Nhc2Transport::connect(&plain(port, "bridge-test")).await?;
        transport.subscribe().await?;
        sleep(Duration::from_millis(200)).await;

        let devices = timeout(Duration::from_secs(2), transport.get_accessories()).await??;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].uuid, DeviceUuid::from("U1"));

        let mut events = transport.get_events().await?;
        let evt = json!({"Method": "devices.status_changed", "Params": [{"Devices": [
            {"Uuid": "U1", "Properties": [{"Status": "Off"}]}
        ]}]});
        controller.publish(TOPIC_EVT, QoS::AtLeastOnce, false, serde_json::to_vec(&evt)?).await?;
        let event = timeout(Duration::from_secs(2), events.next()).await?.expect("event");
        let first = event.devices().next().expect("device in event");
        assert_eq!(first.properties, vec![Property::Status(Status::Off)]);

        transport.send_status_change_command(&DeviceUuid::from("U1"), true)?;
        let cmd = timeout(Duration::from_secs(2), commands.recv()).await?.expect("command");
        assert_eq!(cmd["Method"], "devices.control");
        assert_eq!(cmd["Params"][0]["Devices"][0]["Properties"][0]["Status"], "On");
        Ok(())
    }
}
