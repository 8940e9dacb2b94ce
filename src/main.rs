use anyhow::Context;
use log::{error, info};
use mqttkit::{packets::publish_packet::PublishPacket, ClientConfig, Connection, QoS, Session};
use tokio::{net::TcpStream, sync::mpsc};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = ClientConfig::from_env()?;

    info!("Connecting to {}...", config.address);
    let stream = TcpStream::connect(&config.address)
        .await
        .with_context(|| format!("Failed to connect to {}", config.address))?;

    let mut session = Session::new(Connection::new(stream), config.clone());
    session.link().await?;

    if !config.subscribe_topics.is_empty() {
        session.subscribe(config.subscribe_topics.clone(), QoS::AtMostOnce).await?;
    }

    let report = r#"{"id":"1","params":{}}"#;
    session.publish(config.publish_topic.clone(), report, config.publish_qos).await?;

    let (tx, mut rx) = mpsc::channel::<PublishPacket>(32);
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            info!(
                "topic: {}, payload: {}",
                message.topic_str(),
                String::from_utf8_lossy(&message.payload)
            );
        }
    });

    let interrupted = tokio::select! {
        result = session.run(tx) => {
            if let Err(e) = result {
                error!("Session ended: {e:?}");
            }
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };

    if interrupted {
        info!("Shutting down");
        session.disconnect().await?;
    }

    Ok(())
}
