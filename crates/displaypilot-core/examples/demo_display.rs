//! Drive the simulated demo display through a full control session.
//!
//! Run with: cargo run --example demo_display
//! Set RUST_LOG=trace to watch the wire traffic.

use std::time::Duration;

use displaypilot_core::demo::DemoDisplay;
use displaypilot_core::device::{
    InputSelectable, InputSource, PowerControllable, VolumeControllable,
};
use displaypilot_core::drivers::{SharpDriver, VendorProfile};
use displaypilot_core::framing::DelimiterBuffer;
use displaypilot_core::transaction::{CommandQueue, QueueConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let (queue, mut events) = CommandQueue::spawn(QueueConfig {
        label: "demo".to_string(),
        ..QueueConfig::default()
    });
    queue.set_buffer(Box::new(DelimiterBuffer::new(&[b'\r'], false)));

    // A simulated panel that answers WAIT twice while warming up and takes
    // 5-30ms per reply, like a real RS-232 link.
    let display = DemoDisplay::new(queue.clone())
        .with_busy_replies(2)
        .with_latency(5..30);
    queue.bind_port(Some(Box::new(display)));

    let mut driver = SharpDriver::new(queue.clone(), VendorProfile::sharp());
    let mut changes = driver.notifier().subscribe();

    driver.power_on();
    driver.select_input(InputSource::Hdmi(2));
    driver.set_volume(35);

    // Pump driver events until the session settles.
    let session = async {
        while let Some(event) = events.recv().await {
            driver.handle_event(event);
        }
    };
    let _ = tokio::time::timeout(Duration::from_secs(2), session).await;

    println!("final state: {:?}", driver.state());
    while let Ok(change) = changes.try_recv() {
        println!("observed change: {:?}", change);
    }

    queue.shutdown();
    Ok(())
}
