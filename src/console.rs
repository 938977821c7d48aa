//! Console observer for the event stream.
//!
//! Prints every event as one JSON line, exactly as any other subscriber
//! would see it on the wire. Purely an observer: it never feeds back
//! into the run.

use crate::events::EventBus;
use tokio::task::JoinHandle;
use tracing::warn;

/// Subscribe to the bus and print each event as a JSON line.
///
/// The task ends once the bus (all clones) is dropped and the queued
/// events are drained; await the handle to flush remaining output.
pub fn spawn_printer(bus: &EventBus) -> JoinHandle<()> {
    let mut subscription = bus.subscribe();
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            match event.to_json() {
                Ok(line) => println!("{line}"),
                Err(err) => warn!("Failed to serialize event for console: {err}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventType};
    use serde_json::json;

    #[tokio::test]
    async fn test_printer_exits_when_bus_dropped() {
        let bus = EventBus::new();
        let handle = spawn_printer(&bus);

        bus.publish(Event::new(EventType::AgentStarted, "test", json!({})));
        drop(bus);

        handle.await.unwrap();
    }
}
