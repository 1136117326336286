//! Heartbeat example: a stand-in message center and a manual-mode client
//! in one process.
//!
//! Run with:
//!   cargo run --example heartbeat

use std::fs;
use std::io::Write;
use std::os::unix::net::UnixListener;
use std::thread;
use std::time::Duration;

use bitsipc::client::{Client, ClientConfig, DispatchMode, Scopes};
use bitsipc::frame::{FrameReader, DELIMITER};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("bitsipc-heartbeat-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("center.sock");
    let _ = fs::remove_file(&sock_path);

    let listener = UnixListener::bind(&sock_path)?;

    let center = thread::spawn(
        move || -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let (stream, _) = listener.accept()?;
            let mut writer = stream.try_clone()?;
            let mut reader = FrameReader::new(stream);

            // The client announces its heartbeat listener first.
            let registration = reader.read_frame()?;
            eprintln!("[center] {}", String::from_utf8_lossy(&registration));

            for beat in 1..=3 {
                let envelope = json!({
                    "type": "bits-ipc",
                    "data": { "type": "event", "event": "bits-ipc#heartbeat", "params": [beat] },
                });
                let mut wire = serde_json::to_vec(&envelope)?;
                wire.push(DELIMITER);
                writer.write_all(&wire)?;
                thread::sleep(Duration::from_millis(50));
            }
            Ok(())
        },
    );

    let config = ClientConfig {
        read_timeout: Duration::from_millis(200),
        ..ClientConfig::default()
    };
    let client = Client::with_config(&sock_path, config)?;
    client.add_event_listener("bits-ipc#heartbeat", &Scopes::none(), |params| {
        eprintln!("[client] heartbeat {params:?}");
    })?;
    client.start(DispatchMode::Manual)?;

    // Manual mode: this thread drives dispatch until the center hangs up.
    let mut routed = 0;
    while routed < 3 {
        match client.dispatch_messages(8) {
            Ok(count) => routed += count,
            Err(err) => {
                eprintln!("[client] dispatch ended: {err}");
                break;
            }
        }
    }

    client.stop();
    center
        .join()
        .map_err(|_| "center thread panicked")?
        .map_err(|err| err.to_string())?;

    eprintln!("[client] stats: {:?}", client.stats());
    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
