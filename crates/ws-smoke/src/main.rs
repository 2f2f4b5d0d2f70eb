use futures_util::{SinkExt, StreamExt};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::connect_async;
use url::Url;

#[tokio::main]
async fn main() {
    let raw = std::env::args().nth(1).unwrap_or_else(|| "ws://127.0.0.1:8080/ws/covers".to_string());
    let url = match Url::parse(&raw) {
        Ok(u) if u.scheme() == "ws" || u.scheme() == "wss" => u,
        _ => {
            eprintln!("Not a ws:// or wss:// URL: {}", raw);
            std::process::exit(1);
        }
    };
    eprintln!("Connecting to {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await.expect("WS connect failed");
    let (mut write, mut read) = ws_stream.split();

    let _ = write.send(tokio_tungstenite::tungstenite::Message::Ping(vec![])).await;

    // The server sends the current covers right after the upgrade
    match timeout(Duration::from_secs(5), read.next()).await {
        Ok(Some(Ok(tokio_tungstenite::tungstenite::Message::Text(t)))) => {
            match serde_json::from_str::<serde_json::Value>(&t) {
                Ok(v) if v.get("type").and_then(|t| t.as_str()) == Some("covers") => {
                    let count = v.get("covers").and_then(|c| c.as_array()).map_or(0, |c| c.len());
                    println!("Received {} covers: {}", count, t);
                }
                _ => {
                    eprintln!("Unexpected first frame: {}", t);
                    std::process::exit(5);
                }
            }
        }
        Ok(Some(Ok(other))) => {
            eprintln!("WS non-text message: {:?}", other);
            std::process::exit(5);
        }
        Ok(Some(Err(e))) => {
            eprintln!("WS receive error: {}", e);
            std::process::exit(2);
        }
        Ok(None) => {
            eprintln!("WS closed by server");
            std::process::exit(3);
        }
        Err(_) => {
            eprintln!("Timeout waiting for cover snapshot");
            std::process::exit(4);
        }
    }
}
