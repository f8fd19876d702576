use futures_util::{SinkExt, StreamExt};
use shared::codec;
use shared::{ClientEvent, GridSize, Participant, Position, ServerEvent};
use std::collections::BTreeMap;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

fn print_event(event: &ServerEvent) {
    match event {
        ServerEvent::EmojiList(payload) => {
            let emojis: Vec<String> = codec::decode(&payload.0).unwrap_or_default();
            println!("Emoji catalog: {:?}", emojis);
        }
        ServerEvent::UsersUpdate(payload) => {
            let users: BTreeMap<u32, Participant> =
                codec::decode(&payload.0).unwrap_or_default();
            println!("Participants:");
            for (id, participant) in users {
                println!(
                    "  {} -> {} at ({}, {})",
                    id, participant.name, participant.position.x, participant.position.y
                );
            }
        }
        ServerEvent::GridSizeUpdate(payload) => {
            if let Ok(grid) = codec::decode::<GridSize>(&payload.0) {
                println!("Grid size: {}x{}", grid.width, grid.height);
            }
        }
        ServerEvent::BackgroundImageUpdate(payload) => {
            if let Ok(background) = codec::decode::<String>(&payload.0) {
                println!("Background: {:?}", background);
            }
        }
        ServerEvent::EmojiError(reason) => println!("Join refused: {}", reason),
        ServerEvent::ChatMessage(line) => println!("Chat: {}", line),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = "ws://127.0.0.1:3000";
    println!("Connecting to {}", url);

    let (websocket, _) = connect_async(url).await?;
    let (mut sink, mut source) = websocket.split();

    // The server greets every connection with catalog, grid, and background
    for _ in 0..3 {
        if let Some(Ok(Message::Text(text))) = source.next().await {
            let event: ServerEvent = serde_json::from_str(&text)?;
            print_event(&event);
        }
    }

    // Join with the first catalog emoji
    let join = ClientEvent::PickUser {
        name: "TestClient".to_string(),
        emoji: Some("🤖".to_string()),
        image: None,
    };
    sink.send(Message::Text(serde_json::to_string(&join)?)).await?;

    // Wander a few squares, then say hello
    for target in [Position::new(2, 2), Position::new(4, 4)] {
        sink.send(Message::Text(serde_json::to_string(&ClientEvent::Move(target))?))
            .await?;
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    }
    let chat = ClientEvent::ChatMessage("hello from the test client".to_string());
    sink.send(Message::Text(serde_json::to_string(&chat)?)).await?;

    // Print whatever the server pushes back for a short while
    let deadline = tokio::time::sleep(std::time::Duration::from_secs(2));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let event: ServerEvent = serde_json::from_str(&text)?;
                    print_event(&event);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    println!("Read error: {}", e);
                    break;
                }
                None => break,
            },
            _ = &mut deadline => break,
        }
    }

    sink.close().await?;
    println!("Disconnected");
    Ok(())
}
