//! Headless smoke client: performs the full handshake on both channels,
//! then walks forward for a few seconds while printing what the server says.

use server::network::{read_frame, write_frame};
use shared::protocol::{ConnectRequest, DatagramInit, PROTOCOL_VERSION};
use shared::{decode, encode, ClientInputState, Message};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{sleep, timeout};

const INIT_ATTEMPTS: u32 = 100;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:32887".to_string())
        .parse()?;

    // Reliable channel handshake.
    let mut tcp = TcpStream::connect(server_addr).await?;
    println!("Connected to {}", server_addr);

    write_frame(
        &mut tcp,
        &Message::ConnectRequest(ConnectRequest {
            username: "smoke-test".to_string(),
            protocol_version: PROTOCOL_VERSION,
        }),
    )
    .await?;

    let player_id = match read_frame(&mut tcp).await? {
        Message::ConnectAccepted(accepted) => {
            println!(
                "Accepted as player {} (server ticks at {} Hz)",
                accepted.player_id, accepted.tick_rate
            );
            accepted.player_id
        }
        Message::ConnectRejected(rejected) => {
            println!("Rejected: {}", rejected.reason);
            return Ok(());
        }
        other => {
            println!("Unexpected handshake reply: {:?}", other);
            return Ok(());
        }
    };

    // Drain the world push until the reliable channel goes quiet.
    let mut chunks = 0;
    while let Ok(Ok(message)) = timeout(Duration::from_millis(500), read_frame(&mut tcp)).await {
        match message {
            Message::ChunkData(_) => chunks += 1,
            Message::InventorySnapshot(inv) => {
                println!("Inventory: {} stacks, slot {}", inv.stacks.len(), inv.selected)
            }
            Message::PlayerJoin(join) => println!("Already here: {}", join.username),
            other => println!("Reliable: {:?}", other),
        }
    }
    println!("World push complete: {} chunks", chunks);

    // Rendezvous: repeat the init datagram until the server's echo of it
    // comes back.
    let udp = UdpSocket::bind("0.0.0.0:0").await?;
    udp.connect(server_addr).await?;
    let init = Message::DatagramInit(DatagramInit { player_id });
    let init_bytes = encode(&init)?;
    let mut buf = [0u8; 2048];
    let mut bound = false;

    for attempt in 0..INIT_ATTEMPTS {
        udp.send(&init_bytes).await?;
        if let Ok(Ok(len)) = timeout(Duration::from_millis(100), udp.recv(&mut buf)).await {
            if buf[..len] == init_bytes[..] {
                println!("Datagram channel bound after {} attempts", attempt + 1);
                bound = true;
                break;
            }
        }
    }
    if !bound {
        println!("Datagram rendezvous failed");
        return Ok(());
    }

    // Walk forward for a few seconds, sending the snapshot on change and as
    // a periodic keep-alive.
    let mut input = ClientInputState::for_player(player_id);
    input.forward = true;

    for i in 0..100 {
        udp.send(&encode(&Message::ClientInput(input.clone()))?).await?;

        if let Ok(Ok(len)) = timeout(Duration::from_millis(50), udp.recv(&mut buf)).await {
            match decode(&buf[..len]) {
                Ok(Message::PlayerUpdate(update)) if update.player_id == player_id => {
                    if i % 20 == 0 {
                        println!(
                            "At ({:.2}, {:.2}, {:.2})",
                            update.position.x, update.position.y, update.position.z
                        );
                    }
                }
                Ok(_) => {}
                Err(e) => println!("Bad datagram: {}", e),
            }
        }
        sleep(Duration::from_millis(50)).await;
    }

    println!("Smoke test finished");
    Ok(())
}
