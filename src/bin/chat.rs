// Terminal front-end for R.O.N.I: a thin line-oriented shell over
// ChatController. Mode selection, image attach and printing only; every
// decision lives in the controller.

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use roni::client::HttpGatewayClient;
use roni::config::Config;
use roni::controller::ChatController;
use roni::models::{Message, MessageType, Role};
use roni::storage::SqliteStore;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let config = Config::from_env()?;

    let store = Arc::new(SqliteStore::connect(&config.database_path).await?);
    let gateway = Arc::new(HttpGatewayClient::new(
        config.gateway_url.clone(),
        config.gateway_token.clone(),
    ));
    let mut controller = ChatController::new(store, gateway);

    controller.load_history().await;
    for message in controller.messages() {
        print_message(message);
    }

    println!("R.O.N.I (Responsive Organic Neural Interface)");
    println!("Type a message, or: /imagine <prompt>   /attach <path>   /history   /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut attachment: Option<String> = None;

    prompt(attachment.is_some())?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();

        if line.is_empty() {
            prompt(attachment.is_some())?;
            continue;
        }

        if line == "/quit" {
            break;
        } else if line == "/history" {
            for message in controller.messages() {
                print_message(message);
            }
        } else if let Some(path) = line.strip_prefix("/attach ") {
            let path = path.trim();
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    println!("Attached {} ({} bytes)", path, bytes.len());
                    attachment = Some(STANDARD.encode(bytes));
                }
                Err(err) => println!("Could not read {}: {}", path, err),
            }
        } else if let Some(prompt_text) = line.strip_prefix("/imagine ") {
            // With an attachment pending this becomes an image-to-image request.
            let mode = if attachment.is_some() {
                MessageType::ImageToImage
            } else {
                MessageType::Image
            };
            controller.submit(prompt_text, attachment.take(), mode).await;
            print_last_reply(&controller);
        } else {
            controller
                .submit(line, attachment.take(), MessageType::Text)
                .await;
            print_last_reply(&controller);
        }

        prompt(attachment.is_some())?;
    }

    Ok(())
}

fn prompt(has_attachment: bool) -> Result<()> {
    if has_attachment {
        print!("[image pending] > ");
    } else {
        print!("> ");
    }
    std::io::stdout().flush()?;
    Ok(())
}

fn print_message(message: &Message) {
    let speaker = match message.role {
        Role::User => "you",
        Role::Assistant => "roni",
    };
    let marker = if message.image_url.is_some() {
        " (image attached)"
    } else {
        ""
    };
    println!("[{}]{} {}", speaker, marker, message.content);
}

fn print_last_reply(controller: &ChatController) {
    if let Some(message) = controller.messages().last() {
        if message.role == Role::Assistant {
            print_message(message);
        }
    }
}
